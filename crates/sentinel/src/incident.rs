//! Incidents and the remediation proposals attached to them.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::logs::LogRecord;

/// Remediation tools the analysis backend may propose.
pub const REMEDIATION_TOOLS: &[&str] = &[
    "scale_deployment",
    "restart_pod",
    "rollback_deployment",
    "drain_node",
    "cordon_node",
    "delete_pod",
    "update_resource_limits",
    "apply_network_policy",
];

/// Tool used when a `done` event omits `toolName`.
pub const DEFAULT_FALLBACK_TOOL: &str = "scale_deployment";

/// Namespace assumed for simulated workloads.
pub const DEFAULT_NAMESPACE: &str = "prod";

/// Unique incident identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IncidentId(Uuid);

impl IncidentId {
    /// Generate a fresh id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// First eight hex characters, for compact display.
    #[must_use]
    pub fn short(&self) -> String {
        self.0.simple().to_string()[..8].to_string()
    }
}

impl Default for IncidentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for IncidentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Lifecycle of an incident.
///
/// `PENDING -> ANALYZING -> ANALYZED -> {RESOLVED | IGNORED}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IncidentStatus {
    /// Waiting for the analysis slot
    Pending,
    /// Holding the single analysis slot
    Analyzing,
    /// Proposal attached, waiting for a human decision
    Analyzed,
    /// Remediation executed
    Resolved,
    /// Human dismissed the proposal
    Ignored,
}

impl IncidentStatus {
    /// `RESOLVED` and `IGNORED` never change again.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Resolved | Self::Ignored)
    }

    /// Upper-case display name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Analyzing => "ANALYZING",
            Self::Analyzed => "ANALYZED",
            Self::Resolved => "RESOLVED",
            Self::Ignored => "IGNORED",
        }
    }
}

impl fmt::Display for IncidentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A proposed remediation: a named operation, its arguments, and why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Tool to run (see [`REMEDIATION_TOOLS`])
    #[serde(rename = "toolName")]
    pub tool_name: String,
    /// Tool arguments
    #[serde(rename = "args", default)]
    pub arguments: Map<String, Value>,
    /// Justification
    #[serde(default)]
    pub reason: String,
}

impl ToolCall {
    /// Build a proposal.
    pub fn new(
        tool_name: impl Into<String>,
        arguments: Map<String, Value>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            tool_name: tool_name.into(),
            arguments,
            reason: reason.into(),
        }
    }

    /// Generic proposal used when analysis fails: restart the pod that
    /// raised the triggering log line.
    #[must_use]
    pub fn fallback_for(trigger: &LogRecord, failure: &str) -> Self {
        let arguments = match json!({
            "namespace": DEFAULT_NAMESPACE,
            "pod": trigger.source_pod,
            "graceful": true,
        }) {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self::new(
            "restart_pod",
            arguments,
            format!(
                "AI analysis unavailable ({failure}). Restarting {} as a safe default after: {}",
                trigger.source_pod, trigger.message
            ),
        )
    }

    /// Arguments rendered as `key=value` pairs.
    #[must_use]
    pub fn arguments_summary(&self) -> String {
        self.arguments
            .iter()
            .map(|(k, v)| match v {
                Value::String(s) => format!("{k}={s}"),
                other => format!("{k}={other}"),
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// One detected critical condition and its analysis/remediation history.
#[derive(Debug, Clone, Serialize)]
pub struct Incident {
    /// Identifier
    pub id: IncidentId,
    /// Creation time; orders the pending queue
    pub created_at: DateTime<Utc>,
    /// The ERROR record that opened the incident
    pub trigger_log: LogRecord,
    /// Trailing window of records, trigger last
    pub context_logs: Vec<LogRecord>,
    /// Current lifecycle state
    pub status: IncidentStatus,
    /// Remediation proposal, set once on leaving `ANALYZING`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proposal: Option<ToolCall>,
    /// Accumulated reasoning fragments
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_trace: Option<String>,
    /// Accumulated content fragments
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis_trace: Option<String>,
}

impl Incident {
    /// New `PENDING` incident.
    #[must_use]
    pub fn new(trigger_log: LogRecord, context_logs: Vec<LogRecord>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: IncidentId::new(),
            created_at,
            trigger_log,
            context_logs,
            status: IncidentStatus::Pending,
            proposal: None,
            reasoning_trace: None,
            analysis_trace: None,
        }
    }
}
