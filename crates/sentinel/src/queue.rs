//! Incident queue with a single-flight analysis scheduler.
//!
//! Every mutation goes through [`IncidentQueue::apply`], which validates the
//! requested transition, re-runs the scheduler and returns the new
//! aggregate [`SystemStatus`] alongside whatever the caller has to act on
//! (an incident to analyze, a proposal to execute).
//!
//! Invariants:
//! - at most one incident is `ANALYZING` at any time
//! - the next incident promoted is the `PENDING` one with the smallest
//!   `created_at`, ties broken by insertion order
//! - `RESOLVED` and `IGNORED` are never left
//!
//! Requests that do not fit the current state are ignored (logged at
//! debug), never surfaced as errors.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::incident::{Incident, IncidentId, IncidentStatus, ToolCall};
use crate::logs::LogRecord;
use crate::status::SystemStatus;

/// A requested change to the incident collection.
#[derive(Debug, Clone)]
pub enum QueueAction {
    /// Open a new `PENDING` incident
    Enqueue {
        trigger: LogRecord,
        context: Vec<LogRecord>,
        created_at: DateTime<Utc>,
    },
    /// Reasoning fragment for the incident being analyzed
    AppendReasoning { id: IncidentId, text: String },
    /// Content fragment for the incident being analyzed
    AppendContent { id: IncidentId, text: String },
    /// Attach the proposal: `ANALYZING -> ANALYZED`
    CompleteAnalysis { id: IncidentId, proposal: ToolCall },
    /// Human approval; starts the simulated remediation
    Approve { id: IncidentId },
    /// Human dismissal: `ANALYZED -> IGNORED`
    Ignore { id: IncidentId },
    /// Simulated remediation finished: `ANALYZED -> RESOLVED`
    FinishRemediation { id: IncidentId },
}

impl QueueAction {
    fn name(&self) -> &'static str {
        match self {
            Self::Enqueue { .. } => "enqueue",
            Self::AppendReasoning { .. } => "append_reasoning",
            Self::AppendContent { .. } => "append_content",
            Self::CompleteAnalysis { .. } => "complete_analysis",
            Self::Approve { .. } => "approve",
            Self::Ignore { .. } => "ignore",
            Self::FinishRemediation { .. } => "finish_remediation",
        }
    }
}

/// Result of applying one action.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    /// Whether the action changed anything
    pub applied: bool,
    /// Incident the action targeted (the new one, for `Enqueue`)
    pub incident: Option<IncidentId>,
    /// Incident the scheduler just moved to `ANALYZING`
    pub promoted: Option<IncidentId>,
    /// Proposal to execute, set by an accepted `Approve`
    pub remediate: Option<ToolCall>,
    /// Aggregate status after the action
    pub status: SystemStatus,
}

/// Per-status counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub analyzing: usize,
    pub analyzed: usize,
    pub resolved: usize,
    pub ignored: usize,
}

/// Owner of every incident ever created.
#[derive(Debug, Default)]
pub struct IncidentQueue {
    /// Insertion order
    incidents: Vec<Incident>,
    /// Approved incidents whose remediation is still running
    executing: HashSet<IncidentId>,
}

impl IncidentQueue {
    /// Empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply an action, re-run the scheduler and re-aggregate the status.
    pub fn apply(&mut self, action: QueueAction) -> Transition {
        let name = action.name();
        let mut incident = None;
        let mut remediate = None;

        let applied = match action {
            QueueAction::Enqueue {
                trigger,
                context,
                created_at,
            } => {
                let new = Incident::new(trigger, context, created_at);
                info!(
                    incident = %new.id,
                    pod = %new.trigger_log.source_pod,
                    context_logs = new.context_logs.len(),
                    "Incident opened"
                );
                incident = Some(new.id);
                self.incidents.push(new);
                true
            }
            QueueAction::AppendReasoning { id, text } => {
                incident = Some(id);
                match find_in(&mut self.incidents, id, IncidentStatus::Analyzing) {
                    Some(target) => {
                        target
                            .reasoning_trace
                            .get_or_insert_with(String::new)
                            .push_str(&text);
                        true
                    }
                    None => false,
                }
            }
            QueueAction::AppendContent { id, text } => {
                incident = Some(id);
                match find_in(&mut self.incidents, id, IncidentStatus::Analyzing) {
                    Some(target) => {
                        target
                            .analysis_trace
                            .get_or_insert_with(String::new)
                            .push_str(&text);
                        true
                    }
                    None => false,
                }
            }
            QueueAction::CompleteAnalysis { id, proposal } => {
                incident = Some(id);
                match find_in(&mut self.incidents, id, IncidentStatus::Analyzing) {
                    Some(target) => {
                        info!(
                            incident = %id,
                            tool = %proposal.tool_name,
                            "Incident analyzed"
                        );
                        target.proposal = Some(proposal);
                        target.status = IncidentStatus::Analyzed;
                        true
                    }
                    None => false,
                }
            }
            QueueAction::Approve { id } => {
                incident = Some(id);
                if self.executing.contains(&id) {
                    false
                } else {
                    match find_in(&mut self.incidents, id, IncidentStatus::Analyzed)
                        .and_then(|target| target.proposal.clone())
                    {
                        Some(proposal) => {
                            info!(incident = %id, tool = %proposal.tool_name, "Remediation approved");
                            self.executing.insert(id);
                            remediate = Some(proposal);
                            true
                        }
                        None => false,
                    }
                }
            }
            QueueAction::Ignore { id } => {
                incident = Some(id);
                if self.executing.contains(&id) {
                    false
                } else {
                    match find_in(&mut self.incidents, id, IncidentStatus::Analyzed) {
                        Some(target) => {
                            info!(incident = %id, "Incident ignored");
                            target.status = IncidentStatus::Ignored;
                            true
                        }
                        None => false,
                    }
                }
            }
            QueueAction::FinishRemediation { id } => {
                incident = Some(id);
                if self.executing.contains(&id) {
                    match find_in(&mut self.incidents, id, IncidentStatus::Analyzed) {
                        Some(target) => {
                            info!(incident = %id, "Incident resolved");
                            target.status = IncidentStatus::Resolved;
                            self.executing.remove(&id);
                            true
                        }
                        None => false,
                    }
                } else {
                    false
                }
            }
        };

        if !applied {
            debug!(action = name, incident = ?incident, "Ignoring transition request");
        }

        let promoted = if applied { self.schedule() } else { None };

        Transition {
            applied,
            incident,
            promoted,
            remediate,
            status: self.status(),
        }
    }

    /// Open an incident stamped now.
    pub fn enqueue(&mut self, trigger: LogRecord, context: Vec<LogRecord>) -> Transition {
        self.enqueue_at(trigger, context, Utc::now())
    }

    /// Open an incident with an explicit creation time.
    pub fn enqueue_at(
        &mut self,
        trigger: LogRecord,
        context: Vec<LogRecord>,
        created_at: DateTime<Utc>,
    ) -> Transition {
        self.apply(QueueAction::Enqueue {
            trigger,
            context,
            created_at,
        })
    }

    /// Approve an `ANALYZED` incident. No-op otherwise.
    pub fn approve(&mut self, id: IncidentId) -> Transition {
        self.apply(QueueAction::Approve { id })
    }

    /// Ignore an `ANALYZED` incident. No-op otherwise.
    pub fn ignore(&mut self, id: IncidentId) -> Transition {
        self.apply(QueueAction::Ignore { id })
    }

    /// Current aggregate status.
    #[must_use]
    pub fn status(&self) -> SystemStatus {
        SystemStatus::aggregate(&self.incidents, &self.executing)
    }

    /// Look up an incident.
    #[must_use]
    pub fn get(&self, id: IncidentId) -> Option<&Incident> {
        self.incidents.iter().find(|i| i.id == id)
    }

    /// All incidents, oldest insertion first.
    #[must_use]
    pub fn incidents(&self) -> &[Incident] {
        &self.incidents
    }

    /// The incident holding the analysis slot.
    #[must_use]
    pub fn analyzing(&self) -> Option<&Incident> {
        self.incidents
            .iter()
            .find(|i| i.status == IncidentStatus::Analyzing)
    }

    /// Whether an approved remediation for `id` is still running.
    #[must_use]
    pub fn is_executing(&self, id: IncidentId) -> bool {
        self.executing.contains(&id)
    }

    /// Number of approved remediations still running.
    #[must_use]
    pub fn remediations_in_flight(&self) -> usize {
        self.executing.len()
    }

    /// Resolve a (possibly abbreviated) id. `None` if absent or ambiguous.
    #[must_use]
    pub fn resolve_prefix(&self, prefix: &str) -> Option<IncidentId> {
        let prefix = prefix.trim().to_ascii_lowercase();
        if prefix.is_empty() {
            return None;
        }
        let mut matches = self
            .incidents
            .iter()
            .filter(|i| i.id.to_string().starts_with(&prefix))
            .map(|i| i.id);
        let first = matches.next()?;
        matches.next().is_none().then_some(first)
    }

    /// Count incidents per status.
    #[must_use]
    pub fn counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for incident in &self.incidents {
            match incident.status {
                IncidentStatus::Pending => counts.pending += 1,
                IncidentStatus::Analyzing => counts.analyzing += 1,
                IncidentStatus::Analyzed => counts.analyzed += 1,
                IncidentStatus::Resolved => counts.resolved += 1,
                IncidentStatus::Ignored => counts.ignored += 1,
            }
        }
        counts
    }

    /// Promote the oldest `PENDING` incident if the analysis slot is free.
    fn schedule(&mut self) -> Option<IncidentId> {
        if self.analyzing().is_some() {
            return None;
        }
        let next = self
            .incidents
            .iter_mut()
            .filter(|i| i.status == IncidentStatus::Pending)
            .min_by_key(|i| i.created_at)?;
        next.status = IncidentStatus::Analyzing;
        info!(incident = %next.id, "Incident promoted to analysis");
        Some(next.id)
    }
}

fn find_in(
    incidents: &mut [Incident],
    id: IncidentId,
    expected: IncidentStatus,
) -> Option<&mut Incident> {
    incidents
        .iter_mut()
        .find(|i| i.id == id)
        .filter(|i| i.status == expected)
}
