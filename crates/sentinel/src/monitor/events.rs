//! Monitor events and their output.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;

use crate::error::SentinelResult;
use crate::incident::{IncidentId, IncidentStatus, ToolCall};
use crate::logs::{LogRecord, Severity};
use crate::queue::StatusCounts;
use crate::status::SystemStatus;

/// Events emitted by the monitor.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum MonitorEvent {
    /// Monitor has started
    Started {
        backend_url: String,
        context_window: usize,
        tick_interval_ms: u64,
        policy: String,
        timestamp: DateTime<Utc>,
    },
    /// A log record entered the stream
    Log { record: LogRecord },
    /// An ERROR record opened an incident
    IncidentOpened {
        incident_id: IncidentId,
        pod: String,
        message: String,
        context_logs: usize,
        timestamp: DateTime<Utc>,
    },
    /// An incident took the analysis slot
    AnalysisStarted {
        incident_id: IncidentId,
        timestamp: DateTime<Utc>,
    },
    /// The analysis failed; a fallback proposal follows
    AnalysisFailed {
        incident_id: IncidentId,
        error: String,
        timestamp: DateTime<Utc>,
    },
    /// A proposal is attached and waiting for a decision
    AnalysisCompleted {
        incident_id: IncidentId,
        proposal: ToolCall,
        fallback: bool,
        reasoning_chars: usize,
        content_chars: usize,
        timestamp: DateTime<Utc>,
    },
    /// An approved remediation started
    RemediationStarted {
        incident_id: IncidentId,
        tool_name: String,
        timestamp: DateTime<Utc>,
    },
    /// Remediation finished
    IncidentResolved {
        incident_id: IncidentId,
        timestamp: DateTime<Utc>,
    },
    /// Proposal dismissed
    IncidentIgnored {
        incident_id: IncidentId,
        timestamp: DateTime<Utc>,
    },
    /// Aggregate status moved
    StatusChanged {
        from: SystemStatus,
        to: SystemStatus,
        timestamp: DateTime<Utc>,
    },
    /// Answer to `status`
    Summary {
        status: SystemStatus,
        paused: bool,
        ticks: u64,
        counts: StatusCounts,
        recent_logs: Vec<LogRecord>,
        timestamp: DateTime<Utc>,
    },
    /// Answer to `list`
    IncidentList {
        incidents: Vec<IncidentSummary>,
        timestamp: DateTime<Utc>,
    },
    /// Log generation paused or resumed
    Paused {
        paused: bool,
        timestamp: DateTime<Utc>,
    },
    /// Monitor stopped
    Stopped {
        reason: String,
        ticks: u64,
        timestamp: DateTime<Utc>,
    },
}

/// One row of an incident listing.
#[derive(Debug, Clone, Serialize)]
pub struct IncidentSummary {
    pub id: IncidentId,
    pub status: IncidentStatus,
    pub executing: bool,
    pub pod: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proposal: Option<ToolCall>,
}

/// How events are rendered on stdout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// One JSON object per line
    #[default]
    Json,
    /// Coloured human-readable lines
    Text,
}

/// Writes events to stdout and optionally to a JSONL file.
#[derive(Debug, Clone, Default)]
pub struct EventEmitter {
    format: OutputFormat,
    output_file: Option<PathBuf>,
    stdout: bool,
    captured: Option<Arc<Mutex<Vec<MonitorEvent>>>>,
}

impl EventEmitter {
    /// Emitter writing to stdout in `format`, appending JSON lines to
    /// `output_file` when given.
    #[must_use]
    pub fn new(format: OutputFormat, output_file: Option<PathBuf>) -> Self {
        Self {
            format,
            output_file,
            stdout: true,
            captured: None,
        }
    }

    /// Emitter that only records events in memory.
    #[must_use]
    pub fn capture() -> (Self, Arc<Mutex<Vec<MonitorEvent>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let emitter = Self {
            format: OutputFormat::Json,
            output_file: None,
            stdout: false,
            captured: Some(Arc::clone(&events)),
        };
        (emitter, events)
    }

    /// Emit one event.
    pub fn emit(&self, event: &MonitorEvent) -> SentinelResult<()> {
        let json = serde_json::to_string(event)?;

        if self.stdout {
            let mut stdout = std::io::stdout().lock();
            match self.format {
                OutputFormat::Json => writeln!(stdout, "{json}")?,
                OutputFormat::Text => writeln!(stdout, "{}", render_text(event))?,
            }
            stdout.flush()?;
        }

        if let Some(ref path) = self.output_file {
            let mut file = OpenOptions::new().create(true).append(true).open(path)?;
            writeln!(file, "{json}")?;
        }

        if let Some(ref captured) = self.captured {
            if let Ok(mut events) = captured.lock() {
                events.push(event.clone());
            }
        }

        Ok(())
    }
}

fn short(id: &IncidentId) -> String {
    id.short()
}

fn severity_label(severity: Severity) -> colored::ColoredString {
    let label = format!("{:<8}", severity.as_str());
    let label = label.as_str();
    match severity {
        Severity::Info => label.dimmed(),
        Severity::Warn => label.yellow(),
        Severity::Error => label.red(),
        Severity::Critical => label.red().bold(),
    }
}

fn status_label(status: SystemStatus) -> colored::ColoredString {
    match status {
        SystemStatus::Healthy => status.as_str().green().bold(),
        SystemStatus::Analyzing => status.as_str().cyan().bold(),
        SystemStatus::IncidentDetected => status.as_str().red().bold(),
        SystemStatus::Remediating => status.as_str().yellow().bold(),
    }
}

/// Human-readable rendering.
pub fn render_text(event: &MonitorEvent) -> String {
    match event {
        MonitorEvent::Started {
            backend_url,
            context_window,
            tick_interval_ms,
            policy,
            ..
        } => format!(
            "{} backend={backend_url} window={context_window} tick={tick_interval_ms}ms policy={policy}",
            "▶ KubeSentinel started".bold()
        ),
        MonitorEvent::Log { record } => format!(
            "{} {} {:<28} {}",
            record.timestamp.format("%H:%M:%S").to_string().as_str().dimmed(),
            severity_label(record.severity),
            record.source_pod,
            record.message
        ),
        MonitorEvent::IncidentOpened {
            incident_id,
            pod,
            message,
            context_logs,
            ..
        } => format!(
            "{} [{}] {pod}: {message} ({context_logs} context logs)",
            "⚠ Incident".red().bold(),
            short(incident_id)
        ),
        MonitorEvent::AnalysisStarted { incident_id, .. } => {
            format!("{} [{}]", "… Analyzing".cyan(), short(incident_id))
        }
        MonitorEvent::AnalysisFailed {
            incident_id, error, ..
        } => format!(
            "{} [{}] {error}; using fallback",
            "✗ Analysis failed".red(),
            short(incident_id)
        ),
        MonitorEvent::AnalysisCompleted {
            incident_id,
            proposal,
            fallback,
            ..
        } => {
            let origin = if *fallback { " (fallback)" } else { "" };
            format!(
                "{} [{}] {}({}){origin}\n    reason: {}\n    approve {} | ignore {}",
                "✓ Proposal".green().bold(),
                short(incident_id),
                proposal.tool_name.as_str().bold(),
                proposal.arguments_summary(),
                proposal.reason,
                short(incident_id),
                short(incident_id)
            )
        }
        MonitorEvent::RemediationStarted {
            incident_id,
            tool_name,
            ..
        } => format!(
            "{} [{}] {tool_name}",
            "⚙ Remediating".yellow(),
            short(incident_id)
        ),
        MonitorEvent::IncidentResolved { incident_id, .. } => {
            format!("{} [{}]", "✓ Resolved".green(), short(incident_id))
        }
        MonitorEvent::IncidentIgnored { incident_id, .. } => {
            format!("{} [{}]", "○ Ignored".dimmed(), short(incident_id))
        }
        MonitorEvent::StatusChanged { from, to, .. } => {
            format!("status {} → {}", from.as_str().dimmed(), status_label(*to))
        }
        MonitorEvent::Summary {
            status,
            paused,
            ticks,
            counts,
            ..
        } => format!(
            "status {}{} ticks={ticks} pending={} analyzing={} analyzed={} resolved={} ignored={}",
            status_label(*status),
            if *paused { " (paused)" } else { "" },
            counts.pending,
            counts.analyzing,
            counts.analyzed,
            counts.resolved,
            counts.ignored
        ),
        MonitorEvent::IncidentList { incidents, .. } => {
            if incidents.is_empty() {
                return "no incidents".dimmed().to_string();
            }
            incidents
                .iter()
                .map(|i| {
                    let state = if i.executing {
                        "EXECUTING".to_string()
                    } else {
                        i.status.to_string()
                    };
                    let tool = i
                        .proposal
                        .as_ref()
                        .map(|p| p.tool_name.as_str())
                        .unwrap_or("-");
                    format!("{}  {state:<10} {:<28} {tool}", i.id.short(), i.pod)
                })
                .collect::<Vec<_>>()
                .join("\n")
        }
        MonitorEvent::Paused { paused, .. } => {
            if *paused {
                "⏸ Log generation paused".yellow().to_string()
            } else {
                "▶ Log generation resumed".green().to_string()
            }
        }
        MonitorEvent::Stopped { reason, ticks, .. } => {
            format!("{} {reason} after {ticks} ticks", "■ Stopped".bold())
        }
    }
}
