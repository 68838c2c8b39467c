//! KubeSentinel incident pipeline.
//!
//! Simulates a Kubernetes cluster's log stream, detects scripted critical
//! scenarios, asks an analysis backend to diagnose them over a streamed
//! event protocol, and walks each diagnosis through a human approve/ignore
//! workflow before simulating the remediation.
//!
//! Data flows one way:
//!
//! ```text
//! generator -> factory -> queue -> analysis client -> status aggregator
//!                            ^
//!                            +-- approve / ignore (operator)
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use sentinel::{IncidentQueue, QueueAction};
//!
//! let mut queue = IncidentQueue::new();
//! let transition = queue.enqueue(trigger, context);
//! if let Some(id) = transition.promoted {
//!     // start the analysis for `id`
//! }
//! ```

pub mod analysis;
pub mod api;
pub mod config;
pub mod error;
pub mod factory;
pub mod generator;
pub mod incident;
pub mod logs;
pub mod monitor;
pub mod queue;
pub mod remediation;
pub mod status;

pub use analysis::{AnalysisClient, AnalysisEvent, AnalysisHandler, Analyzer, EventStreamParser};
pub use config::SentinelConfig;
pub use error::{SentinelError, SentinelResult};
pub use factory::{IncidentFactory, IncidentSeed};
pub use generator::{CriticalScenario, LogGenerator, ScenarioCursor};
pub use incident::{Incident, IncidentId, IncidentStatus, ToolCall};
pub use logs::{LogRecord, Severity};
pub use monitor::{ApprovalPolicy, EventEmitter, Monitor, MonitorEvent, OperatorCommand};
pub use queue::{IncidentQueue, QueueAction, Transition};
pub use remediation::RemediationSimulator;
pub use status::SystemStatus;
