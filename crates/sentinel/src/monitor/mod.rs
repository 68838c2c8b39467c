//! Pipeline driver.
//!
//! One task owns the generator, the scenario cursor, the incident factory
//! and the queue. Everything else reaches it through channels:
//!
//! - the tick timer drives the generator
//! - the spawned analysis task forwards handler callbacks
//! - the spawned remediation task reports completion
//! - operator commands arrive from stdin
//!
//! The queue is only ever touched from [`Monitor::run`], so the single-flight
//! and terminal-state invariants hold without locks.

pub mod commands;
pub mod events;

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::analysis::{AnalysisHandler, Analyzer};
use crate::config::SentinelConfig;
use crate::error::{SentinelError, SentinelResult};
use crate::factory::IncidentFactory;
use crate::generator::{Catalog, LogGenerator, ScenarioCursor};
use crate::incident::{IncidentId, IncidentStatus, ToolCall};
use crate::logs::LogRecord;
use crate::queue::{IncidentQueue, QueueAction, StatusCounts, Transition};
use crate::remediation::RemediationSimulator;
use crate::status::SystemStatus;

pub use commands::{ApprovalPolicy, OperatorCommand, COMMAND_HELP};
pub use events::{EventEmitter, IncidentSummary, MonitorEvent, OutputFormat};

/// Records included in a `status` summary.
const RECENT_LOGS: usize = 5;

/// Message sent from the analysis task to the monitor.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisUpdate {
    Reasoning { id: IncidentId, text: String },
    Content { id: IncidentId, text: String },
    Result { id: IncidentId, proposal: ToolCall },
    Error { id: IncidentId, message: String },
    /// The analysis call returned
    Finished { id: IncidentId },
}

/// [`AnalysisHandler`] that forwards every callback over a channel.
#[derive(Debug)]
pub struct ChannelHandler {
    id: IncidentId,
    tx: mpsc::UnboundedSender<AnalysisUpdate>,
}

impl ChannelHandler {
    #[must_use]
    pub fn new(id: IncidentId, tx: mpsc::UnboundedSender<AnalysisUpdate>) -> Self {
        Self { id, tx }
    }

    fn send(&self, update: AnalysisUpdate) {
        if self.tx.send(update).is_err() {
            debug!(incident = %self.id, "Monitor gone, dropping analysis update");
        }
    }
}

impl AnalysisHandler for ChannelHandler {
    fn on_reasoning(&mut self, text: &str) {
        self.send(AnalysisUpdate::Reasoning {
            id: self.id,
            text: text.to_string(),
        });
    }

    fn on_content(&mut self, text: &str) {
        self.send(AnalysisUpdate::Content {
            id: self.id,
            text: text.to_string(),
        });
    }

    fn on_result(&mut self, proposal: ToolCall) {
        self.send(AnalysisUpdate::Result {
            id: self.id,
            proposal,
        });
    }

    fn on_error(&mut self, message: &str) {
        self.send(AnalysisUpdate::Error {
            id: self.id,
            message: message.to_string(),
        });
    }
}

/// Run one analysis to completion, bounded by `timeout` when set, and
/// signal `Finished` afterwards.
pub async fn run_analysis(
    analyzer: Arc<dyn Analyzer>,
    id: IncidentId,
    logs: Vec<LogRecord>,
    timeout: Option<Duration>,
    tx: mpsc::UnboundedSender<AnalysisUpdate>,
) {
    let mut handler = ChannelHandler::new(id, tx);
    match timeout {
        Some(limit) => {
            let analysis = analyzer.analyze(&logs, &mut handler);
            if tokio::time::timeout(limit, analysis).await.is_err() {
                warn!(incident = %id, timeout_secs = limit.as_secs(), "Analysis timed out");
                handler.on_error(&SentinelError::Timeout(limit).to_string());
            }
        }
        None => analyzer.analyze(&logs, &mut handler).await,
    }
    handler.send(AnalysisUpdate::Finished { id });
}

#[derive(Debug)]
struct RemediationDone {
    id: IncidentId,
    record: LogRecord,
}

#[derive(Debug, Default)]
struct AnalysisStats {
    reasoning_chars: usize,
    content_chars: usize,
}

/// Totals returned when the monitor stops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub ticks: u64,
    pub status: SystemStatus,
    pub counts: StatusCounts,
}

/// The incident pipeline.
pub struct Monitor {
    config: SentinelConfig,
    generator: LogGenerator,
    cursor: ScenarioCursor,
    factory: IncidentFactory,
    queue: IncidentQueue,
    history: VecDeque<LogRecord>,
    analyzer: Arc<dyn Analyzer>,
    simulator: RemediationSimulator,
    policy: ApprovalPolicy,
    emitter: EventEmitter,
    max_ticks: Option<u64>,
    paused: bool,
    ticks: u64,
    status: SystemStatus,
    analyses: HashMap<IncidentId, AnalysisStats>,
    analysis_tx: mpsc::UnboundedSender<AnalysisUpdate>,
    analysis_rx: mpsc::UnboundedReceiver<AnalysisUpdate>,
    remediation_tx: mpsc::UnboundedSender<RemediationDone>,
    remediation_rx: mpsc::UnboundedReceiver<RemediationDone>,
}

impl Monitor {
    /// Build a monitor with the builtin scenario catalog.
    pub fn new(
        config: SentinelConfig,
        analyzer: Arc<dyn Analyzer>,
        emitter: EventEmitter,
    ) -> SentinelResult<Self> {
        let generator = LogGenerator::new(Catalog::builtin())?;
        Self::with_generator(config, generator, analyzer, emitter)
    }

    /// Build a monitor around an existing generator (seeded in tests).
    pub fn with_generator(
        config: SentinelConfig,
        generator: LogGenerator,
        analyzer: Arc<dyn Analyzer>,
        emitter: EventEmitter,
    ) -> SentinelResult<Self> {
        config.validate()?;
        let generator =
            generator.with_probabilities(config.warn_probability, config.critical_probability);
        let (analysis_tx, analysis_rx) = mpsc::unbounded_channel();
        let (remediation_tx, remediation_rx) = mpsc::unbounded_channel();

        Ok(Self {
            factory: IncidentFactory::new(config.context_window),
            simulator: RemediationSimulator::new(config.remediation_delay()),
            history: VecDeque::with_capacity(config.history_limit),
            config,
            generator,
            cursor: ScenarioCursor::new(),
            queue: IncidentQueue::new(),
            analyzer,
            policy: ApprovalPolicy::Manual,
            emitter,
            max_ticks: None,
            paused: false,
            ticks: 0,
            status: SystemStatus::Healthy,
            analyses: HashMap::new(),
            analysis_tx,
            analysis_rx,
            remediation_tx,
            remediation_rx,
        })
    }

    /// Decide proposals automatically.
    #[must_use]
    pub fn with_policy(mut self, policy: ApprovalPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Stop generating after `max_ticks` records and exit once the queue
    /// has drained.
    #[must_use]
    pub fn with_max_ticks(mut self, max_ticks: Option<u64>) -> Self {
        self.max_ticks = max_ticks;
        self
    }

    /// The incident queue.
    #[must_use]
    pub fn queue(&self) -> &IncidentQueue {
        &self.queue
    }

    /// Recent log records, oldest first.
    #[must_use]
    pub fn history(&self) -> &VecDeque<LogRecord> {
        &self.history
    }

    /// Current aggregate status.
    #[must_use]
    pub fn status(&self) -> SystemStatus {
        self.status
    }

    /// Drive the pipeline until `shutdown` resolves, `quit` is received, or
    /// `max_ticks` is reached and nothing is left in flight.
    pub async fn run<F>(
        &mut self,
        mut commands: mpsc::UnboundedReceiver<OperatorCommand>,
        shutdown: F,
    ) -> SentinelResult<RunSummary>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let mut ticker = tokio::time::interval(self.config.tick_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut commands_open = true;

        self.emit(MonitorEvent::Started {
            backend_url: self.config.backend_url.clone(),
            context_window: self.config.context_window,
            tick_interval_ms: self.config.tick_interval_ms,
            policy: self.policy.to_string(),
            timestamp: Utc::now(),
        })?;
        info!(
            policy = %self.policy,
            tick_ms = self.config.tick_interval_ms,
            window = self.config.context_window,
            "Monitor started"
        );

        let reason = loop {
            if self.drained() {
                break "max ticks reached";
            }
            let generating = !self.paused && !self.ticks_exhausted();

            tokio::select! {
                () = &mut shutdown => break "interrupted",
                _ = ticker.tick(), if generating => self.on_tick()?,
                Some(update) = self.analysis_rx.recv() => self.on_analysis_update(update)?,
                Some(done) = self.remediation_rx.recv() => self.on_remediation_done(done)?,
                command = commands.recv(), if commands_open => match command {
                    Some(OperatorCommand::Quit) => break "quit",
                    Some(command) => self.on_command(command)?,
                    None => {
                        debug!("Operator input closed");
                        commands_open = false;
                    }
                },
            }
        };

        info!(reason, ticks = self.ticks, "Monitor stopped");
        self.emit(MonitorEvent::Stopped {
            reason: reason.to_string(),
            ticks: self.ticks,
            timestamp: Utc::now(),
        })?;

        Ok(RunSummary {
            ticks: self.ticks,
            status: self.status,
            counts: self.queue.counts(),
        })
    }

    fn ticks_exhausted(&self) -> bool {
        self.max_ticks.is_some_and(|max| self.ticks >= max)
    }

    /// Generation finished and no incident can still move without a human.
    fn drained(&self) -> bool {
        if !self.ticks_exhausted() {
            return false;
        }
        let counts = self.queue.counts();
        counts.pending == 0
            && counts.analyzing == 0
            && self.queue.remediations_in_flight() == 0
            && self.analyses.is_empty()
    }

    fn emit(&self, event: MonitorEvent) -> SentinelResult<()> {
        self.emitter.emit(&event)
    }

    fn on_tick(&mut self) -> SentinelResult<()> {
        self.ticks += 1;
        let record = self.generator.tick(&mut self.cursor);
        self.push_log(record)
    }

    /// Append a record to the stream and open an incident if it triggers one.
    fn push_log(&mut self, record: LogRecord) -> SentinelResult<()> {
        self.emit(MonitorEvent::Log {
            record: record.clone(),
        })?;

        let seed = self.factory.observe(&record);
        if self.history.len() >= self.config.history_limit {
            self.history.pop_front();
        }
        self.history.push_back(record);

        if let Some(seed) = seed {
            let transition = self.queue.enqueue(seed.trigger, seed.context);
            if let Some(incident) = transition.incident.and_then(|id| self.queue.get(id)) {
                self.emit(MonitorEvent::IncidentOpened {
                    incident_id: incident.id,
                    pod: incident.trigger_log.source_pod.clone(),
                    message: incident.trigger_log.message.clone(),
                    context_logs: incident.context_logs.len(),
                    timestamp: Utc::now(),
                })?;
            }
            self.after(&transition)?;
        }
        Ok(())
    }

    /// React to a transition: start analyses, start remediations, report
    /// status changes.
    fn after(&mut self, transition: &Transition) -> SentinelResult<()> {
        if let Some(id) = transition.promoted {
            self.start_analysis(id)?;
        }
        if let (Some(id), Some(proposal)) = (transition.incident, transition.remediate.as_ref()) {
            self.start_remediation(id, proposal.clone())?;
        }
        self.refresh_status()
    }

    fn refresh_status(&mut self) -> SentinelResult<()> {
        let status = self.queue.status();
        if status != self.status {
            info!(from = %self.status, to = %status, "System status changed");
            self.emit(MonitorEvent::StatusChanged {
                from: self.status,
                to: status,
                timestamp: Utc::now(),
            })?;
            self.status = status;
        }
        Ok(())
    }

    fn start_analysis(&mut self, id: IncidentId) -> SentinelResult<()> {
        let Some(incident) = self.queue.get(id) else {
            return Ok(());
        };
        let logs = incident.context_logs.clone();
        self.analyses.insert(id, AnalysisStats::default());
        self.emit(MonitorEvent::AnalysisStarted {
            incident_id: id,
            timestamp: Utc::now(),
        })?;

        tokio::spawn(run_analysis(
            Arc::clone(&self.analyzer),
            id,
            logs,
            self.config.analysis_timeout(),
            self.analysis_tx.clone(),
        ));
        Ok(())
    }

    fn start_remediation(&mut self, id: IncidentId, proposal: ToolCall) -> SentinelResult<()> {
        self.emit(MonitorEvent::RemediationStarted {
            incident_id: id,
            tool_name: proposal.tool_name.clone(),
            timestamp: Utc::now(),
        })?;

        let simulator = self.simulator;
        let tx = self.remediation_tx.clone();
        tokio::spawn(async move {
            let record = simulator.execute(id, &proposal).await;
            if tx.send(RemediationDone { id, record }).is_err() {
                debug!(incident = %id, "Monitor gone, dropping remediation result");
            }
        });
        Ok(())
    }

    fn on_analysis_update(&mut self, update: AnalysisUpdate) -> SentinelResult<()> {
        match update {
            AnalysisUpdate::Reasoning { id, text } => {
                if let Some(stats) = self.analyses.get_mut(&id) {
                    stats.reasoning_chars += text.chars().count();
                }
                self.queue.apply(QueueAction::AppendReasoning { id, text });
                Ok(())
            }
            AnalysisUpdate::Content { id, text } => {
                if let Some(stats) = self.analyses.get_mut(&id) {
                    stats.content_chars += text.chars().count();
                }
                self.queue.apply(QueueAction::AppendContent { id, text });
                Ok(())
            }
            AnalysisUpdate::Result { id, proposal } => self.complete(id, proposal, false),
            AnalysisUpdate::Error { id, message } => {
                if !self.is_analyzing(id) {
                    debug!(incident = %id, error = %message, "Late analysis error ignored");
                    return Ok(());
                }
                self.emit(MonitorEvent::AnalysisFailed {
                    incident_id: id,
                    error: message.clone(),
                    timestamp: Utc::now(),
                })?;
                self.complete_with_fallback(id, &message)
            }
            AnalysisUpdate::Finished { id } => {
                let outcome = if self.is_analyzing(id) {
                    warn!(incident = %id, "Analysis ended without a proposal");
                    self.complete_with_fallback(id, "analysis ended without a proposal")
                } else {
                    Ok(())
                };
                self.analyses.remove(&id);
                outcome
            }
        }
    }

    fn is_analyzing(&self, id: IncidentId) -> bool {
        self.queue
            .get(id)
            .is_some_and(|i| i.status == IncidentStatus::Analyzing)
    }

    fn complete_with_fallback(&mut self, id: IncidentId, failure: &str) -> SentinelResult<()> {
        let Some(incident) = self.queue.get(id) else {
            return Ok(());
        };
        let proposal = ToolCall::fallback_for(&incident.trigger_log, failure);
        self.complete(id, proposal, true)
    }

    fn complete(&mut self, id: IncidentId, proposal: ToolCall, fallback: bool) -> SentinelResult<()> {
        let transition = self.queue.apply(QueueAction::CompleteAnalysis {
            id,
            proposal: proposal.clone(),
        });
        if !transition.applied {
            return Ok(());
        }

        let stats = self.analyses.get(&id);
        self.emit(MonitorEvent::AnalysisCompleted {
            incident_id: id,
            proposal,
            fallback,
            reasoning_chars: stats.map_or(0, |s| s.reasoning_chars),
            content_chars: stats.map_or(0, |s| s.content_chars),
            timestamp: Utc::now(),
        })?;
        self.after(&transition)?;

        match self.policy {
            ApprovalPolicy::Manual => Ok(()),
            ApprovalPolicy::AutoApprove => self.approve(id),
            ApprovalPolicy::AutoIgnore => self.ignore(id),
        }
    }

    fn approve(&mut self, id: IncidentId) -> SentinelResult<()> {
        let transition = self.queue.approve(id);
        if !transition.applied {
            warn!(incident = %id, "Approve rejected: incident is not awaiting a decision");
        }
        self.after(&transition)
    }

    fn ignore(&mut self, id: IncidentId) -> SentinelResult<()> {
        let transition = self.queue.ignore(id);
        if transition.applied {
            self.emit(MonitorEvent::IncidentIgnored {
                incident_id: id,
                timestamp: Utc::now(),
            })?;
        } else {
            warn!(incident = %id, "Ignore rejected: incident is not awaiting a decision");
        }
        self.after(&transition)
    }

    fn on_remediation_done(&mut self, done: RemediationDone) -> SentinelResult<()> {
        let RemediationDone { id, record } = done;
        self.push_log(record)?;
        let transition = self.queue.apply(QueueAction::FinishRemediation { id });
        if transition.applied {
            self.emit(MonitorEvent::IncidentResolved {
                incident_id: id,
                timestamp: Utc::now(),
            })?;
        }
        self.after(&transition)
    }

    fn on_command(&mut self, command: OperatorCommand) -> SentinelResult<()> {
        debug!(?command, "Operator command");
        match command {
            OperatorCommand::Approve(prefix) => match self.queue.resolve_prefix(&prefix) {
                Some(id) => self.approve(id),
                None => {
                    warn!(prefix = %prefix, "No single incident matches");
                    Ok(())
                }
            },
            OperatorCommand::Ignore(prefix) => match self.queue.resolve_prefix(&prefix) {
                Some(id) => self.ignore(id),
                None => {
                    warn!(prefix = %prefix, "No single incident matches");
                    Ok(())
                }
            },
            OperatorCommand::Pause | OperatorCommand::Resume => {
                let paused = command == OperatorCommand::Pause;
                if self.paused != paused {
                    self.paused = paused;
                    self.emit(MonitorEvent::Paused {
                        paused,
                        timestamp: Utc::now(),
                    })?;
                }
                Ok(())
            }
            OperatorCommand::Status => self.emit(MonitorEvent::Summary {
                status: self.status,
                paused: self.paused,
                ticks: self.ticks,
                counts: self.queue.counts(),
                recent_logs: self
                    .history
                    .iter()
                    .skip(self.history.len().saturating_sub(RECENT_LOGS))
                    .cloned()
                    .collect(),
                timestamp: Utc::now(),
            }),
            OperatorCommand::List => self.emit(MonitorEvent::IncidentList {
                incidents: self
                    .queue
                    .incidents()
                    .iter()
                    .map(|i| IncidentSummary {
                        id: i.id,
                        status: i.status,
                        executing: self.queue.is_executing(i.id),
                        pod: i.trigger_log.source_pod.clone(),
                        message: i.trigger_log.message.clone(),
                        proposal: i.proposal.clone(),
                    })
                    .collect(),
                timestamp: Utc::now(),
            }),
            OperatorCommand::Help => {
                info!("{COMMAND_HELP}");
                Ok(())
            }
            OperatorCommand::Quit => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logs::Severity;
    use async_trait::async_trait;
    use serde_json::Map;
    use std::sync::Mutex;

    enum Script {
        Respond,
        Fail,
        Hang,
        Silent,
    }

    struct ScriptedAnalyzer {
        script: Script,
        calls: Mutex<Vec<usize>>,
    }

    impl ScriptedAnalyzer {
        fn new(script: Script) -> Arc<Self> {
            Arc::new(Self {
                script,
                calls: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Analyzer for ScriptedAnalyzer {
        async fn analyze(&self, logs: &[LogRecord], handler: &mut dyn AnalysisHandler) {
            self.calls.lock().unwrap().push(logs.len());
            match self.script {
                Script::Respond => {
                    handler.on_reasoning("A");
                    handler.on_content("{\"toolName\"");
                    let mut args = Map::new();
                    args.insert("pod".to_string(), "x".into());
                    handler.on_result(ToolCall::new("restart_pod", args, "y"));
                }
                Script::Fail => handler.on_error("Analysis backend error: 500 - boom"),
                Script::Hang => std::future::pending::<()>().await,
                Script::Silent => {}
            }
        }
    }

    fn config() -> SentinelConfig {
        SentinelConfig {
            critical_probability: 1.0,
            tick_interval_ms: 100,
            remediation_delay_ms: 2000,
            ..SentinelConfig::default()
        }
    }

    fn monitor(
        analyzer: Arc<ScriptedAnalyzer>,
        config: SentinelConfig,
    ) -> (Monitor, Arc<Mutex<Vec<MonitorEvent>>>) {
        let (emitter, events) = EventEmitter::capture();
        let generator = LogGenerator::seeded(Catalog::builtin(), 7).unwrap();
        let monitor = Monitor::with_generator(config, generator, analyzer, emitter).unwrap();
        (monitor, events)
    }

    async fn run(monitor: &mut Monitor) -> RunSummary {
        let (_tx, rx) = mpsc::unbounded_channel();
        monitor.run(rx, std::future::pending()).await.unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_incident_reaches_analyzed_with_traces() {
        let analyzer = ScriptedAnalyzer::new(Script::Respond);
        let (monitor, events) = monitor(Arc::clone(&analyzer), config());
        let mut monitor = monitor.with_max_ticks(Some(1));

        let summary = run(&mut monitor).await;
        assert_eq!(summary.ticks, 1);
        assert_eq!(summary.status, SystemStatus::IncidentDetected);

        let incident = &monitor.queue().incidents()[0];
        assert_eq!(incident.status, IncidentStatus::Analyzed);
        assert_eq!(incident.reasoning_trace.as_deref(), Some("A"));
        assert_eq!(incident.proposal.as_ref().unwrap().tool_name, "restart_pod");
        assert_eq!(*analyzer.calls.lock().unwrap(), vec![1]);

        let events = events.lock().unwrap();
        assert!(events.iter().any(|e| matches!(
            e,
            MonitorEvent::AnalysisCompleted { fallback: false, reasoning_chars: 1, .. }
        )));
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_attaches_fallback() {
        let (monitor, events) = monitor(ScriptedAnalyzer::new(Script::Fail), config());
        let mut monitor = monitor.with_max_ticks(Some(1));
        run(&mut monitor).await;

        let incident = &monitor.queue().incidents()[0];
        assert_eq!(incident.status, IncidentStatus::Analyzed);
        let proposal = incident.proposal.as_ref().unwrap();
        assert_eq!(proposal.tool_name, "restart_pod");
        assert_eq!(proposal.arguments["pod"], incident.trigger_log.source_pod.as_str());

        let failures = events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| matches!(e, MonitorEvent::AnalysisFailed { .. }))
            .count();
        assert_eq!(failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_analysis_times_out() {
        let config = SentinelConfig {
            analysis_timeout_secs: 30,
            ..config()
        };
        let (monitor, _events) = monitor(ScriptedAnalyzer::new(Script::Hang), config);
        let mut monitor = monitor.with_max_ticks(Some(1));

        let started = tokio::time::Instant::now();
        run(&mut monitor).await;
        assert!(started.elapsed() >= Duration::from_secs(30));

        let incident = &monitor.queue().incidents()[0];
        assert_eq!(incident.status, IncidentStatus::Analyzed);
        assert!(incident
            .proposal
            .as_ref()
            .unwrap()
            .reason
            .contains("timed out"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_analysis_gets_fallback() {
        let (monitor, _events) = monitor(ScriptedAnalyzer::new(Script::Silent), config());
        let mut monitor = monitor.with_max_ticks(Some(1));
        run(&mut monitor).await;
        assert_eq!(
            monitor.queue().incidents()[0].status,
            IncidentStatus::Analyzed
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_approve_resolves_and_logs() {
        let (monitor, events) = monitor(ScriptedAnalyzer::new(Script::Respond), config());
        let mut monitor = monitor
            .with_policy(ApprovalPolicy::AutoApprove)
            .with_max_ticks(Some(3));

        let summary = run(&mut monitor).await;
        assert_eq!(summary.status, SystemStatus::Healthy);
        assert_eq!(summary.counts.resolved, 3);
        assert!(monitor
            .history()
            .iter()
            .any(|r| r.message.starts_with("Remediation executed: restart_pod")));

        let statuses: Vec<SystemStatus> = events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                MonitorEvent::StatusChanged { to, .. } => Some(*to),
                _ => None,
            })
            .collect();
        assert_eq!(statuses.first(), Some(&SystemStatus::Analyzing));
        assert!(statuses.contains(&SystemStatus::Remediating));
        assert_eq!(statuses.last(), Some(&SystemStatus::Healthy));
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_ignore() {
        let (monitor, _events) = monitor(ScriptedAnalyzer::new(Script::Respond), config());
        let mut monitor = monitor
            .with_policy(ApprovalPolicy::AutoIgnore)
            .with_max_ticks(Some(2));
        let summary = run(&mut monitor).await;
        assert_eq!(summary.counts.ignored, 2);
        assert_eq!(summary.status, SystemStatus::Healthy);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_flight_across_many_incidents() {
        let (monitor, events) = monitor(ScriptedAnalyzer::new(Script::Respond), config());
        let mut monitor = monitor.with_max_ticks(Some(10));
        run(&mut monitor).await;

        // Each analysis start is followed by its completion before the next.
        let mut in_flight: Option<IncidentId> = None;
        for event in events.lock().unwrap().iter() {
            match event {
                MonitorEvent::AnalysisStarted { incident_id, .. } => {
                    assert!(in_flight.is_none(), "two analyses in flight");
                    in_flight = Some(*incident_id);
                }
                MonitorEvent::AnalysisCompleted { incident_id, .. } => {
                    assert_eq!(in_flight.take(), Some(*incident_id));
                }
                _ => {}
            }
        }
        assert_eq!(monitor.queue().counts().analyzed, 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_operator_commands() {
        let (mut monitor, events) = monitor(ScriptedAnalyzer::new(Script::Respond), config());
        let (tx, rx) = mpsc::unbounded_channel();

        let handle = tokio::spawn(async move {
            let summary = monitor.run(rx, std::future::pending()).await.unwrap();
            (monitor, summary)
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(OperatorCommand::List).unwrap();
        tx.send(OperatorCommand::Status).unwrap();
        tx.send(OperatorCommand::Quit).unwrap();

        let (monitor, _summary) = handle.await.unwrap();
        let id = monitor.queue().incidents()[0].id;
        let events = events.lock().unwrap();
        assert!(events.iter().any(|e| matches!(
            e,
            MonitorEvent::IncidentList { incidents, .. } if incidents.len() == 1 && incidents[0].id == id
        )));
        assert!(events.iter().any(|e| matches!(e, MonitorEvent::Summary { .. })));
        assert!(matches!(
            events.last(),
            Some(MonitorEvent::Stopped { reason, .. }) if reason == "quit"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_approve_by_prefix() {
        let (mut monitor, events) = monitor(ScriptedAnalyzer::new(Script::Respond), config());

        let trigger = LogRecord::new(Severity::Error, "payment-service-7d9cf", "OOMKilled");
        monitor.push_log(trigger).unwrap();
        let id = monitor.queue().incidents()[0].id;
        while monitor.queue().get(id).unwrap().status != IncidentStatus::Analyzed {
            let update = monitor.analysis_rx.recv().await.unwrap();
            monitor.on_analysis_update(update).unwrap();
        }
        assert_eq!(monitor.status(), SystemStatus::IncidentDetected);

        monitor.on_command(OperatorCommand::Approve(id.short())).unwrap();
        assert!(monitor.queue().is_executing(id));
        assert_eq!(monitor.status(), SystemStatus::Remediating);

        // A second approval while executing changes nothing.
        monitor.on_command(OperatorCommand::Approve(id.short())).unwrap();
        monitor.on_command(OperatorCommand::Ignore(id.short())).unwrap();
        assert_eq!(monitor.queue().get(id).unwrap().status, IncidentStatus::Analyzed);

        let done = monitor.remediation_rx.recv().await.unwrap();
        monitor.on_remediation_done(done).unwrap();
        assert_eq!(monitor.queue().get(id).unwrap().status, IncidentStatus::Resolved);
        assert_eq!(monitor.status(), SystemStatus::Healthy);

        let started = events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| matches!(e, MonitorEvent::RemediationStarted { .. }))
            .count();
        assert_eq!(started, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_stops_generation() {
        let (mut monitor, events) = monitor(ScriptedAnalyzer::new(Script::Respond), config());
        monitor.on_command(OperatorCommand::Pause).unwrap();
        monitor.on_command(OperatorCommand::Pause).unwrap();
        assert!(monitor.paused);
        monitor.on_command(OperatorCommand::Resume).unwrap();
        assert!(!monitor.paused);

        let toggles = events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| matches!(e, MonitorEvent::Paused { .. }))
            .count();
        assert_eq!(toggles, 2);
    }

    #[test]
    fn test_channel_handler_forwards() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = IncidentId::new();
        let mut handler = ChannelHandler::new(id, tx);
        handler.on_reasoning("r");
        handler.on_error("e");
        assert_eq!(
            rx.try_recv().unwrap(),
            AnalysisUpdate::Reasoning {
                id,
                text: "r".to_string()
            }
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            AnalysisUpdate::Error {
                id,
                message: "e".to_string()
            }
        );
    }
}
