//! Simulated remediation.
//!
//! No infrastructure is touched: executing a proposal waits a fixed delay
//! and yields the log line a real run would have produced.

use std::time::Duration;

use tracing::info;

use crate::incident::{IncidentId, ToolCall};
use crate::logs::{LogRecord, Severity};

/// Default simulated execution time.
pub const DEFAULT_REMEDIATION_DELAY: Duration = Duration::from_secs(2);

/// Pod name used for records emitted by the sentinel itself.
pub const SENTINEL_POD: &str = "kube-sentinel";

/// Fixed-delay remediation stand-in.
#[derive(Debug, Clone, Copy)]
pub struct RemediationSimulator {
    delay: Duration,
}

impl RemediationSimulator {
    /// Create a simulator with the given delay.
    #[must_use]
    pub const fn new(delay: Duration) -> Self {
        Self { delay }
    }

    /// Configured delay.
    #[must_use]
    pub const fn delay(&self) -> Duration {
        self.delay
    }

    /// "Run" the proposal and return the success record to append to the
    /// log stream. The caller moves the incident to `RESOLVED`.
    pub async fn execute(&self, id: IncidentId, proposal: &ToolCall) -> LogRecord {
        info!(
            incident = %id,
            tool = %proposal.tool_name,
            delay_ms = self.delay.as_millis() as u64,
            "Executing remediation (simulated)"
        );
        tokio::time::sleep(self.delay).await;
        success_record(proposal)
    }
}

impl Default for RemediationSimulator {
    fn default() -> Self {
        Self::new(DEFAULT_REMEDIATION_DELAY)
    }
}

fn success_record(proposal: &ToolCall) -> LogRecord {
    let args = proposal.arguments_summary();
    let message = if args.is_empty() {
        format!("Remediation executed: {} completed successfully", proposal.tool_name)
    } else {
        format!(
            "Remediation executed: {}({}) completed successfully",
            proposal.tool_name, args
        )
    };
    LogRecord::new(Severity::Info, SENTINEL_POD, message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};

    #[tokio::test(start_paused = true)]
    async fn test_execute_waits_for_delay() {
        let simulator = RemediationSimulator::new(Duration::from_secs(2));
        let proposal = ToolCall::new(
            "scale_deployment",
            json!({"deployment": "payment-service", "replicas": 5})
                .as_object()
                .cloned()
                .unwrap(),
            "OOM",
        );

        let started = tokio::time::Instant::now();
        let record = simulator.execute(IncidentId::new(), &proposal).await;

        assert!(started.elapsed() >= Duration::from_secs(2));
        assert_eq!(record.severity, Severity::Info);
        assert_eq!(record.source_pod, SENTINEL_POD);
        assert!(record.message.contains("scale_deployment"));
        assert!(record.message.contains("replicas=5"));
    }

    #[test]
    fn test_success_record_without_args() {
        let record = success_record(&ToolCall::new("cordon_node", Map::new(), ""));
        assert_eq!(
            record.message,
            "Remediation executed: cordon_node completed successfully"
        );
    }
}
