//! Static catalogs for the simulated cluster.

use crate::error::{SentinelError, SentinelResult};
use crate::incident::REMEDIATION_TOOLS;

/// A scripted failure: ordered ERROR lines from one pod, plus the tool that
/// would fix it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CriticalScenario {
    /// Short identifier used in logs
    pub name: &'static str,
    /// Messages, emitted in this exact order
    pub messages: &'static [&'static str],
    /// Pod every scenario record is attributed to
    pub target_pod: &'static str,
    /// Remediation tool that fits this failure
    pub suggested_tool: &'static str,
}

/// Everything the generator draws from.
#[derive(Debug, Clone, Copy)]
pub struct Catalog {
    /// Pods for routine records
    pub pods: &'static [&'static str],
    /// Routine INFO messages
    pub info_messages: &'static [&'static str],
    /// Routine WARN messages
    pub warn_messages: &'static [&'static str],
    /// Critical scenarios
    pub scenarios: &'static [CriticalScenario],
}

impl Catalog {
    /// The built-in cluster catalog.
    #[must_use]
    pub const fn builtin() -> Self {
        Self {
            pods: PODS,
            info_messages: INFO_MESSAGES,
            warn_messages: WARN_MESSAGES,
            scenarios: SCENARIOS,
        }
    }

    /// Check the catalog can never run dry.
    pub fn validate(&self) -> SentinelResult<()> {
        if self.pods.is_empty() {
            return Err(SentinelError::Catalog("pod catalog is empty".to_string()));
        }
        if self.info_messages.is_empty() || self.warn_messages.is_empty() {
            return Err(SentinelError::Catalog(
                "routine message catalog is empty".to_string(),
            ));
        }
        if self.scenarios.is_empty() {
            return Err(SentinelError::Catalog(
                "scenario catalog is empty".to_string(),
            ));
        }
        for scenario in self.scenarios {
            if scenario.messages.is_empty() {
                return Err(SentinelError::Catalog(format!(
                    "scenario '{}' has no messages",
                    scenario.name
                )));
            }
            if !REMEDIATION_TOOLS.contains(&scenario.suggested_tool) {
                return Err(SentinelError::Catalog(format!(
                    "scenario '{}' suggests unknown tool '{}'",
                    scenario.name, scenario.suggested_tool
                )));
            }
        }
        Ok(())
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::builtin()
    }
}

const PODS: &[&str] = &[
    "api-gateway-6c4d1",
    "auth-service-5f8b2",
    "payment-service-7d9cf",
    "inventory-service-9a3e7",
    "notification-worker-2b8f4",
    "frontend-web-8e2a5",
    "redis-cache-0",
    "postgres-primary-0",
];

const INFO_MESSAGES: &[&str] = &[
    "GET /api/v1/orders 200 OK (42ms)",
    "POST /api/v1/checkout 201 Created (118ms)",
    "Health check passed",
    "Cache hit ratio: 94.2%",
    "Processed 128 messages from queue 'notifications'",
    "Connection pool stats: active=12 idle=38 max=50",
    "Scheduled job 'cleanup-sessions' completed in 1.3s",
    "TLS certificate valid for 61 more days",
    "Readiness probe succeeded",
    "User session refreshed",
];

const WARN_MESSAGES: &[&str] = &[
    "Response time above threshold: 1.8s on /api/v1/search",
    "Retrying request to inventory-service (attempt 2/3)",
    "Memory usage at 78% of limit",
    "Deprecated API version v1beta1 called by client",
    "Slow query detected (2.4s): SELECT * FROM orders WHERE ...",
    "Rate limit approaching for tenant 'acme' (850/1000 req/min)",
];

const SCENARIOS: &[CriticalScenario] = &[
    CriticalScenario {
        name: "payment-oom",
        messages: &[
            "Java heap space: allocation of 64MB failed",
            "GC overhead limit exceeded, pause 4.2s",
            "Container payment-service exceeded memory limit (512Mi)",
            "OOMKilled: container restarted (restart count 3)",
            "Upstream checkout requests failing: 503 Service Unavailable",
        ],
        target_pod: "payment-service-7d9cf",
        suggested_tool: "scale_deployment",
    },
    CriticalScenario {
        name: "auth-bad-rollout",
        messages: &[
            "Failed to load config: missing key 'JWT_SIGNING_KEY'",
            "panic: nil pointer dereference in token validator",
            "Back-off restarting failed container (CrashLoopBackOff)",
            "Deployment auth-service revision 14 unavailable: 0/3 replicas ready",
        ],
        target_pod: "auth-service-5f8b2",
        suggested_tool: "rollback_deployment",
    },
    CriticalScenario {
        name: "node-disk-pressure",
        messages: &[
            "Node worker-3 condition DiskPressure=True",
            "Evicting pod: ephemeral storage usage exceeds 95%",
            "Failed to write WAL segment: no space left on device",
            "Kubelet image garbage collection failed on worker-3",
        ],
        target_pod: "postgres-primary-0",
        suggested_tool: "drain_node",
    },
    CriticalScenario {
        name: "inventory-db-exhaustion",
        messages: &[
            "Connection pool exhausted: 50/50 connections in use",
            "Timeout acquiring connection after 30000ms",
            "Request handler blocked for 45s, liveness probe failed",
            "Service inventory-service returning 500 on 87% of requests",
        ],
        target_pod: "inventory-service-9a3e7",
        suggested_tool: "restart_pod",
    },
    CriticalScenario {
        name: "gateway-traffic-flood",
        messages: &[
            "Request rate 48000 req/s from 203.0.113.0/24 exceeds baseline by 40x",
            "Upstream connect error: too many open files",
            "Circuit breaker OPEN for route /api/v1/login",
            "Gateway dropping 62% of inbound connections",
        ],
        target_pod: "api-gateway-6c4d1",
        suggested_tool: "apply_network_policy",
    },
    CriticalScenario {
        name: "cache-cpu-throttle",
        messages: &[
            "CPU throttling at 92% for container redis",
            "Command latency p99 1200ms (threshold 50ms)",
            "Replica sync lagging 38s behind primary",
        ],
        target_pod: "redis-cache-0",
        suggested_tool: "update_resource_limits",
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalog_is_valid() {
        assert!(Catalog::builtin().validate().is_ok());
    }

    #[test]
    fn test_rejects_empty_scenarios() {
        let catalog = Catalog {
            scenarios: &[],
            ..Catalog::builtin()
        };
        let err = catalog.validate().unwrap_err();
        assert!(err.to_string().contains("scenario catalog is empty"));
    }

    #[test]
    fn test_rejects_empty_scenario_messages() {
        const BROKEN: &[CriticalScenario] = &[CriticalScenario {
            name: "hollow",
            messages: &[],
            target_pod: "x-0",
            suggested_tool: "restart_pod",
        }];
        let catalog = Catalog {
            scenarios: BROKEN,
            ..Catalog::builtin()
        };
        assert!(catalog.validate().unwrap_err().to_string().contains("hollow"));
    }

    #[test]
    fn test_rejects_unknown_tool() {
        const BROKEN: &[CriticalScenario] = &[CriticalScenario {
            name: "mystery",
            messages: &["boom"],
            target_pod: "x-0",
            suggested_tool: "reboot_datacenter",
        }];
        let catalog = Catalog {
            scenarios: BROKEN,
            ..Catalog::builtin()
        };
        assert!(catalog
            .validate()
            .unwrap_err()
            .to_string()
            .contains("reboot_datacenter"));
    }

    #[test]
    fn test_rejects_empty_pods() {
        let catalog = Catalog {
            pods: &[],
            ..Catalog::builtin()
        };
        assert!(catalog.validate().is_err());
    }
}
