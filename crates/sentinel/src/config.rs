//! Persisted monitor preferences.
//!
//! Stored as camelCase JSON (`sentinel.json` by default). Every field has a
//! default, so a partial or missing file is fine.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::analysis::DEFAULT_BACKEND_URL;
use crate::error::{SentinelError, SentinelResult};
use crate::factory::DEFAULT_CONTEXT_WINDOW;
use crate::generator::{DEFAULT_CRITICAL_PROBABILITY, DEFAULT_WARN_PROBABILITY};
use crate::incident::{DEFAULT_FALLBACK_TOOL, REMEDIATION_TOOLS};

/// Default preferences file name.
pub const DEFAULT_CONFIG_FILE: &str = "sentinel.json";

/// Upper bound on the context window handed to the model.
pub const MAX_CONTEXT_WINDOW: usize = 200;

/// Monitor configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentinelConfig {
    /// Analysis backend base URL
    #[serde(default = "default_backend_url")]
    pub backend_url: String,

    /// Model override sent with each analysis
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Records snapshotted into each incident
    #[serde(default = "default_context_window")]
    pub context_window: usize,

    /// Generator tick interval
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Chance a routine tick starts a critical scenario
    #[serde(default = "default_critical_probability")]
    pub critical_probability: f64,

    /// Chance a routine record is WARN
    #[serde(default = "default_warn_probability")]
    pub warn_probability: f64,

    /// Simulated remediation time
    #[serde(default = "default_remediation_delay_ms")]
    pub remediation_delay_ms: u64,

    /// Upper bound on one analysis; 0 disables the bound
    #[serde(default = "default_analysis_timeout_secs")]
    pub analysis_timeout_secs: u64,

    /// Tool assumed when a proposal omits `toolName`
    #[serde(default = "default_fallback_tool")]
    pub fallback_tool: String,

    /// Log records kept in memory for `status`
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

fn default_backend_url() -> String {
    DEFAULT_BACKEND_URL.to_string()
}

const fn default_context_window() -> usize {
    DEFAULT_CONTEXT_WINDOW
}

const fn default_tick_interval_ms() -> u64 {
    1000
}

const fn default_critical_probability() -> f64 {
    DEFAULT_CRITICAL_PROBABILITY
}

const fn default_warn_probability() -> f64 {
    DEFAULT_WARN_PROBABILITY
}

const fn default_remediation_delay_ms() -> u64 {
    2000
}

const fn default_analysis_timeout_secs() -> u64 {
    120
}

fn default_fallback_tool() -> String {
    DEFAULT_FALLBACK_TOOL.to_string()
}

const fn default_history_limit() -> usize {
    200
}

impl Default for SentinelConfig {
    fn default() -> Self {
        Self {
            backend_url: default_backend_url(),
            model: None,
            context_window: default_context_window(),
            tick_interval_ms: default_tick_interval_ms(),
            critical_probability: default_critical_probability(),
            warn_probability: default_warn_probability(),
            remediation_delay_ms: default_remediation_delay_ms(),
            analysis_timeout_secs: default_analysis_timeout_secs(),
            fallback_tool: default_fallback_tool(),
            history_limit: default_history_limit(),
        }
    }
}

impl SentinelConfig {
    /// Load from `path`, falling back to defaults when there is no file.
    pub fn load(path: Option<&Path>) -> SentinelResult<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Write as pretty JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> SentinelResult<()> {
        self.validate()?;
        let content = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject values the monitor cannot run with.
    pub fn validate(&self) -> SentinelResult<()> {
        if !(self.backend_url.starts_with("http://") || self.backend_url.starts_with("https://")) {
            return Err(SentinelError::Config(format!(
                "backendUrl must be an http(s) URL, got '{}'",
                self.backend_url
            )));
        }
        if self.context_window == 0 || self.context_window > MAX_CONTEXT_WINDOW {
            return Err(SentinelError::Config(format!(
                "contextWindow must be between 1 and {MAX_CONTEXT_WINDOW}, got {}",
                self.context_window
            )));
        }
        if self.tick_interval_ms == 0 {
            return Err(SentinelError::Config(
                "tickIntervalMs must be greater than 0".to_string(),
            ));
        }
        for (name, value) in [
            ("criticalProbability", self.critical_probability),
            ("warnProbability", self.warn_probability),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(SentinelError::Config(format!(
                    "{name} must be between 0 and 1, got {value}"
                )));
            }
        }
        if !REMEDIATION_TOOLS.contains(&self.fallback_tool.as_str()) {
            return Err(SentinelError::Config(format!(
                "fallbackTool '{}' is not a known remediation tool",
                self.fallback_tool
            )));
        }
        if self.history_limit == 0 {
            return Err(SentinelError::Config(
                "historyLimit must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Generator tick interval.
    #[must_use]
    pub const fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Simulated remediation time.
    #[must_use]
    pub const fn remediation_delay(&self) -> Duration {
        Duration::from_millis(self.remediation_delay_ms)
    }

    /// Analysis bound, `None` when disabled.
    #[must_use]
    pub fn analysis_timeout(&self) -> Option<Duration> {
        (self.analysis_timeout_secs > 0).then(|| Duration::from_secs(self.analysis_timeout_secs))
    }
}
