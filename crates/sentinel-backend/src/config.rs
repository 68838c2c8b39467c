//! Backend settings, read from flags or the environment.

use std::net::SocketAddr;
use std::time::Duration;

use clap::Args;

/// Default model server.
pub const DEFAULT_OLLAMA_HOST: &str = "http://ollama:11434";

/// Default model.
pub const DEFAULT_OLLAMA_MODEL: &str = "gpt-oss:20b";

/// Service name reported by `GET /`.
pub const SERVICE_NAME: &str = "KubeSentinel Analysis API";

/// Settings for the analysis backend.
#[derive(Debug, Clone, Args)]
pub struct BackendSettings {
    /// Address to listen on
    #[arg(long, env = "SENTINEL_BACKEND_LISTEN", default_value = "0.0.0.0:8000")]
    pub listen: SocketAddr,

    /// Ollama-compatible model server
    #[arg(long, env = "OLLAMA_HOST", default_value = DEFAULT_OLLAMA_HOST)]
    pub ollama_host: String,

    /// Model used when a request does not name one
    #[arg(long, env = "OLLAMA_MODEL", default_value = DEFAULT_OLLAMA_MODEL)]
    pub ollama_model: String,

    /// Seconds to wait for the model before giving up
    #[arg(long, env = "OLLAMA_TIMEOUT", default_value_t = 120)]
    pub ollama_timeout_secs: u64,

    /// Allowed CORS origins; `*` allows any
    #[arg(
        long = "cors-origin",
        env = "CORS_ORIGINS",
        value_delimiter = ',',
        default_values_t = [
            "http://localhost:3000".to_string(),
            "http://localhost:5173".to_string(),
            "http://frontend:80".to_string(),
        ]
    )]
    pub cors_origins: Vec<String>,

    /// Simulated duration of `POST /api/execute`, in milliseconds
    #[arg(long, env = "SENTINEL_EXECUTE_DELAY_MS", default_value_t = 2000)]
    pub execute_delay_ms: u64,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 8000)),
            ollama_host: DEFAULT_OLLAMA_HOST.to_string(),
            ollama_model: DEFAULT_OLLAMA_MODEL.to_string(),
            ollama_timeout_secs: 120,
            cors_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:5173".to_string(),
                "http://frontend:80".to_string(),
            ],
            execute_delay_ms: 2000,
        }
    }
}

impl BackendSettings {
    #[must_use]
    pub const fn ollama_timeout(&self) -> Duration {
        Duration::from_secs(self.ollama_timeout_secs)
    }

    #[must_use]
    pub const fn execute_delay(&self) -> Duration {
        Duration::from_millis(self.execute_delay_ms)
    }

    /// Whether every origin is allowed.
    #[must_use]
    pub fn allows_any_origin(&self) -> bool {
        self.cors_origins.iter().any(|o| o.trim() == "*")
    }
}
