//! HTTP wire types shared by the analysis client and the backend service.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::incident::ToolCall;
use crate::logs::LogRecord;

/// Backend health endpoint.
pub const HEALTH_PATH: &str = "/api/health";

/// Non-streaming analysis endpoint.
pub const ANALYZE_PATH: &str = "/api/analyze";

/// Event-stream analysis endpoint.
pub const ANALYZE_STREAM_PATH: &str = "/api/analyze/stream";

/// Remediation execution endpoint (not used by the simulated path).
pub const EXECUTE_PATH: &str = "/api/execute";

/// `GET /api/health` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    /// "healthy" or "degraded"
    pub status: String,
    /// Whether the model server answered
    #[serde(alias = "ollama_connected")]
    pub backend_connected: bool,
    /// Model the backend is configured for
    pub model: String,
}

/// Body of both analysis endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    /// Context window to analyze
    pub logs: Vec<LogRecord>,
    /// Model override; the backend default when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// `POST /api/analyze` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    /// Whether a proposal is attached
    pub success: bool,
    /// The proposal
    #[serde(default)]
    pub proposal: Option<ToolCall>,
    /// Why the proposal is a fallback, if it is one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// `POST /api/execute` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteRequest {
    /// Tool to run
    pub tool_name: String,
    /// Tool parameters
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

/// `POST /api/execute` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteResponse {
    /// "success" on completion
    pub status: String,
    /// Human-readable outcome
    pub message: String,
    /// Echo of what was done
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// Error body returned by the backend on non-success statuses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Error description
    pub detail: String,
}
