//! Error types for the incident pipeline.

use std::time::Duration;

use thiserror::Error;

/// Errors produced by the sentinel library.
#[derive(Debug, Error)]
pub enum SentinelError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Analysis backend answered with a non-success status
    #[error("Analysis backend error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Static scenario catalog failed validation
    #[error("Invalid scenario catalog: {0}")]
    Catalog(String),

    /// Operator command could not be parsed
    #[error("Invalid command: {0}")]
    Command(String),

    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An analysis did not finish in time
    #[error("Analysis timed out after {}s", .0.as_secs())]
    Timeout(Duration),
}

/// Result alias for sentinel operations.
pub type SentinelResult<T> = Result<T, SentinelError>;
