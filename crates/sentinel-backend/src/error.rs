//! Backend errors and their HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use sentinel::api::ErrorBody;
use thiserror::Error;

/// Result alias for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;

/// Errors raised while serving analysis requests.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Ollama error: {status}")]
    Model { status: u16 },

    #[error("Request timed out")]
    Timeout,

    #[error("Could not parse response as JSON. Response preview: {preview}")]
    Unparseable { preview: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid prompt template: {0}")]
    TemplateSyntax(#[from] handlebars::TemplateError),

    #[error("Prompt rendering failed: {0}")]
    Template(#[from] handlebars::RenderError),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("{0}")]
    Validation(String),
}

impl BackendError {
    /// Fold reqwest timeouts into [`BackendError::Timeout`].
    pub fn from_request(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Http(err)
        }
    }

    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::UnknownTool(_) => StatusCode::BAD_REQUEST,
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Model { .. } | Self::Http(_) | Self::Unparseable { .. } => StatusCode::BAD_GATEWAY,
            Self::Timeout => StatusCode::GATEWAY_TIMEOUT,
            Self::Serialization(_) | Self::TemplateSyntax(_) | Self::Template(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for BackendError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
        (
            status,
            Json(ErrorBody {
                detail: self.to_string(),
            }),
        )
            .into_response()
    }
}
