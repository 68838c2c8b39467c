//! HTTP client for the analysis backend.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, Response};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use super::events::AnalysisEvent;
use super::stream::{EventStreamParser, SseFrame};
use crate::api::{
    AnalyzeResponse, ErrorBody, ExecuteRequest, ExecuteResponse, HealthResponse, ANALYZE_PATH,
    ANALYZE_STREAM_PATH, EXECUTE_PATH, HEALTH_PATH,
};
use crate::error::{SentinelError, SentinelResult};
use crate::incident::{ToolCall, DEFAULT_FALLBACK_TOOL};
use crate::logs::LogRecord;

/// Default backend location.
pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8000";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Receives the events of one analysis.
///
/// Fragments arrive in order and are not buffered by the client; a handler
/// that wants the full text concatenates them itself.
pub trait AnalysisHandler: Send {
    /// Reasoning fragment.
    fn on_reasoning(&mut self, _text: &str) {}

    /// Answer fragment.
    fn on_content(&mut self, _text: &str) {}

    /// Final proposal.
    fn on_result(&mut self, _proposal: ToolCall) {}

    /// Transport failure, bad status, or a backend-reported error.
    fn on_error(&mut self, _message: &str) {}
}

/// Something that can analyze a context window.
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Run one analysis, reporting through `handler`. Never fails: every
    /// failure is delivered as `on_error`.
    async fn analyze(&self, logs: &[LogRecord], handler: &mut dyn AnalysisHandler);
}

#[derive(Debug, Serialize)]
struct AnalyzeBody<'a> {
    logs: &'a [LogRecord],
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
}

/// Client for the analysis backend's HTTP API.
#[derive(Debug, Clone)]
pub struct AnalysisClient {
    client: Client,
    base_url: String,
    model: Option<String>,
    fallback_tool: String,
}

impl AnalysisClient {
    /// Create a client for the backend at `base_url`.
    pub fn new(base_url: impl Into<String>) -> SentinelResult<Self> {
        let client = Client::builder()
            .user_agent(concat!("kube-sentinel/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: None,
            fallback_tool: DEFAULT_FALLBACK_TOOL.to_string(),
        })
    }

    /// Ask the backend for a specific model instead of its default.
    #[must_use]
    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }

    /// Tool used when a `done` event omits `toolName`.
    #[must_use]
    pub fn with_fallback_tool(mut self, tool: impl Into<String>) -> Self {
        self.fallback_tool = tool.into();
        self
    }

    /// Backend base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn body<'a>(&'a self, logs: &'a [LogRecord]) -> AnalyzeBody<'a> {
        AnalyzeBody {
            logs,
            model: self.model.as_deref(),
        }
    }

    /// `GET /api/health`.
    pub async fn health(&self) -> SentinelResult<HealthResponse> {
        let response = self
            .client
            .get(self.url(HEALTH_PATH))
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    /// `POST /api/analyze`: one-shot analysis without fragments.
    pub async fn analyze(&self, logs: &[LogRecord]) -> SentinelResult<AnalyzeResponse> {
        let response = self
            .client
            .post(self.url(ANALYZE_PATH))
            .json(&self.body(logs))
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    /// `POST /api/execute`.
    pub async fn execute(
        &self,
        tool_name: &str,
        parameters: Map<String, Value>,
    ) -> SentinelResult<ExecuteResponse> {
        let request = ExecuteRequest {
            tool_name: tool_name.to_string(),
            parameters,
        };
        let response = self
            .client
            .post(self.url(EXECUTE_PATH))
            .json(&request)
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    /// `POST /api/analyze/stream`, dispatching each event to `handler` as it
    /// arrives. Failures are reported through `on_error` and end the call.
    pub async fn analyze_stream(&self, logs: &[LogRecord], handler: &mut dyn AnalysisHandler) {
        if let Err(e) = self.try_analyze_stream(logs, handler).await {
            warn!(error = %e, "Streaming analysis failed");
            handler.on_error(&e.to_string());
        }
    }

    async fn try_analyze_stream(
        &self,
        logs: &[LogRecord],
        handler: &mut dyn AnalysisHandler,
    ) -> SentinelResult<()> {
        info!(logs = logs.len(), backend = %self.base_url, "Requesting streaming analysis");

        let response = self
            .client
            .post(self.url(ANALYZE_STREAM_PATH))
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(&self.body(logs))
            .send()
            .await?;
        let response = check(response).await?;

        let mut parser = EventStreamParser::new();
        let mut stream = response.bytes_stream();
        let mut frames = 0usize;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            for frame in parser.feed(&chunk) {
                frames += 1;
                self.dispatch(&frame, handler);
            }
        }
        if let Some(frame) = parser.finish() {
            frames += 1;
            self.dispatch(&frame, handler);
        }

        debug!(frames, "Analysis stream closed");
        Ok(())
    }

    fn dispatch(&self, frame: &SseFrame, handler: &mut dyn AnalysisHandler) {
        match AnalysisEvent::decode(frame) {
            Ok(Some(AnalysisEvent::Thinking(text))) => handler.on_reasoning(&text),
            Ok(Some(AnalysisEvent::Content(text))) => handler.on_content(&text),
            Ok(Some(AnalysisEvent::Done(raw))) => {
                handler.on_result(raw.into_tool_call(&self.fallback_tool));
            }
            Ok(Some(AnalysisEvent::Error(message))) => handler.on_error(&message),
            Ok(None) => debug!(event = %frame.event, "Skipping unrecognized event"),
            Err(e) => warn!(event = %frame.event, error = %e, "Skipping malformed event"),
        }
    }
}

#[async_trait]
impl Analyzer for AnalysisClient {
    async fn analyze(&self, logs: &[LogRecord], handler: &mut dyn AnalysisHandler) {
        self.analyze_stream(logs, handler).await;
    }
}

/// Turn a non-success response into [`SentinelError::Api`], preferring the
/// backend's `detail` message over the raw body.
async fn check(response: Response) -> SentinelResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .map(|e| e.detail)
        .unwrap_or(body);
    Err(SentinelError::Api {
        status: status.as_u16(),
        message,
    })
}
