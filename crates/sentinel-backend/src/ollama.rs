//! Client for an Ollama-compatible chat API.
//!
//! Streaming responses arrive as newline-delimited JSON chunks:
//!
//! ```text
//! {"message":{"role":"assistant","content":"<think>The pod"},"done":false}
//! {"message":{"role":"assistant","content":"{\"toolName\":..."},"done":false}
//! {"message":{"role":"assistant","content":""},"done":true}
//! ```
//!
//! Reasoning may come either inline between `<think>` tags or in a separate
//! `message.thinking` field; both are surfaced as [`AnalysisEvent::Thinking`].

use std::time::Duration;

use futures::StreamExt;
use reqwest::Client;
use sentinel::incident::{DEFAULT_FALLBACK_TOOL, ToolCall};
use sentinel::{AnalysisEvent, LogRecord};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::BackendSettings;
use crate::error::{BackendError, BackendResult};
use crate::extract::extract_proposal;
use crate::prompt::{PromptBuilder, SYSTEM_PROMPT};

const CHAT_PATH: &str = "/api/chat";
const TAGS_PATH: &str = "/api/tags";
const CONNECTION_CHECK_TIMEOUT: Duration = Duration::from_secs(5);
const TEMPERATURE: f32 = 0.3;
const MAX_PREDICT: u32 = 2000;
const PREVIEW_CHARS: usize = 500;
const DEFAULT_REASON: &str = "AI analysis complete";

const THINK_OPEN: &str = "<think>";
const THINK_CLOSE: &str = "</think>";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    stream: bool,
    options: ChatOptions,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Default, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    message: ChunkMessage,
    #[serde(default)]
    done: bool,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkMessage {
    #[serde(default)]
    content: String,
    #[serde(default)]
    thinking: Option<String>,
}

/// Talks to the model server.
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
    prompts: PromptBuilder,
}

impl OllamaClient {
    pub fn new(settings: &BackendSettings) -> BackendResult<Self> {
        // Per-step limits: a slow answer that keeps sending chunks is never cut off.
        let client = Client::builder()
            .user_agent(concat!("sentinel-backend/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(settings.ollama_timeout())
            .read_timeout(settings.ollama_timeout())
            .build()?;
        Ok(Self {
            client,
            base_url: settings.ollama_host.trim_end_matches('/').to_string(),
            model: settings.ollama_model.clone(),
            prompts: PromptBuilder::new()?,
        })
    }

    /// Default model name.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Whether the model server answers `GET /api/tags`.
    pub async fn check_connection(&self) -> bool {
        let result = self
            .client
            .get(format!("{}{TAGS_PATH}", self.base_url))
            .timeout(CONNECTION_CHECK_TIMEOUT)
            .send()
            .await;
        match result {
            Ok(response) => response.status().is_success(),
            Err(err) => {
                debug!(error = %err, "Model server unreachable");
                false
            }
        }
    }

    /// Non-streaming analysis.
    ///
    /// Missing fields in the extracted object get defaults: the fallback
    /// tool, empty arguments and a generic reason.
    pub async fn analyze(&self, logs: &[LogRecord], model: Option<&str>) -> BackendResult<ToolCall> {
        let content = self.chat(logs, model).await?;
        let proposal = extract_proposal(&content).ok_or_else(|| BackendError::Unparseable {
            preview: preview(&content),
        })?;
        let mut call = proposal.into_tool_call(DEFAULT_FALLBACK_TOOL);
        if call.reason.is_empty() {
            call.reason = DEFAULT_REASON.to_string();
        }
        Ok(call)
    }

    /// One non-streaming chat round; returns the assistant's content.
    pub async fn chat(&self, logs: &[LogRecord], model: Option<&str>) -> BackendResult<String> {
        let user_prompt = self.prompts.user_prompt(logs)?;
        let model = model.unwrap_or(&self.model);
        info!(model, logs = logs.len(), "Requesting analysis");

        let response = self
            .client
            .post(format!("{}{CHAT_PATH}", self.base_url))
            .json(&chat_request(model, &user_prompt, false))
            .send()
            .await
            .map_err(BackendError::from_request)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), body = %body, "Model server returned an error");
            return Err(BackendError::Model {
                status: status.as_u16(),
            });
        }

        let chunk: ChatChunk = response.json().await.map_err(BackendError::from_request)?;
        Ok(chunk.message.content.trim().to_string())
    }

    /// Streamed analysis; every outcome, failures included, is sent on `tx`.
    ///
    /// Returns early without error if the receiver goes away.
    pub async fn chat_stream(
        &self,
        logs: &[LogRecord],
        model: Option<&str>,
        tx: mpsc::Sender<AnalysisEvent>,
    ) {
        if let Err(err) = self.try_chat_stream(logs, model, &tx).await {
            warn!(error = %err, "Streaming analysis failed");
            let _ = tx.send(AnalysisEvent::Error(err.to_string())).await;
        }
    }

    async fn try_chat_stream(
        &self,
        logs: &[LogRecord],
        model: Option<&str>,
        tx: &mpsc::Sender<AnalysisEvent>,
    ) -> BackendResult<()> {
        let user_prompt = self.prompts.user_prompt(logs)?;
        let model = model.unwrap_or(&self.model);
        info!(model, logs = logs.len(), "Requesting streamed analysis");

        let response = self
            .client
            .post(format!("{}{CHAT_PATH}", self.base_url))
            .json(&chat_request(model, &user_prompt, true))
            .send()
            .await
            .map_err(BackendError::from_request)?;

        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::Model {
                status: status.as_u16(),
            });
        }

        let mut reader = ChunkReader::default();
        let mut body = response.bytes_stream();
        while let Some(bytes) = body.next().await {
            let bytes = bytes.map_err(BackendError::from_request)?;
            for event in reader.feed(&bytes) {
                if tx.send(event).await.is_err() {
                    debug!("Analysis receiver closed; abandoning model stream");
                    return Ok(());
                }
            }
            if reader.is_finished() {
                return Ok(());
            }
        }

        for event in reader.finish() {
            if tx.send(event).await.is_err() {
                break;
            }
        }
        Ok(())
    }
}

fn chat_request<'a>(model: &'a str, user_prompt: &'a str, stream: bool) -> ChatRequest<'a> {
    ChatRequest {
        model,
        messages: [
            ChatMessage {
                role: "system",
                content: SYSTEM_PROMPT,
            },
            ChatMessage {
                role: "user",
                content: user_prompt,
            },
        ],
        stream,
        options: ChatOptions {
            temperature: TEMPERATURE,
            num_predict: MAX_PREDICT,
        },
    }
}

fn preview(text: &str) -> String {
    text.chars().take(PREVIEW_CHARS).collect()
}

/// Turns NDJSON chat chunks into analysis events.
#[derive(Debug, Default)]
pub struct ChunkReader {
    buffer: Vec<u8>,
    splitter: ThinkSplitter,
    full_content: String,
    finished: bool,
}

impl ChunkReader {
    /// Consume a body fragment. Lines may span fragments.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<AnalysisEvent> {
        self.buffer.extend_from_slice(bytes);
        let mut events = Vec::new();
        while !self.finished {
            let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') else {
                break;
            };
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            self.line(&line, &mut events);
        }
        events
    }

    /// End of body. Flushes a trailing line; reports a stream that never
    /// signalled `done`.
    pub fn finish(&mut self) -> Vec<AnalysisEvent> {
        let mut events = Vec::new();
        if !self.finished {
            let rest = std::mem::take(&mut self.buffer);
            self.line(&rest, &mut events);
        }
        if !self.finished {
            events.extend(self.splitter.finish());
            events.push(AnalysisEvent::Error(
                "Model stream ended before completion".to_string(),
            ));
            self.finished = true;
        }
        events
    }

    /// Whether the final chunk has been seen.
    pub const fn is_finished(&self) -> bool {
        self.finished
    }

    fn line(&mut self, line: &[u8], events: &mut Vec<AnalysisEvent>) {
        let line = String::from_utf8_lossy(line);
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        let chunk: ChatChunk = match serde_json::from_str(line) {
            Ok(chunk) => chunk,
            Err(err) => {
                debug!(error = %err, "Skipping malformed model chunk");
                return;
            }
        };

        if let Some(thinking) = chunk.message.thinking.filter(|t| !t.is_empty()) {
            events.push(AnalysisEvent::Thinking(thinking));
        }
        self.full_content.push_str(&chunk.message.content);
        events.extend(self.splitter.push(&chunk.message.content));

        if chunk.done {
            events.extend(self.splitter.finish());
            events.push(self.outcome());
            self.finished = true;
        }
    }

    fn outcome(&self) -> AnalysisEvent {
        match extract_proposal(&self.full_content) {
            Some(proposal) => AnalysisEvent::Done(proposal),
            None => {
                warn!(content = %self.full_content, "Model answer contained no proposal");
                AnalysisEvent::Error(
                    BackendError::Unparseable {
                        preview: preview(&self.full_content),
                    }
                    .to_string(),
                )
            }
        }
    }
}

/// Separates `<think>...</think>` reasoning from answer text across token
/// boundaries. Tags never reach the output; a tag split over two tokens is
/// held back until it can be recognised.
#[derive(Debug, Default)]
pub struct ThinkSplitter {
    in_think: bool,
    pending: String,
}

impl ThinkSplitter {
    pub fn push(&mut self, token: &str) -> Vec<AnalysisEvent> {
        self.pending.push_str(token);
        let mut events = Vec::new();
        loop {
            let tag = if self.in_think { THINK_CLOSE } else { THINK_OPEN };
            if let Some(pos) = self.pending.find(tag) {
                let before: String = self.pending.drain(..pos).collect();
                self.emit(before, &mut events);
                self.pending.drain(..tag.len());
                self.in_think = !self.in_think;
                continue;
            }
            let ready = self.pending.len() - partial_tag_len(&self.pending, tag);
            let text: String = self.pending.drain(..ready).collect();
            self.emit(text, &mut events);
            return events;
        }
    }

    /// Flush held-back text.
    pub fn finish(&mut self) -> Vec<AnalysisEvent> {
        let mut events = Vec::new();
        let rest = std::mem::take(&mut self.pending);
        self.emit(rest, &mut events);
        events
    }

    fn emit(&self, text: String, events: &mut Vec<AnalysisEvent>) {
        if text.is_empty() {
            return;
        }
        events.push(if self.in_think {
            AnalysisEvent::Thinking(text)
        } else {
            AnalysisEvent::Content(text)
        });
    }
}

/// Length of the longest proper prefix of `tag` that `text` ends with.
fn partial_tag_len(text: &str, tag: &str) -> usize {
    (1..tag.len())
        .rev()
        .find(|&n| text.ends_with(&tag[..n]))
        .unwrap_or(0)
}
