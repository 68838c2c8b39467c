//! Typed analysis events carried by the event stream.
//!
//! | event      | data                                       |
//! |------------|--------------------------------------------|
//! | `thinking` | `{"content": "<reasoning fragment>"}`      |
//! | `content`  | `{"content": "<answer fragment>"}`         |
//! | `done`     | `{"proposal": {"toolName", "args", "reason"}}` |
//! | `error`    | `{"content": "<message>"}`                 |

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::stream::SseFrame;
use crate::incident::ToolCall;

/// Event name for reasoning fragments.
pub const EVENT_THINKING: &str = "thinking";
/// Event name for answer fragments.
pub const EVENT_CONTENT: &str = "content";
/// Event name for the final proposal.
pub const EVENT_DONE: &str = "done";
/// Event name for backend-reported failures.
pub const EVENT_ERROR: &str = "error";

/// A decoded analysis event.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisEvent {
    /// Reasoning fragment
    Thinking(String),
    /// Answer fragment
    Content(String),
    /// Final proposal, possibly incomplete
    Done(RawProposal),
    /// Failure reported by the backend
    Error(String),
}

/// Proposal as it appears on the wire; every field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawProposal {
    #[serde(rename = "toolName", default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl RawProposal {
    /// Fill the gaps: `fallback_tool`, empty arguments, empty reason.
    #[must_use]
    pub fn into_tool_call(self, fallback_tool: &str) -> ToolCall {
        let arguments = match self.args {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        };
        ToolCall::new(
            self.tool_name
                .filter(|name| !name.trim().is_empty())
                .unwrap_or_else(|| fallback_tool.to_string()),
            arguments,
            self.reason.unwrap_or_default(),
        )
    }
}

impl From<ToolCall> for RawProposal {
    fn from(call: ToolCall) -> Self {
        Self {
            tool_name: Some(call.tool_name),
            args: Some(Value::Object(call.arguments)),
            reason: Some(call.reason),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct TextPayload {
    content: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct DonePayload {
    #[serde(default)]
    proposal: RawProposal,
}

impl AnalysisEvent {
    /// Decode a frame. `Ok(None)` for event names outside the protocol.
    pub fn decode(frame: &SseFrame) -> Result<Option<Self>, serde_json::Error> {
        let event = match frame.event.as_str() {
            EVENT_THINKING => Self::Thinking(text(&frame.data)?),
            EVENT_CONTENT => Self::Content(text(&frame.data)?),
            EVENT_ERROR => Self::Error(text(&frame.data)?),
            EVENT_DONE => {
                Self::Done(serde_json::from_str::<DonePayload>(&frame.data)?.proposal)
            }
            _ => return Ok(None),
        };
        Ok(Some(event))
    }

    /// Wire event name.
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::Thinking(_) => EVENT_THINKING,
            Self::Content(_) => EVENT_CONTENT,
            Self::Done(_) => EVENT_DONE,
            Self::Error(_) => EVENT_ERROR,
        }
    }

    /// Wire `data:` payload.
    #[must_use]
    pub fn data(&self) -> String {
        let payload = match self {
            Self::Thinking(content) | Self::Content(content) | Self::Error(content) => {
                serde_json::to_value(TextPayload {
                    content: content.clone(),
                })
            }
            Self::Done(proposal) => serde_json::to_value(DonePayload {
                proposal: proposal.clone(),
            }),
        };
        payload.map(|v| v.to_string()).unwrap_or_default()
    }

    /// Render as a complete event block, terminator included.
    #[must_use]
    pub fn to_frame_text(&self) -> String {
        format!("event: {}\ndata: {}\n\n", self.event_name(), self.data())
    }
}

fn text(data: &str) -> Result<String, serde_json::Error> {
    serde_json::from_str::<TextPayload>(data).map(|p| p.content)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(event: &str, data: &str) -> SseFrame {
        SseFrame {
            event: event.to_string(),
            data: data.to_string(),
        }
    }

    #[test]
    fn test_decode_fragments() {
        assert_eq!(
            AnalysisEvent::decode(&frame("thinking", r#"{"content":"A"}"#)).unwrap(),
            Some(AnalysisEvent::Thinking("A".to_string()))
        );
        assert_eq!(
            AnalysisEvent::decode(&frame("content", r#"{"content":"B"}"#)).unwrap(),
            Some(AnalysisEvent::Content("B".to_string()))
        );
        assert_eq!(
            AnalysisEvent::decode(&frame("error", r#"{"content":"Request timed out"}"#)).unwrap(),
            Some(AnalysisEvent::Error("Request timed out".to_string()))
        );
    }

    #[test]
    fn test_decode_done() {
        let event = AnalysisEvent::decode(&frame(
            "done",
            r#"{"proposal":{"toolName":"restart_pod","args":{"pod":"x"},"reason":"y"}}"#,
        ))
        .unwrap()
        .unwrap();
        let AnalysisEvent::Done(raw) = event else {
            panic!("expected done");
        };
        let call = raw.into_tool_call("scale_deployment");
        assert_eq!(call.tool_name, "restart_pod");
        assert_eq!(call.arguments["pod"], "x");
        assert_eq!(call.reason, "y");
    }

    #[test]
    fn test_done_defaults() {
        let Some(AnalysisEvent::Done(raw)) =
            AnalysisEvent::decode(&frame("done", r#"{"proposal":{"args":[1,2]}}"#)).unwrap()
        else {
            panic!("expected done");
        };
        let call = raw.into_tool_call("scale_deployment");
        assert_eq!(call.tool_name, "scale_deployment");
        assert!(call.arguments.is_empty());
        assert!(call.reason.is_empty());

        let Some(AnalysisEvent::Done(raw)) = AnalysisEvent::decode(&frame("done", "{}")).unwrap()
        else {
            panic!("expected done");
        };
        assert_eq!(raw, RawProposal::default());
    }

    #[test]
    fn test_unknown_event_is_none() {
        assert_eq!(
            AnalysisEvent::decode(&frame("message", r#"{"content":"x"}"#)).unwrap(),
            None
        );
    }

    #[test]
    fn test_malformed_json_is_error() {
        assert!(AnalysisEvent::decode(&frame("thinking", "{not json")).is_err());
        assert!(AnalysisEvent::decode(&frame("content", r#"{"text":"x"}"#)).is_err());
    }

    #[test]
    fn test_encode_decode_agree() {
        let event = AnalysisEvent::Content("line \"quoted\"\nnext".to_string());
        let frame = frame(event.event_name(), &event.data());
        assert_eq!(AnalysisEvent::decode(&frame).unwrap(), Some(event));

        let text = AnalysisEvent::Thinking("t".to_string()).to_frame_text();
        assert_eq!(text, "event: thinking\ndata: {\"content\":\"t\"}\n\n");
    }
}
