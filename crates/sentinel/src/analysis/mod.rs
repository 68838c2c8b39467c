//! Streaming analysis client.
//!
//! Sends an incident's context window to the analysis backend and turns the
//! event-stream response into handler callbacks.

pub mod client;
pub mod events;
pub mod stream;

pub use client::{AnalysisClient, AnalysisHandler, Analyzer, DEFAULT_BACKEND_URL};
pub use events::{AnalysisEvent, RawProposal};
pub use stream::{EventStreamParser, SseFrame};
