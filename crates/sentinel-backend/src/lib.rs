//! Analysis backend for KubeSentinel.
//!
//! Accepts a window of log records, asks an Ollama-compatible model for a
//! remediation, and streams the model's reasoning and final proposal back
//! over server-sent events using the event names the `sentinel` client
//! decodes (`thinking`, `content`, `done`, `error`).

pub mod config;
pub mod error;
pub mod extract;
pub mod ollama;
pub mod prompt;
pub mod server;

pub use config::BackendSettings;
pub use error::{BackendError, BackendResult};
pub use extract::extract_proposal;
pub use ollama::{ChunkReader, OllamaClient, ThinkSplitter};
pub use server::{build_router, run_server, AppState};
