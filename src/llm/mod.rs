//! LLM domain — prompt construction, the Ollama client, and the streaming
//! protocol.
//!
//! External code should only use what is re-exported here:
//!   - client.rs  — GenerationBackend trait + OllamaClient
//!   - prompts.rs — canonical per-operation templates and parameters
//!   - types.rs   — wire records, StreamEvent, error taxonomy

pub mod client;
pub mod prompts;
pub mod types;

pub use client::{GenerationBackend, OllamaClient};
pub use types::{GenerateError, PromptIntent, PromptReply, StreamEvent};
