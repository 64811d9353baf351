//! Wire types and error taxonomy for the Ollama generate API.
//!
//! The streaming response body is newline-delimited JSON objects shaped
//! `{"response": "<fragment>", "done": false, ...}`. Each line is parsed
//! independently — a malformed line is skipped, never fatal.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("invalid Ollama endpoint: {0}")]
    InvalidEndpoint(String),
    #[error("cannot reach Ollama: {0}")]
    Unreachable(String),
    #[error("Ollama request timed out")]
    Timeout,
    #[error("Ollama returned HTTP {status}: {body}")]
    ServerError { status: u16, body: String },
    #[error("unparseable Ollama response: {0}")]
    MalformedResponse(String),
    /// The model's JSON did not match the two-field prompt-reply contract.
    #[error("model reply violated the expected schema: {0}")]
    SchemaViolation(String),
    /// Not a failure — the caller cancelled the request.
    #[error("generation cancelled")]
    Cancelled,
}

impl GenerateError {
    pub fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            GenerateError::Timeout
        } else if e.is_builder() {
            GenerateError::InvalidEndpoint(e.to_string())
        } else {
            GenerateError::Unreachable(e.to_string())
        }
    }
}

/// Ordered event on a streaming generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// The first text fragment. Separate from `Chunk` because it is what
    /// transitions the caller's UI out of its loading state.
    First(String),
    /// A subsequent fragment, to be appended in arrival order.
    Chunk(String),
    /// The server signalled completion.
    Done,
}

/// One line of the streaming body. Unknown fields are ignored.
#[derive(Debug, Deserialize)]
pub struct StreamLine {
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub done: bool,
}

/// Parse a single newline-delimited record. Returns `None` for blank or
/// malformed lines, which the stream loop skips.
pub fn parse_stream_line(line: &str) -> Option<StreamLine> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    serde_json::from_str(line).ok()
}

/// Non-streaming response body.
#[derive(Debug, Deserialize)]
pub struct GenerateResponse {
    pub response: String,
}

/// The CustomPrompt reply intent — the model must classify its own answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptIntent {
    /// Informational answer: display it.
    Question,
    /// Replacement text: paste it back.
    Generate,
}

/// Structured CustomPrompt reply — exactly two fields, validated against a
/// fixed schema before anything acts on it.
#[derive(Debug, Clone, Deserialize)]
pub struct PromptReply {
    #[serde(rename = "type")]
    pub intent: PromptIntent,
    pub response: String,
}

impl PromptReply {
    /// Parse and validate a raw model reply. Anything that is not valid
    /// JSON with both required fields (and a known `type`) is a
    /// `SchemaViolation`, not a crash.
    pub fn parse(raw: &str) -> Result<Self, GenerateError> {
        serde_json::from_str(raw.trim())
            .map_err(|e| GenerateError::SchemaViolation(format!("{e}; raw reply: {raw}")))
    }

    /// JSON schema sent as the request `format` field so the model is
    /// constrained to the two-field contract server-side as well.
    pub fn schema() -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "type": { "type": "string", "enum": ["question", "generate"] },
                "response": { "type": "string" }
            },
            "required": ["type", "response"]
        })
    }
}
