//! Ollama generation client — non-streaming and streaming modes.
//!
//! Streaming consumes the chunked HTTP body with `response.chunk()`, splits
//! it on newlines, and republishes each record as an ordered `StreamEvent`
//! on an mpsc channel. The cancellation token is checked at every
//! suspension point; once it fires, no further event is emitted.

use super::prompts::{self, GenerationParams};
use super::types::{parse_stream_line, GenerateError, GenerateResponse, StreamEvent};
use crate::config::Config;
use crate::shortcuts::Operation;
use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Seam between the orchestrator and the inference server. Tests inject a
/// scripted backend here; production uses [`OllamaClient`].
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Block until the full response is available. Used for replace-style
    /// operations, where a complete answer is required before paste-back.
    /// Once `cancel` fires the request is abandoned and `Cancelled` is
    /// returned; no result may reach the caller after that.
    async fn generate(
        &self,
        op: Operation,
        text: &str,
        user_prompt: Option<&str>,
        cancel: CancellationToken,
    ) -> Result<String, GenerateError>;

    /// Start a streaming generation. The receiver yields fragments strictly
    /// in arrival order; the first fragment arrives as `StreamEvent::First`.
    /// Errors before the stream is established are returned here; a stream
    /// that dies midway simply closes the channel.
    async fn stream(
        &self,
        op: Operation,
        text: &str,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<StreamEvent>, GenerateError>;
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
    options: GenerationParams,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<serde_json::Value>,
}

pub struct OllamaClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
}

impl OllamaClient {
    pub fn new(config: &Config) -> Result<Self, GenerateError> {
        reqwest::Url::parse(&config.endpoint)
            .map_err(|e| GenerateError::InvalidEndpoint(format!("{}: {e}", config.endpoint)))?;
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(GenerateError::from_reqwest)?;
        Ok(Self {
            http,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
        })
    }

    fn request_body(
        &self,
        op: Operation,
        text: &str,
        user_prompt: Option<&str>,
        stream: bool,
    ) -> GenerateRequest<'_> {
        GenerateRequest {
            model: &self.model,
            prompt: prompts::build_prompt(op, text, user_prompt),
            stream,
            options: prompts::params_for(op),
            format: prompts::format_for(op),
        }
    }

    async fn post(
        &self,
        body: &GenerateRequest<'_>,
    ) -> Result<reqwest::Response, GenerateError> {
        let response = self
            .http
            .post(&self.endpoint)
            .json(body)
            .send()
            .await
            .map_err(GenerateError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerateError::ServerError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl GenerationBackend for OllamaClient {
    async fn generate(
        &self,
        op: Operation,
        text: &str,
        user_prompt: Option<&str>,
        cancel: CancellationToken,
    ) -> Result<String, GenerateError> {
        let start = std::time::Instant::now();
        let body = self.request_body(op, text, user_prompt, false);
        log::info!("[LLM] {} request ({} chars, non-streaming)", op.label(), text.len());

        let raw = tokio::select! {
            _ = cancel.cancelled() => {
                log::debug!("[LLM] {} cancelled after {}ms", op.label(), start.elapsed().as_millis());
                return Err(GenerateError::Cancelled);
            }
            raw = async {
                let response = self.post(&body).await?;
                response.text().await.map_err(GenerateError::from_reqwest)
            } => raw?,
        };
        let parsed: GenerateResponse = serde_json::from_str(&raw)
            .map_err(|e| GenerateError::MalformedResponse(format!("{e}")))?;

        log::info!("[LLM] {} complete in {}ms", op.label(), start.elapsed().as_millis());
        Ok(parsed.response.trim().to_string())
    }

    async fn stream(
        &self,
        op: Operation,
        text: &str,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<StreamEvent>, GenerateError> {
        let start = std::time::Instant::now();
        let body = self.request_body(op, text, None, true);
        log::info!("[LLM] {} request ({} chars, streaming)", op.label(), text.len());

        let response = self.post(&body).await?;
        log::info!("[LLM] TTFB: {}ms", start.elapsed().as_millis());

        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(pump_stream(response, tx, cancel, start));
        Ok(rx)
    }
}

/// Read the chunked body line by line, forwarding fragments in arrival
/// order until the server signals `done`, the stream ends, or the caller
/// cancels.
async fn pump_stream(
    mut response: reqwest::Response,
    tx: mpsc::Sender<StreamEvent>,
    cancel: CancellationToken,
    start: std::time::Instant,
) {
    let mut buffer = String::new();
    let mut first = true;

    loop {
        let chunk = tokio::select! {
            _ = cancel.cancelled() => {
                log::debug!("[LLM] Stream cancelled after {}ms", start.elapsed().as_millis());
                return;
            }
            chunk = response.chunk() => chunk,
        };

        match chunk {
            Ok(Some(bytes)) => {
                buffer.push_str(&String::from_utf8_lossy(&bytes));
                while let Some(pos) = buffer.find('\n') {
                    let line: String = buffer.drain(..=pos).collect();
                    if !forward_line(&line, &mut first, &tx, &cancel, start).await {
                        return;
                    }
                }
            }
            Ok(None) => break,
            Err(e) => {
                log::error!("[LLM] Stream error: {}", e);
                return;
            }
        }
    }

    // The body can end without a trailing newline.
    if !buffer.is_empty() {
        forward_line(&buffer.clone(), &mut first, &tx, &cancel, start).await;
    }
    log::info!("[LLM] Stream complete: {}ms", start.elapsed().as_millis());
}

/// Returns false when the stream is finished (done record, cancellation, or
/// receiver dropped).
async fn forward_line(
    line: &str,
    first: &mut bool,
    tx: &mpsc::Sender<StreamEvent>,
    cancel: &CancellationToken,
    start: std::time::Instant,
) -> bool {
    // One network chunk can carry several records; the token is consulted
    // per record so cancellation stops mid-chunk, not just at the next read.
    if cancel.is_cancelled() {
        return false;
    }
    // Malformed records are skipped, not fatal.
    let Some(record) = parse_stream_line(line) else {
        return true;
    };

    if !record.response.is_empty() {
        let event = if *first {
            log::info!("[LLM] TTFT: {}ms", start.elapsed().as_millis());
            *first = false;
            StreamEvent::First(record.response)
        } else {
            StreamEvent::Chunk(record.response)
        };
        if tx.send(event).await.is_err() {
            return false;
        }
    }

    if record.done {
        let _ = tx.send(StreamEvent::Done).await;
        return false;
    }
    true
}
