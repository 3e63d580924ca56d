//! Streaming chat-completion client.
//!
//! The [`CompletionStream`] trait is the seam between the answer service and
//! the language model: one call, one stream of text increments delivered over
//! a flume channel. [`OpenAiChat`] implements it against an OpenAI-compatible
//! `/chat/completions` endpoint with `stream: true`, decoding the SSE
//! `data:` lines into content deltas in a background task.
//!
//! Dropping the receiver cancels the request: the pump task exits on the
//! first failed send, which drops the HTTP response and closes the
//! connection.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Default chat model.
pub const DEFAULT_COMPLETION_MODEL: &str = "gpt-4o";

/// Default sampling temperature.
pub const DEFAULT_TEMPERATURE: f32 = 0.2;

/// Default completion token budget.
pub const DEFAULT_MAX_TOKENS: u32 = 5000;

/// Generous whole-stream timeout; answers arrive incrementally well before it.
const COMPLETION_TIMEOUT: Duration = Duration::from_secs(300);

/// Result type for completion operations.
pub type Result<T> = std::result::Result<T, CompletionError>;

/// Errors from the completion client.
#[derive(Error, Debug)]
pub enum CompletionError {
    /// Transport-level failure talking to the endpoint
    #[error("completion request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The endpoint answered with a non-success status
    #[error("completion API returned status {status}: {message}")]
    Api { status: u16, message: String },

    /// The configuration cannot produce a working client
    #[error("invalid completion configuration: {message}")]
    InvalidConfig { message: String },
}

impl CompletionError {
    /// Create an invalid configuration error with a custom message.
    pub fn invalid_config<S: Into<String>>(message: S) -> Self {
        CompletionError::InvalidConfig {
            message: message.into(),
        }
    }
}

/// Generation parameters sent with every chat request.
#[derive(Debug, Clone)]
pub struct CompletionParams {
    /// Model identifier
    pub model: String,
    /// Sampling temperature
    pub temperature: f32,
    /// Upper bound on generated tokens
    pub max_tokens: u32,
}

impl Default for CompletionParams {
    fn default() -> Self {
        Self {
            model: DEFAULT_COMPLETION_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

impl CompletionParams {
    /// Set the model identifier.
    pub fn with_model<S: Into<String>>(mut self, model: S) -> Self {
        self.model = model.into();
        self
    }

    /// Set the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the completion token budget.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// A streaming completion backend.
///
/// One call starts one generation; the returned channel yields text
/// increments in order and closes when the stream ends. A stream that dies
/// mid-generation yields a final `Err` item instead of silently truncating.
#[async_trait]
pub trait CompletionStream: Send + Sync {
    /// Start a generation and return the channel its increments arrive on.
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        params: &CompletionParams,
    ) -> Result<flume::Receiver<Result<String>>>;
}

/// Request body for the `/chat/completions` endpoint.
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

/// One SSE chunk of a streamed completion.
#[derive(Debug, Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

fn completions_endpoint(api_base_url: &str) -> String {
    format!("{}/chat/completions", api_base_url.trim_end_matches('/'))
}

/// What one decoded SSE line contributes to the stream.
enum SsePayload {
    /// Content deltas to forward
    Content(Vec<String>),
    /// End-of-stream sentinel
    Done,
    /// Comment, keep-alive, or role-only delta; nothing to forward
    Skip,
}

/// Decodes one SSE line into its payload.
///
/// Lines that do not start with `data:` and payloads that fail to parse are
/// skipped; the OpenAI stream interleaves keep-alives and role-only deltas
/// with content chunks.
fn parse_sse_line(line: &str) -> SsePayload {
    let line = line.trim_end();
    let Some(data) = line.strip_prefix("data:") else {
        return SsePayload::Skip;
    };
    let data = data.trim_start();
    if data == "[DONE]" {
        return SsePayload::Done;
    }
    match serde_json::from_str::<StreamChunk>(data) {
        Ok(chunk) => SsePayload::Content(
            chunk
                .choices
                .into_iter()
                .filter_map(|choice| choice.delta.content)
                .collect(),
        ),
        Err(e) => {
            debug!("skipping unparsable stream line: {e}");
            SsePayload::Skip
        }
    }
}

/// Streaming client for an OpenAI-compatible chat endpoint.
pub struct OpenAiChat {
    client: reqwest::Client,
    endpoint: String,
}

impl OpenAiChat {
    /// Create a client for the given endpoint and bearer token.
    ///
    /// # Arguments
    /// * `api_base_url` - Base URL such as `https://api.openai.com/v1/`
    /// * `api_key` - Bearer token baked into every request
    pub fn new(api_base_url: &str, api_key: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {}", api_key.trim()))
            .map_err(|_| CompletionError::invalid_config("api_key contains invalid header bytes"))?;
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(COMPLETION_TIMEOUT)
            .build()?;

        let endpoint = completions_endpoint(api_base_url);
        debug!("chat completion client initialized for {}", endpoint);

        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl CompletionStream for OpenAiChat {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        params: &CompletionParams,
    ) -> Result<flume::Receiver<Result<String>>> {
        let body = ChatRequest {
            model: &params.model,
            temperature: params.temperature,
            max_tokens: params.max_tokens,
            stream: true,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: user_prompt,
                },
            ],
        };

        let response = self.client.post(&self.endpoint).json(&body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(CompletionError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let (tx, rx) = flume::unbounded();
        tokio::spawn(pump_sse(response, tx));
        Ok(rx)
    }
}

/// Forwards decoded SSE content deltas until `[DONE]`, transport failure, or
/// a dropped receiver.
async fn pump_sse(response: reqwest::Response, tx: flume::Sender<Result<String>>) {
    let mut stream = response.bytes_stream();
    let mut buffer: Vec<u8> = Vec::new();

    while let Some(next) = stream.next().await {
        let bytes = match next {
            Ok(bytes) => bytes,
            Err(e) => {
                let _ = tx.send_async(Err(CompletionError::Request(e))).await;
                return;
            }
        };
        buffer.extend_from_slice(&bytes);

        while let Some(newline) = buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = buffer.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&line);

            match parse_sse_line(&line) {
                SsePayload::Done => return,
                SsePayload::Skip => {}
                SsePayload::Content(deltas) => {
                    for delta in deltas {
                        if tx.send_async(Ok(delta)).await.is_err() {
                            // Receiver dropped; the caller abandoned the answer.
                            return;
                        }
                    }
                }
            }
        }
    }
}
