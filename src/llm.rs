use crate::config::Config;
use crate::session::Message;
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Sampling defaults applied to every turn
pub const DEFAULT_TEMPERATURE: f32 = 0.6;
pub const DEFAULT_TOP_P: f32 = 1.0;
pub const DEFAULT_MAX_TOKENS: u32 = 1024;

/// Failure of a remote completion call
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("no API key provided")]
    MissingApiKey,

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("authentication failed ({status}): {message}")]
    Unauthorized { status: u16, message: String },

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("malformed stream: {0}")]
    Malformed(String),
}

/// Lazy, finite sequence of response fragments
pub type FragmentStream = BoxStream<'static, Result<String, CompletionError>>;

/// Body of a chat-completions call
#[derive(Debug, Clone, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
    pub stream: bool,
}

impl CompletionRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: DEFAULT_TEMPERATURE,
            top_p: DEFAULT_TOP_P,
            max_tokens: DEFAULT_MAX_TOKENS,
            stream: true,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.top_p = top_p;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Model choice plus sampling parameters for one turn
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSettings {
    pub model: String,
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
}

impl ModelSettings {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            temperature: DEFAULT_TEMPERATURE,
            top_p: DEFAULT_TOP_P,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    pub fn from_config(config: &Config, model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            temperature: config.temperature,
            top_p: config.top_p,
            max_tokens: config.max_tokens,
        }
    }

    pub fn request(&self, messages: Vec<Message>) -> CompletionRequest {
        CompletionRequest::new(self.model.clone(), messages)
            .with_temperature(self.temperature)
            .with_top_p(self.top_p)
            .with_max_tokens(self.max_tokens)
    }
}

/// Anything that can turn a request into a stream of fragments
pub trait CompletionBackend: Send + Sync {
    fn stream_completion(&self, request: CompletionRequest) -> FragmentStream;
}

#[derive(Deserialize)]
struct ChunkDelta {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    delta: ChunkDelta,
}

#[derive(Deserialize)]
struct ChunkError {
    message: String,
}

#[derive(Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    error: Option<ChunkError>,
}

/// What one `data:` line carried
#[derive(Debug, PartialEq)]
pub enum SseEvent {
    Fragment(String),
    Done,
    Skip,
}

/// Interpret a single SSE line from the completion stream
pub fn parse_sse_line(line: &str) -> Result<SseEvent, CompletionError> {
    let Some(data) = line.strip_prefix("data:").map(str::trim) else {
        return Ok(SseEvent::Skip);
    };
    if data.is_empty() {
        return Ok(SseEvent::Skip);
    }
    if data == "[DONE]" {
        return Ok(SseEvent::Done);
    }

    let chunk: CompletionChunk =
        serde_json::from_str(data).map_err(|e| CompletionError::Malformed(format!("{e}: {data}")))?;

    if let Some(error) = chunk.error {
        return Err(CompletionError::Api {
            status: 200,
            message: error.message,
        });
    }

    let content = chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .filter(|content| !content.is_empty());

    Ok(content.map_or(SseEvent::Skip, SseEvent::Fragment))
}

/// Splits a byte stream into complete lines, keeping partial lines
/// (and partial UTF-8 sequences) buffered until the rest arrives.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            lines.push(String::from_utf8_lossy(&line).trim().to_string());
        }
        lines
    }

    /// Whatever is left once the body ends without a trailing newline
    pub fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let rest = String::from_utf8_lossy(&self.buffer).trim().to_string();
        self.buffer.clear();
        (!rest.is_empty()).then_some(rest)
    }
}

/// HTTP client for OpenAI-compatible streaming chat completions
#[derive(Clone)]
pub struct CompletionClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl CompletionClient {
    pub fn new(config: &Config, api_key: Option<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|key| !key.trim().is_empty()),
        })
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    async fn open(
        client: reqwest::Client,
        url: String,
        api_key: String,
        request: CompletionRequest,
    ) -> Result<reqwest::Response, CompletionError> {
        info!(model = %request.model, messages = request.messages.len(), "requesting completion");

        let response = client
            .post(&url)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = error_summary(&body);
        warn!(status = status.as_u16(), "completion request rejected");

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            Err(CompletionError::Unauthorized {
                status: status.as_u16(),
                message,
            })
        } else {
            Err(CompletionError::Api {
                status: status.as_u16(),
                message,
            })
        }
    }
}

/// Pull `error.message` out of a JSON error body, or fall back to the raw text
fn error_summary(body: &str) -> String {
    let trimmed = body.trim();
    serde_json::from_str::<serde_json::Value>(trimmed)
        .ok()
        .and_then(|value| {
            value
                .pointer("/error/message")
                .or_else(|| value.get("message"))
                .and_then(|m| m.as_str())
                .map(str::to_owned)
        })
        .unwrap_or_else(|| {
            if trimmed.is_empty() {
                "<empty body>".to_string()
            } else {
                trimmed.to_string()
            }
        })
}

enum StreamState {
    Pending(reqwest::Client, String, String, CompletionRequest),
    Reading {
        body: Option<BoxStream<'static, reqwest::Result<Vec<u8>>>>,
        decoder: SseDecoder,
        ready: VecDeque<String>,
    },
    Finished,
}

impl CompletionBackend for CompletionClient {
    fn stream_completion(&self, request: CompletionRequest) -> FragmentStream {
        let Some(api_key) = self.api_key.clone() else {
            return stream::once(async { Err(CompletionError::MissingApiKey) }).boxed();
        };

        let initial = StreamState::Pending(self.client.clone(), self.endpoint(), api_key, request);

        stream::unfold(initial, |mut state| async move {
            loop {
                match state {
                    StreamState::Finished => return None,
                    StreamState::Pending(client, url, key, request) => {
                        match Self::open(client, url, key, request).await {
                            Ok(response) => {
                                let body = response
                                    .bytes_stream()
                                    .map(|chunk| chunk.map(|bytes| bytes.to_vec()))
                                    .boxed();
                                state = StreamState::Reading {
                                    body: Some(body),
                                    decoder: SseDecoder::new(),
                                    ready: VecDeque::new(),
                                };
                            }
                            Err(e) => return Some((Err(e), StreamState::Finished)),
                        }
                    }
                    StreamState::Reading {
                        mut body,
                        mut decoder,
                        mut ready,
                    } => {
                        if let Some(line) = ready.pop_front() {
                            match parse_sse_line(&line) {
                                Ok(SseEvent::Fragment(text)) => {
                                    return Some((Ok(text), StreamState::Reading { body, decoder, ready }));
                                }
                                Ok(SseEvent::Done) => {
                                    debug!("completion stream finished");
                                    return None;
                                }
                                Ok(SseEvent::Skip) => {
                                    state = StreamState::Reading { body, decoder, ready };
                                }
                                Err(e) => return Some((Err(e), StreamState::Finished)),
                            }
                            continue;
                        }

                        let Some(open_body) = body.as_mut() else {
                            debug!("completion body closed without [DONE]");
                            return None;
                        };

                        match open_body.next().await {
                            Some(Ok(bytes)) => ready.extend(decoder.feed(&bytes)),
                            Some(Err(e)) => return Some((Err(CompletionError::Network(e)), StreamState::Finished)),
                            None => {
                                // flush an unterminated last line before ending
                                body = None;
                                ready.extend(decoder.finish());
                            }
                        }
                        state = StreamState::Reading { body, decoder, ready };
                    }
                }
            }
        })
        .boxed()
    }
}
