/// Minimal client for OpenAI-compatible `/chat/completions` hosts.
///
/// Two call shapes are supported: a buffered completion (used for single prompts and
/// prompts with images) and a streamed completion aggregated into one string (used for
/// conversations). Transient failures are retried with capped exponential backoff when
/// `max_retries` is above zero.
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use futures::StreamExt;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Clone, Debug)]
pub struct OpenAiClientConfig {
    pub base_url: String,
    /// Bearer token sent with every request. Local OpenAI-compatible hosts usually need none.
    pub api_key: Option<String>,
    /// Model used by the maintenance workflows. `None` leaves the AI features disabled.
    pub model: Option<String>,
    pub default_timeout: Duration,
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub max_error_body_bytes: usize,
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env_string(name)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl OpenAiClientConfig {
    /// Load the client configuration from environment variables.
    ///
    /// `OPENAI_BASE_URL`, `OPENAI_API_KEY`, `OPENAI_MODEL`, `OPENAI_TIMEOUT_SECS` (120),
    /// `OPENAI_MAX_RETRIES` (0), `OPENAI_RETRY_INITIAL_MS` (200), `OPENAI_RETRY_MAX_MS`
    /// (5000) and `OPENAI_MAX_ERROR_BODY_BYTES` (8192). Retries default to zero: a failed
    /// generation is reported to the user, who decides whether to try again.
    pub fn from_env() -> Self {
        let base_url =
            env_string("OPENAI_BASE_URL").unwrap_or_else(|| "https://api.openai.com/v1".to_string());
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: env_string("OPENAI_API_KEY"),
            model: env_string("OPENAI_MODEL"),
            default_timeout: Duration::from_secs(env_or("OPENAI_TIMEOUT_SECS", 120)),
            max_retries: env_or("OPENAI_MAX_RETRIES", 0),
            initial_backoff: Duration::from_millis(env_or("OPENAI_RETRY_INITIAL_MS", 200)),
            max_backoff: Duration::from_millis(env_or("OPENAI_RETRY_MAX_MS", 5_000)),
            max_error_body_bytes: env_or("OPENAI_MAX_ERROR_BODY_BYTES", 8 * 1024),
        }
    }

    /// Wait before retry number `retry` (starting at 0): doubled from the initial backoff,
    /// capped at the maximum, plus up to a quarter of jitter.
    fn retry_delay(&self, retry: u32) -> Duration {
        let factor = 1u128.checked_shl(retry).unwrap_or(u128::MAX);
        let base = self.initial_backoff.as_millis().saturating_mul(factor);
        let capped = base.min(self.max_backoff.as_millis()) as u64;
        let jitter = clock_jitter(std::cmp::max(1, capped / 4));
        Duration::from_millis(capped.saturating_add(jitter))
    }
}

/// Cheap jitter from the clock's sub-second nanos, in `0..=max`.
fn clock_jitter(max: u64) -> u64 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::from(d.subsec_nanos()))
        .unwrap_or(0);
    nanos % (max + 1)
}

#[derive(Debug, thiserror::Error)]
pub enum OpenAiClientError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("invalid response JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("upstream returned error: status={status} message={message}")]
    Upstream { status: StatusCode, message: String },

    #[error("upstream returned non-JSON error: status={status} body={body}")]
    UpstreamBody { status: StatusCode, body: String },

    #[error("streaming response ended without a completion")]
    StreamEnded,
}

impl OpenAiClientError {
    /// Timeouts, connection problems, rate limiting and 5xx answers are worth retrying.
    fn is_transient(&self) -> bool {
        match self {
            OpenAiClientError::Request(e) => e.is_timeout() || e.is_connect() || e.is_body(),
            OpenAiClientError::Upstream { status, .. }
            | OpenAiClientError::UpstreamBody { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            OpenAiClientError::InvalidJson(_) | OpenAiClientError::StreamEnded => false,
        }
    }
}

#[derive(Clone)]
pub struct OpenAiClient {
    config: OpenAiClientConfig,
    http: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(config: OpenAiClientConfig) -> Result<Self, OpenAiClientError> {
        let http = reqwest::Client::builder()
            .user_agent("gestor-predial/predial-server")
            .timeout(config.default_timeout)
            .build()?;
        Ok(Self { config, http })
    }

    pub fn config(&self) -> &OpenAiClientConfig {
        &self.config
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url)
    }

    async fn send(&self, request: &ChatCompletionRequest) -> Result<reqwest::Response, OpenAiClientError> {
        let mut builder = self.http.post(self.endpoint()).json(request);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder.send().await?;
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(upstream_error(response, self.config.max_error_body_bytes).await)
        }
    }

    /// Buffered completion.
    pub async fn complete(
        &self,
        model: &str,
        messages: Vec<Message>,
    ) -> Result<ChatCompletionResponse, OpenAiClientError> {
        let request = ChatCompletionRequest {
            model: model.to_string(),
            messages,
            stream: false,
        };
        let request = &request;
        self.with_retries(|| async move {
            let response = self.send(request).await?;
            let bytes = response.bytes().await?;
            Ok(serde_json::from_slice(&bytes)?)
        })
        .await
    }

    /// Streamed completion, returning the concatenated text deltas.
    pub async fn stream_text(&self, model: &str, messages: Vec<Message>) -> Result<String, OpenAiClientError> {
        let request = ChatCompletionRequest {
            model: model.to_string(),
            messages,
            stream: true,
        };
        let request = &request;
        self.with_retries(|| async move {
            let response = self.send(request).await?;
            let mut body = response.bytes_stream();
            let mut decoder = SseDecoder::default();
            let mut text = String::new();
            while let Some(chunk) = body.next().await {
                for event in decoder.push(&chunk?) {
                    if append_deltas(&event, &mut text) == StreamState::Done {
                        return Ok(text);
                    }
                }
            }
            // Some hosts close the stream without the [DONE] sentinel.
            if text.is_empty() {
                Err(OpenAiClientError::StreamEnded)
            } else {
                Ok(text)
            }
        })
        .await
    }

    async fn with_retries<T, F, Fut>(&self, mut attempt: F) -> Result<T, OpenAiClientError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, OpenAiClientError>>,
    {
        let mut retry = 0;
        loop {
            match attempt().await {
                Err(e) if retry < self.config.max_retries && e.is_transient() => {
                    let delay = self.config.retry_delay(retry);
                    warn!(retry, delay_ms = delay.as_millis(), error = %e, "chat completion failed, retrying");
                    tokio::time::sleep(delay).await;
                    retry += 1;
                }
                outcome => return outcome,
            }
        }
    }
}

async fn upstream_error(response: reqwest::Response, limit: usize) -> OpenAiClientError {
    let status = response.status();
    let body = match response.bytes().await {
        Ok(bytes) => String::from_utf8_lossy(&bytes[..bytes.len().min(limit)]).into_owned(),
        Err(e) => {
            warn!(error = %e, "failed to read upstream error body");
            String::new()
        }
    };
    match serde_json::from_str::<ErrorEnvelope>(&body) {
        Ok(envelope) => OpenAiClientError::Upstream {
            status,
            message: envelope
                .error
                .message
                .unwrap_or_else(|| "unknown upstream error".to_string()),
        },
        Err(_) => OpenAiClientError::UpstreamBody { status, body },
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

/// Splits a server-sent event byte stream into complete events.
///
/// Bytes are buffered until an event is complete, so a character split across
/// network chunks is decoded whole.
#[derive(Debug, Default)]
struct SseDecoder {
    pending: Vec<u8>,
}

impl SseDecoder {
    fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend(chunk.iter().copied().filter(|&b| b != b'\r'));
        let mut events = Vec::new();
        while let Some(end) = self.pending.windows(2).position(|w| w == b"\n\n") {
            let event: Vec<u8> = self.pending.drain(..end + 2).take(end).collect();
            events.push(String::from_utf8_lossy(&event).into_owned());
        }
        events
    }
}

#[derive(Debug, PartialEq, Eq)]
enum StreamState {
    Open,
    Done,
}

/// Append the text deltas carried by `event` to `text`.
fn append_deltas(event: &str, text: &mut String) -> StreamState {
    for data in event
        .lines()
        .filter_map(|line| line.trim().strip_prefix("data:"))
        .map(str::trim)
        .filter(|data| !data.is_empty())
    {
        if data == "[DONE]" {
            return StreamState::Done;
        }
        let Ok(chunk) = serde_json::from_str::<StreamChunk>(data) else {
            continue;
        };
        if let Some(piece) = chunk.choices.first().and_then(|c| c.delta.content.as_deref()) {
            text.push_str(piece);
        }
    }
    StreamState::Open
}

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub role: String,
    pub content: MessageContent,
}

impl Message {
    pub fn text(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: MessageContent::Text(content.into()),
        }
    }
}

/// Message body: plain text, or a list of parts when images travel with the prompt.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageUrl {
    /// `data:<mime>;base64,<payload>` URL.
    pub url: String,
}

#[derive(Debug, Clone, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionResponse {
    pub choices: Vec<ChatCompletionChoice>,
    pub usage: Option<ChatCompletionUsage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionChoice {
    pub message: ChatCompletionMessage,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionMessage {
    pub content: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionUsage {
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
}

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

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> OpenAiClientConfig {
        OpenAiClientConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            api_key: None,
            model: Some("modelo".to_string()),
            default_timeout: Duration::from_secs(1),
            max_retries: 2,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_millis(1_000),
            max_error_body_bytes: 1024,
        }
    }

    #[test]
    fn image_message_serializes_as_content_parts() {
        let message = Message {
            role: "user".to_string(),
            content: MessageContent::Parts(vec![
                ContentPart::Text {
                    text: "Analise".to_string(),
                },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: "data:image/png;base64,AAAA".to_string(),
                    },
                },
            ]),
        };
        let json = serde_json::to_value(&message).expect("serialize");
        assert_eq!(json["content"][0]["type"], "text");
        assert_eq!(json["content"][1]["type"], "image_url");
        assert_eq!(json["content"][1]["image_url"]["url"], "data:image/png;base64,AAAA");
    }

    #[test]
    fn text_message_serializes_as_plain_string() {
        let json = serde_json::to_value(Message::text("user", "olá")).expect("serialize");
        assert_eq!(json["content"], "olá");
    }

    #[test]
    fn stream_flag_only_sent_when_streaming() {
        let mut request = ChatCompletionRequest {
            model: "m".to_string(),
            messages: Vec::new(),
            stream: false,
        };
        let json = serde_json::to_value(&request).expect("serialize");
        assert!(json.get("stream").is_none());
        request.stream = true;
        let json = serde_json::to_value(&request).expect("serialize");
        assert_eq!(json["stream"], true);
    }

    #[test]
    fn sse_decoder_joins_split_events() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(b"data: {\"choices\":[{\"delta\":{\"con").is_empty());
        let events = decoder.push(b"tent\":\"Bom \"}}]}\r\n\r\ndata: [DONE]\n\n");
        assert_eq!(events.len(), 2);

        let mut text = String::new();
        assert_eq!(append_deltas(&events[0], &mut text), StreamState::Open);
        assert_eq!(append_deltas(&events[1], &mut text), StreamState::Done);
        assert_eq!(text, "Bom ");
    }

    #[test]
    fn sse_decoder_keeps_characters_split_across_chunks() {
        let event = "data: {\"choices\":[{\"delta\":{\"content\":\"manutenção\"}}]}\n\n".as_bytes();
        let cut = event
            .iter()
            .position(|&b| b == 0xC3)
            .expect("multibyte character")
            + 1;

        let mut decoder = SseDecoder::default();
        assert!(decoder.push(&event[..cut]).is_empty());
        let events = decoder.push(&event[cut..]);
        assert_eq!(events.len(), 1);

        let mut text = String::new();
        append_deltas(&events[0], &mut text);
        assert_eq!(text, "manutenção");
    }

    #[test]
    fn retry_delay_is_capped() {
        let config = config();
        let first = config.retry_delay(0);
        assert!(first >= Duration::from_millis(200) && first <= Duration::from_millis(250));
        let late = config.retry_delay(10);
        assert!(late >= Duration::from_millis(1_000) && late <= Duration::from_millis(1_250));
    }

    #[test]
    fn rate_limits_are_transient_but_bad_requests_are_not() {
        let limited = OpenAiClientError::Upstream {
            status: StatusCode::TOO_MANY_REQUESTS,
            message: "slow down".to_string(),
        };
        assert!(limited.is_transient());
        let bad = OpenAiClientError::UpstreamBody {
            status: StatusCode::BAD_REQUEST,
            body: "nope".to_string(),
        };
        assert!(!bad.is_transient());
    }
}
