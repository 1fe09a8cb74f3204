//! OpenAI-compatible chat-completions client (OpenRouter by default).
//!
//! One [`ChatClient`] is shared by the four stage backends; each wrapper
//! fixes the model, system prompt and sampling parameters for its stage.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue, RETRY_AFTER};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use super::{AssistantBackend, BackendError, MaskingBackend, ReasoningBackend, ResearchBackend};
use crate::prompts;

/// Default API root.
pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

// ============================================================================
// Client configuration
// ============================================================================

/// Connection settings for [`ChatClient`].
#[derive(Clone)]
pub struct ChatClientConfig {
    /// API root; `/chat/completions` is appended
    pub base_url: String,
    /// Bearer token
    pub api_key: String,
    /// Sent as `HTTP-Referer`
    pub referer: Option<String>,
    /// Sent as `X-Title`
    pub title: Option<String>,
    /// Whole-request timeout
    pub timeout: Duration,
    /// Connect timeout
    pub connect_timeout: Duration,
    /// Responses larger than this are rejected
    pub max_response_bytes: usize,
}

impl Default for ChatClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: String::new(),
            referer: None,
            title: Some("theo".to_string()),
            timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
            max_response_bytes: 4 * 1024 * 1024,
        }
    }
}

impl fmt::Debug for ChatClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatClientConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .field("referer", &self.referer)
            .field("title", &self.title)
            .field("timeout", &self.timeout)
            .field("connect_timeout", &self.connect_timeout)
            .field("max_response_bytes", &self.max_response_bytes)
            .finish()
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Sampling parameters for one call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sampling {
    /// Temperature
    pub temperature: f32,
    /// Completion token cap
    pub max_tokens: Option<u32>,
}

impl Sampling {
    /// Temperature only.
    #[must_use]
    pub const fn temperature(temperature: f32) -> Self {
        Self {
            temperature,
            max_tokens: None,
        }
    }
}

// ============================================================================
// ChatClient
// ============================================================================

/// Shared HTTP client for chat completions.
#[derive(Debug, Clone)]
pub struct ChatClient {
    client: Client,
    config: ChatClientConfig,
    completions_url: String,
}

impl ChatClient {
    /// Build a client.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Transport`] if the base URL does not parse or
    /// the HTTP client cannot be built.
    pub fn new(config: ChatClientConfig) -> Result<Self, BackendError> {
        if let Err(e) = url::Url::parse(&config.base_url) {
            return Err(BackendError::Transport {
                reason: format!("invalid base_url '{}': {e}", config.base_url),
                retriable: false,
            });
        }

        let mut headers = HeaderMap::new();
        if let Some(referer) = &config.referer {
            headers.insert("HTTP-Referer", header_value(referer)?);
        }
        if let Some(title) = &config.title {
            headers.insert("X-Title", header_value(title)?);
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| BackendError::Transport {
                reason: format!("failed to build HTTP client: {e}"),
                retriable: false,
            })?;

        let completions_url = format!("{}/chat/completions", config.base_url.trim_end_matches('/'));
        Ok(Self {
            client,
            config,
            completions_url,
        })
    }

    /// Send one system + user exchange to `model` and return the answer text.
    ///
    /// # Errors
    ///
    /// Returns a classified [`BackendError`].
    #[tracing::instrument(skip_all, fields(model = model))]
    pub async fn complete(
        &self,
        model: &str,
        system_prompt: &str,
        user_message: &str,
        sampling: Sampling,
    ) -> Result<String, BackendError> {
        let request = ChatRequest {
            model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: user_message,
                },
            ],
            temperature: sampling.temperature,
            max_tokens: sampling.max_tokens,
        };

        let response = self
            .client
            .post(&self.completions_url)
            .header(AUTHORIZATION, bearer(&self.config.api_key)?)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.classify_error(&e))?;

        let status = response.status();
        let retry_after = parse_retry_after(response.headers());
        let body = self.read_body_limited(response).await?;

        if !status.is_success() {
            return Err(classify_status(status.as_u16(), &body, retry_after));
        }

        let completion: ChatCompletion =
            serde_json::from_slice(&body).map_err(|e| BackendError::InvalidResponse {
                reason: format!("not a chat completion: {e}"),
            })?;
        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .ok_or_else(|| BackendError::InvalidResponse {
                reason: "response has no choices".to_string(),
            })?;

        debug!(response_chars = content.len(), "Chat completion received");
        Ok(content)
    }

    async fn read_body_limited(
        &self,
        mut response: reqwest::Response,
    ) -> Result<Vec<u8>, BackendError> {
        let max_size = self.config.max_response_bytes;
        if let Some(length) = response.content_length() {
            if usize::try_from(length).map_or(true, |l| l > max_size) {
                warn!(content_length = length, max_size, "Response exceeds size limit");
                return Err(too_large(max_size));
            }
        }

        let mut buf = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| self.classify_error(&e))?
        {
            if buf.len() + chunk.len() > max_size {
                warn!(max_size, "Streamed response exceeds size limit");
                return Err(too_large(max_size));
            }
            buf.extend_from_slice(&chunk);
        }
        Ok(buf)
    }

    fn classify_error(&self, error: &reqwest::Error) -> BackendError {
        if error.is_timeout() {
            warn!(timeout_secs = self.config.timeout.as_secs(), "Backend request timed out");
            BackendError::Timeout {
                timeout_secs: self.config.timeout.as_secs(),
            }
        } else if error.is_connect() {
            warn!(url = %self.config.base_url, "Failed to connect to backend");
            BackendError::Transport {
                reason: error.to_string(),
                retriable: true,
            }
        } else {
            error!(error = %error, "Backend request failed");
            BackendError::Transport {
                reason: error.to_string(),
                retriable: error.is_request() || error.is_body(),
            }
        }
    }
}

fn header_value(value: &str) -> Result<HeaderValue, BackendError> {
    HeaderValue::from_str(value).map_err(|e| BackendError::Transport {
        reason: format!("invalid header value: {e}"),
        retriable: false,
    })
}

fn bearer(api_key: &str) -> Result<HeaderValue, BackendError> {
    if api_key.is_empty() {
        return Err(BackendError::Unauthorized);
    }
    let mut value = header_value(&format!("Bearer {api_key}"))?;
    value.set_sensitive(true);
    Ok(value)
}

fn too_large(max_size: usize) -> BackendError {
    BackendError::InvalidResponse {
        reason: format!("response exceeds {max_size} byte limit"),
    }
}

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Map a non-success HTTP status to a [`BackendError`].
fn classify_status(status: u16, body: &[u8], retry_after: Option<Duration>) -> BackendError {
    match status {
        401 | 403 => BackendError::Unauthorized,
        429 => BackendError::RateLimited { retry_after },
        _ => {
            let message = serde_json::from_slice::<ErrorEnvelope>(body)
                .map(|e| e.error.message)
                .unwrap_or_else(|_| String::from_utf8_lossy(body).chars().take(200).collect());
            BackendError::Status { status, message }
        }
    }
}

// ============================================================================
// Stage backends
// ============================================================================

/// Masking over chat completions.
pub struct OpenRouterMasking {
    client: Arc<ChatClient>,
    model: String,
    max_tokens: u32,
}

impl OpenRouterMasking {
    /// Masking calls run at temperature 0.3.
    pub const TEMPERATURE: f32 = 0.3;

    /// Create a masking backend for `model`.
    #[must_use]
    pub fn new(client: Arc<ChatClient>, model: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            client,
            model: model.into(),
            max_tokens,
        }
    }
}

#[async_trait]
impl MaskingBackend for OpenRouterMasking {
    async fn detect(
        &self,
        system_prompt: &str,
        user_message: &str,
    ) -> Result<String, BackendError> {
        let sampling = Sampling {
            temperature: Self::TEMPERATURE,
            max_tokens: Some(self.max_tokens),
        };
        self.client
            .complete(&self.model, system_prompt, user_message, sampling)
            .await
    }

    fn name(&self) -> &str {
        &self.model
    }
}

/// Web research over chat completions (e.g. a Perplexity Sonar model).
pub struct OpenRouterResearch {
    client: Arc<ChatClient>,
    model: String,
}

impl OpenRouterResearch {
    /// Research calls run at temperature 0.3.
    pub const TEMPERATURE: f32 = 0.3;

    /// Create a research backend for `model`.
    #[must_use]
    pub fn new(client: Arc<ChatClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[async_trait]
impl ResearchBackend for OpenRouterResearch {
    async fn research(&self, query: &str) -> Result<String, BackendError> {
        self.client
            .complete(
                &self.model,
                prompts::RESEARCH_SYSTEM_PROMPT,
                query,
                Sampling::temperature(Self::TEMPERATURE),
            )
            .await
    }

    fn name(&self) -> &str {
        &self.model
    }
}

/// Answer composition over chat completions.
pub struct OpenRouterReasoning {
    client: Arc<ChatClient>,
    model: String,
}

impl OpenRouterReasoning {
    /// Answer composition runs at temperature 0.4.
    pub const ANSWER_TEMPERATURE: f32 = 0.4;
    /// Requirements derivation runs at temperature 0.3.
    pub const REQUIREMENTS_TEMPERATURE: f32 = 0.3;

    /// Create a reasoning backend for `model`.
    #[must_use]
    pub fn new(client: Arc<ChatClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[async_trait]
impl ReasoningBackend for OpenRouterReasoning {
    async fn compose_answer(
        &self,
        sanitized_query: &str,
        findings: &str,
    ) -> Result<String, BackendError> {
        self.client
            .complete(
                &self.model,
                prompts::REASONING_SYSTEM_PROMPT,
                &prompts::reasoning_user_message(sanitized_query, findings),
                Sampling::temperature(Self::ANSWER_TEMPERATURE),
            )
            .await
    }

    async fn derive_requirements(
        &self,
        context: &str,
        findings: &str,
    ) -> Result<String, BackendError> {
        self.client
            .complete(
                &self.model,
                prompts::REASONING_SYSTEM_PROMPT,
                &prompts::requirements_user_message(context, findings),
                Sampling::temperature(Self::REQUIREMENTS_TEMPERATURE),
            )
            .await
    }

    fn name(&self) -> &str {
        &self.model
    }
}

/// Internal-mode assistant over chat completions.
pub struct OpenRouterAssistant {
    client: Arc<ChatClient>,
    model: String,
}

impl OpenRouterAssistant {
    /// Internal answers run at temperature 0.4.
    pub const TEMPERATURE: f32 = 0.4;

    /// Create an assistant backend for `model`.
    #[must_use]
    pub fn new(client: Arc<ChatClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[async_trait]
impl AssistantBackend for OpenRouterAssistant {
    async fn respond(&self, question: &str) -> Result<String, BackendError> {
        self.client
            .complete(
                &self.model,
                prompts::ASSISTANT_SYSTEM_PROMPT,
                question,
                Sampling::temperature(Self::TEMPERATURE),
            )
            .await
    }

    fn name(&self) -> &str {
        &self.model
    }
}
