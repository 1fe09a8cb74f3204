//! Model backends used by the pipeline.
//!
//! Each stage talks to its model through a narrow trait so the pipeline can
//! run against the OpenRouter client in production and scripted fakes in
//! tests.
//!
//! - `openrouter` - OpenAI-compatible chat-completions client
//! - `mock` - Deterministic fakes

pub mod mock;
pub mod openrouter;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

// ============================================================================
// Errors
// ============================================================================

/// Failure talking to a model backend.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// Network-level failure (DNS, connect, reset).
    #[error("transport error: {reason}")]
    Transport {
        /// Underlying error text
        reason: String,
        /// Whether a retry may succeed
        retriable: bool,
    },

    /// The request did not complete in time.
    #[error("request timed out after {timeout_secs}s")]
    Timeout {
        /// Configured timeout
        timeout_secs: u64,
    },

    /// The backend answered with a non-success HTTP status.
    #[error("backend returned HTTP {status}: {message}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Error message from the body, if any
        message: String,
    },

    /// The backend is throttling us.
    #[error("rate limited by backend")]
    RateLimited {
        /// Server-suggested delay
        retry_after: Option<Duration>,
    },

    /// The backend answered 2xx with a body we cannot use.
    #[error("invalid backend response: {reason}")]
    InvalidResponse {
        /// What was wrong
        reason: String,
    },

    /// Credentials were missing or refused.
    #[error("backend rejected credentials")]
    Unauthorized,
}

impl BackendError {
    /// Whether retrying the same request may succeed.
    ///
    /// Timeouts, throttling, server errors and connect failures are retriable;
    /// client errors, auth failures and bad bodies are not.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::Transport { retriable, .. } => *retriable,
            Self::Timeout { .. } | Self::RateLimited { .. } => true,
            Self::Status { status, .. } => *status >= 500,
            Self::InvalidResponse { .. } | Self::Unauthorized => false,
        }
    }
}

// ============================================================================
// Traits
// ============================================================================

/// Model that lists sensitive spans in a query.
#[async_trait]
pub trait MaskingBackend: Send + Sync {
    /// Return the model's raw text answer; parsing happens in the masker.
    async fn detect(&self, system_prompt: &str, user_message: &str)
    -> Result<String, BackendError>;

    /// Name for logs.
    fn name(&self) -> &str;
}

/// External web-research service. Receives sanitized text only.
#[async_trait]
pub trait ResearchBackend: Send + Sync {
    /// Research `query` and return the findings text.
    async fn research(&self, query: &str) -> Result<String, BackendError>;

    /// Name for logs.
    fn name(&self) -> &str;
}

/// Model that turns findings into an answer.
#[async_trait]
pub trait ReasoningBackend: Send + Sync {
    /// Compose an answer to `sanitized_query` from `findings`.
    async fn compose_answer(
        &self,
        sanitized_query: &str,
        findings: &str,
    ) -> Result<String, BackendError>;

    /// Derive a prioritized requirements list from `findings`.
    async fn derive_requirements(
        &self,
        context: &str,
        findings: &str,
    ) -> Result<String, BackendError>;

    /// Name for logs.
    fn name(&self) -> &str;
}

/// In-boundary assistant model for internal mode.
#[async_trait]
pub trait AssistantBackend: Send + Sync {
    /// Answer `question` directly.
    async fn respond(&self, question: &str) -> Result<String, BackendError>;

    /// Name for logs.
    fn name(&self) -> &str;
}
