//! Dispatch of the approved sanitized query to the research backend.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::approval::{ApprovalGate, ApprovalViolation, ApprovedQuery};
use crate::backend::{BackendError, ResearchBackend};
use crate::prompts;

// SAFETY: .expect() on LazyLock with a compile-time literal regex pattern.
// Tested by test_extract_sources().
static SOURCE_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"https?://[^\s\)\]>]+").expect("BUG: SOURCE_URL regex is invalid")
});

/// Errors from the research stage.
#[derive(Debug, Error)]
pub enum ResearchError {
    /// Dispatch was attempted without an approval.
    #[error(transparent)]
    ApprovalViolation(#[from] ApprovalViolation),

    /// The backend stayed unavailable for the whole retry budget.
    #[error("research service unavailable after {attempts} attempt(s): {last_error}")]
    Unavailable {
        /// Attempts made
        attempts: u32,
        /// Error from the final attempt
        last_error: BackendError,
    },
}

/// Retry schedule for research calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first
    pub max_attempts: u32,
    /// Delay before the first retry
    pub base_backoff: Duration,
    /// Upper bound for any delay
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// Delay after failed attempt number `attempt` (1-based).
    ///
    /// 500ms, 1s, 2s, ... capped at `max_backoff`.
    #[must_use]
    pub fn backoff_interval(&self, attempt: u32) -> Duration {
        let factor = 2u32.pow(attempt.saturating_sub(1).min(16));
        self.base_backoff.saturating_mul(factor).min(self.max_backoff)
    }
}

/// Research output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Findings {
    /// Findings text as returned by the backend
    pub text: String,
    /// URLs cited in the text, deduplicated, in order of appearance
    pub sources: Vec<String>,
    /// Attempts it took
    pub attempts: u32,
}

/// Sends approved queries to the research backend.
pub struct ResearchDispatcher {
    backend: Arc<dyn ResearchBackend>,
    retry: RetryPolicy,
    response_language: Option<String>,
}

impl ResearchDispatcher {
    /// Create a dispatcher.
    #[must_use]
    pub fn new(backend: Arc<dyn ResearchBackend>, retry: RetryPolicy) -> Self {
        Self {
            backend,
            retry,
            response_language: None,
        }
    }

    /// Ask the research service to answer in `language`.
    #[must_use]
    pub fn with_response_language(mut self, language: Option<String>) -> Self {
        self.response_language = language;
        self
    }

    /// Name of the research backend.
    #[must_use]
    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Release the approved query from `gate` and research it.
    ///
    /// # Errors
    ///
    /// [`ResearchError::ApprovalViolation`] if the gate is not Approved (no
    /// call is made), otherwise as [`ResearchDispatcher::research`].
    pub async fn dispatch(&self, gate: &ApprovalGate) -> Result<Findings, ResearchError> {
        let approved = gate.release().map_err(|violation| {
            error!(state = %violation.state, "Research dispatch refused: query not approved");
            violation
        })?;
        self.research(&approved).await
    }

    /// Research an approved query, retrying transient failures.
    ///
    /// # Errors
    ///
    /// [`ResearchError::Unavailable`] once the retry budget is spent or on
    /// the first non-retriable error.
    #[tracing::instrument(
        skip_all,
        fields(backend = self.backend.name(), presentation = %query.presentation())
    )]
    pub async fn research(&self, query: &ApprovedQuery) -> Result<Findings, ResearchError> {
        let message =
            prompts::research_user_message(query.as_str(), self.response_language.as_deref());
        let max_attempts = self.retry.max_attempts.max(1);

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.backend.research(&message).await {
                Ok(text) => {
                    let sources = extract_sources(&text);
                    info!(
                        attempts = attempt,
                        sources = sources.len(),
                        findings_chars = text.len(),
                        "Research completed"
                    );
                    return Ok(Findings {
                        text,
                        sources,
                        attempts: attempt,
                    });
                }
                Err(err) if err.is_retriable() && attempt < max_attempts => {
                    let mut delay = self.retry.backoff_interval(attempt);
                    if let BackendError::RateLimited {
                        retry_after: Some(after),
                    } = &err
                    {
                        delay = delay.max(*after).min(self.retry.max_backoff);
                    }
                    warn!(
                        attempt,
                        max_attempts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "Research attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    warn!(attempts = attempt, error = %err, "Research unavailable");
                    return Err(ResearchError::Unavailable {
                        attempts: attempt,
                        last_error: err,
                    });
                }
            }
        }
    }
}

/// URLs in `text`, deduplicated, in order, without trailing punctuation.
#[must_use]
pub fn extract_sources(text: &str) -> Vec<String> {
    let mut sources: Vec<String> = Vec::new();
    for m in SOURCE_URL.find_iter(text) {
        let url = m.as_str().trim_end_matches(['.', ',', ';', ':', '"', '\'']);
        if !sources.iter().any(|s| s == url) {
            sources.push(url.to_string());
        }
    }
    sources
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::Decision;
    use crate::backend::mock::RecordingResearch;

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
        }
    }

    fn approved_gate(query: &str) -> ApprovalGate {
        let mut gate = ApprovalGate::new(query);
        let p = gate.present().unwrap();
        gate.decide(p.id, Decision::Approve).unwrap();
        gate
    }

    #[test]
    fn test_backoff_interval() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_interval(1), Duration::from_millis(500));
        assert_eq!(policy.backoff_interval(2), Duration::from_secs(1));
        assert_eq!(policy.backoff_interval(3), Duration::from_secs(2));
        assert_eq!(policy.backoff_interval(10), Duration::from_secs(8));
        assert_eq!(policy.backoff_interval(u32::MAX), Duration::from_secs(8));
    }

    #[test]
    fn test_extract_sources() {
        let text = "See https://a.example/x, and (https://b.example/y). \
                    Again https://a.example/x. Also <http://c.example>";
        assert_eq!(
            extract_sources(text),
            vec![
                "https://a.example/x",
                "https://b.example/y",
                "http://c.example"
            ]
        );
        assert!(extract_sources("no links").is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_sends_approved_query_only() {
        let backend = Arc::new(RecordingResearch::new("Findings https://src.example"));
        let dispatcher = ResearchDispatcher::new(backend.clone(), fast_retry());

        let findings = dispatcher
            .dispatch(&approved_gate("What does [COMPANY_1] sell?"))
            .await
            .unwrap();
        assert_eq!(backend.queries(), vec!["What does [COMPANY_1] sell?"]);
        assert_eq!(findings.sources, vec!["https://src.example"]);
        assert_eq!(findings.attempts, 1);
    }

    #[tokio::test]
    async fn test_dispatch_refuses_unapproved_gate() {
        let backend = Arc::new(RecordingResearch::new("unused"));
        let dispatcher = ResearchDispatcher::new(backend.clone(), fast_retry());

        let mut gate = ApprovalGate::new("q");
        let err = dispatcher.dispatch(&gate).await.unwrap_err();
        assert!(matches!(err, ResearchError::ApprovalViolation(_)));

        let p = gate.present().unwrap();
        gate.decide(p.id, Decision::Edit("edited".to_string()))
            .unwrap();
        assert!(dispatcher.dispatch(&gate).await.is_err());

        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_retries_transient_failures() {
        let backend = Arc::new(RecordingResearch::new("ok").with_script(vec![
            Err(BackendError::Timeout { timeout_secs: 1 }),
            Err(BackendError::Status {
                status: 503,
                message: "busy".to_string(),
            }),
        ]));
        let dispatcher = ResearchDispatcher::new(backend.clone(), fast_retry());

        let findings = dispatcher.dispatch(&approved_gate("q")).await.unwrap();
        assert_eq!(findings.text, "ok");
        assert_eq!(findings.attempts, 3);
        assert_eq!(backend.call_count(), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_budget() {
        let backend = Arc::new(RecordingResearch::new("never").with_script(vec![
            Err(BackendError::Timeout { timeout_secs: 1 }),
            Err(BackendError::Timeout { timeout_secs: 1 }),
            Err(BackendError::Timeout { timeout_secs: 1 }),
        ]));
        let dispatcher = ResearchDispatcher::new(backend.clone(), fast_retry());

        match dispatcher.dispatch(&approved_gate("q")).await.unwrap_err() {
            ResearchError::Unavailable { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("expected Unavailable, got {other:?}"),
        }
        assert_eq!(backend.call_count(), 3);
    }

    #[tokio::test]
    async fn test_non_retriable_error_fails_immediately() {
        let backend = Arc::new(
            RecordingResearch::new("never").with_script(vec![Err(BackendError::Unauthorized)]),
        );
        let dispatcher = ResearchDispatcher::new(backend.clone(), fast_retry());

        assert!(dispatcher.dispatch(&approved_gate("q")).await.is_err());
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn test_language_hint_is_appended() {
        let backend = Arc::new(RecordingResearch::new("ok"));
        let dispatcher = ResearchDispatcher::new(backend.clone(), fast_retry())
            .with_response_language(Some("German".to_string()));

        dispatcher.dispatch(&approved_gate("q")).await.unwrap();
        assert_eq!(backend.queries(), vec!["q\n\nPlease answer in German."]);
    }
}
