//! Final answer composition and placeholder restoration.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::backend::{BackendError, ReasoningBackend};
use crate::masking::PlaceholderRegistry;
use crate::research::Findings;

/// Errors from the reasoning stage.
#[derive(Debug, Error)]
pub enum ReasoningError {
    /// The reasoning backend call failed.
    #[error("reasoning backend failed: {0}")]
    Backend(#[from] BackendError),

    /// The backend returned an empty answer.
    #[error("reasoning model returned an empty answer")]
    EmptyAnswer,
}

/// A token in the model output with no registry entry. Left in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnboundPlaceholderWarning {
    /// The token as it appeared
    pub token: String,
}

/// The answer shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalAnswer {
    /// Answer with placeholders restored (or left in place if restoration is off)
    pub text: String,
    /// Answer as the model wrote it
    pub placeholder_text: String,
    /// Tokens the registry could not resolve
    pub warnings: Vec<UnboundPlaceholderWarning>,
    /// Whether restoration was applied
    pub restored: bool,
    /// Sources cited by the research service
    pub sources: Vec<String>,
    /// True if the user edited the sanitized query; restoring the query
    /// itself would then not give back the raw query
    pub query_edited: bool,
}

/// Reasoner settings.
#[derive(Debug, Clone)]
pub struct ReasonerConfig {
    /// Substitute originals back into the answer
    pub restore_placeholders: bool,
}

impl Default for ReasonerConfig {
    fn default() -> Self {
        Self {
            restore_placeholders: true,
        }
    }
}

/// Composes the final answer from sanitized inputs and restores originals.
pub struct Reasoner {
    backend: Arc<dyn ReasoningBackend>,
    config: ReasonerConfig,
}

impl Reasoner {
    /// Create a reasoner.
    #[must_use]
    pub fn new(backend: Arc<dyn ReasoningBackend>, config: ReasonerConfig) -> Self {
        Self { backend, config }
    }

    /// Produce the final answer.
    ///
    /// Only `sanitized_query` and `findings` reach the backend. `raw_query`
    /// stays local and is used to tell whether the sanitized query still
    /// restores to it.
    ///
    /// # Errors
    ///
    /// Returns [`ReasoningError`] if the backend fails or answers nothing.
    #[tracing::instrument(skip_all, fields(backend = self.backend.name()))]
    pub async fn finalize(
        &self,
        raw_query: &str,
        sanitized_query: &str,
        findings: &Findings,
        registry: &PlaceholderRegistry,
    ) -> Result<FinalAnswer, ReasoningError> {
        let placeholder_text = self
            .backend
            .compose_answer(sanitized_query, &findings.text)
            .await?;
        if placeholder_text.trim().is_empty() {
            return Err(ReasoningError::EmptyAnswer);
        }

        let query_edited = registry.restore(sanitized_query).text != raw_query;
        let answer = self.restore(placeholder_text, registry);
        info!(
            restored = answer.restored,
            unbound = answer.warnings.len(),
            answer_chars = answer.text.len(),
            "Answer composed"
        );
        Ok(FinalAnswer {
            sources: findings.sources.clone(),
            query_edited,
            ..answer
        })
    }

    /// Derive a Must / Should / Nice-to-have list from `findings`.
    ///
    /// `context` must already be sanitized.
    ///
    /// # Errors
    ///
    /// Returns [`ReasoningError`] if the backend fails or answers nothing.
    #[tracing::instrument(skip_all, fields(backend = self.backend.name()))]
    pub async fn requirements(
        &self,
        context: &str,
        findings: &Findings,
        registry: &PlaceholderRegistry,
    ) -> Result<FinalAnswer, ReasoningError> {
        let placeholder_text = self
            .backend
            .derive_requirements(context, &findings.text)
            .await?;
        if placeholder_text.trim().is_empty() {
            return Err(ReasoningError::EmptyAnswer);
        }
        debug!(chars = placeholder_text.len(), "Requirements derived");
        Ok(FinalAnswer {
            sources: findings.sources.clone(),
            ..self.restore(placeholder_text, registry)
        })
    }

    fn restore(&self, placeholder_text: String, registry: &PlaceholderRegistry) -> FinalAnswer {
        let restored = registry.restore(&placeholder_text);
        let warnings: Vec<UnboundPlaceholderWarning> = restored
            .unbound
            .into_iter()
            .map(|token| {
                warn!(token = %token, "Answer contains a placeholder with no registry entry");
                UnboundPlaceholderWarning { token }
            })
            .collect();

        let text = if self.config.restore_placeholders {
            restored.text
        } else {
            placeholder_text.clone()
        };
        FinalAnswer {
            text,
            placeholder_text,
            warnings,
            restored: self.config.restore_placeholders,
            sources: Vec::new(),
            query_edited: false,
        }
    }
}
