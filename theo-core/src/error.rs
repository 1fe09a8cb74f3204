//! Top-level error type for a pipeline turn.

use thiserror::Error;

use crate::approval::ApprovalViolation;
use crate::backend::BackendError;
use crate::config::ConfigError;
use crate::masking::MaskingError;
use crate::reasoning::ReasoningError;
use crate::research::ResearchError;

/// Anything that can end or interrupt a turn.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Masking failed; nothing was shown to the user.
    #[error(transparent)]
    Masking(#[from] MaskingError),

    /// Research refused or failed.
    #[error(transparent)]
    Research(#[from] ResearchError),

    /// Answer composition failed.
    #[error(transparent)]
    Reasoning(#[from] ReasoningError),

    /// A stage asked for a query that was never approved.
    #[error(transparent)]
    ApprovalViolation(#[from] ApprovalViolation),

    /// Direct backend failure (internal mode).
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The turn was cancelled while a call was in flight; its result was
    /// discarded.
    #[error("cancelled; in-flight result discarded")]
    Cancelled,

    /// A stage was invoked before its inputs exist.
    #[error("{stage} cannot run yet: {reason}")]
    NotReady {
        /// Stage that was invoked
        stage: &'static str,
        /// What is missing
        reason: &'static str,
    },
}

impl PipelineError {
    /// True if the approved query and registry are intact and the turn can
    /// be resumed without asking for approval again.
    #[must_use]
    pub fn is_resumable(&self) -> bool {
        matches!(
            self,
            Self::Research(ResearchError::Unavailable { .. }) | Self::Reasoning(_)
        )
    }

    /// True for approval-ordering violations.
    #[must_use]
    pub fn is_approval_violation(&self) -> bool {
        matches!(
            self,
            Self::ApprovalViolation(_) | Self::Research(ResearchError::ApprovalViolation(_))
        )
    }
}
