//! Internal mode: answer with the in-boundary assistant model.
//!
//! No masking, no approval and no external research. The question goes only
//! to the assistant backend, which is expected to be a model the user trusts
//! with raw text.

use std::sync::Arc;

use tracing::info;

use crate::backend::{AssistantBackend, BackendError};

/// Answers questions directly.
pub struct InternalResponder {
    backend: Arc<dyn AssistantBackend>,
}

impl InternalResponder {
    #[must_use]
    pub fn new(backend: Arc<dyn AssistantBackend>) -> Self {
        Self { backend }
    }

    /// Answer `question`.
    ///
    /// # Errors
    ///
    /// Propagates the backend error.
    pub async fn answer(&self, question: &str) -> Result<String, BackendError> {
        let answer = self.backend.respond(question).await?;
        info!(backend = self.backend.name(), answer_chars = answer.len(), "Internal answer ready");
        Ok(answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::ScriptedAssistant;

    #[tokio::test]
    async fn test_answer_forwards_question_verbatim() {
        let backend = Arc::new(ScriptedAssistant::new("42"));
        let responder = InternalResponder::new(backend.clone());
        assert_eq!(responder.answer("Ask John Smith").await.unwrap(), "42");
        assert_eq!(backend.questions(), vec!["Ask John Smith"]);
    }
}
