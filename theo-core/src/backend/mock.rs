//! Deterministic backends for tests and offline runs.
//!
//! Every fake records what it was sent so tests can assert on exactly what
//! crossed the trust boundary.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{AssistantBackend, BackendError, MaskingBackend, ReasoningBackend, ResearchBackend};

/// Masking backend returning a fixed response.
pub struct ScriptedMasking {
    response: Result<String, BackendError>,
    requests: Mutex<Vec<(String, String)>>,
}

impl ScriptedMasking {
    /// Always answer with `response`.
    #[must_use]
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            response: Ok(response.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Always answer with an `{"entities": [...]}` envelope built from
    /// `(category, text)` pairs.
    #[must_use]
    pub fn entities(entities: &[(&str, &str)]) -> Self {
        let list: Vec<serde_json::Value> = entities
            .iter()
            .map(|(category, text)| serde_json::json!({"category": category, "text": text}))
            .collect();
        Self::new(serde_json::json!({ "entities": list }).to_string())
    }

    /// Always fail with `error`.
    #[must_use]
    pub fn failing(error: BackendError) -> Self {
        Self {
            response: Err(error),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// `(system_prompt, user_message)` of the most recent call.
    #[must_use]
    pub fn last_request(&self) -> Option<(String, String)> {
        self.requests.lock().last().cloned()
    }

    /// Number of calls made.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl MaskingBackend for ScriptedMasking {
    async fn detect(
        &self,
        system_prompt: &str,
        user_message: &str,
    ) -> Result<String, BackendError> {
        self.requests
            .lock()
            .push((system_prompt.to_string(), user_message.to_string()));
        self.response.clone()
    }

    fn name(&self) -> &str {
        "scripted-masking"
    }
}

/// Research backend that records every query.
///
/// Answers from a queue of scripted results; once the queue is empty it
/// answers with the default findings.
pub struct RecordingResearch {
    queue: Mutex<VecDeque<Result<String, BackendError>>>,
    default_findings: String,
    delay: Duration,
    queries: Mutex<Vec<String>>,
    calls: AtomicU32,
}

impl RecordingResearch {
    /// Always answer with `findings`.
    #[must_use]
    pub fn new(findings: impl Into<String>) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            default_findings: findings.into(),
            delay: Duration::ZERO,
            queries: Mutex::new(Vec::new()),
            calls: AtomicU32::new(0),
        }
    }

    /// Answer the next calls with `results`, in order, before falling back to
    /// the default findings.
    #[must_use]
    pub fn with_script(self, results: Vec<Result<String, BackendError>>) -> Self {
        *self.queue.lock() = results.into();
        self
    }

    /// Sleep this long before answering.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Every query received, in order.
    #[must_use]
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().clone()
    }

    /// Number of calls made.
    #[must_use]
    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ResearchBackend for RecordingResearch {
    async fn research(&self, query: &str) -> Result<String, BackendError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.queries.lock().push(query.to_string());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let next = self.queue.lock().pop_front();
        next.unwrap_or_else(|| Ok(self.default_findings.clone()))
    }

    fn name(&self) -> &str {
        "recording-research"
    }
}

/// Reasoning backend with fixed answers.
pub struct ScriptedReasoning {
    answer: Result<String, BackendError>,
    requirements: String,
    requests: Mutex<Vec<(String, String)>>,
}

impl ScriptedReasoning {
    /// Always compose `answer`.
    #[must_use]
    pub fn new(answer: impl Into<String>) -> Self {
        Self {
            answer: Ok(answer.into()),
            requirements: String::new(),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Always fail with `error`.
    #[must_use]
    pub fn failing(error: BackendError) -> Self {
        Self {
            answer: Err(error),
            requirements: String::new(),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Answer requirement requests with `requirements`.
    #[must_use]
    pub fn with_requirements(mut self, requirements: impl Into<String>) -> Self {
        self.requirements = requirements.into();
        self
    }

    /// Every `(query_or_context, findings)` pair received.
    #[must_use]
    pub fn requests(&self) -> Vec<(String, String)> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl ReasoningBackend for ScriptedReasoning {
    async fn compose_answer(
        &self,
        sanitized_query: &str,
        findings: &str,
    ) -> Result<String, BackendError> {
        self.requests
            .lock()
            .push((sanitized_query.to_string(), findings.to_string()));
        self.answer.clone()
    }

    async fn derive_requirements(
        &self,
        context: &str,
        findings: &str,
    ) -> Result<String, BackendError> {
        self.requests
            .lock()
            .push((context.to_string(), findings.to_string()));
        Ok(self.requirements.clone())
    }

    fn name(&self) -> &str {
        "scripted-reasoning"
    }
}

/// Assistant backend with a fixed answer.
pub struct ScriptedAssistant {
    answer: String,
    questions: Mutex<Vec<String>>,
}

impl ScriptedAssistant {
    /// Always answer with `answer`.
    #[must_use]
    pub fn new(answer: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
            questions: Mutex::new(Vec::new()),
        }
    }

    /// Every question received.
    #[must_use]
    pub fn questions(&self) -> Vec<String> {
        self.questions.lock().clone()
    }
}

#[async_trait]
impl AssistantBackend for ScriptedAssistant {
    async fn respond(&self, question: &str) -> Result<String, BackendError> {
        self.questions.lock().push(question.to_string());
        Ok(self.answer.clone())
    }

    fn name(&self) -> &str {
        "scripted-assistant"
    }
}
