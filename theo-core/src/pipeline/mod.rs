//! Turn orchestration: mask → approve → research → reason.
//!
//! A [`PipelineContext`] is created by [`Pipeline::mask`] and threaded through
//! the remaining stages explicitly. Research runs only after the approval
//! gate reaches Approved; a Cancelled decision ends the turn with zero
//! research calls.

pub mod events;

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

pub use events::{PipelineEvent, ProgressSink, RecordingProgress, Step, TracingProgress};

use crate::approval::{ApprovalGate, ApprovalState, Decision, Presentation};
use crate::error::PipelineError;
use crate::masking::{Detection, DetectionSummary, Masker, PlaceholderRegistry};
use crate::reasoning::{FinalAnswer, Reasoner};
use crate::research::{Findings, ResearchDispatcher};

// ============================================================================
// Reviewer
// ============================================================================

/// The human in the loop.
///
/// Implemented by the front-end; the gate never talks to a UI directly.
#[async_trait]
pub trait Reviewer: Send {
    /// Decide on one presentation of the sanitized query.
    async fn review(&mut self, presentation: &Presentation, summary: &DetectionSummary)
    -> Decision;
}

// ============================================================================
// Context and outcome
// ============================================================================

/// Everything one turn knows. Owned by that turn and dropped with it.
#[derive(Debug, Clone)]
pub struct PipelineContext {
    /// Identifies the turn in logs
    pub turn_id: Uuid,
    /// The user's question as typed; never leaves the process
    pub raw_query: String,
    /// Approval state and current sanitized query
    pub gate: ApprovalGate,
    /// Token ↔ original mapping
    pub registry: PlaceholderRegistry,
    /// What the masker found
    pub detections: Vec<Detection>,
    /// Grouped view of `detections`
    pub summary: DetectionSummary,
    /// Set once the approved query has been handed to the dispatcher
    pub research_started: bool,
    /// Research output once dispatched
    pub findings: Option<Findings>,
    /// Final answer once composed
    pub answer: Option<FinalAnswer>,
}

impl PipelineContext {
    /// Current sanitized query.
    #[must_use]
    pub fn sanitized_query(&self) -> &str {
        self.gate.sanitized_query()
    }

    /// Current approval state.
    #[must_use]
    pub fn approval_state(&self) -> ApprovalState {
        self.gate.state()
    }
}

/// How a turn ended.
#[derive(Debug)]
pub enum TurnOutcome {
    /// The answer is in `context.answer`.
    Answered(PipelineContext),
    /// The user cancelled, or the turn was cancelled while research was in
    /// flight. No findings reached the reasoner.
    Cancelled(PipelineContext),
    /// Research or reasoning failed after approval. The approval and registry
    /// are intact; pass the context to [`Pipeline::resume`] to retry.
    Interrupted {
        /// The turn so far
        context: PipelineContext,
        /// What went wrong
        error: PipelineError,
    },
}

// ============================================================================
// Pipeline
// ============================================================================

/// Runs turns against injected stages.
pub struct Pipeline {
    masker: Masker,
    dispatcher: ResearchDispatcher,
    reasoner: Reasoner,
    progress: Arc<dyn ProgressSink>,
}

impl Pipeline {
    /// Create a pipeline reporting progress through `tracing`.
    #[must_use]
    pub fn new(masker: Masker, dispatcher: ResearchDispatcher, reasoner: Reasoner) -> Self {
        Self {
            masker,
            dispatcher,
            reasoner,
            progress: Arc::new(TracingProgress),
        }
    }

    /// Report progress to `sink` instead.
    #[must_use]
    pub fn with_progress(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress = sink;
        self
    }

    /// Name of the research backend in use.
    #[must_use]
    pub fn research_backend(&self) -> &str {
        self.dispatcher.backend_name()
    }

    /// Run a whole turn.
    ///
    /// # Errors
    ///
    /// Masking failures and approval violations end the turn with an error.
    /// Research and reasoning failures after approval are returned as
    /// [`TurnOutcome::Interrupted`] instead.
    pub async fn run_turn(
        &self,
        raw_query: &str,
        reviewer: &mut dyn Reviewer,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome, PipelineError> {
        let mut context = self.mask(raw_query).await?;
        if self.review(&mut context, reviewer, cancel).await == ApprovalState::Cancelled {
            info!(turn_id = %context.turn_id, "Turn cancelled by user");
            return Ok(TurnOutcome::Cancelled(context));
        }
        self.resume(context, cancel).await
    }

    /// Continue an approved turn: research (unless findings exist) then
    /// reason. Never asks for approval again.
    ///
    /// # Errors
    ///
    /// Returns approval violations; other failures become
    /// [`TurnOutcome::Interrupted`].
    pub async fn resume(
        &self,
        mut context: PipelineContext,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome, PipelineError> {
        if context.findings.is_none() {
            match self.research(&mut context, cancel).await {
                Ok(()) => {}
                Err(PipelineError::Cancelled) => return Ok(TurnOutcome::Cancelled(context)),
                Err(error) if error.is_resumable() => {
                    return Ok(TurnOutcome::Interrupted { context, error });
                }
                Err(error) => return Err(error),
            }
        }

        match self.finalize(&mut context).await {
            Ok(()) => Ok(TurnOutcome::Answered(context)),
            Err(error) if error.is_resumable() => Ok(TurnOutcome::Interrupted { context, error }),
            Err(error) => Err(error),
        }
    }

    /// Mask `raw_query` and open a new turn.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Masking`]; nothing is presented in that case.
    pub async fn mask(&self, raw_query: &str) -> Result<PipelineContext, PipelineError> {
        let turn_id = Uuid::new_v4();
        self.progress.emit(PipelineEvent::StepStarted(Step::Mask));

        let outcome = match self.masker.mask(raw_query).await {
            Ok(outcome) => outcome,
            Err(err) => {
                self.fail(Step::Mask, &err);
                return Err(err.into());
            }
        };

        self.progress.emit(PipelineEvent::StepFinished {
            step: Step::Mask,
            detail: format!("{} item(s) masked", outcome.summary.total()),
        });
        if outcome.skipped > 0 {
            self.progress.emit(PipelineEvent::Warning(format!(
                "{} reported item(s) did not occur in the question and were ignored",
                outcome.skipped
            )));
        }
        if outcome.summary.long_input_without_detections {
            self.progress.emit(PipelineEvent::Warning(
                "nothing was masked in a long question; check it carefully before approving"
                    .to_string(),
            ));
        }
        info!(turn_id = %turn_id, detections = outcome.detections.len(), "Turn opened");

        Ok(PipelineContext {
            turn_id,
            raw_query: raw_query.to_string(),
            gate: ApprovalGate::new(outcome.sanitized_query),
            registry: outcome.registry,
            detections: outcome.detections,
            summary: outcome.summary,
            research_started: false,
            findings: None,
            answer: None,
        })
    }

    /// Present the sanitized query until the reviewer approves or cancels.
    ///
    /// Edited text is taken as written. If it contains a masked original,
    /// a warning is emitted but nothing is re-masked. Cancelling `cancel`
    /// while the reviewer is deciding counts as a Cancel decision.
    pub async fn review(
        &self,
        context: &mut PipelineContext,
        reviewer: &mut dyn Reviewer,
        cancel: &CancellationToken,
    ) -> ApprovalState {
        while let Some(presentation) = context.gate.present() {
            let decision = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    info!(turn_id = %context.turn_id, "Interrupted at approval");
                    Decision::Cancel
                }
                decision = reviewer.review(&presentation, &context.summary) => decision,
            };
            match context.gate.decide(presentation.id, decision) {
                Ok(ApprovalState::Edited) => {
                    let leaked = context.registry.leaked_tokens(context.gate.sanitized_query());
                    if !leaked.is_empty() {
                        warn!(
                            turn_id = %context.turn_id,
                            tokens = ?leaked,
                            "Edited query contains masked originals"
                        );
                        self.progress.emit(PipelineEvent::Warning(format!(
                            "the edited query contains the original value of {}; it will be sent as written",
                            leaked.join(", ")
                        )));
                    }
                }
                Ok(_) => {}
                Err(rejection) => {
                    self.progress.emit(PipelineEvent::Warning(rejection.to_string()));
                }
            }
        }
        context.gate.state()
    }

    /// Send the approved query to research.
    ///
    /// A cancellation observed before or during the call discards the
    /// result; `context.findings` stays `None`.
    ///
    /// # Errors
    ///
    /// [`PipelineError::Cancelled`], approval violations, or research
    /// unavailability.
    pub async fn research(
        &self,
        context: &mut PipelineContext,
        cancel: &CancellationToken,
    ) -> Result<(), PipelineError> {
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        self.progress.emit(PipelineEvent::StepStarted(Step::Research));
        context.research_started = true;

        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => None,
            result = self.dispatcher.dispatch(&context.gate) => Some(result),
        };

        let findings = match result {
            None => {
                info!(turn_id = %context.turn_id, "Research cancelled in flight");
                self.fail(Step::Research, &PipelineError::Cancelled);
                return Err(PipelineError::Cancelled);
            }
            Some(Err(err)) => {
                self.fail(Step::Research, &err);
                return Err(err.into());
            }
            Some(Ok(findings)) => findings,
        };
        if cancel.is_cancelled() {
            info!(turn_id = %context.turn_id, "Research result discarded after cancellation");
            self.fail(Step::Research, &PipelineError::Cancelled);
            return Err(PipelineError::Cancelled);
        }

        self.progress.emit(PipelineEvent::StepFinished {
            step: Step::Research,
            detail: format!("{} source(s)", findings.sources.len()),
        });
        context.findings = Some(findings);
        Ok(())
    }

    /// Compose the final answer from the findings.
    ///
    /// # Errors
    ///
    /// [`PipelineError::NotReady`] without findings, otherwise reasoning
    /// failures.
    pub async fn finalize(&self, context: &mut PipelineContext) -> Result<(), PipelineError> {
        let Some(findings) = context.findings.as_ref() else {
            return Err(PipelineError::NotReady {
                stage: "reason",
                reason: "no research findings",
            });
        };
        self.progress.emit(PipelineEvent::StepStarted(Step::Reason));

        let answer = match self
            .reasoner
            .finalize(
                &context.raw_query,
                context.gate.sanitized_query(),
                findings,
                &context.registry,
            )
            .await
        {
            Ok(answer) => answer,
            Err(err) => {
                self.fail(Step::Reason, &err);
                return Err(err.into());
            }
        };

        for warning in &answer.warnings {
            self.progress.emit(PipelineEvent::Warning(format!(
                "{} in the answer has no known value and was left as is",
                warning.token
            )));
        }
        self.progress.emit(PipelineEvent::StepFinished {
            step: Step::Reason,
            detail: if answer.restored {
                "answer restored".to_string()
            } else {
                "answer ready (placeholders kept)".to_string()
            },
        });
        context.answer = Some(answer);
        Ok(())
    }

    /// Derive a requirements list from an answered turn.
    ///
    /// # Errors
    ///
    /// [`PipelineError::NotReady`] without findings, otherwise reasoning
    /// failures.
    pub async fn requirements(
        &self,
        context: &PipelineContext,
    ) -> Result<FinalAnswer, PipelineError> {
        let Some(findings) = context.findings.as_ref() else {
            return Err(PipelineError::NotReady {
                stage: "requirements",
                reason: "no research findings",
            });
        };
        let list = self
            .reasoner
            .requirements(context.gate.sanitized_query(), findings, &context.registry)
            .await?;
        Ok(list)
    }

    fn fail(&self, step: Step, err: &dyn std::error::Error) {
        self.progress.emit(PipelineEvent::StepFailed {
            step,
            reason: err.to_string(),
        });
    }
}
