//! End-to-end turns through the pipeline with scripted backends.
//!
//! Every test wires the real masker, gate, dispatcher and reasoner over the
//! fakes in `theo_core::backend::mock` and asserts on what the research
//! backend actually received.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use theo_core::approval::{ApprovalGate, ApprovalState, Decision, Presentation};
use theo_core::backend::BackendError;
use theo_core::backend::mock::{RecordingResearch, ScriptedMasking, ScriptedReasoning};
use theo_core::masking::{DetectionSummary, Masker, MaskerConfig, MaskingError};
use theo_core::pipeline::{Pipeline, RecordingProgress, Reviewer, Step, TurnOutcome};
use theo_core::reasoning::{Reasoner, ReasonerConfig};
use theo_core::research::{ResearchDispatcher, ResearchError, RetryPolicy};
use theo_core::PipelineError;

const RAW: &str = "Can John Smith from Acme Corp review our Q3 strategy doc?";
const SANITIZED: &str = "Can [PERSON_1] from [COMPANY_1] review our [STRATEGY_1]?";
const MODEL_ANSWER: &str =
    "[PERSON_1] should review [STRATEGY_1] with input from [COMPANY_1]'s team.";
const RESTORED: &str =
    "John Smith should review Q3 strategy doc with input from Acme Corp's team.";

// ============================================================================
// Harness
// ============================================================================

/// Reviewer that replays a fixed list of decisions.
struct ScriptedReviewer {
    decisions: VecDeque<Decision>,
    seen: Vec<Presentation>,
}

impl ScriptedReviewer {
    fn new(decisions: Vec<Decision>) -> Self {
        Self {
            decisions: decisions.into(),
            seen: Vec::new(),
        }
    }
}

#[async_trait]
impl Reviewer for ScriptedReviewer {
    async fn review(
        &mut self,
        presentation: &Presentation,
        _summary: &DetectionSummary,
    ) -> Decision {
        self.seen.push(presentation.clone());
        self.decisions.pop_front().unwrap_or(Decision::Cancel)
    }
}

struct Harness {
    pipeline: Pipeline,
    research: Arc<RecordingResearch>,
    reasoning: Arc<ScriptedReasoning>,
    progress: Arc<RecordingProgress>,
}

fn example_masking() -> ScriptedMasking {
    ScriptedMasking::entities(&[
        ("PERSON", "John Smith"),
        ("COMPANY", "Acme Corp"),
        ("STRATEGY", "Q3 strategy doc"),
    ])
}

fn harness(
    masking: ScriptedMasking,
    research: RecordingResearch,
    reasoning: ScriptedReasoning,
) -> Harness {
    let research = Arc::new(research);
    let reasoning = Arc::new(reasoning);
    let progress = Arc::new(RecordingProgress::default());

    let pipeline = Pipeline::new(
        Masker::new(Arc::new(masking), MaskerConfig::default()),
        ResearchDispatcher::new(
            research.clone(),
            RetryPolicy {
                max_attempts: 3,
                base_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(5),
            },
        ),
        Reasoner::new(reasoning.clone(), ReasonerConfig::default()),
    )
    .with_progress(progress.clone());

    Harness {
        pipeline,
        research,
        reasoning,
        progress,
    }
}

fn example_harness() -> Harness {
    harness(
        example_masking(),
        RecordingResearch::new("Findings. See https://example.org/q3"),
        ScriptedReasoning::new(MODEL_ANSWER),
    )
}

// ============================================================================
// Happy path
// ============================================================================

#[tokio::test]
async fn test_example_turn_end_to_end() {
    let h = example_harness();
    let mut reviewer = ScriptedReviewer::new(vec![Decision::Approve]);

    let outcome = h
        .pipeline
        .run_turn(RAW, &mut reviewer, &CancellationToken::new())
        .await
        .unwrap();

    let TurnOutcome::Answered(context) = outcome else {
        panic!("expected an answer");
    };
    assert_eq!(reviewer.seen[0].sanitized_query, SANITIZED);
    assert_eq!(h.research.queries(), vec![SANITIZED]);
    assert_eq!(h.reasoning.requests()[0].0, SANITIZED);

    let answer = context.answer.unwrap();
    assert_eq!(answer.text, RESTORED);
    assert_eq!(answer.sources, vec!["https://example.org/q3"]);
    assert_eq!(
        h.progress.started_steps(),
        vec![Step::Mask, Step::Research, Step::Reason]
    );
}

#[tokio::test]
async fn test_no_original_value_reaches_external_backends() {
    let h = example_harness();
    let mut reviewer = ScriptedReviewer::new(vec![Decision::Approve]);
    h.pipeline
        .run_turn(RAW, &mut reviewer, &CancellationToken::new())
        .await
        .unwrap();

    let mut sent: Vec<String> = h.research.queries();
    for (query, findings) in h.reasoning.requests() {
        sent.push(query);
        sent.push(findings);
    }
    for text in sent {
        for original in ["John Smith", "Acme Corp", "Q3 strategy doc"] {
            assert!(!text.contains(original), "{original} leaked into {text}");
        }
    }
}

// ============================================================================
// Approval
// ============================================================================

#[tokio::test]
async fn test_cancel_makes_zero_research_calls() {
    let h = example_harness();
    let mut reviewer = ScriptedReviewer::new(vec![Decision::Cancel]);

    let outcome = h
        .pipeline
        .run_turn(RAW, &mut reviewer, &CancellationToken::new())
        .await
        .unwrap();

    let TurnOutcome::Cancelled(context) = outcome else {
        panic!("expected cancellation");
    };
    assert_eq!(context.approval_state(), ApprovalState::Cancelled);
    assert_eq!(context.raw_query, RAW);
    assert_eq!(h.research.call_count(), 0);
    assert!(h.reasoning.requests().is_empty());
}

#[tokio::test]
async fn test_edit_then_approve_sends_edited_text() {
    let h = example_harness();
    let edited = "Can [PERSON_1] review [STRATEGY_1]?";
    let mut reviewer = ScriptedReviewer::new(vec![
        Decision::Edit(edited.to_string()),
        Decision::Approve,
    ]);

    let outcome = h
        .pipeline
        .run_turn(RAW, &mut reviewer, &CancellationToken::new())
        .await
        .unwrap();

    assert!(matches!(outcome, TurnOutcome::Answered(_)));
    assert_eq!(reviewer.seen.len(), 2);
    assert_eq!(reviewer.seen[1].sanitized_query, edited);
    assert_eq!(h.research.queries(), vec![edited]);
}

#[tokio::test]
async fn test_edit_with_original_value_warns_but_is_sent_as_written() {
    let h = example_harness();
    let edited = "Can John Smith review [STRATEGY_1]?";
    let mut reviewer = ScriptedReviewer::new(vec![
        Decision::Edit(edited.to_string()),
        Decision::Approve,
    ]);

    h.pipeline
        .run_turn(RAW, &mut reviewer, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(h.research.queries(), vec![edited]);
    assert!(
        h.progress
            .warnings()
            .iter()
            .any(|w| w.contains("[PERSON_1]"))
    );
}

#[tokio::test]
async fn test_dispatch_rejected_in_every_unapproved_state() {
    let research = Arc::new(RecordingResearch::new("unused"));
    let dispatcher = ResearchDispatcher::new(research.clone(), RetryPolicy::default());

    let pending = ApprovalGate::new(SANITIZED);

    let mut edited = ApprovalGate::new(SANITIZED);
    let p = edited.present().unwrap();
    edited.decide(p.id, Decision::Edit("x".to_string())).unwrap();

    let mut cancelled = ApprovalGate::new(SANITIZED);
    let p = cancelled.present().unwrap();
    cancelled.decide(p.id, Decision::Cancel).unwrap();

    for gate in [pending, edited, cancelled] {
        let err = dispatcher.dispatch(&gate).await.unwrap_err();
        assert!(matches!(err, ResearchError::ApprovalViolation(_)));
    }
    assert_eq!(research.call_count(), 0);
}

#[tokio::test]
async fn test_research_stage_refuses_unapproved_context() {
    let h = example_harness();
    let mut context = h.pipeline.mask(RAW).await.unwrap();

    let err = h
        .pipeline
        .research(&mut context, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(err.is_approval_violation());
    assert_eq!(h.research.call_count(), 0);
}

// ============================================================================
// Masking failures
// ============================================================================

#[tokio::test]
async fn test_malformed_masking_response_aborts_before_review() {
    let h = harness(
        ScriptedMasking::new("I could not find anything sensitive."),
        RecordingResearch::new("unused"),
        ScriptedReasoning::new("unused"),
    );
    let mut reviewer = ScriptedReviewer::new(vec![Decision::Approve]);

    let err = h
        .pipeline
        .run_turn(RAW, &mut reviewer, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Masking(MaskingError::Format { .. })));
    assert!(reviewer.seen.is_empty());
    assert_eq!(h.research.call_count(), 0);
}

#[tokio::test]
async fn test_overlapping_detections_abort_masking() {
    let h = harness(
        ScriptedMasking::entities(&[("COMPANY", "Acme Corp"), ("CLIENT", "Acme")]),
        RecordingResearch::new("unused"),
        ScriptedReasoning::new("unused"),
    );
    let mut reviewer = ScriptedReviewer::new(vec![Decision::Approve]);

    let err = h
        .pipeline
        .run_turn(RAW, &mut reviewer, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Masking(MaskingError::OverlappingDetection { .. })
    ));
    assert!(reviewer.seen.is_empty());
}

#[tokio::test]
async fn test_masking_backend_failure_aborts() {
    let h = harness(
        ScriptedMasking::failing(BackendError::Unauthorized),
        RecordingResearch::new("unused"),
        ScriptedReasoning::new("unused"),
    );
    let err = h.pipeline.mask(RAW).await.unwrap_err();
    assert!(matches!(err, PipelineError::Masking(MaskingError::Backend(_))));
}

// ============================================================================
// Research failures and cancellation
// ============================================================================

#[tokio::test]
async fn test_research_unavailable_interrupts_and_resumes_without_reapproval() {
    let h = harness(
        example_masking(),
        RecordingResearch::new("Recovered findings").with_script(vec![
            Err(BackendError::Timeout { timeout_secs: 60 }),
            Err(BackendError::Timeout { timeout_secs: 60 }),
            Err(BackendError::Timeout { timeout_secs: 60 }),
        ]),
        ScriptedReasoning::new(MODEL_ANSWER),
    );
    let mut reviewer = ScriptedReviewer::new(vec![Decision::Approve]);
    let cancel = CancellationToken::new();

    let outcome = h
        .pipeline
        .run_turn(RAW, &mut reviewer, &cancel)
        .await
        .unwrap();
    let TurnOutcome::Interrupted { context, error } = outcome else {
        panic!("expected interruption");
    };
    assert!(matches!(
        error,
        PipelineError::Research(ResearchError::Unavailable { attempts: 3, .. })
    ));
    assert_eq!(context.approval_state(), ApprovalState::Approved);
    assert_eq!(context.raw_query, RAW);
    assert_eq!(context.registry.len(), 3);

    let outcome = h.pipeline.resume(context, &cancel).await.unwrap();
    let TurnOutcome::Answered(context) = outcome else {
        panic!("expected an answer after resume");
    };
    assert_eq!(context.answer.unwrap().text, RESTORED);
    assert_eq!(reviewer.seen.len(), 1);
    assert_eq!(h.research.call_count(), 4);
}

#[tokio::test]
async fn test_reasoning_failure_keeps_findings_for_resume() {
    let h = harness(
        example_masking(),
        RecordingResearch::new("Findings"),
        ScriptedReasoning::failing(BackendError::Status {
            status: 502,
            message: "bad gateway".to_string(),
        }),
    );
    let mut reviewer = ScriptedReviewer::new(vec![Decision::Approve]);

    let outcome = h
        .pipeline
        .run_turn(RAW, &mut reviewer, &CancellationToken::new())
        .await
        .unwrap();
    let TurnOutcome::Interrupted { context, error } = outcome else {
        panic!("expected interruption");
    };
    assert!(matches!(error, PipelineError::Reasoning(_)));
    assert!(context.findings.is_some());
    assert_eq!(h.research.call_count(), 1);
}

#[tokio::test]
async fn test_cancellation_during_research_discards_result() {
    let h = harness(
        example_masking(),
        RecordingResearch::new("late findings").with_delay(Duration::from_millis(200)),
        ScriptedReasoning::new(MODEL_ANSWER),
    );
    let mut reviewer = ScriptedReviewer::new(vec![Decision::Approve]);
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let outcome = h
        .pipeline
        .run_turn(RAW, &mut reviewer, &cancel)
        .await
        .unwrap();
    let TurnOutcome::Cancelled(context) = outcome else {
        panic!("expected cancellation");
    };
    assert!(context.research_started);
    assert!(context.findings.is_none());
    assert!(context.answer.is_none());
    assert_eq!(h.research.call_count(), 1);
    assert!(h.reasoning.requests().is_empty());
}

#[tokio::test]
async fn test_cancelled_token_prevents_dispatch() {
    let h = example_harness();
    let mut reviewer = ScriptedReviewer::new(vec![Decision::Approve]);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let outcome = h
        .pipeline
        .run_turn(RAW, &mut reviewer, &cancel)
        .await
        .unwrap();
    let TurnOutcome::Cancelled(context) = outcome else {
        panic!("expected cancellation");
    };
    assert_eq!(context.approval_state(), ApprovalState::Cancelled);
    assert!(!context.research_started);
    assert_eq!(h.research.call_count(), 0);
}

/// Reviewer that never answers, like a user who walked away from the prompt.
struct SilentReviewer;

#[async_trait]
impl Reviewer for SilentReviewer {
    async fn review(
        &mut self,
        _presentation: &Presentation,
        _summary: &DetectionSummary,
    ) -> Decision {
        std::future::pending().await
    }
}

#[tokio::test]
async fn test_cancellation_at_approval_prompt_ends_turn() {
    let h = example_harness();
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let outcome = tokio::time::timeout(
        Duration::from_secs(5),
        h.pipeline.run_turn(RAW, &mut SilentReviewer, &cancel),
    )
    .await
    .expect("cancellation should end the approval wait")
    .unwrap();

    let TurnOutcome::Cancelled(context) = outcome else {
        panic!("expected cancellation");
    };
    assert_eq!(context.approval_state(), ApprovalState::Cancelled);
    assert!(!context.research_started);
    assert_eq!(h.research.call_count(), 0);
}

// ============================================================================
// Follow-ups
// ============================================================================

#[tokio::test]
async fn test_requirements_after_answer() {
    let h = harness(
        example_masking(),
        RecordingResearch::new("Findings"),
        ScriptedReasoning::new(MODEL_ANSWER)
            .with_requirements("**Must**\n- [ ] [PERSON_1] signs off on [STRATEGY_1]"),
    );
    let mut reviewer = ScriptedReviewer::new(vec![Decision::Approve]);

    let TurnOutcome::Answered(context) = h
        .pipeline
        .run_turn(RAW, &mut reviewer, &CancellationToken::new())
        .await
        .unwrap()
    else {
        panic!("expected an answer");
    };

    let list = h.pipeline.requirements(&context).await.unwrap();
    assert_eq!(
        list.text,
        "**Must**\n- [ ] John Smith signs off on Q3 strategy doc"
    );
    let (sent_context, _) = h.reasoning.requests().last().cloned().unwrap();
    assert_eq!(sent_context, SANITIZED);
}

#[tokio::test]
async fn test_requirements_before_research_is_not_ready() {
    let h = example_harness();
    let context = h.pipeline.mask(RAW).await.unwrap();
    let err = h.pipeline.requirements(&context).await.unwrap_err();
    assert!(matches!(err, PipelineError::NotReady { .. }));
}

#[tokio::test]
async fn test_numbering_restarts_per_turn() {
    let h = example_harness();
    let first = h.pipeline.mask(RAW).await.unwrap();
    let second = h.pipeline.mask(RAW).await.unwrap();
    assert_eq!(first.sanitized_query(), SANITIZED);
    assert_eq!(second.sanitized_query(), SANITIZED);
    assert_ne!(first.turn_id, second.turn_id);
}
