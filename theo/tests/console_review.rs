//! The console as the pipeline's reviewer.
//!
//! Feeds scripted keyboard input through `Console` and checks what the
//! research backend received.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;

use theo::console::Console;
use theo_core::backend::mock::{RecordingResearch, ScriptedMasking, ScriptedReasoning};
use theo_core::masking::{Masker, MaskerConfig};
use theo_core::pipeline::{Pipeline, TurnOutcome};
use theo_core::reasoning::{Reasoner, ReasonerConfig};
use theo_core::research::{ResearchDispatcher, RetryPolicy};

const RAW: &str = "Can John Smith from Acme Corp review our Q3 strategy doc?";

fn pipeline(research: Arc<RecordingResearch>) -> Pipeline {
    Pipeline::new(
        Masker::new(
            Arc::new(ScriptedMasking::entities(&[
                ("PERSON", "John Smith"),
                ("COMPANY", "Acme Corp"),
                ("STRATEGY", "Q3 strategy doc"),
            ])),
            MaskerConfig::default(),
        ),
        ResearchDispatcher::new(
            research,
            RetryPolicy {
                max_attempts: 1,
                base_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(1),
            },
        ),
        Reasoner::new(
            Arc::new(ScriptedReasoning::new(
                "[PERSON_1] should review [STRATEGY_1] with input from [COMPANY_1]'s team.",
            )),
            ReasonerConfig::default(),
        ),
    )
}

fn console(input: &'static str) -> Console<BufReader<&'static [u8]>, Vec<u8>> {
    Console::new(BufReader::new(input.as_bytes()), Vec::new())
}

#[tokio::test]
async fn test_console_approval_sends_sanitized_query() {
    let research = Arc::new(RecordingResearch::new("findings"));
    let pipeline = pipeline(research.clone());
    let mut console = console("a\n");

    let outcome = pipeline
        .run_turn(RAW, &mut console, &CancellationToken::new())
        .await
        .unwrap();

    let TurnOutcome::Answered(context) = outcome else {
        panic!("expected an answer");
    };
    assert_eq!(
        research.queries(),
        vec!["Can [PERSON_1] from [COMPANY_1] review our [STRATEGY_1]?"]
    );
    assert_eq!(
        context.answer.unwrap().text,
        "John Smith should review Q3 strategy doc with input from Acme Corp's team."
    );

    // The reviewer sees each value next to its token; research never does.
    let shown = String::from_utf8(console.output().clone()).unwrap();
    assert!(shown.contains("John Smith -> [PERSON_1]"));
    assert!(shown.contains("Acme Corp -> [COMPANY_1]"));
    assert!(shown.contains("Q3 strategy doc -> [STRATEGY_1]"));
    assert!(research.queries().iter().all(|q| !q.contains("John Smith")));
}

#[tokio::test]
async fn test_summary_distinguishes_two_people() {
    let research = Arc::new(RecordingResearch::new("findings"));
    let pipeline = Pipeline::new(
        Masker::new(
            Arc::new(ScriptedMasking::entities(&[
                ("PERSON", "John Smith"),
                ("PERSON", "Jane Doe"),
            ])),
            MaskerConfig::default(),
        ),
        ResearchDispatcher::new(research.clone(), RetryPolicy::default()),
        Reasoner::new(
            Arc::new(ScriptedReasoning::new("[PERSON_2] should lead.")),
            ReasonerConfig::default(),
        ),
    );
    let mut console = console("c\n");

    pipeline
        .run_turn(
            "Should John Smith or Jane Doe lead?",
            &mut console,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let shown = String::from_utf8(console.output().clone()).unwrap();
    assert!(shown.contains("Masked 2 item(s): 2 personal, 0 business"));
    assert!(shown.contains("John Smith -> [PERSON_1]"));
    assert!(shown.contains("Jane Doe -> [PERSON_2]"));
    assert_eq!(research.call_count(), 0);
}

#[tokio::test]
async fn test_console_edit_then_approve() {
    let research = Arc::new(RecordingResearch::new("findings"));
    let pipeline = pipeline(research.clone());
    let mut console = console("e\nWho should review [STRATEGY_1]?\na\n");

    let outcome = pipeline
        .run_turn(RAW, &mut console, &CancellationToken::new())
        .await
        .unwrap();

    assert!(matches!(outcome, TurnOutcome::Answered(_)));
    assert_eq!(research.queries(), vec!["Who should review [STRATEGY_1]?"]);
    let shown = String::from_utf8(console.output().clone()).unwrap();
    assert_eq!(shown.matches("[a]pprove").count(), 2);
}

#[tokio::test]
async fn test_console_cancel_makes_no_research_call() {
    let research = Arc::new(RecordingResearch::new("findings"));
    let pipeline = pipeline(research.clone());
    let mut console = console("c\n");

    let outcome = pipeline
        .run_turn(RAW, &mut console, &CancellationToken::new())
        .await
        .unwrap();

    assert!(matches!(outcome, TurnOutcome::Cancelled(_)));
    assert_eq!(research.call_count(), 0);
}
