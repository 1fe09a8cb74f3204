//! `theo ask` and `theo chat`.
//!
//! Drives turns through the pipeline with the console as reviewer. A turn
//! interrupted after approval is offered for retry without a new approval.
//! Ctrl-C cancels the turn in flight, whether it is waiting for approval or
//! for research; at the chat prompt it ends the process.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::io::{AsyncBufRead, AsyncWrite, BufReader, Stdin, Stdout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use theo_core::config::TheoConfig;
use theo_core::factory;
use theo_core::internal::InternalResponder;
use theo_core::{Pipeline, PipelineContext, PipelineError, TurnOutcome};

use crate::attachments::{compose_question, load_all};
use crate::cli::{AskArgs, ChatArgs, CommonArgs};
use crate::console::{Console, ConsoleProgress, describe_abort};
use crate::error::CliError;

/// The answer was printed.
pub const EXIT_ANSWERED: i32 = 0;
/// Something failed.
pub const EXIT_FAILED: i32 = 1;
/// The user cancelled.
pub const EXIT_CANCELLED: i32 = 2;

const CHAT_HELP: &str = "Type a question. Commands: /internal toggles internal mode, \
/requirements derives requirements from the last answer, /help, /quit.";

/// How an `ask` turn ended from the user's point of view.
#[derive(Debug)]
pub enum AskResult {
    /// Answer printed; the turn is kept for follow-ups.
    Answered(Box<PipelineContext>),
    /// Cancelled at approval or while research was running.
    Cancelled,
    /// Interrupted and the user declined to retry.
    Abandoned(PipelineError),
}

impl AskResult {
    /// Process exit code for this result.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Answered(_) => EXIT_ANSWERED,
            Self::Cancelled => EXIT_CANCELLED,
            Self::Abandoned(_) => EXIT_FAILED,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Entry points
// ─────────────────────────────────────────────────────────────────────────────

/// Run `theo ask`.
///
/// # Errors
///
/// Configuration, attachment, masking and terminal failures.
pub async fn run_ask(args: AskArgs) -> Result<i32, CliError> {
    let config = load_config(&args.common)?;
    let attachments = load_all(&args.attachments).await?;
    let question = compose_question(&args.question_text(), &attachments);
    let mut console = stdio_console().with_findings(args.common.show_findings);

    if args.internal {
        let responder = factory::build_internal(&config)?;
        ask_internal(&responder, &mut console, &question).await?;
        return Ok(EXIT_ANSWERED);
    }

    let pipeline = factory::build_pipeline(&config)?.with_progress(Arc::new(ConsoleProgress));
    let interrupts = Interrupts::listen();
    let (cancel, _turn) = interrupts.turn();
    let result = ask(&pipeline, &mut console, &question, &cancel).await?;

    if args.requirements {
        if let AskResult::Answered(context) = &result {
            print_requirements(&pipeline, &mut console, context).await?;
        }
    }
    Ok(result.exit_code())
}

/// Run `theo chat`.
///
/// # Errors
///
/// Configuration and terminal failures. Per-turn failures are reported and
/// the session continues.
pub async fn run_chat(args: ChatArgs) -> Result<i32, CliError> {
    let config = load_config(&args.common)?;
    let pipeline = factory::build_pipeline(&config)?.with_progress(Arc::new(ConsoleProgress));
    let responder = factory::build_internal(&config)?;
    let mut console = stdio_console().with_findings(args.common.show_findings);
    let interrupts = Interrupts::listen();
    chat(&pipeline, &responder, &mut console, &interrupts, args.internal).await
}

/// Apply command-line overrides on top of the loaded configuration.
pub fn apply_overrides(config: &mut TheoConfig, common: &CommonArgs) {
    if let Some(model) = &common.research_model {
        config.models.research = model.clone();
    }
    if common.no_restore {
        config.reasoning.restore_placeholders = false;
    }
}

fn load_config(common: &CommonArgs) -> Result<TheoConfig, CliError> {
    let (mut config, path) = theo_core::config::load(common.config.as_deref())?;
    match path {
        Some(path) => debug!(path = %path.display(), "Configuration loaded"),
        None => debug!("Configuration taken from environment"),
    }
    apply_overrides(&mut config, common);
    Ok(config)
}

fn stdio_console() -> Console<BufReader<Stdin>, Stdout> {
    Console::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
}

// ─────────────────────────────────────────────────────────────────────────────
// Interrupts
// ─────────────────────────────────────────────────────────────────────────────

/// Routes Ctrl-C to the turn in flight.
///
/// Once a SIGINT handler is installed it stays for the life of the process,
/// so a single listener serves every turn of a session.
#[derive(Debug, Clone, Default)]
pub struct Interrupts {
    current: Arc<Mutex<Option<CancellationToken>>>,
}

impl Interrupts {
    /// Install the Ctrl-C listener. With no turn running, Ctrl-C exits with
    /// [`EXIT_CANCELLED`].
    #[must_use]
    pub fn listen() -> Self {
        let interrupts = Self::default();
        let listener = interrupts.clone();
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                if !listener.interrupt() {
                    info!("Interrupt received at the prompt, exiting");
                    std::process::exit(EXIT_CANCELLED);
                }
            }
        });
        interrupts
    }

    /// Open a turn. Its token is cancelled by the next interrupt until the
    /// returned scope is dropped.
    #[must_use]
    pub fn turn(&self) -> (CancellationToken, TurnScope) {
        let token = CancellationToken::new();
        *self.current.lock() = Some(token.clone());
        (
            token,
            TurnScope {
                current: Arc::clone(&self.current),
            },
        )
    }

    /// Cancel the turn in flight. False if there is none.
    pub fn interrupt(&self) -> bool {
        match self.current.lock().as_ref() {
            Some(token) => {
                info!("Interrupt received, cancelling turn");
                token.cancel();
                true
            }
            None => false,
        }
    }
}

/// Clears the current turn on drop.
#[derive(Debug)]
pub struct TurnScope {
    current: Arc<Mutex<Option<CancellationToken>>>,
}

impl Drop for TurnScope {
    fn drop(&mut self) {
        self.current.lock().take();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Turns
// ─────────────────────────────────────────────────────────────────────────────

/// Run one masked turn and print its answer.
///
/// # Errors
///
/// Masking failures, approval violations and terminal failures.
pub async fn ask<R, W>(
    pipeline: &Pipeline,
    console: &mut Console<R, W>,
    question: &str,
    cancel: &CancellationToken,
) -> Result<AskResult, CliError>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    let mut outcome = match pipeline.run_turn(question, console, cancel).await {
        Ok(outcome) => outcome,
        Err(err) => {
            if let Some(detail) = describe_abort(&err) {
                console.println(&detail).await?;
            }
            return Err(err.into());
        }
    };
    loop {
        match outcome {
            TurnOutcome::Answered(context) => {
                if console.shows_findings() {
                    if let Some(findings) = &context.findings {
                        console.print_findings(findings).await?;
                    }
                }
                if let Some(answer) = &context.answer {
                    console.print_answer(answer).await?;
                }
                return Ok(AskResult::Answered(Box::new(context)));
            }
            TurnOutcome::Cancelled(context) => {
                let message = if context.research_started {
                    "Cancelled. Research results were discarded."
                } else {
                    "Cancelled. Nothing was sent."
                };
                console.println(message).await?;
                return Ok(AskResult::Cancelled);
            }
            TurnOutcome::Interrupted { context, error } => {
                console.println(&format!("Turn interrupted: {error}")).await?;
                if cancel.is_cancelled()
                    || !console
                        .confirm("Retry with the approved query?")
                        .await?
                {
                    return Ok(AskResult::Abandoned(error));
                }
                info!(turn_id = %context.turn_id, "Retrying interrupted turn");
                outcome = pipeline.resume(context, cancel).await?;
            }
        }
    }
}

/// Answer with the internal model only and print the reply.
///
/// # Errors
///
/// Backend and terminal failures.
pub async fn ask_internal<R, W>(
    responder: &InternalResponder,
    console: &mut Console<R, W>,
    question: &str,
) -> Result<(), CliError>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    let answer = responder.answer(question).await?;
    console.println("").await?;
    console.println(&answer).await?;
    Ok(())
}

/// Derive and print a requirements list for an answered turn.
///
/// # Errors
///
/// Reasoning and terminal failures.
pub async fn print_requirements<R, W>(
    pipeline: &Pipeline,
    console: &mut Console<R, W>,
    context: &PipelineContext,
) -> Result<(), CliError>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    let list = pipeline.requirements(context).await?;
    console.println("\nRequirements:").await?;
    console.println(&list.text).await?;
    Ok(())
}

/// Interactive loop until `/quit` or end of input.
///
/// # Errors
///
/// Terminal failures only.
pub async fn chat<R, W>(
    pipeline: &Pipeline,
    responder: &InternalResponder,
    console: &mut Console<R, W>,
    interrupts: &Interrupts,
    mut internal: bool,
) -> Result<i32, CliError>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    console.println(CHAT_HELP).await?;
    let mut last: Option<Box<PipelineContext>> = None;

    loop {
        let prompt = if internal { "theo (internal)> " } else { "theo> " };
        let Some(line) = console.read_line(prompt).await? else {
            break;
        };
        let result = match line.trim() {
            "" => Ok(()),
            "/quit" | "/exit" => break,
            "/help" => console.println(CHAT_HELP).await.map_err(CliError::from),
            "/internal" => {
                internal = !internal;
                let mode = if internal {
                    "Internal mode: questions go to the internal model, nothing is researched."
                } else {
                    "Research mode: questions are masked and need approval."
                };
                console.println(mode).await.map_err(CliError::from)
            }
            "/requirements" => match &last {
                Some(context) => print_requirements(pipeline, console, context).await,
                None => console
                    .println("Ask a researched question first.")
                    .await
                    .map_err(CliError::from),
            },
            question if internal => ask_internal(responder, console, question).await,
            question => {
                let (cancel, _turn) = interrupts.turn();
                match ask(pipeline, console, question, &cancel).await {
                    Ok(AskResult::Answered(context)) => {
                        last = Some(context);
                        Ok(())
                    }
                    Ok(_) => Ok(()),
                    Err(e) => Err(e),
                }
            }
        };

        match result {
            Ok(()) => {}
            Err(CliError::Io(e)) => return Err(CliError::Io(e)),
            Err(e) => {
                error!(error = %e, "Turn failed");
                console.println(&format!("error: {e}")).await?;
            }
        }
    }
    Ok(EXIT_ANSWERED)
}
