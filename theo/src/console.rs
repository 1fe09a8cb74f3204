//! Terminal interaction: the approval prompt, progress lines, answers.

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::warn;

use theo_core::PipelineError;
use theo_core::approval::{Decision, Presentation};
use theo_core::masking::{DetectionSummary, MaskingError};
use theo_core::pipeline::{PipelineEvent, ProgressSink, Reviewer};
use theo_core::reasoning::FinalAnswer;
use theo_core::research::Findings;

/// Longest findings excerpt printed before an answer, in characters.
pub const FINDINGS_EXCERPT_CHARS: usize = 2000;

/// Line-oriented console over any async reader/writer pair.
pub struct Console<R, W> {
    input: R,
    output: W,
    show_findings: bool,
}

impl<R, W> Console<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(input: R, output: W) -> Self {
        Self {
            input,
            output,
            show_findings: false,
        }
    }

    /// Also print research findings before each answer.
    #[must_use]
    pub fn with_findings(mut self, show: bool) -> Self {
        self.show_findings = show;
        self
    }

    /// Whether findings are printed.
    pub fn shows_findings(&self) -> bool {
        self.show_findings
    }

    /// The writer, e.g. to inspect captured output in tests.
    pub fn output(&self) -> &W {
        &self.output
    }

    /// Write `text` followed by a newline.
    ///
    /// # Errors
    ///
    /// Propagates write failures.
    pub async fn println(&mut self, text: &str) -> std::io::Result<()> {
        self.output.write_all(text.as_bytes()).await?;
        self.output.write_all(b"\n").await?;
        self.output.flush().await
    }

    /// Show `prompt` and read one line. `None` at end of input.
    ///
    /// # Errors
    ///
    /// Propagates I/O failures.
    pub async fn read_line(&mut self, prompt: &str) -> std::io::Result<Option<String>> {
        self.output.write_all(prompt.as_bytes()).await?;
        self.output.flush().await?;
        let mut line = String::new();
        if self.input.read_line(&mut line).await? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }

    /// Ask a yes/no question. End of input counts as no.
    ///
    /// # Errors
    ///
    /// Propagates I/O failures.
    pub async fn confirm(&mut self, question: &str) -> std::io::Result<bool> {
        let answer = self.read_line(&format!("{question} [y/N] ")).await?;
        Ok(matches!(
            answer.as_deref().map(str::trim),
            Some("y" | "Y" | "yes" | "Yes")
        ))
    }

    /// Print the research findings as received, still masked, cut to
    /// [`FINDINGS_EXCERPT_CHARS`].
    ///
    /// # Errors
    ///
    /// Propagates write failures.
    pub async fn print_findings(&mut self, findings: &Findings) -> std::io::Result<()> {
        self.println("\nResearch findings:").await?;
        match findings.text.char_indices().nth(FINDINGS_EXCERPT_CHARS) {
            Some((cut, _)) => {
                self.println(&findings.text[..cut]).await?;
                self.println("[...]").await
            }
            None => self.println(&findings.text).await,
        }
    }

    /// Print a final answer with its sources and warnings.
    ///
    /// # Errors
    ///
    /// Propagates write failures.
    pub async fn print_answer(&mut self, answer: &FinalAnswer) -> std::io::Result<()> {
        self.println("").await?;
        self.println(&answer.text).await?;
        if !answer.sources.is_empty() {
            self.println("\nSources:").await?;
            for source in &answer.sources {
                self.println(&format!("  - {source}")).await?;
            }
        }
        if !answer.restored {
            self.println("\n(placeholders kept; restoration is off)").await?;
        }
        if answer.query_edited {
            self.println("(the question was edited before it was sent)").await?;
        }
        Ok(())
    }

    async fn ask_decision(
        &mut self,
        presentation: &Presentation,
        summary: &DetectionSummary,
    ) -> std::io::Result<Decision> {
        self.println(&render_summary(summary)).await?;
        self.println(&format!(
            "\nQuery to be sent {}:\n  {}\n",
            presentation.id, presentation.sanitized_query
        ))
        .await?;

        loop {
            let Some(choice) = self.read_line("[a]pprove  [e]dit  [c]ancel > ").await? else {
                return Ok(Decision::Cancel);
            };
            match choice.trim().to_ascii_lowercase().as_str() {
                "a" | "approve" => return Ok(Decision::Approve),
                "c" | "cancel" => return Ok(Decision::Cancel),
                "e" | "edit" => {
                    let Some(text) = self.read_line("Edited query > ").await? else {
                        return Ok(Decision::Cancel);
                    };
                    return Ok(Decision::Edit(text));
                }
                _ => self.println("Please answer a, e or c.").await?,
            }
        }
    }
}

#[async_trait]
impl<R, W> Reviewer for Console<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn review(
        &mut self,
        presentation: &Presentation,
        summary: &DetectionSummary,
    ) -> Decision {
        match self.ask_decision(presentation, summary).await {
            Ok(decision) => decision,
            Err(e) => {
                warn!(error = %e, "Console unavailable, cancelling");
                Decision::Cancel
            }
        }
    }
}

/// Human-readable detection summary, one `original -> token` line per value.
///
/// For the local terminal only; the originals are exactly what the research
/// backend must never see.
#[must_use]
pub fn render_summary(summary: &DetectionSummary) -> String {
    if summary.is_empty() {
        let mut text = "Nothing was masked.".to_string();
        if summary.long_input_without_detections {
            text.push_str(" This is a long question; read it carefully before approving.");
        }
        return text;
    }

    let mut text = format!(
        "Masked {} item(s): {} personal, {} business",
        summary.total(),
        summary.pii_count,
        summary.business_count
    );
    if let Some(confidence) = summary.overall_confidence {
        text.push_str(&format!(" (confidence {:.0}%)", confidence * 100.0));
    }
    for group in &summary.groups {
        text.push_str(&format!("\n  {}:", group.label));
        for entry in &group.entries {
            text.push_str(&format!("\n    {} -> {}", entry.original, entry.token));
        }
    }
    text
}

/// What to show the user when masking aborted the turn, beyond the error
/// message itself.
#[must_use]
pub fn describe_abort(err: &PipelineError) -> Option<String> {
    match err {
        PipelineError::Masking(MaskingError::OverlappingDetection {
            first_category,
            first_text,
            second_category,
            second_text,
            ..
        }) => Some(format!(
            "Masking stopped: \"{first_text}\" ({first_category}) overlaps \"{second_text}\" \
             ({second_category}). Nothing was sent; rephrase the question and try again."
        )),
        _ => None,
    }
}

/// Writes step progress to stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleProgress;

impl ProgressSink for ConsoleProgress {
    fn emit(&self, event: PipelineEvent) {
        match event {
            PipelineEvent::StepStarted(step) => eprintln!("» {step}..."),
            PipelineEvent::StepFinished { step, detail } => eprintln!("✓ {step}: {detail}"),
            PipelineEvent::StepFailed { step, reason } => eprintln!("✗ {step}: {reason}"),
            PipelineEvent::Warning(message) => eprintln!("! {message}"),
        }
    }
}
