//! CLI argument types for `theo ask` and `theo chat`.
//!
//! Defined outside `main.rs` so integration tests can parse them directly.

use std::path::PathBuf;

use clap::Args;

// ─────────────────────────────────────────────────────────────────────────────
// Shared Args
// ─────────────────────────────────────────────────────────────────────────────

/// Options shared by every subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct CommonArgs {
    /// Configuration file (default: $THEO_CONFIG, /etc/theo/config.yaml, ./theo.yaml).
    #[arg(long, env = "THEO_CONFIG_PATH")]
    pub config: Option<PathBuf>,

    /// Override the research model (e.g. perplexity/sonar-pro).
    #[arg(long)]
    pub research_model: Option<String>,

    /// Keep placeholders in the answer instead of restoring originals.
    #[arg(long)]
    pub no_restore: bool,

    /// Print the raw research findings before the answer.
    #[arg(long)]
    pub show_findings: bool,

    /// Enable debug logging.
    #[arg(long, short)]
    pub verbose: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// Ask Subcommand Args
// ─────────────────────────────────────────────────────────────────────────────

/// Arguments for `theo ask`.
///
/// Masks the question, asks for approval, researches the approved text and
/// prints the answer.
#[derive(Args, Debug)]
pub struct AskArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Answer with the internal model only: no masking, no web research.
    #[arg(long)]
    pub internal: bool,

    /// Attach a file; text files are included, others are noted by name.
    #[arg(long = "attach", short = 'a', value_name = "FILE")]
    pub attachments: Vec<PathBuf>,

    /// Derive a requirements list after the answer.
    #[arg(long)]
    pub requirements: bool,

    /// The question.
    #[arg(required = true, num_args = 1..)]
    pub question: Vec<String>,
}

impl AskArgs {
    /// The question words joined with spaces.
    #[must_use]
    pub fn question_text(&self) -> String {
        self.question.join(" ")
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Chat Subcommand Args
// ─────────────────────────────────────────────────────────────────────────────

/// Arguments for `theo chat`.
///
/// Interactive session. Each line is one question; `/internal` toggles
/// internal mode, `/requirements` derives requirements for the last answer,
/// `/quit` exits.
#[derive(Args, Debug)]
pub struct ChatArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Start in internal mode.
    #[arg(long)]
    pub internal: bool,
}
