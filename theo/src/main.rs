//! theo CLI entry point.
//!
//! Dispatches to `ask` (one question) or `chat` (interactive session).

use clap::{Parser, Subcommand};

use theo::cli::{AskArgs, ChatArgs};
use theo::session::{self, EXIT_FAILED};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Definitions
// ─────────────────────────────────────────────────────────────────────────────

/// theo: privacy-first research assistant. Sensitive details are masked and
/// nothing leaves without your approval.
#[derive(Parser)]
#[command(name = "theo", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask one question: mask, approve, research, answer.
    Ask(AskArgs),
    /// Interactive session.
    Chat(ChatArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Entry Point
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let code = match cli.command {
        Commands::Ask(args) => {
            init_tracing(args.common.verbose);
            match session::run_ask(args).await {
                Ok(code) => code,
                Err(e) => {
                    tracing::error!(error = %e, "ask failed");
                    eprintln!("theo ask: {e}");
                    EXIT_FAILED
                }
            }
        }
        Commands::Chat(args) => {
            init_tracing(args.common.verbose);
            match session::run_chat(args).await {
                Ok(code) => code,
                Err(e) => {
                    tracing::error!(error = %e, "chat failed");
                    eprintln!("theo chat: {e}");
                    EXIT_FAILED
                }
            }
        }
    };

    std::process::exit(code);
}

// ─────────────────────────────────────────────────────────────────────────────
// Tracing Init
// ─────────────────────────────────────────────────────────────────────────────

/// Initialise tracing subscriber with stderr output.
///
/// `verbose` sets the filter to `debug`; otherwise `RUST_LOG` applies
/// (default: no output).
fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
