//! Error types for the terminal front-end.

use std::path::PathBuf;

use theo_core::PipelineError;
use theo_core::config::ConfigError;

/// Front-end failures.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The pipeline failed.
    #[error("{0}")]
    Pipeline(#[from] PipelineError),

    /// An attachment could not be read.
    #[error("cannot read attachment {}: {source}", path.display())]
    Attachment {
        /// The attachment path.
        path: PathBuf,
        /// The underlying error.
        source: std::io::Error,
    },

    /// Terminal I/O failed.
    #[error("terminal I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<theo_core::backend::BackendError> for CliError {
    fn from(err: theo_core::backend::BackendError) -> Self {
        Self::Pipeline(PipelineError::Backend(err))
    }
}
