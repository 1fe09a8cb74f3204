//! Configuration error types.

use std::path::PathBuf;

use thiserror::Error;

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    // ─────────────────────────────────────────────────────────────────────────
    // Value validation
    // ─────────────────────────────────────────────────────────────────────────
    /// Schema version not supported.
    #[error("unsupported schema version {version}, expected 1")]
    UnsupportedSchemaVersion { version: u32 },

    /// A model identifier is empty.
    #[error("model for '{role}' must not be empty")]
    EmptyModel { role: &'static str },

    /// Invalid URL format.
    #[error("invalid URL '{url}': {message}")]
    InvalidUrl { url: String, message: String },

    /// Retry attempts outside the supported range.
    #[error("research.max_attempts must be between 1 and 5, got {value}")]
    InvalidMaxAttempts { value: u32 },

    /// Backoff bounds are inconsistent.
    #[error("research.base_backoff must not exceed research.max_backoff")]
    InvalidBackoff,

    /// Extra category name is not usable in a token.
    #[error("invalid extra category '{name}': expected UPPER_SNAKE_CASE")]
    InvalidCategoryName { name: String },

    /// Extra category shadows a built-in one.
    #[error("extra category '{name}' is already built in")]
    BuiltinCategory { name: String },

    /// No API key was configured.
    #[error("no API key configured (set provider.api_key or OPENROUTER_API_KEY)")]
    MissingApiKey,

    /// Required environment variable not set.
    #[error("environment variable '{var}' not set (required for field '{field}')")]
    MissingEnvVar { var: String, field: String },

    // ─────────────────────────────────────────────────────────────────────────
    // I/O and parsing
    // ─────────────────────────────────────────────────────────────────────────
    /// YAML parsing error.
    #[error("YAML parse error: {0}")]
    ParseError(#[from] serde_saphyr::Error),

    /// I/O error reading config file.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Config file not found at an explicitly requested location.
    #[error("configuration file not found (searched: {searched:?})")]
    ConfigFileNotFound { searched: Vec<PathBuf> },

    /// Empty configuration file.
    #[error("configuration file is empty")]
    EmptyConfigFile,
}
