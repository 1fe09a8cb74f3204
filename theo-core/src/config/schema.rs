//! Configuration schema type definitions.
//!
//! # Example
//! ```yaml
//! schema: 1
//!
//! provider:
//!   api_key: ${OPENROUTER_API_KEY}
//!   timeout: 60s
//!
//! models:
//!   masking: openai/gpt-5.2
//!   reasoning: openai/gpt-5.2
//!   research: perplexity/sonar-pro
//!
//! masking:
//!   extra_categories: [CONTRACT]
//!
//! research:
//!   max_attempts: 3
//!   base_backoff: 500ms
//!   response_language: German
//! ```

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::duration_format;
use crate::backend::openrouter::DEFAULT_BASE_URL;

/// Default model for masking, reasoning and internal mode.
pub const DEFAULT_GPT_MODEL: &str = "openai/gpt-5.2";
/// Default research model.
pub const DEFAULT_RESEARCH_MODEL: &str = "perplexity/sonar-pro";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top level
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TheoConfig {
    /// Schema version (must be 1).
    pub schema: u32,

    /// Inference provider connection.
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Model identifiers per stage.
    #[serde(default)]
    pub models: ModelsConfig,

    /// Masking stage settings.
    #[serde(default)]
    pub masking: MaskingConfig,

    /// Research stage settings.
    #[serde(default)]
    pub research: ResearchConfig,

    /// Reasoning stage settings.
    #[serde(default)]
    pub reasoning: ReasoningConfig,
}

impl Default for TheoConfig {
    fn default() -> Self {
        Self {
            schema: 1,
            provider: ProviderConfig::default(),
            models: ModelsConfig::default(),
            masking: MaskingConfig::default(),
            research: ResearchConfig::default(),
            reasoning: ReasoningConfig::default(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Sections
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// OpenAI-compatible provider settings.
#[derive(Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// API root.
    pub base_url: String,

    /// Bearer token. Never serialized.
    #[serde(skip_serializing)]
    pub api_key: String,

    /// `HTTP-Referer` header.
    pub referer: Option<String>,

    /// `X-Title` header.
    pub title: Option<String>,

    /// Whole-request timeout.
    #[serde(with = "duration_format")]
    pub timeout: Duration,

    /// Connect timeout.
    #[serde(with = "duration_format")]
    pub connect_timeout: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: String::new(),
            referer: None,
            title: Some("theo".to_string()),
            timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .field("referer", &self.referer)
            .field("title", &self.title)
            .field("timeout", &self.timeout)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

/// Model identifiers.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ModelsConfig {
    /// Masking model. Sees raw text; must be trusted.
    pub masking: String,
    /// Reasoning model. Sees sanitized text only.
    pub reasoning: String,
    /// Research model. Sees sanitized text only.
    pub research: String,
    /// Internal-mode model; defaults to the masking model.
    pub assistant: Option<String>,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            masking: DEFAULT_GPT_MODEL.to_string(),
            reasoning: DEFAULT_GPT_MODEL.to_string(),
            research: DEFAULT_RESEARCH_MODEL.to_string(),
            assistant: None,
        }
    }
}

impl ModelsConfig {
    /// Model used in internal mode.
    #[must_use]
    pub fn assistant(&self) -> &str {
        self.assistant.as_deref().unwrap_or(&self.masking)
    }
}

/// Masking stage settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MaskingConfig {
    /// Additional UPPER_SNAKE_CASE categories accepted from the model.
    pub extra_categories: Vec<String>,
    /// Flag queries longer than this (chars) that come back with nothing masked.
    pub long_input_warning_chars: usize,
    /// Completion token cap for the masking call.
    pub max_tokens: u32,
}

impl Default for MaskingConfig {
    fn default() -> Self {
        Self {
            extra_categories: Vec::new(),
            long_input_warning_chars: 500,
            max_tokens: 16384,
        }
    }
}

/// Research stage settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ResearchConfig {
    /// Total attempts including the first (1..=5).
    pub max_attempts: u32,
    /// Delay before the first retry.
    #[serde(with = "duration_format")]
    pub base_backoff: Duration,
    /// Upper bound for retry delays.
    #[serde(with = "duration_format")]
    pub max_backoff: Duration,
    /// Ask the research service to answer in this language.
    pub response_language: Option<String>,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
            response_language: None,
        }
    }
}

/// Reasoning stage settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReasoningConfig {
    /// Put original values back into the answer.
    pub restore_placeholders: bool,
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            restore_placeholders: true,
        }
    }
}
