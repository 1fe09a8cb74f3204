//! Configuration loading and validation.
//!
//! Search order: explicit path (`--config`), `THEO_CONFIG`,
//! `/etc/theo/config.yaml`, `./theo.yaml`. With no file anywhere the
//! configuration is built from the environment alone.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info};

use super::error::ConfigError;
use super::schema::{DEFAULT_GPT_MODEL, DEFAULT_RESEARCH_MODEL, TheoConfig};
use crate::masking::{Category, is_valid_category_name};

/// Environment variable holding the API key.
pub const API_KEY_ENV: &str = "OPENROUTER_API_KEY";

/// Configuration file search paths (in priority order), excluding the
/// explicit path.
pub fn default_config_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Ok(path) = std::env::var("THEO_CONFIG") {
        paths.push(PathBuf::from(path));
    }
    paths.push(PathBuf::from("/etc/theo/config.yaml"));
    paths.push(PathBuf::from("./theo.yaml"));
    paths
}

/// Find the configuration file to use.
///
/// # Errors
///
/// An explicit path that does not exist is an error. Finding nothing on the
/// default paths is not; `Ok(None)` is returned instead.
pub fn find_config_file(explicit_path: Option<&Path>) -> Result<Option<PathBuf>, ConfigError> {
    if let Some(path) = explicit_path {
        if path.exists() {
            return Ok(Some(path.to_path_buf()));
        }
        return Err(ConfigError::ConfigFileNotFound {
            searched: vec![path.to_path_buf()],
        });
    }
    Ok(default_config_paths().into_iter().find(|p| p.exists()))
}

/// Read, substitute and parse a configuration file.
///
/// # Errors
///
/// I/O, empty-file, missing-variable and YAML errors.
pub fn load_config(path: &Path) -> Result<TheoConfig, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    if contents.trim().is_empty() {
        return Err(ConfigError::EmptyConfigFile);
    }
    let contents = substitute_env_vars(&contents)?;
    let config: TheoConfig = serde_saphyr::from_str(&contents)?;
    Ok(config)
}

/// Find, load and validate configuration, falling back to the environment.
///
/// A key in `OPENROUTER_API_KEY` fills an empty `provider.api_key`.
///
/// # Errors
///
/// Any [`ConfigError`] from loading or validation.
pub fn load(explicit_path: Option<&Path>) -> Result<(TheoConfig, Option<PathBuf>), ConfigError> {
    let path = find_config_file(explicit_path)?;
    let mut config = match &path {
        Some(path) => {
            info!(path = %path.display(), "Loading configuration file");
            load_config(path)?
        }
        None => {
            debug!("No configuration file found, using environment");
            TheoConfig::from_env()
        }
    };

    if config.provider.api_key.is_empty() {
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            config.provider.api_key = key;
        }
    }

    validate(&config)?;
    Ok((config, path))
}

impl TheoConfig {
    /// Configuration from environment variables only.
    ///
    /// - `OPENROUTER_API_KEY`
    /// - `OPENROUTER_BASE_URL`
    /// - `GPT_MODEL` (masking, reasoning, internal mode)
    /// - `PERPLEXITY_MODEL` (research)
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            config.provider.api_key = key;
        }
        if let Ok(url) = std::env::var("OPENROUTER_BASE_URL") {
            config.provider.base_url = url;
        }
        let gpt = std::env::var("GPT_MODEL").unwrap_or_else(|_| DEFAULT_GPT_MODEL.to_string());
        config.models.masking.clone_from(&gpt);
        config.models.reasoning = gpt;
        config.models.research = std::env::var("PERPLEXITY_MODEL")
            .unwrap_or_else(|_| DEFAULT_RESEARCH_MODEL.to_string());
        config
    }

    /// Return the API key, or an error if none is configured.
    ///
    /// # Errors
    ///
    /// [`ConfigError::MissingApiKey`].
    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        if self.provider.api_key.trim().is_empty() {
            return Err(ConfigError::MissingApiKey);
        }
        Ok(&self.provider.api_key)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Environment Variable Substitution
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

// SAFETY: .expect() on LazyLock with a compile-time literal regex pattern.
// Tested by test_env_var_pattern_compiles().
static ENV_VAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
        .expect("BUG: ENV_VAR_PATTERN regex is invalid")
});

/// Substitute environment variables in a string.
///
/// - `${VAR}` - Required, fail if not set
/// - `${VAR:-default}` - Optional with default
///
/// # Errors
///
/// [`ConfigError::MissingEnvVar`] for the first required variable not set.
pub fn substitute_env_vars(content: &str) -> Result<String, ConfigError> {
    let mut out = String::with_capacity(content.len());
    let mut last = 0;
    for cap in ENV_VAR_PATTERN.captures_iter(content) {
        let (Some(full), Some(name)) = (cap.get(0), cap.get(1)) else {
            continue;
        };
        out.push_str(&content[last..full.start()]);
        match (std::env::var(name.as_str()), cap.get(2)) {
            (Ok(value), _) => out.push_str(&value),
            (Err(_), Some(default)) => out.push_str(default.as_str()),
            (Err(_), None) => {
                return Err(ConfigError::MissingEnvVar {
                    var: name.as_str().to_string(),
                    field: "configuration".to_string(),
                });
            }
        }
        last = full.end();
    }
    out.push_str(&content[last..]);
    Ok(out)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Validate a configuration.
///
/// # Errors
///
/// The first rule violated.
pub fn validate(config: &TheoConfig) -> Result<(), ConfigError> {
    if config.schema != 1 {
        return Err(ConfigError::UnsupportedSchemaVersion {
            version: config.schema,
        });
    }

    for (role, model) in [
        ("masking", config.models.masking.as_str()),
        ("reasoning", config.models.reasoning.as_str()),
        ("research", config.models.research.as_str()),
        ("assistant", config.models.assistant()),
    ] {
        if model.trim().is_empty() {
            return Err(ConfigError::EmptyModel { role });
        }
    }

    if let Err(e) = url::Url::parse(&config.provider.base_url) {
        return Err(ConfigError::InvalidUrl {
            url: config.provider.base_url.clone(),
            message: e.to_string(),
        });
    }

    let attempts = config.research.max_attempts;
    if !(1..=5).contains(&attempts) {
        return Err(ConfigError::InvalidMaxAttempts { value: attempts });
    }
    if config.research.base_backoff > config.research.max_backoff {
        return Err(ConfigError::InvalidBackoff);
    }

    for name in &config.masking.extra_categories {
        if !is_valid_category_name(name) {
            return Err(ConfigError::InvalidCategoryName { name: name.clone() });
        }
        if Category::builtin(name).is_some() {
            return Err(ConfigError::BuiltinCategory { name: name.clone() });
        }
    }

    Ok(())
}
