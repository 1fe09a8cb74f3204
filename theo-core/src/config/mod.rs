//! Configuration: YAML file with environment substitution, or environment only.

pub mod duration_format;
mod error;
mod loader;
mod schema;

pub use error::ConfigError;
pub use loader::{
    API_KEY_ENV, default_config_paths, find_config_file, load, load_config, substitute_env_vars,
    validate,
};
pub use schema::{
    DEFAULT_GPT_MODEL, DEFAULT_RESEARCH_MODEL, MaskingConfig, ModelsConfig, ProviderConfig,
    ReasoningConfig, ResearchConfig, TheoConfig,
};
