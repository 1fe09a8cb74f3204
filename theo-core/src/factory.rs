//! Wiring of configured OpenRouter backends into a [`Pipeline`].

use std::sync::Arc;

use crate::backend::openrouter::{
    ChatClient, ChatClientConfig, OpenRouterAssistant, OpenRouterMasking, OpenRouterReasoning,
    OpenRouterResearch,
};
use crate::config::TheoConfig;
use crate::error::PipelineError;
use crate::internal::InternalResponder;
use crate::masking::{Masker, MaskerConfig, Taxonomy};
use crate::pipeline::Pipeline;
use crate::reasoning::{Reasoner, ReasonerConfig};
use crate::research::{ResearchDispatcher, RetryPolicy};

/// Shared chat client for `config.provider`.
///
/// # Errors
///
/// Missing API key or an unusable provider URL.
pub fn chat_client(config: &TheoConfig) -> Result<Arc<ChatClient>, PipelineError> {
    let api_key = config.require_api_key()?;
    let client = ChatClient::new(ChatClientConfig {
        base_url: config.provider.base_url.clone(),
        api_key: api_key.to_string(),
        referer: config.provider.referer.clone(),
        title: config.provider.title.clone(),
        timeout: config.provider.timeout,
        connect_timeout: config.provider.connect_timeout,
        ..ChatClientConfig::default()
    })?;
    Ok(Arc::new(client))
}

/// Build the full pipeline from configuration.
///
/// # Errors
///
/// As [`chat_client`].
pub fn build_pipeline(config: &TheoConfig) -> Result<Pipeline, PipelineError> {
    let client = chat_client(config)?;

    let masker = Masker::new(
        Arc::new(OpenRouterMasking::new(
            client.clone(),
            config.models.masking.clone(),
            config.masking.max_tokens,
        )),
        MaskerConfig {
            taxonomy: Taxonomy::with_extra(&config.masking.extra_categories),
            long_input_warning_chars: config.masking.long_input_warning_chars,
        },
    );

    let dispatcher = ResearchDispatcher::new(
        Arc::new(OpenRouterResearch::new(
            client.clone(),
            config.models.research.clone(),
        )),
        RetryPolicy {
            max_attempts: config.research.max_attempts,
            base_backoff: config.research.base_backoff,
            max_backoff: config.research.max_backoff,
        },
    )
    .with_response_language(config.research.response_language.clone());

    let reasoner = Reasoner::new(
        Arc::new(OpenRouterReasoning::new(
            client,
            config.models.reasoning.clone(),
        )),
        ReasonerConfig {
            restore_placeholders: config.reasoning.restore_placeholders,
        },
    );

    Ok(Pipeline::new(masker, dispatcher, reasoner))
}

/// Build the internal-mode responder from configuration.
///
/// # Errors
///
/// As [`chat_client`].
pub fn build_internal(config: &TheoConfig) -> Result<InternalResponder, PipelineError> {
    let client = chat_client(config)?;
    Ok(InternalResponder::new(Arc::new(OpenRouterAssistant::new(
        client,
        config.models.assistant().to_string(),
    ))))
}
