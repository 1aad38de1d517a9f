//! Language-model interaction for the semantic stage.
//!
//! The semantic stage talks to a [`CompletionService`] rather than to an
//! `edgequake_llm` provider directly, so tests can script replies. The
//! production implementation, [`LlmCompletionService`], sends a system
//! message and one user message per chunk.
//!
//! There is deliberately no retry loop: a failed chunk is fatal for its
//! document and the operator sees the raw reply.

use crate::config::PipelineConfig;
use crate::error::CatalogError;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use std::sync::Arc;
use tracing::debug;

/// Default model when a provider is named without one.
pub const DEFAULT_MODEL: &str = "gpt-4.1-mini";

/// One model reply plus token usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Completion {
    pub content: String,
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
}

/// Sends one system + user exchange and returns the reply.
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, system: &str, user: &str) -> Result<Completion, String>;
}

/// [`CompletionService`] backed by an `edgequake_llm` provider.
pub struct LlmCompletionService {
    provider: Arc<dyn LLMProvider>,
    options: CompletionOptions,
}

impl LlmCompletionService {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &PipelineConfig) -> Self {
        Self {
            provider,
            options: build_options(config),
        }
    }
}

#[async_trait]
impl CompletionService for LlmCompletionService {
    async fn complete(&self, system: &str, user: &str) -> Result<Completion, String> {
        let messages = vec![ChatMessage::system(system), ChatMessage::user(user)];

        let response = self
            .provider
            .chat(&messages, Some(&self.options))
            .await
            .map_err(|e| e.to_string())?;

        debug!(
            "Completion: {} input tokens, {} output tokens",
            response.prompt_tokens, response.completion_tokens
        );

        Ok(Completion {
            content: response.content,
            prompt_tokens: response.prompt_tokens,
            completion_tokens: response.completion_tokens,
        })
    }
}

/// Build `CompletionOptions` from the pipeline config.
fn build_options(config: &PipelineConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

/// Resolve the LLM provider from config or environment.
///
/// Order: explicit provider, then `provider_name` + model, then
/// `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`, then `OPENAI_API_KEY`,
/// then whatever `ProviderFactory::from_env` can find.
pub fn resolve_provider(config: &PipelineConfig) -> Result<Arc<dyn LLMProvider>, CatalogError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return create_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_provider(&prov, &model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
            return create_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| CatalogError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

fn create_provider(name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, CatalogError> {
    ProviderFactory::create_llm_provider(name, model).map_err(|e| {
        CatalogError::ProviderNotConfigured {
            provider: name.to_string(),
            hint: format!("Could not create provider '{}' with model '{}': {}", name, model, e),
        }
    })
}
