//! LLM provider factory.
//!
//! Resolves a generation client from configuration. Generation is optional:
//! the `none` provider yields no client and callers fall back to extractive
//! answers.

use crate::client::LlmClient;
use crate::providers::{OllamaClient, OpenAiClient};
use crate::types::ProviderType;
use docqa_core::{AppError, AppResult};
use std::sync::Arc;

/// Create an LLM client based on the provider name.
///
/// # Arguments
/// * `provider` - Provider identifier ("none", "ollama", "openai")
/// * `endpoint` - Optional custom endpoint URL
/// * `api_key` - Optional API key (for providers that require it)
///
/// # Returns
/// `Ok(None)` when generation is disabled, otherwise the client.
///
/// # Errors
/// Returns `AppError::Config` if the provider is unknown or a required
/// secret is missing.
pub fn create_client(
    provider: &str,
    endpoint: Option<&str>,
    api_key: Option<&str>,
) -> AppResult<Option<Arc<dyn LlmClient>>> {
    let provider_type = ProviderType::parse(provider)
        .ok_or_else(|| AppError::Config(format!("Unknown provider: {}", provider)))?;

    match provider_type {
        ProviderType::None => {
            tracing::debug!("Generation disabled, answers will be extractive");
            Ok(None)
        }
        ProviderType::Ollama => {
            let base_url = endpoint.unwrap_or("http://localhost:11434");
            Ok(Some(Arc::new(OllamaClient::with_base_url(base_url))))
        }
        ProviderType::OpenAI => {
            let api_key = api_key.ok_or_else(|| {
                AppError::Config("OpenAI provider requires API key".to_string())
            })?;
            let client = match endpoint {
                Some(base_url) => OpenAiClient::with_base_url(api_key, base_url),
                None => OpenAiClient::new(api_key),
            };
            Ok(Some(Arc::new(client)))
        }
    }
}
