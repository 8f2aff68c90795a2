//! LLM provider factory.
//!
//! Builds the single client value the service is constructed with at
//! startup. The client is passed down explicitly; nothing here keeps
//! global state.

use crate::client::LlmClient;
use crate::error::LlmError;
use crate::providers::{HostedClient, OllamaClient};
use crate::types::ProviderType;
use std::sync::Arc;
use std::time::Duration;

/// Create an LLM client based on the provider name.
///
/// A hosted provider without an API key is still returned; it reports
/// `is_configured() == false` so the answer pipeline can route to
/// document selection instead of failing.
///
/// # Errors
/// Returns `LlmError::NotConfigured` if the provider is unknown or disabled.
pub fn create_client(
    provider: &str,
    endpoint: Option<&str>,
    api_key: Option<&str>,
    timeout: Duration,
) -> Result<Arc<dyn LlmClient>, LlmError> {
    match ProviderType::parse(provider) {
        Some(ProviderType::Hosted) => {
            let api_key = api_key.map(str::to_string);
            let client = match endpoint {
                Some(url) => HostedClient::with_base_url(url, api_key, timeout),
                None => HostedClient::new(api_key, timeout),
            };
            if !client.is_configured() {
                tracing::warn!("Hosted provider has no API key; generation disabled");
            }
            Ok(Arc::new(client))
        }
        Some(ProviderType::Ollama) => {
            let base_url = endpoint.unwrap_or("http://localhost:11434");
            Ok(Arc::new(OllamaClient::with_base_url(base_url, timeout)))
        }
        Some(ProviderType::Disabled) => {
            Err(LlmError::NotConfigured("generation disabled by configuration".to_string()))
        }
        None => Err(LlmError::NotConfigured(format!("Unknown provider: {}", provider))),
    }
}
