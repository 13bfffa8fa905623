pub mod mock;
pub mod openai;
pub mod retry;

use std::sync::Arc;

use syncup_core::config::ModelConfig;
use syncup_core::error::Result;
use syncup_core::traits::LlmClient;

pub use mock::MockClient;
pub use openai::OpenAiClient;
pub use retry::RetryingClient;

/// Create an LLM client based on the provider name.
///
/// `mock` (or an OpenAI provider with no API key) gives the offline
/// [`MockClient`]. Everything else speaks the OpenAI chat-completions
/// protocol, wrapped in a [`RetryingClient`] when `[model.retry]` is set.
pub fn create_client(config: &ModelConfig) -> Result<Arc<dyn LlmClient>> {
    let needs_key = config.provider == "openai" && config.base_url.is_none();
    if config.provider == "mock" || (needs_key && config.api_key.is_none()) {
        if config.provider != "mock" {
            tracing::warn!(provider = %config.provider, "No API key configured, using mock LLM");
        }
        return Ok(Arc::new(MockClient::new()));
    }

    let client: Arc<dyn LlmClient> = Arc::new(OpenAiClient::new(config.clone())?);
    Ok(match &config.retry {
        Some(retry) => Arc::new(RetryingClient::new(client, retry.clone())),
        None => client,
    })
}
