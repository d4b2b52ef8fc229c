//! Builds per-invocation handles for resolved models.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tracing::debug;

use super::anthropic::AnthropicProvider;
use super::error::LLMError;
use super::handle::LlmHandle;
use super::openai::OpenAICompatibleProvider;
use super::provider::{LLMProvider, Provider};
use super::registry::ModelSpec;
use crate::config::LlmConfig;
use crate::credential::ApiKey;

/// Factory for [`LlmHandle`]s.
///
/// Every call to [`ClientFactory::build`] produces a handle with its own HTTP
/// client and concurrency budget; nothing is shared between handles.
#[derive(Debug, Clone)]
pub struct ClientFactory {
    openai_base_url: String,
    anthropic_base_url: String,
    request_timeout: Duration,
    retry_base_delay: Duration,
}

impl Default for ClientFactory {
    fn default() -> Self {
        Self::new(&LlmConfig::default())
    }
}

impl ClientFactory {
    pub fn new(config: &LlmConfig) -> Self {
        Self {
            openai_base_url: config.openai_base_url.clone(),
            anthropic_base_url: config.anthropic_base_url.clone(),
            request_timeout: Duration::from_secs(config.request_timeout_seconds),
            retry_base_delay: Duration::from_millis(config.retry_base_delay_ms),
        }
    }

    /// Configure a handle for `spec`. No network I/O happens here.
    pub fn build(&self, spec: &ModelSpec, credential: &ApiKey) -> Result<LlmHandle, LLMError> {
        let client = Client::builder().timeout(self.request_timeout).build()?;

        let provider: Arc<dyn LLMProvider> = match spec.provider {
            Provider::OpenAI => Arc::new(OpenAICompatibleProvider::new(
                client,
                self.openai_base_url.clone(),
                Some(credential.expose().to_string()),
            )),
            Provider::Anthropic => Arc::new(AnthropicProvider::new(
                client,
                self.anthropic_base_url.clone(),
                credential.expose().to_string(),
            )),
        };

        debug!(
            model = %spec.name,
            provider = %spec.provider,
            max_concurrency = spec.max_concurrency,
            max_retries = spec.max_retries,
            "Built LLM handle"
        );

        Ok(LlmHandle::new(provider, spec, self.retry_base_delay))
    }
}
