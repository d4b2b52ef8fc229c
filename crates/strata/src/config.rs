use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::Path;

use tokio::fs;

use serde::Deserialize;
use thiserror::Error;

use crate::credential::CredentialCheck;
use crate::llm::{
    AnthropicProvider, DEFAULT_MAX_CONCURRENCY, DEFAULT_MAX_RETRIES, OpenAICompatibleProvider,
    Provider,
};

// ============================================================================
// Config (root)
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    /// Models added to the built-in registry.
    #[serde(default)]
    pub models: Vec<ModelConfig>,
}

impl Config {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = match fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(ConfigError::Io(e)),
        };
        let config: Self = serde_saphyr::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for model in &self.models {
            if !seen.insert(model.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "model '{}' is declared more than once",
                    model.name
                )));
            }
            if model.max_concurrency == 0 {
                return Err(ConfigError::Invalid(format!(
                    "model '{}' must allow at least one concurrent call",
                    model.name
                )));
            }
        }
        Ok(())
    }
}

// ============================================================================
// LlmConfig
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_openai_base_url")]
    pub openai_base_url: String,
    #[serde(default = "default_anthropic_base_url")]
    pub anthropic_base_url: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    #[serde(default = "default_retry_base_delay")]
    pub retry_base_delay_ms: u64,
    #[serde(default)]
    pub credential_check: CredentialCheck,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            openai_base_url: default_openai_base_url(),
            anthropic_base_url: default_anthropic_base_url(),
            request_timeout_seconds: default_request_timeout(),
            retry_base_delay_ms: default_retry_base_delay(),
            credential_check: CredentialCheck::default(),
        }
    }
}

fn default_openai_base_url() -> String {
    OpenAICompatibleProvider::DEFAULT_BASE_URL.to_string()
}

fn default_anthropic_base_url() -> String {
    AnthropicProvider::DEFAULT_BASE_URL.to_string()
}

fn default_request_timeout() -> u64 {
    60
}

fn default_retry_base_delay() -> u64 {
    500
}

// ============================================================================
// ModelConfig
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    pub name: String,
    pub provider: Provider,
    /// Backend model identifier, when it differs from `name`.
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

fn default_max_concurrency() -> usize {
    DEFAULT_MAX_CONCURRENCY
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

// ============================================================================
// ConfigError
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Yaml(#[from] serde_saphyr::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// Tests
// ============================================================================
