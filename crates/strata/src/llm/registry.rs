//! Model registry mapping logical model names to backend parameters.

use std::collections::HashMap;

use tracing::info;

use super::provider::Provider;
use crate::config::ModelConfig;
use crate::error::GenerateError;

/// Outstanding model calls allowed per handle.
pub const DEFAULT_MAX_CONCURRENCY: usize = 10;

/// Automatic retries after the first attempt on transient failures.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Sampling temperature every handle is built with.
pub const DETERMINISTIC_TEMPERATURE: f32 = 0.0;

const BUILTIN_OPENAI_MODELS: &[&str] = &["gpt-3.5-turbo", "gpt-3.5-turbo-16k", "gpt-4"];

/// Construction parameters for one supported model.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSpec {
    /// Caller-facing logical name.
    pub name: String,
    pub provider: Provider,
    /// Model identifier sent to the backend.
    pub model: String,
    /// Environment variable holding a default credential for local use.
    pub api_key_env: Option<String>,
    pub temperature: f32,
    pub max_concurrency: usize,
    pub max_retries: u32,
    pub max_tokens: Option<u32>,
}

impl ModelSpec {
    /// Spec with the standard reliability defaults.
    pub fn new(name: impl Into<String>, provider: Provider) -> Self {
        let name = name.into();
        Self {
            model: name.clone(),
            name,
            provider,
            api_key_env: None,
            temperature: DETERMINISTIC_TEMPERATURE,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            max_retries: DEFAULT_MAX_RETRIES,
            max_tokens: None,
        }
    }

    pub fn with_api_key_env(mut self, var: impl Into<String>) -> Self {
        self.api_key_env = Some(var.into());
        self
    }
}

impl From<&ModelConfig> for ModelSpec {
    fn from(config: &ModelConfig) -> Self {
        Self {
            name: config.name.clone(),
            provider: config.provider,
            model: config.model.clone().unwrap_or_else(|| config.name.clone()),
            api_key_env: config.api_key_env.clone(),
            temperature: DETERMINISTIC_TEMPERATURE,
            max_concurrency: config.max_concurrency,
            max_retries: config.max_retries,
            max_tokens: config.max_tokens,
        }
    }
}

/// Registry of supported models, keyed by logical name.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    models: HashMap<String, ModelSpec>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in OpenAI tiers.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for name in BUILTIN_OPENAI_MODELS {
            registry.register(
                ModelSpec::new(*name, Provider::OpenAI).with_api_key_env("OPENAI_API_KEY"),
            );
        }
        registry
    }

    /// Built-in models plus any configured additions. A configured model
    /// with a built-in name replaces the built-in entry.
    pub fn from_config(models: &[ModelConfig]) -> Self {
        let mut registry = Self::builtin();
        for config in models {
            info!(model = %config.name, provider = %config.provider, "Registered model");
            registry.register(ModelSpec::from(config));
        }
        registry
    }

    /// Register a model spec.
    pub fn register(&mut self, spec: ModelSpec) {
        self.models.insert(spec.name.clone(), spec);
    }

    /// Get a model spec by name.
    pub fn get(&self, name: &str) -> Option<&ModelSpec> {
        self.models.get(name)
    }

    /// Resolve a logical model name, failing for names outside the registry.
    pub fn resolve(&self, name: &str) -> Result<&ModelSpec, GenerateError> {
        self.get(name)
            .ok_or_else(|| GenerateError::ModelNotAvailable(name.to_string()))
    }

    /// Supported model names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.models.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
