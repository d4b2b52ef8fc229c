//! Entry point for prompt invocations.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::chain::{ChainOutput, DebugReport, LlmChain, TraceCollector};
use crate::config::Config;
use crate::credential::CredentialValidator;
use crate::error::GenerateError;
use crate::llm::{ClientFactory, ModelRegistry};
use crate::prompt::PromptTemplate;

/// Which model to use and the caller's credential for it.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelDescriptor {
    pub name: String,
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
}

impl ModelDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            api_key: None,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }
}

impl std::fmt::Debug for ModelDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelDescriptor")
            .field("name", &self.name)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Output of a single invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Generation {
    pub output: ChainOutput,
    /// `None` unless tracing was requested.
    pub debug_report: Option<DebugReport>,
}

/// Output of a batch invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchGeneration {
    pub outputs: Vec<ChainOutput>,
    pub debug_report: Option<DebugReport>,
}

/// Resolves, validates, builds and runs prompt invocations.
#[derive(Debug, Clone)]
pub struct LlmService {
    registry: ModelRegistry,
    factory: ClientFactory,
    validator: CredentialValidator,
}

impl Default for LlmService {
    fn default() -> Self {
        Self::new(
            ModelRegistry::builtin(),
            ClientFactory::default(),
            CredentialValidator::default(),
        )
    }
}

impl LlmService {
    pub fn new(
        registry: ModelRegistry,
        factory: ClientFactory,
        validator: CredentialValidator,
    ) -> Self {
        Self {
            registry,
            factory,
            validator,
        }
    }

    /// Service wired from configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            ModelRegistry::from_config(&config.models),
            ClientFactory::new(&config.llm),
            CredentialValidator::new(config.llm.credential_check),
        )
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// Run `template` filled with `variables` against `model`.
    pub async fn generate_output(
        &self,
        model: &ModelDescriptor,
        template: &PromptTemplate,
        variables: &HashMap<String, String>,
        debug: bool,
    ) -> Result<Generation, GenerateError> {
        let traced = debug;
        info!(model = %model.name, debug = traced, "Generating output");

        let chain = self.prepare(model, template, std::slice::from_ref(variables)).await?;
        let collector = debug.then(TraceCollector::new);

        let output = chain
            .call(variables, collector.as_ref())
            .await
            .inspect_err(|e| warn!(model = %model.name, error = %e, "Generation failed"))?;

        Ok(Generation {
            output,
            debug_report: collector.map(TraceCollector::finish),
        })
    }

    /// Batch form of [`generate_output`](Self::generate_output): one handle,
    /// one concurrency budget, one report for every input set.
    pub async fn generate_outputs(
        &self,
        model: &ModelDescriptor,
        template: &PromptTemplate,
        variables: &[HashMap<String, String>],
        debug: bool,
    ) -> Result<BatchGeneration, GenerateError> {
        let traced = debug;
        info!(
            model = %model.name,
            debug = traced,
            batch = variables.len(),
            "Generating outputs"
        );

        let chain = self.prepare(model, template, variables).await?;
        let collector = debug.then(TraceCollector::new);

        let outputs = chain
            .apply(variables, collector.as_ref())
            .await
            .inspect_err(|e| warn!(model = %model.name, error = %e, "Generation failed"))?;

        Ok(BatchGeneration {
            outputs,
            debug_report: collector.map(TraceCollector::finish),
        })
    }

    /// Every check that can fail without touching the network runs before the
    /// handle is built.
    async fn prepare(
        &self,
        model: &ModelDescriptor,
        template: &PromptTemplate,
        variables: &[HashMap<String, String>],
    ) -> Result<LlmChain, GenerateError> {
        let spec = self.registry.resolve(&model.name).inspect_err(|_| {
            warn!(model = %model.name, "Model not found");
        })?;
        let credential = self.validator.require(spec, model)?;
        for values in variables {
            template.validate_inputs(values)?;
        }

        let handle = self
            .factory
            .build(spec, &credential)
            .map_err(|source| GenerateError::Backend {
                model: spec.name.clone(),
                source,
            })?;
        self.validator.confirm(&handle).await?;

        Ok(LlmChain::new(handle, template.clone()))
    }
}
