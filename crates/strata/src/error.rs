//! Invocation error taxonomy.

use thiserror::Error;

use crate::llm::{CallError, LLMError};
use crate::prompt::TemplateError;

/// Errors surfaced by a prompt invocation. Each variant is a distinct kind so
/// upstream layers can map it to their own response.
#[derive(Debug, Error)]
pub enum GenerateError {
    /// Requested model is not in the registry.
    #[error("model '{0}' is not available")]
    ModelNotAvailable(String),

    /// No credential was supplied for a model that requires one.
    #[error("missing API key for model '{0}'")]
    CredentialMissing(String),

    /// The backend rejected the supplied credential.
    #[error("invalid API key for model '{0}'")]
    CredentialInvalid(String),

    /// Variables do not match the template placeholders.
    #[error("prompt template format error: {0}")]
    PromptTemplateFormat(#[from] TemplateError),

    /// Transient backend failures outlasted the retry budget.
    #[error("backend for model '{model}' unavailable after {attempts} attempt(s): {source}")]
    BackendUnavailable {
        model: String,
        attempts: u32,
        #[source]
        source: LLMError,
    },

    /// Any other backend failure.
    #[error("backend error for model '{model}': {source}")]
    Backend {
        model: String,
        #[source]
        source: LLMError,
    },
}

impl GenerateError {
    /// Classify a failed backend call.
    ///
    /// Authentication failures become `CredentialInvalid` regardless of when
    /// they were observed, so a rejected key never leaks out as a transport
    /// error.
    pub fn from_call(model: &str, err: CallError) -> Self {
        let CallError { source, attempts } = err;
        if source.is_auth_failure() {
            GenerateError::CredentialInvalid(model.to_string())
        } else if source.is_transient() {
            GenerateError::BackendUnavailable {
                model: model.to_string(),
                attempts,
                source,
            }
        } else {
            GenerateError::Backend {
                model: model.to_string(),
                source,
            }
        }
    }

    /// Stable snake_case name of the error kind.
    pub fn code(&self) -> &'static str {
        match self {
            GenerateError::ModelNotAvailable(_) => "model_not_available",
            GenerateError::CredentialMissing(_) => "credential_missing",
            GenerateError::CredentialInvalid(_) => "credential_invalid",
            GenerateError::PromptTemplateFormat(_) => "prompt_template_format",
            GenerateError::BackendUnavailable { .. } => "backend_unavailable",
            GenerateError::Backend { .. } => "backend_error",
        }
    }
}
