//! Credential gate applied between model resolution and invocation.

use std::fmt;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::GenerateError;
use crate::llm::{LlmHandle, ModelSpec};
use crate::service::ModelDescriptor;

/// A caller-supplied API key that passed the presence check.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

/// When the backend is asked whether it accepts a key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialCheck {
    /// No extra call; an authentication failure on the real call is
    /// reclassified as an invalid credential.
    #[default]
    Deferred,
    /// One probe call through the handle before the real call.
    Probe,
}

/// Validates model credentials.
#[derive(Debug, Clone, Copy, Default)]
pub struct CredentialValidator {
    check: CredentialCheck,
}

impl CredentialValidator {
    pub fn new(check: CredentialCheck) -> Self {
        Self { check }
    }

    /// Presence check. Runs before any handle is built.
    pub fn require(
        &self,
        spec: &ModelSpec,
        descriptor: &ModelDescriptor,
    ) -> Result<ApiKey, GenerateError> {
        match descriptor.api_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => Ok(ApiKey::new(key)),
            _ => {
                warn!(model = %spec.name, "Missing API key");
                Err(GenerateError::CredentialMissing(spec.name.clone()))
            }
        }
    }

    /// Acceptance check. With [`CredentialCheck::Probe`] this makes one call
    /// through `handle`, under its concurrency and retry budget.
    pub async fn confirm(&self, handle: &LlmHandle) -> Result<(), GenerateError> {
        if self.check == CredentialCheck::Deferred {
            return Ok(());
        }

        match handle.probe().await {
            Ok(attempts) => {
                debug!(model = %handle.model_name(), attempts, "Credential accepted");
                Ok(())
            }
            Err(e) => {
                let err = GenerateError::from_call(handle.model_name(), e);
                warn!(model = %handle.model_name(), error = %err, "Credential probe failed");
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::llm::testing::ScriptedProvider;
    use crate::llm::{LLMError, ModelRegistry};

    fn spec() -> ModelSpec {
        ModelRegistry::builtin().resolve("gpt-3.5-turbo").unwrap().clone()
    }

    #[test]
    fn test_absent_key_is_missing() {
        let validator = CredentialValidator::default();
        let err = validator
            .require(&spec(), &ModelDescriptor::new("gpt-3.5-turbo"))
            .unwrap_err();
        assert!(matches!(err, GenerateError::CredentialMissing(ref m) if m == "gpt-3.5-turbo"));
    }

    #[test]
    fn test_blank_key_is_missing() {
        let validator = CredentialValidator::default();
        let descriptor = ModelDescriptor::new("gpt-3.5-turbo").with_api_key("   ");
        let err = validator.require(&spec(), &descriptor).unwrap_err();
        assert!(matches!(err, GenerateError::CredentialMissing(_)));
    }

    #[test]
    fn test_present_key_passes_and_is_redacted() {
        let validator = CredentialValidator::default();
        let descriptor = ModelDescriptor::new("gpt-3.5-turbo").with_api_key("sk-secret");
        let key = validator.require(&spec(), &descriptor).unwrap();
        assert_eq!(key.expose(), "sk-secret");
        assert_eq!(format!("{key:?}"), "ApiKey(***)");
    }

    #[tokio::test]
    async fn test_deferred_check_makes_no_call() {
        let provider = Arc::new(ScriptedProvider::new());
        let handle = LlmHandle::new(provider.clone(), &spec(), Duration::ZERO);

        CredentialValidator::new(CredentialCheck::Deferred)
            .confirm(&handle)
            .await
            .unwrap();
        assert_eq!(provider.probe_calls(), 0);
    }

    #[tokio::test]
    async fn test_rejected_probe_is_invalid_credential() {
        let provider = Arc::new(ScriptedProvider::new().probe_results(vec![Err(LLMError::Api {
            status: 401,
            message: "Incorrect API key provided".to_string(),
        })]));
        let handle = LlmHandle::new(provider.clone(), &spec(), Duration::ZERO);

        let err = CredentialValidator::new(CredentialCheck::Probe)
            .confirm(&handle)
            .await
            .unwrap_err();
        assert!(matches!(err, GenerateError::CredentialInvalid(_)));
        assert_eq!(provider.probe_calls(), 1);
    }

    #[tokio::test]
    async fn test_accepted_probe_passes() {
        let provider = Arc::new(ScriptedProvider::new());
        let handle = LlmHandle::new(provider.clone(), &spec(), Duration::ZERO);

        CredentialValidator::new(CredentialCheck::Probe)
            .confirm(&handle)
            .await
            .unwrap();
        assert_eq!(provider.probe_calls(), 1);
        assert_eq!(provider.chat_calls(), 0);
    }

    #[test]
    fn test_check_parses_from_lowercase() {
        let check: CredentialCheck = serde_json::from_str("\"probe\"").unwrap();
        assert_eq!(check, CredentialCheck::Probe);
    }
}
