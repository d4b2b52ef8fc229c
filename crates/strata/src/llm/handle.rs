//! Per-invocation client handle: concurrency gate, retry policy and
//! deterministic sampling wrapped around one provider instance.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use super::error::LLMError;
use super::provider::LLMProvider;
use super::registry::ModelSpec;
use super::types::{ChatRequest, Usage};

/// Upper bound on a single backoff sleep.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// A finished model call.
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub finish_reason: Option<String>,
    pub usage: Option<Usage>,
    /// Attempts made, including the successful one.
    pub attempts: u32,
}

/// A model call that failed, either permanently or after exhausting retries.
#[derive(Debug, Error)]
#[error("{source} (after {attempts} attempt(s))")]
pub struct CallError {
    #[source]
    pub source: LLMError,
    pub attempts: u32,
}

/// Live client for one invocation.
pub struct LlmHandle {
    provider: Arc<dyn LLMProvider>,
    model_name: String,
    backend_model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    max_retries: u32,
    max_concurrency: usize,
    retry_base_delay: Duration,
    permits: Semaphore,
}

impl LlmHandle {
    pub fn new(
        provider: Arc<dyn LLMProvider>,
        spec: &ModelSpec,
        retry_base_delay: Duration,
    ) -> Self {
        Self {
            provider,
            model_name: spec.name.clone(),
            backend_model: spec.model.clone(),
            temperature: spec.temperature,
            max_tokens: spec.max_tokens,
            max_retries: spec.max_retries,
            max_concurrency: spec.max_concurrency,
            retry_base_delay,
            permits: Semaphore::new(spec.max_concurrency.max(1)),
        }
    }

    /// Logical model name this handle was built for.
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Run one prompt through the backend.
    pub async fn complete(&self, prompt: &str) -> Result<Completion, CallError> {
        let mut request = ChatRequest::prompt(&self.backend_model, prompt);
        request.temperature = Some(self.temperature);
        request.max_tokens = self.max_tokens;

        let (response, attempts) = self
            .with_retries("chat", || self.provider.chat(request.clone()))
            .await?;

        let Some(choice) = response.choices.into_iter().next() else {
            return Err(CallError {
                source: LLMError::EmptyResponse,
                attempts,
            });
        };

        Ok(Completion {
            text: choice.message.content,
            finish_reason: choice.finish_reason,
            usage: response.usage,
            attempts,
        })
    }

    /// Confirm the credential with the provider's lightweight probe call.
    pub async fn probe(&self) -> Result<u32, CallError> {
        let ((), attempts) = self.with_retries("probe", || self.provider.probe()).await?;
        Ok(attempts)
    }

    /// Run `op` under a concurrency permit, retrying transient failures up to
    /// `max_retries` times. Returns the value and the number of attempts.
    async fn with_retries<T, F, Fut>(&self, op: &str, mut call: F) -> Result<(T, u32), CallError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LLMError>>,
    {
        let _permit = self.permits.acquire().await.map_err(|_| CallError {
            source: LLMError::Closed,
            attempts: 0,
        })?;

        let mut attempt = 0;
        loop {
            attempt += 1;
            match call().await {
                Ok(value) => {
                    debug!(model = %self.model_name, op, attempt, "Backend call succeeded");
                    return Ok((value, attempt));
                }
                Err(e) if e.is_transient() && attempt <= self.max_retries => {
                    let delay = backoff_delay(self.retry_base_delay, attempt, e.retry_after());
                    warn!(
                        model = %self.model_name,
                        op,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient backend error, will retry"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    return Err(CallError {
                        source: e,
                        attempts: attempt,
                    });
                }
            }
        }
    }
}

/// Exponential backoff with up to 25% jitter, capped at [`MAX_BACKOFF`].
/// A server-requested wait always wins, even past the cap.
fn backoff_delay(base: Duration, attempt: u32, retry_after: Option<Duration>) -> Duration {
    let exp = base.saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)));
    let jitter_ms = (exp.as_millis() as u64) / 4;
    let jitter = Duration::from_millis(rand::rng().random_range(0..=jitter_ms));
    let backoff = exp.saturating_add(jitter).min(MAX_BACKOFF);
    backoff.max(retry_after.unwrap_or_default())
}
