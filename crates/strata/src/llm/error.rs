//! LLM error types.

use std::time::Duration;

use thiserror::Error;

/// Check an HTTP response for rate-limit errors, returning `RateLimit` for 429.
pub fn check_response_error(response: &reqwest::Response) -> Option<LLMError> {
    if response.status().is_success() {
        return None;
    }
    if response.status().as_u16() == 429 {
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        return Some(LLMError::RateLimit { retry_after });
    }
    None
}

/// Turn a non-success response into an error, consuming its body.
pub async fn error_from_response(response: reqwest::Response) -> LLMError {
    if let Some(err) = check_response_error(&response) {
        return err;
    }
    let status = response.status().as_u16();
    let message = response.text().await.unwrap_or_default();
    LLMError::Api { status, message }
}

/// Errors that can occur when making LLM API calls.
#[derive(Debug, Error)]
pub enum LLMError {
    /// HTTP request failed
    #[error("http request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// API returned an error response
    #[error("api error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// Rate limited (429)
    #[error("rate limited (retry after {retry_after:?}s)")]
    RateLimit { retry_after: Option<u64> },

    /// The backend answered but produced no completion.
    #[error("response contained no completion")]
    EmptyResponse,

    /// The handle's concurrency gate was closed.
    #[error("client handle is closed")]
    Closed,
}

impl LLMError {
    /// Whether the failure is expected to clear up on its own (timeouts,
    /// dropped connections, rate limits, overloaded backends).
    pub fn is_transient(&self) -> bool {
        match self {
            LLMError::Request(e) => {
                e.is_timeout() || e.is_connect() || e.is_request() || e.is_body()
            }
            // 529 is Anthropic's overloaded_error
            LLMError::Api { status, .. } => {
                matches!(status, 408 | 429 | 500 | 502 | 503 | 504 | 529)
            }
            LLMError::RateLimit { .. } => true,
            LLMError::EmptyResponse | LLMError::Closed => false,
        }
    }

    /// Whether the backend refused the credential.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, LLMError::Api { status: 401 | 403, .. })
    }

    /// Server-requested wait before the next attempt, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            LLMError::RateLimit {
                retry_after: Some(secs),
            } => Some(Duration::from_secs(*secs)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(status: u16) -> LLMError {
        LLMError::Api {
            status,
            message: String::new(),
        }
    }

    #[test]
    fn test_server_errors_and_rate_limits_are_transient() {
        for status in [408, 429, 500, 502, 503, 504, 529] {
            assert!(api(status).is_transient(), "status {status}");
        }
        assert!(LLMError::RateLimit { retry_after: None }.is_transient());
    }

    #[test]
    fn test_client_errors_are_permanent() {
        for status in [400, 401, 403, 404, 422] {
            assert!(!api(status).is_transient(), "status {status}");
        }
        assert!(!LLMError::EmptyResponse.is_transient());
    }

    #[test]
    fn test_auth_failures_are_401_and_403() {
        assert!(api(401).is_auth_failure());
        assert!(api(403).is_auth_failure());
        assert!(!api(400).is_auth_failure());
        assert!(!LLMError::RateLimit { retry_after: None }.is_auth_failure());
    }

    #[test]
    fn test_retry_after_only_for_rate_limits() {
        let err = LLMError::RateLimit {
            retry_after: Some(2),
        };
        assert_eq!(err.retry_after(), Some(Duration::from_secs(2)));
        assert_eq!(api(503).retry_after(), None);
    }
}
