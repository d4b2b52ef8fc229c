//! LLM provider trait and backend families.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::error::LLMError;
use super::types::{ChatRequest, ChatResponse};

/// Trait for LLM providers with different API formats.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Make a chat completion request.
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, LLMError>;

    /// Make the cheapest authenticated call the backend offers, to confirm
    /// the credential is accepted.
    async fn probe(&self) -> Result<(), LLMError>;
}

/// Backend family a model is served by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// OpenAI chat completions API, or any server speaking it.
    OpenAI,
    /// Anthropic messages API.
    Anthropic,
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::OpenAI => write!(f, "openai"),
            Provider::Anthropic => write!(f, "anthropic"),
        }
    }
}
