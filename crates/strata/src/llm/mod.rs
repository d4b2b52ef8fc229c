//! LLM provider clients, model registry and per-invocation handles.

mod anthropic;
mod error;
mod factory;
mod handle;
mod openai;
mod provider;
mod registry;
mod types;

pub use anthropic::AnthropicProvider;
pub use error::LLMError;
pub use factory::ClientFactory;
pub use handle::{CallError, Completion, LlmHandle};
pub use openai::OpenAICompatibleProvider;
pub use provider::{LLMProvider, Provider};
pub use registry::{
    DEFAULT_MAX_CONCURRENCY, DEFAULT_MAX_RETRIES, DETERMINISTIC_TEMPERATURE, ModelRegistry,
    ModelSpec,
};
pub use types::{ChatRequest, ChatResponse, Choice, Message, Role, Usage};
