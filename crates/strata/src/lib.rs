//! Strata - language-model invocation layer.
//!
//! Resolves a model by name, gates on the caller's credential, builds a
//! deterministic backend handle and runs a prompt template through it,
//! optionally returning a structured debug report of the calls made.

pub mod chain;
pub mod config;
pub mod credential;
pub mod error;
pub mod llm;
pub mod prompt;
pub mod service;

pub use chain::{ChainOutput, DebugReport};
pub use error::GenerateError;
pub use prompt::{PromptTemplate, TemplateError};
pub use service::{BatchGeneration, Generation, LlmService, ModelDescriptor};
