//! LLM Client module for agentd
//!
//! Provider adapters behind the [`LlmClient`] trait, the [`ModelRouter`]
//! that picks an adapter per model, and the [`CompletionOrchestrator`]
//! the pipeline calls.

mod anthropic;
pub mod client;
mod error;
mod http;
mod openai;
mod orchestrator;
mod router;
mod types;

pub use anthropic::AnthropicClient;
pub use client::LlmClient;
pub use error::LlmError;
pub use openai::OpenAIClient;
pub use orchestrator::{CompletionOrchestrator, CompletionResult};
pub use router::ModelRouter;
pub use types::{CompletionRequest, CompletionResponse, DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE, Message, Role};
