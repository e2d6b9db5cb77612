//! LLM request/response types for agentd
//!
//! These types are the vendor-neutral contract every adapter speaks. Vendor
//! shapes (Anthropic's separate `system` field, OpenAI's `choices` array)
//! stay inside the adapters.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A message in the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    /// Create a system message
    pub fn system(text: impl Into<String>) -> Self {
        debug!("Message::system: called");
        Self {
            role: Role::System,
            content: text.into(),
        }
    }

    /// Create a user message
    pub fn user(text: impl Into<String>) -> Self {
        debug!("Message::user: called");
        Self {
            role: Role::User,
            content: text.into(),
        }
    }

    /// Create an assistant message
    pub fn assistant(text: impl Into<String>) -> Self {
        debug!("Message::assistant: called");
        Self {
            role: Role::Assistant,
            content: text.into(),
        }
    }
}

/// A completion request - everything needed for one LLM call
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// Logical model identifier
    pub model: String,

    /// Ordered conversation, system messages included
    pub messages: Vec<Message>,

    /// Sampling temperature; adapters fall back to [`DEFAULT_TEMPERATURE`]
    pub temperature: Option<f64>,

    /// Completion cap; adapters fall back to [`DEFAULT_MAX_TOKENS`]
    pub max_tokens: Option<u32>,
}

/// Temperature used when a request does not set one
pub const DEFAULT_TEMPERATURE: f64 = 0.7;

/// Completion cap used when a request does not set one
pub const DEFAULT_MAX_TOKENS: u32 = 1000;

impl CompletionRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_temperature(mut self, temperature: Option<f64>) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Temperature to send, with the default applied
    pub fn effective_temperature(&self) -> f64 {
        self.temperature.unwrap_or(DEFAULT_TEMPERATURE)
    }

    /// Max tokens to send, with the default applied
    pub fn effective_max_tokens(&self) -> u32 {
        self.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS)
    }
}

/// Response from a completion request
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionResponse {
    /// Generated text
    pub content: String,

    /// Tokens consumed, if the vendor reported usage
    pub tokens_used: Option<u64>,

    /// Model identifier echoed by the vendor
    pub model: String,

    /// Why the model stopped, if reported
    pub finish_reason: Option<String>,
}
