//! LLM error types

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during LLM operations
#[derive(Debug, Error)]
pub enum LlmError {
    /// Provider cannot be used as configured, e.g. no API key
    #[error("{provider} is not configured: {message}")]
    Configuration { provider: String, message: String },

    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("API error {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// No adapter is registered for the model
    #[error("Unknown model: {0}")]
    UnknownModel(String),
}

impl LlmError {
    /// Stable code distinguishing configuration from runtime failures
    pub fn reason_code(&self) -> &'static str {
        match self {
            LlmError::Configuration { .. } => "configuration",
            LlmError::RateLimited { .. } => "rate_limited",
            LlmError::ApiError { .. } => "api_error",
            LlmError::Network(_) => "network",
            LlmError::InvalidResponse(_) | LlmError::Json(_) => "invalid_response",
            LlmError::Timeout(_) => "timeout",
            LlmError::UnknownModel(_) => "unknown_model",
        }
    }

    /// Check if this error is retryable
    ///
    /// Every failure of an actual vendor call is retryable; the queue's
    /// attempt budget bounds the cost. Configuration and routing failures
    /// cannot succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::Configuration { .. } => false,
            LlmError::UnknownModel(_) => false,
            LlmError::RateLimited { .. } => true,
            LlmError::ApiError { .. } => true,
            LlmError::Network(_) => true,
            LlmError::Timeout(_) => true,
            LlmError::InvalidResponse(_) => true,
            LlmError::Json(_) => true,
        }
    }

    /// Get the retry duration if this is a rate limit error
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            LlmError::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        }
    }
}
