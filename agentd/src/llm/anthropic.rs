//! Anthropic Claude API client implementation
//!
//! Implements the LlmClient trait for Anthropic's Messages API. The
//! Messages API takes the system prompt as a top-level field, so system
//! messages are lifted out of the conversation here.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::http::{build_client, missing_key, send};
use super::{CompletionRequest, CompletionResponse, LlmClient, LlmError, Role};
use crate::config::AnthropicConfig;

const PROVIDER_NAME: &str = "Anthropic";

/// Anthropic Claude API client
pub struct AnthropicClient {
    api_key: Option<String>,
    api_key_env: String,
    base_url: String,
    version: String,
    http: Client,
    timeout: Duration,
}

impl AnthropicClient {
    /// Create a new client from configuration
    ///
    /// Reads the API key from the configured environment variable. A
    /// missing key is reported on the first call, not here.
    pub fn from_config(config: &AnthropicConfig) -> Result<Self, LlmError> {
        debug!(base_url = %config.base_url, "from_config: called");
        let timeout = Duration::from_millis(config.timeout_ms);

        Ok(Self {
            api_key: config.api_key(),
            api_key_env: config.api_key_env.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            version: config.anthropic_version.clone(),
            http: build_client(timeout)?,
            timeout,
        })
    }

    /// Build the request body for the Anthropic API
    fn build_request_body(&self, request: &CompletionRequest) -> serde_json::Value {
        debug!(model = %request.model, "build_request_body: called");

        let system: Vec<&str> = request
            .messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();

        let messages: Vec<serde_json::Value> = request
            .messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| {
                serde_json::json!({
                    "role": m.role,
                    "content": m.content,
                })
            })
            .collect();

        let mut body = serde_json::json!({
            "model": request.model,
            "messages": messages,
            "max_tokens": request.effective_max_tokens(),
            "temperature": request.effective_temperature(),
        });

        if !system.is_empty() {
            debug!(system_count = system.len(), "build_request_body: lifting system messages");
            body["system"] = serde_json::json!(system.join("\n\n"));
        }

        body
    }

    /// Parse the Anthropic API response
    fn parse_response(&self, api_response: AnthropicResponse) -> Result<CompletionResponse, LlmError> {
        debug!(?api_response.stop_reason, "parse_response: called");
        let content = api_response
            .content
            .into_iter()
            .find_map(|block| match block {
                AnthropicContentBlock::Text { text } => Some(text),
                AnthropicContentBlock::Other => None,
            })
            .ok_or_else(|| LlmError::InvalidResponse("Response contained no text content".to_string()))?;

        Ok(CompletionResponse {
            content,
            tokens_used: api_response.usage.map(|u| u.input_tokens + u.output_tokens),
            model: api_response.model,
            finish_reason: api_response.stop_reason,
        })
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        debug!(model = %request.model, "complete: called");
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| missing_key(PROVIDER_NAME, &self.api_key_env))?;

        let url = format!("{}/messages", self.base_url);
        let body = self.build_request_body(&request);

        let http_request = self
            .http
            .post(url)
            .header("x-api-key", api_key)
            .header("anthropic-version", &self.version)
            .header("content-type", "application/json")
            .json(&body);

        let response = send(http_request, self.timeout).await?;

        debug!("complete: success");
        let text = response.text().await?;
        let api_response: AnthropicResponse = serde_json::from_str(&text)?;
        self.parse_response(api_response)
    }

    fn provider_name(&self) -> &str {
        PROVIDER_NAME
    }
}

// Anthropic API response types

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    content: Vec<AnthropicContentBlock>,
    model: String,
    stop_reason: Option<String>,
    usage: Option<AnthropicUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum AnthropicContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u64,
    output_tokens: u64,
}
