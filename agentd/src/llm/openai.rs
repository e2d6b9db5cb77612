//! OpenAI API client implementation
//!
//! Implements the LlmClient trait for the Chat Completions API. OpenRouter
//! speaks the same shape, so the same client serves it with its own base
//! URL, name and attribution headers.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::http::{build_client, missing_key, send};
use super::{CompletionRequest, CompletionResponse, LlmClient, LlmError};
use crate::config::{OpenAiConfig, OpenRouterConfig};

/// OpenAI-compatible chat completions client
pub struct OpenAIClient {
    provider: String,
    api_key: Option<String>,
    api_key_env: String,
    base_url: String,
    extra_headers: Vec<(String, String)>,
    http: Client,
    timeout: Duration,
}

impl OpenAIClient {
    /// Create an OpenAI client from configuration
    pub fn from_config(config: &OpenAiConfig) -> Result<Self, LlmError> {
        debug!(base_url = %config.base_url, "from_config: called");
        let timeout = Duration::from_millis(config.timeout_ms);

        Ok(Self {
            provider: "OpenAI".to_string(),
            api_key: config.api_key(),
            api_key_env: config.api_key_env.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            extra_headers: Vec::new(),
            http: build_client(timeout)?,
            timeout,
        })
    }

    /// Create an OpenRouter client from configuration
    pub fn openrouter(config: &OpenRouterConfig) -> Result<Self, LlmError> {
        debug!(base_url = %config.base_url, "openrouter: called");
        let timeout = Duration::from_millis(config.timeout_ms);

        Ok(Self {
            provider: "OpenRouter".to_string(),
            api_key: config.api_key(),
            api_key_env: config.api_key_env.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            extra_headers: vec![
                ("HTTP-Referer".to_string(), config.resolved_referer()),
                ("X-Title".to_string(), config.title.clone()),
            ],
            http: build_client(timeout)?,
            timeout,
        })
    }

    /// Build the request body for the Chat Completions API
    fn build_request_body(&self, request: &CompletionRequest) -> serde_json::Value {
        debug!(model = %request.model, message_count = request.messages.len(), "build_request_body: called");
        serde_json::json!({
            "model": request.model,
            "messages": request.messages,
            "temperature": request.effective_temperature(),
            "max_tokens": request.effective_max_tokens(),
        })
    }

    /// Parse the Chat Completions response
    fn parse_response(&self, api_response: OpenAIResponse) -> Result<CompletionResponse, LlmError> {
        debug!(choices = api_response.choices.len(), "parse_response: called");
        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("Response contained no choices".to_string()))?;

        let content = choice
            .message
            .content
            .ok_or_else(|| LlmError::InvalidResponse("First choice has no message content".to_string()))?;

        Ok(CompletionResponse {
            content,
            tokens_used: api_response.usage.map(|u| u.total_tokens),
            model: api_response.model,
            finish_reason: choice.finish_reason,
        })
    }
}

#[async_trait]
impl LlmClient for OpenAIClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        debug!(provider = %self.provider, model = %request.model, "complete: called");
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| missing_key(&self.provider, &self.api_key_env))?;

        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_request_body(&request);

        let mut http_request = self
            .http
            .post(url)
            .bearer_auth(api_key)
            .header("content-type", "application/json");
        for (name, value) in &self.extra_headers {
            http_request = http_request.header(name.as_str(), value.as_str());
        }

        let response = send(http_request.json(&body), self.timeout).await?;

        debug!("complete: success");
        let text = response.text().await?;
        let api_response: OpenAIResponse = serde_json::from_str(&text)?;
        self.parse_response(api_response)
    }

    fn provider_name(&self) -> &str {
        &self.provider
    }
}

// OpenAI API response types

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    #[serde(default)]
    choices: Vec<OpenAIChoice>,
    model: String,
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    total_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Message;
    use crate::llm::http::test_server::{response, serve_once};

    fn client() -> OpenAIClient {
        OpenAIClient {
            provider: "OpenAI".to_string(),
            api_key: Some("test-key".to_string()),
            api_key_env: "OPENAI_API_KEY".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            extra_headers: Vec::new(),
            http: Client::new(),
            timeout: Duration::from_secs(60),
        }
    }

    #[test]
    fn test_build_request_body_keeps_system_inline() {
        let request = CompletionRequest::new("gpt-4", vec![Message::system("Be terse"), Message::user("Hello")])
            .with_max_tokens(Some(50));

        let body = client().build_request_body(&request);

        assert_eq!(body["model"], "gpt-4");
        assert_eq!(body["max_tokens"], 50);
        assert_eq!(body["temperature"], 0.7);

        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[0]["content"], "Be terse");
        assert_eq!(messages[1]["role"], "user");
    }

    #[test]
    fn test_parse_response() {
        let raw = serde_json::json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "model": "gpt-4-0613",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "Hello"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 9, "completion_tokens": 3, "total_tokens": 12}
        });
        let api_response: OpenAIResponse = serde_json::from_value(raw).unwrap();

        let response = client().parse_response(api_response).unwrap();
        assert_eq!(response.content, "Hello");
        assert_eq!(response.tokens_used, Some(12));
        assert_eq!(response.model, "gpt-4-0613");
        assert_eq!(response.finish_reason.as_deref(), Some("stop"));
    }

    #[test]
    fn test_parse_response_without_choices_is_invalid() {
        let raw = serde_json::json!({"model": "gpt-4", "choices": []});
        let api_response: OpenAIResponse = serde_json::from_value(raw).unwrap();
        assert!(matches!(
            client().parse_response(api_response),
            Err(LlmError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_parse_response_null_content_is_invalid() {
        let raw = serde_json::json!({
            "model": "gpt-4",
            "choices": [{"message": {"role": "assistant", "content": null}, "finish_reason": "length"}]
        });
        let api_response: OpenAIResponse = serde_json::from_value(raw).unwrap();
        assert!(client().parse_response(api_response).is_err());
    }

    #[test]
    fn test_openrouter_headers_and_name() {
        let config = OpenRouterConfig {
            referer: Some("https://agents.example.com".to_string()),
            title: "Example".to_string(),
            ..Default::default()
        };
        let client = OpenAIClient::openrouter(&config).unwrap();

        assert_eq!(client.provider_name(), "OpenRouter");
        assert_eq!(client.base_url, "https://openrouter.ai/api/v1");
        assert!(
            client
                .extra_headers
                .contains(&("HTTP-Referer".to_string(), "https://agents.example.com".to_string()))
        );
        assert!(client.extra_headers.contains(&("X-Title".to_string(), "Example".to_string())));
    }

    #[tokio::test]
    async fn test_missing_key_is_configuration_error() {
        let mut client = client();
        client.api_key = None;

        let err = client
            .complete(CompletionRequest::new("gpt-4", vec![Message::user("Hi")]))
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Configuration { ref provider, .. } if provider == "OpenAI"));
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }

    #[tokio::test]
    async fn test_complete_against_local_server() {
        let body = r#"{"model":"gpt-4-0613","choices":[{"message":{"role":"assistant","content":"Pong"},"finish_reason":"stop"}],"usage":{"total_tokens":4}}"#;
        let (url, server) = serve_once(response("200 OK", &[], body), Duration::ZERO).await;
        let client = OpenAIClient {
            base_url: format!("{}/v1", url),
            extra_headers: vec![("X-Title".to_string(), "Example".to_string())],
            http: Client::builder().no_proxy().build().unwrap(),
            ..client()
        };

        let reply = client
            .complete(CompletionRequest::new("gpt-4", vec![Message::user("Ping")]))
            .await
            .unwrap();
        assert_eq!(reply.content, "Pong");
        assert_eq!(reply.tokens_used, Some(4));
        assert_eq!(reply.finish_reason.as_deref(), Some("stop"));

        let request = server.await.unwrap();
        assert!(request.starts_with("post /v1/chat/completions "));
        assert!(request.contains("authorization: bearer test-key"));
        assert!(request.contains("x-title: example"));
    }

    #[tokio::test]
    async fn test_complete_maps_server_error() {
        let (url, server) = serve_once(response("503 Service Unavailable", &[], "overloaded"), Duration::ZERO).await;
        let client = OpenAIClient {
            base_url: format!("{}/v1", url),
            http: Client::builder().no_proxy().build().unwrap(),
            ..client()
        };

        let err = client
            .complete(CompletionRequest::new("gpt-4", vec![Message::user("Ping")]))
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::ApiError { status: 503, ref message } if message == "overloaded"));
        assert!(err.is_retryable());
        server.await.unwrap();
    }
}
