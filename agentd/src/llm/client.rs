//! LlmClient trait definition

use async_trait::async_trait;

use super::{CompletionRequest, CompletionResponse, LlmError};

/// Stateless LLM client - each call is independent
///
/// One implementation per vendor. Implementations hold no per-call state,
/// so a single instance is shared by every worker.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send a single completion request (blocking until complete)
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// Human-readable vendor name, e.g. "OpenAI"
    fn provider_name(&self) -> &str;
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tracing::debug;

    /// Mock LLM client for unit tests
    ///
    /// Replays scripted results in order and records every request.
    pub struct MockLlmClient {
        name: String,
        script: Mutex<Vec<Result<CompletionResponse, LlmError>>>,
        requests: Mutex<Vec<CompletionRequest>>,
        call_count: AtomicUsize,
    }

    impl MockLlmClient {
        pub fn new(responses: Vec<CompletionResponse>) -> Self {
            debug!(response_count = %responses.len(), "MockLlmClient::new: called");
            Self::scripted(responses.into_iter().map(Ok).collect())
        }

        pub fn scripted(script: Vec<Result<CompletionResponse, LlmError>>) -> Self {
            let mut script = script;
            script.reverse();
            Self {
                name: "Mock".to_string(),
                script: Mutex::new(script),
                requests: Mutex::new(Vec::new()),
                call_count: AtomicUsize::new(0),
            }
        }

        pub fn named(mut self, name: &str) -> Self {
            self.name = name.to_string();
            self
        }

        pub fn call_count(&self) -> usize {
            debug!("MockLlmClient::call_count: called");
            self.call_count.load(Ordering::SeqCst)
        }

        pub fn requests(&self) -> Vec<CompletionRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    /// Build a plain text response
    pub fn text_response(content: &str, tokens_used: Option<u64>) -> CompletionResponse {
        CompletionResponse {
            content: content.to_string(),
            tokens_used,
            model: "mock-model".to_string(),
            finish_reason: Some("stop".to_string()),
        }
    }

    #[async_trait]
    impl LlmClient for MockLlmClient {
        async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
            debug!("MockLlmClient::complete: called");
            self.call_count.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().unwrap().push(request);
            self.script.lock().unwrap().pop().unwrap_or_else(|| {
                debug!("MockLlmClient::complete: no more mock responses");
                Err(LlmError::InvalidResponse("No more mock responses".to_string()))
            })
        }

        fn provider_name(&self) -> &str {
            &self.name
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::llm::Message;

        fn request() -> CompletionRequest {
            CompletionRequest::new("mock-model", vec![Message::user("Test")])
        }

        #[tokio::test]
        async fn test_mock_client_returns_responses() {
            let client = MockLlmClient::new(vec![text_response("Response 1", None), text_response("Response 2", Some(3))]);

            let resp1 = client.complete(request()).await.unwrap();
            assert_eq!(resp1.content, "Response 1");

            let resp2 = client.complete(request()).await.unwrap();
            assert_eq!(resp2.content, "Response 2");
            assert_eq!(resp2.tokens_used, Some(3));

            assert_eq!(client.call_count(), 2);
            assert_eq!(client.requests().len(), 2);
        }

        #[tokio::test]
        async fn test_mock_client_errors_when_exhausted() {
            let client = MockLlmClient::new(vec![]);
            let result = client.complete(request()).await;
            assert!(result.is_err());
        }
    }
}
