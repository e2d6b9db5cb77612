//! Completion orchestrator: the single entry point for obtaining a completion

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use super::{CompletionRequest, CompletionResponse, LlmError, Message, ModelRouter};

/// Adapter result plus telemetry
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionResult {
    /// The adapter's response, unchanged
    pub response: CompletionResponse,

    /// Wall-clock time spent in the adapter call
    pub duration: Duration,

    /// Vendor that served the request
    pub provider: String,
}

/// Routes a system + user prompt pair to the right adapter
///
/// Adds no retries: failures propagate unchanged so the pipeline can
/// classify them.
#[derive(Debug, Clone)]
pub struct CompletionOrchestrator {
    router: Arc<ModelRouter>,
}

impl CompletionOrchestrator {
    pub fn new(router: Arc<ModelRouter>) -> Self {
        Self { router }
    }

    /// Run one completion
    pub async fn complete(
        &self,
        model: &str,
        system_prompt: &str,
        user_prompt: &str,
        temperature: Option<f64>,
        max_tokens: Option<u32>,
    ) -> Result<CompletionResult, LlmError> {
        debug!(%model, ?temperature, ?max_tokens, "CompletionOrchestrator::complete: called");
        let client = self.router.resolve(model)?;
        let provider = client.provider_name().to_string();

        let request = CompletionRequest::new(model, vec![Message::system(system_prompt), Message::user(user_prompt)])
            .with_temperature(temperature)
            .with_max_tokens(max_tokens);

        let started = Instant::now();
        let result = client.complete(request).await;
        let duration = started.elapsed();

        match result {
            Ok(response) => {
                info!(
                    %model,
                    %provider,
                    duration_ms = duration.as_millis() as u64,
                    tokens_used = ?response.tokens_used,
                    "Completion succeeded"
                );
                Ok(CompletionResult {
                    response,
                    duration,
                    provider,
                })
            }
            Err(e) => {
                debug!(%model, %provider, duration_ms = duration.as_millis() as u64, error = %e, "CompletionOrchestrator::complete: failed");
                Err(e)
            }
        }
    }
}
