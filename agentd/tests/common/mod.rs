//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use agentd::domain::Agent;
use agentd::events::{EventBus, TaskEvent, TaskEventType};
use agentd::llm::{CompletionRequest, CompletionResponse, LlmClient, LlmError};
use agentd::pipeline::{TaskProcessor, WorkerPool};
use agentd::queue::{QueueConfig, WorkQueue};
use agentd::service::{NewAgent, TaskService};
use agentd::state::StateManager;
use agentd::{CompletionOrchestrator, ModelRouter};
use async_trait::async_trait;
use tokio::sync::broadcast;

pub const TEST_MODEL: &str = "test-model";

/// In-process provider that replays a script of results
pub struct ScriptedClient {
    script: Mutex<VecDeque<Result<CompletionResponse, LlmError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
    calls: AtomicUsize,
    delay: Duration,
}

impl ScriptedClient {
    pub fn new(script: Vec<Result<CompletionResponse, LlmError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
        }
    }

    /// Hold every call for `delay` before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmClient for ScriptedClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| {
            Err(LlmError::ApiError {
                status: 500,
                message: "script exhausted".to_string(),
            })
        })
    }

    fn provider_name(&self) -> &str {
        "Scripted"
    }
}

pub fn ok(content: &str, tokens: u64) -> Result<CompletionResponse, LlmError> {
    Ok(CompletionResponse {
        content: content.to_string(),
        tokens_used: Some(tokens),
        model: TEST_MODEL.to_string(),
        finish_reason: Some("stop".to_string()),
    })
}

pub fn server_error() -> Result<CompletionResponse, LlmError> {
    Err(LlmError::ApiError {
        status: 500,
        message: "internal error".to_string(),
    })
}

pub fn fast_queue_config() -> QueueConfig {
    QueueConfig {
        workers: 2,
        backoff_delay_ms: 10,
        max_backoff_ms: 50,
        ..QueueConfig::default()
    }
}

/// Every component wired together around one scripted provider
pub struct Harness {
    pub state: StateManager,
    pub queue: Arc<WorkQueue>,
    pub events: Arc<EventBus>,
    pub client: Arc<ScriptedClient>,
    pub router: Arc<ModelRouter>,
    pub service: TaskService,
    pub config: QueueConfig,
    pool: Option<WorkerPool>,
}

impl Harness {
    pub fn new(client: ScriptedClient) -> Self {
        Self::with_state(client, StateManager::in_memory())
    }

    pub fn with_state(client: ScriptedClient, state: StateManager) -> Self {
        let client = Arc::new(client);
        let router = Arc::new(ModelRouter::new().with_model(TEST_MODEL, client.clone()));
        let queue = Arc::new(WorkQueue::new());
        let events = Arc::new(EventBus::new(256));
        let config = fast_queue_config();
        let service = TaskService::new(
            state.clone(),
            queue.clone(),
            events.clone(),
            router.clone(),
            config.clone(),
        );
        Self {
            state,
            queue,
            events,
            client,
            router,
            service,
            config,
            pool: None,
        }
    }

    pub async fn agent(&self, user: &str) -> Agent {
        let request = NewAgent {
            name: "Tester".to_string(),
            system_prompt: "You answer briefly.".to_string(),
            model: TEST_MODEL.to_string(),
            ..Default::default()
        };
        self.service.create_agent(user, request).await.unwrap()
    }

    pub fn processor(&self) -> Arc<TaskProcessor> {
        Arc::new(TaskProcessor::new(
            self.state.clone(),
            CompletionOrchestrator::new(self.router.clone()),
            self.events.clone(),
        ))
    }

    /// Start the worker pool
    pub fn start(&mut self) {
        self.pool = Some(WorkerPool::spawn(self.config.workers, self.queue.clone(), self.processor()));
    }

    /// Wait until the queue has nothing waiting, backing off or running
    pub async fn settle(&self) {
        tokio::time::timeout(Duration::from_secs(10), self.queue.wait_idle())
            .await
            .expect("queue did not settle");
    }

    pub async fn stop(&mut self) {
        if let Some(pool) = self.pool.take() {
            pool.shutdown(Duration::from_secs(2)).await;
        }
    }
}

/// Named events received so far, in order
pub fn drain_named(rx: &mut broadcast::Receiver<TaskEvent>) -> Vec<TaskEvent> {
    std::iter::from_fn(|| rx.try_recv().ok())
        .filter(|e| e.event != TaskEventType::Event)
        .collect()
}
