//! Task service: the submission side of the pipeline
//!
//! Validates requests, persists agents and tasks, enqueues work and emits
//! the matching notifications. Every operation is scoped to the calling
//! user; records owned by someone else are reported as not found.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use crate::domain::{
    Agent, AgentStatus, MAX_RETRIES_LIMIT, Priority, Task, TaskEdit, TaskStatus, Transition,
};
use crate::events::{EventBus, TaskEventType};
use crate::llm::ModelRouter;
use crate::queue::{EnqueueResult, Job, QueueConfig, WorkQueue};
use crate::state::{StateError, StateManager, TaskFilter};

/// Shortest accepted prompt, in characters
pub const MIN_PROMPT_LEN: usize = 10;

/// Errors from service operations
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    State(StateError),
}

impl From<StateError> for ServiceError {
    fn from(e: StateError) -> Self {
        match e {
            StateError::NotFound(id) => Self::NotFound(id),
            other => Self::State(other),
        }
    }
}

impl ServiceError {
    /// Check if the error is a rejected state machine transition
    pub fn is_invalid_transition(&self) -> bool {
        matches!(self, Self::State(StateError::InvalidTransition(_)))
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Agent creation request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct NewAgent {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub system_prompt: String,
    pub model: String,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

/// Partial agent update; unset fields keep their value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AgentEdit {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

impl AgentEdit {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Task submission request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct NewTask {
    pub agent_id: String,
    pub prompt: String,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

impl NewTask {
    pub fn new(agent_id: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }
}

/// Per-user task counts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStats {
    pub total: usize,
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    /// Completed over total, as a percentage with two decimals
    pub success_rate: f64,
}

impl TaskStats {
    pub fn from_tasks(tasks: &[Task]) -> Self {
        let mut stats = Self {
            total: tasks.len(),
            ..Default::default()
        };
        for task in tasks {
            match task.status {
                TaskStatus::Pending => stats.pending += 1,
                TaskStatus::Processing => stats.processing += 1,
                TaskStatus::Completed => stats.completed += 1,
                TaskStatus::Failed => stats.failed += 1,
                TaskStatus::Cancelled => stats.cancelled += 1,
            }
        }
        if stats.total > 0 {
            let rate = stats.completed as f64 / stats.total as f64 * 100.0;
            stats.success_rate = (rate * 100.0).round() / 100.0;
        }
        stats
    }
}

fn validate_prompt(prompt: &str) -> ServiceResult<()> {
    if prompt.trim().chars().count() < MIN_PROMPT_LEN {
        return Err(ServiceError::Validation(format!(
            "prompt must be at least {} characters",
            MIN_PROMPT_LEN
        )));
    }
    Ok(())
}

fn validate_max_retries(max_retries: u32) -> ServiceResult<()> {
    if max_retries > MAX_RETRIES_LIMIT {
        return Err(ServiceError::Validation(format!(
            "max retries must be between 0 and {}",
            MAX_RETRIES_LIMIT
        )));
    }
    Ok(())
}

/// Front door for agent and task operations
#[derive(Clone)]
pub struct TaskService {
    state: StateManager,
    queue: Arc<WorkQueue>,
    events: Arc<EventBus>,
    router: Arc<ModelRouter>,
    config: QueueConfig,
}

impl TaskService {
    pub fn new(
        state: StateManager,
        queue: Arc<WorkQueue>,
        events: Arc<EventBus>,
        router: Arc<ModelRouter>,
        config: QueueConfig,
    ) -> Self {
        Self {
            state,
            queue,
            events,
            router,
            config,
        }
    }

    // === Agents ===

    /// Create an agent for `user_id`
    pub async fn create_agent(&self, user_id: &str, request: NewAgent) -> ServiceResult<Agent> {
        debug!(%user_id, name = %request.name, model = %request.model, "create_agent: called");
        let mut agent = Agent::new(user_id, request.name, request.system_prompt, request.model);
        agent.description = request.description;
        if let Some(temperature) = request.temperature {
            agent.temperature = temperature;
        }
        if let Some(max_tokens) = request.max_tokens {
            agent.max_tokens = max_tokens;
        }
        if let Some(metadata) = request.metadata {
            agent.metadata = metadata;
        }

        self.check_agent(&agent)?;
        self.state.put_agent(agent.clone()).await?;
        info!(agent_id = %agent.id, %user_id, model = %agent.model, "Agent created");
        Ok(agent)
    }

    fn check_agent(&self, agent: &Agent) -> ServiceResult<()> {
        agent.validate().map_err(ServiceError::Validation)?;
        if !self.router.contains(&agent.model) {
            return Err(ServiceError::Validation(format!(
                "model '{}' is not available; known models: {}",
                agent.model,
                self.router.list_models().join(", ")
            )));
        }
        Ok(())
    }

    /// Change an agent's configuration
    ///
    /// Tasks already submitted pick up the new configuration when they run.
    pub async fn update_agent(&self, user_id: &str, agent_id: &str, edit: AgentEdit) -> ServiceResult<Agent> {
        debug!(%user_id, %agent_id, ?edit, "update_agent: called");
        if edit.is_empty() {
            return Err(ServiceError::Validation("nothing to update".to_string()));
        }
        let mut agent = self.get_agent(user_id, agent_id).await?;

        if let Some(name) = edit.name {
            agent.name = name;
        }
        if let Some(description) = edit.description {
            agent.description = Some(description);
        }
        if let Some(system_prompt) = edit.system_prompt {
            agent.system_prompt = system_prompt;
        }
        if let Some(model) = edit.model {
            agent.model = model;
        }
        if let Some(temperature) = edit.temperature {
            agent.temperature = temperature;
        }
        if let Some(max_tokens) = edit.max_tokens {
            agent.max_tokens = max_tokens;
        }
        if let Some(metadata) = edit.metadata {
            agent.metadata = metadata;
        }

        self.check_agent(&agent)?;
        agent.updated_at = chrono::Utc::now();
        self.state.put_agent(agent.clone()).await?;
        info!(%agent_id, %user_id, "Agent updated");
        Ok(agent)
    }

    /// Get one of the user's agents
    pub async fn get_agent(&self, user_id: &str, agent_id: &str) -> ServiceResult<Agent> {
        debug!(%user_id, %agent_id, "get_agent: called");
        match self.state.get_agent(agent_id).await? {
            Some(agent) if agent.user_id == user_id => Ok(agent),
            _ => Err(ServiceError::NotFound(format!("agent {}", agent_id))),
        }
    }

    pub async fn list_agents(&self, user_id: &str) -> ServiceResult<Vec<Agent>> {
        Ok(self.state.list_agents(user_id).await?)
    }

    /// Activate, deactivate or archive an agent
    pub async fn set_agent_status(&self, user_id: &str, agent_id: &str, status: AgentStatus) -> ServiceResult<Agent> {
        debug!(%user_id, %agent_id, %status, "set_agent_status: called");
        let mut agent = self.get_agent(user_id, agent_id).await?;
        agent.status = status;
        agent.updated_at = chrono::Utc::now();
        self.state.put_agent(agent.clone()).await?;
        Ok(agent)
    }

    // === Tasks ===

    /// Submit a task: store it pending, enqueue it and announce it
    pub async fn create_task(&self, user_id: &str, request: NewTask) -> ServiceResult<Task> {
        debug!(%user_id, agent_id = %request.agent_id, "create_task: called");
        let agent = self.get_agent(user_id, &request.agent_id).await?;
        validate_prompt(&request.prompt)?;
        let max_retries = request.max_retries.unwrap_or(self.config.default_max_retries);
        validate_max_retries(max_retries)?;

        let mut task = Task::new(user_id, &agent.id, request.prompt)
            .with_priority(request.priority.unwrap_or_default())
            .with_max_retries(max_retries);
        if let Some(metadata) = request.metadata {
            task = task.with_metadata(metadata);
        }

        self.state.create_task(task.clone()).await?;
        let result = self.queue.enqueue(Job::for_task(&task, &self.config)).await;
        info!(task_id = %task.id, %user_id, priority = %task.priority, ?result, "Task submitted");
        self.events.emit_task(TaskEventType::Created, &task);
        Ok(task)
    }

    /// Get one of the user's tasks
    pub async fn get_task(&self, user_id: &str, task_id: &str) -> ServiceResult<Task> {
        debug!(%user_id, %task_id, "get_task: called");
        match self.state.get_task(task_id).await? {
            Some(task) if task.user_id == user_id => Ok(task),
            _ => Err(ServiceError::NotFound(format!("task {}", task_id))),
        }
    }

    /// List the user's tasks, newest first
    pub async fn list_tasks(
        &self,
        user_id: &str,
        status: Option<TaskStatus>,
        agent_id: Option<&str>,
    ) -> ServiceResult<Vec<Task>> {
        debug!(%user_id, ?status, ?agent_id, "list_tasks: called");
        let filter = TaskFilter {
            user_id: Some(user_id.to_string()),
            status,
            agent_id: agent_id.map(str::to_string),
        };
        Ok(self.state.list_tasks(filter).await?)
    }

    /// Edit a task that is not processing or completed
    pub async fn update_task(&self, user_id: &str, task_id: &str, edit: TaskEdit) -> ServiceResult<Task> {
        debug!(%user_id, %task_id, "update_task: called");
        self.get_task(user_id, task_id).await?;
        if let Some(prompt) = &edit.prompt {
            validate_prompt(prompt)?;
        }
        if let Some(max_retries) = edit.max_retries {
            validate_max_retries(max_retries)?;
        }

        let task = self.state.transition(task_id, Transition::Edit(edit)).await?;

        // A waiting job carries the old priority and attempt budget
        if task.status == TaskStatus::Pending {
            let result = self.queue.enqueue(Job::for_task(&task, &self.config)).await;
            debug!(%task_id, ?result, "update_task: job refreshed");
        }

        self.events.emit_task(TaskEventType::Updated, &task);
        Ok(task)
    }

    /// Cancel a pending, processing or failed task
    ///
    /// A delivery already in flight runs to completion; its result is
    /// rejected by the state machine.
    pub async fn cancel_task(&self, user_id: &str, task_id: &str) -> ServiceResult<Task> {
        debug!(%user_id, %task_id, "cancel_task: called");
        self.get_task(user_id, task_id).await?;
        let task = self.state.transition(task_id, Transition::Cancel).await?;
        let removed = self.queue.remove(task_id).await;
        info!(%task_id, %user_id, removed, "Task cancelled");
        self.events.emit_task(TaskEventType::Cancelled, &task);
        Ok(task)
    }

    /// Reset a failed task to pending and submit it again
    pub async fn retry_task(&self, user_id: &str, task_id: &str) -> ServiceResult<Task> {
        debug!(%user_id, %task_id, "retry_task: called");
        self.get_task(user_id, task_id).await?;
        let task = self.state.transition(task_id, Transition::Retry).await?;
        let result = self.queue.enqueue(Job::for_task(&task, &self.config)).await;
        if result == EnqueueResult::Closed {
            debug!(%task_id, "retry_task: queue closed, task stays pending until recovery");
        }
        info!(%task_id, %user_id, "Task retried");
        self.events.emit_task(TaskEventType::Updated, &task);
        Ok(task)
    }

    /// Task counts and success rate for the user
    pub async fn stats(&self, user_id: &str) -> ServiceResult<TaskStats> {
        debug!(%user_id, "stats: called");
        let tasks = self.state.list_tasks(TaskFilter::for_user(user_id)).await?;
        Ok(TaskStats::from_tasks(&tasks))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::client::mock::MockLlmClient;

    fn service() -> (TaskService, Arc<WorkQueue>, Arc<EventBus>) {
        let router = ModelRouter::new().with_model("test-model", Arc::new(MockLlmClient::new(vec![])));
        let queue = Arc::new(WorkQueue::new());
        let events = Arc::new(EventBus::new(64));
        let service = TaskService::new(
            StateManager::in_memory(),
            queue.clone(),
            events.clone(),
            Arc::new(router),
            QueueConfig::default(),
        );
        (service, queue, events)
    }

    fn new_agent() -> NewAgent {
        NewAgent {
            name: "Helper".to_string(),
            system_prompt: "You are helpful.".to_string(),
            model: "test-model".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_agent_validates() {
        let (service, _, _) = service();

        let agent = service.create_agent("alice", new_agent()).await.unwrap();
        assert_eq!(agent.user_id, "alice");
        assert_eq!(agent.status, AgentStatus::Active);

        let unknown = NewAgent {
            model: "gpt-9".to_string(),
            ..new_agent()
        };
        assert!(matches!(
            service.create_agent("alice", unknown).await,
            Err(ServiceError::Validation(_))
        ));

        let too_hot = NewAgent {
            temperature: Some(1.5),
            ..new_agent()
        };
        assert!(matches!(
            service.create_agent("alice", too_hot).await,
            Err(ServiceError::Validation(_))
        ));

        let too_long = NewAgent {
            max_tokens: Some(4001),
            ..new_agent()
        };
        assert!(matches!(
            service.create_agent("alice", too_long).await,
            Err(ServiceError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_agents_are_scoped_to_owner() {
        let (service, _, _) = service();
        let agent = service.create_agent("alice", new_agent()).await.unwrap();

        assert!(matches!(
            service.get_agent("bob", &agent.id).await,
            Err(ServiceError::NotFound(_))
        ));
        assert!(service.list_agents("bob").await.unwrap().is_empty());

        let result = service.create_task("bob", NewTask::new(&agent.id, "Steal this agent please")).await;
        assert!(matches!(result, Err(ServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_update_agent() {
        let (service, _, _) = service();
        let agent = service.create_agent("alice", new_agent()).await.unwrap();

        let edit = AgentEdit {
            name: Some("Summarizer".to_string()),
            temperature: Some(0.2),
            ..Default::default()
        };
        let updated = service.update_agent("alice", &agent.id, edit).await.unwrap();
        assert_eq!(updated.name, "Summarizer");
        assert_eq!(updated.temperature, 0.2);
        assert_eq!(updated.system_prompt, agent.system_prompt);
        assert!(updated.updated_at >= agent.updated_at);

        let stored = service.get_agent("alice", &agent.id).await.unwrap();
        assert_eq!(stored.name, "Summarizer");
        assert!((stored.temperature - 0.2).abs() < 1e-9);
        assert_eq!(stored.updated_at, updated.updated_at);
    }

    #[tokio::test]
    async fn test_update_agent_rejects_invalid_edit() {
        let (service, _, _) = service();
        let agent = service.create_agent("alice", new_agent()).await.unwrap();

        let too_hot = AgentEdit {
            name: Some("Renamed".to_string()),
            temperature: Some(1.5),
            ..Default::default()
        };
        assert!(matches!(
            service.update_agent("alice", &agent.id, too_hot).await,
            Err(ServiceError::Validation(_))
        ));

        let unknown = AgentEdit {
            model: Some("gpt-9".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            service.update_agent("alice", &agent.id, unknown).await,
            Err(ServiceError::Validation(_))
        ));

        assert!(matches!(
            service.update_agent("alice", &agent.id, AgentEdit::default()).await,
            Err(ServiceError::Validation(_))
        ));

        // Rejected edits leave the stored agent alone
        let stored = service.get_agent("alice", &agent.id).await.unwrap();
        assert_eq!(stored.name, agent.name);
        assert_eq!(stored.model, agent.model);
        assert_eq!(stored.updated_at, agent.updated_at);

        let rename = AgentEdit {
            name: Some("Mine now".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            service.update_agent("bob", &agent.id, rename).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_set_agent_status() {
        let (service, _, _) = service();
        let agent = service.create_agent("alice", new_agent()).await.unwrap();

        let archived = service
            .set_agent_status("alice", &agent.id, AgentStatus::Archived)
            .await
            .unwrap();
        assert_eq!(archived.status, AgentStatus::Archived);
        assert_eq!(
            service.get_agent("alice", &agent.id).await.unwrap().status,
            AgentStatus::Archived
        );
    }

    #[tokio::test]
    async fn test_create_task_enqueues_and_notifies() {
        let (service, queue, events) = service();
        let mut rx = events.register("alice");
        let agent = service.create_agent("alice", new_agent()).await.unwrap();

        let task = service
            .create_task(
                "alice",
                NewTask::new(&agent.id, "Summarize this document").with_priority(Priority::Urgent),
            )
            .await
            .unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.max_retries, 3);

        let job = queue.next().await.unwrap();
        assert_eq!(job.task_id, task.id);
        assert_eq!(job.options.priority, 1);
        assert_eq!(job.options.attempts, 4);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event, TaskEventType::Created);
        assert_eq!(event.task_id(), task.id);
    }

    #[tokio::test]
    async fn test_create_task_validates_input() {
        let (service, queue, _) = service();
        let agent = service.create_agent("alice", new_agent()).await.unwrap();

        let short = service.create_task("alice", NewTask::new(&agent.id, "too short")).await;
        assert!(matches!(short, Err(ServiceError::Validation(_))));

        let greedy = service
            .create_task("alice", NewTask::new(&agent.id, "Long enough prompt").with_max_retries(11))
            .await;
        assert!(matches!(greedy, Err(ServiceError::Validation(_))));

        let missing = service.create_task("alice", NewTask::new("nope", "Long enough prompt")).await;
        assert!(matches!(missing, Err(ServiceError::NotFound(_))));

        assert!(queue.state().await.is_idle());
    }

    #[tokio::test]
    async fn test_cancel_pending_removes_job() {
        let (service, queue, _) = service();
        let agent = service.create_agent("alice", new_agent()).await.unwrap();
        let task = service
            .create_task("alice", NewTask::new(&agent.id, "Cancel me before I run"))
            .await
            .unwrap();

        let cancelled = service.cancel_task("alice", &task.id).await.unwrap();
        assert_eq!(cancelled.status, TaskStatus::Cancelled);
        assert!(!queue.contains(&task.id).await);

        let again = service.cancel_task("alice", &task.id).await.unwrap_err();
        assert!(again.is_invalid_transition());
    }

    #[tokio::test]
    async fn test_retry_requires_failed() {
        let (service, _, _) = service();
        let agent = service.create_agent("alice", new_agent()).await.unwrap();
        let task = service
            .create_task("alice", NewTask::new(&agent.id, "Retry is not allowed yet"))
            .await
            .unwrap();

        let err = service.retry_task("alice", &task.id).await.unwrap_err();
        assert!(err.is_invalid_transition());
    }

    #[tokio::test]
    async fn test_update_task_refreshes_job() {
        let (service, queue, _) = service();
        let agent = service.create_agent("alice", new_agent()).await.unwrap();
        let task = service
            .create_task("alice", NewTask::new(&agent.id, "Original prompt text"))
            .await
            .unwrap();

        let edit = TaskEdit {
            prompt: Some("Edited prompt text".to_string()),
            priority: Some(Priority::High),
            ..Default::default()
        };
        let updated = service.update_task("alice", &task.id, edit).await.unwrap();
        assert_eq!(updated.prompt, "Edited prompt text");
        assert_eq!(updated.priority, Priority::High);

        let state = queue.state().await;
        assert_eq!(state.waiting, 1);
        assert_eq!(queue.next().await.unwrap().options.priority, 2);

        let bad = TaskEdit {
            prompt: Some("short".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            service.update_task("alice", &task.id, bad).await,
            Err(ServiceError::Validation(_))
        ));
    }

    #[test]
    fn test_stats_from_tasks() {
        let mut tasks: Vec<Task> = (0..3).map(|_| Task::new("u", "a", "prompt text here")).collect();
        tasks[0].status = TaskStatus::Completed;
        tasks[1].status = TaskStatus::Failed;

        let stats = TaskStats::from_tasks(&tasks);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.success_rate, 33.33);

        assert_eq!(TaskStats::from_tasks(&[]).success_rate, 0.0);
    }
}
