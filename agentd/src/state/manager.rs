//! StateManager - actor that owns the Store
//!
//! Processes commands via channels for thread-safe access to persistent state.
//! Task transitions are applied inside the actor, so a load-apply-save never
//! interleaves with another write to the same task.

use std::path::Path;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::domain::{Agent, Task, Transition};

use super::messages::{StateCommand, StateError, StateResponse};
use super::store::{MemoryStore, SqliteStore, Store, TaskFilter};

/// Handle to send commands to the StateManager
#[derive(Clone)]
pub struct StateManager {
    tx: mpsc::Sender<StateCommand>,
}

impl std::fmt::Debug for StateManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateManager").field("closed", &self.tx.is_closed()).finish()
    }
}

impl StateManager {
    /// Spawn a StateManager backed by the SQLite database at `store_path`
    pub fn spawn(store_path: impl AsRef<Path>) -> eyre::Result<Self> {
        debug!(store_path = %store_path.as_ref().display(), "spawn: called");
        let store = SqliteStore::open(store_path.as_ref())?;
        Ok(Self::with_store(store))
    }

    /// Spawn a StateManager backed by a volatile in-memory store
    pub fn in_memory() -> Self {
        debug!("in_memory: called");
        Self::with_store(MemoryStore::new())
    }

    /// Spawn a StateManager owning `store`
    pub fn with_store(store: impl Store + 'static) -> Self {
        let (tx, rx) = mpsc::channel(256);
        tokio::spawn(actor_loop(Box::new(store), rx));
        info!("StateManager spawned");
        Self { tx }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<StateResponse<T>>) -> StateCommand,
    ) -> StateResponse<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(build(reply_tx))
            .await
            .map_err(|_| StateError::ChannelError)?;
        reply_rx.await.map_err(|_| StateError::ChannelError)?
    }

    // === Agent operations ===

    /// Create or replace an Agent record
    pub async fn put_agent(&self, agent: Agent) -> StateResponse<()> {
        debug!(agent_id = %agent.id, "put_agent: called");
        self.request(|reply| StateCommand::PutAgent { agent, reply }).await
    }

    /// Get an Agent record by ID
    pub async fn get_agent(&self, id: &str) -> StateResponse<Option<Agent>> {
        debug!(%id, "get_agent: called");
        let id = id.to_string();
        self.request(|reply| StateCommand::GetAgent { id, reply }).await
    }

    /// List a user's agents, newest first
    pub async fn list_agents(&self, user_id: &str) -> StateResponse<Vec<Agent>> {
        debug!(%user_id, "list_agents: called");
        let user_id = user_id.to_string();
        self.request(|reply| StateCommand::ListAgents { user_id, reply }).await
    }

    // === Task operations ===

    /// Store a new Task record, returning its ID
    pub async fn create_task(&self, task: Task) -> StateResponse<String> {
        debug!(task_id = %task.id, user_id = %task.user_id, "create_task: called");
        self.request(|reply| StateCommand::CreateTask { task, reply }).await
    }

    /// Get a Task record by ID
    pub async fn get_task(&self, id: &str) -> StateResponse<Option<Task>> {
        debug!(%id, "get_task: called");
        let id = id.to_string();
        self.request(|reply| StateCommand::GetTask { id, reply }).await
    }

    /// List Task records matching `filter`, newest first
    pub async fn list_tasks(&self, filter: TaskFilter) -> StateResponse<Vec<Task>> {
        debug!(?filter, "list_tasks: called");
        self.request(|reply| StateCommand::ListTasks { filter, reply }).await
    }

    /// Apply a state machine transition and persist the result
    ///
    /// Returns the updated task. A rejected transition leaves the stored
    /// task untouched.
    pub async fn transition(&self, id: &str, transition: Transition) -> StateResponse<Task> {
        debug!(%id, kind = ?transition.kind(), "transition: called");
        let id = id.to_string();
        self.request(|reply| StateCommand::Transition { id, transition, reply }).await
    }

    /// Shutdown the StateManager
    pub async fn shutdown(&self) -> StateResponse<()> {
        debug!("shutdown: called");
        self.tx
            .send(StateCommand::Shutdown)
            .await
            .map_err(|_| StateError::ChannelError)
    }
}

fn store_err(e: impl std::fmt::Display) -> StateError {
    StateError::StoreError(e.to_string())
}

fn apply_transition(store: &mut dyn Store, id: &str, transition: Transition) -> StateResponse<Task> {
    let mut task = store
        .get_task(id)
        .map_err(store_err)?
        .ok_or_else(|| StateError::NotFound(id.to_string()))?;

    let kind = task.apply(transition, Utc::now())?;
    store.put_task(&task).map_err(store_err)?;
    debug!(task_id = %id, ?kind, status = %task.status, "apply_transition: persisted");
    Ok(task)
}

/// The actor loop that processes commands
async fn actor_loop(mut store: Box<dyn Store>, mut rx: mpsc::Receiver<StateCommand>) {
    debug!("actor_loop: called");
    debug!("StateManager actor started");

    while let Some(cmd) = rx.recv().await {
        match cmd {
            StateCommand::PutAgent { agent, reply } => {
                debug!(agent_id = %agent.id, "actor_loop: PutAgent command");
                let _ = reply.send(store.put_agent(&agent).map_err(store_err));
            }

            StateCommand::GetAgent { id, reply } => {
                debug!(%id, "actor_loop: GetAgent command");
                let _ = reply.send(store.get_agent(&id).map_err(store_err));
            }

            StateCommand::ListAgents { user_id, reply } => {
                debug!(%user_id, "actor_loop: ListAgents command");
                let _ = reply.send(store.list_agents(&user_id).map_err(store_err));
            }

            StateCommand::CreateTask { task, reply } => {
                debug!(task_id = %task.id, "actor_loop: CreateTask command");
                let result = store.put_task(&task).map(|_| task.id.clone()).map_err(store_err);
                let _ = reply.send(result);
            }

            StateCommand::GetTask { id, reply } => {
                debug!(%id, "actor_loop: GetTask command");
                let _ = reply.send(store.get_task(&id).map_err(store_err));
            }

            StateCommand::ListTasks { filter, reply } => {
                debug!(?filter, "actor_loop: ListTasks command");
                let _ = reply.send(store.list_tasks(&filter).map_err(store_err));
            }

            StateCommand::Transition { id, transition, reply } => {
                debug!(%id, "actor_loop: Transition command");
                let result = apply_transition(store.as_mut(), &id, transition);
                if let Err(e) = &result {
                    warn!(task_id = %id, error = %e, "Transition rejected");
                }
                let _ = reply.send(result);
            }

            StateCommand::Shutdown => {
                info!("StateManager shutting down");
                break;
            }
        }
    }

    debug!("StateManager actor stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{TaskEdit, TaskStatus};
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_state_manager_agent_crud() {
        let manager = StateManager::in_memory();

        let agent = Agent::new("alice", "Helper", "You help.", "gpt-4");
        manager.put_agent(agent.clone()).await.unwrap();

        let retrieved = manager.get_agent(&agent.id).await.unwrap();
        assert_eq!(retrieved, Some(agent.clone()));
        assert_eq!(manager.list_agents("alice").await.unwrap().len(), 1);
        assert!(manager.get_agent("nope").await.unwrap().is_none());

        manager.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_state_manager_task_crud() {
        let temp = tempdir().unwrap();
        let manager = StateManager::spawn(temp.path().join("agentd.db")).unwrap();

        let task = Task::new("alice", "agent-1", "Translate this sentence");
        let id = manager.create_task(task.clone()).await.unwrap();
        assert_eq!(id, task.id);

        let retrieved = manager.get_task(&id).await.unwrap().unwrap();
        assert_eq!(retrieved.prompt, "Translate this sentence");

        let pending = manager
            .list_tasks(TaskFilter::for_user("alice").with_status(TaskStatus::Pending))
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);

        manager.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_transition_persists() {
        let manager = StateManager::in_memory();
        let task = Task::new("alice", "agent-1", "Translate this sentence");
        manager.create_task(task.clone()).await.unwrap();

        let started = manager.transition(&task.id, Transition::Start { attempt: 0, generation: 0 }).await.unwrap();
        assert_eq!(started.status, TaskStatus::Processing);
        assert!(started.started_at.is_some());

        let stored = manager.get_task(&task.id).await.unwrap().unwrap();
        assert_eq!(stored, started);
    }

    #[tokio::test]
    async fn test_rejected_transition_does_not_mutate() {
        let manager = StateManager::in_memory();
        let task = Task::new("alice", "agent-1", "Translate this sentence");
        manager.create_task(task.clone()).await.unwrap();

        let result = manager.transition(&task.id, Transition::Retry).await;
        assert!(matches!(result.unwrap_err(), StateError::InvalidTransition(_)));

        let stored = manager.get_task(&task.id).await.unwrap().unwrap();
        assert_eq!(stored, task);
    }

    #[tokio::test]
    async fn test_transition_unknown_task() {
        let manager = StateManager::in_memory();
        let result = manager.transition("missing", Transition::Cancel).await;
        assert!(matches!(result.unwrap_err(), StateError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_edit_through_manager() {
        let manager = StateManager::in_memory();
        let task = Task::new("alice", "agent-1", "Translate this sentence");
        manager.create_task(task.clone()).await.unwrap();

        let edit = TaskEdit {
            prompt: Some("Translate this paragraph".to_string()),
            ..Default::default()
        };
        let updated = manager.transition(&task.id, Transition::Edit(edit)).await.unwrap();
        assert_eq!(updated.prompt, "Translate this paragraph");
        assert_eq!(updated.status, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn test_closed_manager_reports_channel_error() {
        let manager = StateManager::in_memory();
        manager.shutdown().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let result = manager.get_task("anything").await;
        assert!(matches!(result.unwrap_err(), StateError::ChannelError));
    }
}
