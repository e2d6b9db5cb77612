//! Persistence boundary for agents and tasks
//!
//! Records are stored whole as JSON with the queried fields pulled out
//! into indexed columns.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use thiserror::Error;
use tracing::debug;

use crate::domain::{Agent, Task, TaskStatus};

/// Errors from a store backend
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Filters for listing tasks; `None` matches anything
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFilter {
    pub user_id: Option<String>,
    pub status: Option<TaskStatus>,
    pub agent_id: Option<String>,
}

impl TaskFilter {
    /// All tasks of one user
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Default::default()
        }
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    /// Check whether a task passes the filter
    pub fn matches(&self, task: &Task) -> bool {
        self.user_id.as_ref().is_none_or(|u| *u == task.user_id)
            && self.status.is_none_or(|s| s == task.status)
            && self.agent_id.as_ref().is_none_or(|a| *a == task.agent_id)
    }
}

/// Storage backend owned by the state actor
///
/// Writes are upserts keyed by record ID. Listings are newest first.
pub trait Store: Send {
    fn put_agent(&mut self, agent: &Agent) -> Result<(), StoreError>;
    fn get_agent(&self, id: &str) -> Result<Option<Agent>, StoreError>;
    fn list_agents(&self, user_id: &str) -> Result<Vec<Agent>, StoreError>;

    fn put_task(&mut self, task: &Task) -> Result<(), StoreError>;
    fn get_task(&self, id: &str) -> Result<Option<Task>, StoreError>;
    fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>, StoreError>;
}

/// Volatile store for tests and one-off runs
#[derive(Debug, Default)]
pub struct MemoryStore {
    agents: HashMap<String, Agent>,
    tasks: HashMap<String, Task>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn put_agent(&mut self, agent: &Agent) -> Result<(), StoreError> {
        self.agents.insert(agent.id.clone(), agent.clone());
        Ok(())
    }

    fn get_agent(&self, id: &str) -> Result<Option<Agent>, StoreError> {
        Ok(self.agents.get(id).cloned())
    }

    fn list_agents(&self, user_id: &str) -> Result<Vec<Agent>, StoreError> {
        let mut agents: Vec<Agent> = self.agents.values().filter(|a| a.user_id == user_id).cloned().collect();
        agents.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(agents)
    }

    fn put_task(&mut self, task: &Task) -> Result<(), StoreError> {
        self.tasks.insert(task.id.clone(), task.clone());
        Ok(())
    }

    fn get_task(&self, id: &str) -> Result<Option<Task>, StoreError> {
        Ok(self.tasks.get(id).cloned())
    }

    fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>, StoreError> {
        let mut tasks: Vec<Task> = self.tasks.values().filter(|t| filter.matches(t)).cloned().collect();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(tasks)
    }
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS agents (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    data TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_agents_user ON agents(user_id);

CREATE TABLE IF NOT EXISTS tasks (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    agent_id TEXT NOT NULL,
    status TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    data TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_tasks_user ON tasks(user_id);
CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status);
CREATE INDEX IF NOT EXISTS idx_tasks_agent ON tasks(agent_id);
";

/// SQLite-backed store
pub struct SqliteStore {
    conn: Connection,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").field("path", &self.path).finish()
    }
}

impl SqliteStore {
    /// Open (or create) the database at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        debug!(path = %path.display(), "SqliteStore::open: called");
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn,
            path: Some(path.to_path_buf()),
        })
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn, path: None })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

impl Store for SqliteStore {
    fn put_agent(&mut self, agent: &Agent) -> Result<(), StoreError> {
        debug!(agent_id = %agent.id, "SqliteStore::put_agent: called");
        let data = serde_json::to_string(agent)?;
        self.conn.execute(
            "INSERT OR REPLACE INTO agents (id, user_id, created_at, data) VALUES (?1, ?2, ?3, ?4)",
            params![agent.id, agent.user_id, agent.created_at.timestamp_micros(), data],
        )?;
        Ok(())
    }

    fn get_agent(&self, id: &str) -> Result<Option<Agent>, StoreError> {
        let data: Option<String> = self
            .conn
            .query_row("SELECT data FROM agents WHERE id = ?1", [id], |row| row.get(0))
            .optional()?;
        Ok(data.map(|d| serde_json::from_str(&d)).transpose()?)
    }

    fn list_agents(&self, user_id: &str) -> Result<Vec<Agent>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT data FROM agents WHERE user_id = ?1 ORDER BY created_at DESC")?;
        let rows = stmt.query_map([user_id], |row| row.get::<_, String>(0))?;

        let mut agents = Vec::new();
        for row in rows {
            agents.push(serde_json::from_str(&row?)?);
        }
        Ok(agents)
    }

    fn put_task(&mut self, task: &Task) -> Result<(), StoreError> {
        debug!(task_id = %task.id, status = %task.status, "SqliteStore::put_task: called");
        let data = serde_json::to_string(task)?;
        self.conn.execute(
            "INSERT OR REPLACE INTO tasks (id, user_id, agent_id, status, created_at, data)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                task.id,
                task.user_id,
                task.agent_id,
                task.status.to_string(),
                task.created_at.timestamp_micros(),
                data
            ],
        )?;
        Ok(())
    }

    fn get_task(&self, id: &str) -> Result<Option<Task>, StoreError> {
        let data: Option<String> = self
            .conn
            .query_row("SELECT data FROM tasks WHERE id = ?1", [id], |row| row.get(0))
            .optional()?;
        Ok(data.map(|d| serde_json::from_str(&d)).transpose()?)
    }

    fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>, StoreError> {
        debug!(?filter, "SqliteStore::list_tasks: called");
        let mut clauses = Vec::new();
        let mut values = Vec::new();
        if let Some(user_id) = &filter.user_id {
            values.push(user_id.clone());
            clauses.push(format!("user_id = ?{}", values.len()));
        }
        if let Some(status) = filter.status {
            values.push(status.to_string());
            clauses.push(format!("status = ?{}", values.len()));
        }
        if let Some(agent_id) = &filter.agent_id {
            values.push(agent_id.clone());
            clauses.push(format!("agent_id = ?{}", values.len()));
        }

        let mut sql = String::from("SELECT data FROM tasks");
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY created_at DESC");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), |row| row.get::<_, String>(0))?;

        let mut tasks = Vec::new();
        for row in rows {
            tasks.push(serde_json::from_str(&row?)?);
        }
        Ok(tasks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use tempfile::tempdir;

    fn task_at(user: &str, agent: &str, minutes_ago: i64) -> Task {
        let mut t = Task::new(user, agent, "Write a haiku about storage");
        t.created_at = Utc::now() - Duration::minutes(minutes_ago);
        t
    }

    fn exercise(store: &mut dyn Store) {
        let agent = Agent::new("alice", "Poet", "You write poems.", "gpt-4");
        store.put_agent(&agent).unwrap();
        assert_eq!(store.get_agent(&agent.id).unwrap(), Some(agent.clone()));
        assert_eq!(store.list_agents("alice").unwrap().len(), 1);
        assert!(store.list_agents("bob").unwrap().is_empty());

        let old = task_at("alice", &agent.id, 10);
        let mut new = task_at("alice", &agent.id, 1);
        let other = task_at("bob", "agent-x", 5);
        store.put_task(&old).unwrap();
        store.put_task(&new).unwrap();
        store.put_task(&other).unwrap();

        let alice = store.list_tasks(&TaskFilter::for_user("alice")).unwrap();
        assert_eq!(alice.iter().map(|t| t.id.as_str()).collect::<Vec<_>>(), vec![new.id.as_str(), old.id.as_str()]);
        assert_eq!(store.list_tasks(&TaskFilter::default()).unwrap().len(), 3);

        // Upsert replaces the stored copy and its indexed status
        new.status = TaskStatus::Completed;
        new.response = Some("Bytes settle in rows".to_string());
        store.put_task(&new).unwrap();
        assert_eq!(store.get_task(&new.id).unwrap(), Some(new.clone()));

        let completed = store
            .list_tasks(&TaskFilter::for_user("alice").with_status(TaskStatus::Completed))
            .unwrap();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].id, new.id);

        let by_agent = store.list_tasks(&TaskFilter::default().with_agent("agent-x")).unwrap();
        assert_eq!(by_agent.len(), 1);
        assert_eq!(by_agent[0].user_id, "bob");

        assert!(store.get_task("missing").unwrap().is_none());
        assert!(store.get_agent("missing").unwrap().is_none());
    }

    #[test]
    fn test_memory_store() {
        exercise(&mut MemoryStore::new());
    }

    #[test]
    fn test_sqlite_store_in_memory() {
        exercise(&mut SqliteStore::open_in_memory().unwrap());
    }

    #[test]
    fn test_sqlite_store_persists_across_opens() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("nested").join("agentd.db");

        let task = task_at("alice", "agent-1", 0);
        {
            let mut store = SqliteStore::open(&path).unwrap();
            assert_eq!(store.path(), Some(path.as_path()));
            store.put_task(&task).unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.get_task(&task.id).unwrap(), Some(task));
    }

    #[test]
    fn test_filter_matches() {
        let t = task_at("alice", "agent-1", 0);
        assert!(TaskFilter::default().matches(&t));
        assert!(TaskFilter::for_user("alice").with_status(TaskStatus::Pending).matches(&t));
        assert!(!TaskFilter::for_user("bob").matches(&t));
        assert!(!TaskFilter::default().with_status(TaskStatus::Failed).matches(&t));
        assert!(!TaskFilter::default().with_agent("agent-2").matches(&t));
    }
}
