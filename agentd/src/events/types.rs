//! Task event vocabulary
//!
//! Every task state change produces one named event (`task.created`,
//! `task.processing`, ...) plus the generic `task.event`, both carrying a
//! [`TaskEventPayload`] snapshot of the task.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Priority, Task, TaskStatus, TransitionKind};

/// Event names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskEventType {
    #[serde(rename = "task.created")]
    Created,
    #[serde(rename = "task.processing")]
    Processing,
    #[serde(rename = "task.completed")]
    Completed,
    #[serde(rename = "task.failed")]
    Failed,
    #[serde(rename = "task.cancelled")]
    Cancelled,
    #[serde(rename = "task.updated")]
    Updated,
    /// Generic event emitted alongside every named one
    #[serde(rename = "task.event")]
    Event,
}

impl TaskEventType {
    /// Wire name of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "task.created",
            Self::Processing => "task.processing",
            Self::Completed => "task.completed",
            Self::Failed => "task.failed",
            Self::Cancelled => "task.cancelled",
            Self::Updated => "task.updated",
            Self::Event => "task.event",
        }
    }

    /// Event announcing the state reached by a transition
    pub fn for_transition(kind: TransitionKind) -> Self {
        match kind {
            TransitionKind::Start => Self::Processing,
            TransitionKind::Complete => Self::Completed,
            TransitionKind::Fail => Self::Failed,
            TransitionKind::Cancel => Self::Cancelled,
            TransitionKind::Retry | TransitionKind::Edit | TransitionKind::Interrupt => Self::Updated,
        }
    }
}

impl std::fmt::Display for TaskEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Task snapshot carried by every event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskEventPayload {
    pub task_id: String,
    pub user_id: String,
    pub agent_id: String,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_used: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_count: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<&Task> for TaskEventPayload {
    fn from(task: &Task) -> Self {
        Self {
            task_id: task.id.clone(),
            user_id: task.user_id.clone(),
            agent_id: task.agent_id.clone(),
            status: task.status,
            priority: Some(task.priority),
            prompt: Some(task.prompt.clone()),
            response: task.response.clone(),
            error: task.error.clone(),
            tokens_used: task.tokens_used,
            execution_time_ms: task.execution_time_ms,
            retry_count: Some(task.retry_count),
            created_at: task.created_at,
            updated_at: task.updated_at,
            started_at: task.started_at,
            completed_at: task.completed_at,
        }
    }
}

/// A delivered event: `{event, data, timestamp}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEvent {
    pub event: TaskEventType,
    pub data: TaskEventPayload,
    pub timestamp: DateTime<Utc>,
}

impl TaskEvent {
    pub fn new(event: TaskEventType, data: TaskEventPayload) -> Self {
        Self {
            event,
            data,
            timestamp: Utc::now(),
        }
    }

    /// Owning user of the task
    pub fn user_id(&self) -> &str {
        &self.data.user_id
    }

    pub fn task_id(&self) -> &str {
        &self.data.task_id
    }
}

/// JSONL log entry with timestamp
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogEntry {
    /// Timestamp of the write
    #[serde(rename = "ts")]
    pub timestamp: DateTime<Utc>,
    /// The event
    pub event: TaskEvent,
}

impl EventLogEntry {
    /// Create a new log entry with current timestamp
    pub fn new(event: TaskEvent) -> Self {
        Self {
            timestamp: Utc::now(),
            event,
        }
    }
}
