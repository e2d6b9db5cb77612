//! Task domain type and its state machine
//!
//! ```text
//!             start            complete
//!  pending ──────────▶ processing ──────────▶ completed
//!     ▲  ▲                 │  ▲
//!     │  │ interrupt       │  │ start (redelivery)
//!     │  └─────────────────┤  │
//!     │ retry              ▼  │
//!     └─────────────────  failed
//!
//!  pending | processing | failed ── cancel ──▶ cancelled
//! ```
//!
//! Every mutation goes through [`Task::apply`], which validates the
//! transition before touching any field.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::Priority;
use super::id::generate_id;

/// Default number of automatic retries for a new task
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Upper bound accepted for `max_retries`
pub const MAX_RETRIES_LIMIT: u32 = 10;

/// Task status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Queued for work, not yet picked up
    #[default]
    Pending,
    /// A worker is executing the task
    Processing,
    /// Terminal success
    Completed,
    /// Failed attempt; may still be redelivered while retries remain
    Failed,
    /// Terminal, no further processing
    Cancelled,
}

impl TaskStatus {
    /// All statuses, in lifecycle order
    pub const ALL: [TaskStatus; 5] = [
        TaskStatus::Pending,
        TaskStatus::Processing,
        TaskStatus::Completed,
        TaskStatus::Failed,
        TaskStatus::Cancelled,
    ];

    /// Check if no transition is driven by the pipeline from this status
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Processing => write!(f, "processing"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("Unknown task status: {}", s)),
        }
    }
}

/// Caller-editable task content
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskEdit {
    pub prompt: Option<String>,
    pub priority: Option<Priority>,
    pub max_retries: Option<u32>,
    pub metadata: Option<Value>,
}

/// A requested state change
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// A worker picked up the job; `attempt` is the number of earlier attempts of this job
    /// and `generation` the task generation the job was submitted for
    Start { attempt: u32, generation: u32 },
    /// The completion succeeded
    Complete { response: String, tokens_used: Option<u64> },
    /// The attempt failed; `attempts_made` is recorded as the retry count and
    /// `will_retry` says whether the queue redelivers the job
    Fail {
        error: String,
        attempts_made: u32,
        will_retry: bool,
    },
    /// Explicit cancel request
    Cancel,
    /// Explicit retry request
    Retry,
    /// Content edit
    Edit(TaskEdit),
    /// Crash recovery put an orphaned processing task back in the queue
    Interrupt,
}

impl Transition {
    /// Kind of this transition, without its data
    pub fn kind(&self) -> TransitionKind {
        match self {
            Self::Start { .. } => TransitionKind::Start,
            Self::Complete { .. } => TransitionKind::Complete,
            Self::Fail { .. } => TransitionKind::Fail,
            Self::Cancel => TransitionKind::Cancel,
            Self::Retry => TransitionKind::Retry,
            Self::Edit(_) => TransitionKind::Edit,
            Self::Interrupt => TransitionKind::Interrupt,
        }
    }
}

/// Discriminant of [`Transition`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransitionKind {
    Start,
    Complete,
    Fail,
    Cancel,
    Retry,
    Edit,
    Interrupt,
}

impl TransitionKind {
    /// Verb used in error messages
    pub fn action(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Complete => "complete",
            Self::Fail => "fail",
            Self::Cancel => "cancel",
            Self::Retry => "retry",
            Self::Edit => "update",
            Self::Interrupt => "interrupt",
        }
    }
}

/// Rejected transition; the task was not modified
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid state transition: cannot {action} task {task_id} with status {from}", action = .kind.action())]
pub struct TransitionError {
    pub task_id: String,
    pub from: TaskStatus,
    pub kind: TransitionKind,
}

/// A prompt submitted against an Agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier
    pub id: String,

    /// Owning user
    pub user_id: String,

    /// Agent that executes this task
    pub agent_id: String,

    pub prompt: String,

    pub response: Option<String>,

    /// Human-readable error of the last failed attempt
    pub error: Option<String>,

    pub status: TaskStatus,

    pub priority: Priority,

    /// Attempts made before the last recorded failure
    pub retry_count: u32,

    pub max_retries: u32,

    /// Bumped by every explicit retry; jobs from an older generation are stale
    #[serde(default)]
    pub generation: u32,

    /// The last failure is waiting for an automatic redelivery
    #[serde(default)]
    pub retry_scheduled: bool,

    #[serde(default)]
    pub metadata: Value,

    pub started_at: Option<DateTime<Utc>>,

    pub completed_at: Option<DateTime<Utc>>,

    /// `completed_at - started_at`, only set once both exist
    pub execution_time_ms: Option<i64>,

    pub tokens_used: Option<u64>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Create a pending task with a generated ID
    pub fn new(user_id: impl Into<String>, agent_id: impl Into<String>, prompt: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: generate_id(),
            user_id: user_id.into(),
            agent_id: agent_id.into(),
            prompt: prompt.into(),
            response: None,
            error: None,
            status: TaskStatus::Pending,
            priority: Priority::Normal,
            retry_count: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            generation: 0,
            retry_scheduled: false,
            metadata: Value::Null,
            started_at: None,
            completed_at: None,
            execution_time_ms: None,
            tokens_used: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Builder method to set priority
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Builder method to set max retries
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Builder method to set metadata
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Check if the task is in a terminal state
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Total attempts the queue may make for this task
    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// Check whether `transition` is legal from the current state
    pub fn check(&self, transition: &Transition) -> Result<(), TransitionError> {
        let allowed = match (self.status, transition) {
            (_, Transition::Start { generation, .. }) if *generation != self.generation => false,
            (TaskStatus::Pending, Transition::Start { .. }) => true,
            // Automatic redelivery after a retryable failure: only the delivery
            // that follows the recorded attempt may restart the task.
            (TaskStatus::Failed, Transition::Start { attempt, .. }) => {
                *attempt >= 1 && *attempt <= self.max_retries && self.retry_count + 1 == *attempt
            }
            (TaskStatus::Processing, Transition::Complete { .. }) => true,
            (TaskStatus::Processing, Transition::Fail { .. }) => true,
            (TaskStatus::Processing, Transition::Interrupt) => true,
            (TaskStatus::Pending | TaskStatus::Processing | TaskStatus::Failed, Transition::Cancel) => true,
            (TaskStatus::Failed, Transition::Retry) => true,
            (TaskStatus::Pending | TaskStatus::Failed | TaskStatus::Cancelled, Transition::Edit(_)) => true,
            _ => false,
        };

        if allowed {
            Ok(())
        } else {
            Err(TransitionError {
                task_id: self.id.clone(),
                from: self.status,
                kind: transition.kind(),
            })
        }
    }

    /// Apply a transition at time `now`
    ///
    /// Rejected transitions leave the task untouched.
    pub fn apply(&mut self, transition: Transition, now: DateTime<Utc>) -> Result<TransitionKind, TransitionError> {
        self.check(&transition)?;
        let kind = transition.kind();

        match transition {
            Transition::Start { .. } => {
                self.status = TaskStatus::Processing;
                self.retry_scheduled = false;
                self.started_at = Some(now);
                self.completed_at = None;
                self.execution_time_ms = None;
            }
            Transition::Complete { response, tokens_used } => {
                self.status = TaskStatus::Completed;
                self.response = Some(response);
                self.tokens_used = tokens_used;
                self.error = None;
                self.finish(now);
            }
            Transition::Fail {
                error,
                attempts_made,
                will_retry,
            } => {
                self.status = TaskStatus::Failed;
                self.error = Some(error);
                self.retry_count = attempts_made.min(self.max_retries);
                self.retry_scheduled = will_retry && self.retry_count < self.max_retries;
                self.finish(now);
            }
            Transition::Cancel => {
                self.status = TaskStatus::Cancelled;
                self.retry_scheduled = false;
            }
            Transition::Retry => {
                self.status = TaskStatus::Pending;
                self.generation += 1;
                self.retry_scheduled = false;
                self.retry_count = 0;
                self.error = None;
                self.started_at = None;
                self.completed_at = None;
                self.execution_time_ms = None;
            }
            Transition::Edit(edit) => {
                if let Some(prompt) = edit.prompt {
                    self.prompt = prompt;
                }
                if let Some(priority) = edit.priority {
                    self.priority = priority;
                }
                if let Some(max_retries) = edit.max_retries {
                    self.max_retries = max_retries;
                    self.retry_count = self.retry_count.min(max_retries);
                    if self.retry_count >= max_retries {
                        self.retry_scheduled = false;
                    }
                }
                if let Some(metadata) = edit.metadata {
                    self.metadata = metadata;
                }
            }
            Transition::Interrupt => {
                self.status = TaskStatus::Pending;
                self.started_at = None;
            }
        }

        self.updated_at = now;
        Ok(kind)
    }

    fn finish(&mut self, now: DateTime<Utc>) {
        self.completed_at = Some(now);
        self.execution_time_ms = self
            .started_at
            .map(|started| (now - started).num_milliseconds());
    }
}
