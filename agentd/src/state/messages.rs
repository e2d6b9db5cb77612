//! State manager messages
//!
//! Commands and responses for the actor pattern.

use thiserror::Error;
use tokio::sync::oneshot;

use crate::domain::{Agent, Task, Transition, TransitionError};

use super::store::TaskFilter;

/// Errors from state operations
#[derive(Debug, Error)]
pub enum StateError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),

    #[error("Store error: {0}")]
    StoreError(String),

    #[error("Channel error")]
    ChannelError,
}

/// Response from state operations
pub type StateResponse<T> = Result<T, StateError>;

/// Commands sent to the StateManager actor
#[derive(Debug)]
pub enum StateCommand {
    // Agent operations
    PutAgent {
        agent: Agent,
        reply: oneshot::Sender<StateResponse<()>>,
    },
    GetAgent {
        id: String,
        reply: oneshot::Sender<StateResponse<Option<Agent>>>,
    },
    ListAgents {
        user_id: String,
        reply: oneshot::Sender<StateResponse<Vec<Agent>>>,
    },

    // Task operations
    CreateTask {
        task: Task,
        reply: oneshot::Sender<StateResponse<String>>,
    },
    GetTask {
        id: String,
        reply: oneshot::Sender<StateResponse<Option<Task>>>,
    },
    ListTasks {
        filter: TaskFilter,
        reply: oneshot::Sender<StateResponse<Vec<Task>>>,
    },
    /// Load, apply and persist in one step
    Transition {
        id: String,
        transition: Transition,
        reply: oneshot::Sender<StateResponse<Task>>,
    },

    Shutdown,
}
