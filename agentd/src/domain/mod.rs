//! Domain types for agentd
//!
//! Core domain types: Agent, Task
//! Task owns its state machine; everything else in the crate changes a
//! task only through [`Task::apply`].

mod agent;
mod id;
mod priority;
mod task;

pub use agent::{Agent, AgentStatus, DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE, MAX_NAME_LEN, MAX_TOKENS_LIMIT};
pub use id::{generate_id, is_valid_id};
pub use priority::Priority;
pub use task::{
    DEFAULT_MAX_RETRIES, MAX_RETRIES_LIMIT, Task, TaskEdit, TaskStatus, Transition, TransitionError, TransitionKind,
};
