//! agentd - asynchronous LLM agent task runner
//!
//! Users define agents (a system prompt, a model and generation parameters)
//! and submit tasks (prompts) that run in the background against a
//! pluggable set of LLM providers, with status tracking, retries and
//! per-user notifications.
//!
//! # Core Concepts
//!
//! - **One delivery per task**: the work queue is keyed by task ID and never
//!   hands the same task to two workers at once
//! - **State machine owns status**: every status change goes through
//!   [`Task::apply`], so illegal transitions are rejected without mutation
//! - **Uniform providers**: vendors sit behind [`LlmClient`]; the
//!   [`ModelRouter`] picks one per logical model id
//! - **Retry is pipeline policy**: adapters and the orchestrator never retry;
//!   the pipeline classifies failures and the queue applies backoff
//!
//! # Modules
//!
//! - [`domain`] - Agent, Task and the task state machine
//! - [`llm`] - provider adapters, model router, completion orchestrator
//! - [`queue`] - in-memory priority work queue with backoff
//! - [`pipeline`] - task processor and worker pool
//! - [`state`] - persistence actor, stores and crash recovery
//! - [`events`] - task notifications and the JSONL event log
//! - [`service`] - task and agent operations for callers
//! - [`config`] - configuration types and loading
//! - [`cli`] - command-line interface

pub mod cli;
pub mod config;
pub mod domain;
pub mod events;
pub mod llm;
pub mod pipeline;
pub mod queue;
pub mod service;
pub mod state;

// Re-export commonly used types
pub use config::{Config, ProviderKind};
pub use domain::{Agent, AgentStatus, Priority, Task, TaskEdit, TaskStatus, Transition, TransitionError};
pub use events::{EventBus, TaskEvent, TaskEventPayload, TaskEventType};
pub use llm::{
    CompletionOrchestrator, CompletionRequest, CompletionResponse, CompletionResult, LlmClient, LlmError, ModelRouter,
};
pub use pipeline::{JobOutcome, TaskProcessor, WorkerPool};
pub use queue::{Job, QueueConfig, WorkQueue};
pub use service::{AgentEdit, NewAgent, NewTask, ServiceError, TaskService, TaskStats};
pub use state::{RecoveryStats, StateError, StateManager, TaskFilter, recover};
