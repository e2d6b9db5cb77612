//! Per-job execution: drives one task through processing to a terminal state

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::domain::{TaskStatus, Transition};
use crate::events::{EventBus, TaskEventType};
use crate::llm::CompletionOrchestrator;
use crate::queue::Job;
use crate::state::{StateError, StateManager};

/// What the worker should report to the queue for a delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// Acknowledge; the task reached a terminal state
    Done,

    /// Count a failed attempt and redeliver if attempts remain
    Retry { min_delay: Option<Duration> },

    /// Permanent failure or no-op delivery; never redelivered
    Discard,
}

/// Executes queued jobs against the state store and the orchestrator
pub struct TaskProcessor {
    state: StateManager,
    orchestrator: CompletionOrchestrator,
    events: Arc<EventBus>,
}

impl TaskProcessor {
    pub fn new(state: StateManager, orchestrator: CompletionOrchestrator, events: Arc<EventBus>) -> Self {
        Self {
            state,
            orchestrator,
            events,
        }
    }

    /// Process one delivery of a job
    pub async fn process(&self, job: &Job) -> JobOutcome {
        let task_id = job.task_id.as_str();
        debug!(%task_id, attempts_made = job.attempts_made, "TaskProcessor::process: called");

        let task = match self.state.get_task(task_id).await {
            Ok(Some(task)) => task,
            Ok(None) => {
                warn!(%task_id, "Task not found, discarding job");
                return JobOutcome::Discard;
            }
            Err(e) => {
                error!(%task_id, error = %e, "Failed to load task");
                return JobOutcome::Retry { min_delay: None };
            }
        };

        let agent = match self.state.get_agent(&task.agent_id).await {
            Ok(agent) => agent,
            Err(e) => {
                error!(%task_id, agent_id = %task.agent_id, error = %e, "Failed to load agent");
                return JobOutcome::Retry { min_delay: None };
            }
        };

        let start = Transition::Start {
            attempt: job.attempts_made,
            generation: job.generation,
        };
        let task = match self.state.transition(task_id, start).await {
            Ok(task) => task,
            Err(StateError::InvalidTransition(e)) => {
                info!(%task_id, status = %e.from, "Skipping delivery for task that cannot start");
                return JobOutcome::Discard;
            }
            Err(StateError::NotFound(_)) => {
                warn!(%task_id, "Task disappeared before start, discarding job");
                return JobOutcome::Discard;
            }
            Err(e) => {
                error!(%task_id, error = %e, "Failed to start task");
                return JobOutcome::Retry { min_delay: None };
            }
        };
        self.events.emit_task(TaskEventType::Processing, &task);

        let Some(agent) = agent else {
            let message = format!("Agent not found: {}", task.agent_id);
            return self.fail(job, message, JobOutcome::Discard).await;
        };

        let result = self
            .orchestrator
            .complete(
                &agent.model,
                &agent.system_prompt,
                &task.prompt,
                Some(agent.temperature),
                Some(agent.max_tokens),
            )
            .await;

        match result {
            Ok(result) => {
                let transition = Transition::Complete {
                    response: result.response.content,
                    tokens_used: result.response.tokens_used,
                };
                match self.state.transition(task_id, transition).await {
                    Ok(task) => {
                        info!(
                            %task_id,
                            provider = %result.provider,
                            tokens_used = ?task.tokens_used,
                            execution_time_ms = ?task.execution_time_ms,
                            "Task completed"
                        );
                        self.events.emit_task(TaskEventType::Completed, &task);
                    }
                    Err(e) => {
                        warn!(%task_id, error = %e, "Discarding completion for task no longer processing");
                    }
                }
                JobOutcome::Done
            }
            Err(e) => {
                let outcome = if e.is_retryable() {
                    JobOutcome::Retry {
                        min_delay: e.retry_after(),
                    }
                } else {
                    JobOutcome::Discard
                };
                warn!(%task_id, reason = e.reason_code(), retryable = e.is_retryable(), error = %e, "Completion failed");
                self.fail(job, e.to_string(), outcome).await
            }
        }
    }

    /// Record a crashed delivery as a failed attempt
    ///
    /// Only applies while the task is still processing; otherwise the
    /// delivery already reached a terminal state and is discarded.
    pub async fn handle_crash(&self, job: &Job, message: &str) -> JobOutcome {
        debug!(task_id = %job.task_id, %message, "TaskProcessor::handle_crash: called");
        match self.state.get_task(&job.task_id).await {
            Ok(Some(task)) if task.status == TaskStatus::Processing => {
                self.fail(job, format!("worker crashed: {}", message), JobOutcome::Retry { min_delay: None })
                    .await
            }
            _ => JobOutcome::Discard,
        }
    }

    async fn fail(&self, job: &Job, error: String, outcome: JobOutcome) -> JobOutcome {
        let will_retry = matches!(outcome, JobOutcome::Retry { .. }) && job.redelivers_after_failure();
        let transition = Transition::Fail {
            error,
            attempts_made: job.attempts_made,
            will_retry,
        };
        match self.state.transition(&job.task_id, transition).await {
            Ok(task) => {
                info!(task_id = %task.id, retry_count = task.retry_count, error = ?task.error, "Task failed");
                self.events.emit_task(TaskEventType::Failed, &task);
                outcome
            }
            Err(e) => {
                warn!(task_id = %job.task_id, error = %e, "Could not record failure");
                JobOutcome::Discard
            }
        }
    }
}
