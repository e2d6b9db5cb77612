//! Crash recovery
//!
//! The work queue lives in memory, so after a restart the store is the only
//! record of outstanding work. Interrupted tasks go back to pending, every
//! pending task is queued again, and failed tasks that were waiting for an
//! automatic retry get that delivery back.

use tracing::{debug, info, warn};

use crate::domain::{Task, TaskStatus, Transition};
use crate::queue::{EnqueueResult, Job, QueueConfig, WorkQueue};

use super::{StateManager, TaskFilter};

/// Recovery statistics
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecoveryStats {
    /// Tasks found mid-processing and reset to pending
    pub interrupted: usize,
    /// Pending tasks put back on the queue
    pub requeued: usize,
    /// Failed tasks whose automatic retry was lost with the old queue
    pub rescheduled: usize,
}

impl std::fmt::Display for RecoveryStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "interrupted: {}, requeued: {}, rescheduled: {}",
            self.interrupted, self.requeued, self.rescheduled
        )
    }
}

async fn list(state: &StateManager, status: TaskStatus) -> eyre::Result<Vec<Task>> {
    state
        .list_tasks(TaskFilter::default().with_status(status))
        .await
        .map_err(|e| eyre::eyre!("Failed to list {} tasks: {}", status, e))
}

/// Failed tasks still owed a redelivery, oldest first
async fn awaiting_retry(state: &StateManager) -> eyre::Result<Vec<Task>> {
    let mut failed = list(state, TaskStatus::Failed).await?;
    failed.retain(|task| task.retry_scheduled);
    failed.reverse();
    Ok(failed)
}

/// Count tasks left behind by a previous run without changing anything
pub async fn scan_for_recovery(state: &StateManager) -> eyre::Result<RecoveryStats> {
    let processing = list(state, TaskStatus::Processing).await?;
    let pending = list(state, TaskStatus::Pending).await?;
    let failed = awaiting_retry(state).await?;

    for task in &processing {
        debug!(task_id = %task.id, "Found processing task needing recovery");
    }

    Ok(RecoveryStats {
        interrupted: processing.len(),
        requeued: processing.len() + pending.len(),
        rescheduled: failed.len(),
    })
}

/// Full recovery process: reset interrupted tasks, requeue pending ones and
/// resume automatic retries of failed ones
pub async fn recover(state: &StateManager, queue: &WorkQueue, config: &QueueConfig) -> eyre::Result<RecoveryStats> {
    info!("Starting crash recovery process");
    let mut stats = RecoveryStats::default();

    for task in list(state, TaskStatus::Processing).await? {
        warn!(task_id = %task.id, user_id = %task.user_id, "Marking interrupted task as pending");
        state
            .transition(&task.id, Transition::Interrupt)
            .await
            .map_err(|e| eyre::eyre!("Failed to reset task {}: {}", task.id, e))?;
        stats.interrupted += 1;
    }

    let mut pending = list(state, TaskStatus::Pending).await?;
    // Oldest first so FIFO order within a priority survives the restart
    pending.reverse();

    for task in pending {
        match queue.enqueue(Job::for_task(&task, config)).await {
            EnqueueResult::Closed => {
                warn!("Queue closed during recovery, stopping");
                return Ok(stats);
            }
            result => {
                debug!(task_id = %task.id, ?result, "recover: requeued");
                stats.requeued += 1;
            }
        }
    }

    for task in awaiting_retry(state).await? {
        // The redelivery that follows the recorded failure
        let job = Job::for_task(&task, config).with_attempts_made(task.retry_count + 1);
        match queue.enqueue(job).await {
            EnqueueResult::Closed => {
                warn!("Queue closed during recovery, stopping");
                return Ok(stats);
            }
            result => {
                debug!(task_id = %task.id, retry_count = task.retry_count, ?result, "recover: retry rescheduled");
                stats.rescheduled += 1;
            }
        }
    }

    if stats != RecoveryStats::default() {
        info!("Crash recovery complete: {}", stats);
    } else {
        debug!("Recovery found no outstanding work");
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Priority;

    async fn seed(state: &StateManager, status: TaskStatus) -> Task {
        let task = Task::new("alice", "agent-1", "Recover me after a crash");
        state.create_task(task.clone()).await.unwrap();
        match status {
            TaskStatus::Pending => task,
            TaskStatus::Processing => state.transition(&task.id, Transition::Start { attempt: 0, generation: 0 }).await.unwrap(),
            TaskStatus::Cancelled => state.transition(&task.id, Transition::Cancel).await.unwrap(),
            TaskStatus::Failed => {
                state
                    .transition(&task.id, Transition::Start { attempt: 0, generation: 0 })
                    .await
                    .unwrap();
                let fail = Transition::Fail {
                    error: "upstream 503".to_string(),
                    attempts_made: 0,
                    will_retry: true,
                };
                state.transition(&task.id, fail).await.unwrap()
            }
            other => panic!("unsupported seed status {other}"),
        }
    }

    #[tokio::test]
    async fn test_recover_resets_and_requeues() {
        let state = StateManager::in_memory();
        let queue = WorkQueue::new();
        let config = QueueConfig::default();

        let interrupted = seed(&state, TaskStatus::Processing).await;
        let pending = seed(&state, TaskStatus::Pending).await;
        let cancelled = seed(&state, TaskStatus::Cancelled).await;

        let scan = scan_for_recovery(&state).await.unwrap();
        assert_eq!(scan.interrupted, 1);
        assert_eq!(scan.requeued, 2);

        let stats = recover(&state, &queue, &config).await.unwrap();
        assert_eq!(stats, scan);

        let reset = state.get_task(&interrupted.id).await.unwrap().unwrap();
        assert_eq!(reset.status, TaskStatus::Pending);
        assert!(reset.started_at.is_none());

        assert!(queue.contains(&interrupted.id).await);
        assert!(queue.contains(&pending.id).await);
        assert!(!queue.contains(&cancelled.id).await);
    }

    #[tokio::test]
    async fn test_recover_resumes_scheduled_retry() {
        let state = StateManager::in_memory();
        let queue = WorkQueue::new();
        let config = QueueConfig::default();

        let failed = seed(&state, TaskStatus::Failed).await;
        assert!(failed.retry_scheduled);

        // Exhausted failures stay failed
        let exhausted = Task::new("alice", "agent-1", "Out of attempts already").with_max_retries(0);
        state.create_task(exhausted.clone()).await.unwrap();
        state
            .transition(&exhausted.id, Transition::Start { attempt: 0, generation: 0 })
            .await
            .unwrap();
        let fail = Transition::Fail {
            error: "upstream 503".to_string(),
            attempts_made: 0,
            will_retry: true,
        };
        state.transition(&exhausted.id, fail).await.unwrap();

        let scan = scan_for_recovery(&state).await.unwrap();
        assert_eq!(scan.rescheduled, 1);

        let stats = recover(&state, &queue, &config).await.unwrap();
        assert_eq!(stats.rescheduled, 1);
        assert_eq!(stats.requeued, 0);
        assert!(!queue.contains(&exhausted.id).await);

        let job = queue.next().await.unwrap();
        assert_eq!(job.task_id, failed.id);
        assert_eq!(job.attempts_made, 1);

        // The resumed job is exactly the delivery the task accepts next
        let task = state.get_task(&failed.id).await.unwrap().unwrap();
        let start = Transition::Start {
            attempt: job.attempts_made,
            generation: job.generation,
        };
        assert!(task.check(&start).is_ok());
    }

    #[tokio::test]
    async fn test_recover_keeps_priority() {
        let state = StateManager::in_memory();
        let queue = WorkQueue::new();

        let low = Task::new("alice", "agent-1", "Low priority work").with_priority(Priority::Low);
        let urgent = Task::new("alice", "agent-1", "Urgent priority work").with_priority(Priority::Urgent);
        state.create_task(low.clone()).await.unwrap();
        state.create_task(urgent.clone()).await.unwrap();

        recover(&state, &queue, &QueueConfig::default()).await.unwrap();

        let first = queue.next().await.unwrap();
        assert_eq!(first.task_id, urgent.id);
    }

    #[tokio::test]
    async fn test_recover_nothing_to_do() {
        let state = StateManager::in_memory();
        let queue = WorkQueue::new();
        let stats = recover(&state, &queue, &QueueConfig::default()).await.unwrap();
        assert_eq!(stats, RecoveryStats::default());
        assert!(queue.state().await.is_idle());
    }
}
