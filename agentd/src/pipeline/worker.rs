//! Worker pool: consumer slots pulling jobs from the shared queue

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::task::{AbortHandle, JoinError, JoinHandle};
use tracing::{debug, error, info, warn};

use super::processor::{JobOutcome, TaskProcessor};
use crate::queue::{Job, WorkQueue};

/// A fixed number of workers sharing one queue
pub struct WorkerPool {
    queue: Arc<WorkQueue>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `count` workers (at least one)
    pub fn spawn(count: usize, queue: Arc<WorkQueue>, processor: Arc<TaskProcessor>) -> Self {
        let count = count.max(1);
        info!(count, "Starting worker pool");
        let workers = (0..count)
            .map(|worker_id| tokio::spawn(worker_loop(worker_id, queue.clone(), processor.clone())))
            .collect();
        Self { queue, workers }
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Close the queue and wait for in-flight jobs to settle
    ///
    /// Workers still running after `timeout` are aborted; returns how many.
    pub async fn shutdown(self, timeout: Duration) -> usize {
        debug!(workers = self.workers.len(), ?timeout, "WorkerPool::shutdown: called");
        self.queue.close().await;

        let aborts: Vec<AbortHandle> = self.workers.iter().map(|h| h.abort_handle()).collect();
        match tokio::time::timeout(timeout, join_all(self.workers)).await {
            Ok(_) => {
                debug!("WorkerPool::shutdown: all workers finished");
                0
            }
            Err(_) => {
                let remaining: Vec<_> = aborts.into_iter().filter(|h| !h.is_finished()).collect();
                warn!("Aborting {} workers after timeout", remaining.len());
                for handle in &remaining {
                    handle.abort();
                }
                remaining.len()
            }
        }
    }
}

async fn worker_loop(worker_id: usize, queue: Arc<WorkQueue>, processor: Arc<TaskProcessor>) {
    debug!(worker_id, "worker_loop: started");

    while let Some(job) = queue.next().await {
        debug!(worker_id, task_id = %job.task_id, attempt = job.attempts_made, "worker_loop: got job");
        let outcome = run_job(&processor, &job).await;
        settle(&queue, &job, outcome).await;
    }

    debug!(worker_id, "worker_loop: queue closed, exiting");
}

/// Run the job in its own task so a panic is reported instead of killing the worker
async fn run_job(processor: &Arc<TaskProcessor>, job: &Job) -> JobOutcome {
    let handle = {
        let processor = processor.clone();
        let job = job.clone();
        tokio::spawn(async move { processor.process(&job).await })
    };

    match handle.await {
        Ok(outcome) => outcome,
        Err(e) if e.is_panic() => {
            let message = panic_message(e);
            error!(task_id = %job.task_id, %message, "Worker crashed while processing task");
            processor.handle_crash(job, &message).await
        }
        Err(e) => {
            warn!(task_id = %job.task_id, error = %e, "Job task cancelled");
            processor.handle_crash(job, "cancelled").await
        }
    }
}

fn panic_message(e: JoinError) -> String {
    let payload = e.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

async fn settle(queue: &WorkQueue, job: &Job, outcome: JobOutcome) {
    let task_id = job.task_id.as_str();
    match outcome {
        JobOutcome::Done => {
            queue.ack(task_id).await;
        }
        JobOutcome::Retry { min_delay } => {
            let result = queue.fail(task_id, true, min_delay).await;
            debug!(%task_id, ?result, "settle: retryable failure reported");
        }
        JobOutcome::Discard => {
            let result = queue.fail(task_id, false, None).await;
            debug!(%task_id, ?result, "settle: job discarded");
        }
    }
}
