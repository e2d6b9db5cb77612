//! Job types for the work queue

use std::time::Duration;

use tokio::time::Instant;

use crate::domain::Task;

use super::config::QueueConfig;

/// Exponential retry delay: `delay × 2^(n-1)` before retry n, capped at `max`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub delay: Duration,
    pub max: Duration,
}

impl Backoff {
    /// Delay before the next delivery, given how many attempts have failed
    pub fn delay_for(&self, attempts_made: u32) -> Duration {
        let exponent = attempts_made.saturating_sub(1);
        let factor = 2u32.checked_pow(exponent).unwrap_or(u32::MAX);
        self.delay.saturating_mul(factor).min(self.max)
    }
}

/// Delivery options attached to a job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobOptions {
    /// Dequeue rank, 1 first
    pub priority: u8,

    /// Total deliveries allowed, first one included
    pub attempts: u32,

    pub backoff: Backoff,
}

impl JobOptions {
    /// Submission options for a task: rank from priority, `max_retries + 1`
    /// attempts, exponential backoff from the configured base delay
    pub fn for_task(task: &Task, config: &QueueConfig) -> Self {
        Self {
            priority: task.priority.queue_rank(),
            attempts: task.max_attempts(),
            backoff: Backoff {
                delay: config.backoff_delay(),
                max: config.max_backoff(),
            },
        }
    }
}

/// A unit of queued work, keyed 1:1 by task ID
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub task_id: String,
    pub options: JobOptions,

    /// Failed deliveries so far; 0 on the first delivery
    pub attempts_made: u32,

    /// Task generation this job was submitted for
    pub generation: u32,
}

impl Job {
    pub fn new(task_id: impl Into<String>, options: JobOptions) -> Self {
        Self {
            task_id: task_id.into(),
            options,
            attempts_made: 0,
            generation: 0,
        }
    }

    /// Build the job for a task
    pub fn for_task(task: &Task, config: &QueueConfig) -> Self {
        Self {
            generation: task.generation,
            ..Self::new(task.id.clone(), JobOptions::for_task(task, config))
        }
    }

    /// Resume the job as if `attempts_made` deliveries had already failed
    pub fn with_attempts_made(mut self, attempts_made: u32) -> Self {
        self.attempts_made = attempts_made;
        self
    }

    /// Check whether a failure of this delivery is followed by another one
    pub fn redelivers_after_failure(&self) -> bool {
        self.attempts_made + 1 < self.options.attempts
    }

    /// Check whether another delivery is allowed after `attempts_made` failures
    pub fn has_attempts_left(&self) -> bool {
        self.attempts_made < self.options.attempts
    }
}

/// Result of enqueueing a job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueResult {
    /// Newly queued
    Queued,

    /// Replaced a job for the same task that was still waiting
    Replaced,

    /// Task is being processed; delivered after the active attempt finishes
    Deferred,

    /// Queue no longer accepts work
    Closed,
}

/// Result of reporting a failed delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailResult {
    /// Scheduled for another delivery
    Retrying { attempt: u32, delay: Duration },

    /// All attempts used
    Exhausted,

    /// Permanent failure, not redelivered
    Discarded,

    /// A newer job for the task was deferred and takes over
    Superseded,

    /// The job was not active
    Unknown,
}

/// Cumulative queue statistics
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct QueueStats {
    pub total_enqueued: u64,
    pub total_completed: u64,
    pub total_retried: u64,
    pub total_exhausted: u64,
    pub total_discarded: u64,
    pub peak_depth: usize,
}

/// Queue snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueState {
    /// Ready to be dequeued
    pub waiting: usize,

    /// Backing off until a due time
    pub delayed: usize,

    /// Delivered and not yet acked or failed
    pub active: usize,

    /// Waiting for the active attempt of the same task
    pub deferred: usize,

    pub closed: bool,
    pub stats: QueueStats,
}

impl QueueState {
    /// Check if nothing is queued, backing off or running
    pub fn is_idle(&self) -> bool {
        self.waiting == 0 && self.delayed == 0 && self.active == 0 && self.deferred == 0
    }
}

/// Ready job in the dequeue heap
#[derive(Debug, Clone)]
pub(crate) struct ReadyEntry {
    pub seq: u64,
    pub job: Job,
}

impl Eq for ReadyEntry {}

impl PartialEq for ReadyEntry {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Ord for ReadyEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Lower rank first, then earlier arrival
        other
            .job
            .options
            .priority
            .cmp(&self.job.options.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for ReadyEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Job backing off until `due`
#[derive(Debug, Clone)]
pub(crate) struct DelayedEntry {
    pub due: Instant,
    pub seq: u64,
    pub job: Job,
}

impl Eq for DelayedEntry {}

impl PartialEq for DelayedEntry {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Ord for DelayedEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Earliest due first
        other.due.cmp(&self.due).then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for DelayedEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
