//! Work queue implementation

use std::collections::{BinaryHeap, HashMap};
use std::time::Duration;

use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::job::{DelayedEntry, EnqueueResult, FailResult, Job, QueueState, QueueStats, ReadyEntry};

/// Internal state protected by mutex
///
/// A task ID lives in at most one of `ready`, `delayed`, `active` and
/// `deferred` at any time.
struct QueueInner {
    /// Jobs eligible for delivery, by rank then arrival
    ready: BinaryHeap<ReadyEntry>,

    /// Jobs backing off, by due time
    delayed: BinaryHeap<DelayedEntry>,

    /// Delivered and not yet acked or failed
    active: HashMap<String, Job>,

    /// Enqueued while the same task was active
    deferred: HashMap<String, Job>,

    next_seq: u64,
    closed: bool,
    stats: QueueStats,
}

impl QueueInner {
    fn next_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    fn depth(&self) -> usize {
        self.ready.len() + self.delayed.len() + self.deferred.len()
    }

    fn push_ready(&mut self, job: Job) {
        let seq = self.next_seq();
        self.ready.push(ReadyEntry { seq, job });
        self.stats.peak_depth = self.stats.peak_depth.max(self.depth());
    }

    fn push_delayed(&mut self, job: Job, due: Instant) {
        let seq = self.next_seq();
        self.delayed.push(DelayedEntry { due, seq, job });
        self.stats.peak_depth = self.stats.peak_depth.max(self.depth());
    }

    fn is_waiting(&self, task_id: &str) -> bool {
        self.ready.iter().any(|e| e.job.task_id == task_id) || self.delayed.iter().any(|e| e.job.task_id == task_id)
    }

    /// Drop any waiting job for the task, rebuilding the heaps
    fn remove_waiting(&mut self, task_id: &str) -> bool {
        let before = self.ready.len() + self.delayed.len();

        let ready: Vec<_> = self.ready.drain().filter(|e| e.job.task_id != task_id).collect();
        self.ready = ready.into_iter().collect();

        let delayed: Vec<_> = self.delayed.drain().filter(|e| e.job.task_id != task_id).collect();
        self.delayed = delayed.into_iter().collect();

        before != self.ready.len() + self.delayed.len()
    }

    /// Move delayed jobs whose due time has passed into the ready heap
    fn promote_due(&mut self, now: Instant) {
        while self.delayed.peek().is_some_and(|e| e.due <= now) {
            if let Some(entry) = self.delayed.pop() {
                debug!(task_id = %entry.job.task_id, "promote_due: backoff elapsed");
                self.push_ready(entry.job);
            }
        }
    }

    fn state(&self) -> QueueState {
        QueueState {
            waiting: self.ready.len(),
            delayed: self.delayed.len(),
            active: self.active.len(),
            deferred: self.deferred.len(),
            closed: self.closed,
            stats: self.stats.clone(),
        }
    }
}

/// In-memory priority work queue keyed by task ID
///
/// Delivers each task ID to at most one consumer at a time: a job stays
/// active from [`next`](Self::next) until [`ack`](Self::ack) or
/// [`fail`](Self::fail), and work enqueued for an active task waits for it.
pub struct WorkQueue {
    inner: Mutex<QueueInner>,
    notify: Notify,
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkQueue {
    pub fn new() -> Self {
        debug!("WorkQueue::new: called");
        Self {
            inner: Mutex::new(QueueInner {
                ready: BinaryHeap::new(),
                delayed: BinaryHeap::new(),
                active: HashMap::new(),
                deferred: HashMap::new(),
                next_seq: 0,
                closed: false,
                stats: QueueStats::default(),
            }),
            notify: Notify::new(),
        }
    }

    /// Add a job, keyed by its task ID
    pub async fn enqueue(&self, job: Job) -> EnqueueResult {
        debug!(task_id = %job.task_id, priority = job.options.priority, attempts = job.options.attempts, "WorkQueue::enqueue: called");
        let mut inner = self.inner.lock().await;

        if inner.closed {
            warn!(task_id = %job.task_id, "Queue closed, dropping job");
            return EnqueueResult::Closed;
        }

        inner.stats.total_enqueued += 1;

        let result = if inner.active.contains_key(&job.task_id) {
            debug!(task_id = %job.task_id, "WorkQueue::enqueue: task active, deferring");
            inner.deferred.insert(job.task_id.clone(), job);
            EnqueueResult::Deferred
        } else if inner.remove_waiting(&job.task_id) {
            debug!(task_id = %job.task_id, "WorkQueue::enqueue: replacing waiting job");
            inner.push_ready(job);
            EnqueueResult::Replaced
        } else {
            debug!(task_id = %job.task_id, "WorkQueue::enqueue: queued");
            inner.push_ready(job);
            EnqueueResult::Queued
        };

        drop(inner);
        self.notify.notify_waiters();
        result
    }

    /// Wait for the next deliverable job
    ///
    /// Returns `None` once the queue is closed.
    pub async fn next(&self) -> Option<Job> {
        loop {
            // Register interest before inspecting state so a concurrent
            // enqueue between the check and the wait is not missed.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let wake_at = {
                let mut inner = self.inner.lock().await;
                if inner.closed {
                    debug!("WorkQueue::next: queue closed");
                    return None;
                }

                inner.promote_due(Instant::now());

                if let Some(entry) = inner.ready.pop() {
                    let job = entry.job;
                    debug!(task_id = %job.task_id, attempts_made = job.attempts_made, "WorkQueue::next: delivering");
                    inner.active.insert(job.task_id.clone(), job.clone());
                    return Some(job);
                }

                inner.delayed.peek().map(|e| e.due)
            };

            match wake_at {
                Some(due) => {
                    debug!("WorkQueue::next: waiting for notification or backoff");
                    tokio::select! {
                        _ = &mut notified => {}
                        _ = tokio::time::sleep_until(due) => {}
                    }
                }
                None => {
                    debug!("WorkQueue::next: waiting for notification");
                    notified.await;
                }
            }
        }
    }

    /// Acknowledge a delivered job as done
    pub async fn ack(&self, task_id: &str) -> bool {
        debug!(%task_id, "WorkQueue::ack: called");
        let mut inner = self.inner.lock().await;

        let found = inner.active.remove(task_id).is_some();
        if found {
            inner.stats.total_completed += 1;
            if let Some(next) = inner.deferred.remove(task_id) {
                debug!(%task_id, "WorkQueue::ack: releasing deferred job");
                inner.push_ready(next);
            }
        } else {
            debug!(%task_id, "WorkQueue::ack: not active");
        }

        drop(inner);
        self.notify.notify_waiters();
        found
    }

    /// Report a failed delivery
    ///
    /// Retryable failures are redelivered with backoff while attempts
    /// remain; `min_delay` raises the backoff delay, e.g. to honour a
    /// provider's retry-after hint.
    pub async fn fail(&self, task_id: &str, retryable: bool, min_delay: Option<Duration>) -> FailResult {
        debug!(%task_id, %retryable, ?min_delay, "WorkQueue::fail: called");
        let mut inner = self.inner.lock().await;

        let Some(mut job) = inner.active.remove(task_id) else {
            debug!(%task_id, "WorkQueue::fail: not active");
            return FailResult::Unknown;
        };

        let result = if let Some(next) = inner.deferred.remove(task_id) {
            debug!(%task_id, "WorkQueue::fail: deferred job supersedes failed attempt");
            inner.push_ready(next);
            FailResult::Superseded
        } else if !retryable {
            inner.stats.total_discarded += 1;
            FailResult::Discarded
        } else {
            job.attempts_made += 1;
            if job.has_attempts_left() {
                let mut delay = job.options.backoff.delay_for(job.attempts_made);
                if let Some(min) = min_delay {
                    delay = delay.max(min);
                }
                let attempt = job.attempts_made;
                info!(%task_id, attempt, delay_ms = delay.as_millis() as u64, "Scheduling retry");
                inner.push_delayed(job, Instant::now() + delay);
                inner.stats.total_retried += 1;
                FailResult::Retrying { attempt, delay }
            } else {
                info!(%task_id, attempts = job.attempts_made, "Attempts exhausted");
                inner.stats.total_exhausted += 1;
                FailResult::Exhausted
            }
        };

        drop(inner);
        self.notify.notify_waiters();
        result
    }

    /// Remove a waiting or deferred job; an active delivery is not affected
    pub async fn remove(&self, task_id: &str) -> bool {
        debug!(%task_id, "WorkQueue::remove: called");
        let mut inner = self.inner.lock().await;

        let waiting = inner.remove_waiting(task_id);
        let deferred = inner.deferred.remove(task_id).is_some();

        drop(inner);
        self.notify.notify_waiters();
        waiting || deferred
    }

    /// Check whether the task has a job anywhere in the queue
    pub async fn contains(&self, task_id: &str) -> bool {
        let inner = self.inner.lock().await;
        inner.active.contains_key(task_id) || inner.deferred.contains_key(task_id) || inner.is_waiting(task_id)
    }

    /// Check whether the task's job is currently delivered
    pub async fn is_active(&self, task_id: &str) -> bool {
        self.inner.lock().await.active.contains_key(task_id)
    }

    /// Stop delivering; blocked consumers return `None`
    pub async fn close(&self) {
        debug!("WorkQueue::close: called");
        let mut inner = self.inner.lock().await;
        inner.closed = true;
        drop(inner);
        self.notify.notify_waiters();
    }

    /// Get a snapshot of the queue
    pub async fn state(&self) -> QueueState {
        debug!("WorkQueue::state: called");
        self.inner.lock().await.state()
    }

    /// Get the cumulative statistics
    pub async fn stats(&self) -> QueueStats {
        self.inner.lock().await.stats.clone()
    }

    /// Wait until nothing is waiting, backing off or active
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.inner.lock().await.state().is_idle() {
                return;
            }
            notified.await;
        }
    }
}
