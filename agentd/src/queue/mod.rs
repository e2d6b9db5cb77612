//! Work queue for task execution
//!
//! Jobs are keyed 1:1 by task ID. The queue provides:
//! - Priority dequeue (rank 1 first, FIFO within a rank)
//! - At most one delivery per task ID in flight
//! - Exponential backoff between automatic retries

mod config;
mod core;
mod job;

pub use config::QueueConfig;
pub use core::WorkQueue;
pub use job::{Backoff, EnqueueResult, FailResult, Job, JobOptions, QueueState, QueueStats};
