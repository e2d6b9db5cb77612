//! Execution pipeline
//!
//! Workers pull jobs from the [`WorkQueue`](crate::queue::WorkQueue) and hand
//! each delivery to the [`TaskProcessor`], which drives the task through
//! `processing` to a terminal state and reports how the queue should settle
//! the job.
//!
//! ```text
//!   WorkQueue::next ──▶ worker ──▶ TaskProcessor::process
//!        ▲                               │
//!        └──── ack / fail(retryable) ◀───┘ JobOutcome
//! ```

mod processor;
mod worker;

pub use processor::{JobOutcome, TaskProcessor};
pub use worker::WorkerPool;
