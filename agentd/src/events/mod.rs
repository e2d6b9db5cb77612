//! Task notifications
//!
//! Every task state change is published to the owning user's channel as
//! a named event plus the generic `task.event`.
//!
//! ```text
//!   TaskService ──┐                        ┌──▶ user:alice transport
//!                 ├──▶ EventBus::publish ──┼──▶ user:bob transport
//!   TaskProcessor ┘          │             └──▶ (unregistered: dropped)
//!                            └──▶ tap ──▶ EventLogger (.jsonl per user)
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use agentd::events::{EventBus, TaskEventType};
//! use std::sync::Arc;
//!
//! let bus = Arc::new(EventBus::with_default_capacity());
//! let mut rx = bus.register("user-1");
//!
//! bus.emit_task(TaskEventType::Created, &task);
//!
//! while let Ok(event) = rx.recv().await {
//!     println!("{}: {}", event.event, event.data.task_id);
//! }
//! ```

mod bus;
mod logger;
mod types;

pub use bus::{DEFAULT_CHANNEL_CAPACITY, EventBus};
pub use logger::{EventLogger, read_user_events, spawn_event_logger};
pub use types::{EventLogEntry, TaskEvent, TaskEventPayload, TaskEventType};
