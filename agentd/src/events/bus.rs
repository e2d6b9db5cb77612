//! Event Bus - per-user pub/sub for task events
//!
//! A transport (socket gateway, SSE endpoint, CLI printer) registers a
//! channel for a user and receives that user's events. Publishing is
//! fire-and-forget: with no channel registered the event is dropped.

use std::collections::HashMap;
use std::sync::RwLock;

use tokio::sync::broadcast;
use tracing::debug;

use super::types::{TaskEvent, TaskEventPayload, TaskEventType};
use crate::domain::Task;

/// Default channel capacity (events)
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Central event bus for task notifications
pub struct EventBus {
    /// Per-user delivery channels
    channels: RwLock<HashMap<String, broadcast::Sender<TaskEvent>>>,

    /// Every named event for every user, for loggers
    tap: broadcast::Sender<TaskEvent>,

    capacity: usize,
}

impl EventBus {
    /// Create a new event bus with the given per-channel capacity
    pub fn new(capacity: usize) -> Self {
        debug!(capacity, "EventBus::new: creating event bus");
        let (tap, _) = broadcast::channel(capacity.max(1));
        Self {
            channels: RwLock::new(HashMap::new()),
            tap,
            capacity: capacity.max(1),
        }
    }

    /// Create a new event bus with default capacity
    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Register a transport for a user and get its receiver
    ///
    /// Several transports may register for the same user; each receives
    /// every event.
    pub fn register(&self, user_id: &str) -> broadcast::Receiver<TaskEvent> {
        debug!(%user_id, "EventBus::register: called");
        let mut channels = self.channels.write().unwrap_or_else(|e| e.into_inner());
        channels
            .entry(user_id.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Drop the user's channel; existing receivers see it close
    pub fn unregister(&self, user_id: &str) -> bool {
        debug!(%user_id, "EventBus::unregister: called");
        let mut channels = self.channels.write().unwrap_or_else(|e| e.into_inner());
        channels.remove(user_id).is_some()
    }

    /// Check whether anyone is listening for the user
    pub fn is_registered(&self, user_id: &str) -> bool {
        let channels = self.channels.read().unwrap_or_else(|e| e.into_inner());
        channels.get(user_id).is_some_and(|tx| tx.receiver_count() > 0)
    }

    /// Publish an event to a user: the named event, then `task.event`
    ///
    /// Returns whether a transport received it.
    pub fn publish(&self, user_id: &str, event: TaskEventType, payload: TaskEventPayload) -> bool {
        debug!(%user_id, event = %event, task_id = %payload.task_id, "EventBus::publish");
        let named = TaskEvent::new(event, payload);

        // Ignore send errors (no logger subscribed is OK)
        let _ = self.tap.send(named.clone());

        let channels = self.channels.read().unwrap_or_else(|e| e.into_inner());
        let Some(tx) = channels.get(user_id) else {
            debug!(%user_id, event = %event, "EventBus::publish: no channel registered, dropping event");
            return false;
        };

        let generic = TaskEvent {
            event: TaskEventType::Event,
            ..named.clone()
        };

        let delivered = tx.send(named).is_ok();
        let _ = tx.send(generic);
        if !delivered {
            debug!(%user_id, "EventBus::publish: channel has no receivers");
        }
        delivered
    }

    /// Publish the current state of a task to its owner
    pub fn emit_task(&self, event: TaskEventType, task: &Task) -> bool {
        self.publish(&task.user_id, event, TaskEventPayload::from(task))
    }

    /// Subscribe to every named event of every user
    pub fn subscribe_all(&self) -> broadcast::Receiver<TaskEvent> {
        debug!("EventBus::subscribe_all: new subscriber");
        self.tap.subscribe()
    }

    /// Get the number of users with a registered channel
    pub fn registered_users(&self) -> usize {
        self.channels.read().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}
