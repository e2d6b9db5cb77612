//! State management with actor pattern
//!
//! StateManager owns the Store and processes messages via channels,
//! providing thread-safe access to agents and tasks.

mod manager;
mod messages;
mod recovery;
mod store;

pub use manager::StateManager;
pub use messages::{StateCommand, StateError, StateResponse};
pub use recovery::{RecoveryStats, recover, scan_for_recovery};
pub use store::{MemoryStore, SqliteStore, Store, StoreError, TaskFilter};
