//! Work queue configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::domain::DEFAULT_MAX_RETRIES;

/// Work queue and worker pool configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Number of concurrent workers
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Delay before the first automatic retry, doubled for each further one
    #[serde(rename = "backoff-delay-ms", default = "default_backoff_delay_ms")]
    pub backoff_delay_ms: u64,

    /// Upper bound for any single retry delay
    #[serde(rename = "max-backoff-ms", default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// `max_retries` for tasks that do not set one
    #[serde(rename = "default-max-retries", default = "default_max_retries")]
    pub default_max_retries: u32,

    /// How long shutdown waits for in-flight jobs
    #[serde(rename = "shutdown-timeout-ms", default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
}

fn default_workers() -> usize {
    4
}

fn default_backoff_delay_ms() -> u64 {
    2000
}

fn default_max_backoff_ms() -> u64 {
    300_000
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_shutdown_timeout_ms() -> u64 {
    30_000
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            backoff_delay_ms: default_backoff_delay_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            default_max_retries: default_max_retries(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
        }
    }
}

impl QueueConfig {
    /// Get the initial backoff delay as a Duration
    pub fn backoff_delay(&self) -> Duration {
        Duration::from_millis(self.backoff_delay_ms)
    }

    /// Get the backoff cap as a Duration
    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    /// Get the shutdown timeout as a Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}
