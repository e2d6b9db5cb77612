//! Event Logger - persists task events to JSONL files
//!
//! The EventLogger subscribes to the EventBus tap and writes every named
//! event to a per-user JSONL file for history and debugging.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tokio::sync::broadcast;
use tracing::{debug, error, warn};

use super::bus::EventBus;
use super::types::{EventLogEntry, TaskEvent};

/// Event logger that writes events to JSONL files
///
/// Events are written to `{log_dir}/{user-id}.jsonl`
pub struct EventLogger {
    log_dir: PathBuf,
    /// Open file writers per user
    writers: HashMap<String, BufWriter<File>>,
}

/// File name for a user's log, with path separators and the like replaced
fn log_file_name(user_id: &str) -> String {
    let safe: String = user_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    format!("{}.jsonl", safe)
}

impl EventLogger {
    /// Create a new event logger
    pub fn new(log_dir: impl AsRef<Path>) -> Self {
        let log_dir = log_dir.as_ref().to_path_buf();
        debug!(?log_dir, "EventLogger::new: creating logger");
        Self {
            log_dir,
            writers: HashMap::new(),
        }
    }

    /// Write an event to its user's log file
    pub fn write_event(&mut self, event: &TaskEvent) -> eyre::Result<()> {
        let user_id = event.user_id().to_string();
        debug!(%user_id, event_type = %event.event, "EventLogger::write_event");

        if !self.writers.contains_key(&user_id) {
            fs::create_dir_all(&self.log_dir)?;
            let log_path = self.log_dir.join(log_file_name(&user_id));
            debug!(?log_path, "EventLogger: opening log file");

            let file = OpenOptions::new().create(true).append(true).open(&log_path)?;
            self.writers.insert(user_id.clone(), BufWriter::new(file));
        }

        let writer = self
            .writers
            .get_mut(&user_id)
            .ok_or_else(|| eyre::eyre!("No writer for user {}", user_id))?;

        // Write event as JSON line
        let entry = EventLogEntry::new(event.clone());
        let json = serde_json::to_string(&entry)?;
        writeln!(writer, "{}", json)?;
        writer.flush()?;

        Ok(())
    }

    /// Run the logger until the bus is dropped
    ///
    /// This is meant to be spawned as a background task.
    pub async fn run(mut self, mut rx: broadcast::Receiver<TaskEvent>) {
        debug!("EventLogger::run: starting event logger");

        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Err(e) = self.write_event(&event) {
                        error!(user_id = %event.user_id(), error = %e, "EventLogger: failed to write event");
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(missed = n, "EventLogger: lagged behind, missed events");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("EventLogger: channel closed, shutting down");
                    break;
                }
            }
        }

        for (user_id, mut writer) in self.writers.drain() {
            debug!(%user_id, "EventLogger: flushing writer on shutdown");
            let _ = writer.flush();
        }
    }
}

/// Read events from a user's log file
pub fn read_user_events(log_dir: impl AsRef<Path>, user_id: &str) -> eyre::Result<Vec<EventLogEntry>> {
    let log_path = log_dir.as_ref().join(log_file_name(user_id));
    debug!(?log_path, "read_user_events: reading log file");

    if !log_path.exists() {
        return Ok(Vec::new());
    }

    let content = fs::read_to_string(&log_path)?;
    let mut entries = Vec::new();

    for line in content.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<EventLogEntry>(line) {
            Ok(entry) => entries.push(entry),
            Err(e) => {
                warn!(line, error = %e, "read_user_events: failed to parse line");
            }
        }
    }

    debug!(count = entries.len(), "read_user_events: loaded entries");
    Ok(entries)
}

/// Spawn the event logger as a background task
pub fn spawn_event_logger(event_bus: &EventBus, log_dir: impl AsRef<Path>) -> tokio::task::JoinHandle<()> {
    let logger = EventLogger::new(log_dir);
    let rx = event_bus.subscribe_all();
    tokio::spawn(async move {
        logger.run(rx).await;
    })
}
