//! # Dead-Letter Log
//!
//! Append-only record of tasks that will never be delivered. Each task id is
//! recorded at most once; a second append for the same id is refused. When a path
//! is configured every entry is also written as one JSON line.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{error, warn};

use crate::constants::DeadLetterReason;
use crate::error::Result;
use crate::models::{DeadLetterEntry, Task, TaskId};

#[derive(Debug, Default)]
struct LogState {
    entries: Vec<DeadLetterEntry>,
    recorded: HashSet<TaskId>,
    sink: Option<File>,
}

#[derive(Debug, Default)]
pub struct DeadLetterLog {
    state: Mutex<LogState>,
    path: Option<PathBuf>,
}

impl DeadLetterLog {
    /// In-memory log only
    pub fn new() -> Self {
        Self::default()
    }

    /// Log mirrored to an append-only JSON-lines file
    pub fn with_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            state: Mutex::new(LogState {
                sink: Some(file),
                ..LogState::default()
            }),
            path: Some(path),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Record a terminal failure. Returns false if the task was already dead-lettered.
    pub fn append(&self, task: Task, reason: DeadLetterReason) -> bool {
        let entry = DeadLetterEntry::from_task(task, reason);
        let mut state = self.state.lock();

        if !state.recorded.insert(entry.task_id) {
            error!(
                task_id = %entry.task_id,
                reason = %reason,
                "Task already dead-lettered - refusing duplicate entry"
            );
            return false;
        }

        if let Some(sink) = state.sink.as_mut() {
            let written = serde_json::to_string(&entry)
                .map_err(std::io::Error::from)
                .and_then(|line| writeln!(sink, "{line}"))
                .and_then(|()| sink.flush());
            if let Err(e) = written {
                crate::logging::log_error(
                    "dead_letter",
                    "append",
                    &e.to_string(),
                    self.path.as_ref().map(|p| p.to_string_lossy()).as_deref(),
                );
            }
        }

        warn!(
            task_id = %entry.task_id,
            tier = %entry.tier,
            attempts = entry.attempts,
            reason = %reason,
            last_error = entry.last_error.as_deref(),
            "☠️ Task dead-lettered"
        );
        state.entries.push(entry);
        true
    }

    pub fn contains(&self, task_id: TaskId) -> bool {
        self.state.lock().recorded.contains(&task_id)
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    /// Copy of every entry in append order
    pub fn entries(&self) -> Vec<DeadLetterEntry> {
        self.state.lock().entries.clone()
    }

    pub fn count_by_reason(&self, reason: DeadLetterReason) -> usize {
        self.state
            .lock()
            .entries
            .iter()
            .filter(|entry| entry.reason == reason)
            .count()
    }
}
