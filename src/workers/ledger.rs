//! In-flight ledger: the task each worker currently holds.
//!
//! A task leaves its queue when a worker dequeues it and is parked here until the
//! worker settles it. Whoever removes an entry owns the terminal decision for that
//! task, which is how a crashed worker's task is re-settled by the supervisor and
//! how shutdown accounts for work that never finished.

use dashmap::DashMap;
use tokio::sync::Notify;

use crate::models::{Task, WorkerId};

#[derive(Debug, Clone)]
pub struct LedgerEntry {
    pub task: Task,
    /// A dispatch call is running; false while the worker waits out a backoff
    pub dispatching: bool,
}

#[derive(Debug, Default)]
pub struct InFlightLedger {
    entries: DashMap<WorkerId, LedgerEntry>,
    released: Notify,
}

impl InFlightLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park a task whose dispatch is starting
    pub fn begin_dispatch(&self, worker_id: &WorkerId, task: Task) {
        self.entries.insert(
            worker_id.clone(),
            LedgerEntry {
                task,
                dispatching: true,
            },
        );
    }

    /// Park a task the worker keeps across a backoff because its tier was full
    pub fn hold(&self, worker_id: &WorkerId, task: Task) {
        self.entries.insert(
            worker_id.clone(),
            LedgerEntry {
                task,
                dispatching: false,
            },
        );
    }

    /// Claim the entry. `None` means someone else already settled it.
    pub fn take(&self, worker_id: &WorkerId) -> Option<LedgerEntry> {
        let entry = self.entries.remove(worker_id).map(|(_, entry)| entry);
        if entry.is_some() {
            self.released.notify_waiters();
        }
        entry
    }

    pub fn contains(&self, worker_id: &WorkerId) -> bool {
        self.entries.contains_key(worker_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Claim every entry
    pub fn drain(&self) -> Vec<(WorkerId, Task)> {
        let ids: Vec<WorkerId> = self.entries.iter().map(|entry| entry.key().clone()).collect();
        ids.into_iter()
            .filter_map(|id| self.take(&id).map(|entry| (id, entry.task)))
            .collect()
    }

    /// Claim every entry whose worker is waiting out a backoff
    pub fn take_held(&self) -> Vec<(WorkerId, Task)> {
        let held: Vec<WorkerId> = self
            .entries
            .iter()
            .filter(|entry| !entry.dispatching)
            .map(|entry| entry.key().clone())
            .collect();
        held.into_iter()
            .filter_map(|id| {
                self.entries
                    .remove_if(&id, |_, entry| !entry.dispatching)
                    .map(|(id, entry)| (id, entry.task))
            })
            .collect()
    }

    /// Resolve once some entry is claimed or the ledger is empty
    pub async fn released(&self) {
        let released = self.released.notified();
        tokio::pin!(released);
        released.as_mut().enable();
        if self.is_empty() {
            return;
        }
        released.await;
    }
}
