//! Worker registry: lifecycle records and join handles for every worker slot.

use dashmap::DashMap;
use std::time::Duration;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;

use crate::constants::{Tier, WorkerStatus};
use crate::models::{WorkerId, WorkerState, WorkerStatusReport};

/// Worker liveness counts used for health scoring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Liveness {
    pub alive: usize,
    /// Workers not permanently failed
    pub active: usize,
    pub failed_permanent: usize,
}

#[derive(Debug, Default)]
pub struct WorkerRegistry {
    states: DashMap<WorkerId, WorkerState>,
    handles: DashMap<WorkerId, JoinHandle<()>>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, worker_id: WorkerId, tier: Tier) {
        self.states
            .insert(worker_id.clone(), WorkerState::new(worker_id, tier));
    }

    pub fn attach(&self, worker_id: &WorkerId, handle: JoinHandle<()>) {
        if let Some(previous) = self.handles.insert(worker_id.clone(), handle) {
            previous.abort();
        }
    }

    /// Written by the worker loop on every iteration
    pub fn heartbeat(&self, worker_id: &WorkerId) {
        if let Some(mut state) = self.states.get_mut(worker_id) {
            state.beat(Instant::now());
        }
    }

    pub fn set_status(&self, worker_id: &WorkerId, status: WorkerStatus) {
        if let Some(mut state) = self.states.get_mut(worker_id) {
            state.status = status;
        }
    }

    /// Record a restart: fresh incarnation, `restart_count + 1`, status running
    pub fn mark_restarted(&self, worker_id: &WorkerId) -> u32 {
        match self.states.get_mut(worker_id) {
            Some(mut state) => {
                state.restart_count += 1;
                state.status = WorkerStatus::Running;
                state.respawned(Instant::now());
                state.restart_count
            }
            None => 0,
        }
    }

    pub fn state(&self, worker_id: &WorkerId) -> Option<WorkerState> {
        self.states.get(worker_id).map(|state| state.clone())
    }

    pub fn worker_ids(&self) -> Vec<WorkerId> {
        let mut ids: Vec<WorkerId> = self.states.iter().map(|entry| entry.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn is_finished(&self, worker_id: &WorkerId) -> bool {
        self.handles
            .get(worker_id)
            .is_some_and(|handle| handle.is_finished())
    }

    /// Abort a worker loop without waiting for it
    pub fn abort(&self, worker_id: &WorkerId) {
        if let Some(handle) = self.handles.get(worker_id) {
            handle.abort();
        }
    }

    /// Detach and await a worker's handle
    pub async fn reap(&self, worker_id: &WorkerId) -> Option<Result<(), JoinError>> {
        let (_, handle) = self.handles.remove(worker_id)?;
        Some(handle.await)
    }

    /// Detach every handle, for shutdown
    pub fn take_handles(&self) -> Vec<(WorkerId, JoinHandle<()>)> {
        let ids: Vec<WorkerId> = self.handles.iter().map(|entry| entry.key().clone()).collect();
        ids.into_iter()
            .filter_map(|id| self.handles.remove(&id))
            .collect()
    }

    pub fn liveness(&self, heartbeat_timeout: Duration) -> Liveness {
        let now = Instant::now();
        let mut liveness = Liveness {
            alive: 0,
            active: 0,
            failed_permanent: 0,
        };

        for state in self.states.iter() {
            if state.is_permanently_failed() {
                liveness.failed_permanent += 1;
                continue;
            }
            liveness.active += 1;
            // A loop that already exited is dead even before the supervisor reaps it
            if state.is_alive(now, heartbeat_timeout) && !self.is_finished(state.key()) {
                liveness.alive += 1;
            }
        }
        liveness
    }

    pub fn reports(&self) -> Vec<WorkerStatusReport> {
        let now = Instant::now();
        let mut reports: Vec<WorkerStatusReport> = self
            .states
            .iter()
            .map(|state| WorkerStatusReport::from_state(&state, now))
            .collect();
        reports.sort_by(|a, b| a.worker_id.cmp(&b.worker_id));
        reports
    }
}
