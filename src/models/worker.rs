use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

use crate::constants::{Tier, WorkerStatus};

/// Stable worker identity, e.g. `main-3`. Survives restarts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerId(String);

impl WorkerId {
    pub fn new(tier: Tier, index: usize) -> Self {
        Self(format!("{tier}-{index}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle record for one worker slot.
///
/// The worker loop only writes `last_heartbeat`; `status` and `restart_count`
/// belong to the recovery supervisor.
#[derive(Debug, Clone)]
pub struct WorkerState {
    pub worker_id: WorkerId,
    pub tier: Tier,
    pub status: WorkerStatus,
    pub restart_count: u32,
    pub last_heartbeat: Instant,
    /// The current incarnation has reported in at least once
    pub heartbeat_seen: bool,
    /// When the current incarnation was spawned
    pub spawned_at: Instant,
}

impl WorkerState {
    pub fn new(worker_id: WorkerId, tier: Tier) -> Self {
        let now = Instant::now();
        Self {
            worker_id,
            tier,
            status: WorkerStatus::Starting,
            restart_count: 0,
            last_heartbeat: now,
            heartbeat_seen: false,
            spawned_at: now,
        }
    }

    /// Time since the last heartbeat
    pub fn heartbeat_age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_heartbeat)
    }

    pub fn beat(&mut self, now: Instant) {
        self.last_heartbeat = now;
        self.heartbeat_seen = true;
    }

    /// Reset liveness tracking for a fresh incarnation
    pub fn respawned(&mut self, now: Instant) {
        self.last_heartbeat = now;
        self.heartbeat_seen = false;
        self.spawned_at = now;
    }

    /// Alive for health purposes: starting or running with a fresh heartbeat
    pub fn is_alive(&self, now: Instant, heartbeat_timeout: Duration) -> bool {
        matches!(self.status, WorkerStatus::Starting | WorkerStatus::Running)
            && self.heartbeat_age(now) <= heartbeat_timeout
    }

    pub fn is_permanently_failed(&self) -> bool {
        self.status == WorkerStatus::FailedPermanent
    }
}

/// Serializable view of a worker for status reporting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerStatusReport {
    pub worker_id: WorkerId,
    pub tier: Tier,
    pub status: WorkerStatus,
    pub restart_count: u32,
    pub heartbeat_age_ms: u64,
}

impl WorkerStatusReport {
    pub fn from_state(state: &WorkerState, now: Instant) -> Self {
        Self {
            worker_id: state.worker_id.clone(),
            tier: state.tier,
            status: state.status,
            restart_count: state.restart_count,
            heartbeat_age_ms: state.heartbeat_age(now).as_millis() as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_id_format() {
        assert_eq!(WorkerId::new(Tier::Main, 3).as_str(), "main-3");
        assert_eq!(WorkerId::new(Tier::Emergency, 0).to_string(), "emergency-0");
    }

    #[tokio::test(start_paused = true)]
    async fn test_liveness_tracks_heartbeat_age() {
        let mut state = WorkerState::new(WorkerId::new(Tier::Priority, 0), Tier::Priority);
        let timeout = Duration::from_secs(5);
        assert!(state.is_alive(Instant::now(), timeout));
        assert!(!state.heartbeat_seen);

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(!state.is_alive(Instant::now(), timeout));

        state.beat(Instant::now());
        assert!(state.heartbeat_seen);
        assert!(state.is_alive(Instant::now(), timeout));

        state.respawned(Instant::now());
        assert!(!state.heartbeat_seen);

        state.status = WorkerStatus::FailedPermanent;
        assert!(!state.is_alive(Instant::now(), timeout));
        assert!(state.is_permanently_failed());
    }
}
