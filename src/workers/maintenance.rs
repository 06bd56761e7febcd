use async_trait::async_trait;

use crate::constants::Tier;
use crate::models::WorkerId;

/// Housekeeping a worker runs when its dequeue times out with nothing to do.
///
/// Runs on the idle worker's own loop, so a slow hook delays only that worker.
/// Keep it well under the heartbeat timeout.
#[async_trait]
pub trait IdleMaintenance: Send + Sync + 'static {
    async fn on_idle(&self, worker_id: &WorkerId, tier: Tier);
}

/// Default hook: does nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMaintenance;

#[async_trait]
impl IdleMaintenance for NoopMaintenance {
    async fn on_idle(&self, _worker_id: &WorkerId, _tier: Tier) {}
}
