//! # Health Monitor
//!
//! Periodically scores queue utilization, worker liveness and dispatch success
//! into a [`HealthSnapshot`] and publishes it on a watch channel. Readers always get
//! the latest complete snapshot without blocking the publisher.

pub mod score;

use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::constants::StatusCategory;
use crate::engine::EngineContext;

pub use score::{HealthInputs, HealthScorer, HealthSnapshot};

#[derive(Debug)]
pub struct HealthMonitor {
    ctx: Arc<EngineContext>,
    scorer: HealthScorer,
    publisher: watch::Sender<Arc<HealthSnapshot>>,
}

impl HealthMonitor {
    pub fn new(ctx: Arc<EngineContext>) -> Self {
        let scorer = HealthScorer::from(&ctx.config.health);
        let initial = Arc::new(scorer.score(&Self::inputs(&ctx)));
        let (publisher, _) = watch::channel(initial);
        Self {
            ctx,
            scorer,
            publisher,
        }
    }

    fn inputs(ctx: &EngineContext) -> HealthInputs {
        let liveness = ctx
            .registry
            .liveness(ctx.config.supervisor.heartbeat_timeout());
        let metrics = ctx.metrics.snapshot();
        HealthInputs {
            used_capacity: ctx.queues.used_capacity(),
            total_capacity: ctx.queues.total_capacity(),
            alive_workers: liveness.alive,
            active_workers: liveness.active,
            succeeded: metrics.succeeded,
            total_operations: metrics.total,
        }
    }

    /// Latest published snapshot
    pub fn latest(&self) -> Arc<HealthSnapshot> {
        self.publisher.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<HealthSnapshot>> {
        self.publisher.subscribe()
    }

    /// Score current state and publish it
    pub fn check_now(&self) -> Arc<HealthSnapshot> {
        let snapshot = Arc::new(self.scorer.score(&Self::inputs(&self.ctx)));
        let previous = self.publisher.send_replace(snapshot.clone());

        if previous.status_category != snapshot.status_category {
            let message = "🩺 Engine health category changed";
            match snapshot.status_category {
                StatusCategory::Critical | StatusCategory::Degraded => warn!(
                    from = %previous.status_category,
                    to = %snapshot.status_category,
                    overall_score = snapshot.overall_score,
                    "{message}"
                ),
                _ => info!(
                    from = %previous.status_category,
                    to = %snapshot.status_category,
                    overall_score = snapshot.overall_score,
                    "{message}"
                ),
            }
        } else {
            debug!(
                overall_score = snapshot.overall_score,
                queue_health = snapshot.queue_health,
                worker_health = snapshot.worker_health,
                success_rate = snapshot.success_rate,
                "Health check"
            );
        }

        snapshot
    }

    /// Re-score every `health.check_interval` until stopped
    pub async fn run(self: Arc<Self>) {
        let interval = self.ctx.config.health.check_interval();
        while !self.ctx.stop.wait_timeout(interval).await {
            self.check_now();
        }
        debug!("Health monitor stopped");
    }
}
