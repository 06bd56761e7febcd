//! # Worker Loop
//!
//! One loop per worker slot. Each iteration writes a heartbeat, checks the stop flag,
//! then either resumes a task it is holding, dequeues the next eligible task in
//! strict priority down to its home tier, or runs idle maintenance.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, Instrument};

use crate::constants::Tier;
use crate::engine::EngineContext;
use crate::models::{Task, WorkerId};
use crate::workers::settle::Settlement;

pub struct WorkerLoop {
    ctx: Arc<EngineContext>,
    worker_id: WorkerId,
    tier: Tier,
}

/// Spawn a fresh loop for `worker_id`. A task held by a previous incarnation is resumed.
pub fn spawn_worker(ctx: Arc<EngineContext>, worker_id: WorkerId, tier: Tier) -> JoinHandle<()> {
    let span = tracing::info_span!("worker", worker_id = %worker_id, tier = %tier);
    let worker = WorkerLoop {
        ctx,
        worker_id,
        tier,
    };
    tokio::spawn(worker.run().instrument(span))
}

impl WorkerLoop {
    pub async fn run(self) {
        debug!("Worker loop started");
        let dequeue_timeout = self.ctx.config.workers.dequeue_timeout();

        loop {
            self.ctx.registry.heartbeat(&self.worker_id);

            if self.ctx.stop.is_stopped() {
                self.release_held_task();
                break;
            }

            if let Some(entry) = self.ctx.in_flight.take(&self.worker_id) {
                let now = Instant::now();
                if entry.task.is_ready(now) {
                    self.process(entry.task).await;
                } else {
                    let wait = entry
                        .task
                        .not_before
                        .map_or(dequeue_timeout, |at| at.saturating_duration_since(now))
                        .min(dequeue_timeout);
                    self.ctx.in_flight.hold(&self.worker_id, entry.task);
                    self.ctx.stop.wait_timeout(wait).await;
                }
                continue;
            }

            match self
                .ctx
                .queues
                .dequeue_served(self.tier, dequeue_timeout, &self.ctx.stop)
                .await
            {
                Some(task) => self.process(task).await,
                None if self.ctx.stop.is_stopped() => {}
                None => self.ctx.idle.on_idle(&self.worker_id, self.tier).await,
            }
        }

        info!("Worker loop stopped");
    }

    /// Dispatch one task and settle the outcome, unless someone else claimed it meanwhile
    async fn process(&self, mut task: Task) {
        task.begin_attempt();
        let payload = task.payload.clone();
        let retried = task.is_retry();
        debug!(task_id = %task.id, tier = %task.tier, attempt = task.attempt_count, "Dispatching task");
        self.ctx.in_flight.begin_dispatch(&self.worker_id, task);

        let started = Instant::now();
        let outcome = self
            .ctx
            .dispatch
            .dispatch(&payload, self.ctx.dispatch.default_deadline())
            .await;
        self.ctx
            .metrics
            .record_dispatch(outcome.is_ok(), started.elapsed(), retried);

        let Some(entry) = self.ctx.in_flight.take(&self.worker_id) else {
            debug!("Task was settled elsewhere while dispatching");
            return;
        };

        if let Settlement::Held { task, .. } = self.ctx.settler.settle(entry.task, outcome) {
            self.ctx.in_flight.hold(&self.worker_id, task);
        }
    }

    /// On stop, give a held task back to its tier so the shutdown drain can see it
    fn release_held_task(&self) {
        if let Some(entry) = self.ctx.in_flight.take(&self.worker_id) {
            if let Err(task) = self.ctx.queues.requeue(entry.task) {
                self.ctx.in_flight.hold(&self.worker_id, task);
            }
        }
    }
}
