//! # Shutdown Coordinator
//!
//! Time-boxed graceful shutdown:
//!
//! 1. Close intake and raise the stop flag; workers stop dequeuing
//! 2. Drain the queues one task at a time in strict priority, dispatching each
//!    synchronously through the normal dispatch client and outcome policy
//! 3. When the budget expires, dead-letter every task still queued or held with
//!    reason `shutdown_incomplete`
//! 4. Join the worker loops, aborting any that outlive the budget
//!
//! The budget is a hard ceiling. Repeated or concurrent calls share one run and
//! return the same report.

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::constants::{DeadLetterReason, Tier};
use crate::engine::EngineContext;
use crate::models::Task;
use crate::workers::Settlement;

/// Outcome of a shutdown run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShutdownReport {
    /// Everything was settled before the budget expired
    pub completed: bool,
    /// Tasks delivered by the drain itself
    pub drained: usize,
    /// Tasks dead-lettered `shutdown_incomplete`
    pub abandoned: usize,
    /// Worker loops that had to be aborted
    pub aborted_workers: usize,
    pub elapsed_ms: u64,
}

#[derive(Debug)]
pub struct ShutdownCoordinator {
    ctx: Arc<EngineContext>,
    report: OnceCell<ShutdownReport>,
}

impl ShutdownCoordinator {
    pub fn new(ctx: Arc<EngineContext>) -> Self {
        Self {
            ctx,
            report: OnceCell::new(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.report.initialized()
    }

    /// Run shutdown once within `timeout`, then stop `background` loops
    pub async fn shutdown(&self, timeout: Duration, background: Vec<JoinHandle<()>>) -> ShutdownReport {
        self.report
            .get_or_init(|| self.run(timeout, background))
            .await
            .clone()
    }

    #[instrument(skip(self, background), fields(timeout_ms = timeout.as_millis() as u64))]
    async fn run(&self, timeout: Duration, background: Vec<JoinHandle<()>>) -> ShutdownReport {
        let started = Instant::now();
        let deadline = started + timeout;
        info!(
            queued = self.ctx.queues.used_capacity(),
            in_flight = self.ctx.in_flight.len(),
            "🛑 Shutdown started"
        );

        self.ctx.queues.close_intake();
        self.ctx.stop.trigger();

        let drained = self.drain(deadline).await;
        let completed = self.ctx.queues.is_empty() && self.ctx.in_flight.is_empty();
        if !completed {
            warn!(
                queued = self.ctx.queues.used_capacity(),
                in_flight = self.ctx.in_flight.len(),
                "Shutdown budget expired with work remaining"
            );
        }

        let aborted_workers = self.stop_workers(deadline).await;
        self.abandon_remaining();
        let abandoned = self
            .ctx
            .dead_letters
            .count_by_reason(DeadLetterReason::ShutdownIncomplete);

        for handle in &background {
            handle.abort();
        }
        join_all(background).await;

        let report = ShutdownReport {
            completed,
            drained,
            abandoned,
            aborted_workers,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            completed = report.completed,
            drained = report.drained,
            abandoned = report.abandoned,
            aborted_workers = report.aborted_workers,
            elapsed_ms = report.elapsed_ms,
            "✅ Shutdown finished"
        );
        report
    }

    /// Strict-priority drain until everything is settled or the deadline passes
    async fn drain(&self, deadline: Instant) -> usize {
        let mut delivered = 0;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }

            // Tasks parked by workers across a backoff go back to their tiers
            for (worker_id, task) in self.ctx.in_flight.take_held() {
                if let Err(task) = self.ctx.queues.requeue(task) {
                    self.ctx.in_flight.hold(&worker_id, task);
                }
            }

            if let Some(task) = self.ctx.queues.try_dequeue_served(Tier::Main) {
                if self.dispatch(task, remaining).await {
                    delivered += 1;
                }
                continue;
            }

            if self.ctx.queues.is_empty() && self.ctx.in_flight.is_empty() {
                break;
            }

            // Queued work is mid-backoff or workers are finishing in-flight dispatches
            tokio::select! {
                task = self.ctx.queues.dequeue_any(remaining) => {
                    if let Some(task) = task {
                        let remaining = deadline.saturating_duration_since(Instant::now());
                        if self.dispatch(task, remaining).await {
                            delivered += 1;
                        }
                    }
                }
                _ = self.ctx.in_flight.released(), if !self.ctx.in_flight.is_empty() => {}
            }
        }

        delivered
    }

    async fn dispatch(&self, mut task: Task, remaining: Duration) -> bool {
        if remaining.is_zero() {
            self.abandon(task);
            return false;
        }

        task.begin_attempt();
        let retried = task.is_retry();
        let budget = self.ctx.dispatch.default_deadline().min(remaining);
        debug!(task_id = %task.id, tier = %task.tier, attempt = task.attempt_count, "Draining task");

        let started = Instant::now();
        let outcome = self.ctx.dispatch.dispatch(&task.payload, budget).await;
        self.ctx
            .metrics
            .record_dispatch(outcome.is_ok(), started.elapsed(), retried);

        match self.ctx.settler.settle(task, outcome) {
            Settlement::Delivered { .. } => true,
            Settlement::Held { task, .. } => {
                // Nobody can hold it for a later attempt once the drain ends
                self.abandon(task);
                false
            }
            Settlement::Requeued { .. } | Settlement::DeadLettered(_) => false,
        }
    }

    /// Join worker loops until the deadline, then abort the rest
    async fn stop_workers(&self, deadline: Instant) -> usize {
        let mut aborted = 0;
        for (worker_id, mut handle) in self.ctx.registry.take_handles() {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(_) => debug!(worker_id = %worker_id, "Worker loop joined"),
                Err(_) => {
                    handle.abort();
                    let _ = handle.await;
                    aborted += 1;
                    warn!(worker_id = %worker_id, "Worker loop aborted at shutdown deadline");
                }
            }
        }
        aborted
    }

    fn abandon_remaining(&self) {
        for task in self.ctx.queues.drain_all() {
            self.abandon(task);
        }
        for (_, task) in self.ctx.in_flight.drain() {
            self.abandon(task);
        }
    }

    fn abandon(&self, task: Task) {
        self.ctx
            .dead_letters
            .append(task, DeadLetterReason::ShutdownIncomplete);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::dispatch::Dispatcher;
    use crate::error::SendError;
    use crate::models::{Payload, WorkerId};
    use crate::workers::NoopMaintenance;
    use async_trait::async_trait;
    use serde_json::json;

    struct Accepting;

    #[async_trait]
    impl Dispatcher for Accepting {
        async fn send(&self, _endpoint: &str, _payload: &Payload) -> Result<(), SendError> {
            Ok(())
        }
    }

    fn context() -> Arc<EngineContext> {
        let mut config = EngineConfig::default();
        config.dispatch.endpoints = vec!["primary".to_string()];
        Arc::new(EngineContext::new(config, Arc::new(Accepting), Arc::new(NoopMaintenance)).unwrap())
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_waits_out_backoff() {
        let ctx = context();
        let mut task = Task::new(Tier::Priority, json!({"n": 1}));
        task.defer(Duration::from_millis(300), "primary: timed out");
        ctx.queues.requeue(task).unwrap();

        let report = ShutdownCoordinator::new(ctx.clone())
            .shutdown(Duration::from_secs(1), Vec::new())
            .await;
        assert!(report.completed);
        assert_eq!(report.drained, 1);
        assert_eq!(report.elapsed_ms, 300);
    }

    #[tokio::test(start_paused = true)]
    async fn test_held_task_is_drained() {
        let ctx = context();
        ctx.in_flight
            .hold(&WorkerId::new(Tier::Main, 0), Task::new(Tier::Main, json!(2)));

        let report = ShutdownCoordinator::new(ctx.clone())
            .shutdown(Duration::from_secs(1), Vec::new())
            .await;
        assert_eq!(report.drained, 1);
        assert!(ctx.in_flight.is_empty());
        assert!(ctx.dead_letters.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_budget_abandons_everything() {
        let ctx = context();
        ctx.queues.enqueue(Tier::Main, json!(1)).unwrap();
        ctx.queues.enqueue(Tier::Emergency, json!(2)).unwrap();

        let coordinator = ShutdownCoordinator::new(ctx.clone());
        let report = coordinator.shutdown(Duration::ZERO, Vec::new()).await;
        assert!(!report.completed);
        assert_eq!(report.drained, 0);
        assert_eq!(report.abandoned, 2);
        assert!(coordinator.is_complete());
        assert_eq!(
            ctx.dead_letters.count_by_reason(DeadLetterReason::ShutdownIncomplete),
            2
        );
    }
}
