//! # Task Queue Set
//!
//! Three bounded tiers scheduled in strict priority: a dequeue decision always looks
//! at `emergency` first, then `priority`, then `main`. A task lives in exactly one
//! tier at a time; dequeue transfers ownership to the caller.
//!
//! Sustained `emergency` load starves the lower tiers. That is the intended
//! scheduling contract, not an oversight.

pub mod tier_queue;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::QueuesConfig;
use crate::constants::Tier;
use crate::error::{EngineError, Result};
use crate::metrics::MetricsCollector;
use crate::models::{Payload, Task, TaskId};
use crate::resilience::StopSignal;

pub use tier_queue::{PushOutcome, TierQueue, TierQueueStats};

#[derive(Debug)]
pub struct TaskQueueSet {
    queues: [TierQueue; 3],
    accepting: AtomicBool,
    arrivals: Notify,
    metrics: Arc<MetricsCollector>,
}

impl TaskQueueSet {
    pub fn new(config: &QueuesConfig, metrics: Arc<MetricsCollector>) -> Self {
        Self {
            queues: Tier::ALL.map(|tier| TierQueue::new(tier, config.for_tier(tier))),
            accepting: AtomicBool::new(true),
            arrivals: Notify::new(),
            metrics,
        }
    }

    fn queue(&self, tier: Tier) -> &TierQueue {
        &self.queues[tier.index()]
    }

    /// Submit a new payload. Fails synchronously when the tier rejects or intake is closed.
    pub fn enqueue(&self, tier: Tier, payload: Payload) -> Result<TaskId> {
        self.submit(Task::new(tier, payload))
    }

    /// Submit an already-built task through the intake gate
    pub fn submit(&self, task: Task) -> Result<TaskId> {
        let tier = task.tier;
        if !self.is_accepting() {
            return Err(EngineError::ShuttingDown { tier });
        }

        let id = task.id;
        self.admit(task).map_err(|_| EngineError::QueueFull {
            tier,
            capacity: self.queue(tier).capacity(),
        })?;

        debug!(task_id = %id, tier = %tier, "Task enqueued");
        Ok(id)
    }

    /// Put a task back into its own tier for a later attempt.
    ///
    /// Bypasses the intake gate so retries scheduled during shutdown are still drained.
    /// A full rejecting tier hands the task back to the caller.
    pub fn requeue(&self, task: Task) -> std::result::Result<(), Task> {
        self.admit(task)
    }

    fn admit(&self, task: Task) -> std::result::Result<(), Task> {
        let tier = task.tier;
        match self.queue(tier).push(task)? {
            PushOutcome::Admitted => {}
            PushOutcome::Evicted(evicted) => {
                self.metrics.record_eviction();
                warn!(
                    tier = %tier,
                    evicted_task_id = %evicted.id,
                    attempts = evicted.attempt_count,
                    "Tier full - evicted oldest task"
                );
            }
        }
        self.arrivals.notify_waiters();
        Ok(())
    }

    /// Non-blocking dequeue from one tier
    pub fn try_dequeue(&self, tier: Tier) -> Option<Task> {
        self.queue(tier).take_ready(Instant::now())
    }

    /// Non-blocking strict-priority dequeue over every tier down to `lowest`
    pub fn try_dequeue_served(&self, lowest: Tier) -> Option<Task> {
        let now = Instant::now();
        lowest
            .served_by()
            .find_map(|tier| self.queue(tier).take_ready(now))
    }

    /// Wait up to `timeout` for an eligible task in `tier`
    pub async fn dequeue(&self, tier: Tier, timeout: Duration) -> Option<Task> {
        self.wait_for_task(&[tier], timeout, None).await
    }

    /// Wait up to `timeout` for an eligible task in any tier, highest first
    pub async fn dequeue_any(&self, timeout: Duration) -> Option<Task> {
        self.wait_for_task(&Tier::ALL, timeout, None).await
    }

    /// Worker dequeue: strict priority down to `lowest`, returning early on `stop`
    pub async fn dequeue_served(
        &self,
        lowest: Tier,
        timeout: Duration,
        stop: &StopSignal,
    ) -> Option<Task> {
        let tiers: Vec<Tier> = lowest.served_by().collect();
        self.wait_for_task(&tiers, timeout, Some(stop)).await
    }

    async fn wait_for_task(
        &self,
        tiers: &[Tier],
        timeout: Duration,
        stop: Option<&StopSignal>,
    ) -> Option<Task> {
        let deadline = Instant::now() + timeout;

        loop {
            let arrival = self.arrivals.notified();
            tokio::pin!(arrival);
            arrival.as_mut().enable();

            // Once stopped, a worker must not take anything the drain would serve
            if stop.is_some_and(StopSignal::is_stopped) {
                return None;
            }
            let now = Instant::now();
            if let Some(task) = tiers.iter().find_map(|tier| self.queue(*tier).take_ready(now)) {
                return Some(task);
            }
            if now >= deadline {
                return None;
            }

            let wake_at = tiers
                .iter()
                .filter_map(|tier| self.queue(*tier).next_ready_at())
                .min()
                .map_or(deadline, |ready_at| ready_at.min(deadline));

            match stop {
                Some(stop) => {
                    tokio::select! {
                        _ = &mut arrival => {}
                        _ = tokio::time::sleep_until(wake_at) => {}
                        _ = stop.wait() => return None,
                    }
                }
                None => {
                    tokio::select! {
                        _ = &mut arrival => {}
                        _ = tokio::time::sleep_until(wake_at) => {}
                    }
                }
            }
        }
    }

    /// Stop accepting new submissions. Returns false if intake was already closed.
    pub fn close_intake(&self) -> bool {
        let was_open = self.accepting.swap(false, Ordering::AcqRel);
        if was_open {
            info!("🚪 Queue intake closed");
        }
        was_open
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }

    /// Earliest instant any resident task becomes eligible
    pub fn next_ready_at(&self) -> Option<Instant> {
        self.queues.iter().filter_map(TierQueue::next_ready_at).min()
    }

    /// Remove every resident task, highest tier first
    pub fn drain_all(&self) -> Vec<Task> {
        self.queues.iter().flat_map(TierQueue::drain).collect()
    }

    pub fn depth(&self, tier: Tier) -> usize {
        self.queue(tier).len()
    }

    pub fn capacity(&self, tier: Tier) -> usize {
        self.queue(tier).capacity()
    }

    pub fn used_capacity(&self) -> usize {
        self.queues.iter().map(TierQueue::len).sum()
    }

    pub fn total_capacity(&self) -> usize {
        self.queues.iter().map(TierQueue::capacity).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.iter().all(TierQueue::is_empty)
    }

    pub fn stats(&self) -> Vec<TierQueueStats> {
        self.queues.iter().map(TierQueue::stats).collect()
    }
}
