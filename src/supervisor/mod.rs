//! # Recovery Supervisor
//!
//! Watches every worker slot and restarts crashed loops up to a bound.
//!
//! ## Worker lifecycle
//!
//! ```text
//! starting --first heartbeat--> running --crash or missed heartbeat--> restarting
//! restarting --cool-down, fresh loop--> running
//! restarting --restart_count == max_restart_attempts--> failed_permanent
//! ```
//!
//! A crash is a loop that finished or panicked while the engine is running, or a
//! loop whose heartbeat is older than `heartbeat_timeout` (that loop is aborted).
//! A task the crashed loop was dispatching is settled as a failed attempt; a task it
//! was holding across a backoff is resumed by the fresh loop. Permanently failed
//! workers stay out of the pool for the life of the process.

pub mod registry;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::constants::{defaults, StatusCategory, Tier, WorkerStatus};
use crate::engine::EngineContext;
use crate::error::{DispatchError, EngineError};
use crate::health::HealthSnapshot;
use crate::logging::{log_error, log_worker_event};
use crate::models::WorkerId;
use crate::workers::{spawn_worker, Settlement};

pub use registry::{Liveness, WorkerRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryAction {
    CrashDetected,
    InFlightRecovered,
    Restarted,
    PermanentlyFailed,
}

/// One supervisor action, kept in a bounded in-memory log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryEvent {
    pub timestamp: DateTime<Utc>,
    pub worker_id: WorkerId,
    pub tier: Tier,
    pub action: RecoveryAction,
    pub restart_count: u32,
    pub details: String,
}

#[derive(Debug)]
pub struct RecoverySupervisor {
    ctx: Arc<EngineContext>,
    events: Mutex<VecDeque<RecoveryEvent>>,
}

impl RecoverySupervisor {
    pub fn new(ctx: Arc<EngineContext>) -> Self {
        Self {
            ctx,
            events: Mutex::new(VecDeque::new()),
        }
    }

    /// Recovery log, oldest first
    pub fn events(&self) -> Vec<RecoveryEvent> {
        self.events.lock().iter().cloned().collect()
    }

    fn record(&self, worker_id: &WorkerId, tier: Tier, action: RecoveryAction, restart_count: u32, details: String) {
        let mut events = self.events.lock();
        if events.len() == defaults::RECOVERY_EVENT_CAPACITY {
            events.pop_front();
        }
        events.push_back(RecoveryEvent {
            timestamp: Utc::now(),
            worker_id: worker_id.clone(),
            tier,
            action,
            restart_count,
            details,
        });
    }

    /// Check workers every `supervisor.check_interval`, and immediately whenever the
    /// published health drops to critical
    pub async fn run(self: Arc<Self>, mut health: watch::Receiver<Arc<HealthSnapshot>>) {
        let interval = self.ctx.config.supervisor.check_interval();
        let mut health_open = true;

        loop {
            tokio::select! {
                _ = self.ctx.stop.wait_timeout(interval) => {}
                changed = health.changed(), if health_open => {
                    if changed.is_err() {
                        health_open = false;
                        continue;
                    }
                    let category = health.borrow_and_update().status_category;
                    if category != StatusCategory::Critical {
                        continue;
                    }
                    warn!("Health is critical - checking workers now");
                }
            }

            if self.ctx.stop.is_stopped() {
                break;
            }
            self.check_workers().await;
        }
        debug!("Recovery supervisor stopped");
    }

    /// One pass over every worker slot
    pub async fn check_workers(&self) {
        let heartbeat_timeout = self.ctx.config.supervisor.heartbeat_timeout();
        let mut restarts = Vec::new();

        for worker_id in self.ctx.registry.worker_ids() {
            if self.ctx.stop.is_stopped() {
                return;
            }
            let Some(state) = self.ctx.registry.state(&worker_id) else {
                continue;
            };

            match state.status {
                WorkerStatus::FailedPermanent | WorkerStatus::Restarting => continue,
                WorkerStatus::Starting if state.heartbeat_seen => {
                    self.ctx.registry.set_status(&worker_id, WorkerStatus::Running);
                    log_worker_event(
                        worker_id.as_str(),
                        state.tier,
                        WorkerStatus::Running,
                        state.restart_count,
                        None,
                    );
                }
                _ => {}
            }

            let crash = if self.ctx.registry.is_finished(&worker_id) {
                match self.ctx.registry.reap(&worker_id).await {
                    Some(Err(join_error)) if join_error.is_panic() => {
                        Some(format!("worker loop panicked: {}", panic_message(join_error)))
                    }
                    Some(Err(_)) => Some("worker loop was cancelled".to_string()),
                    Some(Ok(())) => Some("worker loop exited while the engine was running".to_string()),
                    None => None,
                }
            } else {
                let age = state.heartbeat_age(Instant::now());
                if age > heartbeat_timeout {
                    self.ctx.registry.abort(&worker_id);
                    let _ = self.ctx.registry.reap(&worker_id).await;
                    Some(format!("no heartbeat for {}ms", age.as_millis()))
                } else {
                    None
                }
            };

            if let Some(reason) = crash {
                if self.recover(&worker_id, state.tier, state.restart_count, reason) {
                    restarts.push((worker_id, state.tier));
                }
            }
        }

        if restarts.is_empty() {
            return;
        }

        // One cool-down for every slot that crashed in this pass
        let cooldown = self.ctx.config.supervisor.restart_cooldown();
        if self.ctx.stop.wait_timeout(cooldown).await {
            debug!(pending = restarts.len(), "Engine stopping - restarts abandoned");
            return;
        }
        for (worker_id, tier) in restarts {
            self.restart(&worker_id, tier);
        }
    }

    /// Record the crash and settle its in-flight task. Returns whether the slot
    /// should be restarted.
    fn recover(&self, worker_id: &WorkerId, tier: Tier, restart_count: u32, reason: String) -> bool {
        let crash = EngineError::WorkerCrashed {
            worker_id: worker_id.to_string(),
            reason: reason.clone(),
        };
        log_error("supervisor", "check_workers", &crash.to_string(), None);
        self.record(worker_id, tier, RecoveryAction::CrashDetected, restart_count, reason.clone());

        self.resettle_in_flight(worker_id, tier, restart_count, &reason);

        let max_restarts = self.ctx.config.supervisor.max_restart_attempts;
        if restart_count >= max_restarts {
            self.fail_permanently(worker_id, tier, restart_count);
            return false;
        }

        self.ctx.registry.set_status(worker_id, WorkerStatus::Restarting);
        log_worker_event(
            worker_id.as_str(),
            tier,
            WorkerStatus::Restarting,
            restart_count,
            Some(&reason),
        );
        true
    }

    fn restart(&self, worker_id: &WorkerId, tier: Tier) {
        let max_restarts = self.ctx.config.supervisor.max_restart_attempts;
        let handle = spawn_worker(self.ctx.clone(), worker_id.clone(), tier);
        self.ctx.registry.attach(worker_id, handle);
        let restart_count = self.ctx.registry.mark_restarted(worker_id);
        self.ctx.metrics.record_restart();

        log_worker_event(
            worker_id.as_str(),
            tier,
            WorkerStatus::Running,
            restart_count,
            Some("restarted"),
        );
        self.record(
            worker_id,
            tier,
            RecoveryAction::Restarted,
            restart_count,
            format!("restart {restart_count}/{max_restarts}"),
        );
    }

    /// Settle the task a crashed loop was dispatching. A held task stays for the next loop.
    fn resettle_in_flight(&self, worker_id: &WorkerId, tier: Tier, restart_count: u32, reason: &str) {
        let Some(entry) = self.ctx.in_flight.take(worker_id) else {
            return;
        };
        let task_id = entry.task.id;

        if !entry.dispatching {
            self.ctx.in_flight.hold(worker_id, entry.task);
            return;
        }

        let outcome = Err(DispatchError::Transient {
            attempts: 0,
            last_error: format!("worker {worker_id} crashed: {reason}"),
        });
        let settlement = self.ctx.settler.settle(entry.task, outcome);
        info!(task_id = %task_id, worker_id = %worker_id, settlement = ?settlement, "In-flight task recovered");

        if let Settlement::Held { task, .. } = settlement {
            self.ctx.in_flight.hold(worker_id, task);
        }
        self.record(
            worker_id,
            tier,
            RecoveryAction::InFlightRecovered,
            restart_count,
            format!("task {task_id} re-settled after crash"),
        );
    }

    fn fail_permanently(&self, worker_id: &WorkerId, tier: Tier, restart_count: u32) {
        self.ctx
            .registry
            .set_status(worker_id, WorkerStatus::FailedPermanent);

        // No loop will come back for a held task, so return it to its tier if it fits
        if let Some(entry) = self.ctx.in_flight.take(worker_id) {
            if let Err(task) = self.ctx.queues.requeue(entry.task) {
                self.ctx.in_flight.hold(worker_id, task);
            }
        }

        error!(
            worker_id = %worker_id,
            tier = %tier,
            restart_count = restart_count,
            "🚨 OPERATOR: worker permanently failed - removed from the pool"
        );
        log_worker_event(
            worker_id.as_str(),
            tier,
            WorkerStatus::FailedPermanent,
            restart_count,
            Some("restart budget exhausted"),
        );
        self.record(
            worker_id,
            tier,
            RecoveryAction::PermanentlyFailed,
            restart_count,
            "restart budget exhausted".to_string(),
        );
    }
}

fn panic_message(join_error: tokio::task::JoinError) -> String {
    let payload = join_error.into_panic();
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
