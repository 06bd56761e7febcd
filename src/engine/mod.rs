//! # Engine
//!
//! Public facade over the shared [`EngineContext`]. Owns the worker pool, the
//! health monitor, the recovery supervisor, the metrics reporter and the shutdown
//! coordinator.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use relay_engine::{Engine, EngineConfig, Dispatcher, Payload, SendError, Tier};
//!
//! struct Http;
//!
//! #[async_trait]
//! impl Dispatcher for Http {
//!     async fn send(&self, _endpoint: &str, _payload: &Payload) -> Result<(), SendError> {
//!         Ok(())
//!     }
//! }
//!
//! # async fn example() -> relay_engine::Result<()> {
//! let mut config = EngineConfig::default();
//! config.dispatch.endpoints = vec!["http://primary:8080".to_string()];
//!
//! let engine = Engine::new(config, Arc::new(Http))?;
//! engine.start().await?;
//! engine.enqueue(Tier::Emergency, serde_json::json!({"alert": "disk full"}))?;
//! let report = engine.shutdown(std::time::Duration::from_secs(5)).await;
//! assert!(report.completed);
//! # Ok(())
//! # }
//! ```

pub mod context;

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

use crate::config::{ConfigManager, EngineConfig};
use crate::constants::{Tier, WorkerStatus};
use crate::dispatch::Dispatcher;
use crate::error::{EngineError, Result};
use crate::health::{HealthMonitor, HealthSnapshot};
use crate::logging::log_worker_event;
use crate::metrics::MetricsSnapshot;
use crate::models::{DeadLetterEntry, Payload, TaskId, WorkerId, WorkerStatusReport};
use crate::queue::TierQueueStats;
use crate::resilience::EndpointSnapshot;
use crate::shutdown::{ShutdownCoordinator, ShutdownReport};
use crate::supervisor::{RecoveryEvent, RecoverySupervisor};
use crate::workers::{spawn_worker, IdleMaintenance, NoopMaintenance};

pub use context::EngineContext;

#[derive(Debug)]
pub struct Engine {
    ctx: Arc<EngineContext>,
    health: Arc<HealthMonitor>,
    supervisor: Arc<RecoverySupervisor>,
    shutdown: ShutdownCoordinator,
    started: AtomicBool,
    background: Mutex<Vec<JoinHandle<()>>>,
}

/// Builder for engines that need more than a config and a dispatcher
pub struct EngineBuilder {
    config: EngineConfig,
    dispatcher: Arc<dyn Dispatcher>,
    idle: Arc<dyn IdleMaintenance>,
}

impl EngineBuilder {
    /// Hook run by a worker whose dequeue timed out
    pub fn idle_maintenance(mut self, idle: Arc<dyn IdleMaintenance>) -> Self {
        self.idle = idle;
        self
    }

    pub fn build(self) -> Result<Engine> {
        let ctx = Arc::new(EngineContext::new(self.config, self.dispatcher, self.idle)?);
        Ok(Engine::from_context(ctx))
    }
}

impl Engine {
    pub fn new(config: EngineConfig, dispatcher: Arc<dyn Dispatcher>) -> Result<Self> {
        Self::builder(config, dispatcher).build()
    }

    pub fn builder(config: EngineConfig, dispatcher: Arc<dyn Dispatcher>) -> EngineBuilder {
        EngineBuilder {
            config,
            dispatcher,
            idle: Arc::new(NoopMaintenance),
        }
    }

    /// Build from a loaded configuration manager
    pub fn from_manager(manager: &ConfigManager, dispatcher: Arc<dyn Dispatcher>) -> Result<Self> {
        Self::new(manager.config().clone(), dispatcher)
    }

    fn from_context(ctx: Arc<EngineContext>) -> Self {
        Self {
            health: Arc::new(HealthMonitor::new(ctx.clone())),
            supervisor: Arc::new(RecoverySupervisor::new(ctx.clone())),
            shutdown: ShutdownCoordinator::new(ctx.clone()),
            started: AtomicBool::new(false),
            background: Mutex::new(Vec::new()),
            ctx,
        }
    }

    /// Spawn the worker pool and the background loops. Fails if already started
    /// or shut down.
    #[instrument(skip(self))]
    pub async fn start(&self) -> Result<()> {
        if self.ctx.stop.is_stopped() {
            return Err(EngineError::InvalidState(
                "engine has been shut down".to_string(),
            ));
        }
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(EngineError::InvalidState("engine already started".to_string()));
        }

        let workers = &self.ctx.config.workers;
        for tier in Tier::ALL {
            for index in 0..workers.pool_size(tier) {
                let worker_id = WorkerId::new(tier, index);
                self.ctx.registry.register(worker_id.clone(), tier);
                let handle = spawn_worker(self.ctx.clone(), worker_id.clone(), tier);
                self.ctx.registry.attach(&worker_id, handle);
                log_worker_event(worker_id.as_str(), tier, WorkerStatus::Starting, 0, None);
            }
        }

        let mut background = self.background.lock();
        background.push(tokio::spawn(self.health.clone().run()));
        background.push(tokio::spawn(
            self.supervisor.clone().run(self.health.subscribe()),
        ));

        let report_interval_ms = self.ctx.config.metrics.report_interval_ms;
        if report_interval_ms > 0 {
            background.push(tokio::spawn(self.ctx.metrics.clone().run_reporter(
                Duration::from_millis(report_interval_ms),
                self.ctx.stop.clone(),
            )));
        }

        drop(background);

        // Replace the pre-start snapshot, which saw no registered workers
        self.health.check_now();

        info!(
            emergency = workers.pool_size(Tier::Emergency),
            priority = workers.pool_size(Tier::Priority),
            main = workers.pool_size(Tier::Main),
            endpoints = self.ctx.dispatch.endpoints().len(),
            "🚀 Relay engine started"
        );
        Ok(())
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Submit a payload to `tier`. Fails synchronously on a full rejecting tier or
    /// once shutdown has begun.
    pub fn enqueue(&self, tier: Tier, payload: Payload) -> Result<TaskId> {
        self.ctx.queues.enqueue(tier, payload)
    }

    /// Latest published health snapshot
    pub fn get_health(&self) -> Arc<HealthSnapshot> {
        self.health.latest()
    }

    /// Score and publish health now instead of waiting for the next interval
    pub fn check_health(&self) -> Arc<HealthSnapshot> {
        self.health.check_now()
    }

    pub fn get_metrics(&self) -> MetricsSnapshot {
        self.ctx.metrics.snapshot()
    }

    /// Graceful shutdown bounded by `timeout`. Later calls return the first report.
    pub async fn shutdown(&self, timeout: Duration) -> ShutdownReport {
        let background = std::mem::take(&mut *self.background.lock());
        let report = self.shutdown.shutdown(timeout, background).await;
        self.health.check_now();
        report
    }

    /// Start if needed, wait for Ctrl-C or SIGTERM, then shut down with the
    /// configured timeout
    pub async fn run_until_signal(&self) -> Result<ShutdownReport> {
        if !self.is_started() {
            self.start().await?;
        }
        shutdown_signal().await;
        Ok(self.shutdown(self.ctx.config.shutdown.timeout()).await)
    }

    pub fn dead_letters(&self) -> Vec<DeadLetterEntry> {
        self.ctx.dead_letters.entries()
    }

    pub fn recovery_events(&self) -> Vec<RecoveryEvent> {
        self.supervisor.events()
    }

    pub fn worker_statuses(&self) -> Vec<WorkerStatusReport> {
        self.ctx.registry.reports()
    }

    pub fn queue_stats(&self) -> Vec<TierQueueStats> {
        self.ctx.queues.stats()
    }

    pub fn endpoints(&self) -> Vec<EndpointSnapshot> {
        self.ctx.dispatch.endpoints()
    }

    pub fn supervisor(&self) -> &Arc<RecoverySupervisor> {
        &self.supervisor
    }

    pub fn context(&self) -> &Arc<EngineContext> {
        &self.ctx
    }
}

/// Wait for Ctrl-C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = signal::ctrl_c().await {
            warn!(error = %error, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(error) => {
                warn!(error = %error, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::StatusCategory;
    use crate::error::SendError;
    use async_trait::async_trait;
    use serde_json::json;

    struct AlwaysOk;

    #[async_trait]
    impl Dispatcher for AlwaysOk {
        async fn send(&self, _endpoint: &str, _payload: &Payload) -> std::result::Result<(), SendError> {
            Ok(())
        }
    }

    fn config() -> EngineConfig {
        let mut config = EngineConfig::default();
        config.dispatch.endpoints = vec!["primary".to_string()];
        config.workers.emergency = 1;
        config.workers.priority = 1;
        config.workers.main = 1;
        config.metrics.report_interval_ms = 0;
        config
    }

    #[test]
    fn test_rejects_empty_endpoint_list() {
        let mut config = config();
        config.dispatch.endpoints.clear();
        let result = Engine::new(config, Arc::new(AlwaysOk));
        assert!(matches!(result, Err(EngineError::Configuration(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_twice_fails() {
        let engine = Engine::new(config(), Arc::new(AlwaysOk)).unwrap();
        engine.start().await.unwrap();
        assert!(matches!(engine.start().await, Err(EngineError::InvalidState(_))));
        assert_eq!(engine.worker_statuses().len(), 3);
        engine.shutdown(Duration::from_secs(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_health_published_at_start_counts_workers() {
        let mut config = config();
        config.health.check_interval_ms = 30_000;
        let engine = Engine::new(config, Arc::new(AlwaysOk)).unwrap();
        engine.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;

        let health = engine.get_health();
        assert_eq!(health.worker_health, 100.0);
        assert_eq!(health.status_category, StatusCategory::Degraded);
        engine.shutdown(Duration::from_secs(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_enqueue_rejected_after_shutdown() {
        let engine = Engine::new(config(), Arc::new(AlwaysOk)).unwrap();
        engine.start().await.unwrap();
        engine.shutdown(Duration::from_secs(1)).await;

        let result = engine.enqueue(Tier::Main, json!({"late": true}));
        assert_eq!(result, Err(EngineError::ShuttingDown { tier: Tier::Main }));
        assert!(engine.start().await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_started_engine_delivers() {
        let engine = Engine::new(config(), Arc::new(AlwaysOk)).unwrap();
        engine.start().await.unwrap();
        engine.enqueue(Tier::Priority, json!({"n": 1})).unwrap();
        engine.enqueue(Tier::Main, json!({"n": 2})).unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        let metrics = engine.get_metrics();
        assert_eq!(metrics.succeeded, 2);

        let report = engine.shutdown(Duration::from_secs(1)).await;
        assert!(report.completed);
        assert!(engine.dead_letters().is_empty());
    }
}
