//! Engine configuration builders tuned for the paused test clock.

use relay_engine::{Engine, EngineConfig, IdleMaintenance};
use std::sync::Arc;

use super::MockDispatcher;

/// Fast, jitter-free configuration with one `main` worker and two endpoints
pub fn test_config() -> EngineConfig {
    let mut config = EngineConfig::default();

    config.workers.emergency = 0;
    config.workers.priority = 0;
    config.workers.main = 1;
    config.workers.dequeue_timeout_ms = 100;

    config.retry.max_retries = 5;
    config.retry.base_delay_ms = 100;
    config.retry.max_delay_ms = 2_000;
    config.retry.jitter_factor = 0.0;

    config.dispatch.endpoints = vec!["primary".to_string(), "secondary".to_string()];
    config.dispatch.max_retries_per_endpoint = 1;
    config.dispatch.base_delay_ms = 10;
    config.dispatch.max_delay_ms = 100;
    config.dispatch.jitter_factor = 0.0;
    config.dispatch.call_timeout_ms = 1_000;
    config.dispatch.deadline_ms = 2_000;

    config.health.check_interval_ms = 50;
    config.supervisor.check_interval_ms = 50;
    config.supervisor.heartbeat_timeout_ms = 5_000;
    config.supervisor.restart_cooldown_ms = 10;
    config.metrics.report_interval_ms = 0;
    config
}

pub struct TestEngine {
    pub engine: Engine,
    pub dispatcher: Arc<MockDispatcher>,
}

pub fn build_engine(config: EngineConfig, dispatcher: MockDispatcher) -> TestEngine {
    let dispatcher = Arc::new(dispatcher);
    let engine = Engine::new(config, dispatcher.clone()).expect("test config is valid");
    TestEngine { engine, dispatcher }
}

pub fn build_engine_with_idle(
    config: EngineConfig,
    dispatcher: MockDispatcher,
    idle: Arc<dyn IdleMaintenance>,
) -> TestEngine {
    let dispatcher = Arc::new(dispatcher);
    let engine = Engine::builder(config, dispatcher.clone())
        .idle_maintenance(idle)
        .build()
        .expect("test config is valid");
    TestEngine { engine, dispatcher }
}
