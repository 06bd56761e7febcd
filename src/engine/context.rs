//! Shared engine state.
//!
//! Every component receives an `Arc<EngineContext>` at construction; there are no
//! process-wide globals besides the logging subscriber.

use std::fmt;
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::dead_letter::DeadLetterLog;
use crate::dispatch::{DispatchClient, Dispatcher};
use crate::error::Result;
use crate::metrics::MetricsCollector;
use crate::queue::TaskQueueSet;
use crate::resilience::StopSignal;
use crate::supervisor::WorkerRegistry;
use crate::workers::{IdleMaintenance, InFlightLedger, TaskSettler};

pub struct EngineContext {
    pub config: EngineConfig,
    pub queues: Arc<TaskQueueSet>,
    pub dispatch: DispatchClient,
    pub metrics: Arc<MetricsCollector>,
    pub dead_letters: Arc<DeadLetterLog>,
    pub settler: TaskSettler,
    pub registry: WorkerRegistry,
    pub in_flight: InFlightLedger,
    pub idle: Arc<dyn IdleMaintenance>,
    pub stop: Arc<StopSignal>,
}

impl EngineContext {
    pub fn new(
        config: EngineConfig,
        dispatcher: Arc<dyn Dispatcher>,
        idle: Arc<dyn IdleMaintenance>,
    ) -> Result<Self> {
        config.validate()?;

        let metrics = Arc::new(MetricsCollector::new(config.metrics.timing_sample_capacity));
        let queues = Arc::new(TaskQueueSet::new(&config.queues, metrics.clone()));
        let dead_letters = Arc::new(match &config.dead_letter.path {
            Some(path) => DeadLetterLog::with_file(path)?,
            None => DeadLetterLog::new(),
        });
        let dispatch = DispatchClient::new(&config.dispatch, dispatcher)?;
        let settler = TaskSettler::new(queues.clone(), dead_letters.clone(), config.retry.policy());

        Ok(Self {
            config,
            queues,
            dispatch,
            metrics,
            dead_letters,
            settler,
            registry: WorkerRegistry::new(),
            in_flight: InFlightLedger::new(),
            idle,
            stop: Arc::new(StopSignal::new()),
        })
    }
}

impl fmt::Debug for EngineContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineContext")
            .field("queues", &self.queues)
            .field("dispatch", &self.dispatch)
            .field("registry", &self.registry)
            .field("in_flight", &self.in_flight.len())
            .field("stopped", &self.stop.is_stopped())
            .finish_non_exhaustive()
    }
}
