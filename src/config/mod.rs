//! # Engine Configuration
//!
//! Typed configuration for every engine component. Each section deserializes with
//! `#[serde(default)]`, so a partial file or a handful of environment variables is
//! enough to override individual knobs.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use relay_engine::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Layered load: defaults -> relay-engine.toml -> relay-engine.{env}.toml -> RELAY_* env vars
//! let manager = ConfigManager::load()?;
//!
//! let main_capacity = manager.config().queues.main.capacity;
//! let heartbeat_timeout = manager.config().supervisor.heartbeat_timeout();
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::constants::{defaults, OverflowPolicy, Tier};
use crate::resilience::RetryPolicy;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub queues: QueuesConfig,
    pub workers: WorkersConfig,
    pub retry: TaskRetryConfig,
    pub dispatch: DispatchConfig,
    pub health: HealthConfig,
    pub supervisor: SupervisorConfig,
    pub shutdown: ShutdownConfig,
    pub metrics: MetricsConfig,
    pub dead_letter: DeadLetterConfig,
    pub logging: LoggingConfig,
}

/// Per-tier queue capacity and overflow behavior
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq)]
pub struct TierQueueConfig {
    pub capacity: usize,
    #[serde(default)]
    pub overflow: OverflowPolicy,
}

impl TierQueueConfig {
    pub fn new(capacity: usize, overflow: OverflowPolicy) -> Self {
        Self { capacity, overflow }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct QueuesConfig {
    pub emergency: TierQueueConfig,
    pub priority: TierQueueConfig,
    pub main: TierQueueConfig,
}

impl Default for QueuesConfig {
    fn default() -> Self {
        Self {
            emergency: TierQueueConfig::new(defaults::EMERGENCY_QUEUE_CAPACITY, OverflowPolicy::Reject),
            priority: TierQueueConfig::new(defaults::PRIORITY_QUEUE_CAPACITY, OverflowPolicy::Reject),
            main: TierQueueConfig::new(defaults::MAIN_QUEUE_CAPACITY, OverflowPolicy::Reject),
        }
    }
}

impl QueuesConfig {
    pub fn for_tier(&self, tier: Tier) -> TierQueueConfig {
        match tier {
            Tier::Emergency => self.emergency,
            Tier::Priority => self.priority,
            Tier::Main => self.main,
        }
    }
}

/// Worker loop counts per tier
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct WorkersConfig {
    pub emergency: usize,
    pub priority: usize,
    pub main: usize,
    /// Upper bound on a single blocking dequeue
    pub dequeue_timeout_ms: u64,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            emergency: defaults::EMERGENCY_WORKERS,
            priority: defaults::PRIORITY_WORKERS,
            main: defaults::MAIN_WORKERS,
            dequeue_timeout_ms: defaults::DEQUEUE_TIMEOUT_MS,
        }
    }
}

impl WorkersConfig {
    pub fn pool_size(&self, tier: Tier) -> usize {
        match tier {
            Tier::Emergency => self.emergency,
            Tier::Priority => self.priority,
            Tier::Main => self.main,
        }
    }

    pub fn total(&self) -> usize {
        self.emergency + self.priority + self.main
    }

    pub fn dequeue_timeout(&self) -> Duration {
        Duration::from_millis(self.dequeue_timeout_ms)
    }
}

/// Task-level retry policy applied across dispatch calls
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TaskRetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_factor: f64,
}

impl Default for TaskRetryConfig {
    fn default() -> Self {
        Self {
            max_retries: defaults::MAX_RETRIES,
            base_delay_ms: defaults::RETRY_BASE_DELAY_MS,
            max_delay_ms: defaults::RETRY_MAX_DELAY_MS,
            jitter_factor: defaults::JITTER_FACTOR,
        }
    }
}

impl TaskRetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_retries,
            Duration::from_millis(self.base_delay_ms),
            Duration::from_millis(self.max_delay_ms),
            self.jitter_factor,
        )
    }
}

/// Dispatch client settings: endpoint ranking, per-endpoint retry and circuit signal thresholds
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct DispatchConfig {
    /// Downstream addresses; rank is the position in this list
    pub endpoints: Vec<String>,
    pub call_timeout_ms: u64,
    pub max_retries_per_endpoint: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_factor: f64,
    /// Ceiling for a whole dispatch call across every endpoint
    pub deadline_ms: u64,
    pub failure_threshold: u32,
    pub recovery_threshold: u32,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            endpoints: Vec::new(),
            call_timeout_ms: defaults::CALL_TIMEOUT_MS,
            max_retries_per_endpoint: defaults::MAX_RETRIES_PER_ENDPOINT,
            base_delay_ms: defaults::RETRY_BASE_DELAY_MS,
            max_delay_ms: defaults::RETRY_MAX_DELAY_MS,
            jitter_factor: defaults::JITTER_FACTOR,
            deadline_ms: defaults::DISPATCH_DEADLINE_MS,
            failure_threshold: defaults::ENDPOINT_FAILURE_THRESHOLD,
            recovery_threshold: defaults::ENDPOINT_RECOVERY_THRESHOLD,
        }
    }
}

impl DispatchConfig {
    pub fn endpoint_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_retries_per_endpoint,
            Duration::from_millis(self.base_delay_ms),
            Duration::from_millis(self.max_delay_ms),
            self.jitter_factor,
        )
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }
}

/// Health scoring interval, floor and category thresholds
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct HealthConfig {
    pub check_interval_ms: u64,
    pub queue_health_floor: f64,
    pub excellent_threshold: f64,
    pub good_threshold: f64,
    pub degraded_threshold: f64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            check_interval_ms: defaults::HEALTH_CHECK_INTERVAL_MS,
            queue_health_floor: defaults::QUEUE_HEALTH_FLOOR,
            excellent_threshold: defaults::EXCELLENT_THRESHOLD,
            good_threshold: defaults::GOOD_THRESHOLD,
            degraded_threshold: defaults::DEGRADED_THRESHOLD,
        }
    }
}

impl HealthConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct SupervisorConfig {
    pub check_interval_ms: u64,
    pub heartbeat_timeout_ms: u64,
    pub max_restart_attempts: u32,
    pub restart_cooldown_ms: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            check_interval_ms: defaults::SUPERVISOR_CHECK_INTERVAL_MS,
            heartbeat_timeout_ms: defaults::HEARTBEAT_TIMEOUT_MS,
            max_restart_attempts: defaults::MAX_RESTART_ATTEMPTS,
            restart_cooldown_ms: defaults::RESTART_COOLDOWN_MS,
        }
    }
}

impl SupervisorConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }

    pub fn restart_cooldown(&self) -> Duration {
        Duration::from_millis(self.restart_cooldown_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ShutdownConfig {
    pub timeout_ms: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            timeout_ms: defaults::SHUTDOWN_TIMEOUT_MS,
        }
    }
}

impl ShutdownConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct MetricsConfig {
    /// Interval of the periodic metrics report log line; 0 disables the loop
    pub report_interval_ms: u64,
    pub timing_sample_capacity: usize,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            report_interval_ms: defaults::METRICS_REPORT_INTERVAL_MS,
            timing_sample_capacity: defaults::TIMING_SAMPLE_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct DeadLetterConfig {
    /// Optional JSON-lines file mirroring the in-memory log
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Directory for the JSON log file; console only when unset
    pub log_dir: Option<PathBuf>,
    /// Filter directive overriding the environment default (e.g. "relay_engine=trace")
    pub level: Option<String>,
}

impl EngineConfig {
    /// Validate values and cross-field constraints
    pub fn validate(&self) -> ConfigResult<()> {
        for tier in Tier::ALL {
            let queue = self.queues.for_tier(tier);
            if queue.capacity == 0 {
                return Err(ConfigurationError::invalid_value(
                    format!("queues.{tier}.capacity"),
                    "0",
                    "capacity must be greater than zero",
                ));
            }
        }

        if self.queues.emergency.overflow == OverflowPolicy::DropOldest {
            return Err(ConfigurationError::invalid_value(
                "queues.emergency.overflow",
                "drop_oldest",
                "the emergency tier must reject on overflow",
            ));
        }

        if self.workers.total() == 0 {
            return Err(ConfigurationError::validation(
                "at least one worker loop is required across all tiers",
            ));
        }

        if self.workers.dequeue_timeout_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "workers.dequeue_timeout_ms",
                "0",
                "dequeue timeout must be greater than zero",
            ));
        }

        if self.retry.max_retries == 0 {
            return Err(ConfigurationError::invalid_value(
                "retry.max_retries",
                "0",
                "a task needs at least one attempt",
            ));
        }

        if self.dispatch.max_retries_per_endpoint == 0 {
            return Err(ConfigurationError::invalid_value(
                "dispatch.max_retries_per_endpoint",
                "0",
                "each endpoint needs at least one attempt",
            ));
        }

        for (field, factor) in [
            ("retry.jitter_factor", self.retry.jitter_factor),
            ("dispatch.jitter_factor", self.dispatch.jitter_factor),
        ] {
            if !(0.0..=1.0).contains(&factor) {
                return Err(ConfigurationError::invalid_value(
                    field,
                    factor.to_string(),
                    "jitter factor must be within 0.0..=1.0",
                ));
            }
        }

        if self.dispatch.endpoints.iter().any(|e| e.trim().is_empty()) {
            return Err(ConfigurationError::invalid_value(
                "dispatch.endpoints",
                "\"\"",
                "endpoint addresses must not be blank",
            ));
        }

        let health = &self.health;
        if !(health.excellent_threshold >= health.good_threshold
            && health.good_threshold >= health.degraded_threshold)
        {
            return Err(ConfigurationError::validation(format!(
                "health thresholds must be descending (excellent {} >= good {} >= degraded {})",
                health.excellent_threshold, health.good_threshold, health.degraded_threshold
            )));
        }

        let heartbeat_floor = self.dispatch.deadline_ms + self.workers.dequeue_timeout_ms;
        if self.supervisor.heartbeat_timeout_ms <= heartbeat_floor {
            return Err(ConfigurationError::validation(format!(
                "supervisor.heartbeat_timeout_ms ({}) must exceed dispatch.deadline_ms + workers.dequeue_timeout_ms ({heartbeat_floor})",
                self.supervisor.heartbeat_timeout_ms
            )));
        }

        if self.shutdown.timeout_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "shutdown.timeout_ms",
                "0",
                "shutdown budget must be greater than zero",
            ));
        }

        Ok(())
    }
}
