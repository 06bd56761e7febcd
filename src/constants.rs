//! # Engine Constants
//!
//! Enums and default values that define the operational boundaries of the engine:
//! the priority tiers, queue overflow policies, worker lifecycle states, health
//! categories and dead-letter reasons.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Priority class a task belongs to. Declaration order is scheduling order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Emergency,
    Priority,
    Main,
}

impl Tier {
    /// All tiers in strict scheduling order.
    pub const ALL: [Tier; 3] = [Tier::Emergency, Tier::Priority, Tier::Main];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Emergency => "emergency",
            Tier::Priority => "priority",
            Tier::Main => "main",
        }
    }

    pub fn index(&self) -> usize {
        *self as usize
    }

    /// Tiers a worker homed on `self` serves, highest priority first.
    pub fn served_by(self) -> impl Iterator<Item = Tier> {
        Tier::ALL.into_iter().filter(move |tier| *tier <= self)
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "emergency" => Ok(Tier::Emergency),
            "priority" => Ok(Tier::Priority),
            "main" => Ok(Tier::Main),
            other => Err(format!("unknown tier '{other}'")),
        }
    }
}

/// What a full tier does with a new submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Fail the enqueue synchronously.
    #[default]
    Reject,
    /// Evict the head to admit the new item. Never allowed on `emergency`.
    DropOldest,
}

impl fmt::Display for OverflowPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OverflowPolicy::Reject => "reject",
            OverflowPolicy::DropOldest => "drop_oldest",
        })
    }
}

/// Worker lifecycle as driven by the recovery supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Starting,
    Running,
    Restarting,
    FailedPermanent,
}

impl WorkerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerStatus::Starting => "starting",
            WorkerStatus::Running => "running",
            WorkerStatus::Restarting => "restarting",
            WorkerStatus::FailedPermanent => "failed_permanent",
        }
    }
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse health bucket derived from the overall score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusCategory {
    Critical,
    Degraded,
    Good,
    Excellent,
}

impl fmt::Display for StatusCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            StatusCategory::Critical => "critical",
            StatusCategory::Degraded => "degraded",
            StatusCategory::Good => "good",
            StatusCategory::Excellent => "excellent",
        };
        f.write_str(label)
    }
}

/// Why a task ended up in the dead-letter log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeadLetterReason {
    MaxRetriesExceeded,
    PermanentFailure,
    ShutdownIncomplete,
}

impl fmt::Display for DeadLetterReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DeadLetterReason::MaxRetriesExceeded => "max_retries_exceeded",
            DeadLetterReason::PermanentFailure => "permanent_failure",
            DeadLetterReason::ShutdownIncomplete => "shutdown_incomplete",
        };
        f.write_str(label)
    }
}

/// Default tuning values, mirrored by `config::EngineConfig::default()`.
pub mod defaults {
    pub const EMERGENCY_QUEUE_CAPACITY: usize = 1_000;
    pub const PRIORITY_QUEUE_CAPACITY: usize = 5_000;
    pub const MAIN_QUEUE_CAPACITY: usize = 10_000;

    pub const EMERGENCY_WORKERS: usize = 2;
    pub const PRIORITY_WORKERS: usize = 4;
    pub const MAIN_WORKERS: usize = 8;
    pub const DEQUEUE_TIMEOUT_MS: u64 = 1_000;

    pub const MAX_RETRIES: u32 = 10;
    pub const RETRY_BASE_DELAY_MS: u64 = 1_000;
    pub const RETRY_MAX_DELAY_MS: u64 = 30_000;
    pub const JITTER_FACTOR: f64 = 0.1;

    pub const CALL_TIMEOUT_MS: u64 = 30_000;
    pub const MAX_RETRIES_PER_ENDPOINT: u32 = 3;
    pub const DISPATCH_DEADLINE_MS: u64 = 60_000;
    pub const ENDPOINT_FAILURE_THRESHOLD: u32 = 5;
    pub const ENDPOINT_RECOVERY_THRESHOLD: u32 = 2;

    pub const HEALTH_CHECK_INTERVAL_MS: u64 = 30_000;
    pub const QUEUE_HEALTH_FLOOR: f64 = 10.0;
    pub const EXCELLENT_THRESHOLD: f64 = 90.0;
    pub const GOOD_THRESHOLD: f64 = 75.0;
    pub const DEGRADED_THRESHOLD: f64 = 50.0;

    pub const SUPERVISOR_CHECK_INTERVAL_MS: u64 = 5_000;
    pub const HEARTBEAT_TIMEOUT_MS: u64 = 90_000;
    pub const MAX_RESTART_ATTEMPTS: u32 = 3;
    pub const RESTART_COOLDOWN_MS: u64 = 1_000;

    pub const SHUTDOWN_TIMEOUT_MS: u64 = 30_000;

    pub const METRICS_REPORT_INTERVAL_MS: u64 = 60_000;
    pub const TIMING_SAMPLE_CAPACITY: usize = 1_000;

    pub const RECOVERY_EVENT_CAPACITY: usize = 500;
}
