//! Composite health scoring.
//!
//! ```text
//! queue_health  = max(100 - 100 * used / total, floor)
//! worker_health = 100 * alive / (workers not permanently failed)
//! success_rate  = 100 * succeeded / max(total_operations, 1)
//! overall       = mean of the three
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::HealthConfig;
use crate::constants::StatusCategory;

/// Raw measurements a snapshot is computed from
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct HealthInputs {
    pub used_capacity: usize,
    pub total_capacity: usize,
    pub alive_workers: usize,
    /// Workers not permanently failed
    pub active_workers: usize,
    pub succeeded: u64,
    pub total_operations: u64,
}

/// Published health reading. Never mutated once built; replaced wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub timestamp: DateTime<Utc>,
    pub queue_health: f64,
    pub worker_health: f64,
    pub success_rate: f64,
    pub overall_score: f64,
    pub status_category: StatusCategory,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HealthScorer {
    queue_health_floor: f64,
    excellent: f64,
    good: f64,
    degraded: f64,
}

impl From<&HealthConfig> for HealthScorer {
    fn from(config: &HealthConfig) -> Self {
        Self {
            queue_health_floor: config.queue_health_floor,
            excellent: config.excellent_threshold,
            good: config.good_threshold,
            degraded: config.degraded_threshold,
        }
    }
}

impl Default for HealthScorer {
    fn default() -> Self {
        Self::from(&HealthConfig::default())
    }
}

impl HealthScorer {
    pub fn queue_health(&self, used: usize, total: usize) -> f64 {
        if total == 0 {
            return 100.0;
        }
        let utilization = (used as f64 / total as f64).min(1.0);
        (100.0 - 100.0 * utilization).max(self.queue_health_floor)
    }

    /// Zero when no worker remains eligible
    pub fn worker_health(&self, alive: usize, active: usize) -> f64 {
        if active == 0 {
            return 0.0;
        }
        100.0 * alive.min(active) as f64 / active as f64
    }

    pub fn success_rate(&self, succeeded: u64, total: u64) -> f64 {
        100.0 * succeeded.min(total) as f64 / total.max(1) as f64
    }

    pub fn categorize(&self, overall: f64) -> StatusCategory {
        if overall >= self.excellent {
            StatusCategory::Excellent
        } else if overall >= self.good {
            StatusCategory::Good
        } else if overall >= self.degraded {
            StatusCategory::Degraded
        } else {
            StatusCategory::Critical
        }
    }

    pub fn score(&self, inputs: &HealthInputs) -> HealthSnapshot {
        let queue_health = self.queue_health(inputs.used_capacity, inputs.total_capacity);
        let worker_health = self.worker_health(inputs.alive_workers, inputs.active_workers);
        let success_rate = self.success_rate(inputs.succeeded, inputs.total_operations);
        let overall_score = (queue_health + worker_health + success_rate) / 3.0;

        HealthSnapshot {
            timestamp: Utc::now(),
            queue_health,
            worker_health,
            success_rate,
            overall_score,
            status_category: self.categorize(overall_score),
        }
    }
}
