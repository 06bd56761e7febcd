use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

use crate::constants::Tier;

/// Opaque task payload. The engine never looks inside it.
pub type Payload = serde_json::Value;

/// Unique task identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A unit of work owned by exactly one holder at a time: a tier queue, a worker,
/// the shutdown drain, or finally the dead-letter log.
#[derive(Debug, Clone)]
pub struct Task {
    pub id: TaskId,
    pub tier: Tier,
    pub payload: Payload,
    /// Dispatch calls made so far; never exceeds the task-level `max_retries`
    pub attempt_count: u32,
    pub created_at: DateTime<Utc>,
    /// Not eligible for dequeue before this instant (retry backoff)
    pub not_before: Option<Instant>,
    pub last_error: Option<String>,
}

impl Task {
    pub fn new(tier: Tier, payload: Payload) -> Self {
        Self {
            id: TaskId::new(),
            tier,
            payload,
            attempt_count: 0,
            created_at: Utc::now(),
            not_before: None,
            last_error: None,
        }
    }

    pub fn is_ready(&self, now: Instant) -> bool {
        self.not_before.map_or(true, |at| at <= now)
    }

    /// Record that a dispatch call is about to be made
    pub fn begin_attempt(&mut self) -> u32 {
        self.attempt_count += 1;
        self.attempt_count
    }

    /// Park the task until `delay` has elapsed
    pub fn defer(&mut self, delay: Duration, error: impl Into<String>) {
        self.not_before = Some(Instant::now() + delay);
        self.last_error = Some(error.into());
    }

    /// Whether the task already failed at least once before its current attempt
    pub fn is_retry(&self) -> bool {
        self.attempt_count > 1
    }
}
