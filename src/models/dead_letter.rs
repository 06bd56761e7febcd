use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::task::{Payload, Task, TaskId};
use crate::constants::{DeadLetterReason, Tier};

/// Terminal record of a task that will never be delivered
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    pub task_id: TaskId,
    pub tier: Tier,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub enqueued_at: DateTime<Utc>,
    pub terminal_at: DateTime<Utc>,
    pub reason: DeadLetterReason,
    pub payload: Payload,
}

impl DeadLetterEntry {
    pub fn from_task(task: Task, reason: DeadLetterReason) -> Self {
        Self {
            task_id: task.id,
            tier: task.tier,
            attempts: task.attempt_count,
            last_error: task.last_error,
            enqueued_at: task.created_at,
            terminal_at: Utc::now(),
            reason,
            payload: task.payload,
        }
    }
}
