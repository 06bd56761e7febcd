//! Task-level outcome policy shared by worker loops, the shutdown drain and the
//! recovery supervisor.
//!
//! - success: the task is done
//! - permanent error: dead-letter immediately (`permanent_failure`)
//! - transient error with budget left: back into the same tier with `not_before`
//!   set to the backoff delay
//! - transient error with the budget spent: dead-letter (`max_retries_exceeded`)

use std::sync::Arc;
use std::time::Duration;

use crate::constants::DeadLetterReason;
use crate::dead_letter::DeadLetterLog;
use crate::dispatch::DispatchReceipt;
use crate::error::DispatchError;
use crate::logging::log_task_operation;
use crate::models::Task;
use crate::queue::TaskQueueSet;
use crate::resilience::RetryPolicy;

/// What happened to a task after one dispatch call
#[derive(Debug)]
pub enum Settlement {
    /// Delivered on the task's `attempts`-th dispatch
    Delivered { attempts: u32 },
    Requeued { delay: Duration },
    /// The tier was full; the caller keeps the task and retries it after `delay`
    Held { task: Task, delay: Duration },
    DeadLettered(DeadLetterReason),
}

#[derive(Debug, Clone)]
pub struct TaskSettler {
    queues: Arc<TaskQueueSet>,
    dead_letters: Arc<DeadLetterLog>,
    policy: RetryPolicy,
}

impl TaskSettler {
    pub fn new(queues: Arc<TaskQueueSet>, dead_letters: Arc<DeadLetterLog>, policy: RetryPolicy) -> Self {
        Self {
            queues,
            dead_letters,
            policy,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn settle(
        &self,
        mut task: Task,
        outcome: Result<DispatchReceipt, DispatchError>,
    ) -> Settlement {
        let task_id = task.id.to_string();

        match outcome {
            Ok(receipt) => {
                log_task_operation(
                    "dispatch",
                    &task_id,
                    task.tier,
                    task.attempt_count,
                    "delivered",
                    Some(&receipt.endpoint),
                );
                Settlement::Delivered {
                    attempts: task.attempt_count,
                }
            }
            Err(DispatchError::Permanent { endpoint, reason }) => {
                task.last_error = Some(format!("{endpoint}: {reason}"));
                self.dead_letter(task, DeadLetterReason::PermanentFailure)
            }
            Err(error) => {
                task.last_error = Some(error.message());
                if !self.policy.allows_retry(task.attempt_count) {
                    return self.dead_letter(task, DeadLetterReason::MaxRetriesExceeded);
                }

                let delay = self.policy.delay_for(task.attempt_count.saturating_sub(1));
                task.defer(delay, error.message());
                log_task_operation(
                    "dispatch",
                    &task_id,
                    task.tier,
                    task.attempt_count,
                    "retry_scheduled",
                    Some(&format!("backoff {}ms: {}", delay.as_millis(), error.message())),
                );

                match self.queues.requeue(task) {
                    Ok(()) => Settlement::Requeued { delay },
                    Err(task) => {
                        log_task_operation(
                            "requeue",
                            &task_id,
                            task.tier,
                            task.attempt_count,
                            "held",
                            Some("tier full - retrying inline after backoff"),
                        );
                        Settlement::Held { task, delay }
                    }
                }
            }
        }
    }

    /// Dead-letter a task directly
    pub fn dead_letter(&self, task: Task, reason: DeadLetterReason) -> Settlement {
        self.dead_letters.append(task, reason);
        Settlement::DeadLettered(reason)
    }
}
