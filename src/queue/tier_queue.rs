//! A single bounded FIFO tier.
//!
//! Tasks carrying a `not_before` in the future stay in place but are skipped by
//! [`TierQueue::take_ready`], so fresh work can pass an item that is mid-backoff.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tokio::time::Instant;

use crate::config::TierQueueConfig;
use crate::constants::{OverflowPolicy, Tier};
use crate::models::Task;

/// Result of admitting a task into a full or non-full tier
#[derive(Debug)]
pub enum PushOutcome {
    Admitted,
    /// Drop-oldest made room by evicting the head
    Evicted(Task),
}

#[derive(Debug)]
pub struct TierQueue {
    tier: Tier,
    capacity: usize,
    overflow: OverflowPolicy,
    tasks: Mutex<VecDeque<Task>>,
}

/// Occupancy of one tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierQueueStats {
    pub tier: Tier,
    pub depth: usize,
    pub capacity: usize,
    pub overflow: OverflowPolicy,
}

impl TierQueue {
    pub fn new(tier: Tier, config: TierQueueConfig) -> Self {
        Self {
            tier,
            capacity: config.capacity,
            overflow: config.overflow,
            tasks: Mutex::new(VecDeque::with_capacity(config.capacity.min(1024))),
        }
    }

    pub fn tier(&self) -> Tier {
        self.tier
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.lock().is_empty()
    }

    /// Admit a task. Under reject policy a full tier hands the task back.
    pub fn push(&self, task: Task) -> Result<PushOutcome, Task> {
        let mut tasks = self.tasks.lock();
        if tasks.len() < self.capacity {
            tasks.push_back(task);
            return Ok(PushOutcome::Admitted);
        }

        match self.overflow {
            OverflowPolicy::Reject => Err(task),
            OverflowPolicy::DropOldest => match tasks.pop_front() {
                Some(evicted) => {
                    tasks.push_back(task);
                    Ok(PushOutcome::Evicted(evicted))
                }
                None => Err(task),
            },
        }
    }

    /// Remove the oldest task that is eligible at `now`
    pub fn take_ready(&self, now: Instant) -> Option<Task> {
        let mut tasks = self.tasks.lock();
        let position = tasks.iter().position(|task| task.is_ready(now))?;
        tasks.remove(position)
    }

    /// Earliest instant at which some resident task becomes eligible
    pub fn next_ready_at(&self) -> Option<Instant> {
        let now = Instant::now();
        self.tasks
            .lock()
            .iter()
            .map(|task| task.not_before.unwrap_or(now))
            .min()
    }

    /// Remove every resident task in FIFO order
    pub fn drain(&self) -> Vec<Task> {
        self.tasks.lock().drain(..).collect()
    }

    pub fn stats(&self) -> TierQueueStats {
        TierQueueStats {
            tier: self.tier,
            depth: self.len(),
            capacity: self.capacity,
            overflow: self.overflow,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn queue(capacity: usize, overflow: OverflowPolicy) -> TierQueue {
        TierQueue::new(Tier::Main, TierQueueConfig::new(capacity, overflow))
    }

    #[test]
    fn test_reject_policy_hands_task_back() {
        let queue = queue(2, OverflowPolicy::Reject);
        assert!(queue.push(Task::new(Tier::Main, json!(1))).is_ok());
        assert!(queue.push(Task::new(Tier::Main, json!(2))).is_ok());

        let rejected = queue.push(Task::new(Tier::Main, json!(3))).unwrap_err();
        assert_eq!(rejected.payload, json!(3));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_drop_oldest_evicts_head() {
        let queue = queue(2, OverflowPolicy::DropOldest);
        queue.push(Task::new(Tier::Main, json!(1))).unwrap();
        queue.push(Task::new(Tier::Main, json!(2))).unwrap();

        match queue.push(Task::new(Tier::Main, json!(3))).unwrap() {
            PushOutcome::Evicted(task) => assert_eq!(task.payload, json!(1)),
            PushOutcome::Admitted => panic!("expected eviction"),
        }
        assert_eq!(queue.len(), 2);

        let now = Instant::now();
        assert_eq!(queue.take_ready(now).unwrap().payload, json!(2));
        assert_eq!(queue.take_ready(now).unwrap().payload, json!(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deferred_task_is_passed_by_fresh_work() {
        let queue = queue(10, OverflowPolicy::Reject);
        let mut deferred = Task::new(Tier::Main, json!("retry"));
        deferred.defer(Duration::from_millis(100), "timeout");
        queue.push(deferred).unwrap();
        queue.push(Task::new(Tier::Main, json!("fresh"))).unwrap();

        assert_eq!(queue.take_ready(Instant::now()).unwrap().payload, json!("fresh"));
        assert!(queue.take_ready(Instant::now()).is_none());
        assert_eq!(
            queue.next_ready_at(),
            Some(Instant::now() + Duration::from_millis(100))
        );

        tokio::time::advance(Duration::from_millis(100)).await;
        assert_eq!(queue.take_ready(Instant::now()).unwrap().payload, json!("retry"));
        assert!(queue.is_empty());
    }
}
