//! Process-wide stop flag with timed waits.
//!
//! Loops check [`StopSignal::is_stopped`] at the top of each iteration and park on
//! [`StopSignal::wait_timeout`] instead of sleeping, so a stop is observed within one
//! wait interval.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Debug, Default)]
pub struct StopSignal {
    stopped: AtomicBool,
    notify: Notify,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag and wake every waiter. Returns false if it was already raised.
    pub fn trigger(&self) -> bool {
        let first = !self.stopped.swap(true, Ordering::AcqRel);
        self.notify.notify_waiters();
        first
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Wait until the flag is raised
    pub async fn wait(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a trigger between the check and the await is not lost
            notified.as_mut().enable();
            if self.is_stopped() {
                return;
            }
            notified.await;
        }
    }

    /// Wait up to `timeout`; true if the flag was raised
    pub async fn wait_timeout(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.wait()).await.is_ok()
    }
}
