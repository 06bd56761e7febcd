//! # Endpoint Target
//!
//! A ranked downstream address with a simple availability signal. Unlike a full
//! breaker there is no half-open probing: an unavailable endpoint is still tried,
//! only after every available one, and flips back once it strings together enough
//! successes.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use tracing::{info, warn};

/// One downstream endpoint. `is_available` is written only by the dispatch client.
#[derive(Debug)]
pub struct EndpointTarget {
    address: String,
    rank: usize,
    available: AtomicBool,
    consecutive_failures: AtomicU32,
    consecutive_successes: AtomicU32,
    failure_threshold: u32,
    recovery_threshold: u32,
    total_failures: AtomicU64,
    total_successes: AtomicU64,
}

/// Point-in-time view of an endpoint for status reporting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointSnapshot {
    pub address: String,
    pub rank: usize,
    pub is_available: bool,
    pub consecutive_failures: u32,
    pub total_successes: u64,
    pub total_failures: u64,
}

impl EndpointTarget {
    pub fn new(address: impl Into<String>, rank: usize, failure_threshold: u32, recovery_threshold: u32) -> Self {
        Self {
            address: address.into(),
            rank,
            available: AtomicBool::new(true),
            consecutive_failures: AtomicU32::new(0),
            consecutive_successes: AtomicU32::new(0),
            failure_threshold: failure_threshold.max(1),
            recovery_threshold: recovery_threshold.max(1),
            total_failures: AtomicU64::new(0),
            total_successes: AtomicU64::new(0),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::Acquire)
    }

    /// Record a successful call
    pub fn record_success(&self) {
        self.total_successes.fetch_add(1, Ordering::Relaxed);
        self.consecutive_failures.store(0, Ordering::Release);
        let successes = self.consecutive_successes.fetch_add(1, Ordering::AcqRel) + 1;

        if successes >= self.recovery_threshold && !self.available.swap(true, Ordering::AcqRel) {
            info!(
                endpoint = %self.address,
                rank = self.rank,
                consecutive_successes = successes,
                "🟢 Endpoint available again"
            );
        }
    }

    /// Record a transient failure (timeout, connection error)
    pub fn record_failure(&self) {
        self.total_failures.fetch_add(1, Ordering::Relaxed);
        self.consecutive_successes.store(0, Ordering::Release);
        let failures = self.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;

        if failures >= self.failure_threshold && self.available.swap(false, Ordering::AcqRel) {
            warn!(
                endpoint = %self.address,
                rank = self.rank,
                consecutive_failures = failures,
                "🔴 Endpoint marked unavailable"
            );
        }
    }

    pub fn snapshot(&self) -> EndpointSnapshot {
        EndpointSnapshot {
            address: self.address.clone(),
            rank: self.rank,
            is_available: self.is_available(),
            consecutive_failures: self.consecutive_failures.load(Ordering::Acquire),
            total_successes: self.total_successes.load(Ordering::Relaxed),
            total_failures: self.total_failures.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flips_unavailable_after_threshold() {
        let endpoint = EndpointTarget::new("http://primary", 0, 3, 2);
        assert!(endpoint.is_available());

        endpoint.record_failure();
        endpoint.record_failure();
        assert!(endpoint.is_available());

        endpoint.record_failure();
        assert!(!endpoint.is_available());
        assert_eq!(endpoint.snapshot().consecutive_failures, 3);
    }

    #[test]
    fn test_success_resets_failure_run() {
        let endpoint = EndpointTarget::new("http://primary", 0, 3, 2);
        endpoint.record_failure();
        endpoint.record_failure();
        endpoint.record_success();
        endpoint.record_failure();
        endpoint.record_failure();
        assert!(endpoint.is_available());
    }

    #[test]
    fn test_recovers_after_consecutive_successes() {
        let endpoint = EndpointTarget::new("http://backup", 1, 1, 2);
        endpoint.record_failure();
        assert!(!endpoint.is_available());

        endpoint.record_success();
        assert!(!endpoint.is_available());
        endpoint.record_success();
        assert!(endpoint.is_available());

        let snapshot = endpoint.snapshot();
        assert_eq!(snapshot.rank, 1);
        assert_eq!(snapshot.total_successes, 2);
        assert_eq!(snapshot.total_failures, 1);
    }
}
