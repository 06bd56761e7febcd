//! # Engine Metrics
//!
//! Monotonic dispatch counters plus a bounded window of dispatch latencies.
//! Every worker writes here concurrently; all counters live behind one lock so a
//! snapshot is always a consistent point-in-time read.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::info;

use crate::constants::defaults;
use crate::resilience::StopSignal;

#[derive(Debug, Default)]
struct Counters {
    total: u64,
    succeeded: u64,
    failed: u64,
    recovered: u64,
    restarts: u64,
    evicted: u64,
    timings: VecDeque<Duration>,
}

/// Thread-safe metrics accumulator shared by every engine component
#[derive(Debug)]
pub struct MetricsCollector {
    started_at: Instant,
    counters: Mutex<Counters>,
    timing_capacity: usize,
}

/// Point-in-time metrics view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub uptime_seconds: f64,
    pub total: u64,
    pub succeeded: u64,
    pub failed: u64,
    /// Successful dispatches of tasks that had failed before
    pub recovered: u64,
    pub restarts: u64,
    /// Tasks evicted by a drop-oldest tier
    pub evicted: u64,
    pub ops_per_second: f64,
    /// Percentage of dispatch calls that succeeded, 0-100
    pub success_rate: f64,
    pub avg_dispatch_ms: f64,
    pub p95_dispatch_ms: f64,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new(defaults::TIMING_SAMPLE_CAPACITY)
    }
}

impl MetricsCollector {
    pub fn new(timing_capacity: usize) -> Self {
        Self {
            started_at: Instant::now(),
            counters: Mutex::new(Counters::default()),
            timing_capacity: timing_capacity.max(1),
        }
    }

    /// Record the outcome of one dispatch call
    pub fn record(&self, success: bool) {
        let mut counters = self.counters.lock();
        counters.total += 1;
        if success {
            counters.succeeded += 1;
        } else {
            counters.failed += 1;
        }
    }

    /// Record a dispatch call with its latency. `retried` marks a task that failed before.
    pub fn record_dispatch(&self, success: bool, elapsed: Duration, retried: bool) {
        let mut counters = self.counters.lock();
        counters.total += 1;
        if success {
            counters.succeeded += 1;
            if retried {
                counters.recovered += 1;
            }
        } else {
            counters.failed += 1;
        }

        if counters.timings.len() == self.timing_capacity {
            counters.timings.pop_front();
        }
        counters.timings.push_back(elapsed);
    }

    pub fn record_restart(&self) {
        self.counters.lock().restarts += 1;
    }

    pub fn record_eviction(&self) {
        self.counters.lock().evicted += 1;
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let uptime = self.uptime();
        let counters = self.counters.lock();

        let uptime_seconds = uptime.as_secs_f64();
        let (avg_dispatch_ms, p95_dispatch_ms) = latency_summary(&counters.timings);

        MetricsSnapshot {
            uptime_seconds,
            total: counters.total,
            succeeded: counters.succeeded,
            failed: counters.failed,
            recovered: counters.recovered,
            restarts: counters.restarts,
            evicted: counters.evicted,
            ops_per_second: counters.total as f64 / uptime_seconds.max(1.0),
            success_rate: 100.0 * counters.succeeded as f64 / counters.total.max(1) as f64,
            avg_dispatch_ms,
            p95_dispatch_ms,
        }
    }

    /// Log a snapshot every `interval` until `stop` is raised
    pub async fn run_reporter(self: Arc<Self>, interval: Duration, stop: Arc<StopSignal>) {
        while !stop.wait_timeout(interval).await {
            let snapshot = self.snapshot();
            info!(
                total = snapshot.total,
                succeeded = snapshot.succeeded,
                failed = snapshot.failed,
                recovered = snapshot.recovered,
                restarts = snapshot.restarts,
                evicted = snapshot.evicted,
                ops_per_second = format!("{:.2}", snapshot.ops_per_second),
                success_rate = format!("{:.1}", snapshot.success_rate),
                p95_dispatch_ms = format!("{:.1}", snapshot.p95_dispatch_ms),
                "📊 METRICS"
            );
        }
    }
}

fn latency_summary(samples: &VecDeque<Duration>) -> (f64, f64) {
    if samples.is_empty() {
        return (0.0, 0.0);
    }

    let mut millis: Vec<f64> = samples.iter().map(|d| d.as_secs_f64() * 1000.0).collect();
    millis.sort_by(|a, b| a.total_cmp(b));

    let avg = millis.iter().sum::<f64>() / millis.len() as f64;
    let p95_index = ((millis.len() as f64 * 0.95).ceil() as usize).saturating_sub(1);
    (avg, millis[p95_index.min(millis.len() - 1)])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_and_success_rate() {
        let metrics = MetricsCollector::default();
        metrics.record(true);
        metrics.record(true);
        metrics.record(false);
        metrics.record_dispatch(true, Duration::from_millis(10), true);
        metrics.record_restart();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total, 4);
        assert_eq!(snapshot.succeeded, 3);
        assert_eq!(snapshot.failed, 1);
        assert_eq!(snapshot.recovered, 1);
        assert_eq!(snapshot.restarts, 1);
        assert!((snapshot.success_rate - 75.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty_collector_reports_zero_rate() {
        let snapshot = MetricsCollector::default().snapshot();
        assert_eq!(snapshot.total, 0);
        assert_eq!(snapshot.success_rate, 0.0);
        assert_eq!(snapshot.p95_dispatch_ms, 0.0);
    }

    #[test]
    fn test_timing_window_is_bounded() {
        let metrics = MetricsCollector::new(20);
        for ms in 1..=100u64 {
            metrics.record_dispatch(true, Duration::from_millis(ms), false);
        }
        let snapshot = metrics.snapshot();
        // Only 81..=100 remain
        assert!((snapshot.avg_dispatch_ms - 90.5).abs() < 0.01);
        assert!((snapshot.p95_dispatch_ms - 99.0).abs() < 0.01);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ops_per_second_uses_uptime() {
        let metrics = MetricsCollector::default();
        for _ in 0..20 {
            metrics.record(true);
        }
        tokio::time::advance(Duration::from_secs(10)).await;
        let snapshot = metrics.snapshot();
        assert!((snapshot.ops_per_second - 2.0).abs() < 0.01);
    }

    #[tokio::test]
    async fn test_concurrent_increments_are_not_lost() {
        let metrics = Arc::new(MetricsCollector::default());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let metrics = metrics.clone();
                tokio::spawn(async move {
                    for i in 0..250 {
                        metrics.record(i % 5 != 0);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total, 2000);
        assert_eq!(snapshot.succeeded + snapshot.failed, snapshot.total);
        assert_eq!(snapshot.failed, 400);
    }
}
