//! Property tests for composite health scoring.

use proptest::prelude::*;
use relay_engine::health::{HealthInputs, HealthScorer};
use relay_engine::StatusCategory;

fn inputs_strategy() -> impl Strategy<Value = (usize, usize, usize, usize, u64)> {
    (1usize..10_000, 0usize..=100, 1usize..32, 0usize..=100, 1u64..10_000).prop_map(
        |(total, used_pct, active, alive_pct, operations)| {
            let used = total * used_pct / 100;
            let alive = active * alive_pct / 100;
            (used, total, alive, active, operations)
        },
    )
}

proptest! {
    #[test]
    fn overall_score_is_non_increasing_in_failure_rate(
        (used, total, alive, active, operations) in inputs_strategy(),
        failures_a in 0u64..10_000,
        failures_b in 0u64..10_000,
    ) {
        let scorer = HealthScorer::default();
        let (fewer, more) = if failures_a <= failures_b {
            (failures_a, failures_b)
        } else {
            (failures_b, failures_a)
        };
        let score = |failures: u64| {
            scorer.score(&HealthInputs {
                used_capacity: used,
                total_capacity: total,
                alive_workers: alive,
                active_workers: active,
                succeeded: operations.saturating_sub(failures.min(operations)),
                total_operations: operations,
            })
        };

        let healthier = score(fewer);
        let sicker = score(more);
        prop_assert!(healthier.overall_score >= sicker.overall_score);
        prop_assert!(healthier.status_category >= sicker.status_category);
    }

    #[test]
    fn components_stay_within_bounds((used, total, alive, active, operations) in inputs_strategy(), succeeded in 0u64..20_000) {
        let snapshot = HealthScorer::default().score(&HealthInputs {
            used_capacity: used,
            total_capacity: total,
            alive_workers: alive,
            active_workers: active,
            succeeded,
            total_operations: operations,
        });

        for value in [snapshot.queue_health, snapshot.worker_health, snapshot.success_rate, snapshot.overall_score] {
            prop_assert!((0.0..=100.0).contains(&value));
        }
        prop_assert!(snapshot.queue_health >= 10.0);
    }
}

#[test]
fn test_fresh_engine_is_degraded() {
    let snapshot = HealthScorer::default().score(&HealthInputs {
        used_capacity: 0,
        total_capacity: 16_000,
        alive_workers: 14,
        active_workers: 14,
        succeeded: 0,
        total_operations: 0,
    });
    assert_eq!(snapshot.success_rate, 0.0);
    assert_eq!(snapshot.status_category, StatusCategory::Degraded);
}
