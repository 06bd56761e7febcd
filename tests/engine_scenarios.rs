//! End-to-end engine behavior on tokio's paused clock.

mod common;

use common::*;
use relay_engine::{DeadLetterReason, EngineError, OverflowPolicy, Tier};
use serde_json::json;
use std::time::Duration;
use tokio::time::sleep;

#[tokio::test(start_paused = true)]
async fn test_transient_failures_retry_with_backoff() {
    let mut config = test_config();
    config.dispatch.endpoints = vec!["primary".to_string()];
    let dispatcher = MockDispatcher::scripted(
        vec![
            Scripted::Transient("connection reset"),
            Scripted::Transient("connection reset"),
        ],
        Scripted::Deliver,
    );
    let TestEngine { engine, dispatcher } = build_engine(config, dispatcher);

    engine.start().await.unwrap();
    engine.enqueue(Tier::Main, json!({"ticket": 1})).unwrap();
    sleep(Duration::from_secs(2)).await;

    // One call per endpoint attempt, so the delivery happened on attempt_count 3
    assert_eq!(dispatcher.call_count(), 3);
    let gaps = dispatcher.call_gaps();
    assert!(
        gaps[0] >= Duration::from_millis(100) && gaps[0] < Duration::from_millis(150),
        "first backoff was {:?}",
        gaps[0]
    );
    assert!(
        gaps[1] >= Duration::from_millis(200) && gaps[1] < Duration::from_millis(250),
        "second backoff was {:?}",
        gaps[1]
    );

    let metrics = engine.get_metrics();
    assert_eq!(metrics.total, 3);
    assert_eq!(metrics.succeeded, 1);
    assert_eq!(metrics.failed, 2);
    assert_eq!(metrics.recovered, 1);
    assert!(engine.dead_letters().is_empty());

    let report = engine.shutdown(Duration::from_secs(1)).await;
    assert!(report.completed);
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_retries_dead_letter_once() {
    let mut config = test_config();
    config.dispatch.endpoints = vec!["primary".to_string()];
    config.retry.max_retries = 3;
    let dispatcher = MockDispatcher::scripted(Vec::new(), Scripted::Transient("503 service unavailable"));
    let TestEngine { engine, dispatcher } = build_engine(config, dispatcher);

    engine.start().await.unwrap();
    let task_id = engine.enqueue(Tier::Main, json!({"ticket": 2})).unwrap();
    sleep(Duration::from_secs(5)).await;

    // Never more attempts than the retry budget
    assert_eq!(dispatcher.call_count(), 3);

    let dead = engine.dead_letters();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].task_id, task_id);
    assert_eq!(dead[0].reason, DeadLetterReason::MaxRetriesExceeded);
    assert_eq!(dead[0].attempts, 3);
    assert_eq!(dead[0].tier, Tier::Main);
    assert!(dead[0].last_error.is_some());

    engine.shutdown(Duration::from_secs(1)).await;
    assert_eq!(engine.dead_letters().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_permanent_rejection_is_not_retried() {
    let mut config = test_config();
    config.dispatch.endpoints = vec!["primary".to_string()];
    let dispatcher = MockDispatcher::scripted(vec![Scripted::Permanent("schema mismatch")], Scripted::Deliver);
    let TestEngine { engine, dispatcher } = build_engine(config, dispatcher);

    engine.start().await.unwrap();
    engine.enqueue(Tier::Main, json!({"malformed": true})).unwrap();
    sleep(Duration::from_secs(1)).await;

    assert_eq!(dispatcher.call_count(), 1);
    let dead = engine.dead_letters();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].reason, DeadLetterReason::PermanentFailure);
    assert_eq!(dead[0].attempts, 1);
    assert!(dead[0]
        .last_error
        .as_deref()
        .is_some_and(|error| error.contains("schema mismatch")));

    engine.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn test_reject_policy_capacity() {
    let mut config = test_config();
    config.queues.main.capacity = 10;
    config.queues.main.overflow = OverflowPolicy::Reject;
    let TestEngine { engine, .. } = build_engine(config, MockDispatcher::delivering());

    for n in 0..10 {
        engine.enqueue(Tier::Main, json!({"n": n})).unwrap();
    }
    let eleventh = engine.enqueue(Tier::Main, json!({"n": 10}));
    assert_eq!(
        eleventh,
        Err(EngineError::QueueFull {
            tier: Tier::Main,
            capacity: 10
        })
    );
    assert_eq!(engine.context().queues.depth(Tier::Main), 10);

    let taken = engine.context().queues.try_dequeue(Tier::Main);
    assert_eq!(taken.map(|task| task.payload), Some(json!({"n": 0})));
    assert!(engine.enqueue(Tier::Main, json!({"n": 11})).is_ok());
    assert_eq!(engine.context().queues.depth(Tier::Main), 10);
}

#[tokio::test]
async fn test_drop_oldest_evicts_and_counts() {
    let mut config = test_config();
    config.queues.main.capacity = 2;
    config.queues.main.overflow = OverflowPolicy::DropOldest;
    let TestEngine { engine, .. } = build_engine(config, MockDispatcher::delivering());

    for n in 0..3 {
        engine.enqueue(Tier::Main, json!({"n": n})).unwrap();
    }

    assert_eq!(engine.get_metrics().evicted, 1);
    let main = engine
        .queue_stats()
        .into_iter()
        .find(|stats| stats.tier == Tier::Main)
        .unwrap();
    assert_eq!(main.depth, 2);
    assert!(engine.dead_letters().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_strict_priority_across_tiers() {
    let dispatcher = MockDispatcher::delivering().with_latency(Duration::from_millis(10));
    let TestEngine { engine, dispatcher } = build_engine(test_config(), dispatcher);

    engine.enqueue(Tier::Main, json!({"tier": "main"})).unwrap();
    engine.enqueue(Tier::Priority, json!({"tier": "priority"})).unwrap();
    engine.enqueue(Tier::Emergency, json!({"tier": "emergency"})).unwrap();

    engine.start().await.unwrap();
    sleep(Duration::from_millis(200)).await;

    let order: Vec<_> = dispatcher
        .calls()
        .into_iter()
        .map(|call| call.payload["tier"].as_str().unwrap_or_default().to_string())
        .collect();
    assert_eq!(order, ["emergency", "priority", "main"]);

    engine.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test(start_paused = true)]
async fn test_failover_marks_primary_unavailable() {
    let mut config = test_config();
    config.dispatch.failure_threshold = 2;
    let dispatcher = MockDispatcher::delivering().with_endpoint_down("primary");
    let TestEngine { engine, dispatcher } = build_engine(config, dispatcher);

    engine.start().await.unwrap();
    for n in 0..3 {
        engine.enqueue(Tier::Main, json!({"n": n})).unwrap();
    }
    sleep(Duration::from_secs(1)).await;

    assert_eq!(engine.get_metrics().succeeded, 3);
    let primary_calls = dispatcher
        .calls()
        .iter()
        .filter(|call| call.endpoint == "primary")
        .count();
    assert_eq!(primary_calls, 2);

    let endpoints = engine.endpoints();
    assert!(!endpoints[0].is_available);
    assert!(endpoints[1].is_available);
    assert_eq!(endpoints[1].total_successes, 3);

    engine.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test(start_paused = true)]
async fn test_every_task_ends_exactly_once() {
    let mut config = test_config();
    config.dispatch.endpoints = vec!["primary".to_string()];
    config.retry.max_retries = 2;
    config.workers.main = 3;
    let script = (0..30)
        .map(|n| {
            if n % 3 == 0 {
                Scripted::Deliver
            } else {
                Scripted::Transient("flaky")
            }
        })
        .collect();
    let dispatcher = MockDispatcher::scripted(script, Scripted::Transient("flaky"));
    let TestEngine { engine, .. } = build_engine(config, dispatcher);

    engine.start().await.unwrap();
    for n in 0..20 {
        engine.enqueue(Tier::Main, json!({"n": n})).unwrap();
    }
    sleep(Duration::from_secs(5)).await;
    engine.shutdown(Duration::from_secs(1)).await;

    let delivered = engine.get_metrics().succeeded as usize;
    let dead = engine.dead_letters();
    assert_eq!(delivered + dead.len(), 20);
    assert!(dead.iter().all(|entry| entry.attempts <= 2));
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_drains_emergency_first_within_budget() {
    let mut config = test_config();
    config.dispatch.endpoints = vec!["primary".to_string()];
    config.shutdown.timeout_ms = 2_000;
    let dispatcher = MockDispatcher::delivering().with_latency(Duration::from_millis(50));
    let TestEngine { engine, dispatcher } = build_engine(config, dispatcher);

    for n in 0..50 {
        engine.enqueue(Tier::Main, json!({"tier": "main", "n": n})).unwrap();
    }
    for n in 0..5 {
        engine
            .enqueue(Tier::Emergency, json!({"tier": "emergency", "n": n}))
            .unwrap();
    }

    let report = engine.shutdown(Duration::from_secs(2)).await;

    let calls = dispatcher.calls();
    assert!(calls[..5]
        .iter()
        .all(|call| call.payload["tier"] == "emergency"));
    assert!(calls[5..].iter().all(|call| call.payload["tier"] == "main"));

    let dead = engine.dead_letters();
    assert!(!dead.is_empty());
    assert!(dead.iter().all(|entry| {
        entry.reason == DeadLetterReason::ShutdownIncomplete && entry.tier == Tier::Main
    }));

    let delivered = engine.get_metrics().succeeded as usize;
    assert_eq!(delivered + dead.len(), 55);
    assert!(!report.completed);
    assert_eq!(report.abandoned, dead.len());
    assert!(report.elapsed_ms <= 2_000);
    assert!(engine.context().queues.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_is_idempotent() {
    let TestEngine { engine, .. } = build_engine(test_config(), MockDispatcher::delivering());
    engine.start().await.unwrap();
    engine.enqueue(Tier::Main, json!({"n": 1})).unwrap();

    let (first, second) = tokio::join!(
        engine.shutdown(Duration::from_secs(1)),
        engine.shutdown(Duration::from_secs(1))
    );
    assert_eq!(first, second);

    let third = engine.shutdown(Duration::from_millis(1)).await;
    assert_eq!(first, third);
    assert!(first.completed);
    assert!(matches!(
        engine.enqueue(Tier::Emergency, json!({})),
        Err(EngineError::ShuttingDown { .. })
    ));
}
