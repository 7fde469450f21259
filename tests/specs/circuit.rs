//! Circuit breaker opening and recovery through the delivery path.

use crate::prelude::*;
use kokino_adapters::ScriptedOutcome;
use kokino_core::{AgentId, DeliveryMode, MetricKind};
use kokino_engine::{CircuitBreakerConfig, DeliveryOptions, EngineError};

/// Threshold 3, reset 2s: three failures open the circuit, the fourth call
/// is rejected, a successful probe after the reset window closes it, and
/// subsequent calls succeed.
#[tokio::test]
async fn circuit_opens_then_recovers() {
    let w = world_with_breaker(CircuitBreakerConfig {
        failure_threshold: 3,
        reset_ms: 2_000,
        half_open_max_probes: 1,
    });
    w.register("alice", DeliveryMode::Headless);
    let alice = AgentId::new("alice");

    for _ in 0..3 {
        w.supervisor.push(ScriptedOutcome::exits(1, ""));
        let err = w
            .router
            .route(&alice, "fail", DeliveryOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Upstream(_)));
    }
    assert_eq!(w.telemetry.count_of(MetricKind::CircuitOpened), 1);

    // Fourth call rejected with a retry hint; no child spawned.
    let spawns_before = w.supervisor.spawned().len();
    let err = w
        .router
        .route(&alice, "blocked", DeliveryOptions::default())
        .await
        .unwrap_err();
    match err {
        EngineError::Busy { retry_after_ms, .. } => {
            assert!(retry_after_ms.unwrap() > 0);
            assert!(retry_after_ms.unwrap() <= 2_000);
        }
        other => panic!("expected busy, got {other}"),
    }
    assert_eq!(w.supervisor.spawned().len(), spawns_before);

    // After the reset window, one probe is admitted and succeeds.
    w.clock.advance(2_000);
    w.supervisor.push(ScriptedOutcome::jsonl_result("back", "s"));
    let routed = w
        .router
        .route(&alice, "probe", DeliveryOptions::default())
        .await
        .unwrap();
    assert_eq!(routed.result.response, "back");
    assert_eq!(w.telemetry.count_of(MetricKind::CircuitHalfOpen), 1);
    assert_eq!(w.telemetry.count_of(MetricKind::CircuitRecovered), 1);

    // Closed again: calls keep succeeding.
    w.supervisor.push(ScriptedOutcome::jsonl_result("fine", "s"));
    assert!(w
        .router
        .route(&alice, "after", DeliveryOptions::default())
        .await
        .is_ok());
}

/// A failed probe reopens the circuit and restarts its timer.
#[tokio::test]
async fn failed_probe_restarts_the_window() {
    let w = world_with_breaker(CircuitBreakerConfig {
        failure_threshold: 1,
        reset_ms: 2_000,
        half_open_max_probes: 1,
    });
    w.register("alice", DeliveryMode::Headless);
    let alice = AgentId::new("alice");

    w.supervisor.push(ScriptedOutcome::exits(1, ""));
    let _ = w.router.route(&alice, "x", DeliveryOptions::default()).await;

    w.clock.advance(2_000);
    w.supervisor.push(ScriptedOutcome::exits(1, ""));
    let _ = w.router.route(&alice, "probe", DeliveryOptions::default()).await;
    assert_eq!(w.telemetry.count_of(MetricKind::CircuitRecoveryFailed), 1);

    // Halfway through the fresh window: still rejected.
    w.clock.advance(1_000);
    assert!(matches!(
        w.router
            .route(&alice, "y", DeliveryOptions::default())
            .await
            .unwrap_err(),
        EngineError::Busy { .. }
    ));
}

/// Manual reset runs the action regardless of prior state.
#[tokio::test]
async fn manual_reset_closes_immediately() {
    let w = world_with_breaker(CircuitBreakerConfig {
        failure_threshold: 1,
        reset_ms: 60_000,
        half_open_max_probes: 1,
    });
    w.register("alice", DeliveryMode::Headless);
    let alice = AgentId::new("alice");

    w.supervisor.push(ScriptedOutcome::exits(1, ""));
    let _ = w.router.route(&alice, "x", DeliveryOptions::default()).await;

    let blocked = w
        .router
        .route(&alice, "still blocked", DeliveryOptions::default())
        .await;
    assert!(matches!(blocked, Err(EngineError::Busy { .. })));

    // Reset followed immediately by execute runs the action.
    w.breaker.reset(&alice);
    w.supervisor.push(ScriptedOutcome::jsonl_result("ok", "s"));
    let routed = w
        .router
        .route(&alice, "after reset", DeliveryOptions::default())
        .await
        .unwrap();
    assert_eq!(routed.result.response, "ok");
    assert_eq!(w.telemetry.count_of(MetricKind::CircuitReset), 1);

    // Failures stay isolated per agent.
    w.register("bob", DeliveryMode::Headless);
    w.supervisor.push(ScriptedOutcome::jsonl_result("bob ok", "s"));
    assert!(w
        .router
        .route(&AgentId::new("bob"), "hello", DeliveryOptions::default())
        .await
        .is_ok());
}
