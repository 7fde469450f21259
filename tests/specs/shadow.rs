//! Shadow-mode dual execution and comparison.

use crate::prelude::*;
use kokino_adapters::ScriptedOutcome;
use kokino_core::{AgentId, DeliveryMode, MetricKind};
use kokino_engine::DeliveryOptions;

/// Both modes succeed with different text: exactly one comparison row with
/// both success flags set, no output match, a signed latency delta, and a
/// mismatch telemetry event. The tmux result is the one returned.
#[tokio::test]
async fn shadow_comparison_logs_a_mismatch() {
    let w = world();
    w.register("alice", DeliveryMode::Shadow);

    // Headless child answers one thing...
    w.supervisor
        .push(ScriptedOutcome::jsonl_result("headless answer", "s-1"));
    // ...while the pane settles on another.
    w.term.script_frames("alice", &["$", "$\npane answer"]);

    let routed = w
        .router
        .route(
            &AgentId::new("alice"),
            "compare me",
            DeliveryOptions {
                timeout_ms: Some(5_000),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(routed.mode, DeliveryMode::Shadow);
    assert_eq!(routed.result.response, "pane answer");

    let stats = w.shadow_store.stats(60_000).unwrap();
    assert_eq!(stats.total, 1);
    assert_eq!(stats.both_succeeded, 1);
    assert_eq!(stats.mismatches, 1);

    let rows = w.shadow_store.mismatches(10).unwrap();
    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert!(row.tmux_success);
    assert!(row.headless_success);
    assert!(!row.output_match);
    assert_eq!(
        row.latency_delta_ms.unwrap(),
        row.headless_duration_ms.unwrap() - row.tmux_duration_ms.unwrap()
    );

    assert_eq!(w.telemetry.count_of(MetricKind::ShadowMismatch), 1);
    assert_eq!(w.telemetry.count_of(MetricKind::ShadowCompared), 1);
}

/// Matching (after normalization) outputs record a clean comparison.
#[tokio::test]
async fn shadow_comparison_matches_normalized_output() {
    let w = world();
    w.register("alice", DeliveryMode::Shadow);

    w.supervisor
        .push(ScriptedOutcome::jsonl_result("The Answer Is 42", "s-1"));
    w.term
        .script_frames("alice", &["$", "$\nthe  answer is 42"]);

    w.router
        .route(
            &AgentId::new("alice"),
            "math",
            DeliveryOptions {
                timeout_ms: Some(5_000),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let stats = w.shadow_store.stats(60_000).unwrap();
    assert_eq!(stats.matches, 1);
    assert_eq!(stats.mismatches, 0);
    assert_eq!(w.telemetry.count_of(MetricKind::ShadowMismatch), 0);
}

/// A headless failure during shadow still serves the tmux result and
/// records the failure for drill-down.
#[tokio::test]
async fn shadow_survives_headless_failure() {
    let w = world();
    w.register("alice", DeliveryMode::Shadow);

    w.supervisor.push(ScriptedOutcome::exits(1, ""));
    w.term.script_frames("alice", &["$", "$\nstill fine"]);

    let routed = w
        .router
        .route(
            &AgentId::new("alice"),
            "go",
            DeliveryOptions {
                timeout_ms: Some(5_000),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(routed.result.response, "still fine");

    let failures = w.shadow_store.failures(10).unwrap();
    assert_eq!(failures.len(), 1);
    assert!(!failures[0].headless_success);
    assert!(failures[0].tmux_success);
    assert_eq!(w.telemetry.count_of(MetricKind::ShadowHeadlessFailure), 1);
}
