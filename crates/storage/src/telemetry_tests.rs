// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use kokino_core::{AgentId, FakeClock};
use yare::parameterized;

fn store() -> (TelemetryStore, FakeClock) {
    let clock = FakeClock::new(1_000_000);
    let store = TelemetryStore::open_in_memory(Arc::new(clock.clone())).unwrap();
    (store, clock)
}

fn exec(store: &TelemetryStore, clock: &FakeClock, kind: MetricKind, success: bool, dur: i64) {
    store
        .append(
            &MetricRecord::new(kind, clock.now_ms())
                .agent(AgentId::new("alice"))
                .duration(dur)
                .success(success),
        )
        .unwrap();
}

#[test]
fn availability_on_empty_window_is_one() {
    let (store, _) = store();
    assert!((store.availability(24).unwrap() - 1.0).abs() < f64::EPSILON);
}

#[test]
fn availability_counts_terminal_events() {
    let (store, clock) = store();
    exec(&store, &clock, MetricKind::ExecCompleted, true, 100);
    exec(&store, &clock, MetricKind::ExecCompleted, true, 100);
    exec(&store, &clock, MetricKind::ExecFailed, false, 100);
    exec(&store, &clock, MetricKind::ExecTimeout, false, 100);

    assert!((store.availability(24).unwrap() - 0.5).abs() < f64::EPSILON);
}

#[test]
fn availability_ignores_not_applicable_rows() {
    let (store, clock) = store();
    exec(&store, &clock, MetricKind::ExecCompleted, true, 100);
    // success = NULL: excluded from the denominator
    store
        .append(&MetricRecord::new(MetricKind::ExecFailed, clock.now_ms()))
        .unwrap();

    assert!((store.availability(24).unwrap() - 1.0).abs() < f64::EPSILON);
}

#[test]
fn availability_window_excludes_old_events() {
    let (store, clock) = store();
    exec(&store, &clock, MetricKind::ExecFailed, false, 100);
    clock.advance(25 * 60 * 60 * 1000);
    exec(&store, &clock, MetricKind::ExecCompleted, true, 100);

    assert!((store.availability(24).unwrap() - 1.0).abs() < f64::EPSILON);
}

#[parameterized(
    empty = { vec![], 95, 0 },
    single = { vec![100], 50, 100 },
    p50_of_four = { vec![10, 20, 30, 40], 50, 20 },
    p95_of_four = { vec![10, 20, 30, 40], 95, 40 },
    p99_of_hundred = { (1..=100).collect(), 99, 99 },
)]
fn percentile_rank(durations: Vec<i64>, p: u8, expected: i64) {
    let (store, clock) = store();
    for d in durations {
        exec(&store, &clock, MetricKind::ExecCompleted, true, d);
    }
    assert_eq!(store.latency_percentile(p, 24).unwrap(), expected);
}

#[test]
fn p95_at_least_p50() {
    let (store, clock) = store();
    for d in [5, 10, 200, 3_000, 45, 77, 12] {
        exec(&store, &clock, MetricKind::ExecCompleted, true, d);
    }
    let p50 = store.latency_percentile(50, 24).unwrap();
    let p95 = store.latency_percentile(95, 24).unwrap();
    assert!(p95 >= p50);
}

#[test]
fn availability_budget() {
    let (store, clock) = store();
    for _ in 0..995 {
        exec(&store, &clock, MetricKind::ExecCompleted, true, 100);
    }
    for _ in 0..5 {
        exec(&store, &clock, MetricKind::ExecFailed, false, 100);
    }

    let budget = store.error_budget(Slo::Availability, 24).unwrap();
    assert_eq!(budget.total, 1_000);
    assert_eq!(budget.budget, 5);
    assert_eq!(budget.consumed, 5);
    assert_eq!(budget.remaining, 0);
    assert!((budget.percent_consumed - 100.0).abs() < f64::EPSILON);
}

#[test]
fn latency_budget_counts_over_threshold() {
    let (store, clock) = store();
    for _ in 0..19 {
        exec(&store, &clock, MetricKind::ExecCompleted, true, 1_000);
    }
    exec(&store, &clock, MetricKind::ExecCompleted, true, 31_000);

    let budget = store.error_budget(Slo::Latency, 24).unwrap();
    assert_eq!(budget.total, 20);
    assert_eq!(budget.budget, 1);
    assert_eq!(budget.consumed, 1);
}

#[test]
fn correctness_budget_counts_mismatches() {
    let (store, clock) = store();
    for matched in [true, true, true, false] {
        store
            .append(
                &MetricRecord::new(MetricKind::ShadowCompared, clock.now_ms()).success(matched),
            )
            .unwrap();
    }
    store
        .append(&MetricRecord::new(MetricKind::ShadowMismatch, clock.now_ms()))
        .unwrap();

    let budget = store.error_budget(Slo::Correctness, 24).unwrap();
    assert_eq!(budget.total, 4);
    assert_eq!(budget.consumed, 1);
}

#[test]
fn integrity_budget_saturates_on_any_violation() {
    let (store, clock) = store();
    let clean = store.error_budget(Slo::Integrity, 24).unwrap();
    assert!((clean.percent_consumed - 0.0).abs() < f64::EPSILON);

    store
        .append(&MetricRecord::new(MetricKind::IntegrityViolation, clock.now_ms()))
        .unwrap();
    let dirty = store.error_budget(Slo::Integrity, 24).unwrap();
    assert_eq!(dirty.budget, 0);
    assert!((dirty.percent_consumed - 100.0).abs() < f64::EPSILON);
}

#[test]
fn endpoint_percentiles_group_by_path() {
    let (store, clock) = store();
    for (path, dur, ok) in [
        ("/agents/execute", 100, true),
        ("/agents/execute", 300, true),
        ("/agents/execute", 500, false),
        ("/replies", 50, true),
    ] {
        store
            .append(
                &MetricRecord::new(MetricKind::Request, clock.now_ms())
                    .duration(dur)
                    .success(ok)
                    .metadata(serde_json::json!({ "path": path })),
            )
            .unwrap();
    }

    let stats = store.endpoint_percentiles(24).unwrap();
    assert_eq!(stats.len(), 2);
    let exec = &stats["/agents/execute"];
    assert_eq!(exec.requests, 3);
    assert_eq!(exec.min_ms, 100);
    assert_eq!(exec.max_ms, 500);
    assert_eq!(exec.avg_ms, 300);
    assert_eq!(exec.p50_ms, 300);
    assert!((exec.success_rate - 2.0 / 3.0).abs() < 1e-9);
}

#[test]
fn execution_rate_buckets_by_hour() {
    let (store, clock) = store();
    exec(&store, &clock, MetricKind::ExecCompleted, true, 10);
    exec(&store, &clock, MetricKind::ExecCompleted, true, 10);
    clock.advance(60 * 60 * 1000);
    exec(&store, &clock, MetricKind::ExecFailed, false, 10);

    let buckets = store.execution_rate(24).unwrap();
    assert_eq!(buckets.len(), 2);
    assert_eq!(buckets[0].count, 2);
    assert_eq!(buckets[1].count, 1);
    assert!(buckets[0].hour_start_ms < buckets[1].hour_start_ms);
}

#[test]
fn recent_failures_newest_first() {
    let (store, clock) = store();
    exec(&store, &clock, MetricKind::ExecFailed, false, 10);
    clock.advance(100);
    store
        .append(
            &MetricRecord::new(MetricKind::SpawnError, clock.now_ms())
                .agent(AgentId::new("bob")),
        )
        .unwrap();

    let failures = store.recent_failures(24, 10).unwrap();
    assert_eq!(failures.len(), 2);
    assert_eq!(failures[0].event, MetricKind::SpawnError);
}

#[test]
fn cleanup_deletes_old_rows() {
    let (store, clock) = store();
    exec(&store, &clock, MetricKind::ExecCompleted, true, 10);
    clock.advance(8 * 24 * 60 * 60 * 1000);
    exec(&store, &clock, MetricKind::ExecCompleted, true, 10);

    let deleted = store.cleanup(7).unwrap();
    assert_eq!(deleted, 1);
    assert_eq!(store.count_kind(MetricKind::ExecCompleted, 24 * 365).unwrap(), 1);
}
