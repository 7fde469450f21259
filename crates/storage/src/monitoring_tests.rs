// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use kokino_core::FakeClock;

fn store() -> (MonitoringStore, FakeClock) {
    let clock = FakeClock::new(1_000);
    let db = Db::open_in_memory().unwrap();
    (MonitoringStore::new(db, Arc::new(clock.clone())), clock)
}

#[test]
fn latest_metric_returns_most_recent_sample() {
    let (store, clock) = store();
    let alice = AgentId::new("alice");
    store.record_metric(&alice, 10.0, 100.0, Some(42)).unwrap();
    clock.advance(1_000);
    store.record_metric(&alice, 55.5, 512.0, Some(42)).unwrap();

    let latest = store.latest_metric(&alice).unwrap().unwrap();
    assert!((latest.cpu_percent - 55.5).abs() < f64::EPSILON);
    assert!((latest.memory_mb - 512.0).abs() < f64::EPSILON);
    assert_eq!(latest.timestamp_ms, 2_000);
}

#[test]
fn latest_metric_none_for_unsampled_agent() {
    let (store, _) = store();
    assert!(store.latest_metric(&AgentId::new("ghost")).unwrap().is_none());
}

#[test]
fn record_alert_persists_event() {
    let (store, _) = store();
    let alice = AgentId::new("alice");
    store
        .record_alert(
            &alice,
            AlertLevel::Warning,
            "cpu above 80%",
            serde_json::json!({ "cpu": 85.0 }),
        )
        .unwrap();

    let events = store.recent_events(10).unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, "warning");
    assert_eq!(events[0].message, "cpu above 80%");
    assert_eq!(events[0].metadata["cpu"], 85.0);
}

#[test]
fn record_event_rejects_unknown_type() {
    let (store, _) = store();
    let err = store
        .record_event(
            &AgentId::new("alice"),
            "catastrophe",
            "boom",
            serde_json::json!({}),
        )
        .unwrap_err();
    assert!(matches!(err, StorageError::Conflict(_)));
}

#[test]
fn error_log_lifecycle() {
    let (store, _) = store();
    let alice = AgentId::new("alice");

    let id = store.log_error(Some(&alice), "runner", "spawn failed").unwrap();
    store.log_error(Some(&alice), "runner", "parse failed").unwrap();
    assert_eq!(store.unresolved_count(&alice).unwrap(), 2);

    store.resolve_error(id).unwrap();
    assert_eq!(store.unresolved_count(&alice).unwrap(), 1);

    let unresolved = store.unresolved_errors(10).unwrap();
    assert_eq!(unresolved.len(), 1);
    assert_eq!(unresolved[0].message, "parse failed");
}

#[test]
fn resolve_unknown_error_is_not_found() {
    let (store, _) = store();
    assert!(store.resolve_error(99).is_err());
}

#[test]
fn cleanup_keeps_unresolved_errors() {
    let (store, clock) = store();
    let alice = AgentId::new("alice");

    store.record_metric(&alice, 1.0, 10.0, None).unwrap();
    store
        .record_alert(&alice, AlertLevel::Critical, "old", serde_json::json!({}))
        .unwrap();
    let resolved = store.log_error(Some(&alice), "runner", "old resolved").unwrap();
    store.resolve_error(resolved).unwrap();
    store.log_error(Some(&alice), "runner", "old unresolved").unwrap();

    // Eight days later, sweep with a 7-day retention.
    clock.advance(8 * 24 * 60 * 60 * 1000);
    let counts = store.cleanup(7).unwrap();

    assert_eq!(counts.metrics_deleted, 1);
    assert_eq!(counts.events_deleted, 1);
    assert_eq!(counts.errors_deleted, 1);
    assert_eq!(store.unresolved_count(&alice).unwrap(), 1);
}
