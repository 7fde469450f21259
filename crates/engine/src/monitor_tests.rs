// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use kokino_core::{AgentId, CliKind, DeliveryMode, FakeClock};
use kokino_storage::Db;
use yare::parameterized;

struct Fixture {
    monitor: ResourceMonitor,
    agents: AgentStore,
    monitoring: MonitoringStore,
    clock: FakeClock,
    bus: EventBus,
}

fn fixture() -> Fixture {
    let clock = FakeClock::new(1_000_000);
    let db = Db::open_in_memory().unwrap();
    let agents = AgentStore::new(db.clone(), Arc::new(clock.clone()));
    let monitoring = MonitoringStore::new(db, Arc::new(clock.clone()));
    let bus = EventBus::new(Arc::new(clock.clone()));
    let monitor = ResourceMonitor::new(
        agents.clone(),
        monitoring.clone(),
        bus.clone(),
        MonitorConfig::default(),
    );
    Fixture {
        monitor,
        agents,
        monitoring,
        clock,
        bus,
    }
}

fn register(f: &Fixture, id: &str, metadata: serde_json::Value) {
    f.agents
        .register(
            &AgentId::new(id),
            CliKind::Mock,
            DeliveryMode::Headless,
            metadata,
            30_000,
        )
        .unwrap();
}

#[test]
fn sample_skips_agents_without_pid() {
    let f = fixture();
    register(&f, "alice", serde_json::json!({}));
    let mut system = sysinfo::System::new();
    assert_eq!(f.monitor.sample_once(&mut system).unwrap(), 0);
}

#[test]
fn sample_records_own_process() {
    let f = fixture();
    // Use this test process's pid: always alive.
    let pid = std::process::id() as i64;
    register(&f, "alice", serde_json::json!({ "pid": pid }));

    let mut system = sysinfo::System::new();
    let sampled = f.monitor.sample_once(&mut system).unwrap();
    assert_eq!(sampled, 1);

    let metric = f
        .monitoring
        .latest_metric(&AgentId::new("alice"))
        .unwrap()
        .unwrap();
    assert!(metric.memory_mb > 0.0);
    assert_eq!(metric.pid, Some(pid as i32));
}

#[parameterized(
    cpu_warning = { 85.0, 100.0, "warning" },
    cpu_critical = { 96.0, 100.0, "error" },
    memory_warning = { 10.0, 1_500.0, "warning" },
    memory_critical = { 10.0, 3_000.0, "error" },
)]
fn thresholds_raise_alerts(cpu: f64, memory_mb: f64, expected_level: &str) {
    let f = fixture();
    register(&f, "alice", serde_json::json!({}));
    f.monitoring
        .record_metric(&AgentId::new("alice"), cpu, memory_mb, None)
        .unwrap();

    let raised = f.monitor.alert_once().unwrap();
    assert!(raised >= 1);

    let events = f.monitoring.recent_events(10).unwrap();
    assert!(events.iter().any(|e| e.event_type == expected_level));
}

#[test]
fn healthy_metrics_raise_nothing() {
    let f = fixture();
    register(&f, "alice", serde_json::json!({}));
    f.monitoring
        .record_metric(&AgentId::new("alice"), 10.0, 100.0, None)
        .unwrap();

    assert_eq!(f.monitor.alert_once().unwrap(), 0);
    assert!(f.monitoring.recent_events(10).unwrap().is_empty());
}

#[test]
fn unresolved_errors_raise_alerts() {
    let f = fixture();
    register(&f, "alice", serde_json::json!({}));
    let alice = AgentId::new("alice");
    for i in 0..5 {
        f.monitoring
            .log_error(Some(&alice), "runner", &format!("boom {i}"))
            .unwrap();
    }

    assert_eq!(f.monitor.alert_once().unwrap(), 1);
    let events = f.monitoring.recent_events(10).unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, "warning");
    assert!(events[0].message.contains("unresolved errors"));
}

#[tokio::test]
async fn alerts_are_broadcast_on_the_bus() {
    let f = fixture();
    register(&f, "alice", serde_json::json!({}));
    f.monitoring
        .record_metric(&AgentId::new("alice"), 99.0, 10.0, None)
        .unwrap();

    let mut rx = f.bus.subscribe();
    f.monitor.alert_once().unwrap();

    let event = rx.recv().await.unwrap();
    assert_eq!(event.event.type_name(), "monitor.alert");
}

#[test]
fn alert_pass_sweeps_stale_agents_offline() {
    let f = fixture();
    register(&f, "alice", serde_json::json!({}));
    f.agents.heartbeat(&AgentId::new("alice")).unwrap();

    f.clock.advance(100_000);
    f.monitor.alert_once().unwrap();
    assert_eq!(
        f.agents.get(&AgentId::new("alice")).unwrap().status,
        kokino_core::AgentStatus::Offline
    );
}

#[test]
fn cleanup_delegates_retention() {
    let f = fixture();
    register(&f, "alice", serde_json::json!({}));
    f.monitoring
        .record_metric(&AgentId::new("alice"), 1.0, 1.0, None)
        .unwrap();
    f.clock.advance(8 * 24 * 60 * 60 * 1000);

    let counts = f.monitor.cleanup_once().unwrap();
    assert_eq!(counts.metrics_deleted, 1);
}

#[tokio::test]
async fn spawned_loops_stop_on_handle() {
    let f = fixture();
    let handle = f.monitor.clone().spawn();
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    handle.stop();
}
