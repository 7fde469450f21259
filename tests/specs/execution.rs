//! Headless execution: serialization, timeout, cancellation.

use crate::prelude::*;
use kokino_adapters::ScriptedOutcome;
use kokino_core::{AgentId, DeliveryMode, MetricKind, Role};
use kokino_engine::{DeliveryOptions, EngineError};
use std::time::{Duration, Instant};

/// Two concurrent execute calls on one agent serialize: both succeed, the
/// first lock holder's assistant turn has the smaller turn id, and total
/// wall time is roughly the sum of the two turns.
#[tokio::test]
async fn concurrent_turns_serialize_per_agent() {
    let w = world();
    w.register("alice", DeliveryMode::Headless);
    let turn_time = Duration::from_millis(150);
    w.supervisor
        .push(ScriptedOutcome::jsonl_result("A", "s").after(turn_time));
    w.supervisor
        .push(ScriptedOutcome::jsonl_result("B", "s").after(turn_time));

    let started = Instant::now();
    let first = {
        let router = w.router.clone();
        tokio::spawn(async move {
            router
                .route(&AgentId::new("alice"), "A", DeliveryOptions::default())
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(30)).await;
    let second = {
        let router = w.router.clone();
        tokio::spawn(async move {
            router
                .route(&AgentId::new("alice"), "B", DeliveryOptions::default())
                .await
        })
    };

    let a = first.await.unwrap().unwrap();
    let b = second.await.unwrap().unwrap();
    let elapsed = started.elapsed();

    let a_turn = a.result.turn.unwrap();
    let b_turn = b.result.turn.unwrap();
    assert!(a_turn.turn_id < b_turn.turn_id);

    // Serialized: no interleaving in the conversation.
    let turns = w.conversations.turns(&a_turn.conversation_id).unwrap();
    let contents: Vec<&str> = turns.iter().map(|t| t.content.as_str()).collect();
    assert_eq!(contents, vec!["A", "A", "B", "B"]);

    // Wall time is about the sum of both turns (lock wait included).
    assert!(elapsed >= 2 * turn_time);
    assert!(elapsed < 2 * turn_time + Duration::from_millis(400));
}

/// A child that never exits: the call times out, the child is signalled,
/// a system error turn lands, and the lock frees immediately.
#[tokio::test]
async fn execution_timeout_path() {
    let w = world();
    w.register("alice", DeliveryMode::Headless);
    w.supervisor.push(ScriptedOutcome::hangs());
    w.supervisor.push(ScriptedOutcome::jsonl_result("ok", "s"));

    let alice = AgentId::new("alice");
    let started = Instant::now();
    let err = w
        .router
        .route(
            &alice,
            "loop",
            DeliveryOptions {
                timeout_ms: Some(2_000),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::Timeout { .. }));
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(2_000));
    assert!(elapsed < Duration::from_secs(5));

    // Graceful signal reached the child.
    assert!(w.supervisor.signal_counts()[0].0 >= 1);

    // System turn with the timeout error is part of history.
    let conversation = w
        .conversations
        .most_recent_for_agent(&alice)
        .unwrap()
        .unwrap();
    let turns = w.conversations.turns(&conversation.conversation_id).unwrap();
    let last = turns.last().unwrap();
    assert_eq!(last.role, Role::System);
    assert_eq!(last.content, "Error: timeout");
    assert_eq!(last.metadata["error"], true);

    assert_eq!(w.telemetry.count_of(MetricKind::ExecTimeout), 1);

    // Lock released: the next execute acquires immediately.
    let ok = w
        .router
        .route(&alice, "again", DeliveryOptions::default())
        .await
        .unwrap();
    assert_eq!(ok.result.response, "ok");
}

#[tokio::test]
async fn cancellation_stops_the_turn_and_records_it() {
    let w = world();
    w.register("alice", DeliveryMode::Headless);
    w.supervisor.push(ScriptedOutcome::hangs());

    let alice = AgentId::new("alice");
    let call = {
        let router = w.router.clone();
        let id = alice.clone();
        tokio::spawn(async move {
            router
                .route(&id, "long job", DeliveryOptions::default())
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    w.sessions.cancel_execution(&alice).unwrap();

    assert!(call.await.unwrap().is_err());
    let conversation = w
        .conversations
        .most_recent_for_agent(&alice)
        .unwrap()
        .unwrap();
    let turns = w.conversations.turns(&conversation.conversation_id).unwrap();
    assert_eq!(turns.last().unwrap().content, "Error: cancelled");
    assert_eq!(w.telemetry.count_of(MetricKind::ExecCancelled), 1);
}

#[tokio::test]
async fn session_id_continuity_survives_lock_cycles() {
    let w = world();
    w.register("alice", DeliveryMode::Headless);
    w.supervisor.push(ScriptedOutcome::jsonl_result("one", "cli-sess"));
    w.supervisor.push(ScriptedOutcome::jsonl_result("two", "cli-sess"));

    let alice = AgentId::new("alice");
    w.router
        .route(&alice, "first", DeliveryOptions::default())
        .await
        .unwrap();
    w.router
        .route(&alice, "second", DeliveryOptions::default())
        .await
        .unwrap();

    let spawns = w.supervisor.spawned();
    assert!(spawns[0].args.iter().any(|a| a == "--session-id"));
    assert!(spawns[1]
        .args
        .windows(2)
        .any(|win| win == ["--resume", "cli-sess"]));
}
