// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::stream::MonitorStream;
use futures_util::{Stream, StreamExt};
use kokino_core::{AgentId, Event, FakeClock, SequentialIdGen};
use kokino_engine::EventBus;
use std::sync::Arc;

async fn start() -> (MonitorStream, EventBus, String, Arc<Notify>) {
    let clock = Arc::new(FakeClock::new(1_000));
    let bus = EventBus::new(clock.clone());
    let stream = MonitorStream::new(bus.clone(), Arc::new(SequentialIdGen::new("c")), clock);
    tokio::spawn(stream.clone().run());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Arc::new(Notify::new());
    tokio::spawn(run_ws_listener(listener, stream.clone(), shutdown.clone()));

    (stream, bus, format!("ws://{}", addr), shutdown)
}

async fn next_json(
    ws: &mut (impl Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin),
) -> serde_json::Value {
    loop {
        match ws.next().await.unwrap().unwrap() {
            Message::Text(text) => return serde_json::from_str(&text).unwrap(),
            _ => continue,
        }
    }
}

#[tokio::test]
async fn client_receives_connected_then_events() {
    let (_stream, bus, url, _shutdown) = start().await;
    let (mut ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();

    let hello = next_json(&mut ws).await;
    assert_eq!(hello["type"], "connected");

    bus.publish(Event::SessionEnded {
        agent_id: AgentId::new("alice"),
    });
    let event = next_json(&mut ws).await;
    assert_eq!(event["type"], "session.ended");
    assert_eq!(event["data"]["agent_id"], "alice");
}

#[tokio::test]
async fn set_filters_is_confirmed_and_applied() {
    let (_stream, bus, url, _shutdown) = start().await;
    let (mut ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
    next_json(&mut ws).await;

    ws.send(Message::Text(
        r#"{"op":"setFilters","types":["circuit"]}"#.into(),
    ))
    .await
    .unwrap();
    let confirm = next_json(&mut ws).await;
    assert_eq!(confirm["type"], "filter-updated");

    bus.publish(Event::SessionEnded {
        agent_id: AgentId::new("alice"),
    });
    bus.publish(Event::CircuitOpened {
        agent_id: AgentId::new("alice"),
        failures: 5,
    });

    // Only the circuit event arrives.
    let event = next_json(&mut ws).await;
    assert_eq!(event["type"], "circuit.opened");
}

#[tokio::test]
async fn disconnect_removes_subscriber() {
    let (stream, _bus, url, _shutdown) = start().await;
    let (mut ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
    next_json(&mut ws).await;
    assert_eq!(stream.subscriber_count(), 1);

    ws.close(None).await.unwrap();
    for _ in 0..100 {
        if stream.subscriber_count() == 0 {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    panic!("subscriber never removed");
}

#[tokio::test]
async fn shutdown_sends_goodbye() {
    let (stream, _bus, url, _shutdown) = start().await;
    let (mut ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
    next_json(&mut ws).await;

    stream.shutdown("bye");
    let bye = next_json(&mut ws).await;
    assert_eq!(bye["type"], "shutdown");
    assert_eq!(bye["message"], "bye");
}
