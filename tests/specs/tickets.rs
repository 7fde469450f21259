//! Ticket queue and reverse-ticket reply routing.

use crate::prelude::*;
use kokino_core::{AgentId, DeliveryMode, TicketStatus};
use std::time::{Duration, Instant};

/// Alice asks Bob; Bob polls, replies; Alice sees exactly one reverse
/// ticket carrying the reply. Ten rounds, no duplicates, well under 10s.
#[tokio::test]
async fn ping_pong_through_reverse_tickets() {
    let w = world();
    w.register("alice", DeliveryMode::Tmux);
    w.register("bob", DeliveryMode::Tmux);
    let started = Instant::now();

    for round in 0..10 {
        let ticket = w
            .tickets
            .enqueue(w.ticket("bob", Some("alice"), "hi"))
            .unwrap();

        // Bob polls and sees exactly one pending ticket with that payload.
        let pending = w.tickets.pending(&AgentId::new("bob")).unwrap();
        assert_eq!(pending.len(), 1, "round {round}");
        assert_eq!(pending[0].payload, "hi");
        assert_eq!(pending[0].ticket_id, ticket.ticket_id);

        w.tickets.acknowledge(&ticket.ticket_id).unwrap();
        w.tickets
            .post_reply(&ticket.ticket_id, "hello", serde_json::json!({}))
            .unwrap();

        // Alice polls and sees exactly one reverse ticket.
        let inbound = w.tickets.pending(&AgentId::new("alice")).unwrap();
        assert_eq!(inbound.len(), 1, "round {round}");
        let reverse = &inbound[0];
        assert!(reverse.metadata.is_reply);
        assert_eq!(reverse.metadata.reply_to.as_ref().unwrap(), &ticket.ticket_id);
        assert_eq!(reverse.payload, "hello");

        // Consume the reverse ticket so the next round starts clean.
        w.tickets.acknowledge(&reverse.ticket_id).unwrap();
    }

    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn waiters_started_before_reply_observe_it() {
    let w = world();
    w.register("alice", DeliveryMode::Tmux);
    w.register("bob", DeliveryMode::Tmux);

    let ticket = w
        .tickets
        .enqueue(w.ticket("bob", Some("alice"), "question"))
        .unwrap();
    w.tickets.acknowledge(&ticket.ticket_id).unwrap();

    let service = w.tickets.clone();
    let id = ticket.ticket_id.clone();
    let waiter = tokio::spawn(async move { service.wait(&id, 5_000).await });
    tokio::time::sleep(Duration::from_millis(50)).await;

    w.tickets
        .post_reply(&ticket.ticket_id, "answer", serde_json::json!({}))
        .unwrap();
    assert_eq!(waiter.await.unwrap().unwrap(), "answer");

    // A wait started after the terminal state returns without blocking.
    let started = Instant::now();
    assert_eq!(
        w.tickets.wait(&ticket.ticket_id, 5_000).await.unwrap(),
        "answer"
    );
    assert!(started.elapsed() < Duration::from_millis(100));
}

#[tokio::test]
async fn terminal_transitions_are_idempotent() {
    let w = world();
    w.register("bob", DeliveryMode::Tmux);

    let ticket = w.tickets.enqueue(w.ticket("bob", None, "x")).unwrap();
    w.tickets.acknowledge(&ticket.ticket_id).unwrap();
    // Acknowledge on delivered is a no-op.
    let again = w.tickets.acknowledge(&ticket.ticket_id).unwrap();
    assert_eq!(again.status, TicketStatus::Delivered);

    w.tickets.timeout(&ticket.ticket_id).unwrap();
    // Timeout on timed_out is a no-op.
    let again = w.tickets.timeout(&ticket.ticket_id).unwrap();
    assert_eq!(again.status, TicketStatus::TimedOut);

    // And the reply window is closed for good.
    assert!(w
        .tickets
        .post_reply(&ticket.ticket_id, "late", serde_json::json!({}))
        .is_err());
}

/// Operator override: a forced-tmux agent goes back to the polling path,
/// so pushed tickets stay pending for it.
#[tokio::test]
async fn forced_tmux_agents_keep_tickets_for_polling() {
    let w = world();
    w.register("alice", DeliveryMode::Headless);
    w.fallback.force_tmux(AgentId::new("alice"));

    let ticket = w.tickets.enqueue(w.ticket("alice", None, "work")).unwrap();
    let routed = w
        .router
        .dispatch_ticket(&w.tickets, &ticket)
        .await
        .unwrap();
    assert!(routed.is_none());
    assert_eq!(
        w.tickets.get(&ticket.ticket_id).unwrap().status,
        TicketStatus::Pending
    );
}

#[tokio::test]
async fn cascade_delete_removes_all_agent_data() {
    let w = world();
    w.register("alice", DeliveryMode::Tmux);
    w.register("bob", DeliveryMode::Tmux);

    let ticket = w
        .tickets
        .enqueue(w.ticket("bob", Some("alice"), "hi"))
        .unwrap();
    w.tickets.acknowledge(&ticket.ticket_id).unwrap();
    w.tickets
        .post_reply(&ticket.ticket_id, "yo", serde_json::json!({}))
        .unwrap();

    w.agents.delete(&AgentId::new("bob")).unwrap();

    // Bob's tickets are gone and integrity still holds.
    assert!(w.tickets.get(&ticket.ticket_id).is_err());
    assert!(w.conversations.run_integrity_check().unwrap().is_clean());
}
