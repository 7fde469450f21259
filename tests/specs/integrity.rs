//! Conversation store integrity checking.

use crate::prelude::*;
use kokino_core::{AgentId, ConversationId, DeliveryMode, NewTurn, Role};
use kokino_storage::IntegrityIssueKind;

/// A freshly initialized store reports zero orphans and zero issues.
#[tokio::test]
async fn clean_store_reports_nothing() {
    let w = world();
    let report = w.conversations.run_integrity_check().unwrap();
    assert!(report.orphan_turns.is_empty());
    assert!(report.conversations.is_empty());
    assert_eq!(report.violation_count(), 0);
}

/// Two consecutive assistant turns produce exactly one duplicate-role
/// issue, anchored at the second turn.
#[tokio::test]
async fn duplicate_assistant_turns_are_reported() {
    let w = world();
    w.register("alice", DeliveryMode::Headless);

    let conversation_id = ConversationId::new("c-1");
    w.conversations
        .create(
            &conversation_id,
            &AgentId::new("alice"),
            None,
            serde_json::json!({}),
        )
        .unwrap();

    w.conversations
        .add_turn(&conversation_id, NewTurn::new(Role::User, "question"))
        .unwrap();
    w.conversations
        .add_turn(&conversation_id, NewTurn::new(Role::Assistant, "first"))
        .unwrap();
    let second = w
        .conversations
        .add_turn(&conversation_id, NewTurn::new(Role::Assistant, "second"))
        .unwrap();

    let report = w.conversations.run_integrity_check().unwrap();
    assert!(report.orphan_turns.is_empty());
    assert_eq!(report.conversations.len(), 1);
    let issues = &report.conversations[0].issues;
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].kind, IntegrityIssueKind::DuplicateRole);
    assert_eq!(issues[0].turn_id, second.turn_id);

    // The burst is allowed at write time; only the checker reports it.
    assert_eq!(
        w.conversations.turns(&conversation_id).unwrap().len(),
        3
    );
}

/// Sequence invariants hold for store-assigned ids and timestamps even
/// under rapid appends.
#[tokio::test]
async fn writes_preserve_sequence_invariants() {
    let w = world();
    w.register("alice", DeliveryMode::Headless);

    let conversation_id = ConversationId::new("c-1");
    w.conversations
        .create(
            &conversation_id,
            &AgentId::new("alice"),
            None,
            serde_json::json!({}),
        )
        .unwrap();

    for i in 0..20 {
        let role = if i % 2 == 0 { Role::User } else { Role::Assistant };
        w.conversations
            .add_turn(&conversation_id, NewTurn::new(role, format!("turn {i}")))
            .unwrap();
    }

    let turns = w.conversations.turns(&conversation_id).unwrap();
    for pair in turns.windows(2) {
        assert!(pair[0].turn_id < pair[1].turn_id);
        assert!(pair[0].created_at_ms < pair[1].created_at_ms);
    }
    assert!(w.conversations.run_integrity_check().unwrap().is_clean());
}
