// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

// Tests that need a live tmux server run with the daemon's end-to-end
// suite; here we cover naming and the paths that fail before tmux runs.

#[parameterized(
    plain = { "alice", "alice" },
    dots_and_colons = { "team.lead:v2", "team-lead-v2" },
    unicode_flattens = { "agent 7", "agent-7" },
    runs_collapse = { "a//b", "a-b" },
    edges_trimmed = { ".alice.", "alice" },
    underscores_kept = { "code_review", "code_review" },
)]
fn pane_names_are_tmux_safe(agent_id: &str, expected: &str) {
    assert_eq!(pane_name(agent_id), expected);
}

#[test]
fn pane_names_are_bounded() {
    let long = "x".repeat(200);
    assert_eq!(pane_name(&long).len(), 40);
}

#[tokio::test]
async fn open_pane_rejects_missing_working_directory() {
    let term = TmuxBackend::new();
    let err = term
        .open_pane(
            &kokino_core::AgentId::new("alice"),
            "claude",
            Path::new("/definitely/not/a/dir"),
        )
        .await
        .unwrap_err();
    match err {
        TermError::SpawnFailed(message) => assert!(message.contains("working directory")),
        other => panic!("unexpected error: {}", other),
    }
}
