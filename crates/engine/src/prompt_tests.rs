// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use kokino_core::test_support::AgentRecordBuilder;

#[test]
fn layers_appear_in_order() {
    let agent = AgentRecordBuilder::new("alice")
        .metadata(serde_json::json!({ "role": "reviewer", "systemPrompt": "Be terse." }))
        .build();
    let prompt = build_prompt(&PromptContext {
        agent: &agent,
        payload: "check this diff",
        origin: None,
    });

    let identity = prompt.find("[AGENT IDENTITY]").unwrap();
    let context = prompt.find("[KOKINO CONTEXT]").unwrap();
    let payload = prompt.find("check this diff").unwrap();
    assert!(identity < context && context < payload);

    assert!(prompt.contains("You are agent 'alice' with role: reviewer."));
    assert!(prompt.contains("Be terse."));
    assert!(prompt.ends_with("check this diff"));
}

#[test]
fn role_defaults_and_system_prompt_is_optional() {
    let agent = AgentRecordBuilder::new("bob").build();
    let prompt = build_prompt(&PromptContext {
        agent: &agent,
        payload: "hi",
        origin: None,
    });
    assert!(prompt.contains("with role: agent."));
    assert!(!prompt.contains("systemPrompt"));
}

#[test]
fn origin_line_present_for_inter_agent_asks() {
    let agent = AgentRecordBuilder::new("bob").build();
    let alice = AgentId::new("alice");
    let prompt = build_prompt(&PromptContext {
        agent: &agent,
        payload: "ping",
        origin: Some(&alice),
    });
    assert!(prompt.contains("from agent 'alice'"));
}
