// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Layered bootstrap prompt for headless turns.
//!
//! Three layers: the agent's identity header, the team context, and the
//! caller's payload. The identity block carries the producer-declared role
//! and system prompt from the agent's metadata.

use kokino_core::{AgentId, AgentRecord};

/// What goes into one prompt.
pub struct PromptContext<'a> {
    pub agent: &'a AgentRecord,
    pub payload: &'a str,
    /// Present for inter-agent tickets; names the asking agent.
    pub origin: Option<&'a AgentId>,
}

/// Assemble the full prompt text.
pub fn build_prompt(ctx: &PromptContext<'_>) -> String {
    let role = ctx.agent.role().unwrap_or("agent");
    let mut prompt = String::new();

    prompt.push_str("[AGENT IDENTITY]\n");
    prompt.push_str(&format!(
        "You are agent '{}' with role: {}.\n",
        ctx.agent.agent_id, role
    ));
    if let Some(system_prompt) = ctx.agent.system_prompt() {
        prompt.push_str(system_prompt);
        prompt.push('\n');
    }
    prompt.push_str("[END AGENT IDENTITY]\n\n");

    prompt.push_str("[KOKINO CONTEXT]\n");
    prompt.push_str(
        "You are part of a multi-agent team. Use co_workers() / send_message() / post_reply().\n",
    );
    if let Some(origin) = ctx.origin {
        prompt.push_str(&format!(
            "This message is from agent '{}'; answer with post_reply().\n",
            origin
        ));
    }
    prompt.push_str("[END KOKINO CONTEXT]\n\n");

    prompt.push_str(ctx.payload);
    prompt
}

#[cfg(test)]
#[path = "prompt_tests.rs"]
mod tests;
