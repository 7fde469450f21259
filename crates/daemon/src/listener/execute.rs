// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Execution handlers: run a turn, cancel, end sessions, overrides.

use super::ListenCtx;
use crate::protocol::{ExecuteSummary, Response};
use kokino_core::{AgentId, CliKind, ConversationId};
use kokino_engine::{DeliveryOptions, EngineError};
use std::sync::Arc;

pub(super) async fn execute(
    ctx: &Arc<ListenCtx>,
    agent_id: &str,
    prompt: &str,
    timeout_ms: Option<i64>,
    conversation_id: Option<String>,
    metadata: Option<serde_json::Value>,
) -> Result<Response, EngineError> {
    let routed = ctx
        .router
        .route(
            &AgentId::new(agent_id),
            prompt,
            DeliveryOptions {
                timeout_ms: timeout_ms.or(Some(ctx.config.execute_timeout_ms)),
                conversation_id: conversation_id.map(ConversationId::new),
                metadata,
                ..Default::default()
            },
        )
        .await?;

    let turn = routed.result.turn;
    Ok(Response::ExecuteResult {
        result: ExecuteSummary {
            response: routed.result.response,
            duration_ms: routed.result.duration_ms,
            mode: routed.mode,
            conversation_id: turn.as_ref().map(|t| t.conversation_id.to_string()),
            turn_id: turn.as_ref().map(|t| t.turn_id),
            session_id: turn.and_then(|t| t.session_id),
        },
    })
}

pub(super) fn cancel(ctx: &Arc<ListenCtx>, agent_id: &str) -> Result<Response, EngineError> {
    ctx.sessions.cancel_execution(&AgentId::new(agent_id))?;
    Ok(Response::Ok)
}

pub(super) fn end_session(ctx: &Arc<ListenCtx>, agent_id: &str) -> Result<Response, EngineError> {
    // Verify the agent exists so typos 404 instead of silently succeeding.
    ctx.agents.get(&AgentId::new(agent_id))?;
    ctx.sessions.end_session(&AgentId::new(agent_id));
    Ok(Response::Ok)
}

pub(super) fn circuit_reset(ctx: &Arc<ListenCtx>, agent_id: &str) -> Result<Response, EngineError> {
    ctx.agents.get(&AgentId::new(agent_id))?;
    ctx.breaker.reset(&AgentId::new(agent_id));
    Ok(Response::Ok)
}

pub(super) fn fallback_agent(
    ctx: &Arc<ListenCtx>,
    agent_id: &str,
    forced: bool,
) -> Result<Response, EngineError> {
    ctx.agents.get(&AgentId::new(agent_id))?;
    if forced {
        ctx.fallback.force_tmux(AgentId::new(agent_id));
    } else {
        ctx.fallback.unforce_tmux(&AgentId::new(agent_id));
    }
    Ok(Response::Ok)
}

pub(super) fn fallback_kind(
    ctx: &Arc<ListenCtx>,
    kind: CliKind,
    disabled: bool,
) -> Result<Response, EngineError> {
    if disabled {
        ctx.fallback.disable_kind(kind);
    } else {
        ctx.fallback.enable_kind(kind);
    }
    Ok(Response::Ok)
}
