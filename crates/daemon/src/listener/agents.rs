// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent registry handlers.

use super::ListenCtx;
use crate::protocol::{AgentSummary, Response};
use kokino_core::{AgentId, CliKind, DeliveryMode, Event};
use kokino_engine::EngineError;
use std::sync::Arc;

pub(super) fn register(
    ctx: &Arc<ListenCtx>,
    agent_id: &str,
    kind: CliKind,
    delivery_mode: Option<DeliveryMode>,
    metadata: serde_json::Value,
    heartbeat_interval_ms: i64,
) -> Result<Response, EngineError> {
    if agent_id.is_empty() || agent_id.chars().any(char::is_whitespace) {
        return Err(EngineError::Validation(format!(
            "agent id must be non-empty without whitespace, got {:?}",
            agent_id
        )));
    }
    if heartbeat_interval_ms <= 0 {
        return Err(EngineError::Validation(
            "heartbeat interval must be positive".into(),
        ));
    }
    let metadata = match metadata {
        serde_json::Value::Null => serde_json::json!({}),
        serde_json::Value::Object(map) => serde_json::Value::Object(map),
        other => {
            return Err(EngineError::Validation(format!(
                "metadata must be an object, got {}",
                other
            )))
        }
    };

    let agent_id = AgentId::new(agent_id);
    let agent = ctx.agents.register(
        &agent_id,
        kind,
        delivery_mode.unwrap_or(DeliveryMode::Headless),
        metadata,
        heartbeat_interval_ms,
    )?;
    ctx.bus.publish(Event::AgentRegistered {
        agent_id,
        kind,
    });
    Ok(Response::Agent { agent })
}

pub(super) fn delete(ctx: &Arc<ListenCtx>, agent_id: &str) -> Result<Response, EngineError> {
    let agent_id = AgentId::new(agent_id);
    ctx.sessions.end_session(&agent_id);
    ctx.agents.delete(&agent_id)?;
    ctx.bus.publish(Event::AgentDeleted {
        agent_id,
    });
    Ok(Response::Ok)
}

pub(super) fn heartbeat(ctx: &Arc<ListenCtx>, agent_id: &str) -> Result<Response, EngineError> {
    let agent_id = AgentId::new(agent_id);
    ctx.agents.heartbeat(&agent_id)?;
    ctx.bus.publish(Event::AgentHeartbeat { agent_id });
    Ok(Response::Ok)
}

pub(super) fn list(ctx: &Arc<ListenCtx>) -> Result<Response, EngineError> {
    let mut summaries = Vec::new();
    for agent in ctx.agents.list()? {
        let pending = ctx.tickets.pending(&agent.agent_id)?.len();
        summaries.push(AgentSummary {
            session: ctx.sessions.session(&agent.agent_id),
            circuit: ctx.breaker.snapshot(&agent.agent_id),
            pending_tickets: pending,
            agent,
        });
    }
    Ok(Response::Agents { agents: summaries })
}
