// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Ticket handlers: create, poll, acknowledge, reply, wait, cancel.
//!
//! Ticket creation also kicks off push delivery: a background task routes
//! the ticket unless the agent is on the tmux (polling) path.

use super::ListenCtx;
use crate::protocol::Response;
use kokino_core::{AgentId, TicketId, TicketMetadata};
use kokino_engine::{EngineError, TicketRequest};
use std::sync::Arc;

#[allow(clippy::too_many_arguments)]
pub(super) fn send(
    ctx: &Arc<ListenCtx>,
    target: String,
    origin: Option<String>,
    payload: String,
    metadata: TicketMetadata,
    expect_reply: bool,
    timeout_ms: Option<i64>,
) -> Result<Response, EngineError> {
    let ticket = ctx.tickets.enqueue(TicketRequest {
        target: AgentId::new(target),
        origin: origin.map(AgentId::new),
        payload,
        metadata,
        expect_reply,
        timeout_ms: timeout_ms.unwrap_or(ctx.config.ticket_timeout_ms),
    })?;

    // Push delivery happens off the request path; pull agents just see the
    // ticket in their pending queue.
    let dispatch_ctx = Arc::clone(ctx);
    let dispatch_ticket = ticket.clone();
    tokio::spawn(async move {
        match dispatch_ctx
            .router
            .dispatch_ticket(&dispatch_ctx.tickets, &dispatch_ticket)
            .await
        {
            Ok(Some(routed)) => {
                tracing::debug!(
                    ticket_id = %dispatch_ticket.ticket_id,
                    mode = %routed.mode,
                    "ticket dispatched"
                );
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(
                    ticket_id = %dispatch_ticket.ticket_id,
                    error = %e,
                    "ticket dispatch failed"
                );
                let _ = dispatch_ctx.monitoring.log_error(
                    Some(&dispatch_ticket.target_agent),
                    "dispatch",
                    &e.to_string(),
                );
            }
        }
    });

    Ok(Response::Ticket { ticket })
}

pub(super) fn pending(ctx: &Arc<ListenCtx>, agent_id: &str) -> Result<Response, EngineError> {
    let tickets = ctx.tickets.pending(&AgentId::new(agent_id))?;
    Ok(Response::Tickets { tickets })
}

pub(super) fn acknowledge(ctx: &Arc<ListenCtx>, ticket_id: &str) -> Result<Response, EngineError> {
    let ticket = ctx.tickets.acknowledge(&TicketId::new(ticket_id))?;
    Ok(Response::Ticket { ticket })
}

pub(super) fn post_reply(
    ctx: &Arc<ListenCtx>,
    ticket_id: &str,
    payload: &str,
    metadata: serde_json::Value,
) -> Result<Response, EngineError> {
    let ticket = ctx
        .tickets
        .post_reply(&TicketId::new(ticket_id), payload, metadata)?;
    Ok(Response::Ticket { ticket })
}

pub(super) async fn wait(
    ctx: &Arc<ListenCtx>,
    ticket_id: &str,
    timeout_ms: i64,
) -> Result<Response, EngineError> {
    if timeout_ms <= 0 {
        return Err(EngineError::Validation(
            "wait timeout must be positive".into(),
        ));
    }
    let payload = ctx.tickets.wait(&TicketId::new(ticket_id), timeout_ms).await?;
    Ok(Response::Reply { payload })
}

pub(super) fn cancel(ctx: &Arc<ListenCtx>, ticket_id: &str) -> Result<Response, EngineError> {
    let ticket = ctx.tickets.cancel(&TicketId::new(ticket_id))?;
    Ok(Response::Ticket { ticket })
}
