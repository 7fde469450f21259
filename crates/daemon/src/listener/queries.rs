// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Conversation and monitoring query handlers.

use super::ListenCtx;
use crate::protocol::{Response, TimeRange};
use kokino_core::{AgentId, ConversationId, MetricKind, MetricRecord};
use kokino_engine::EngineError;
use kokino_storage::TimelineFilter;
use std::sync::Arc;

pub(super) fn conversation(
    ctx: &Arc<ListenCtx>,
    conversation_id: &str,
) -> Result<Response, EngineError> {
    let conversation_id = ConversationId::new(conversation_id);
    let conversation = ctx.conversations.get(&conversation_id)?;
    let turns = ctx.conversations.turns(&conversation_id)?;
    Ok(Response::Conversation {
        conversation,
        turns,
    })
}

pub(super) fn conversations(ctx: &Arc<ListenCtx>, agent_id: &str) -> Result<Response, EngineError> {
    let agent_id = AgentId::new(agent_id);
    ctx.agents.get(&agent_id)?;
    let conversations = ctx.conversations.list_for_agent(&agent_id)?;
    Ok(Response::Conversations { conversations })
}

pub(super) fn integrity_check(ctx: &Arc<ListenCtx>) -> Result<Response, EngineError> {
    let report = ctx.conversations.run_integrity_check()?;

    // Violations are alerted, never auto-repaired.
    let violations = report.violation_count();
    if violations > 0 {
        tracing::error!(violations, "integrity check found violations");
        for _ in 0..violations {
            ctx.telemetry.record(MetricRecord::new(
                MetricKind::IntegrityViolation,
                ctx.clock.now_ms(),
            ));
        }
        let _ = ctx.monitoring.log_error(
            None,
            "integrity",
            &format!("integrity check found {} violations", violations),
        );
    }
    Ok(Response::Integrity { report })
}

pub(super) fn timeline(
    ctx: &Arc<ListenCtx>,
    filter: TimelineFilter,
) -> Result<Response, EngineError> {
    let entries = ctx.messages.timeline(&filter)?;
    Ok(Response::Timeline { entries })
}

pub(super) fn interactions(
    ctx: &Arc<ListenCtx>,
    time_range: TimeRange,
) -> Result<Response, EngineError> {
    let graph = ctx.messages.interactions(time_range.window_ms())?;
    Ok(Response::Interactions { graph })
}
