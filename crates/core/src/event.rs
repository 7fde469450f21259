// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lifecycle events fanned out to observers.
//!
//! Serializes with `{"type": "area.name", ...fields}` format; the prefix
//! before the dot is the filterable base type. Unknown type tags
//! deserialize to `Custom`.

use crate::agent::{AgentStatus, CliKind, DeliveryMode};
use crate::conversation::{ConversationId, Role};
use crate::id::{AgentId, ClientId, MessageId, TicketId};
use serde::{Deserialize, Serialize};

/// Events emitted on the broker's bus and broadcast to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    // -- agent --
    #[serde(rename = "agent.registered")]
    AgentRegistered { agent_id: AgentId, kind: CliKind },

    #[serde(rename = "agent.deleted")]
    AgentDeleted { agent_id: AgentId },

    #[serde(rename = "agent.heartbeat")]
    AgentHeartbeat { agent_id: AgentId },

    #[serde(rename = "agent.status")]
    AgentStatusChanged {
        agent_id: AgentId,
        status: AgentStatus,
    },

    // -- ticket --
    #[serde(rename = "ticket.created")]
    TicketCreated {
        ticket_id: TicketId,
        target_agent: AgentId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from_agent: Option<AgentId>,
        is_reply: bool,
    },

    #[serde(rename = "ticket.acknowledged")]
    TicketAcknowledged {
        ticket_id: TicketId,
        target_agent: AgentId,
    },

    #[serde(rename = "ticket.responded")]
    TicketResponded {
        ticket_id: TicketId,
        target_agent: AgentId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from_agent: Option<AgentId>,
    },

    #[serde(rename = "ticket.timed_out")]
    TicketTimedOut {
        ticket_id: TicketId,
        target_agent: AgentId,
    },

    #[serde(rename = "ticket.cancelled")]
    TicketCancelled {
        ticket_id: TicketId,
        target_agent: AgentId,
    },

    // -- message log --
    #[serde(rename = "message.sent")]
    MessageSent {
        message_id: MessageId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from_agent: Option<AgentId>,
        to_agent: AgentId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        thread_id: Option<String>,
    },

    // -- conversation --
    #[serde(rename = "conversation.turn")]
    ConversationTurn {
        conversation_id: ConversationId,
        agent_id: AgentId,
        role: Role,
        turn_id: i64,
    },

    // -- execution --
    #[serde(rename = "exec.started")]
    ExecStarted {
        agent_id: AgentId,
        cli_kind: CliKind,
        prompt_snippet: String,
    },

    #[serde(rename = "exec.completed")]
    ExecCompleted {
        agent_id: AgentId,
        duration_ms: i64,
        success: bool,
    },

    #[serde(rename = "exec.failed")]
    ExecFailed { agent_id: AgentId, error: String },

    #[serde(rename = "exec.timeout")]
    ExecTimeout { agent_id: AgentId, timeout_ms: i64 },

    #[serde(rename = "exec.cancelled")]
    ExecCancelled { agent_id: AgentId },

    // -- session --
    #[serde(rename = "session.lock_acquired")]
    LockAcquired { agent_id: AgentId, waited_ms: i64 },

    #[serde(rename = "session.lock_timeout")]
    LockTimeout { agent_id: AgentId, waited_ms: i64 },

    #[serde(rename = "session.ended")]
    SessionEnded { agent_id: AgentId },

    // -- circuit breaker --
    #[serde(rename = "circuit.opened")]
    CircuitOpened { agent_id: AgentId, failures: u32 },

    #[serde(rename = "circuit.half_open")]
    CircuitHalfOpen { agent_id: AgentId },

    #[serde(rename = "circuit.recovered")]
    CircuitRecovered { agent_id: AgentId },

    #[serde(rename = "circuit.recovery_failed")]
    CircuitRecoveryFailed { agent_id: AgentId },

    #[serde(rename = "circuit.reset")]
    CircuitReset { agent_id: AgentId },

    // -- delivery / shadow --
    #[serde(rename = "delivery.routed")]
    DeliveryRouted {
        agent_id: AgentId,
        mode: DeliveryMode,
        reason: String,
    },

    #[serde(rename = "shadow.mismatch")]
    ShadowMismatch {
        agent_id: AgentId,
        ticket_id: TicketId,
    },

    #[serde(rename = "shadow.headless_failure")]
    ShadowHeadlessFailure {
        agent_id: AgentId,
        ticket_id: TicketId,
        error: String,
    },

    #[serde(rename = "shadow.tmux_failure")]
    ShadowTmuxFailure {
        agent_id: AgentId,
        ticket_id: TicketId,
        error: String,
    },

    // -- monitoring --
    #[serde(rename = "monitor.alert")]
    MonitorAlert {
        agent_id: AgentId,
        level: AlertLevel,
        message: String,
    },

    #[serde(rename = "monitor.subscriber_lagged")]
    SubscriberLagged { client_id: ClientId },

    /// Catch-all for unknown event types (extensibility)
    #[serde(other, skip_serializing)]
    Custom,
}

/// Severity of a monitoring alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertLevel {
    Warning,
    Critical,
}

impl AlertLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertLevel::Warning => "warning",
            AlertLevel::Critical => "critical",
        }
    }
}

impl Event {
    /// The wire `type` tag (e.g. `ticket.created`).
    pub fn type_name(&self) -> &'static str {
        match self {
            Event::AgentRegistered { .. } => "agent.registered",
            Event::AgentDeleted { .. } => "agent.deleted",
            Event::AgentHeartbeat { .. } => "agent.heartbeat",
            Event::AgentStatusChanged { .. } => "agent.status",
            Event::TicketCreated { .. } => "ticket.created",
            Event::TicketAcknowledged { .. } => "ticket.acknowledged",
            Event::TicketResponded { .. } => "ticket.responded",
            Event::TicketTimedOut { .. } => "ticket.timed_out",
            Event::TicketCancelled { .. } => "ticket.cancelled",
            Event::MessageSent { .. } => "message.sent",
            Event::ConversationTurn { .. } => "conversation.turn",
            Event::ExecStarted { .. } => "exec.started",
            Event::ExecCompleted { .. } => "exec.completed",
            Event::ExecFailed { .. } => "exec.failed",
            Event::ExecTimeout { .. } => "exec.timeout",
            Event::ExecCancelled { .. } => "exec.cancelled",
            Event::LockAcquired { .. } => "session.lock_acquired",
            Event::LockTimeout { .. } => "session.lock_timeout",
            Event::SessionEnded { .. } => "session.ended",
            Event::CircuitOpened { .. } => "circuit.opened",
            Event::CircuitHalfOpen { .. } => "circuit.half_open",
            Event::CircuitRecovered { .. } => "circuit.recovered",
            Event::CircuitRecoveryFailed { .. } => "circuit.recovery_failed",
            Event::CircuitReset { .. } => "circuit.reset",
            Event::DeliveryRouted { .. } => "delivery.routed",
            Event::ShadowMismatch { .. } => "shadow.mismatch",
            Event::ShadowHeadlessFailure { .. } => "shadow.headless_failure",
            Event::ShadowTmuxFailure { .. } => "shadow.tmux_failure",
            Event::MonitorAlert { .. } => "monitor.alert",
            Event::SubscriberLagged { .. } => "monitor.subscriber_lagged",
            Event::Custom => "custom",
        }
    }

    /// The base type for filter matching (prefix before the dot).
    pub fn base_type(&self) -> &'static str {
        let name = self.type_name();
        name.split('.').next().unwrap_or(name)
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
