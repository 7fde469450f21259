// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test builders shared across crates.

use crate::agent::{AgentRecord, AgentStatus, CliKind, DeliveryMode};
use crate::id::AgentId;
use crate::ticket::{Ticket, TicketMetadata, TicketStatus};

/// Builder for an [`AgentRecord`] with sensible defaults.
pub struct AgentRecordBuilder {
    record: AgentRecord,
}

impl AgentRecordBuilder {
    pub fn new(agent_id: impl Into<String>) -> Self {
        Self {
            record: AgentRecord {
                agent_id: AgentId::new(agent_id),
                kind: CliKind::Mock,
                status: AgentStatus::Online,
                delivery_mode: DeliveryMode::Headless,
                metadata: serde_json::json!({}),
                heartbeat_interval_ms: 30_000,
                last_heartbeat_ms: None,
                created_at_ms: 0,
                updated_at_ms: 0,
            },
        }
    }

    pub fn kind(mut self, kind: CliKind) -> Self {
        self.record.kind = kind;
        self
    }

    pub fn delivery_mode(mut self, mode: DeliveryMode) -> Self {
        self.record.delivery_mode = mode;
        self
    }

    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.record.metadata = metadata;
        self
    }

    pub fn build(self) -> AgentRecord {
        self.record
    }
}

/// Builder for a [`Ticket`] with sensible defaults.
pub struct TicketBuilder {
    ticket: Ticket,
}

impl TicketBuilder {
    pub fn new(ticket_id: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            ticket: Ticket {
                ticket_id: crate::id::TicketId::new(ticket_id),
                target_agent: AgentId::new(target),
                origin_agent: None,
                payload: "ping".to_string(),
                metadata: TicketMetadata::default(),
                expect_reply: false,
                timeout_ms: 30_000,
                status: TicketStatus::Pending,
                response: None,
                created_at_ms: 0,
                updated_at_ms: 0,
            },
        }
    }

    pub fn origin(mut self, origin: impl Into<String>) -> Self {
        self.ticket.origin_agent = Some(AgentId::new(origin));
        self
    }

    pub fn payload(mut self, payload: impl Into<String>) -> Self {
        self.ticket.payload = payload.into();
        self
    }

    pub fn expect_reply(mut self, expect: bool) -> Self {
        self.ticket.expect_reply = expect;
        self
    }

    pub fn build(self) -> Ticket {
        self.ticket
    }
}
