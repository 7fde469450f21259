// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Ticket types and status machine.
//!
//! A ticket is one durable unit of work targeted at one agent. Status moves
//! monotonically through the machine below; `responded`, `timed_out`, and
//! `cancelled` are terminal.
//!
//! ```text
//!  pending ──acknowledge──▶ delivered ──post_reply──▶ responded
//!     │                        │
//!     └──timeout──▶ timed_out ◀┘
//!     │
//!     └──cancel──▶ cancelled
//! ```

use crate::id::{AgentId, TicketId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle state of a ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Pending,
    Delivered,
    Responded,
    TimedOut,
    Cancelled,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Pending => "pending",
            TicketStatus::Delivered => "delivered",
            TicketStatus::Responded => "responded",
            TicketStatus::TimedOut => "timed_out",
            TicketStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TicketStatus::Responded | TicketStatus::TimedOut | TicketStatus::Cancelled
        )
    }

    /// Whether the machine permits moving from `self` to `to`.
    ///
    /// `responded` is reachable only from `delivered`; `cancelled` only from
    /// `pending`; `timed_out` from either non-terminal state.
    pub fn can_transition(&self, to: TicketStatus) -> bool {
        use TicketStatus::*;
        matches!(
            (self, to),
            (Pending, Delivered)
                | (Pending, TimedOut)
                | (Pending, Cancelled)
                | (Delivered, Responded)
                | (Delivered, TimedOut)
        )
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TicketStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TicketStatus::Pending),
            "delivered" => Ok(TicketStatus::Delivered),
            "responded" => Ok(TicketStatus::Responded),
            "timed_out" => Ok(TicketStatus::TimedOut),
            "cancelled" => Ok(TicketStatus::Cancelled),
            other => Err(format!("unknown ticket status: {}", other)),
        }
    }
}

/// Structured ticket metadata.
///
/// `is_reply`/`reply_to` mark reverse tickets synthesized when an agent
/// answers another agent. Everything else rides in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TicketMetadata {
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_reply: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<TicketId>,
    /// Where the ticket came from (e.g. `ui`, `agent`, `cron`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// One durable unit of work targeted at one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub ticket_id: TicketId,
    pub target_agent: AgentId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_agent: Option<AgentId>,
    pub payload: String,
    #[serde(default)]
    pub metadata: TicketMetadata,
    pub expect_reply: bool,
    pub timeout_ms: i64,
    pub status: TicketStatus,
    /// Present iff `status == Responded`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

impl Ticket {
    /// A reply must route back when the asker is a different agent.
    pub fn wants_reverse_ticket(&self) -> bool {
        match &self.origin_agent {
            Some(origin) => *origin != self.target_agent,
            None => false,
        }
    }
}

#[cfg(test)]
#[path = "ticket_tests.rs"]
mod tests;
