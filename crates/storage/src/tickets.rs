// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable ticket store.
//!
//! Rows follow the ticket status machine in `kokino_core::ticket`; illegal
//! transitions surface as `IllegalTransition` and terminal repeats of
//! `acknowledge`/`timeout`/`cancel` are no-ops. Waiter wake-up lives in the
//! engine; this store is purely the durable half.

use crate::db::Db;
use crate::{Result, StorageError};
use kokino_core::{AgentId, Clock, Ticket, TicketId, TicketMetadata, TicketStatus};
use rusqlite::{params, OptionalExtension, Row};
use std::sync::Arc;

/// Parameters for enqueuing a new ticket.
#[derive(Debug, Clone)]
pub struct NewTicket {
    pub ticket_id: TicketId,
    pub target_agent: AgentId,
    pub origin_agent: Option<AgentId>,
    pub payload: String,
    pub metadata: TicketMetadata,
    pub expect_reply: bool,
    pub timeout_ms: i64,
}

/// Persistent ticket queue.
#[derive(Clone)]
pub struct TicketStore {
    db: Db,
    clock: Arc<dyn Clock>,
}

impl TicketStore {
    pub fn new(db: Db, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    /// Insert a new pending ticket.
    pub fn enqueue(&self, new: NewTicket) -> Result<Ticket> {
        let now = self.clock.now_ms();
        let meta = serde_json::to_string(&new.metadata)?;
        self.db.with(|conn| {
            conn.execute(
                "INSERT INTO tickets
                     (ticket_id, target_agent, origin_agent, payload, metadata,
                      expect_reply, timeout_ms, status, created_at_ms, updated_at_ms)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'pending', ?8, ?8)",
                params![
                    new.ticket_id.as_str(),
                    new.target_agent.as_str(),
                    new.origin_agent.as_ref().map(|a| a.as_str()),
                    new.payload,
                    meta,
                    new.expect_reply,
                    new.timeout_ms,
                    now
                ],
            )
            .map_err(|e| match e {
                rusqlite::Error::SqliteFailure(err, _)
                    if err.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    StorageError::Conflict(format!(
                        "ticket {} violates a constraint (duplicate id or unknown target)",
                        new.ticket_id
                    ))
                }
                other => StorageError::Sqlite(other),
            })?;
            Ok(())
        })?;
        self.get(&new.ticket_id)
    }

    /// Look up one ticket.
    pub fn get(&self, ticket_id: &TicketId) -> Result<Ticket> {
        self.db.with(|conn| {
            conn.query_row(
                &format!("{} WHERE ticket_id = ?1", SELECT_TICKET),
                params![ticket_id.as_str()],
                row_to_ticket,
            )
            .optional()?
            .ok_or_else(|| StorageError::not_found("ticket", ticket_id.as_str()))?
        })
    }

    /// All pending tickets for a target, in creation order.
    pub fn pending_for(&self, target: &AgentId) -> Result<Vec<Ticket>> {
        self.db.with(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{} WHERE target_agent = ?1 AND status = 'pending'
                 ORDER BY created_at_ms ASC, rowid ASC",
                SELECT_TICKET
            ))?;
            let rows = stmt.query_map(params![target.as_str()], row_to_ticket)?;
            let mut tickets = Vec::new();
            for row in rows {
                tickets.push(row??);
            }
            Ok(tickets)
        })
    }

    /// `pending -> delivered`. Idempotent if already delivered.
    pub fn acknowledge(&self, ticket_id: &TicketId) -> Result<Ticket> {
        self.transition(ticket_id, TicketStatus::Delivered, None)
    }

    /// `delivered -> responded`, recording the reply payload.
    pub fn respond(&self, ticket_id: &TicketId, response: &str) -> Result<Ticket> {
        self.transition(ticket_id, TicketStatus::Responded, Some(response))
    }

    /// `pending|delivered -> timed_out`. Idempotent if already timed out.
    pub fn mark_timed_out(&self, ticket_id: &TicketId) -> Result<Ticket> {
        self.transition(ticket_id, TicketStatus::TimedOut, None)
    }

    /// `pending -> cancelled`. Idempotent if already cancelled.
    pub fn cancel(&self, ticket_id: &TicketId) -> Result<Ticket> {
        self.transition(ticket_id, TicketStatus::Cancelled, None)
    }

    fn transition(
        &self,
        ticket_id: &TicketId,
        to: TicketStatus,
        response: Option<&str>,
    ) -> Result<Ticket> {
        let now = self.clock.now_ms();
        self.db.with_tx(|tx| {
            let ticket = tx
                .query_row(
                    &format!("{} WHERE ticket_id = ?1", SELECT_TICKET),
                    params![ticket_id.as_str()],
                    row_to_ticket,
                )
                .optional()?
                .ok_or_else(|| StorageError::not_found("ticket", ticket_id.as_str()))??;

            // Repeating a terminal transition is a no-op; responded is not,
            // a second reply must conflict.
            if ticket.status == to && to != TicketStatus::Responded {
                return Ok(ticket);
            }
            if !ticket.status.can_transition(to) {
                return Err(StorageError::IllegalTransition {
                    what: "ticket",
                    from: ticket.status.as_str().to_string(),
                    to: to.as_str().to_string(),
                });
            }

            tx.execute(
                "UPDATE tickets SET status = ?2, response = ?3, updated_at_ms = ?4
                 WHERE ticket_id = ?1",
                params![ticket_id.as_str(), to.as_str(), response, now],
            )?;

            let mut updated = ticket;
            updated.status = to;
            updated.response = response.map(String::from);
            updated.updated_at_ms = now;
            Ok(updated)
        })
    }

    /// Hard-delete non-pending tickets older than `max_age_ms`.
    pub fn cleanup(&self, max_age_ms: i64) -> Result<usize> {
        let cutoff = self.clock.now_ms() - max_age_ms;
        self.db.with(|conn| {
            Ok(conn.execute(
                "DELETE FROM tickets WHERE status != 'pending' AND updated_at_ms < ?1",
                params![cutoff],
            )?)
        })
    }

    /// Pending tickets whose caller deadline has passed.
    pub fn expired_pending(&self) -> Result<Vec<Ticket>> {
        let now = self.clock.now_ms();
        self.db.with(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{} WHERE status IN ('pending','delivered')
                   AND created_at_ms + timeout_ms < ?1",
                SELECT_TICKET
            ))?;
            let rows = stmt.query_map(params![now], row_to_ticket)?;
            let mut tickets = Vec::new();
            for row in rows {
                tickets.push(row??);
            }
            Ok(tickets)
        })
    }
}

const SELECT_TICKET: &str = "SELECT ticket_id, target_agent, origin_agent, payload, metadata,
        expect_reply, timeout_ms, status, response, created_at_ms, updated_at_ms
 FROM tickets";

fn row_to_ticket(row: &Row<'_>) -> rusqlite::Result<Result<Ticket>> {
    let ticket_id: String = row.get(0)?;
    let target: String = row.get(1)?;
    let origin: Option<String> = row.get(2)?;
    let payload: String = row.get(3)?;
    let metadata: String = row.get(4)?;
    let expect_reply: bool = row.get(5)?;
    let timeout_ms: i64 = row.get(6)?;
    let status: String = row.get(7)?;
    let response: Option<String> = row.get(8)?;
    let created_at_ms: i64 = row.get(9)?;
    let updated_at_ms: i64 = row.get(10)?;

    Ok(build_ticket(
        ticket_id,
        target,
        origin,
        payload,
        metadata,
        expect_reply,
        timeout_ms,
        status,
        response,
        created_at_ms,
        updated_at_ms,
    ))
}

#[allow(clippy::too_many_arguments)]
fn build_ticket(
    ticket_id: String,
    target: String,
    origin: Option<String>,
    payload: String,
    metadata: String,
    expect_reply: bool,
    timeout_ms: i64,
    status: String,
    response: Option<String>,
    created_at_ms: i64,
    updated_at_ms: i64,
) -> Result<Ticket> {
    let metadata: TicketMetadata = serde_json::from_str(&metadata).unwrap_or_default();
    Ok(Ticket {
        ticket_id: TicketId::new(ticket_id),
        target_agent: AgentId::new(target),
        origin_agent: origin.map(AgentId::new),
        payload,
        metadata,
        expect_reply,
        timeout_ms,
        status: status.parse().map_err(|detail| StorageError::Corrupt {
            what: "ticket",
            detail,
        })?,
        response,
        created_at_ms,
        updated_at_ms,
    })
}

#[cfg(test)]
#[path = "tickets_tests.rs"]
mod tests;
