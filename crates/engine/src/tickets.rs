// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Ticket service: durable queue plus in-memory long-poll waiters.
//!
//! Waiters rendezvous on a per-ticket `watch` channel: registration happens
//! under the waiter-map lock together with the status check, so a reply
//! posted concurrently can never be missed. All waiters on one ticket are
//! resolved with the same outcome. Replies to inter-agent asks synthesize a
//! reverse ticket so the asker sees the answer as ordinary inbound work.

use crate::bus::EventBus;
use crate::error::EngineError;
use crate::Result;
use kokino_core::{
    AgentId, Clock, Event, IdGen, MessageId, Ticket, TicketId, TicketMetadata, TicketStatus,
};
use kokino_storage::{AgentStore, MessageStore, NewMessage, NewTicket, TicketStore};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// How a waited-on ticket settled.
#[derive(Debug, Clone, PartialEq)]
pub enum TicketOutcome {
    Reply(String),
    TimedOut,
    Cancelled,
}

/// Parameters for creating a ticket.
#[derive(Debug, Clone)]
pub struct TicketRequest {
    pub target: AgentId,
    pub origin: Option<AgentId>,
    pub payload: String,
    pub metadata: TicketMetadata,
    pub expect_reply: bool,
    pub timeout_ms: i64,
}

type WaiterMap = HashMap<TicketId, watch::Sender<Option<TicketOutcome>>>;

/// Durable ticket queue with reply routing and long-poll wait.
#[derive(Clone)]
pub struct TicketService {
    agents: AgentStore,
    store: TicketStore,
    messages: MessageStore,
    waiters: Arc<Mutex<WaiterMap>>,
    bus: EventBus,
    ids: Arc<dyn IdGen>,
    clock: Arc<dyn Clock>,
}

impl TicketService {
    pub fn new(
        agents: AgentStore,
        store: TicketStore,
        messages: MessageStore,
        bus: EventBus,
        ids: Arc<dyn IdGen>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            agents,
            store,
            messages,
            waiters: Arc::new(Mutex::new(HashMap::new())),
            bus,
            ids,
            clock,
        }
    }

    /// Create a pending ticket and its message-log row.
    pub fn enqueue(&self, request: TicketRequest) -> Result<Ticket> {
        if request.payload.is_empty() {
            return Err(EngineError::Validation("ticket payload is empty".into()));
        }
        if request.timeout_ms <= 0 {
            return Err(EngineError::Validation(format!(
                "ticket timeout must be positive, got {}",
                request.timeout_ms
            )));
        }
        // Target must exist before we touch the queue.
        self.agents.get(&request.target)?;

        let ticket_id = TicketId::new(self.ids.next());
        let ticket = self.store.enqueue(NewTicket {
            ticket_id: ticket_id.clone(),
            target_agent: request.target.clone(),
            origin_agent: request.origin.clone(),
            payload: request.payload.clone(),
            metadata: request.metadata.clone(),
            expect_reply: request.expect_reply,
            timeout_ms: request.timeout_ms,
        })?;

        self.log_message(&ticket, &request.payload, "sent", None);

        self.bus.publish(Event::TicketCreated {
            ticket_id,
            target_agent: request.target,
            from_agent: request.origin,
            is_reply: ticket.metadata.is_reply,
        });
        Ok(ticket)
    }

    /// Look up one ticket.
    pub fn get(&self, ticket_id: &TicketId) -> Result<Ticket> {
        Ok(self.store.get(ticket_id)?)
    }

    /// Pending tickets for a target, in creation order.
    pub fn pending(&self, target: &AgentId) -> Result<Vec<Ticket>> {
        self.agents.get(target)?;
        Ok(self.store.pending_for(target)?)
    }

    /// `pending -> delivered`; idempotent when already delivered.
    pub fn acknowledge(&self, ticket_id: &TicketId) -> Result<Ticket> {
        let ticket = self.store.acknowledge(ticket_id)?;
        self.bus.publish(Event::TicketAcknowledged {
            ticket_id: ticket_id.clone(),
            target_agent: ticket.target_agent.clone(),
        });
        Ok(ticket)
    }

    /// Record the reply, wake waiters, and fan out the reverse ticket.
    pub fn post_reply(
        &self,
        ticket_id: &TicketId,
        payload: &str,
        metadata: serde_json::Value,
    ) -> Result<Ticket> {
        let ticket = self.store.respond(ticket_id, payload)?;

        self.resolve_waiters(ticket_id, TicketOutcome::Reply(payload.to_string()));

        let latency_ms = self.clock.now_ms() - ticket.created_at_ms;
        self.log_reply(&ticket, payload, latency_ms, &metadata);

        if ticket.wants_reverse_ticket() {
            if let Err(e) = self.create_reverse_ticket(&ticket, payload) {
                // The reply itself is recorded; a failed reverse ticket is an
                // operational error, not a reason to unwind the reply.
                tracing::error!(
                    ticket_id = %ticket_id,
                    error = %e,
                    "reverse ticket creation failed"
                );
            }
        }

        self.bus.publish(Event::TicketResponded {
            ticket_id: ticket_id.clone(),
            target_agent: ticket.target_agent.clone(),
            from_agent: ticket.origin_agent.clone(),
        });
        Ok(ticket)
    }

    fn create_reverse_ticket(&self, original: &Ticket, payload: &str) -> Result<Ticket> {
        let Some(origin) = original.origin_agent.clone() else {
            return Err(EngineError::Internal(
                "reverse ticket without origin".into(),
            ));
        };

        let mut metadata = TicketMetadata {
            is_reply: true,
            reply_to: Some(original.ticket_id.clone()),
            origin: Some("agent".to_string()),
            ..Default::default()
        };
        metadata.extra.insert(
            "thread".to_string(),
            serde_json::Value::String(thread_of(original)),
        );

        let reverse_id = TicketId::new(self.ids.next());
        let reverse = self.store.enqueue(NewTicket {
            ticket_id: reverse_id.clone(),
            target_agent: origin.clone(),
            origin_agent: Some(original.target_agent.clone()),
            payload: payload.to_string(),
            metadata,
            expect_reply: false,
            timeout_ms: original.timeout_ms,
        })?;

        self.bus.publish(Event::TicketCreated {
            ticket_id: reverse_id,
            target_agent: origin,
            from_agent: Some(original.target_agent.clone()),
            is_reply: true,
        });
        Ok(reverse)
    }

    /// `pending|delivered -> timed_out`; wakes waiters. Idempotent.
    pub fn timeout(&self, ticket_id: &TicketId) -> Result<Ticket> {
        let ticket = self.store.mark_timed_out(ticket_id)?;
        self.resolve_waiters(ticket_id, TicketOutcome::TimedOut);
        self.bus.publish(Event::TicketTimedOut {
            ticket_id: ticket_id.clone(),
            target_agent: ticket.target_agent.clone(),
        });
        Ok(ticket)
    }

    /// `pending -> cancelled`; wakes waiters with a cancellation.
    pub fn cancel(&self, ticket_id: &TicketId) -> Result<Ticket> {
        let ticket = self.store.cancel(ticket_id)?;
        self.resolve_waiters(ticket_id, TicketOutcome::Cancelled);
        self.bus.publish(Event::TicketCancelled {
            ticket_id: ticket_id.clone(),
            target_agent: ticket.target_agent.clone(),
        });
        Ok(ticket)
    }

    /// Long-poll for the ticket's reply.
    ///
    /// A wait started before `post_reply` observes the reply; one started
    /// after a terminal transition returns immediately. The wait's own
    /// deadline expiring does not touch the ticket.
    pub async fn wait(&self, ticket_id: &TicketId, timeout_ms: i64) -> Result<String> {
        let mut rx = {
            let mut waiters = self.waiters.lock();
            // Status check is atomic with waiter registration.
            let ticket = self.store.get(ticket_id)?;
            match ticket.status {
                TicketStatus::Responded => {
                    return Ok(ticket.response.unwrap_or_default());
                }
                TicketStatus::TimedOut => {
                    return Err(EngineError::Timeout { waited_ms: 0 });
                }
                TicketStatus::Cancelled => {
                    return Err(EngineError::Conflict(format!(
                        "ticket {} was cancelled",
                        ticket_id
                    )));
                }
                TicketStatus::Pending | TicketStatus::Delivered => {}
            }
            waiters
                .entry(ticket_id.clone())
                .or_insert_with(|| watch::channel(None).0)
                .subscribe()
        };

        let outcome = tokio::time::timeout(
            Duration::from_millis(timeout_ms.max(0) as u64),
            rx.wait_for(|v| v.is_some()),
        )
        .await;

        match outcome {
            Ok(Ok(value)) => match value.clone() {
                Some(TicketOutcome::Reply(payload)) => Ok(payload),
                Some(TicketOutcome::TimedOut) => Err(EngineError::Timeout {
                    waited_ms: timeout_ms,
                }),
                Some(TicketOutcome::Cancelled) => Err(EngineError::Conflict(format!(
                    "ticket {} was cancelled",
                    ticket_id
                ))),
                None => Err(EngineError::Internal("waiter woke without outcome".into())),
            },
            Ok(Err(_)) => Err(EngineError::Internal("waiter channel closed".into())),
            Err(_) => Err(EngineError::Timeout {
                waited_ms: timeout_ms,
            }),
        }
    }

    fn resolve_waiters(&self, ticket_id: &TicketId, outcome: TicketOutcome) {
        let sender = self.waiters.lock().remove(ticket_id);
        if let Some(sender) = sender {
            let _ = sender.send(Some(outcome));
        }
    }

    /// Transition tickets whose caller deadline passed; returns the count.
    pub fn expire_overdue(&self) -> usize {
        let overdue = match self.store.expired_pending() {
            Ok(tickets) => tickets,
            Err(e) => {
                tracing::warn!(error = %e, "expiry sweep query failed");
                return 0;
            }
        };
        let mut expired = 0;
        for ticket in overdue {
            match self.timeout(&ticket.ticket_id) {
                Ok(_) => expired += 1,
                Err(e) => tracing::warn!(
                    ticket_id = %ticket.ticket_id,
                    error = %e,
                    "expiry transition failed"
                ),
            }
        }
        expired
    }

    /// Hard-delete old settled tickets.
    pub fn cleanup(&self, max_age_ms: i64) -> Result<usize> {
        Ok(self.store.cleanup(max_age_ms)?)
    }

    fn log_message(&self, ticket: &Ticket, payload: &str, status: &str, latency_ms: Option<i64>) {
        let result = self.messages.append(NewMessage {
            message_id: MessageId::new(self.ids.next()),
            from_agent: ticket.origin_agent.clone(),
            to_agent: ticket.target_agent.clone(),
            thread_id: Some(thread_of(ticket)),
            payload: payload.to_string(),
            metadata: serde_json::json!({ "ticket_id": ticket.ticket_id }),
            status: status.to_string(),
            latency_ms,
        });
        match result {
            Ok(row) => self.bus.publish(Event::MessageSent {
                message_id: row.message_id,
                from_agent: row.from_agent,
                to_agent: row.to_agent,
                thread_id: row.thread_id,
            }),
            Err(e) => tracing::warn!(
                ticket_id = %ticket.ticket_id,
                error = %e,
                "message log append failed"
            ),
        }
    }

    fn log_reply(
        &self,
        ticket: &Ticket,
        payload: &str,
        latency_ms: i64,
        _metadata: &serde_json::Value,
    ) {
        // The reply flows from target back to origin; anonymous asks keep
        // the target as the only known party.
        let reply_row = Ticket {
            origin_agent: Some(ticket.target_agent.clone()),
            target_agent: ticket
                .origin_agent
                .clone()
                .unwrap_or_else(|| ticket.target_agent.clone()),
            ..ticket.clone()
        };
        self.log_message(&reply_row, payload, "responded", Some(latency_ms));
    }
}

/// Thread id: the root of the reply chain.
fn thread_of(ticket: &Ticket) -> String {
    ticket
        .metadata
        .reply_to
        .as_ref()
        .map(|t| t.to_string())
        .unwrap_or_else(|| ticket.ticket_id.to_string())
}

#[cfg(test)]
#[path = "tickets_tests.rs"]
mod tests;
