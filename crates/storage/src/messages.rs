// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Message log, unified timeline, and interaction graph.
//!
//! Every ticket create/reply also lands here so observers get a flat
//! cross-agent history. The timeline merges messages with conversation
//! turns in code rather than SQL; result sets are bounded (limit <= 5000)
//! so the merge stays cheap.

use crate::db::{parse_metadata, Db};
use crate::{Result, StorageError};
use kokino_core::{AgentId, Clock, MessageId};
use rusqlite::{params, Row};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Hard cap on timeline page size.
pub const MAX_TIMELINE_LIMIT: usize = 5_000;

/// Parameters for appending to the message log.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub message_id: MessageId,
    pub from_agent: Option<AgentId>,
    pub to_agent: AgentId,
    pub thread_id: Option<String>,
    pub payload: String,
    pub metadata: serde_json::Value,
    pub status: String,
    pub latency_ms: Option<i64>,
}

/// One persisted message-log row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRow {
    pub id: i64,
    pub message_id: MessageId,
    pub from_agent: Option<AgentId>,
    pub to_agent: AgentId,
    pub thread_id: Option<String>,
    pub payload: String,
    pub metadata: serde_json::Value,
    pub status: String,
    pub latency_ms: Option<i64>,
    pub timestamp_ms: i64,
}

/// Entry kinds in the unified timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimelineKind {
    Message,
    Turn,
}

/// One merged timeline entry (message or conversation turn).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub kind: TimelineKind,
    pub timestamp_ms: i64,
    /// Message: sender. Turn: the conversation's agent for assistant turns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub content: String,
}

/// Timeline query filters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimelineFilter {
    #[serde(default)]
    pub from_ms: Option<i64>,
    #[serde(default)]
    pub to_ms: Option<i64>,
    /// Match any of these agents (message from/to, or turn conversation owner).
    #[serde(default)]
    pub agents: Vec<String>,
    #[serde(default)]
    pub types: Vec<TimelineKind>,
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: usize,
}

/// Node in the interaction graph: one agent and its traffic volume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionNode {
    pub agent_id: String,
    pub message_count: i64,
}

/// Directed edge: messages from one agent to another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionEdge {
    pub from_agent: String,
    pub to_agent: String,
    pub count: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_latency_ms: Option<i64>,
}

/// Derived node/edge graph over a time window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InteractionGraph {
    pub nodes: Vec<InteractionNode>,
    pub edges: Vec<InteractionEdge>,
}

/// Append-only message log.
#[derive(Clone)]
pub struct MessageStore {
    db: Db,
    clock: Arc<dyn Clock>,
}

impl MessageStore {
    pub fn new(db: Db, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    /// Append one message-log row.
    pub fn append(&self, new: NewMessage) -> Result<MessageRow> {
        let now = self.clock.now_ms();
        let meta = serde_json::to_string(&new.metadata)?;
        let id = self.db.with(|conn| {
            conn.execute(
                "INSERT INTO messages
                     (message_id, from_agent, to_agent, thread_id, payload, metadata,
                      status, latency_ms, timestamp_ms)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    new.message_id.as_str(),
                    new.from_agent.as_ref().map(|a| a.as_str()),
                    new.to_agent.as_str(),
                    new.thread_id,
                    new.payload,
                    meta,
                    new.status,
                    new.latency_ms,
                    now
                ],
            )
            .map_err(|e| match e {
                rusqlite::Error::SqliteFailure(err, _)
                    if err.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    StorageError::Conflict(format!(
                        "message {} violates a constraint (duplicate id or unknown agent)",
                        new.message_id
                    ))
                }
                other => StorageError::Sqlite(other),
            })?;
            Ok(conn.last_insert_rowid())
        })?;

        Ok(MessageRow {
            id,
            message_id: new.message_id,
            from_agent: new.from_agent,
            to_agent: new.to_agent,
            thread_id: new.thread_id,
            payload: new.payload,
            metadata: new.metadata,
            status: new.status,
            latency_ms: new.latency_ms,
            timestamp_ms: now,
        })
    }

    /// Merged messages + turns, newest first, offset/limit paged.
    pub fn timeline(&self, filter: &TimelineFilter) -> Result<Vec<TimelineEntry>> {
        let limit = filter.limit.unwrap_or(100).min(MAX_TIMELINE_LIMIT);
        let want = |kind: TimelineKind| filter.types.is_empty() || filter.types.contains(&kind);

        let mut entries = Vec::new();
        if want(TimelineKind::Message) {
            entries.extend(self.message_entries(filter)?);
        }
        if want(TimelineKind::Turn) {
            entries.extend(self.turn_entries(filter)?);
        }

        entries.sort_by(|a, b| b.timestamp_ms.cmp(&a.timestamp_ms));
        Ok(entries
            .into_iter()
            .skip(filter.offset)
            .take(limit)
            .collect())
    }

    fn message_entries(&self, filter: &TimelineFilter) -> Result<Vec<TimelineEntry>> {
        let rows = self.db.with(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, message_id, from_agent, to_agent, thread_id, payload,
                        metadata, status, latency_ms, timestamp_ms
                 FROM messages
                 WHERE timestamp_ms >= ?1 AND timestamp_ms <= ?2
                 ORDER BY timestamp_ms DESC",
            )?;
            let rows = stmt.query_map(
                params![
                    filter.from_ms.unwrap_or(0),
                    filter.to_ms.unwrap_or(i64::MAX)
                ],
                row_to_message,
            )?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok(out)
        })?;

        Ok(rows
            .into_iter()
            .filter(|m| match &filter.thread_id {
                Some(thread) => m.thread_id.as_deref() == Some(thread.as_str()),
                None => true,
            })
            .filter(|m| {
                filter.agents.is_empty()
                    || filter
                        .agents
                        .iter()
                        .any(|a| {
                            m.to_agent == a.as_str()
                                || m.from_agent.as_ref().is_some_and(|f| f == a.as_str())
                        })
            })
            .map(|m| TimelineEntry {
                kind: TimelineKind::Message,
                timestamp_ms: m.timestamp_ms,
                from_agent: m.from_agent.map(|a| a.to_string()),
                to_agent: Some(m.to_agent.to_string()),
                thread_id: m.thread_id,
                conversation_id: None,
                role: None,
                content: m.payload,
            })
            .collect())
    }

    fn turn_entries(&self, filter: &TimelineFilter) -> Result<Vec<TimelineEntry>> {
        // Thread filter can never match a turn.
        if filter.thread_id.is_some() {
            return Ok(Vec::new());
        }
        self.db.with(|conn| {
            let mut stmt = conn.prepare(
                "SELECT t.conversation_id, c.agent_id, t.role, t.content, t.created_at_ms
                 FROM turns t
                 JOIN conversations c ON c.conversation_id = t.conversation_id
                 WHERE t.created_at_ms >= ?1 AND t.created_at_ms <= ?2
                 ORDER BY t.created_at_ms DESC",
            )?;
            let rows = stmt.query_map(
                params![
                    filter.from_ms.unwrap_or(0),
                    filter.to_ms.unwrap_or(i64::MAX)
                ],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, i64>(4)?,
                    ))
                },
            )?;
            let mut out = Vec::new();
            for row in rows {
                let (conversation_id, agent_id, role, content, ts) = row?;
                if !filter.agents.is_empty() && !filter.agents.contains(&agent_id) {
                    continue;
                }
                out.push(TimelineEntry {
                    kind: TimelineKind::Turn,
                    timestamp_ms: ts,
                    from_agent: None,
                    to_agent: None,
                    thread_id: None,
                    conversation_id: Some(conversation_id),
                    role: Some(role),
                    content,
                });
            }
            Ok(out)
        })
    }

    /// Aggregate message flow into a node/edge graph over `window_ms`.
    pub fn interactions(&self, window_ms: i64) -> Result<InteractionGraph> {
        let cutoff = self.clock.now_ms() - window_ms;
        let rows: Vec<(Option<String>, String, Option<i64>)> = self.db.with(|conn| {
            let mut stmt = conn.prepare(
                "SELECT from_agent, to_agent, latency_ms FROM messages
                 WHERE timestamp_ms >= ?1",
            )?;
            let rows = stmt.query_map(params![cutoff], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok(out)
        })?;

        let mut node_counts: HashMap<String, i64> = HashMap::new();
        let mut edge_data: HashMap<(String, String), (i64, i64, i64)> = HashMap::new();

        for (from, to, latency) in rows {
            *node_counts.entry(to.clone()).or_default() += 1;
            let Some(from) = from else { continue };
            *node_counts.entry(from.clone()).or_default() += 1;
            let entry = edge_data.entry((from, to)).or_default();
            entry.0 += 1;
            if let Some(lat) = latency {
                entry.1 += lat;
                entry.2 += 1;
            }
        }

        let mut nodes: Vec<InteractionNode> = node_counts
            .into_iter()
            .map(|(agent_id, message_count)| InteractionNode {
                agent_id,
                message_count,
            })
            .collect();
        nodes.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));

        let mut edges: Vec<InteractionEdge> = edge_data
            .into_iter()
            .map(|((from, to), (count, lat_sum, lat_n))| InteractionEdge {
                from_agent: from,
                to_agent: to,
                count,
                avg_latency_ms: (lat_n > 0).then(|| lat_sum / lat_n),
            })
            .collect();
        edges.sort_by(|a, b| {
            (&a.from_agent, &a.to_agent).cmp(&(&b.from_agent, &b.to_agent))
        });

        Ok(InteractionGraph { nodes, edges })
    }
}

fn row_to_message(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    let from: Option<String> = row.get(2)?;
    let metadata: String = row.get(6)?;
    Ok(MessageRow {
        id: row.get(0)?,
        message_id: MessageId::new(row.get::<_, String>(1)?),
        from_agent: from.map(AgentId::new),
        to_agent: AgentId::new(row.get::<_, String>(3)?),
        thread_id: row.get(4)?,
        payload: row.get(5)?,
        metadata: parse_metadata(&metadata),
        status: row.get(7)?,
        latency_ms: row.get(8)?,
        timestamp_ms: row.get(9)?,
    })
}

#[cfg(test)]
#[path = "messages_tests.rs"]
mod tests;
