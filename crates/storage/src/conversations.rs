// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Conversation and turn store.
//!
//! Turn append is transactional with the parent's `updated_at` bump, and
//! `created_at` is forced strictly increasing within a conversation so the
//! sequence invariant holds even when the clock does not tick between
//! appends. Role alternation is deliberately NOT enforced at write time;
//! the integrity checker reports it instead (agents legitimately produce
//! multi-assistant bursts).

use crate::db::{parse_metadata, Db};
use crate::{Result, StorageError};
use kokino_core::{AgentId, Clock, Conversation, ConversationId, NewTurn, Role, Turn};
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Conversation persistence with cascade-owned turns.
#[derive(Clone)]
pub struct ConversationStore {
    db: Db,
    clock: Arc<dyn Clock>,
}

impl ConversationStore {
    pub fn new(db: Db, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    /// Create a conversation bound to an agent.
    pub fn create(
        &self,
        conversation_id: &ConversationId,
        agent_id: &AgentId,
        title: Option<&str>,
        metadata: serde_json::Value,
    ) -> Result<Conversation> {
        let now = self.clock.now_ms();
        let meta = serde_json::to_string(&metadata)?;
        self.db.with(|conn| {
            conn.execute(
                "INSERT INTO conversations
                     (conversation_id, agent_id, title, metadata, created_at_ms, updated_at_ms)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                params![
                    conversation_id.as_str(),
                    agent_id.as_str(),
                    title,
                    meta,
                    now
                ],
            )
            .map_err(|e| match e {
                rusqlite::Error::SqliteFailure(err, _)
                    if err.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    StorageError::Conflict(format!(
                        "conversation {} violates a constraint (duplicate id or unknown agent)",
                        conversation_id
                    ))
                }
                other => StorageError::Sqlite(other),
            })?;
            Ok(())
        })?;
        self.get(conversation_id)
    }

    /// Look up one conversation.
    pub fn get(&self, conversation_id: &ConversationId) -> Result<Conversation> {
        self.db.with(|conn| {
            conn.query_row(
                "SELECT conversation_id, agent_id, title, metadata, created_at_ms, updated_at_ms
                 FROM conversations WHERE conversation_id = ?1",
                params![conversation_id.as_str()],
                row_to_conversation,
            )
            .optional()?
            .ok_or_else(|| StorageError::not_found("conversation", conversation_id.as_str()))
        })
    }

    /// All conversations for an agent, most recently updated first.
    pub fn list_for_agent(&self, agent_id: &AgentId) -> Result<Vec<Conversation>> {
        self.db.with(|conn| {
            let mut stmt = conn.prepare(
                "SELECT conversation_id, agent_id, title, metadata, created_at_ms, updated_at_ms
                 FROM conversations WHERE agent_id = ?1
                 ORDER BY updated_at_ms DESC, rowid DESC",
            )?;
            let rows = stmt.query_map(params![agent_id.as_str()], row_to_conversation)?;
            let mut conversations = Vec::new();
            for row in rows {
                conversations.push(row?);
            }
            Ok(conversations)
        })
    }

    /// The agent's most recently updated conversation, if any.
    pub fn most_recent_for_agent(&self, agent_id: &AgentId) -> Result<Option<Conversation>> {
        Ok(self.list_for_agent(agent_id)?.into_iter().next())
    }

    /// Append a turn; bumps the parent's `updated_at` in the same transaction.
    pub fn add_turn(&self, conversation_id: &ConversationId, new: NewTurn) -> Result<Turn> {
        let now = self.clock.now_ms();
        let meta = serde_json::to_string(&new.metadata)?;
        self.db.with_tx(|tx| {
            let exists: Option<String> = tx
                .query_row(
                    "SELECT conversation_id FROM conversations WHERE conversation_id = ?1",
                    params![conversation_id.as_str()],
                    |row| row.get(0),
                )
                .optional()?;
            if exists.is_none() {
                return Err(StorageError::not_found(
                    "conversation",
                    conversation_id.as_str(),
                ));
            }

            // Strictly-increasing created_at within the conversation.
            let last_ts: Option<i64> = tx.query_row(
                "SELECT max(created_at_ms) FROM turns WHERE conversation_id = ?1",
                params![conversation_id.as_str()],
                |row| row.get(0),
            )?;
            let created_at = match last_ts {
                Some(last) if last >= now => last + 1,
                _ => now,
            };

            tx.execute(
                "INSERT INTO turns (conversation_id, role, content, metadata, created_at_ms)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    conversation_id.as_str(),
                    new.role.as_str(),
                    new.content,
                    meta,
                    created_at
                ],
            )?;
            let turn_id = tx.last_insert_rowid();

            tx.execute(
                "UPDATE conversations SET updated_at_ms = ?2 WHERE conversation_id = ?1",
                params![conversation_id.as_str(), now],
            )?;

            Ok(Turn {
                turn_id,
                conversation_id: conversation_id.clone(),
                role: new.role,
                content: new.content,
                metadata: new.metadata,
                created_at_ms: created_at,
            })
        })
    }

    /// All turns of a conversation, ascending turn id.
    pub fn turns(&self, conversation_id: &ConversationId) -> Result<Vec<Turn>> {
        self.db.with(|conn| {
            let mut stmt = conn.prepare(
                "SELECT turn_id, conversation_id, role, content, metadata, created_at_ms
                 FROM turns WHERE conversation_id = ?1 ORDER BY turn_id ASC",
            )?;
            let rows = stmt.query_map(params![conversation_id.as_str()], row_to_turn)?;
            let mut turns = Vec::new();
            for row in rows {
                turns.push(row??);
            }
            Ok(turns)
        })
    }

    /// Delete a conversation; its turns cascade.
    pub fn delete(&self, conversation_id: &ConversationId) -> Result<()> {
        let deleted = self.db.with(|conn| {
            Ok(conn.execute(
                "DELETE FROM conversations WHERE conversation_id = ?1",
                params![conversation_id.as_str()],
            )?)
        })?;
        if deleted == 0 {
            return Err(StorageError::not_found(
                "conversation",
                conversation_id.as_str(),
            ));
        }
        Ok(())
    }

    /// Scan for sequence violations and orphans.
    ///
    /// Orphans cannot arise while foreign keys hold; their presence means
    /// external mutation or a bug, and each one is reported.
    pub fn run_integrity_check(&self) -> Result<IntegrityReport> {
        let mut report = IntegrityReport::default();

        report.orphan_turns = self.db.with(|conn| {
            let mut stmt = conn.prepare(
                "SELECT t.turn_id FROM turns t
                 LEFT JOIN conversations c ON c.conversation_id = t.conversation_id
                 WHERE c.conversation_id IS NULL
                 ORDER BY t.turn_id",
            )?;
            let rows = stmt.query_map([], |row| row.get::<_, i64>(0))?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok(out)
        })?;

        let conversation_ids: Vec<ConversationId> = self.db.with(|conn| {
            let mut stmt =
                conn.prepare("SELECT conversation_id FROM conversations ORDER BY rowid")?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            let mut out = Vec::new();
            for row in rows {
                out.push(ConversationId::new(row?));
            }
            Ok(out)
        })?;

        for conversation_id in conversation_ids {
            let turns = self.turns(&conversation_id)?;
            let issues = check_sequence(&turns);
            if !issues.is_empty() {
                report.conversations.push(ConversationIssues {
                    conversation_id,
                    issues,
                });
            }
        }

        Ok(report)
    }
}

/// Sequence issues within one conversation.
fn check_sequence(turns: &[Turn]) -> Vec<IntegrityIssue> {
    let mut issues = Vec::new();

    if let Some(first) = turns.first() {
        if first.role != Role::User {
            issues.push(IntegrityIssue {
                turn_id: first.turn_id,
                kind: IntegrityIssueKind::FirstTurnNotUser,
                detail: format!("first turn has role {}", first.role),
            });
        }
    }

    for pair in turns.windows(2) {
        let (prev, next) = (&pair[0], &pair[1]);
        // System turns (errors, cancellations) are exempt from alternation.
        if prev.role == next.role && next.role != Role::System {
            issues.push(IntegrityIssue {
                turn_id: next.turn_id,
                kind: IntegrityIssueKind::DuplicateRole,
                detail: format!("consecutive {} turns", next.role),
            });
        }
        if next.created_at_ms <= prev.created_at_ms {
            issues.push(IntegrityIssue {
                turn_id: next.turn_id,
                kind: IntegrityIssueKind::NonMonotonicTimestamp,
                detail: format!(
                    "created_at {} does not advance past {}",
                    next.created_at_ms, prev.created_at_ms
                ),
            });
        }
    }

    issues
}

/// Result of an integrity scan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntegrityReport {
    /// Turn ids with no parent conversation.
    pub orphan_turns: Vec<i64>,
    /// Conversations with at least one sequence issue.
    pub conversations: Vec<ConversationIssues>,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.orphan_turns.is_empty() && self.conversations.is_empty()
    }

    /// Issues that count against the integrity SLO (warnings excluded).
    pub fn violation_count(&self) -> usize {
        self.orphan_turns.len()
            + self
                .conversations
                .iter()
                .flat_map(|c| &c.issues)
                .filter(|i| i.kind != IntegrityIssueKind::FirstTurnNotUser)
                .count()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationIssues {
    pub conversation_id: ConversationId,
    pub issues: Vec<IntegrityIssue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrityIssue {
    pub turn_id: i64,
    pub kind: IntegrityIssueKind,
    pub detail: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrityIssueKind {
    DuplicateRole,
    NonMonotonicTimestamp,
    /// Warning only; does not count against the integrity budget.
    FirstTurnNotUser,
}

fn row_to_conversation(row: &Row<'_>) -> rusqlite::Result<Conversation> {
    let metadata: String = row.get(3)?;
    Ok(Conversation {
        conversation_id: ConversationId::new(row.get::<_, String>(0)?),
        agent_id: AgentId::new(row.get::<_, String>(1)?),
        title: row.get(2)?,
        metadata: parse_metadata(&metadata),
        created_at_ms: row.get(4)?,
        updated_at_ms: row.get(5)?,
    })
}

fn row_to_turn(row: &Row<'_>) -> rusqlite::Result<Result<Turn>> {
    let role: String = row.get(2)?;
    let metadata: String = row.get(4)?;
    let turn = || -> Result<Turn> {
        Ok(Turn {
            turn_id: row.get(0)?,
            conversation_id: ConversationId::new(row.get::<_, String>(1)?),
            role: role.parse().map_err(|detail| StorageError::Corrupt {
                what: "turn",
                detail,
            })?,
            content: row.get(3)?,
            metadata: parse_metadata(&metadata),
            created_at_ms: row.get(5)?,
        })
    };
    Ok(turn())
}

#[cfg(test)]
#[path = "conversations_tests.rs"]
mod tests;
