// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent registry store.

use crate::db::{parse_metadata, Db};
use crate::{Result, StorageError};
use kokino_core::{AgentId, AgentRecord, AgentStatus, CliKind, Clock, DeliveryMode};
use rusqlite::{params, OptionalExtension, Row};
use std::sync::Arc;

/// CRUD and liveness tracking for registered agents.
#[derive(Clone)]
pub struct AgentStore {
    db: Db,
    clock: Arc<dyn Clock>,
}

impl AgentStore {
    pub fn new(db: Db, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    /// Register an agent, or refresh an existing registration.
    ///
    /// Re-registration updates kind/mode/metadata and flips the agent back
    /// online; created_at is preserved.
    pub fn register(
        &self,
        agent_id: &AgentId,
        kind: CliKind,
        delivery_mode: DeliveryMode,
        metadata: serde_json::Value,
        heartbeat_interval_ms: i64,
    ) -> Result<AgentRecord> {
        let now = self.clock.now_ms();
        let meta = serde_json::to_string(&metadata)?;
        self.db.with(|conn| {
            conn.execute(
                "INSERT INTO agents
                     (agent_id, kind, status, delivery_mode, metadata,
                      heartbeat_interval_ms, created_at_ms, updated_at_ms)
                 VALUES (?1, ?2, 'online', ?3, ?4, ?5, ?6, ?6)
                 ON CONFLICT(agent_id) DO UPDATE SET
                     kind = excluded.kind,
                     status = 'online',
                     delivery_mode = excluded.delivery_mode,
                     metadata = excluded.metadata,
                     heartbeat_interval_ms = excluded.heartbeat_interval_ms,
                     updated_at_ms = excluded.updated_at_ms",
                params![
                    agent_id.as_str(),
                    kind.as_str(),
                    delivery_mode.as_str(),
                    meta,
                    heartbeat_interval_ms,
                    now
                ],
            )?;
            Ok(())
        })?;
        self.get(agent_id)
    }

    /// Look up one agent.
    pub fn get(&self, agent_id: &AgentId) -> Result<AgentRecord> {
        self.db.with(|conn| {
            conn.query_row(
                "SELECT agent_id, kind, status, delivery_mode, metadata,
                        heartbeat_interval_ms, last_heartbeat_ms,
                        created_at_ms, updated_at_ms
                 FROM agents WHERE agent_id = ?1",
                params![agent_id.as_str()],
                row_to_agent,
            )
            .optional()?
            .ok_or_else(|| StorageError::not_found("agent", agent_id.as_str()))?
        })
    }

    /// All agents, registration order.
    pub fn list(&self) -> Result<Vec<AgentRecord>> {
        self.db.with(|conn| {
            let mut stmt = conn.prepare(
                "SELECT agent_id, kind, status, delivery_mode, metadata,
                        heartbeat_interval_ms, last_heartbeat_ms,
                        created_at_ms, updated_at_ms
                 FROM agents ORDER BY created_at_ms, agent_id",
            )?;
            let rows = stmt.query_map([], row_to_agent)?;
            let mut agents = Vec::new();
            for row in rows {
                agents.push(row??);
            }
            Ok(agents)
        })
    }

    /// Agents currently marked online.
    pub fn list_online(&self) -> Result<Vec<AgentRecord>> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|a| a.status == AgentStatus::Online)
            .collect())
    }

    /// Record a heartbeat: bumps the liveness instant and flips back online.
    pub fn heartbeat(&self, agent_id: &AgentId) -> Result<()> {
        let now = self.clock.now_ms();
        let updated = self.db.with(|conn| {
            Ok(conn.execute(
                "UPDATE agents
                 SET last_heartbeat_ms = ?2, status = 'online', updated_at_ms = ?2
                 WHERE agent_id = ?1",
                params![agent_id.as_str(), now],
            )?)
        })?;
        if updated == 0 {
            return Err(StorageError::not_found("agent", agent_id.as_str()));
        }
        Ok(())
    }

    /// Set the agent's status.
    pub fn set_status(&self, agent_id: &AgentId, status: AgentStatus) -> Result<()> {
        let now = self.clock.now_ms();
        let updated = self.db.with(|conn| {
            Ok(conn.execute(
                "UPDATE agents SET status = ?2, updated_at_ms = ?3 WHERE agent_id = ?1",
                params![agent_id.as_str(), status.as_str(), now],
            )?)
        })?;
        if updated == 0 {
            return Err(StorageError::not_found("agent", agent_id.as_str()));
        }
        Ok(())
    }

    /// Change the delivery mode (operator action).
    pub fn set_delivery_mode(&self, agent_id: &AgentId, mode: DeliveryMode) -> Result<()> {
        let now = self.clock.now_ms();
        let updated = self.db.with(|conn| {
            Ok(conn.execute(
                "UPDATE agents SET delivery_mode = ?2, updated_at_ms = ?3 WHERE agent_id = ?1",
                params![agent_id.as_str(), mode.as_str(), now],
            )?)
        })?;
        if updated == 0 {
            return Err(StorageError::not_found("agent", agent_id.as_str()));
        }
        Ok(())
    }

    /// Delete an agent; tickets, messages, conversations, and turns cascade.
    pub fn delete(&self, agent_id: &AgentId) -> Result<()> {
        let deleted = self.db.with(|conn| {
            Ok(conn.execute(
                "DELETE FROM agents WHERE agent_id = ?1",
                params![agent_id.as_str()],
            )?)
        })?;
        if deleted == 0 {
            return Err(StorageError::not_found("agent", agent_id.as_str()));
        }
        Ok(())
    }

    /// Mark online agents with stale heartbeats offline.
    ///
    /// Returns the ids flipped. Agents that never sent a heartbeat are left
    /// alone (registration counts as presence until the first interval).
    pub fn sweep_offline(&self) -> Result<Vec<AgentId>> {
        let now = self.clock.now_ms();
        let stale: Vec<AgentId> = self
            .list_online()?
            .into_iter()
            .filter(|a| a.heartbeat_stale(now))
            .map(|a| a.agent_id)
            .collect();
        for agent_id in &stale {
            self.set_status(agent_id, AgentStatus::Offline)?;
        }
        Ok(stale)
    }
}

fn row_to_agent(row: &Row<'_>) -> rusqlite::Result<Result<AgentRecord>> {
    let agent_id: String = row.get(0)?;
    let kind: String = row.get(1)?;
    let status: String = row.get(2)?;
    let delivery_mode: String = row.get(3)?;
    let metadata: String = row.get(4)?;

    Ok(build_agent(
        agent_id,
        kind,
        status,
        delivery_mode,
        metadata,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
    ))
}

#[allow(clippy::too_many_arguments)]
fn build_agent(
    agent_id: String,
    kind: String,
    status: String,
    delivery_mode: String,
    metadata: String,
    heartbeat_interval_ms: i64,
    last_heartbeat_ms: Option<i64>,
    created_at_ms: i64,
    updated_at_ms: i64,
) -> Result<AgentRecord> {
    Ok(AgentRecord {
        agent_id: AgentId::new(agent_id),
        kind: kind.parse().map_err(|detail| StorageError::Corrupt {
            what: "agent",
            detail,
        })?,
        status: status.parse().map_err(|detail| StorageError::Corrupt {
            what: "agent",
            detail,
        })?,
        delivery_mode: delivery_mode
            .parse()
            .map_err(|detail| StorageError::Corrupt {
                what: "agent",
                detail,
            })?,
        metadata: parse_metadata(&metadata),
        heartbeat_interval_ms,
        last_heartbeat_ms,
        created_at_ms,
        updated_at_ms,
    })
}

#[cfg(test)]
#[path = "agents_tests.rs"]
mod tests;
