// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resource samples, alert events, and the operational error log.
//!
//! Retention: the daily sweep deletes old metrics and events plus resolved
//! errors past the cutoff. Unresolved errors are retained regardless of age
//! so nothing actionable disappears silently.

use crate::db::{parse_metadata, Db};
use crate::{Result, StorageError};
use kokino_core::event::AlertLevel;
use kokino_core::{AgentId, Clock};
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One resource sample for an agent process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMetricRow {
    pub id: i64,
    pub agent_id: AgentId,
    pub cpu_percent: f64,
    pub memory_mb: f64,
    pub pid: Option<i32>,
    pub timestamp_ms: i64,
}

/// One persisted monitoring event (alert or informational).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentEventRow {
    pub id: i64,
    pub agent_id: AgentId,
    pub event_type: String,
    pub message: String,
    pub metadata: serde_json::Value,
    pub timestamp_ms: i64,
}

/// One operational error-log row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorLogRow {
    pub id: i64,
    pub agent_id: Option<AgentId>,
    pub source: String,
    pub message: String,
    pub resolved: bool,
    pub timestamp_ms: i64,
    pub resolved_at_ms: Option<i64>,
}

/// Rows removed by a retention sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupCounts {
    pub metrics_deleted: usize,
    pub events_deleted: usize,
    pub errors_deleted: usize,
}

/// Store for `agent_metrics`, `agent_events`, and `error_logs`.
#[derive(Clone)]
pub struct MonitoringStore {
    db: Db,
    clock: Arc<dyn Clock>,
}

impl MonitoringStore {
    pub fn new(db: Db, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    /// Persist one resource sample.
    pub fn record_metric(
        &self,
        agent_id: &AgentId,
        cpu_percent: f64,
        memory_mb: f64,
        pid: Option<i32>,
    ) -> Result<()> {
        let now = self.clock.now_ms();
        self.db.with(|conn| {
            conn.execute(
                "INSERT INTO agent_metrics (agent_id, cpu_percent, memory_mb, pid, timestamp_ms)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![agent_id.as_str(), cpu_percent, memory_mb, pid, now],
            )?;
            Ok(())
        })
    }

    /// Most recent sample for one agent.
    pub fn latest_metric(&self, agent_id: &AgentId) -> Result<Option<AgentMetricRow>> {
        self.db.with(|conn| {
            Ok(conn
                .query_row(
                    "SELECT id, agent_id, cpu_percent, memory_mb, pid, timestamp_ms
                     FROM agent_metrics WHERE agent_id = ?1
                     ORDER BY timestamp_ms DESC, id DESC LIMIT 1",
                    params![agent_id.as_str()],
                    row_to_metric,
                )
                .optional()?)
        })
    }

    /// Persist a monitoring alert. Critical alerts land as `error` rows.
    pub fn record_alert(
        &self,
        agent_id: &AgentId,
        level: AlertLevel,
        message: &str,
        metadata: serde_json::Value,
    ) -> Result<()> {
        let event_type = match level {
            AlertLevel::Warning => "warning",
            AlertLevel::Critical => "error",
        };
        self.record_event(agent_id, event_type, message, metadata)
    }

    /// Persist a monitoring event with an arbitrary type.
    pub fn record_event(
        &self,
        agent_id: &AgentId,
        event_type: &str,
        message: &str,
        metadata: serde_json::Value,
    ) -> Result<()> {
        let now = self.clock.now_ms();
        let meta = serde_json::to_string(&metadata)?;
        self.db.with(|conn| {
            conn.execute(
                "INSERT INTO agent_events (agent_id, event_type, message, metadata, timestamp_ms)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![agent_id.as_str(), event_type, message, meta, now],
            )
            .map_err(|e| match e {
                rusqlite::Error::SqliteFailure(err, _)
                    if err.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    StorageError::Conflict(format!("unknown event type: {}", event_type))
                }
                other => StorageError::Sqlite(other),
            })?;
            Ok(())
        })
    }

    /// Most recent monitoring events, newest first.
    pub fn recent_events(&self, limit: usize) -> Result<Vec<AgentEventRow>> {
        self.db.with(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, agent_id, event_type, message, metadata, timestamp_ms
                 FROM agent_events ORDER BY timestamp_ms DESC, id DESC LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![limit as i64], row_to_event)?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok(out)
        })
    }

    /// Append to the error log; returns the row id.
    pub fn log_error(
        &self,
        agent_id: Option<&AgentId>,
        source: &str,
        message: &str,
    ) -> Result<i64> {
        let now = self.clock.now_ms();
        self.db.with(|conn| {
            conn.execute(
                "INSERT INTO error_logs (agent_id, source, message, timestamp_ms)
                 VALUES (?1, ?2, ?3, ?4)",
                params![agent_id.map(|a| a.as_str()), source, message, now],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Mark an error resolved.
    pub fn resolve_error(&self, id: i64) -> Result<()> {
        let now = self.clock.now_ms();
        let updated = self.db.with(|conn| {
            Ok(conn.execute(
                "UPDATE error_logs SET resolved = 1, resolved_at_ms = ?2 WHERE id = ?1",
                params![id, now],
            )?)
        })?;
        if updated == 0 {
            return Err(StorageError::not_found("error_log", id.to_string()));
        }
        Ok(())
    }

    /// Count of unresolved errors for one agent.
    pub fn unresolved_count(&self, agent_id: &AgentId) -> Result<i64> {
        self.db.with(|conn| {
            Ok(conn.query_row(
                "SELECT count(*) FROM error_logs WHERE agent_id = ?1 AND resolved = 0",
                params![agent_id.as_str()],
                |row| row.get(0),
            )?)
        })
    }

    /// Unresolved errors, newest first.
    pub fn unresolved_errors(&self, limit: usize) -> Result<Vec<ErrorLogRow>> {
        self.db.with(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, agent_id, source, message, resolved, timestamp_ms, resolved_at_ms
                 FROM error_logs WHERE resolved = 0
                 ORDER BY timestamp_ms DESC, id DESC LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![limit as i64], row_to_error)?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok(out)
        })
    }

    /// Delete metrics/events older than the cutoff, plus resolved errors
    /// older than the same cutoff. Unresolved errors are kept.
    pub fn cleanup(&self, retention_days: i64) -> Result<CleanupCounts> {
        let cutoff = self.clock.now_ms() - retention_days * 24 * 60 * 60 * 1000;
        self.db.with(|conn| {
            let metrics_deleted = conn.execute(
                "DELETE FROM agent_metrics WHERE timestamp_ms < ?1",
                params![cutoff],
            )?;
            let events_deleted = conn.execute(
                "DELETE FROM agent_events WHERE timestamp_ms < ?1",
                params![cutoff],
            )?;
            let errors_deleted = conn.execute(
                "DELETE FROM error_logs WHERE resolved = 1 AND timestamp_ms < ?1",
                params![cutoff],
            )?;
            Ok(CleanupCounts {
                metrics_deleted,
                events_deleted,
                errors_deleted,
            })
        })
    }
}

fn row_to_metric(row: &Row<'_>) -> rusqlite::Result<AgentMetricRow> {
    Ok(AgentMetricRow {
        id: row.get(0)?,
        agent_id: AgentId::new(row.get::<_, String>(1)?),
        cpu_percent: row.get(2)?,
        memory_mb: row.get(3)?,
        pid: row.get(4)?,
        timestamp_ms: row.get(5)?,
    })
}

fn row_to_event(row: &Row<'_>) -> rusqlite::Result<AgentEventRow> {
    let metadata: String = row.get(4)?;
    Ok(AgentEventRow {
        id: row.get(0)?,
        agent_id: AgentId::new(row.get::<_, String>(1)?),
        event_type: row.get(2)?,
        message: row.get(3)?,
        metadata: parse_metadata(&metadata),
        timestamp_ms: row.get(5)?,
    })
}

fn row_to_error(row: &Row<'_>) -> rusqlite::Result<ErrorLogRow> {
    let agent: Option<String> = row.get(1)?;
    Ok(ErrorLogRow {
        id: row.get(0)?,
        agent_id: agent.map(AgentId::new),
        source: row.get(2)?,
        message: row.get(3)?,
        resolved: row.get(4)?,
        timestamp_ms: row.get(5)?,
        resolved_at_ms: row.get(6)?,
    })
}

#[cfg(test)]
#[path = "monitoring_tests.rs"]
mod tests;
