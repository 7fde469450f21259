// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Telemetry store: append-only metric events plus SLI computations.
//!
//! Lives in its own database file so retention can differ from the
//! operational store. Writes are a single prepared statement; reads scan
//! the indexed window and aggregate in code. Neutral defaults on empty
//! windows: availability 1.0, percentiles 0.

use crate::{Result, StorageError};
use kokino_core::{Clock, MetricKind, MetricRecord};
use parking_lot::Mutex;
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// Availability SLO target.
const AVAILABILITY_TARGET: f64 = 0.995;
/// Latency SLO target and threshold.
const LATENCY_TARGET: f64 = 0.95;
const LATENCY_THRESHOLD_MS: i64 = 30_000;
/// Correctness (shadow match) SLO target.
const CORRECTNESS_TARGET: f64 = 0.95;
/// Integrity SLO target: zero tolerance.
const INTEGRITY_TARGET: f64 = 1.0;

/// Which SLO an error budget is computed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Slo {
    Availability,
    Latency,
    Correctness,
    Integrity,
}

impl std::str::FromStr for Slo {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "availability" => Ok(Slo::Availability),
            "latency" => Ok(Slo::Latency),
            "correctness" => Ok(Slo::Correctness),
            "integrity" => Ok(Slo::Integrity),
            other => Err(format!("unknown slo: {}", other)),
        }
    }
}

/// Error budget for one SLO over a window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBudget {
    pub sli: Slo,
    pub target: f64,
    /// Events considered in the window.
    pub total: i64,
    /// Allowed failures: `round(total * (1 - target))`.
    pub budget: i64,
    pub consumed: i64,
    pub remaining: i64,
    pub percent_consumed: f64,
}

/// Per-endpoint latency rollup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointStats {
    pub requests: i64,
    pub success_rate: f64,
    pub min_ms: i64,
    pub avg_ms: i64,
    pub max_ms: i64,
    pub p50_ms: i64,
    pub p95_ms: i64,
    pub p99_ms: i64,
}

/// One hourly bucket of execution counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateBucket {
    pub hour_start_ms: i64,
    pub count: i64,
}

/// The telemetry database.
#[derive(Clone)]
pub struct TelemetryStore {
    conn: Arc<Mutex<Connection>>,
    clock: Arc<dyn Clock>,
}

impl TelemetryStore {
    /// Open (or create) the telemetry database at `path`.
    pub fn open(path: &Path, clock: Arc<dyn Clock>) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn, clock)
    }

    /// In-memory telemetry store for tests.
    pub fn open_in_memory(clock: Arc<dyn Clock>) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn, clock)
    }

    fn from_connection(conn: Connection, clock: Arc<dyn Clock>) -> Result<Self> {
        conn.query_row("PRAGMA journal_mode = WAL", [], |_row| Ok(()))?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS metrics (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                event TEXT NOT NULL,
                agent_id TEXT,
                cli_kind TEXT,
                duration_ms INTEGER,
                success INTEGER,
                metadata TEXT NOT NULL DEFAULT '{}',
                timestamp_ms INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_metrics_event_ts ON metrics(event, timestamp_ms);
            CREATE INDEX IF NOT EXISTS idx_metrics_agent ON metrics(agent_id);
            "#,
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            clock,
        })
    }

    /// Append one metric row.
    pub fn append(&self, record: &MetricRecord) -> Result<()> {
        let meta = serde_json::to_string(&record.metadata)?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO metrics
                 (event, agent_id, cli_kind, duration_ms, success, metadata, timestamp_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.event.as_str(),
                record.agent_id.as_ref().map(|a| a.as_str()),
                record.cli_kind.map(|k| k.as_str()),
                record.duration_ms,
                record.success,
                meta,
                record.timestamp_ms
            ],
        )?;
        Ok(())
    }

    fn window_cutoff(&self, window_hours: i64) -> i64 {
        self.clock.now_ms() - window_hours * 60 * 60 * 1000
    }

    /// Fraction of terminal executions that succeeded; 1.0 on an empty window.
    ///
    /// Rows with `success` NULL are "not applicable" and excluded from the
    /// denominator.
    pub fn availability(&self, window_hours: i64) -> Result<f64> {
        let cutoff = self.window_cutoff(window_hours);
        let conn = self.conn.lock();
        let (total, successes): (i64, i64) = conn.query_row(
            "SELECT count(*), coalesce(sum(success), 0) FROM metrics
             WHERE event IN ('exec_completed','exec_failed','exec_timeout')
               AND success IS NOT NULL AND timestamp_ms >= ?1",
            params![cutoff],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        if total == 0 {
            return Ok(1.0);
        }
        Ok(successes as f64 / total as f64)
    }

    /// Latency percentile over completed executions; 0 on an empty window.
    ///
    /// Rank is `ceil(p/100 * n) - 1` over durations sorted ascending.
    pub fn latency_percentile(&self, p: u8, window_hours: i64) -> Result<i64> {
        let cutoff = self.window_cutoff(window_hours);
        let durations = {
            let conn = self.conn.lock();
            let mut stmt = conn.prepare(
                "SELECT duration_ms FROM metrics
                 WHERE event = 'exec_completed' AND duration_ms IS NOT NULL
                   AND timestamp_ms >= ?1
                 ORDER BY duration_ms ASC",
            )?;
            let rows = stmt.query_map(params![cutoff], |row| row.get::<_, i64>(0))?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            out
        };
        Ok(percentile(&durations, p))
    }

    /// Error budget for one SLO over the window.
    pub fn error_budget(&self, sli: Slo, window_hours: i64) -> Result<ErrorBudget> {
        let cutoff = self.window_cutoff(window_hours);
        let (target, total, consumed) = match sli {
            Slo::Availability => {
                let (total, successes) = self.count_terminal(cutoff)?;
                (AVAILABILITY_TARGET, total, total - successes)
            }
            Slo::Latency => {
                let conn = self.conn.lock();
                let (total, over): (i64, i64) = conn.query_row(
                    "SELECT count(*),
                            coalesce(sum(CASE WHEN duration_ms > ?2 THEN 1 ELSE 0 END), 0)
                     FROM metrics
                     WHERE event = 'exec_completed' AND duration_ms IS NOT NULL
                       AND timestamp_ms >= ?1",
                    params![cutoff, LATENCY_THRESHOLD_MS],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )?;
                (LATENCY_TARGET, total, over)
            }
            Slo::Correctness => {
                let total = self.count_event(MetricKind::ShadowCompared, cutoff)?;
                let mismatches = self.count_event(MetricKind::ShadowMismatch, cutoff)?;
                (CORRECTNESS_TARGET, total, mismatches)
            }
            Slo::Integrity => {
                let violations = self.count_event(MetricKind::IntegrityViolation, cutoff)?;
                (INTEGRITY_TARGET, violations, violations)
            }
        };

        let budget = (total as f64 * (1.0 - target)).round() as i64;
        let remaining = (budget - consumed).max(0);
        let percent_consumed = if budget > 0 {
            consumed as f64 / budget as f64 * 100.0
        } else if consumed > 0 {
            // Zero budget and anything consumed saturates.
            100.0
        } else {
            0.0
        };

        Ok(ErrorBudget {
            sli,
            target,
            total,
            budget,
            consumed,
            remaining,
            percent_consumed,
        })
    }

    /// Per-endpoint rollups over `request` events.
    ///
    /// The endpoint path rides in `metadata.path`.
    pub fn endpoint_percentiles(
        &self,
        window_hours: i64,
    ) -> Result<BTreeMap<String, EndpointStats>> {
        let cutoff = self.window_cutoff(window_hours);
        let rows: Vec<(String, Option<i64>, Option<bool>)> = {
            let conn = self.conn.lock();
            let mut stmt = conn.prepare(
                "SELECT metadata, duration_ms, success FROM metrics
                 WHERE event = 'request' AND timestamp_ms >= ?1",
            )?;
            let rows = stmt.query_map(params![cutoff], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<i64>>(1)?,
                    row.get::<_, Option<bool>>(2)?,
                ))
            })?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            out
        };

        let mut grouped: BTreeMap<String, (Vec<i64>, i64, i64)> = BTreeMap::new();
        for (metadata, duration, success) in rows {
            let path = serde_json::from_str::<serde_json::Value>(&metadata)
                .ok()
                .and_then(|v| v.get("path").and_then(|p| p.as_str()).map(String::from));
            let Some(path) = path else { continue };
            let entry = grouped.entry(path).or_default();
            if let Some(d) = duration {
                entry.0.push(d);
            }
            // success: NULL = not applicable, excluded from the rate.
            match success {
                Some(true) => {
                    entry.1 += 1;
                    entry.2 += 1;
                }
                Some(false) => entry.2 += 1,
                None => {}
            }
        }

        let mut out = BTreeMap::new();
        for (path, (mut durations, successes, rated)) in grouped {
            durations.sort_unstable();
            let requests = durations.len() as i64;
            let sum: i64 = durations.iter().sum();
            out.insert(
                path,
                EndpointStats {
                    requests,
                    success_rate: if rated > 0 {
                        successes as f64 / rated as f64
                    } else {
                        1.0
                    },
                    min_ms: durations.first().copied().unwrap_or(0),
                    avg_ms: if requests > 0 { sum / requests } else { 0 },
                    max_ms: durations.last().copied().unwrap_or(0),
                    p50_ms: percentile(&durations, 50),
                    p95_ms: percentile(&durations, 95),
                    p99_ms: percentile(&durations, 99),
                },
            );
        }
        Ok(out)
    }

    /// Execution counts per hour bucket, oldest first.
    pub fn execution_rate(&self, window_hours: i64) -> Result<Vec<RateBucket>> {
        let cutoff = self.window_cutoff(window_hours);
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT (timestamp_ms / 3600000) * 3600000 AS hour, count(*)
             FROM metrics
             WHERE event IN ('exec_completed','exec_failed','exec_timeout')
               AND timestamp_ms >= ?1
             GROUP BY hour ORDER BY hour ASC",
        )?;
        let rows = stmt.query_map(params![cutoff], |row| {
            Ok(RateBucket {
                hour_start_ms: row.get(0)?,
                count: row.get(1)?,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Recent failure events for the errors endpoint, newest first.
    pub fn recent_failures(&self, window_hours: i64, limit: usize) -> Result<Vec<MetricRecord>> {
        let cutoff = self.window_cutoff(window_hours);
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT event, agent_id, cli_kind, duration_ms, success, metadata, timestamp_ms
             FROM metrics
             WHERE event IN ('exec_failed','exec_timeout','spawn_error','process_failed',
                             'limit_exceeded','zombie_killed')
               AND timestamp_ms >= ?1
             ORDER BY timestamp_ms DESC, id DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![cutoff, limit as i64], row_to_record)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row??);
        }
        Ok(out)
    }

    /// Count of events of one kind in the window.
    pub fn count_kind(&self, kind: MetricKind, window_hours: i64) -> Result<i64> {
        let cutoff = self.window_cutoff(window_hours);
        self.count_event(kind, cutoff)
    }

    /// Delete events older than the retention cutoff; returns rows removed.
    pub fn cleanup(&self, retention_days: i64) -> Result<usize> {
        let cutoff = self.clock.now_ms() - retention_days * 24 * 60 * 60 * 1000;
        let conn = self.conn.lock();
        Ok(conn.execute(
            "DELETE FROM metrics WHERE timestamp_ms < ?1",
            params![cutoff],
        )?)
    }

    fn count_terminal(&self, cutoff: i64) -> Result<(i64, i64)> {
        let conn = self.conn.lock();
        Ok(conn.query_row(
            "SELECT count(*), coalesce(sum(success), 0) FROM metrics
             WHERE event IN ('exec_completed','exec_failed','exec_timeout')
               AND success IS NOT NULL AND timestamp_ms >= ?1",
            params![cutoff],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?)
    }

    fn count_event(&self, kind: MetricKind, cutoff: i64) -> Result<i64> {
        let conn = self.conn.lock();
        Ok(conn.query_row(
            "SELECT count(*) FROM metrics WHERE event = ?1 AND timestamp_ms >= ?2",
            params![kind.as_str(), cutoff],
            |row| row.get(0),
        )?)
    }
}

/// Rank `ceil(p/100 * n) - 1` over an ascending-sorted slice; 0 when empty.
fn percentile(sorted: &[i64], p: u8) -> i64 {
    if sorted.is_empty() {
        return 0;
    }
    let n = sorted.len();
    let rank = ((p as f64 / 100.0) * n as f64).ceil() as usize;
    sorted[rank.clamp(1, n) - 1]
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<Result<MetricRecord>> {
    let event: String = row.get(0)?;
    let agent: Option<String> = row.get(1)?;
    let cli: Option<String> = row.get(2)?;
    let metadata: String = row.get(5)?;

    let record = || -> Result<MetricRecord> {
        Ok(MetricRecord {
            event: event.parse().map_err(|detail| StorageError::Corrupt {
                what: "metric",
                detail,
            })?,
            agent_id: agent.map(kokino_core::AgentId::new),
            cli_kind: match cli {
                Some(s) => Some(s.parse().map_err(|detail| StorageError::Corrupt {
                    what: "metric",
                    detail,
                })?),
                None => None,
            },
            duration_ms: row.get(3)?,
            success: row.get(4)?,
            metadata: crate::db::parse_metadata(&metadata),
            timestamp_ms: row.get(6)?,
        })
    };
    Ok(record())
}

#[cfg(test)]
#[path = "telemetry_tests.rs"]
mod tests;
