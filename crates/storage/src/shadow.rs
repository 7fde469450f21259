// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shadow comparison rows and drill-down queries.

use crate::db::Db;
use crate::Result;
use kokino_core::{AgentId, Clock, TicketId};
use rusqlite::{params, Row};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One dual-mode execution comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShadowComparison {
    pub ticket_id: TicketId,
    pub agent_id: AgentId,
    pub tmux_success: bool,
    pub headless_success: bool,
    pub output_match: bool,
    /// `headless - tmux`, present when both durations are known.
    pub latency_delta_ms: Option<i64>,
    pub tmux_duration_ms: Option<i64>,
    pub headless_duration_ms: Option<i64>,
    pub tmux_error: Option<String>,
    pub headless_error: Option<String>,
    pub tmux_response: Option<String>,
    pub headless_response: Option<String>,
}

/// Rolling aggregate over recent comparisons.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShadowStats {
    pub total: i64,
    pub both_succeeded: i64,
    pub matches: i64,
    pub mismatches: i64,
    pub headless_failures: i64,
    pub tmux_failures: i64,
    /// Fraction of both-succeeded runs whose outputs matched; 1.0 when empty.
    pub match_rate: f64,
    pub avg_latency_delta_ms: Option<i64>,
}

/// Persistence for shadow-mode comparisons.
#[derive(Clone)]
pub struct ShadowStore {
    db: Db,
    clock: Arc<dyn Clock>,
}

impl ShadowStore {
    pub fn new(db: Db, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    /// Persist one comparison row.
    pub fn insert(&self, comparison: &ShadowComparison) -> Result<()> {
        let now = self.clock.now_ms();
        self.db.with(|conn| {
            conn.execute(
                "INSERT INTO shadow_results
                     (ticket_id, agent_id, tmux_success, headless_success, output_match,
                      latency_delta_ms, tmux_duration_ms, headless_duration_ms,
                      tmux_error, headless_error, tmux_response, headless_response,
                      created_at_ms)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    comparison.ticket_id.as_str(),
                    comparison.agent_id.as_str(),
                    comparison.tmux_success,
                    comparison.headless_success,
                    comparison.output_match,
                    comparison.latency_delta_ms,
                    comparison.tmux_duration_ms,
                    comparison.headless_duration_ms,
                    comparison.tmux_error,
                    comparison.headless_error,
                    comparison.tmux_response,
                    comparison.headless_response,
                    now
                ],
            )?;
            Ok(())
        })
    }

    /// Aggregate comparisons within the trailing window.
    pub fn stats(&self, window_ms: i64) -> Result<ShadowStats> {
        let cutoff = self.clock.now_ms() - window_ms;
        let rows = self.rows_since(cutoff)?;

        let mut stats = ShadowStats {
            total: rows.len() as i64,
            ..Default::default()
        };
        let mut delta_sum: i64 = 0;
        let mut delta_n: i64 = 0;

        for row in &rows {
            if row.tmux_success && row.headless_success {
                stats.both_succeeded += 1;
                if row.output_match {
                    stats.matches += 1;
                } else {
                    stats.mismatches += 1;
                }
            }
            if !row.headless_success {
                stats.headless_failures += 1;
            }
            if !row.tmux_success {
                stats.tmux_failures += 1;
            }
            if let Some(delta) = row.latency_delta_ms {
                delta_sum += delta;
                delta_n += 1;
            }
        }

        stats.match_rate = if stats.both_succeeded > 0 {
            stats.matches as f64 / stats.both_succeeded as f64
        } else {
            1.0
        };
        stats.avg_latency_delta_ms = (delta_n > 0).then(|| delta_sum / delta_n);
        Ok(stats)
    }

    /// Most recent mismatches (both succeeded, outputs differ).
    pub fn mismatches(&self, limit: usize) -> Result<Vec<ShadowComparison>> {
        self.query_filtered(
            "tmux_success = 1 AND headless_success = 1 AND output_match = 0",
            limit,
        )
    }

    /// Most recent rows where either mode failed.
    pub fn failures(&self, limit: usize) -> Result<Vec<ShadowComparison>> {
        self.query_filtered("tmux_success = 0 OR headless_success = 0", limit)
    }

    fn rows_since(&self, cutoff: i64) -> Result<Vec<ShadowComparison>> {
        self.db.with(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{} WHERE created_at_ms >= ?1 ORDER BY created_at_ms DESC",
                SELECT_COMPARISON
            ))?;
            let rows = stmt.query_map(params![cutoff], row_to_comparison)?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok(out)
        })
    }

    fn query_filtered(&self, predicate: &str, limit: usize) -> Result<Vec<ShadowComparison>> {
        self.db.with(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{} WHERE {} ORDER BY created_at_ms DESC LIMIT ?1",
                SELECT_COMPARISON, predicate
            ))?;
            let rows = stmt.query_map(params![limit as i64], row_to_comparison)?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok(out)
        })
    }
}

const SELECT_COMPARISON: &str = "SELECT ticket_id, agent_id, tmux_success, headless_success, output_match,
        latency_delta_ms, tmux_duration_ms, headless_duration_ms,
        tmux_error, headless_error, tmux_response, headless_response
 FROM shadow_results";

fn row_to_comparison(row: &Row<'_>) -> rusqlite::Result<ShadowComparison> {
    Ok(ShadowComparison {
        ticket_id: TicketId::new(row.get::<_, String>(0)?),
        agent_id: AgentId::new(row.get::<_, String>(1)?),
        tmux_success: row.get(2)?,
        headless_success: row.get(3)?,
        output_match: row.get(4)?,
        latency_delta_ms: row.get(5)?,
        tmux_duration_ms: row.get(6)?,
        headless_duration_ms: row.get(7)?,
        tmux_error: row.get(8)?,
        headless_error: row.get(9)?,
        tmux_response: row.get(10)?,
        headless_response: row.get(11)?,
    })
}

#[cfg(test)]
#[path = "shadow_tests.rs"]
mod tests;
