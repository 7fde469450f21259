// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Operational database handle and schema.
//!
//! One SQLite file holds all operational aggregates. WAL journaling keeps
//! writers from blocking readers; foreign keys are enforced so cascade
//! deletes (agent -> tickets/messages/conversations/turns) happen in the
//! store, not in application code.

use crate::{Result, StorageError};
use parking_lot::Mutex;
use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;

/// Schema version (increment when changing table definitions).
pub const SCHEMA_VERSION: i32 = 1;

/// Shared handle to the operational database.
#[derive(Clone)]
pub struct Db {
    conn: Arc<Mutex<Connection>>,
}

impl Db {
    /// Open (or create) the operational database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// In-memory database for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        // journal_mode returns the resulting mode as a row, so query_row it
        conn.query_row("PRAGMA journal_mode = WAL", [], |_row| Ok(()))?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` with the connection locked.
    pub(crate) fn with<R>(&self, f: impl FnOnce(&Connection) -> Result<R>) -> Result<R> {
        let conn = self.conn.lock();
        f(&conn)
    }

    /// Run `f` inside a transaction; commits on `Ok`, rolls back on `Err`.
    pub(crate) fn with_tx<R>(
        &self,
        f: impl FnOnce(&rusqlite::Transaction<'_>) -> Result<R>,
    ) -> Result<R> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }
}

fn init_schema(conn: &Connection) -> Result<()> {
    let current_version: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if current_version != 0 && current_version != SCHEMA_VERSION {
        return Err(StorageError::Corrupt {
            what: "schema",
            detail: format!(
                "database version {} is not supported (expected {})",
                current_version, SCHEMA_VERSION
            ),
        });
    }

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS agents (
            agent_id TEXT PRIMARY KEY,
            kind TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'online'
                CHECK (status IN ('online','offline','error')),
            delivery_mode TEXT NOT NULL DEFAULT 'headless'
                CHECK (delivery_mode IN ('tmux','headless','shadow')),
            metadata TEXT NOT NULL DEFAULT '{}',
            heartbeat_interval_ms INTEGER NOT NULL DEFAULT 30000,
            last_heartbeat_ms INTEGER,
            created_at_ms INTEGER NOT NULL,
            updated_at_ms INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS tickets (
            ticket_id TEXT PRIMARY KEY,
            target_agent TEXT NOT NULL
                REFERENCES agents(agent_id) ON DELETE CASCADE,
            origin_agent TEXT,
            payload TEXT NOT NULL,
            metadata TEXT NOT NULL DEFAULT '{}',
            expect_reply INTEGER NOT NULL DEFAULT 0,
            timeout_ms INTEGER NOT NULL DEFAULT 30000,
            status TEXT NOT NULL DEFAULT 'pending'
                CHECK (status IN ('pending','delivered','responded','timed_out','cancelled')),
            response TEXT,
            created_at_ms INTEGER NOT NULL,
            updated_at_ms INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_tickets_target ON tickets(target_agent);
        CREATE INDEX IF NOT EXISTS idx_tickets_status ON tickets(status);
        CREATE INDEX IF NOT EXISTS idx_tickets_created ON tickets(created_at_ms);

        CREATE TABLE IF NOT EXISTS messages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            message_id TEXT NOT NULL UNIQUE,
            from_agent TEXT REFERENCES agents(agent_id) ON DELETE CASCADE,
            to_agent TEXT NOT NULL REFERENCES agents(agent_id) ON DELETE CASCADE,
            thread_id TEXT,
            payload TEXT NOT NULL,
            metadata TEXT NOT NULL DEFAULT '{}',
            status TEXT NOT NULL,
            latency_ms INTEGER,
            timestamp_ms INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_messages_from ON messages(from_agent);
        CREATE INDEX IF NOT EXISTS idx_messages_to ON messages(to_agent);
        CREATE INDEX IF NOT EXISTS idx_messages_thread ON messages(thread_id);
        CREATE INDEX IF NOT EXISTS idx_messages_ts ON messages(timestamp_ms);

        CREATE TABLE IF NOT EXISTS conversations (
            conversation_id TEXT PRIMARY KEY,
            agent_id TEXT NOT NULL
                REFERENCES agents(agent_id) ON DELETE CASCADE,
            title TEXT,
            metadata TEXT NOT NULL DEFAULT '{}',
            created_at_ms INTEGER NOT NULL,
            updated_at_ms INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_conversations_agent
            ON conversations(agent_id, updated_at_ms DESC);

        CREATE TABLE IF NOT EXISTS turns (
            turn_id INTEGER PRIMARY KEY AUTOINCREMENT,
            conversation_id TEXT NOT NULL
                REFERENCES conversations(conversation_id) ON DELETE CASCADE,
            role TEXT NOT NULL CHECK (role IN ('user','assistant','system')),
            content TEXT NOT NULL,
            metadata TEXT NOT NULL DEFAULT '{}',
            created_at_ms INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_turns_conversation ON turns(conversation_id);

        CREATE TABLE IF NOT EXISTS shadow_results (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            ticket_id TEXT NOT NULL,
            agent_id TEXT NOT NULL,
            tmux_success INTEGER NOT NULL,
            headless_success INTEGER NOT NULL,
            output_match INTEGER NOT NULL,
            latency_delta_ms INTEGER,
            tmux_duration_ms INTEGER,
            headless_duration_ms INTEGER,
            tmux_error TEXT,
            headless_error TEXT,
            tmux_response TEXT,
            headless_response TEXT,
            created_at_ms INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_shadow_agent ON shadow_results(agent_id);
        CREATE INDEX IF NOT EXISTS idx_shadow_ts ON shadow_results(created_at_ms);

        CREATE TABLE IF NOT EXISTS agent_metrics (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            agent_id TEXT NOT NULL,
            cpu_percent REAL NOT NULL,
            memory_mb REAL NOT NULL,
            pid INTEGER,
            timestamp_ms INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_agent_metrics_agent
            ON agent_metrics(agent_id, timestamp_ms DESC);

        CREATE TABLE IF NOT EXISTS agent_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            agent_id TEXT NOT NULL,
            event_type TEXT NOT NULL CHECK (event_type IN ('info','warning','error')),
            message TEXT NOT NULL,
            metadata TEXT NOT NULL DEFAULT '{}',
            timestamp_ms INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_agent_events_agent
            ON agent_events(agent_id, timestamp_ms DESC);

        CREATE TABLE IF NOT EXISTS error_logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            agent_id TEXT,
            source TEXT NOT NULL,
            message TEXT NOT NULL,
            resolved INTEGER NOT NULL DEFAULT 0,
            timestamp_ms INTEGER NOT NULL,
            resolved_at_ms INTEGER
        );
        CREATE INDEX IF NOT EXISTS idx_error_logs_agent ON error_logs(agent_id);
        CREATE INDEX IF NOT EXISTS idx_error_logs_resolved ON error_logs(resolved);
        "#,
    )?;

    conn.execute_batch(&format!("PRAGMA user_version = {}", SCHEMA_VERSION))?;
    Ok(())
}

/// Parse a metadata JSON column, tolerating empty strings.
pub(crate) fn parse_metadata(raw: &str) -> serde_json::Value {
    if raw.is_empty() {
        return serde_json::Value::Object(serde_json::Map::new());
    }
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::Object(serde_json::Map::new()))
}

#[cfg(test)]
#[path = "db_tests.rs"]
mod tests;
