// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! kokino-storage: SQLite persistence for the Kokino broker.
//!
//! Two database files: the operational store (agents, tickets, messages,
//! conversations, shadow results, monitoring rows) and a separate telemetry
//! store so retention policies can differ. All access goes through typed
//! store structs sharing a [`Db`] handle; the connection is guarded by a
//! mutex and never held across await points.

pub mod agents;
pub mod conversations;
pub mod db;
pub mod messages;
pub mod monitoring;
pub mod shadow;
pub mod telemetry;
pub mod tickets;

pub use agents::AgentStore;
pub use conversations::{
    ConversationIssues, ConversationStore, IntegrityIssue, IntegrityIssueKind, IntegrityReport,
};
pub use db::Db;
pub use messages::{
    InteractionEdge, InteractionGraph, InteractionNode, MessageRow, MessageStore, NewMessage,
    TimelineEntry, TimelineFilter, TimelineKind,
};
pub use monitoring::{AgentEventRow, AgentMetricRow, CleanupCounts, ErrorLogRow, MonitoringStore};
pub use shadow::{ShadowComparison, ShadowStats, ShadowStore};
pub use telemetry::{EndpointStats, ErrorBudget, RateBucket, Slo, TelemetryStore};
pub use tickets::{NewTicket, TicketStore};

use kokino_core::ErrorKind;
use thiserror::Error;

/// Errors from storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("{what} not found: {id}")]
    NotFound { what: &'static str, id: String },

    #[error("illegal {what} transition: {from} -> {to}")]
    IllegalTransition {
        what: &'static str,
        from: String,
        to: String,
    },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("corrupt {what} row: {detail}")]
    Corrupt { what: &'static str, detail: String },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StorageError {
    /// Classify into the shared error taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            StorageError::NotFound { .. } => ErrorKind::NotFound,
            StorageError::IllegalTransition { .. } | StorageError::Conflict(_) => {
                ErrorKind::Conflict
            }
            StorageError::Corrupt { .. } => ErrorKind::Integrity,
            StorageError::Sqlite(_) | StorageError::Json(_) => ErrorKind::Internal,
        }
    }

    pub(crate) fn not_found(what: &'static str, id: impl Into<String>) -> Self {
        StorageError::NotFound {
            what,
            id: id.into(),
        }
    }
}

/// Result alias for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
