// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the engine.
//!
//! Expected operational states (busy, timeout, conflict) are first-class
//! variants so callers can branch without string matching; only `Internal`
//! maps to a 500.

use kokino_core::ErrorKind;
use kokino_storage::StorageError;
use thiserror::Error;

/// Errors from engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("{what} not found: {id}")]
    NotFound { what: &'static str, id: String },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("busy: {reason}")]
    Busy {
        reason: String,
        /// Hint for when a retry could succeed.
        retry_after_ms: Option<i64>,
    },

    #[error("timed out after {waited_ms} ms")]
    Timeout { waited_ms: i64 },

    #[error("upstream failure: {0}")]
    Upstream(String),

    #[error("integrity violation: {0}")]
    Integrity(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Classify into the shared error taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Validation(_) => ErrorKind::Validation,
            EngineError::NotFound { .. } => ErrorKind::NotFound,
            EngineError::Conflict(_) => ErrorKind::Conflict,
            EngineError::Busy { .. } => ErrorKind::Busy,
            EngineError::Timeout { .. } => ErrorKind::Timeout,
            EngineError::Upstream(_) => ErrorKind::Upstream,
            EngineError::Integrity(_) => ErrorKind::Integrity,
            EngineError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn not_found(what: &'static str, id: impl Into<String>) -> Self {
        EngineError::NotFound {
            what,
            id: id.into(),
        }
    }

    pub fn busy(reason: impl Into<String>, retry_after_ms: Option<i64>) -> Self {
        EngineError::Busy {
            reason: reason.into(),
            retry_after_ms,
        }
    }

    /// Retry hint, when one applies.
    pub fn retry_after_ms(&self) -> Option<i64> {
        match self {
            EngineError::Busy { retry_after_ms, .. } => *retry_after_ms,
            _ => None,
        }
    }
}

impl From<StorageError> for EngineError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { what, id } => EngineError::NotFound { what, id },
            StorageError::IllegalTransition { .. } | StorageError::Conflict(_) => {
                EngineError::Conflict(err.to_string())
            }
            StorageError::Corrupt { .. } => EngineError::Integrity(err.to_string()),
            StorageError::Sqlite(_) | StorageError::Json(_) => {
                EngineError::Internal(err.to_string())
            }
        }
    }
}

impl From<kokino_adapters::SupervisorError> for EngineError {
    fn from(err: kokino_adapters::SupervisorError) -> Self {
        EngineError::Upstream(err.to_string())
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
