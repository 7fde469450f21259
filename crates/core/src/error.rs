// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy shared across the broker.
//!
//! Components classify failures into a closed set of kinds so the protocol
//! layer can map them to numeric codes without inspecting messages. Expected
//! operational states (busy, timeout, conflict) are ordinary values here,
//! not panics; only `Internal` represents a programmer error.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of a failure, independent of the concrete error type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Caller supplied invalid arguments; never retried.
    Validation,
    /// Missing agent/conversation/ticket.
    NotFound,
    /// Illegal state transition or duplicate unique key.
    Conflict,
    /// Session locked, circuit open, or half-open saturated; retryable.
    Busy,
    /// Lock-acquire, execution, or supervisor deadline expired.
    Timeout,
    /// CLI exited non-zero, failed to spawn, or output was unusable.
    Upstream,
    /// Wire/schema contract violation (unparseable request or CLI event).
    Schema,
    /// Persistent-store invariant violation.
    Integrity,
    /// Programmer error; surfaced as 500 plus an error event.
    Internal,
}

impl ErrorKind {
    /// Numeric protocol code for this kind.
    pub fn code(&self) -> u16 {
        match self {
            ErrorKind::Validation => 400,
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict => 409,
            ErrorKind::Schema => 422,
            ErrorKind::Busy => 429,
            ErrorKind::Timeout => 504,
            ErrorKind::Upstream | ErrorKind::Integrity | ErrorKind::Internal => 500,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Busy => "busy",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Upstream => "upstream",
            ErrorKind::Schema => "schema",
            ErrorKind::Integrity => "integrity",
            ErrorKind::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
