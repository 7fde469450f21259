// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Telemetry metric types.
//!
//! Metric records are append-only rows in the telemetry store. `success` is
//! three-valued: `None` means "not applicable" and is excluded from rate
//! denominators.

use crate::agent::CliKind;
use crate::id::AgentId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kinds of telemetry events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    // execution lifecycle
    ExecStarted,
    ExecCompleted,
    ExecFailed,
    ExecTimeout,
    ExecCancelled,
    // session lock
    LockAcquired,
    LockTimeout,
    SessionEnded,
    // process supervision
    ProcessExited,
    ProcessFailed,
    SpawnError,
    LimitExceeded,
    ZombieKilled,
    // jsonl parsing
    JsonlFallbackRaw,
    UnknownEvent,
    ParseError,
    // circuit breaker
    CircuitOpened,
    CircuitHalfOpen,
    CircuitRecovered,
    CircuitRecoveryFailed,
    CircuitReset,
    // shadow execution
    ShadowCompared,
    ShadowMismatch,
    ShadowHeadlessFailure,
    ShadowTmuxFailure,
    // endpoint accounting
    Request,
    // store integrity
    IntegrityViolation,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::ExecStarted => "exec_started",
            MetricKind::ExecCompleted => "exec_completed",
            MetricKind::ExecFailed => "exec_failed",
            MetricKind::ExecTimeout => "exec_timeout",
            MetricKind::ExecCancelled => "exec_cancelled",
            MetricKind::LockAcquired => "lock_acquired",
            MetricKind::LockTimeout => "lock_timeout",
            MetricKind::SessionEnded => "session_ended",
            MetricKind::ProcessExited => "process_exited",
            MetricKind::ProcessFailed => "process_failed",
            MetricKind::SpawnError => "spawn_error",
            MetricKind::LimitExceeded => "limit_exceeded",
            MetricKind::ZombieKilled => "zombie_killed",
            MetricKind::JsonlFallbackRaw => "jsonl_fallback_raw",
            MetricKind::UnknownEvent => "unknown_event",
            MetricKind::ParseError => "parse_error",
            MetricKind::CircuitOpened => "circuit_opened",
            MetricKind::CircuitHalfOpen => "circuit_half_open",
            MetricKind::CircuitRecovered => "circuit_recovered",
            MetricKind::CircuitRecoveryFailed => "circuit_recovery_failed",
            MetricKind::CircuitReset => "circuit_reset",
            MetricKind::ShadowCompared => "shadow_compared",
            MetricKind::ShadowMismatch => "shadow_mismatch",
            MetricKind::ShadowHeadlessFailure => "shadow_headless_failure",
            MetricKind::ShadowTmuxFailure => "shadow_tmux_failure",
            MetricKind::Request => "request",
            MetricKind::IntegrityViolation => "integrity_violation",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let kind = match s {
            "exec_started" => MetricKind::ExecStarted,
            "exec_completed" => MetricKind::ExecCompleted,
            "exec_failed" => MetricKind::ExecFailed,
            "exec_timeout" => MetricKind::ExecTimeout,
            "exec_cancelled" => MetricKind::ExecCancelled,
            "lock_acquired" => MetricKind::LockAcquired,
            "lock_timeout" => MetricKind::LockTimeout,
            "session_ended" => MetricKind::SessionEnded,
            "process_exited" => MetricKind::ProcessExited,
            "process_failed" => MetricKind::ProcessFailed,
            "spawn_error" => MetricKind::SpawnError,
            "limit_exceeded" => MetricKind::LimitExceeded,
            "zombie_killed" => MetricKind::ZombieKilled,
            "jsonl_fallback_raw" => MetricKind::JsonlFallbackRaw,
            "unknown_event" => MetricKind::UnknownEvent,
            "parse_error" => MetricKind::ParseError,
            "circuit_opened" => MetricKind::CircuitOpened,
            "circuit_half_open" => MetricKind::CircuitHalfOpen,
            "circuit_recovered" => MetricKind::CircuitRecovered,
            "circuit_recovery_failed" => MetricKind::CircuitRecoveryFailed,
            "circuit_reset" => MetricKind::CircuitReset,
            "shadow_compared" => MetricKind::ShadowCompared,
            "shadow_mismatch" => MetricKind::ShadowMismatch,
            "shadow_headless_failure" => MetricKind::ShadowHeadlessFailure,
            "shadow_tmux_failure" => MetricKind::ShadowTmuxFailure,
            "request" => MetricKind::Request,
            "integrity_violation" => MetricKind::IntegrityViolation,
            other => return Err(format!("unknown metric kind: {}", other)),
        };
        Ok(kind)
    }
}

/// One append-only telemetry row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub event: MetricKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<AgentId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cli_kind: Option<CliKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
    /// Three-valued: `None` = not applicable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub timestamp_ms: i64,
}

impl MetricRecord {
    pub fn new(event: MetricKind, timestamp_ms: i64) -> Self {
        Self {
            event,
            agent_id: None,
            cli_kind: None,
            duration_ms: None,
            success: None,
            metadata: serde_json::Value::Object(serde_json::Map::new()),
            timestamp_ms,
        }
    }

    pub fn agent(mut self, agent_id: AgentId) -> Self {
        self.agent_id = Some(agent_id);
        self
    }

    pub fn cli(mut self, kind: CliKind) -> Self {
        self.cli_kind = Some(kind);
        self
    }

    pub fn duration(mut self, duration_ms: i64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn success(mut self, success: bool) -> Self {
        self.success = Some(success);
        self
    }

    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

#[cfg(test)]
#[path = "metric_tests.rs"]
mod tests;
