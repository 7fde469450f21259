// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent registry types.
//!
//! An agent is a logical named worker backed by a long-lived conversational
//! CLI process. The broker tracks its CLI kind, liveness, and which delivery
//! path its tickets take.

use crate::id::AgentId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which external CLI binary backs an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CliKind {
    ClaudeCode,
    Gemini,
    Droid,
    /// Configurable echo command for end-to-end testing without a real CLI.
    Mock,
}

impl CliKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CliKind::ClaudeCode => "claude-code",
            CliKind::Gemini => "gemini",
            CliKind::Droid => "droid",
            CliKind::Mock => "mock",
        }
    }
}

impl fmt::Display for CliKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CliKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "claude-code" => Ok(CliKind::ClaudeCode),
            "gemini" => Ok(CliKind::Gemini),
            "droid" => Ok(CliKind::Droid),
            "mock" => Ok(CliKind::Mock),
            other => Err(format!("unknown cli kind: {}", other)),
        }
    }
}

/// Liveness status of a registered agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Online,
    Offline,
    Error,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::Online => "online",
            AgentStatus::Offline => "offline",
            AgentStatus::Error => "error",
        }
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "online" => Ok(AgentStatus::Online),
            "offline" => Ok(AgentStatus::Offline),
            "error" => Ok(AgentStatus::Error),
            other => Err(format!("unknown agent status: {}", other)),
        }
    }
}

/// How an agent's work is delivered to the backing CLI.
///
/// `Headless` spawns a non-interactive subprocess per turn. `Tmux` injects
/// into a long-lived terminal session (external provider). `Shadow` runs
/// both in parallel and compares outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    Headless,
    Tmux,
    Shadow,
}

impl DeliveryMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryMode::Headless => "headless",
            DeliveryMode::Tmux => "tmux",
            DeliveryMode::Shadow => "shadow",
        }
    }
}

impl fmt::Display for DeliveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "headless" => Ok(DeliveryMode::Headless),
            "tmux" => Ok(DeliveryMode::Tmux),
            "shadow" => Ok(DeliveryMode::Shadow),
            other => Err(format!("unknown delivery mode: {}", other)),
        }
    }
}

/// A registered agent as persisted in the operational store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRecord {
    pub agent_id: AgentId,
    pub kind: CliKind,
    pub status: AgentStatus,
    pub delivery_mode: DeliveryMode,
    /// Arbitrary producer-supplied metadata (role, systemPrompt, pid, ...).
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub heartbeat_interval_ms: i64,
    pub last_heartbeat_ms: Option<i64>,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

impl AgentRecord {
    /// The OS pid registered via metadata, if any. Used by resource sampling.
    pub fn pid(&self) -> Option<i32> {
        self.metadata
            .get("pid")
            .and_then(|v| v.as_i64())
            .and_then(|v| i32::try_from(v).ok())
    }

    /// Producer-declared role string, if any. Used in the bootstrap prompt.
    pub fn role(&self) -> Option<&str> {
        self.metadata.get("role").and_then(|v| v.as_str())
    }

    /// Producer-declared system prompt, if any.
    pub fn system_prompt(&self) -> Option<&str> {
        self.metadata.get("systemPrompt").and_then(|v| v.as_str())
    }

    /// An agent is stale when no heartbeat arrived within three intervals.
    pub fn heartbeat_stale(&self, now_ms: i64) -> bool {
        match self.last_heartbeat_ms {
            Some(last) => now_ms - last > 3 * self.heartbeat_interval_ms,
            None => false,
        }
    }
}

#[cfg(test)]
#[path = "agent_tests.rs"]
mod tests;
