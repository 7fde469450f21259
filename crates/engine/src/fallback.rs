// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Operator-controlled delivery fallback.
//!
//! Two override maps: CLI kinds whose headless path is disabled, and agents
//! pinned to the tmux path. Precedence: agent override, then kind override,
//! then the agent's configured delivery mode.

use kokino_core::{AgentId, AgentRecord, CliKind, DeliveryMode};
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;

/// Why a delivery decision came out the way it did.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FallbackDecision {
    pub use_tmux: bool,
    pub reason: String,
}

/// Thread-safe override switchboard.
#[derive(Clone, Default)]
pub struct FallbackController {
    disabled_kinds: Arc<RwLock<HashSet<CliKind>>>,
    forced_agents: Arc<RwLock<HashSet<AgentId>>>,
}

impl FallbackController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Disable headless delivery for a whole CLI kind.
    pub fn disable_kind(&self, kind: CliKind) {
        tracing::info!(kind = %kind, "headless delivery disabled for cli kind");
        self.disabled_kinds.write().insert(kind);
    }

    /// Re-enable headless delivery for a CLI kind.
    pub fn enable_kind(&self, kind: CliKind) {
        tracing::info!(kind = %kind, "headless delivery re-enabled for cli kind");
        self.disabled_kinds.write().remove(&kind);
    }

    /// Pin one agent to the tmux path.
    pub fn force_tmux(&self, agent_id: AgentId) {
        tracing::info!(agent_id = %agent_id, "agent forced to tmux delivery");
        self.forced_agents.write().insert(agent_id);
    }

    /// Unpin an agent.
    pub fn unforce_tmux(&self, agent_id: &AgentId) {
        self.forced_agents.write().remove(agent_id);
    }

    /// Decide whether this agent's work must take the tmux path.
    pub fn should_use_tmux(&self, agent: &AgentRecord) -> FallbackDecision {
        if self.forced_agents.read().contains(&agent.agent_id) {
            return FallbackDecision {
                use_tmux: true,
                reason: format!("agent {} forced to tmux", agent.agent_id),
            };
        }
        if self.disabled_kinds.read().contains(&agent.kind) {
            return FallbackDecision {
                use_tmux: true,
                reason: format!("headless disabled for cli kind {}", agent.kind),
            };
        }
        if agent.delivery_mode == DeliveryMode::Tmux {
            return FallbackDecision {
                use_tmux: true,
                reason: "configured delivery mode is tmux".to_string(),
            };
        }
        FallbackDecision {
            use_tmux: false,
            reason: format!("configured delivery mode is {}", agent.delivery_mode),
        }
    }

    /// Current overrides (for the status surface).
    pub fn overrides(&self) -> (Vec<CliKind>, Vec<AgentId>) {
        let mut kinds: Vec<CliKind> = self.disabled_kinds.read().iter().copied().collect();
        kinds.sort_by_key(|k| k.as_str());
        let mut agents: Vec<AgentId> = self.forced_agents.read().iter().cloned().collect();
        agents.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        (kinds, agents)
    }
}

#[cfg(test)]
#[path = "fallback_tests.rs"]
mod tests;
