// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon configuration.
//!
//! Loaded from `kokino.toml` in the state directory when present, with
//! environment overrides applied on top. Everything has a default: a bare
//! `kokinod` run works.

use crate::env;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where the databases, socket, and pid file live.
    pub state_dir: PathBuf,
    /// WebSocket listen address for observers.
    pub ws_addr: String,
    /// Default soft execution timeout.
    pub execute_timeout_ms: i64,
    /// Default ticket timeout.
    pub ticket_timeout_ms: i64,
    /// Settled tickets older than this are hard-deleted.
    pub ticket_retention_ms: i64,
    /// Telemetry retention for the cleanup endpoint default.
    pub telemetry_retention_days: i64,
    /// Model selector handed to CLIs (agent metadata wins).
    pub model: Option<String>,
    /// MCP configuration file handed to CLIs.
    pub mcp_config: Option<PathBuf>,
    /// Working directory for spawned CLIs.
    pub agent_cwd: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            ws_addr: "127.0.0.1:7787".to_string(),
            execute_timeout_ms: 300_000,
            ticket_timeout_ms: 30_000,
            ticket_retention_ms: 7 * 24 * 60 * 60 * 1000,
            telemetry_retention_days: 30,
            model: None,
            mcp_config: None,
            agent_cwd: None,
        }
    }
}

fn default_state_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir)
        .join(".local/state/kokino")
}

impl Config {
    /// Load from `<state_dir>/kokino.toml` if present, then apply env
    /// overrides.
    pub fn load() -> Self {
        let state_dir = env::state_dir_override().unwrap_or_else(default_state_dir);
        let mut config = Self::from_file(&state_dir.join("kokino.toml")).unwrap_or_default();
        config.state_dir = state_dir;
        if let Some(addr) = env::ws_addr_override() {
            config.ws_addr = addr;
        }
        config
    }

    /// Parse one TOML file; `None` when missing or unreadable.
    pub fn from_file(path: &Path) -> Option<Self> {
        let text = std::fs::read_to_string(path).ok()?;
        match toml::from_str(&text) {
            Ok(config) => Some(config),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "config file ignored");
                None
            }
        }
    }

    pub fn db_path(&self) -> PathBuf {
        self.state_dir.join("kokino.db")
    }

    pub fn telemetry_db_path(&self) -> PathBuf {
        self.state_dir.join("telemetry.db")
    }

    pub fn socket_path(&self) -> PathBuf {
        self.state_dir.join("kokinod.sock")
    }

    pub fn pid_path(&self) -> PathBuf {
        self.state_dir.join("kokinod.pid")
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
