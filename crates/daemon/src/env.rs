// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon.

use std::path::PathBuf;
use std::time::Duration;

fn parse_duration_ms(var: &str) -> Option<Duration> {
    std::env::var(var)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
}

/// State directory override (`KOKINO_STATE_DIR`).
pub fn state_dir_override() -> Option<PathBuf> {
    std::env::var("KOKINO_STATE_DIR").ok().map(PathBuf::from)
}

/// WebSocket listen address override (`KOKINO_WS_ADDR`).
pub fn ws_addr_override() -> Option<String> {
    std::env::var("KOKINO_WS_ADDR").ok()
}

/// Ticket deadline sweep interval (default: 1000ms).
pub fn ticket_sweep_interval() -> Duration {
    parse_duration_ms("KOKINO_TICKET_SWEEP_MS").unwrap_or(Duration::from_secs(1))
}

/// Stale-session sweep interval (default: 1h).
pub fn session_sweep_interval() -> Duration {
    parse_duration_ms("KOKINO_SESSION_SWEEP_MS").unwrap_or(Duration::from_secs(60 * 60))
}

/// Monitor stream heartbeat interval (default: 30s).
pub fn heartbeat_interval() -> Duration {
    parse_duration_ms("KOKINO_HEARTBEAT_MS").unwrap_or(Duration::from_secs(30))
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
