// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access and subprocess environments.
//!
//! Child environments are built explicitly: a frozen base snapshot plus
//! named overrides. Nothing mutates the daemon's own environment, and
//! API-key variables are scrubbed so a stray `ANTHROPIC_API_KEY` cannot
//! override the CLI's subscription auth.

use std::time::Duration;

fn parse_duration_ms(var: &str) -> Option<Duration> {
    std::env::var(var)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
}

/// Resource sampling interval for supervised children (default: 2000ms).
pub fn monitor_sample_ms() -> Duration {
    parse_duration_ms("KOKINO_MONITOR_SAMPLE_MS").unwrap_or(Duration::from_secs(2))
}

/// Binary used for agents of kind `mock` (default: `kokino-mock`).
pub fn mock_cli_bin() -> String {
    std::env::var("KOKINO_MOCK_BIN").unwrap_or_else(|_| "kokino-mock".to_string())
}

/// Poll interval for tmux output settling (default: 500ms).
pub fn tmux_poll_ms() -> Duration {
    parse_duration_ms("KOKINO_TMUX_POLL_MS").unwrap_or(Duration::from_millis(500))
}

/// True when `name` must never reach a child CLI.
fn is_scrubbed_var(name: &str) -> bool {
    name == "API_KEY" || name.ends_with("_API_KEY")
}

/// Explicit child-process environment: frozen base + named overrides.
#[derive(Debug, Clone, Default)]
pub struct ProcessEnv {
    base: Vec<(String, String)>,
    overrides: Vec<(String, String)>,
}

impl ProcessEnv {
    /// Empty environment (children see only the overrides).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Snapshot of the daemon's environment with API keys scrubbed.
    pub fn inherited() -> Self {
        Self {
            base: std::env::vars()
                .filter(|(name, _)| !is_scrubbed_var(name))
                .collect(),
            overrides: Vec::new(),
        }
    }

    /// Base from an explicit variable list (tests, config).
    pub fn from_base(base: Vec<(String, String)>) -> Self {
        Self {
            base,
            overrides: Vec::new(),
        }
    }

    /// Add or replace one variable.
    pub fn set(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.overrides.push((name.into(), value.into()));
        self
    }

    /// Final variable list: base, then overrides, scrub applied last.
    ///
    /// Later entries win; the scrub also drops API keys smuggled in via
    /// overrides.
    pub fn resolve(&self) -> Vec<(String, String)> {
        let mut resolved: Vec<(String, String)> = Vec::new();
        for (name, value) in self.base.iter().chain(self.overrides.iter()) {
            if is_scrubbed_var(name) {
                continue;
            }
            if let Some(existing) = resolved.iter_mut().find(|(n, _)| n == name) {
                existing.1 = value.clone();
            } else {
                resolved.push((name.clone(), value.clone()));
            }
        }
        resolved
    }
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
