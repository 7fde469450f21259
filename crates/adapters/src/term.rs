// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Terminal pane delivery backend (the legacy tmux path).
//!
//! Each tmux-mode agent owns one long-lived pane running its interactive
//! CLI. A turn on this path is "inject the prompt, wait for the pane to
//! settle, scrape what changed" — so the backend surface is exactly those
//! operations, not a general terminal API. The settle/scrape policy lives
//! in the delivery provider; this module owns pane lifecycle and raw
//! injection.

use async_trait::async_trait;
use kokino_core::AgentId;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

kokino_core::define_id! {
    /// Identifier of an agent's terminal pane (tmux session name).
    pub struct PaneId;
}

/// Errors from pane operations.
#[derive(Debug, Error)]
pub enum TermError {
    /// The pane died (or never existed); the provider should respawn.
    #[error("no pane: {0}")]
    PaneGone(String),
    #[error("pane spawn failed: {0}")]
    SpawnFailed(String),
    #[error("terminal backend failed: {0}")]
    Backend(String),
}

/// One-pane-per-agent terminal operations.
#[async_trait]
pub trait TermBackend: Clone + Send + Sync + 'static {
    /// Open the agent's pane running `command` in `cwd`. A leftover pane
    /// for the same agent is replaced, never reused: its CLI state is
    /// unknown after a broker restart.
    async fn open_pane(
        &self,
        agent_id: &AgentId,
        command: &str,
        cwd: &Path,
    ) -> Result<PaneId, TermError>;

    /// Whether the pane still exists.
    async fn pane_alive(&self, pane: &PaneId) -> Result<bool, TermError>;

    /// Clear any half-typed input, type the prompt, submit it.
    async fn inject_prompt(&self, pane: &PaneId, prompt: &str) -> Result<(), TermError>;

    /// Visible pane text, up to the last `lines` rows.
    async fn snapshot(&self, pane: &PaneId, lines: u32) -> Result<String, TermError>;

    /// Tear the pane down. Succeeds when it is already gone.
    async fn close_pane(&self, pane: &PaneId) -> Result<(), TermError>;
}

/// Upper bound on any single tmux invocation.
const TMUX_TIMEOUT: Duration = Duration::from_secs(10);
/// Pause after clearing input, before typing.
const KEY_SETTLE: Duration = Duration::from_millis(50);
/// Pane names stay short enough for tmux status bars.
const PANE_NAME_LEN: usize = 40;

/// Tmux-backed panes.
#[derive(Clone, Copy, Debug, Default)]
pub struct TmuxBackend;

impl TmuxBackend {
    pub fn new() -> Self {
        Self
    }

    /// Run one tmux command under the timeout.
    async fn tmux(&self, args: &[&str]) -> Result<std::process::Output, TermError> {
        let verb = args.first().copied().unwrap_or("tmux");
        let mut cmd = Command::new("tmux");
        cmd.args(args);
        match tokio::time::timeout(TMUX_TIMEOUT, cmd.output()).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(TermError::Backend(format!("tmux {}: {}", verb, e))),
            Err(_) => Err(TermError::Backend(format!(
                "tmux {} timed out after {}s",
                verb,
                TMUX_TIMEOUT.as_secs()
            ))),
        }
    }

    /// Run a send-keys variant; a failure means the pane is gone.
    async fn keys(&self, pane: &PaneId, args: &[&str]) -> Result<(), TermError> {
        let output = self.tmux(args).await?;
        if !output.status.success() {
            return Err(TermError::PaneGone(pane.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl TermBackend for TmuxBackend {
    async fn open_pane(
        &self,
        agent_id: &AgentId,
        command: &str,
        cwd: &Path,
    ) -> Result<PaneId, TermError> {
        if !cwd.exists() {
            return Err(TermError::SpawnFailed(format!(
                "working directory does not exist: {}",
                cwd.display()
            )));
        }

        let pane = PaneId::new(format!("kokino-{}", pane_name(agent_id.as_str())));

        // Replace, never reuse: a pane surviving a broker restart has a CLI
        // in an unknown conversational state.
        let existing = self.tmux(&["has-session", "-t", pane.as_str()]).await?;
        if existing.status.success() {
            tracing::warn!(pane = %pane, "replacing leftover pane");
            let _ = self.tmux(&["kill-session", "-t", pane.as_str()]).await;
        }

        let cwd_arg = cwd.display().to_string();
        let output = self
            .tmux(&[
                "new-session",
                "-d",
                "-s",
                pane.as_str(),
                "-c",
                &cwd_arg,
                command,
            ])
            .await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::error!(pane = %pane, stderr = %stderr, "pane spawn failed");
            return Err(TermError::SpawnFailed(stderr.trim().to_string()));
        }

        tracing::debug!(agent_id = %agent_id, pane = %pane, command, "pane opened");
        Ok(pane)
    }

    async fn pane_alive(&self, pane: &PaneId) -> Result<bool, TermError> {
        let output = self.tmux(&["has-session", "-t", pane.as_str()]).await?;
        Ok(output.status.success())
    }

    async fn inject_prompt(&self, pane: &PaneId, prompt: &str) -> Result<(), TermError> {
        // Esc drops anything half-typed in the CLI's input box.
        self.keys(pane, &["send-keys", "-t", pane.as_str(), "Escape"])
            .await?;
        tokio::time::sleep(KEY_SETTLE).await;

        // -l = literal (no key-name interpretation); -- guards prompts
        // starting with '-'.
        self.keys(
            pane,
            &["send-keys", "-t", pane.as_str(), "-l", "--", prompt],
        )
        .await?;

        // Interactive CLIs re-render per keystroke; long prompts need more
        // time before Enter or the tail gets cut off.
        let typing = Duration::from_millis((50 + prompt.len() as u64 / 4).min(1_000));
        tokio::time::sleep(typing).await;

        self.keys(pane, &["send-keys", "-t", pane.as_str(), "Enter"])
            .await
    }

    async fn snapshot(&self, pane: &PaneId, lines: u32) -> Result<String, TermError> {
        let from = format!("-{}", lines);
        let output = self
            .tmux(&["capture-pane", "-t", pane.as_str(), "-p", "-S", &from])
            .await?;
        if !output.status.success() {
            return Err(TermError::PaneGone(pane.to_string()));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn close_pane(&self, pane: &PaneId) -> Result<(), TermError> {
        // Already-dead panes are fine; only a broken tmux invocation errors.
        let _ = self.tmux(&["kill-session", "-t", pane.as_str()]).await?;
        Ok(())
    }
}

/// Map an agent id onto a tmux-safe pane name.
///
/// Tmux forbids ':' and '.' in session names; everything outside
/// `[A-Za-z0-9_-]` flattens to a single '-'.
fn pane_name(agent_id: &str) -> String {
    let mut name = String::with_capacity(agent_id.len().min(PANE_NAME_LEN));
    let mut dashed = false;
    for c in agent_id.chars() {
        if name.len() >= PANE_NAME_LEN {
            break;
        }
        if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
            name.push(c);
            dashed = false;
        } else if !dashed {
            name.push('-');
            dashed = true;
        }
    }
    name.trim_matches('-').to_string()
}

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
pub mod fake;

#[cfg(test)]
#[path = "term_tests.rs"]
mod tests;
