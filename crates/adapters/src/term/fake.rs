// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scripted terminal backend for tests.
//!
//! Pane names are deterministic (`pane-{agent}`) and snapshots replay from
//! a per-pane queue: each `snapshot` call pops the next scripted frame and
//! the final frame repeats forever, which is exactly the shape the settle
//! loop in the tmux provider needs (baseline, change, steady state).

use super::{PaneId, TermBackend, TermError};
use async_trait::async_trait;
use kokino_core::AgentId;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// State of one fake pane.
#[derive(Debug, Clone, Default)]
pub struct FakePane {
    pub command: String,
    pub cwd: PathBuf,
    pub alive: bool,
    /// Prompts injected, in order.
    pub injected: Vec<String>,
    /// Frames still to be served; the last one repeats.
    pub frames: VecDeque<String>,
}

#[derive(Default)]
struct FakeTermState {
    panes: HashMap<PaneId, FakePane>,
    fail_next_open: Option<String>,
}

/// Scripted pane backend.
#[derive(Clone, Default)]
pub struct FakeTermBackend {
    state: Arc<Mutex<FakeTermState>>,
}

impl FakeTermBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// The pane id `open_pane` assigns for this agent.
    pub fn pane_of(agent_id: &str) -> PaneId {
        PaneId::new(format!("pane-{}", agent_id))
    }

    /// Script the frames the agent's pane will show, in order.
    ///
    /// Works before or after the pane is opened.
    pub fn script_frames(&self, agent_id: &str, frames: &[&str]) {
        let mut state = self.state.lock();
        let pane = state
            .panes
            .entry(Self::pane_of(agent_id))
            .or_default();
        pane.frames = frames.iter().map(|f| f.to_string()).collect();
    }

    /// Prompts injected into the agent's pane so far.
    pub fn injected(&self, agent_id: &str) -> Vec<String> {
        self.state
            .lock()
            .panes
            .get(&Self::pane_of(agent_id))
            .map(|p| p.injected.clone())
            .unwrap_or_default()
    }

    /// Inspect a pane's recorded state.
    pub fn pane(&self, agent_id: &str) -> Option<FakePane> {
        self.state.lock().panes.get(&Self::pane_of(agent_id)).cloned()
    }

    /// Make the next `open_pane` fail with this message.
    pub fn fail_next_open(&self, message: &str) {
        self.state.lock().fail_next_open = Some(message.to_string());
    }

    /// Kill the agent's pane out from under the provider.
    pub fn drop_pane(&self, agent_id: &str) {
        if let Some(pane) = self.state.lock().panes.get_mut(&Self::pane_of(agent_id)) {
            pane.alive = false;
        }
    }
}

#[async_trait]
impl TermBackend for FakeTermBackend {
    async fn open_pane(
        &self,
        agent_id: &AgentId,
        command: &str,
        cwd: &Path,
    ) -> Result<PaneId, TermError> {
        let mut state = self.state.lock();
        if let Some(message) = state.fail_next_open.take() {
            return Err(TermError::SpawnFailed(message));
        }
        let id = Self::pane_of(agent_id.as_str());
        let pane = state.panes.entry(id.clone()).or_default();
        pane.command = command.to_string();
        pane.cwd = cwd.to_path_buf();
        pane.alive = true;
        pane.injected.clear();
        Ok(id)
    }

    async fn pane_alive(&self, pane: &PaneId) -> Result<bool, TermError> {
        Ok(self
            .state
            .lock()
            .panes
            .get(pane)
            .map(|p| p.alive)
            .unwrap_or(false))
    }

    async fn inject_prompt(&self, pane: &PaneId, prompt: &str) -> Result<(), TermError> {
        let mut state = self.state.lock();
        let entry = state
            .panes
            .get_mut(pane)
            .filter(|p| p.alive)
            .ok_or_else(|| TermError::PaneGone(pane.to_string()))?;
        entry.injected.push(prompt.to_string());
        Ok(())
    }

    async fn snapshot(&self, pane: &PaneId, _lines: u32) -> Result<String, TermError> {
        let mut state = self.state.lock();
        let entry = state
            .panes
            .get_mut(pane)
            .filter(|p| p.alive)
            .ok_or_else(|| TermError::PaneGone(pane.to_string()))?;
        match entry.frames.len() {
            0 => Ok(String::new()),
            1 => Ok(entry.frames[0].clone()),
            _ => Ok(match entry.frames.pop_front() {
                Some(frame) => frame,
                None => String::new(),
            }),
        }
    }

    async fn close_pane(&self, pane: &PaneId) -> Result<(), TermError> {
        if let Some(entry) = self.state.lock().panes.get_mut(pane) {
            entry.alive = false;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
