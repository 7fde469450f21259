// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scripted process supervisor for tests.

use super::{
    ProcessControl, ProcessHandle, ProcessOutcome, ProcessSupervisor, SpawnSpec, SpawnedProcess,
    SupervisorError,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Notify};

/// One scripted child: waits `delay`, then yields `outcome` — unless it is
/// signalled first, in which case it yields a killed outcome (no exit code).
#[derive(Debug, Clone)]
pub struct ScriptedOutcome {
    pub delay: Duration,
    pub outcome: ProcessOutcome,
}

impl ScriptedOutcome {
    /// A child that prints one JSONL `result` line and exits 0.
    pub fn jsonl_result(response: &str, session_id: &str) -> Self {
        let stdout = format!(
            "{}\n",
            serde_json::json!({
                "type": "result",
                "result": response,
                "session_id": session_id,
            })
        );
        Self {
            delay: Duration::from_millis(10),
            outcome: ProcessOutcome {
                exit_code: Some(0),
                stdout,
                duration_ms: 10,
                ..Default::default()
            },
        }
    }

    /// A child that exits with the given code and raw stdout.
    pub fn exits(code: i32, stdout: &str) -> Self {
        Self {
            delay: Duration::from_millis(10),
            outcome: ProcessOutcome {
                exit_code: Some(code),
                stdout: stdout.to_string(),
                duration_ms: 10,
                ..Default::default()
            },
        }
    }

    /// A child that never exits on its own (only a signal ends it).
    pub fn hangs() -> Self {
        Self {
            delay: Duration::from_secs(3_600),
            outcome: ProcessOutcome {
                exit_code: Some(0),
                ..Default::default()
            },
        }
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// Fake control handle: signals flip a notify instead of hitting the OS.
pub struct FakeProcessHandle {
    terminated: Arc<Notify>,
    signals: Arc<Mutex<Vec<(u32, u32)>>>,
    slot: usize,
}

impl ProcessControl for FakeProcessHandle {
    fn pid(&self) -> Option<i32> {
        None
    }

    fn terminate(&self) {
        self.signals.lock()[self.slot].0 += 1;
        self.terminated.notify_one();
    }

    fn kill(&self) {
        self.signals.lock()[self.slot].1 += 1;
        self.terminated.notify_one();
    }
}

/// Scripted supervisor: spawns yield queued outcomes in order.
#[derive(Clone, Default)]
pub struct FakeProcessSupervisor {
    script: Arc<Mutex<VecDeque<ScriptedOutcome>>>,
    spawned: Arc<Mutex<Vec<SpawnSpec>>>,
    signals: Arc<Mutex<Vec<(u32, u32)>>>,
}

impl FakeProcessSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the next child's behavior.
    pub fn push(&self, scripted: ScriptedOutcome) {
        self.script.lock().push_back(scripted);
    }

    /// Specs of every spawn observed, in order.
    pub fn spawned(&self) -> Vec<SpawnSpec> {
        self.spawned.lock().clone()
    }

    /// (terminate, kill) counts per spawned child, in spawn order.
    pub fn signal_counts(&self) -> Vec<(u32, u32)> {
        self.signals.lock().clone()
    }
}

#[async_trait]
impl ProcessSupervisor for FakeProcessSupervisor {
    async fn spawn(&self, spec: SpawnSpec) -> Result<SpawnedProcess, SupervisorError> {
        self.spawned.lock().push(spec);

        let scripted = self
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(|| ScriptedOutcome::exits(0, ""));

        let terminated = Arc::new(Notify::new());
        let slot = {
            let mut signals = self.signals.lock();
            signals.push((0, 0));
            signals.len() - 1
        };

        let control = Arc::new(FakeProcessHandle {
            terminated: Arc::clone(&terminated),
            signals: Arc::clone(&self.signals),
            slot,
        });
        let handle = ProcessHandle::new(control);

        let (outcome_tx, outcome_rx) = oneshot::channel();
        tokio::spawn(async move {
            let outcome = tokio::select! {
                _ = tokio::time::sleep(scripted.delay) => scripted.outcome,
                _ = terminated.notified() => ProcessOutcome {
                    exit_code: None,
                    duration_ms: scripted.outcome.duration_ms,
                    ..Default::default()
                },
            };
            let _ = outcome_tx.send(outcome);
        });

        Ok(SpawnedProcess::new(handle, outcome_rx))
    }
}
