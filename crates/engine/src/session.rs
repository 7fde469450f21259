// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-agent session manager.
//!
//! One session per agent serializes executions: at most one holder of the
//! lock at a time, waiters poll with bounded exponential backoff under a
//! deadline. The session also carries CLI session-id continuity: the first
//! real `session_id` reported by the CLI sticks, and later turns resume it.

use crate::bus::EventBus;
use crate::error::EngineError;
use crate::telemetry::Telemetry;
use crate::Result;
use kokino_adapters::ProcessHandle;
use kokino_core::{AgentId, Clock, Event, MetricKind, MetricRecord};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Lock-wait backoff: start, cap.
const BACKOFF_START_MS: u64 = 100;
const BACKOFF_CAP_MS: u64 = 1_000;
/// Grace between the termination signal and the force kill.
const KILL_GRACE: Duration = Duration::from_secs(5);
/// Sessions with an execution older than this are reaped.
pub const DEFAULT_STALE_AGE_MS: i64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Clone)]
struct ActiveExecution {
    started_at_ms: i64,
    timeout_ms: i64,
}

struct SessionState {
    /// Placeholder (the agent id) until the CLI reports a real session id.
    session_id: String,
    has_session: bool,
    locked: bool,
    active: Option<ActiveExecution>,
    process: Option<ProcessHandle>,
    cancel_requested: bool,
    queue_length: u32,
}

impl SessionState {
    fn new(agent_id: &AgentId) -> Self {
        Self {
            session_id: agent_id.to_string(),
            has_session: false,
            locked: false,
            active: None,
            process: None,
            cancel_requested: false,
            queue_length: 0,
        }
    }
}

/// Read-only snapshot of a session.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SessionView {
    pub session_id: String,
    pub has_session: bool,
    pub locked: bool,
    pub queue_length: u32,
    pub active_started_at_ms: Option<i64>,
    pub active_timeout_ms: Option<i64>,
}

/// Held session lock; releases on drop.
pub struct SessionLock {
    manager: SessionManager,
    agent_id: AgentId,
    released: bool,
}

impl SessionLock {
    /// Explicit release (equivalent to drop, but reads better at call sites).
    pub fn release(mut self) {
        self.manager.release_lock(&self.agent_id);
        self.released = true;
    }
}

impl Drop for SessionLock {
    fn drop(&mut self) {
        if !self.released {
            self.manager.release_lock(&self.agent_id);
        }
    }
}

/// Tracks one session per agent; enforces one execution at a time.
#[derive(Clone)]
pub struct SessionManager {
    sessions: Arc<Mutex<HashMap<AgentId, SessionState>>>,
    telemetry: Arc<dyn Telemetry>,
    bus: EventBus,
    clock: Arc<dyn Clock>,
}

impl SessionManager {
    pub fn new(telemetry: Arc<dyn Telemetry>, bus: EventBus, clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            telemetry,
            bus,
            clock,
        }
    }

    /// Acquire the agent's execution lock, waiting up to `wait_timeout_ms`.
    ///
    /// Waiters back off exponentially (100 ms doubling, 1 s cap) and respect
    /// the deadline. On timeout: a `lock_timeout` metric and `Busy`.
    pub async fn acquire_lock(
        &self,
        agent_id: &AgentId,
        wait_timeout_ms: i64,
        exec_timeout_ms: i64,
    ) -> Result<SessionLock> {
        let started = std::time::Instant::now();
        let mut backoff_ms = BACKOFF_START_MS;
        let mut waiting = false;

        loop {
            {
                let mut sessions = self.sessions.lock();
                let state = sessions
                    .entry(agent_id.clone())
                    .or_insert_with(|| SessionState::new(agent_id));

                if !state.locked {
                    state.locked = true;
                    state.cancel_requested = false;
                    state.active = Some(ActiveExecution {
                        started_at_ms: self.clock.now_ms(),
                        timeout_ms: exec_timeout_ms,
                    });
                    if waiting {
                        state.queue_length = state.queue_length.saturating_sub(1);
                    }
                    let waited_ms = started.elapsed().as_millis() as i64;
                    drop(sessions);

                    self.telemetry.record(
                        MetricRecord::new(MetricKind::LockAcquired, self.clock.now_ms())
                            .agent(agent_id.clone())
                            .duration(waited_ms),
                    );
                    self.bus.publish(Event::LockAcquired {
                        agent_id: agent_id.clone(),
                        waited_ms,
                    });
                    return Ok(SessionLock {
                        manager: self.clone(),
                        agent_id: agent_id.clone(),
                        released: false,
                    });
                }

                if !waiting {
                    waiting = true;
                    state.queue_length += 1;
                }
            }

            let waited = started.elapsed().as_millis() as i64;
            let remaining = wait_timeout_ms - waited;
            if remaining <= 0 {
                {
                    let mut sessions = self.sessions.lock();
                    if let Some(state) = sessions.get_mut(agent_id) {
                        state.queue_length = state.queue_length.saturating_sub(1);
                    }
                }
                self.telemetry.record(
                    MetricRecord::new(MetricKind::LockTimeout, self.clock.now_ms())
                        .agent(agent_id.clone())
                        .duration(waited),
                );
                self.bus.publish(Event::LockTimeout {
                    agent_id: agent_id.clone(),
                    waited_ms: waited,
                });
                return Err(EngineError::busy(
                    format!("agent {} is executing", agent_id),
                    Some(backoff_ms as i64),
                ));
            }

            let sleep_ms = backoff_ms.min(remaining as u64);
            tokio::time::sleep(Duration::from_millis(sleep_ms)).await;
            backoff_ms = (backoff_ms * 2).min(BACKOFF_CAP_MS);
        }
    }

    /// Release the lock. Idempotent; session id continuity is preserved.
    pub fn release_lock(&self, agent_id: &AgentId) {
        let mut sessions = self.sessions.lock();
        if let Some(state) = sessions.get_mut(agent_id) {
            state.locked = false;
            state.active = None;
            state.process = None;
        }
    }

    /// Record the CLI's real session id. One-shot: the first id sticks.
    pub fn mark_session_initialized(&self, agent_id: &AgentId, session_id: &str) {
        let mut sessions = self.sessions.lock();
        let state = sessions
            .entry(agent_id.clone())
            .or_insert_with(|| SessionState::new(agent_id));
        if !state.has_session {
            state.session_id = session_id.to_string();
            state.has_session = true;
            tracing::debug!(agent_id = %agent_id, session_id, "session initialized");
        }
    }

    /// True when the agent already has a CLI session to resume.
    pub fn resumable_session(&self, agent_id: &AgentId) -> Option<String> {
        let sessions = self.sessions.lock();
        sessions
            .get(agent_id)
            .filter(|s| s.has_session)
            .map(|s| s.session_id.clone())
    }

    /// Attach the running child to the active execution.
    pub fn register_process(&self, agent_id: &AgentId, handle: ProcessHandle) {
        let mut sessions = self.sessions.lock();
        if let Some(state) = sessions.get_mut(agent_id) {
            state.process = Some(handle);
        }
    }

    /// Cancel the active execution: graceful signal now, force kill after a
    /// grace period. `Conflict` when nothing is executing.
    pub fn cancel_execution(&self, agent_id: &AgentId) -> Result<()> {
        let handle = {
            let mut sessions = self.sessions.lock();
            let state = sessions
                .get_mut(agent_id)
                .ok_or_else(|| EngineError::not_found("session", agent_id.as_str()))?;
            if !state.locked {
                return Err(EngineError::Conflict(format!(
                    "agent {} has no active execution",
                    agent_id
                )));
            }
            state.cancel_requested = true;
            state.process.clone()
        };

        if let Some(handle) = handle {
            handle.terminate();
            tokio::spawn(async move {
                tokio::time::sleep(KILL_GRACE).await;
                handle.kill();
            });
        }

        self.telemetry.record(
            MetricRecord::new(MetricKind::ExecCancelled, self.clock.now_ms())
                .agent(agent_id.clone()),
        );
        self.bus.publish(Event::ExecCancelled {
            agent_id: agent_id.clone(),
        });
        Ok(())
    }

    /// Consume the cancel flag set by `cancel_execution`.
    pub fn take_cancel_requested(&self, agent_id: &AgentId) -> bool {
        let mut sessions = self.sessions.lock();
        match sessions.get_mut(agent_id) {
            Some(state) => std::mem::take(&mut state.cancel_requested),
            None => false,
        }
    }

    /// Drop the session record, cancelling any active execution first.
    pub fn end_session(&self, agent_id: &AgentId) {
        let _ = self.cancel_execution(agent_id);
        let removed = self.sessions.lock().remove(agent_id);
        if removed.is_some() {
            self.telemetry.record(
                MetricRecord::new(MetricKind::SessionEnded, self.clock.now_ms())
                    .agent(agent_id.clone()),
            );
            self.bus.publish(Event::SessionEnded {
                agent_id: agent_id.clone(),
            });
        }
    }

    /// End sessions whose active execution exceeds `max_age_ms`.
    pub fn cleanup_stale(&self, max_age_ms: i64) -> Vec<AgentId> {
        let now = self.clock.now_ms();
        let stale: Vec<AgentId> = {
            let sessions = self.sessions.lock();
            sessions
                .iter()
                .filter(|(_, s)| {
                    s.active
                        .as_ref()
                        .is_some_and(|a| now - a.started_at_ms > max_age_ms)
                })
                .map(|(id, _)| id.clone())
                .collect()
        };
        for agent_id in &stale {
            tracing::warn!(agent_id = %agent_id, "reaping stale session");
            self.end_session(agent_id);
        }
        stale
    }

    /// Snapshot for status queries.
    pub fn session(&self, agent_id: &AgentId) -> Option<SessionView> {
        let sessions = self.sessions.lock();
        sessions.get(agent_id).map(|s| SessionView {
            session_id: s.session_id.clone(),
            has_session: s.has_session,
            locked: s.locked,
            queue_length: s.queue_length,
            active_started_at_ms: s.active.as_ref().map(|a| a.started_at_ms),
            active_timeout_ms: s.active.as_ref().map(|a| a.timeout_ms),
        })
    }

    /// Number of sessions currently executing.
    pub fn active_count(&self) -> usize {
        self.sessions.lock().values().filter(|s| s.locked).count()
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
