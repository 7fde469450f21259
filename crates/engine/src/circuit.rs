// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-agent circuit breaker.
//!
//! ```text
//! closed ──failures>=threshold──▶ open ──after reset_ms──▶ half_open
//!   ▲                                                          │
//!   └──────────────probe succeeds──────────────────────────────┘
//!                probe fails -> open (timer restarts)
//! ```
//!
//! Only upstream-class failures (upstream, timeout, internal) count toward
//! opening; a busy session or a validation error says nothing about the
//! CLI's health.

use crate::bus::EventBus;
use crate::error::EngineError;
use crate::telemetry::Telemetry;
use crate::Result;
use kokino_core::{AgentId, Clock, ErrorKind, Event, MetricKind, MetricRecord};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

/// Breaker tuning.
#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub reset_ms: i64,
    pub half_open_max_probes: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_ms: 60_000,
            half_open_max_probes: 1,
        }
    }
}

/// Observable breaker phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitPhase {
    Closed,
    Open,
    HalfOpen,
}

/// Snapshot for status queries.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CircuitSnapshot {
    pub phase: CircuitPhase,
    pub failures: u32,
    pub last_failure_ms: Option<i64>,
    /// Time until a half-open probe is admitted, when open.
    pub retry_after_ms: Option<i64>,
}

enum Phase {
    Closed,
    Open { opened_at_ms: i64 },
    HalfOpen { inflight: u32 },
}

struct CircuitState {
    phase: Phase,
    failures: u32,
    last_failure_ms: Option<i64>,
}

impl Default for CircuitState {
    fn default() -> Self {
        Self {
            phase: Phase::Closed,
            failures: 0,
            last_failure_ms: None,
        }
    }
}

/// Per-agent failure isolation.
#[derive(Clone)]
pub struct CircuitBreaker {
    circuits: Arc<Mutex<HashMap<AgentId, CircuitState>>>,
    config: CircuitBreakerConfig,
    telemetry: Arc<dyn Telemetry>,
    bus: EventBus,
    clock: Arc<dyn Clock>,
}

impl CircuitBreaker {
    pub fn new(
        config: CircuitBreakerConfig,
        telemetry: Arc<dyn Telemetry>,
        bus: EventBus,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            circuits: Arc::new(Mutex::new(HashMap::new())),
            config,
            telemetry,
            bus,
            clock,
        }
    }

    /// Run `action` under the agent's circuit.
    ///
    /// Open circuits reject with the remaining reset time; a saturated
    /// half-open circuit rejects until its probe settles.
    pub async fn execute<T, F, Fut>(&self, agent_id: &AgentId, action: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let probing = self.admit(agent_id)?;
        let result = action().await;
        self.settle(agent_id, probing, &result);
        result
    }

    fn admit(&self, agent_id: &AgentId) -> Result<bool> {
        let now = self.clock.now_ms();
        let mut circuits = self.circuits.lock();
        let state = circuits.entry(agent_id.clone()).or_default();

        if let Phase::Open { opened_at_ms } = state.phase {
            let elapsed = now - opened_at_ms;
            if elapsed >= self.config.reset_ms {
                state.phase = Phase::HalfOpen { inflight: 0 };
                drop(circuits);
                self.emit(agent_id, MetricKind::CircuitHalfOpen);
                self.bus.publish(Event::CircuitHalfOpen {
                    agent_id: agent_id.clone(),
                });
                return self.admit(agent_id);
            }
            let remaining = self.config.reset_ms - elapsed;
            return Err(EngineError::busy(
                format!("circuit open for agent {}", agent_id),
                Some(remaining),
            ));
        }

        if let Phase::HalfOpen { inflight } = &mut state.phase {
            if *inflight >= self.config.half_open_max_probes {
                return Err(EngineError::busy(
                    format!("circuit half-open probe in flight for agent {}", agent_id),
                    Some(self.config.reset_ms),
                ));
            }
            *inflight += 1;
            return Ok(true);
        }

        Ok(false)
    }

    fn settle<T>(&self, agent_id: &AgentId, probing: bool, result: &Result<T>) {
        let now = self.clock.now_ms();
        let mut circuits = self.circuits.lock();
        let Some(state) = circuits.get_mut(agent_id) else {
            return;
        };

        match result {
            Ok(_) => {
                let recovered = probing || matches!(state.phase, Phase::HalfOpen { .. });
                state.phase = Phase::Closed;
                state.failures = 0;
                drop(circuits);
                if recovered {
                    self.emit(agent_id, MetricKind::CircuitRecovered);
                    self.bus.publish(Event::CircuitRecovered {
                        agent_id: agent_id.clone(),
                    });
                }
            }
            Err(err) if counts_as_failure(err) => {
                state.last_failure_ms = Some(now);
                if probing {
                    state.phase = Phase::Open { opened_at_ms: now };
                    drop(circuits);
                    self.emit(agent_id, MetricKind::CircuitRecoveryFailed);
                    self.bus.publish(Event::CircuitRecoveryFailed {
                        agent_id: agent_id.clone(),
                    });
                    return;
                }
                state.failures += 1;
                if state.failures >= self.config.failure_threshold {
                    let failures = state.failures;
                    state.phase = Phase::Open { opened_at_ms: now };
                    drop(circuits);
                    self.emit(agent_id, MetricKind::CircuitOpened);
                    self.bus.publish(Event::CircuitOpened {
                        agent_id: agent_id.clone(),
                        failures,
                    });
                }
            }
            Err(_) => {
                // Non-upstream error: the probe slot frees, nothing counted.
                if probing {
                    if let Phase::HalfOpen { inflight } = &mut state.phase {
                        *inflight = inflight.saturating_sub(1);
                    }
                }
            }
        }
    }

    /// Manual close (operator action).
    pub fn reset(&self, agent_id: &AgentId) {
        let mut circuits = self.circuits.lock();
        let state = circuits.entry(agent_id.clone()).or_default();
        state.phase = Phase::Closed;
        state.failures = 0;
        drop(circuits);
        self.emit(agent_id, MetricKind::CircuitReset);
        self.bus.publish(Event::CircuitReset {
            agent_id: agent_id.clone(),
        });
    }

    /// Snapshot for status queries.
    pub fn snapshot(&self, agent_id: &AgentId) -> CircuitSnapshot {
        let now = self.clock.now_ms();
        let circuits = self.circuits.lock();
        match circuits.get(agent_id) {
            Some(state) => CircuitSnapshot {
                phase: match state.phase {
                    Phase::Closed => CircuitPhase::Closed,
                    Phase::Open { .. } => CircuitPhase::Open,
                    Phase::HalfOpen { .. } => CircuitPhase::HalfOpen,
                },
                failures: state.failures,
                last_failure_ms: state.last_failure_ms,
                retry_after_ms: match state.phase {
                    Phase::Open { opened_at_ms } => {
                        Some((self.config.reset_ms - (now - opened_at_ms)).max(0))
                    }
                    _ => None,
                },
            },
            None => CircuitSnapshot {
                phase: CircuitPhase::Closed,
                failures: 0,
                last_failure_ms: None,
                retry_after_ms: None,
            },
        }
    }

    fn emit(&self, agent_id: &AgentId, kind: MetricKind) {
        self.telemetry
            .record(MetricRecord::new(kind, self.clock.now_ms()).agent(agent_id.clone()));
    }
}

/// Only upstream-class failures say anything about the CLI's health.
fn counts_as_failure(err: &EngineError) -> bool {
    matches!(
        err.kind(),
        ErrorKind::Upstream | ErrorKind::Timeout | ErrorKind::Internal
    )
}

#[cfg(test)]
#[path = "circuit_tests.rs"]
mod tests;
