// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resource monitoring service.
//!
//! Three periodic loops: sample CPU/RSS for every online agent with a
//! registered pid, raise threshold alerts from the latest samples plus the
//! unresolved error count, and sweep old rows daily. Alerts are persisted
//! as agent events and broadcast on the bus; the monitor never talks to the
//! stream directly.

use crate::bus::EventBus;
use crate::Result;
use kokino_core::event::AlertLevel;
use kokino_core::{AgentRecord, Event};
use kokino_storage::{AgentStore, CleanupCounts, MonitoringStore};
use std::sync::Arc;
use std::time::Duration;
use sysinfo::{Pid, ProcessRefreshKind, System};
use tokio::sync::Notify;

/// Monitor intervals and alert thresholds.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub sample_interval: Duration,
    pub alert_interval: Duration,
    pub cleanup_interval: Duration,
    pub retention_days: i64,
    pub cpu_warning: f64,
    pub cpu_critical: f64,
    pub memory_warning_mb: f64,
    pub memory_critical_mb: f64,
    pub errors_warning: i64,
    pub errors_critical: i64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            sample_interval: Duration::from_secs(30),
            alert_interval: Duration::from_secs(60),
            cleanup_interval: Duration::from_secs(24 * 60 * 60),
            retention_days: 7,
            cpu_warning: 80.0,
            cpu_critical: 95.0,
            memory_warning_mb: 1_024.0,
            memory_critical_mb: 2_048.0,
            errors_warning: 5,
            errors_critical: 10,
        }
    }
}

/// Handle for stopping the monitor loops.
pub struct MonitorHandle {
    shutdown: Arc<Notify>,
}

impl MonitorHandle {
    pub fn stop(&self) {
        self.shutdown.notify_waiters();
    }
}

/// Periodic resource sampler and alerter.
#[derive(Clone)]
pub struct ResourceMonitor {
    agents: AgentStore,
    monitoring: MonitoringStore,
    bus: EventBus,
    config: MonitorConfig,
}

impl ResourceMonitor {
    pub fn new(
        agents: AgentStore,
        monitoring: MonitoringStore,
        bus: EventBus,
        config: MonitorConfig,
    ) -> Self {
        Self {
            agents,
            monitoring,
            bus,
            config,
        }
    }

    /// Start the three loops; the handle stops all of them.
    pub fn spawn(self) -> MonitorHandle {
        let shutdown = Arc::new(Notify::new());

        let sampler = self.clone();
        let stop = Arc::clone(&shutdown);
        tokio::spawn(async move {
            let mut system = System::new();
            let mut ticker = tokio::time::interval(sampler.config.sample_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = stop.notified() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = sampler.sample_once(&mut system) {
                            tracing::warn!(error = %e, "resource sample failed");
                        }
                    }
                }
            }
        });

        let alerter = self.clone();
        let stop = Arc::clone(&shutdown);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(alerter.config.alert_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = stop.notified() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = alerter.alert_once() {
                            tracing::warn!(error = %e, "alert pass failed");
                        }
                    }
                }
            }
        });

        let cleaner = self.clone();
        let stop = Arc::clone(&shutdown);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(cleaner.config.cleanup_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick fires immediately; skip it so startup does not
            // run a sweep.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = stop.notified() => break,
                    _ = ticker.tick() => {
                        match cleaner.cleanup_once() {
                            Ok(counts) => tracing::info!(?counts, "monitoring retention sweep"),
                            Err(e) => tracing::warn!(error = %e, "retention sweep failed"),
                        }
                    }
                }
            }
        });

        MonitorHandle { shutdown }
    }

    /// Sample every online agent with a registered pid.
    pub fn sample_once(&self, system: &mut System) -> Result<usize> {
        let mut sampled = 0;
        for agent in self.agents.list_online()? {
            let Some(pid) = agent.pid() else { continue };
            let spid = Pid::from_u32(pid as u32);
            system
                .refresh_process_specifics(spid, ProcessRefreshKind::new().with_cpu().with_memory());
            let Some(process) = system.process(spid) else {
                tracing::debug!(agent_id = %agent.agent_id, pid, "registered pid not running");
                continue;
            };
            let cpu = process.cpu_usage() as f64;
            let memory_mb = process.memory() as f64 / (1024.0 * 1024.0);
            self.monitoring
                .record_metric(&agent.agent_id, cpu, memory_mb, Some(pid))?;
            sampled += 1;
        }
        Ok(sampled)
    }

    /// Raise threshold alerts from the latest sample per agent, and flip
    /// heartbeat-stale agents offline.
    pub fn alert_once(&self) -> Result<usize> {
        let mut alerts = 0;

        for agent_id in self.agents.sweep_offline()? {
            self.bus.publish(Event::AgentStatusChanged {
                agent_id,
                status: kokino_core::AgentStatus::Offline,
            });
        }

        for agent in self.agents.list_online()? {
            alerts += self.alert_for_agent(&agent)?;
        }
        Ok(alerts)
    }

    fn alert_for_agent(&self, agent: &AgentRecord) -> Result<usize> {
        let mut raised = 0;

        if let Some(metric) = self.monitoring.latest_metric(&agent.agent_id)? {
            if let Some((level, message)) = threshold(
                metric.cpu_percent,
                self.config.cpu_warning,
                self.config.cpu_critical,
                "cpu",
                "%",
            ) {
                self.raise(agent, level, &message, serde_json::json!({ "cpu": metric.cpu_percent }))?;
                raised += 1;
            }
            if let Some((level, message)) = threshold(
                metric.memory_mb,
                self.config.memory_warning_mb,
                self.config.memory_critical_mb,
                "memory",
                " MB",
            ) {
                self.raise(
                    agent,
                    level,
                    &message,
                    serde_json::json!({ "memory_mb": metric.memory_mb }),
                )?;
                raised += 1;
            }
        }

        let unresolved = self.monitoring.unresolved_count(&agent.agent_id)?;
        if let Some((level, message)) = threshold(
            unresolved as f64,
            self.config.errors_warning as f64,
            self.config.errors_critical as f64,
            "unresolved errors",
            "",
        ) {
            self.raise(
                agent,
                level,
                &message,
                serde_json::json!({ "unresolved": unresolved }),
            )?;
            raised += 1;
        }
        Ok(raised)
    }

    fn raise(
        &self,
        agent: &AgentRecord,
        level: AlertLevel,
        message: &str,
        metadata: serde_json::Value,
    ) -> Result<()> {
        tracing::warn!(agent_id = %agent.agent_id, level = level.as_str(), message, "monitor alert");
        self.monitoring
            .record_alert(&agent.agent_id, level, message, metadata)?;
        self.bus.publish(Event::MonitorAlert {
            agent_id: agent.agent_id.clone(),
            level,
            message: message.to_string(),
        });
        Ok(())
    }

    /// Retention sweep; unresolved errors are kept.
    pub fn cleanup_once(&self) -> Result<CleanupCounts> {
        Ok(self.monitoring.cleanup(self.config.retention_days)?)
    }
}

/// Compare a reading against warning/critical thresholds.
fn threshold(
    value: f64,
    warning: f64,
    critical: f64,
    what: &str,
    unit: &str,
) -> Option<(AlertLevel, String)> {
    if value >= critical {
        Some((
            AlertLevel::Critical,
            format!("{} at {:.0}{} (critical threshold {:.0}{})", what, value, unit, critical, unit),
        ))
    } else if value >= warning {
        Some((
            AlertLevel::Warning,
            format!("{} at {:.0}{} (warning threshold {:.0}{})", what, value, unit, warning, unit),
        ))
    } else {
        None
    }
}

#[cfg(test)]
#[path = "monitor_tests.rs"]
mod tests;
