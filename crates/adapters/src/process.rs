// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Child process supervision with resource limits.
//!
//! Spawns a CLI child with stdin closed, captures stdout/stderr fully, and
//! watches the process: RSS is sampled on an interval, a memory breach gets
//! a graceful termination signal, and an absolute deadline of twice the
//! configured timeout force-kills anything still alive. The soft timeout
//! itself is the caller's concern; the absolute kill is the backstop.

use crate::env::{monitor_sample_ms, ProcessEnv};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use sysinfo::{Pid, ProcessRefreshKind, System};
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::sync::oneshot;

/// Default soft execution timeout (5 minutes).
pub const DEFAULT_TIMEOUT_MS: u64 = 300_000;
/// Default memory ceiling.
pub const DEFAULT_MAX_MEMORY_MB: u64 = 2_048;
/// Default CPU ceiling (breaches are warnings only).
pub const DEFAULT_MAX_CPU_PERCENT: f32 = 90.0;

/// Errors from spawning a child.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("spawn failed: {0}")]
    SpawnFailed(String),
    #[error("supervisor task dropped without an outcome")]
    OutcomeLost,
}

/// Resource bounds for one supervised child.
#[derive(Debug, Clone, Copy)]
pub struct ProcessLimits {
    pub max_memory_mb: u64,
    pub max_cpu_percent: f32,
    pub timeout_ms: u64,
}

impl Default for ProcessLimits {
    fn default() -> Self {
        Self {
            max_memory_mb: DEFAULT_MAX_MEMORY_MB,
            max_cpu_percent: DEFAULT_MAX_CPU_PERCENT,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

/// What to spawn and under which bounds.
#[derive(Debug, Clone)]
pub struct SpawnSpec {
    pub command: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: ProcessEnv,
    pub limits: ProcessLimits,
}

impl SpawnSpec {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            cwd: None,
            env: ProcessEnv::inherited(),
            limits: ProcessLimits::default(),
        }
    }
}

/// Which limit a child breached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitBreach {
    Memory { rss_mb: u64 },
}

/// Collected result of one supervised run.
#[derive(Debug, Clone, Default)]
pub struct ProcessOutcome {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: i64,
    pub limit_breached: Option<LimitBreach>,
    /// True when the absolute deadline force-killed the child.
    pub zombie_killed: bool,
}

impl ProcessOutcome {
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0) && !self.zombie_killed
    }
}

/// Signal-level control over a running child.
pub trait ProcessControl: Send + Sync + 'static {
    fn pid(&self) -> Option<i32>;
    /// Graceful stop (SIGTERM).
    fn terminate(&self);
    /// Force kill (SIGKILL).
    fn kill(&self);
}

/// Cloneable handle to a supervised child.
#[derive(Clone)]
pub struct ProcessHandle {
    inner: Arc<dyn ProcessControl>,
}

impl ProcessHandle {
    pub fn new(inner: Arc<dyn ProcessControl>) -> Self {
        Self { inner }
    }

    pub fn pid(&self) -> Option<i32> {
        self.inner.pid()
    }

    pub fn terminate(&self) {
        self.inner.terminate();
    }

    pub fn kill(&self) {
        self.inner.kill();
    }
}

impl std::fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessHandle").field("pid", &self.pid()).finish()
    }
}

/// A spawned child: a control handle plus a pending outcome.
#[derive(Debug)]
pub struct SpawnedProcess {
    handle: ProcessHandle,
    outcome_rx: oneshot::Receiver<ProcessOutcome>,
}

impl SpawnedProcess {
    pub fn new(handle: ProcessHandle, outcome_rx: oneshot::Receiver<ProcessOutcome>) -> Self {
        Self { handle, outcome_rx }
    }

    pub fn handle(&self) -> ProcessHandle {
        self.handle.clone()
    }

    /// Wait for the child to finish and collect its outcome.
    pub async fn wait(self) -> Result<ProcessOutcome, SupervisorError> {
        self.outcome_rx
            .await
            .map_err(|_| SupervisorError::OutcomeLost)
    }
}

/// Spawns and supervises CLI children.
#[async_trait]
pub trait ProcessSupervisor: Send + Sync + 'static {
    async fn spawn(&self, spec: SpawnSpec) -> Result<SpawnedProcess, SupervisorError>;
}

/// Production supervisor backed by `tokio::process`.
#[derive(Clone, Default)]
pub struct TokioProcessSupervisor;

impl TokioProcessSupervisor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProcessSupervisor for TokioProcessSupervisor {
    async fn spawn(&self, spec: SpawnSpec) -> Result<SpawnedProcess, SupervisorError> {
        let mut cmd = Command::new(&spec.command);
        cmd.args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .env_clear()
            .envs(spec.env.resolve())
            .kill_on_drop(true);
        if let Some(cwd) = &spec.cwd {
            cmd.current_dir(cwd);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| SupervisorError::SpawnFailed(format!("{}: {}", spec.command, e)))?;

        let pid = child
            .id()
            .and_then(|p| i32::try_from(p).ok())
            .ok_or_else(|| SupervisorError::SpawnFailed("child has no pid".to_string()))?;

        tracing::debug!(command = %spec.command, pid, "child spawned");

        let control: Arc<dyn ProcessControl> = Arc::new(UnixProcessControl { pid });
        let handle = ProcessHandle::new(Arc::clone(&control));

        // Drain stdout/stderr concurrently so the child never blocks on a
        // full pipe.
        let mut stdout_pipe = child.stdout.take();
        let mut stderr_pipe = child.stderr.take();
        let stdout_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Some(pipe) = stdout_pipe.as_mut() {
                let _ = pipe.read_to_end(&mut buf).await;
            }
            buf
        });
        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Some(pipe) = stderr_pipe.as_mut() {
                let _ = pipe.read_to_end(&mut buf).await;
            }
            buf
        });

        let (outcome_tx, outcome_rx) = oneshot::channel();
        let limits = spec.limits;
        let ctl = handle.clone();

        tokio::spawn(async move {
            let started = Instant::now();
            let absolute_deadline =
                tokio::time::Instant::now() + Duration::from_millis(limits.timeout_ms * 2);
            let mut sampler = tokio::time::interval(monitor_sample_ms());
            sampler.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            let mut system = System::new();
            let mut limit_breached: Option<LimitBreach> = None;
            let mut zombie_killed = false;

            let status = loop {
                tokio::select! {
                    status = child.wait() => break status,

                    _ = tokio::time::sleep_until(absolute_deadline) => {
                        tracing::warn!(pid, "absolute deadline expired, force killing child");
                        zombie_killed = true;
                        ctl.kill();
                        break child.wait().await;
                    }

                    _ = sampler.tick(), if limit_breached.is_none() => {
                        if let Some(breach) = sample_child(&mut system, pid, &limits) {
                            tracing::warn!(pid, ?breach, "memory limit exceeded, terminating child");
                            limit_breached = Some(breach);
                            ctl.terminate();
                        }
                    }
                }
            };

            let stdout = stdout_task.await.unwrap_or_default();
            let stderr = stderr_task.await.unwrap_or_default();
            let exit_code = status.ok().and_then(|s| s.code());
            let duration_ms = started.elapsed().as_millis() as i64;

            tracing::debug!(pid, ?exit_code, duration_ms, "child exited");

            let _ = outcome_tx.send(ProcessOutcome {
                exit_code,
                stdout: String::from_utf8_lossy(&stdout).into_owned(),
                stderr: String::from_utf8_lossy(&stderr).into_owned(),
                duration_ms,
                limit_breached,
                zombie_killed,
            });
        });

        Ok(SpawnedProcess::new(handle, outcome_rx))
    }
}

/// One resource sample; returns a breach when RSS exceeds the ceiling.
/// CPU overages only warn.
fn sample_child(system: &mut System, pid: i32, limits: &ProcessLimits) -> Option<LimitBreach> {
    let spid = Pid::from_u32(pid as u32);
    system.refresh_process_specifics(spid, ProcessRefreshKind::new().with_cpu().with_memory());
    let process = system.process(spid)?;

    let rss_mb = process.memory() / (1024 * 1024);
    let cpu = process.cpu_usage();

    if cpu > limits.max_cpu_percent {
        tracing::warn!(pid, cpu, limit = limits.max_cpu_percent, "cpu above limit");
    }
    if rss_mb > limits.max_memory_mb {
        return Some(LimitBreach::Memory { rss_mb });
    }
    None
}

struct UnixProcessControl {
    pid: i32,
}

impl UnixProcessControl {
    fn signal(&self, sig: nix::sys::signal::Signal) {
        use nix::sys::signal::kill;
        use nix::unistd::Pid as NixPid;
        if let Err(e) = kill(NixPid::from_raw(self.pid), sig) {
            tracing::debug!(pid = self.pid, %sig, error = %e, "signal delivery failed");
        }
    }
}

impl ProcessControl for UnixProcessControl {
    fn pid(&self) -> Option<i32> {
        Some(self.pid)
    }

    fn terminate(&self) {
        self.signal(nix::sys::signal::Signal::SIGTERM);
    }

    fn kill(&self) {
        self.signal(nix::sys::signal::Signal::SIGKILL);
    }
}

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
pub mod fake;

#[cfg(test)]
#[path = "process_tests.rs"]
mod tests;
