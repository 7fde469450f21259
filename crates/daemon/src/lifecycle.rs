// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon assembly, startup, and shutdown.
//!
//! Startup order: state dir + pid lock, stores, engine, listeners, sweeps.
//! Shutdown order is the reverse: stop accepting, notify observers, end
//! sessions, stop loops. The pid file is flock-held for the process
//! lifetime so a second daemon on the same state dir refuses to start.

use crate::config::Config;
use crate::env;
use crate::listener::{ListenCtx, Listener};
use crate::stream::MonitorStream;
use crate::ws;
use fs2::FileExt;
use kokino_adapters::{ProcessSupervisor, TermBackend, TmuxBackend};
use kokino_core::{Clock, IdGen, SystemClock, UuidIdGen};
use kokino_engine::{
    CircuitBreaker, CircuitBreakerConfig, DeliveryProvider, DeliveryRouter, FallbackController,
    HeadlessProvider, MonitorConfig, ResourceMonitor, Runner, RunnerConfig, SessionManager,
    ShadowController, StoreTelemetry, Telemetry, TicketService, TmuxProvider,
};
use kokino_engine::router::TmuxProviderConfig;
use kokino_storage::{
    AgentStore, ConversationStore, Db, MessageStore, MonitoringStore, ShadowStore, TelemetryStore,
    TicketStore,
};
use std::fs::File;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::net::{TcpListener, UnixListener};
use tokio::sync::Notify;

/// Stale-session reap age.
const STALE_SESSION_MS: i64 = kokino_engine::session::DEFAULT_STALE_AGE_MS;

/// Errors during daemon startup.
#[derive(Debug, Error)]
pub enum StartError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage error: {0}")]
    Storage(#[from] kokino_storage::StorageError),
    #[error("another daemon holds {0}")]
    AlreadyRunning(String),
}

/// A fully wired daemon, ready to run.
pub struct Daemon {
    ctx: Arc<ListenCtx>,
    monitor: ResourceMonitor,
    pid_file: File,
}

impl Daemon {
    /// Wire the production daemon: real clock, real subprocesses, tmux.
    pub fn start(config: Config) -> Result<Self, StartError> {
        Self::start_with(
            config,
            Arc::new(kokino_adapters::TokioProcessSupervisor::new()),
            TmuxBackend::new(),
        )
    }

    /// Wire with injectable process and terminal backends.
    pub fn start_with<B: TermBackend>(
        config: Config,
        supervisor: Arc<dyn ProcessSupervisor>,
        term: B,
    ) -> Result<Self, StartError> {
        std::fs::create_dir_all(&config.state_dir)?;

        let pid_file = File::create(config.pid_path())?;
        if pid_file.try_lock_exclusive().is_err() {
            return Err(StartError::AlreadyRunning(
                config.pid_path().display().to_string(),
            ));
        }
        std::fs::write(config.pid_path(), format!("{}\n", std::process::id()))?;

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let ids: Arc<dyn IdGen> = Arc::new(UuidIdGen);
        let db = Db::open(&config.db_path())?;
        let telemetry_store = TelemetryStore::open(&config.telemetry_db_path(), clock.clone())?;
        let telemetry: Arc<dyn Telemetry> = StoreTelemetry::spawn(telemetry_store.clone());

        let ctx = assemble(
            config,
            db,
            telemetry_store,
            telemetry,
            supervisor,
            term,
            clock,
            ids,
        );
        let monitor = ResourceMonitor::new(
            ctx.agents.clone(),
            ctx.monitoring.clone(),
            ctx.bus.clone(),
            MonitorConfig::default(),
        );

        Ok(Self {
            ctx,
            monitor,
            pid_file,
        })
    }

    /// Run until a shutdown request or signal arrives.
    pub async fn run(self) -> Result<(), StartError> {
        let ctx = &self.ctx;

        // Stale socket from a crashed run; the pid lock already proved we
        // are alone.
        let socket_path = ctx.config.socket_path();
        if socket_path.exists() {
            std::fs::remove_file(&socket_path)?;
        }
        let unix_listener = UnixListener::bind(&socket_path)?;
        let ws_listener = TcpListener::bind(&ctx.config.ws_addr).await?;
        tracing::info!(
            socket = %socket_path.display(),
            ws = %ctx.config.ws_addr,
            "kokinod listening"
        );

        // Observer fan-out.
        tokio::spawn(ctx.stream.clone().run());
        tokio::spawn(ws::run_ws_listener(
            ws_listener,
            ctx.stream.clone(),
            Arc::clone(&ctx.shutdown),
        ));

        // Periodic work.
        let monitor_handle = self.monitor.clone().spawn();
        spawn_sweeps(Arc::clone(ctx));

        // Protocol listener.
        tokio::spawn(Listener::new(unix_listener, Arc::clone(ctx)).run());

        wait_for_shutdown(Arc::clone(&ctx.shutdown)).await;
        tracing::info!("shutting down");

        ctx.stream.shutdown("daemon stopping");
        monitor_handle.stop();
        ctx.sessions.cleanup_stale(0);

        let _ = std::fs::remove_file(&socket_path);
        let _ = fs2::FileExt::unlock(&self.pid_file);
        let _ = std::fs::remove_file(ctx.config.pid_path());
        Ok(())
    }

    /// Shared context (for embedding and tests).
    pub(crate) fn ctx(&self) -> Arc<ListenCtx> {
        Arc::clone(&self.ctx)
    }
}

/// Build the shared context from its parts.
#[allow(clippy::too_many_arguments)]
pub(crate) fn assemble<B: TermBackend>(
    config: Config,
    db: Db,
    telemetry_store: TelemetryStore,
    telemetry: Arc<dyn Telemetry>,
    supervisor: Arc<dyn ProcessSupervisor>,
    term: B,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGen>,
) -> Arc<ListenCtx> {
    let bus = kokino_engine::EventBus::new(clock.clone());

    let agents = AgentStore::new(db.clone(), clock.clone());
    let conversations = ConversationStore::new(db.clone(), clock.clone());
    let messages = MessageStore::new(db.clone(), clock.clone());
    let monitoring = MonitoringStore::new(db.clone(), clock.clone());
    let ticket_store = TicketStore::new(db.clone(), clock.clone());
    let shadow_store = ShadowStore::new(db, clock.clone());

    let sessions = SessionManager::new(telemetry.clone(), bus.clone(), clock.clone());
    let runner = Runner::new(
        agents.clone(),
        conversations.clone(),
        sessions.clone(),
        supervisor,
        telemetry.clone(),
        bus.clone(),
        ids.clone(),
        clock.clone(),
        RunnerConfig {
            default_timeout_ms: config.execute_timeout_ms,
            model: config.model.clone(),
            mcp_config: config.mcp_config.clone(),
            cwd: config.agent_cwd.clone(),
            ..Default::default()
        },
    );

    let headless: Arc<dyn DeliveryProvider> = Arc::new(HeadlessProvider::new(runner));
    let tmux: Arc<dyn DeliveryProvider> = Arc::new(TmuxProvider::new(
        term,
        TmuxProviderConfig {
            cwd: config
                .agent_cwd
                .clone()
                .unwrap_or_else(std::env::temp_dir),
            ..Default::default()
        },
    ));
    let shadow = Arc::new(ShadowController::new(
        headless.clone(),
        tmux.clone(),
        shadow_store,
        telemetry.clone(),
        bus.clone(),
        ids.clone(),
        clock.clone(),
    ));

    let fallback = FallbackController::new();
    let breaker = CircuitBreaker::new(
        CircuitBreakerConfig::default(),
        telemetry.clone(),
        bus.clone(),
        clock.clone(),
    );
    let tickets = TicketService::new(
        agents.clone(),
        ticket_store,
        messages.clone(),
        bus.clone(),
        ids.clone(),
        clock.clone(),
    );
    let router = DeliveryRouter::new(
        agents.clone(),
        fallback.clone(),
        breaker.clone(),
        headless,
        tmux,
        shadow.clone(),
        bus.clone(),
    );
    let stream = MonitorStream::new(bus.clone(), ids, clock.clone());

    Arc::new(ListenCtx {
        config,
        agents,
        conversations,
        messages,
        monitoring,
        telemetry_store,
        telemetry,
        tickets,
        router,
        sessions,
        breaker,
        fallback,
        shadow,
        stream,
        bus,
        clock,
        start_time: Instant::now(),
        shutdown: Arc::new(Notify::new()),
    })
}

/// Ticket deadlines, stale sessions, settled-ticket retention, heartbeats.
fn spawn_sweeps(ctx: Arc<ListenCtx>) {
    let ticket_ctx = Arc::clone(&ctx);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(env::ticket_sweep_interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticket_ctx.shutdown.notified() => break,
                _ = ticker.tick() => {
                    let expired = ticket_ctx.tickets.expire_overdue();
                    if expired > 0 {
                        tracing::debug!(expired, "ticket deadlines expired");
                    }
                }
            }
        }
    });

    let session_ctx = Arc::clone(&ctx);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(env::session_sweep_interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = session_ctx.shutdown.notified() => break,
                _ = ticker.tick() => {
                    let reaped = session_ctx.sessions.cleanup_stale(STALE_SESSION_MS);
                    if !reaped.is_empty() {
                        tracing::warn!(?reaped, "stale sessions reaped");
                    }
                    match session_ctx.tickets.cleanup(session_ctx.config.ticket_retention_ms) {
                        Ok(deleted) if deleted > 0 => {
                            tracing::debug!(deleted, "settled tickets removed");
                        }
                        Ok(_) => {}
                        Err(e) => tracing::warn!(error = %e, "ticket retention sweep failed"),
                    }
                }
            }
        }
    });

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(env::heartbeat_interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ctx.shutdown.notified() => break,
                _ = ticker.tick() => ctx.stream.heartbeat(),
            }
        }
    });
}

async fn wait_for_shutdown(shutdown: Arc<Notify>) {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigint = match signal(SignalKind::interrupt()) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "signal handler failed; running until killed");
            shutdown.notified().await;
            return;
        }
    };
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "signal handler failed; running until killed");
            shutdown.notified().await;
            return;
        }
    };

    tokio::select! {
        _ = shutdown.notified() => {}
        _ = sigint.recv() => shutdown.notify_waiters(),
        _ = sigterm.recv() => shutdown.notify_waiters(),
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
