// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Listener task for handling socket I/O.
//!
//! Accepts unix-socket connections and serves the request/response
//! protocol without blocking the engine. Every request lands one `request`
//! telemetry row (path, duration, success) so endpoint rollups work.

mod agents;
mod execute;
mod metrics;
mod queries;
mod tickets;

use crate::config::Config;
use crate::protocol::{DaemonStatus, Request, Response, PROTOCOL_VERSION};
use crate::protocol_wire::{self, ProtocolError};
use crate::stream::MonitorStream;
use kokino_core::{Clock, MetricKind, MetricRecord};
use kokino_engine::{
    CircuitBreaker, DeliveryRouter, EngineError, EventBus, FallbackController, SessionManager,
    ShadowController, Telemetry, TicketService,
};
use kokino_storage::{
    AgentStore, ConversationStore, MessageStore, MonitoringStore, TelemetryStore,
};
use std::sync::Arc;
use std::time::Instant;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::Notify;
use tracing::{debug, error, warn};

/// Shared daemon context for all request handlers.
pub(crate) struct ListenCtx {
    pub config: Config,
    pub agents: AgentStore,
    pub conversations: ConversationStore,
    pub messages: MessageStore,
    pub monitoring: MonitoringStore,
    pub telemetry_store: TelemetryStore,
    pub telemetry: Arc<dyn Telemetry>,
    pub tickets: TicketService,
    pub router: DeliveryRouter,
    pub sessions: SessionManager,
    pub breaker: CircuitBreaker,
    pub fallback: FallbackController,
    pub shadow: Arc<ShadowController>,
    pub stream: MonitorStream,
    pub bus: EventBus,
    pub clock: Arc<dyn Clock>,
    pub start_time: Instant,
    pub shutdown: Arc<Notify>,
}

/// Listener task for accepting socket connections.
pub(crate) struct Listener {
    socket: UnixListener,
    ctx: Arc<ListenCtx>,
}

impl Listener {
    pub fn new(socket: UnixListener, ctx: Arc<ListenCtx>) -> Self {
        Self { socket, ctx }
    }

    /// Run the accept loop until shutdown.
    pub async fn run(self) {
        loop {
            tokio::select! {
                _ = self.ctx.shutdown.notified() => break,
                accepted = self.socket.accept() => match accepted {
                    Ok((stream, _)) => {
                        let ctx = Arc::clone(&self.ctx);
                        tokio::spawn(async move {
                            match handle_connection(stream, &ctx).await {
                                Ok(()) | Err(ProtocolError::ConnectionClosed) => {
                                    debug!("client disconnected");
                                }
                                Err(e) => error!(error = %e, "connection error"),
                            }
                        });
                    }
                    Err(e) => error!(error = %e, "accept error"),
                },
            }
        }
    }
}

async fn handle_connection(
    mut stream: UnixStream,
    ctx: &Arc<ListenCtx>,
) -> Result<(), ProtocolError> {
    loop {
        let request: Request = protocol_wire::read_message(&mut stream).await?;
        let response = handle_request(ctx, request).await;
        protocol_wire::write_message(&mut stream, &response).await?;
    }
}

/// Serve one request, recording endpoint telemetry.
pub(crate) async fn handle_request(ctx: &Arc<ListenCtx>, request: Request) -> Response {
    let path = request.path();
    let started = Instant::now();

    let response = dispatch(ctx, request).await;

    let duration_ms = started.elapsed().as_millis() as i64;
    ctx.telemetry.record(
        MetricRecord::new(MetricKind::Request, ctx.clock.now_ms())
            .duration(duration_ms)
            .success(!response.is_error())
            .metadata(serde_json::json!({ "path": path })),
    );
    if let Response::Error { code, message, .. } = &response {
        if *code >= 500 {
            warn!(path, code = *code, message = %message, "request failed");
        } else {
            debug!(path, code = *code, message = %message, "request rejected");
        }
    }
    response
}

async fn dispatch(ctx: &Arc<ListenCtx>, request: Request) -> Response {
    let result: Result<Response, EngineError> = match request {
        Request::Ping => Ok(Response::Pong),
        Request::Hello { version } => {
            debug!(client_version = %version, "hello");
            Ok(Response::Hello {
                version: PROTOCOL_VERSION.to_string(),
            })
        }
        Request::Status => status(ctx),
        Request::Shutdown => {
            ctx.shutdown.notify_waiters();
            Ok(Response::Ok)
        }

        Request::AgentRegister {
            agent_id,
            kind,
            delivery_mode,
            metadata,
            heartbeat_interval_ms,
        } => {
            agents::register(
                ctx,
                &agent_id,
                kind,
                delivery_mode,
                metadata,
                heartbeat_interval_ms,
            )
        }
        Request::AgentDelete { agent_id } => agents::delete(ctx, &agent_id),
        Request::AgentHeartbeat { agent_id } => agents::heartbeat(ctx, &agent_id),
        Request::AgentList => agents::list(ctx),

        Request::TicketSend {
            target,
            origin,
            payload,
            metadata,
            expect_reply,
            timeout_ms,
        } => tickets::send(ctx, target, origin, payload, metadata, expect_reply, timeout_ms),
        Request::TicketsPending { agent_id } => tickets::pending(ctx, &agent_id),
        Request::TicketAcknowledge { ticket_id } => tickets::acknowledge(ctx, &ticket_id),
        Request::ReplyPost {
            ticket_id,
            payload,
            metadata,
        } => tickets::post_reply(ctx, &ticket_id, &payload, metadata),
        Request::TicketWait {
            ticket_id,
            timeout_ms,
        } => tickets::wait(ctx, &ticket_id, timeout_ms).await,
        Request::TicketCancel { ticket_id } => tickets::cancel(ctx, &ticket_id),

        Request::Execute {
            agent_id,
            prompt,
            timeout_ms,
            conversation_id,
            metadata,
        } => execute::execute(ctx, &agent_id, &prompt, timeout_ms, conversation_id, metadata).await,
        Request::ExecuteCancel { agent_id } => execute::cancel(ctx, &agent_id),
        Request::SessionEnd { agent_id } => execute::end_session(ctx, &agent_id),
        Request::CircuitReset { agent_id } => execute::circuit_reset(ctx, &agent_id),
        Request::FallbackForceAgent { agent_id, forced } => {
            execute::fallback_agent(ctx, &agent_id, forced)
        }
        Request::FallbackDisableKind { kind, disabled } => {
            execute::fallback_kind(ctx, kind, disabled)
        }

        Request::ConversationGet { conversation_id } => {
            queries::conversation(ctx, &conversation_id)
        }
        Request::ConversationsList { agent_id } => queries::conversations(ctx, &agent_id),
        Request::IntegrityCheck => queries::integrity_check(ctx),
        Request::Timeline { filter } => queries::timeline(ctx, filter),
        Request::Interactions { time_range } => queries::interactions(ctx, time_range),

        Request::MetricsDashboard => metrics::dashboard(ctx),
        Request::MetricsPerformance { window_hours } => metrics::performance(ctx, window_hours),
        Request::MetricsEndpoints { window_hours } => metrics::endpoints(ctx, window_hours),
        Request::MetricsSlo { sli, window_hours } => metrics::slo(ctx, &sli, window_hours),
        Request::MetricsErrors { window_hours } => metrics::errors(ctx, window_hours),
        Request::MetricsRate { window_hours } => metrics::rate(ctx, window_hours),
        Request::MetricsCleanup { retention_days } => metrics::cleanup(ctx, retention_days),
    };

    result.unwrap_or_else(|e| Response::from_error(&e))
}

fn status(ctx: &Arc<ListenCtx>) -> Result<Response, EngineError> {
    let agents = ctx.agents.list()?;
    let online = agents
        .iter()
        .filter(|a| a.status == kokino_core::AgentStatus::Online)
        .count();
    let (disabled_kinds, forced) = ctx.fallback.overrides();
    Ok(Response::Status {
        status: DaemonStatus {
            version: PROTOCOL_VERSION.to_string(),
            uptime_ms: ctx.start_time.elapsed().as_millis() as i64,
            agents_total: agents.len(),
            agents_online: online,
            active_executions: ctx.sessions.active_count(),
            subscribers: ctx.stream.subscriber_count(),
            disabled_kinds,
            forced_tmux_agents: forced.into_iter().map(|a| a.to_string()).collect(),
        },
    })
}

#[cfg(test)]
#[path = "handlers_tests.rs"]
mod handlers_tests;
