// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! IPC protocol for daemon communication.
//!
//! Wire format: 4-byte length prefix (big-endian) + JSON payload. Each
//! request maps to one stable operation of the broker surface; handlers
//! record a `request` metric per call so endpoint rollups work without an
//! HTTP layer.

use kokino_core::{
    AgentRecord, CliKind, Conversation, DeliveryMode, ErrorKind, Ticket, TicketMetadata, Turn,
};
use kokino_engine::{CircuitSnapshot, SessionView};
use kokino_storage::{
    EndpointStats, ErrorBudget, IntegrityReport, InteractionGraph, RateBucket, ShadowStats,
    TimelineEntry, TimelineFilter,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Protocol version (from Cargo.toml).
pub const PROTOCOL_VERSION: &str = env!("CARGO_PKG_VERSION");

fn default_heartbeat_interval_ms() -> i64 {
    30_000
}

fn default_window_hours() -> i64 {
    24
}

/// Time windows for the interactions graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeRange {
    Hour,
    Day,
    Week,
}

impl TimeRange {
    pub fn window_ms(&self) -> i64 {
        match self {
            TimeRange::Hour => 60 * 60 * 1000,
            TimeRange::Day => 24 * 60 * 60 * 1000,
            TimeRange::Week => 7 * 24 * 60 * 60 * 1000,
        }
    }
}

/// Request from a client to the daemon.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Request {
    /// Health check ping
    Ping,

    /// Version handshake
    Hello { version: String },

    /// Get daemon status
    Status,

    /// Request daemon shutdown
    Shutdown,

    // -- agents --
    AgentRegister {
        agent_id: String,
        kind: CliKind,
        #[serde(default)]
        delivery_mode: Option<DeliveryMode>,
        #[serde(default)]
        metadata: serde_json::Value,
        #[serde(default = "default_heartbeat_interval_ms")]
        heartbeat_interval_ms: i64,
    },
    AgentDelete {
        agent_id: String,
    },
    AgentHeartbeat {
        agent_id: String,
    },
    AgentList,

    // -- tickets --
    TicketSend {
        target: String,
        #[serde(default)]
        origin: Option<String>,
        payload: String,
        #[serde(default)]
        metadata: TicketMetadata,
        #[serde(default)]
        expect_reply: bool,
        #[serde(default)]
        timeout_ms: Option<i64>,
    },
    TicketsPending {
        agent_id: String,
    },
    TicketAcknowledge {
        ticket_id: String,
    },
    ReplyPost {
        ticket_id: String,
        payload: String,
        #[serde(default)]
        metadata: serde_json::Value,
    },
    TicketWait {
        ticket_id: String,
        timeout_ms: i64,
    },
    TicketCancel {
        ticket_id: String,
    },

    // -- execution --
    Execute {
        agent_id: String,
        prompt: String,
        #[serde(default)]
        timeout_ms: Option<i64>,
        #[serde(default)]
        conversation_id: Option<String>,
        #[serde(default)]
        metadata: Option<serde_json::Value>,
    },
    ExecuteCancel {
        agent_id: String,
    },
    SessionEnd {
        agent_id: String,
    },
    CircuitReset {
        agent_id: String,
    },

    // -- delivery overrides --
    FallbackForceAgent {
        agent_id: String,
        forced: bool,
    },
    FallbackDisableKind {
        kind: CliKind,
        disabled: bool,
    },

    // -- conversations --
    ConversationGet {
        conversation_id: String,
    },
    ConversationsList {
        agent_id: String,
    },
    IntegrityCheck,

    // -- monitoring queries --
    Timeline {
        #[serde(default)]
        filter: TimelineFilter,
    },
    Interactions {
        time_range: TimeRange,
    },

    // -- metrics --
    MetricsDashboard,
    MetricsPerformance {
        #[serde(default = "default_window_hours")]
        window_hours: i64,
    },
    MetricsEndpoints {
        #[serde(default = "default_window_hours")]
        window_hours: i64,
    },
    MetricsSlo {
        sli: String,
        #[serde(default = "default_window_hours")]
        window_hours: i64,
    },
    MetricsErrors {
        #[serde(default = "default_window_hours")]
        window_hours: i64,
    },
    MetricsRate {
        #[serde(default = "default_window_hours")]
        window_hours: i64,
    },
    MetricsCleanup {
        #[serde(default)]
        retention_days: Option<i64>,
    },
}

impl Request {
    /// Stable operation path, recorded in endpoint telemetry.
    pub fn path(&self) -> &'static str {
        match self {
            Request::Ping => "/ping",
            Request::Hello { .. } => "/hello",
            Request::Status => "/status",
            Request::Shutdown => "/shutdown",
            Request::AgentRegister { .. } => "/agents/register",
            Request::AgentDelete { .. } => "/agents/delete",
            Request::AgentHeartbeat { .. } => "/agents/heartbeat",
            Request::AgentList => "/agents",
            Request::TicketSend { .. } => "/agents/send",
            Request::TicketsPending { .. } => "/agents/tickets/pending",
            Request::TicketAcknowledge { .. } => "/tickets/acknowledge",
            Request::ReplyPost { .. } => "/replies",
            Request::TicketWait { .. } => "/tickets/wait",
            Request::TicketCancel { .. } => "/tickets/cancel",
            Request::Execute { .. } => "/agents/execute",
            Request::ExecuteCancel { .. } => "/agents/execute/cancel",
            Request::SessionEnd { .. } => "/agents/end-session",
            Request::CircuitReset { .. } => "/agents/circuit/reset",
            Request::FallbackForceAgent { .. } => "/fallback/agent",
            Request::FallbackDisableKind { .. } => "/fallback/kind",
            Request::ConversationGet { .. } => "/conversations/get",
            Request::ConversationsList { .. } => "/agents/conversations",
            Request::IntegrityCheck => "/conversations/integrity",
            Request::Timeline { .. } => "/api/monitoring/timeline",
            Request::Interactions { .. } => "/api/monitoring/interactions",
            Request::MetricsDashboard => "/api/metrics/dashboard",
            Request::MetricsPerformance { .. } => "/api/metrics/performance",
            Request::MetricsEndpoints { .. } => "/api/metrics/endpoints",
            Request::MetricsSlo { .. } => "/api/metrics/slo",
            Request::MetricsErrors { .. } => "/api/metrics/errors",
            Request::MetricsRate { .. } => "/api/metrics/rate",
            Request::MetricsCleanup { .. } => "/api/metrics/cleanup",
        }
    }
}

/// Per-agent status entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentSummary {
    pub agent: AgentRecord,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionView>,
    pub circuit: CircuitSnapshot,
    pub pending_tickets: usize,
}

/// Daemon status payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DaemonStatus {
    pub version: String,
    pub uptime_ms: i64,
    pub agents_total: usize,
    pub agents_online: usize,
    pub active_executions: usize,
    pub subscribers: usize,
    pub disabled_kinds: Vec<CliKind>,
    pub forced_tmux_agents: Vec<String>,
}

/// Result of one execute call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecuteSummary {
    pub response: String,
    pub duration_ms: i64,
    pub mode: DeliveryMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turn_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// Response from the daemon.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Response {
    Ok,
    Pong,
    Hello {
        version: String,
    },
    Error {
        code: u16,
        kind: ErrorKind,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        retry_after_ms: Option<i64>,
    },
    Agent {
        agent: AgentRecord,
    },
    Agents {
        agents: Vec<AgentSummary>,
    },
    Ticket {
        ticket: Ticket,
    },
    Tickets {
        tickets: Vec<Ticket>,
    },
    Reply {
        payload: String,
    },
    ExecuteResult {
        result: ExecuteSummary,
    },
    Conversation {
        conversation: Conversation,
        turns: Vec<Turn>,
    },
    Conversations {
        conversations: Vec<Conversation>,
    },
    Integrity {
        report: IntegrityReport,
    },
    Timeline {
        entries: Vec<TimelineEntry>,
    },
    Interactions {
        graph: InteractionGraph,
    },
    Dashboard {
        body: serde_json::Value,
    },
    Performance {
        availability: f64,
        p50_ms: i64,
        p95_ms: i64,
        p99_ms: i64,
        shadow: ShadowStats,
    },
    Endpoints {
        endpoints: BTreeMap<String, EndpointStats>,
    },
    Slo {
        budget: ErrorBudget,
    },
    Failures {
        failures: Vec<kokino_core::MetricRecord>,
    },
    Rate {
        buckets: Vec<RateBucket>,
    },
    CleanupResult {
        deleted: usize,
    },
    Status {
        status: DaemonStatus,
    },
}

impl Response {
    /// Map an engine error onto the wire.
    pub fn from_error(err: &kokino_engine::EngineError) -> Self {
        let kind = err.kind();
        Response::Error {
            code: kind.code(),
            kind,
            message: err.to_string(),
            retry_after_ms: err.retry_after_ms(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Response::Error { .. })
    }
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
