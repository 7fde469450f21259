// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! kokino-engine: the execution kernel of the Kokino broker.
//!
//! Per-agent session locks, the circuit breaker, ticket long-polling with
//! reverse-ticket fan-out, the headless runner, delivery routing (headless /
//! tmux / shadow), and resource monitoring. Everything emits onto a
//! broadcast [`bus::EventBus`] and records metrics through the
//! [`telemetry::Telemetry`] capability, injected by construction.

pub mod bus;
pub mod circuit;
pub mod error;
pub mod fallback;
pub mod monitor;
pub mod prompt;
pub mod router;
pub mod runner;
pub mod session;
pub mod shadow;
pub mod telemetry;
pub mod tickets;

pub use bus::{BusEvent, EventBus};
pub use circuit::{CircuitBreaker, CircuitBreakerConfig, CircuitPhase, CircuitSnapshot};
pub use error::EngineError;
pub use fallback::{FallbackController, FallbackDecision};
pub use monitor::{MonitorConfig, MonitorHandle, ResourceMonitor};
pub use prompt::build_prompt;
pub use router::{
    DeliveryOptions, DeliveryProvider, DeliveryRouter, HeadlessProvider, ProviderResult,
    RouteResult, TmuxProvider, TmuxProviderConfig,
};
pub use runner::{Runner, RunnerConfig, TurnOptions, TurnResult};
pub use session::{SessionLock, SessionManager, SessionView};
pub use shadow::ShadowController;
pub use telemetry::{NoopTelemetry, StoreTelemetry, Telemetry};
pub use tickets::{TicketOutcome, TicketRequest, TicketService};

#[cfg(any(test, feature = "test-support"))]
pub use telemetry::RecordingTelemetry;

/// Result alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
