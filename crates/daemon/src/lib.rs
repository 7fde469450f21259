// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Kokino daemon library.
//!
//! Wires the stores, the engine, the unix-socket protocol listener, and the
//! WebSocket monitor stream into one process. The protocol types are public
//! for client use.

pub mod config;
pub mod env;
pub mod lifecycle;
pub mod listener;
pub mod protocol;
pub mod protocol_wire;
pub mod stream;
pub mod ws;

pub use config::Config;
pub use lifecycle::Daemon;
pub use protocol::{
    AgentSummary, DaemonStatus, ExecuteSummary, Request, Response, TimeRange, PROTOCOL_VERSION,
};
pub use protocol_wire::{read_message, write_message, ProtocolError, MAX_MESSAGE_SIZE};
pub use stream::{Filters, Frame, MonitorStream};
