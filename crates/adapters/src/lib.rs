// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! kokino-adapters: OS and CLI boundary adapters for the Kokino broker.
//!
//! Everything that touches a subprocess, a terminal pane, or the raw
//! JSONL wire format lives here, behind traits with fakes so the engine
//! tests without real processes.

pub mod cli;
pub mod env;
pub mod jsonl;
pub mod process;
pub mod term;

pub use cli::{build_invocation, CliInvocation, InvocationRequest, SessionArg};
pub use env::ProcessEnv;
pub use jsonl::{
    CliEvent, EventSchema, JsonlParser, ParseAbort, ParseIssue, ParseOutput, SchemaRegistry, Usage,
};
pub use process::{
    LimitBreach, ProcessHandle, ProcessLimits, ProcessOutcome, ProcessSupervisor, SpawnSpec,
    SpawnedProcess, SupervisorError, TokioProcessSupervisor,
};
pub use term::{PaneId, TermBackend, TermError, TmuxBackend};

#[cfg(any(test, feature = "test-support"))]
pub use process::fake::{FakeProcessHandle, FakeProcessSupervisor, ScriptedOutcome};
#[cfg(any(test, feature = "test-support"))]
pub use term::fake::{FakePane, FakeTermBackend};
