// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Deterministic CLI invocations per agent kind.
//!
//! Every kind gets: a non-interactive flag, the inline prompt, an optional
//! model selector, a session argument (fresh id or resume), and an optional
//! MCP configuration path. The argument spellings differ per CLI; the
//! shape does not.

use crate::env::mock_cli_bin;
use kokino_core::CliKind;
use std::path::{Path, PathBuf};

/// Session continuity: a fresh id for the first turn, resume afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionArg {
    New(String),
    Resume(String),
}

/// What the runner wants executed.
#[derive(Debug, Clone)]
pub struct InvocationRequest {
    pub prompt: String,
    pub model: Option<String>,
    pub mcp_config: Option<PathBuf>,
    pub session: SessionArg,
}

impl InvocationRequest {
    pub fn new(prompt: impl Into<String>, session: SessionArg) -> Self {
        Self {
            prompt: prompt.into(),
            model: None,
            mcp_config: None,
            session,
        }
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn mcp_config(mut self, path: impl Into<PathBuf>) -> Self {
        self.mcp_config = Some(path.into());
        self
    }
}

/// A fully resolved command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliInvocation {
    pub command: String,
    pub args: Vec<String>,
}

/// Build the command line for one headless turn.
pub fn build_invocation(kind: CliKind, req: &InvocationRequest) -> CliInvocation {
    match kind {
        CliKind::ClaudeCode => claude_invocation(req),
        CliKind::Gemini => gemini_invocation(req),
        CliKind::Droid => droid_invocation(req),
        CliKind::Mock => mock_invocation(req),
    }
}

fn claude_invocation(req: &InvocationRequest) -> CliInvocation {
    let mut args = vec![
        "-p".to_string(),
        req.prompt.clone(),
        "--output-format".to_string(),
        "stream-json".to_string(),
    ];
    if let Some(model) = &req.model {
        args.push("--model".to_string());
        args.push(model.clone());
    }
    match &req.session {
        SessionArg::New(id) => {
            args.push("--session-id".to_string());
            args.push(id.clone());
        }
        SessionArg::Resume(id) => {
            args.push("--resume".to_string());
            args.push(id.clone());
        }
    }
    push_mcp(&mut args, "--mcp-config", req.mcp_config.as_deref());
    CliInvocation {
        command: "claude".to_string(),
        args,
    }
}

fn gemini_invocation(req: &InvocationRequest) -> CliInvocation {
    let mut args = vec![
        "--prompt".to_string(),
        req.prompt.clone(),
        "--output-format".to_string(),
        "jsonl".to_string(),
    ];
    if let Some(model) = &req.model {
        args.push("--model".to_string());
        args.push(model.clone());
    }
    match &req.session {
        SessionArg::New(id) => {
            args.push("--session-id".to_string());
            args.push(id.clone());
        }
        SessionArg::Resume(id) => {
            args.push("--resume-session".to_string());
            args.push(id.clone());
        }
    }
    push_mcp(&mut args, "--mcp-config", req.mcp_config.as_deref());
    CliInvocation {
        command: "gemini".to_string(),
        args,
    }
}

fn droid_invocation(req: &InvocationRequest) -> CliInvocation {
    let mut args = vec![
        "exec".to_string(),
        "--output-format".to_string(),
        "jsonl".to_string(),
        req.prompt.clone(),
    ];
    if let Some(model) = &req.model {
        args.push("--model".to_string());
        args.push(model.clone());
    }
    match &req.session {
        SessionArg::New(id) => {
            args.push("--session-id".to_string());
            args.push(id.clone());
        }
        SessionArg::Resume(id) => {
            args.push("--resume".to_string());
            args.push(id.clone());
        }
    }
    push_mcp(&mut args, "--mcp-config", req.mcp_config.as_deref());
    CliInvocation {
        command: "droid".to_string(),
        args,
    }
}

fn mock_invocation(req: &InvocationRequest) -> CliInvocation {
    let session = match &req.session {
        SessionArg::New(id) | SessionArg::Resume(id) => id.clone(),
    };
    CliInvocation {
        command: mock_cli_bin(),
        args: vec![req.prompt.clone(), session],
    }
}

fn push_mcp(args: &mut Vec<String>, flag: &str, path: Option<&Path>) {
    if let Some(path) = path {
        args.push(flag.to_string());
        args.push(path.display().to_string());
    }
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
