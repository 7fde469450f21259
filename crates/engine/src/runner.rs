// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Headless turn runner.
//!
//! One `execute_turn` is the whole pipeline: session lock, conversation
//! append, prompt assembly, CLI spawn, JSONL parse, assistant turn,
//! telemetry. The lock is held by a guard and released on every exit path.
//! Failed turns leave a `system` turn in the conversation so the failure is
//! part of history.

use crate::bus::EventBus;
use crate::error::EngineError;
use crate::prompt::{build_prompt, PromptContext};
use crate::session::SessionManager;
use crate::telemetry::Telemetry;
use crate::Result;
use kokino_adapters::{
    build_invocation, InvocationRequest, JsonlParser, ProcessEnv, ProcessLimits, ProcessSupervisor,
    SessionArg, SpawnSpec,
};
use kokino_core::{
    AgentId, AgentRecord, Clock, ConversationId, DeliveryMode, Event, IdGen, MetricKind,
    MetricRecord, NewTurn, Role, TicketId,
};
use kokino_storage::{AgentStore, ConversationStore};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Characters of prompt included in lifecycle events.
const PROMPT_SNIPPET_LEN: usize = 80;
/// Characters of stderr included in failure messages.
const STDERR_SNIPPET_LEN: usize = 200;

/// Runner tuning.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Soft execution timeout when the caller does not pick one.
    pub default_timeout_ms: i64,
    /// Model selector handed to the CLI; agent metadata `model` wins.
    pub model: Option<String>,
    /// MCP configuration file path handed to the CLI.
    pub mcp_config: Option<PathBuf>,
    /// Working directory for spawned CLIs.
    pub cwd: Option<PathBuf>,
    pub max_memory_mb: u64,
    pub max_cpu_percent: f32,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: kokino_adapters::process::DEFAULT_TIMEOUT_MS as i64,
            model: None,
            mcp_config: None,
            cwd: None,
            max_memory_mb: kokino_adapters::process::DEFAULT_MAX_MEMORY_MB,
            max_cpu_percent: kokino_adapters::process::DEFAULT_MAX_CPU_PERCENT,
        }
    }
}

/// Per-call options.
#[derive(Debug, Clone, Default)]
pub struct TurnOptions {
    pub timeout_ms: Option<i64>,
    /// Continue a specific conversation instead of the most recent.
    pub conversation_id: Option<ConversationId>,
    pub metadata: Option<serde_json::Value>,
    /// The asking agent, for inter-agent tickets.
    pub origin: Option<AgentId>,
    pub ticket_id: Option<TicketId>,
}

/// Result of one successful turn.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TurnResult {
    pub response: String,
    pub conversation_id: ConversationId,
    pub turn_id: i64,
    pub duration_ms: i64,
    pub session_id: Option<String>,
    pub exit_code: Option<i32>,
}

/// Executes headless turns for agents.
#[derive(Clone)]
pub struct Runner {
    agents: AgentStore,
    conversations: ConversationStore,
    sessions: SessionManager,
    supervisor: Arc<dyn ProcessSupervisor>,
    parser: Arc<JsonlParser>,
    telemetry: Arc<dyn Telemetry>,
    bus: EventBus,
    ids: Arc<dyn IdGen>,
    clock: Arc<dyn Clock>,
    config: RunnerConfig,
}

impl Runner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        agents: AgentStore,
        conversations: ConversationStore,
        sessions: SessionManager,
        supervisor: Arc<dyn ProcessSupervisor>,
        telemetry: Arc<dyn Telemetry>,
        bus: EventBus,
        ids: Arc<dyn IdGen>,
        clock: Arc<dyn Clock>,
        config: RunnerConfig,
    ) -> Self {
        Self {
            agents,
            conversations,
            sessions,
            supervisor,
            parser: Arc::new(JsonlParser::new()),
            telemetry,
            bus,
            ids,
            clock,
            config,
        }
    }

    /// Run one headless turn for `agent_id`.
    pub async fn execute_turn(
        &self,
        agent_id: &AgentId,
        payload: &str,
        opts: TurnOptions,
    ) -> Result<TurnResult> {
        if payload.trim().is_empty() {
            return Err(EngineError::Validation("prompt is empty".into()));
        }
        let agent = self.agents.get(agent_id)?;
        if agent.delivery_mode == DeliveryMode::Tmux {
            return Err(EngineError::Validation(format!(
                "agent {} is configured for tmux delivery",
                agent_id
            )));
        }

        let timeout_ms = opts
            .timeout_ms
            .filter(|t| *t > 0)
            .unwrap_or(self.config.default_timeout_ms);

        let lock = self
            .sessions
            .acquire_lock(agent_id, timeout_ms, timeout_ms)
            .await?;

        let started_ms = self.clock.now_ms();
        self.telemetry.record(
            MetricRecord::new(MetricKind::ExecStarted, started_ms)
                .agent(agent_id.clone())
                .cli(agent.kind),
        );
        self.bus.publish(Event::ExecStarted {
            agent_id: agent_id.clone(),
            cli_kind: agent.kind,
            prompt_snippet: snippet(payload, PROMPT_SNIPPET_LEN),
        });

        // Lock is held from here on; the guard releases it on every path.
        let result = self
            .run_locked(&agent, payload, &opts, timeout_ms, started_ms)
            .await;
        lock.release();

        if let Err(e) = &result {
            tracing::warn!(agent_id = %agent_id, error = %e, "turn failed");
        }
        result
    }

    async fn run_locked(
        &self,
        agent: &AgentRecord,
        payload: &str,
        opts: &TurnOptions,
        timeout_ms: i64,
        started_ms: i64,
    ) -> Result<TurnResult> {
        let agent_id = &agent.agent_id;
        let conversation_id = self.ensure_conversation(agent_id, opts)?;

        let mut user_meta = serde_json::Map::new();
        if let Some(ticket_id) = &opts.ticket_id {
            user_meta.insert(
                "ticket_id".to_string(),
                serde_json::Value::String(ticket_id.to_string()),
            );
        }
        self.append_turn(
            &conversation_id,
            agent_id,
            NewTurn::new(Role::User, payload)
                .with_metadata(serde_json::Value::Object(user_meta)),
        )?;

        let prompt = build_prompt(&PromptContext {
            agent,
            payload,
            origin: opts.origin.as_ref(),
        });

        let session = match self.sessions.resumable_session(agent_id) {
            Some(existing) => SessionArg::Resume(existing),
            None => SessionArg::New(self.ids.next()),
        };
        let model = agent
            .metadata
            .get("model")
            .and_then(|m| m.as_str())
            .map(String::from)
            .or_else(|| self.config.model.clone());

        let mut request = InvocationRequest::new(prompt, session);
        if let Some(model) = model {
            request = request.model(model);
        }
        if let Some(mcp) = &self.config.mcp_config {
            request = request.mcp_config(mcp.clone());
        }
        let invocation = build_invocation(agent.kind, &request);

        let spec = SpawnSpec {
            command: invocation.command,
            args: invocation.args,
            cwd: self.config.cwd.clone(),
            env: ProcessEnv::inherited(),
            limits: ProcessLimits {
                max_memory_mb: self.config.max_memory_mb,
                max_cpu_percent: self.config.max_cpu_percent,
                timeout_ms: timeout_ms.max(0) as u64,
            },
        };

        let spawned = match self.supervisor.spawn(spec).await {
            Ok(spawned) => spawned,
            Err(e) => {
                self.telemetry.record(
                    MetricRecord::new(MetricKind::SpawnError, self.clock.now_ms())
                        .agent(agent_id.clone())
                        .cli(agent.kind),
                );
                return Err(self.fail_turn(
                    agent,
                    &conversation_id,
                    started_ms,
                    EngineError::Upstream(e.to_string()),
                ));
            }
        };
        let handle = spawned.handle();
        self.sessions.register_process(agent_id, handle.clone());

        let outcome = match tokio::time::timeout(
            Duration::from_millis(timeout_ms.max(0) as u64),
            spawned.wait(),
        )
        .await
        {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                return Err(self.fail_turn(
                    agent,
                    &conversation_id,
                    started_ms,
                    EngineError::Internal(e.to_string()),
                ));
            }
            Err(_) => {
                // Soft timeout: graceful signal now, force kill after grace.
                handle.terminate();
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    handle.kill();
                });
                self.telemetry.record(
                    MetricRecord::new(MetricKind::ExecTimeout, self.clock.now_ms())
                        .agent(agent_id.clone())
                        .cli(agent.kind)
                        .duration(timeout_ms)
                        .success(false),
                );
                self.bus.publish(Event::ExecTimeout {
                    agent_id: agent_id.clone(),
                    timeout_ms,
                });
                self.append_error_turn(&conversation_id, agent_id, "Error: timeout");
                return Err(EngineError::Timeout {
                    waited_ms: timeout_ms,
                });
            }
        };

        let duration_ms = outcome.duration_ms;
        self.record_process_metrics(agent, &outcome);

        if self.sessions.take_cancel_requested(agent_id) {
            self.append_error_turn(&conversation_id, agent_id, "Error: cancelled");
            return Err(EngineError::Conflict(format!(
                "execution for agent {} was cancelled",
                agent_id
            )));
        }

        if outcome.zombie_killed {
            self.telemetry.record(
                MetricRecord::new(MetricKind::ExecTimeout, self.clock.now_ms())
                    .agent(agent_id.clone())
                    .cli(agent.kind)
                    .duration(duration_ms)
                    .success(false),
            );
            self.bus.publish(Event::ExecTimeout {
                agent_id: agent_id.clone(),
                timeout_ms,
            });
            self.append_error_turn(&conversation_id, agent_id, "Error: timeout");
            return Err(EngineError::Timeout {
                waited_ms: duration_ms,
            });
        }

        if outcome.exit_code != Some(0) {
            let message = format!(
                "cli exited with {:?}: {}",
                outcome.exit_code,
                snippet(&outcome.stderr, STDERR_SNIPPET_LEN)
            );
            return Err(self.fail_turn(
                agent,
                &conversation_id,
                started_ms,
                EngineError::Upstream(message),
            ));
        }

        let parsed = self
            .parser
            .parse(&outcome.stdout)
            .map_err(|e| EngineError::Internal(e.to_string()))?;
        self.record_parse_metrics(agent_id, &parsed);

        let mut assistant_meta = serde_json::Map::new();
        assistant_meta.insert("duration_ms".to_string(), duration_ms.into());
        if let Some(session_id) = &parsed.session_id {
            assistant_meta.insert(
                "session_id".to_string(),
                serde_json::Value::String(session_id.clone()),
            );
        }
        if let Some(code) = outcome.exit_code {
            assistant_meta.insert("exit_code".to_string(), code.into());
        }

        // The response exists; a failed append must not fail the turn.
        let turn_id = match self.append_turn(
            &conversation_id,
            agent_id,
            NewTurn::new(Role::Assistant, parsed.response.clone())
                .with_metadata(serde_json::Value::Object(assistant_meta)),
        ) {
            Ok(turn_id) => turn_id,
            Err(e) => {
                tracing::error!(
                    agent_id = %agent_id,
                    error = %e,
                    "assistant turn append failed; continuing"
                );
                0
            }
        };

        self.telemetry.record(
            MetricRecord::new(MetricKind::ExecCompleted, self.clock.now_ms())
                .agent(agent_id.clone())
                .cli(agent.kind)
                .duration(duration_ms)
                .success(true),
        );
        self.bus.publish(Event::ExecCompleted {
            agent_id: agent_id.clone(),
            duration_ms,
            success: true,
        });

        if let Some(session_id) = &parsed.session_id {
            self.sessions.mark_session_initialized(agent_id, session_id);
        }

        Ok(TurnResult {
            response: parsed.response,
            conversation_id,
            turn_id,
            duration_ms,
            session_id: parsed.session_id,
            exit_code: outcome.exit_code,
        })
    }

    /// Pick the conversation: explicit id, most recent, or a fresh one.
    fn ensure_conversation(
        &self,
        agent_id: &AgentId,
        opts: &TurnOptions,
    ) -> Result<ConversationId> {
        if let Some(conversation_id) = &opts.conversation_id {
            let conversation = self.conversations.get(conversation_id)?;
            if conversation.agent_id != *agent_id {
                return Err(EngineError::Validation(format!(
                    "conversation {} belongs to agent {}",
                    conversation_id, conversation.agent_id
                )));
            }
            return Ok(conversation_id.clone());
        }
        if let Some(recent) = self.conversations.most_recent_for_agent(agent_id)? {
            return Ok(recent.conversation_id);
        }
        let conversation_id = ConversationId::new(self.ids.next());
        self.conversations.create(
            &conversation_id,
            agent_id,
            None,
            opts.metadata.clone().unwrap_or_else(|| serde_json::json!({})),
        )?;
        Ok(conversation_id)
    }

    fn append_turn(
        &self,
        conversation_id: &ConversationId,
        agent_id: &AgentId,
        turn: NewTurn,
    ) -> Result<i64> {
        let role = turn.role;
        let turn = self.conversations.add_turn(conversation_id, turn)?;
        self.bus.publish(Event::ConversationTurn {
            conversation_id: conversation_id.clone(),
            agent_id: agent_id.clone(),
            role,
            turn_id: turn.turn_id,
        });
        Ok(turn.turn_id)
    }

    /// Failures become part of the conversation history.
    fn append_error_turn(&self, conversation_id: &ConversationId, agent_id: &AgentId, msg: &str) {
        let result = self.append_turn(
            conversation_id,
            agent_id,
            NewTurn::new(Role::System, msg)
                .with_metadata(serde_json::json!({ "error": true })),
        );
        if let Err(e) = result {
            tracing::error!(
                conversation_id = %conversation_id,
                error = %e,
                "error turn append failed"
            );
        }
    }

    fn fail_turn(
        &self,
        agent: &AgentRecord,
        conversation_id: &ConversationId,
        started_ms: i64,
        err: EngineError,
    ) -> EngineError {
        let now = self.clock.now_ms();
        self.telemetry.record(
            MetricRecord::new(MetricKind::ExecFailed, now)
                .agent(agent.agent_id.clone())
                .cli(agent.kind)
                .duration(now - started_ms)
                .success(false),
        );
        self.bus.publish(Event::ExecFailed {
            agent_id: agent.agent_id.clone(),
            error: err.to_string(),
        });
        self.append_error_turn(conversation_id, &agent.agent_id, &format!("Error: {}", err));
        err
    }

    fn record_process_metrics(
        &self,
        agent: &AgentRecord,
        outcome: &kokino_adapters::ProcessOutcome,
    ) {
        let now = self.clock.now_ms();
        let kind = if outcome.succeeded() {
            MetricKind::ProcessExited
        } else {
            MetricKind::ProcessFailed
        };
        self.telemetry.record(
            MetricRecord::new(kind, now)
                .agent(agent.agent_id.clone())
                .cli(agent.kind)
                .duration(outcome.duration_ms)
                .metadata(serde_json::json!({ "exit_code": outcome.exit_code })),
        );
        if let Some(breach) = outcome.limit_breached {
            self.telemetry.record(
                MetricRecord::new(MetricKind::LimitExceeded, now)
                    .agent(agent.agent_id.clone())
                    .metadata(serde_json::json!({ "breach": format!("{:?}", breach) })),
            );
        }
        if outcome.zombie_killed {
            self.telemetry.record(
                MetricRecord::new(MetricKind::ZombieKilled, now).agent(agent.agent_id.clone()),
            );
        }
    }

    fn record_parse_metrics(&self, agent_id: &AgentId, parsed: &kokino_adapters::ParseOutput) {
        let now = self.clock.now_ms();
        if parsed.fallback_raw {
            self.telemetry.record(
                MetricRecord::new(MetricKind::JsonlFallbackRaw, now).agent(agent_id.clone()),
            );
        }
        if !parsed.unknown_events.is_empty() {
            self.telemetry.record(
                MetricRecord::new(MetricKind::UnknownEvent, now)
                    .agent(agent_id.clone())
                    .metadata(serde_json::json!({ "count": parsed.unknown_events.len() })),
            );
        }
        if !parsed.errors.is_empty() {
            self.telemetry.record(
                MetricRecord::new(MetricKind::ParseError, now)
                    .agent(agent_id.clone())
                    .metadata(serde_json::json!({ "count": parsed.errors.len() })),
            );
        }
    }
}

fn snippet(text: &str, max: usize) -> String {
    let trimmed = text.trim();
    if trimmed.len() <= max {
        return trimmed.to_string();
    }
    let mut end = max;
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &trimmed[..end])
}

#[cfg(test)]
#[path = "runner_tests.rs"]
mod tests;
