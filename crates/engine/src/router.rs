// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Delivery routing: headless, tmux, or shadow per agent.
//!
//! The router asks the fallback controller first (operator overrides win),
//! then the agent's configured mode. Every route runs under the agent's
//! circuit breaker. Ticket dispatch is push-based for headless and shadow
//! agents; tmux agents poll their queue themselves, so their tickets stay
//! pending.

use crate::bus::EventBus;
use crate::circuit::CircuitBreaker;
use crate::error::EngineError;
use crate::fallback::FallbackController;
use crate::runner::{Runner, TurnOptions, TurnResult};
use crate::shadow::ShadowController;
use crate::tickets::TicketService;
use crate::Result;
use async_trait::async_trait;
use kokino_adapters::env::tmux_poll_ms;
use kokino_adapters::{PaneId, TermBackend};
use kokino_core::{
    AgentId, AgentRecord, ConversationId, DeliveryMode, Event, Ticket, TicketId,
};
use kokino_storage::AgentStore;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Per-delivery options shared by all providers.
#[derive(Debug, Clone, Default)]
pub struct DeliveryOptions {
    pub timeout_ms: Option<i64>,
    pub conversation_id: Option<ConversationId>,
    pub metadata: Option<serde_json::Value>,
    pub origin: Option<AgentId>,
    pub ticket_id: Option<TicketId>,
}

/// What a provider produced.
#[derive(Debug, Clone)]
pub struct ProviderResult {
    pub response: String,
    pub duration_ms: i64,
    /// Present for headless turns.
    pub turn: Option<TurnResult>,
}

/// One way of getting a prompt to an agent's CLI.
#[async_trait]
pub trait DeliveryProvider: Send + Sync + 'static {
    async fn deliver(
        &self,
        agent: &AgentRecord,
        payload: &str,
        opts: &DeliveryOptions,
    ) -> Result<ProviderResult>;
}

/// Headless delivery through the runner.
pub struct HeadlessProvider {
    runner: Runner,
}

impl HeadlessProvider {
    pub fn new(runner: Runner) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl DeliveryProvider for HeadlessProvider {
    async fn deliver(
        &self,
        agent: &AgentRecord,
        payload: &str,
        opts: &DeliveryOptions,
    ) -> Result<ProviderResult> {
        let turn = self
            .runner
            .execute_turn(
                &agent.agent_id,
                payload,
                TurnOptions {
                    timeout_ms: opts.timeout_ms,
                    conversation_id: opts.conversation_id.clone(),
                    metadata: opts.metadata.clone(),
                    origin: opts.origin.clone(),
                    ticket_id: opts.ticket_id.clone(),
                },
            )
            .await?;
        Ok(ProviderResult {
            response: turn.response.clone(),
            duration_ms: turn.duration_ms,
            turn: Some(turn),
        })
    }
}

/// Tmux provider tuning.
#[derive(Debug, Clone)]
pub struct TmuxProviderConfig {
    /// Working directory for spawned panes.
    pub cwd: PathBuf,
    /// Poll interval while waiting for pane output to settle.
    pub poll_interval: Duration,
    /// Pane lines captured per poll.
    pub capture_lines: u32,
}

impl Default for TmuxProviderConfig {
    fn default() -> Self {
        Self {
            cwd: std::env::temp_dir(),
            poll_interval: tmux_poll_ms(),
            capture_lines: 200,
        }
    }
}

/// Legacy delivery: inject the prompt into the agent's terminal pane and
/// scrape the reply once the pane settles.
pub struct TmuxProvider<B: TermBackend> {
    term: B,
    panes: Arc<Mutex<HashMap<AgentId, PaneId>>>,
    config: TmuxProviderConfig,
}

impl<B: TermBackend> TmuxProvider<B> {
    pub fn new(term: B, config: TmuxProviderConfig) -> Self {
        Self {
            term,
            panes: Arc::new(Mutex::new(HashMap::new())),
            config,
        }
    }

    /// The agent's live pane, reopening it when it died. The interactive
    /// CLI binary is the agent's kind name.
    async fn ensure_pane(&self, agent: &AgentRecord) -> Result<PaneId> {
        let existing = self.panes.lock().get(&agent.agent_id).cloned();
        if let Some(existing) = existing {
            if self.term.pane_alive(&existing).await.map_err(upstream)? {
                return Ok(existing);
            }
        }

        let pane = self
            .term
            .open_pane(&agent.agent_id, agent.kind.as_str(), &self.config.cwd)
            .await
            .map_err(upstream)?;
        self.panes
            .lock()
            .insert(agent.agent_id.clone(), pane.clone());
        Ok(pane)
    }
}

#[async_trait]
impl<B: TermBackend> DeliveryProvider for TmuxProvider<B> {
    async fn deliver(
        &self,
        agent: &AgentRecord,
        payload: &str,
        opts: &DeliveryOptions,
    ) -> Result<ProviderResult> {
        let started = Instant::now();
        let timeout_ms = opts.timeout_ms.filter(|t| *t > 0).unwrap_or(300_000);
        let deadline = started + Duration::from_millis(timeout_ms as u64);

        let pane = self.ensure_pane(agent).await?;
        let baseline = self
            .term
            .snapshot(&pane, self.config.capture_lines)
            .await
            .map_err(upstream)?;
        self.term
            .inject_prompt(&pane, payload)
            .await
            .map_err(upstream)?;

        // Wait for the pane to change, then settle (two equal snapshots).
        let mut previous: Option<String> = None;
        loop {
            if Instant::now() >= deadline {
                return Err(EngineError::Timeout {
                    waited_ms: timeout_ms,
                });
            }
            tokio::time::sleep(self.config.poll_interval).await;

            let frame = self
                .term
                .snapshot(&pane, self.config.capture_lines)
                .await
                .map_err(upstream)?;

            if frame != baseline {
                if previous.as_deref() == Some(frame.as_str()) {
                    let response = scrape_response(&baseline, &frame);
                    return Ok(ProviderResult {
                        response,
                        duration_ms: started.elapsed().as_millis() as i64,
                        turn: None,
                    });
                }
                previous = Some(frame);
            }
        }
    }
}

fn upstream(err: kokino_adapters::TermError) -> EngineError {
    EngineError::Upstream(err.to_string())
}

/// New pane content: lines past the common prefix with the baseline.
fn scrape_response(baseline: &str, capture: &str) -> String {
    let base_lines: Vec<&str> = baseline.lines().collect();
    let cap_lines: Vec<&str> = capture.lines().collect();
    let common = base_lines
        .iter()
        .zip(cap_lines.iter())
        .take_while(|(a, b)| a == b)
        .count();
    let fresh = cap_lines[common..].join("\n").trim().to_string();
    if fresh.is_empty() {
        capture.trim().to_string()
    } else {
        fresh
    }
}

/// Routed delivery outcome.
#[derive(Debug, Clone)]
pub struct RouteResult {
    pub mode: DeliveryMode,
    pub reason: String,
    pub result: ProviderResult,
}

/// Chooses and runs the delivery path for an agent's work.
#[derive(Clone)]
pub struct DeliveryRouter {
    agents: AgentStore,
    fallback: FallbackController,
    breaker: CircuitBreaker,
    headless: Arc<dyn DeliveryProvider>,
    tmux: Arc<dyn DeliveryProvider>,
    shadow: Arc<ShadowController>,
    bus: EventBus,
}

impl DeliveryRouter {
    pub fn new(
        agents: AgentStore,
        fallback: FallbackController,
        breaker: CircuitBreaker,
        headless: Arc<dyn DeliveryProvider>,
        tmux: Arc<dyn DeliveryProvider>,
        shadow: Arc<ShadowController>,
        bus: EventBus,
    ) -> Self {
        Self {
            agents,
            fallback,
            breaker,
            headless,
            tmux,
            shadow,
            bus,
        }
    }

    /// Resolve the delivery mode for an agent right now.
    pub fn resolve_mode(&self, agent: &AgentRecord) -> (DeliveryMode, String) {
        let decision = self.fallback.should_use_tmux(agent);
        if decision.use_tmux {
            (DeliveryMode::Tmux, decision.reason)
        } else if agent.delivery_mode == DeliveryMode::Shadow {
            (DeliveryMode::Shadow, decision.reason)
        } else {
            (DeliveryMode::Headless, decision.reason)
        }
    }

    /// Deliver one prompt via the resolved path, under the circuit breaker.
    pub async fn route(
        &self,
        agent_id: &AgentId,
        payload: &str,
        opts: DeliveryOptions,
    ) -> Result<RouteResult> {
        let agent = self.agents.get(agent_id)?;
        let (mode, reason) = self.resolve_mode(&agent);
        self.bus.publish(Event::DeliveryRouted {
            agent_id: agent_id.clone(),
            mode,
            reason: reason.clone(),
        });

        let result = match mode {
            DeliveryMode::Headless => {
                self.breaker
                    .execute(agent_id, || self.headless.deliver(&agent, payload, &opts))
                    .await?
            }
            DeliveryMode::Tmux => {
                self.breaker
                    .execute(agent_id, || self.tmux.deliver(&agent, payload, &opts))
                    .await?
            }
            DeliveryMode::Shadow => {
                self.breaker
                    .execute(agent_id, || self.shadow.run(&agent, payload, &opts))
                    .await?
            }
        };

        Ok(RouteResult {
            mode,
            reason,
            result,
        })
    }

    /// Push one ticket through its delivery path.
    ///
    /// Tmux-mode tickets stay pending (the interactive agent polls its own
    /// queue); everything else is acknowledged, executed, and replied to.
    /// Returns `None` when the ticket was left for polling.
    pub async fn dispatch_ticket(
        &self,
        tickets: &TicketService,
        ticket: &Ticket,
    ) -> Result<Option<RouteResult>> {
        let agent = self.agents.get(&ticket.target_agent)?;
        let (mode, _) = self.resolve_mode(&agent);
        if mode == DeliveryMode::Tmux {
            return Ok(None);
        }

        tickets.acknowledge(&ticket.ticket_id)?;
        let opts = DeliveryOptions {
            timeout_ms: Some(ticket.timeout_ms),
            origin: ticket.origin_agent.clone(),
            ticket_id: Some(ticket.ticket_id.clone()),
            ..Default::default()
        };

        match self.route(&ticket.target_agent, &ticket.payload, opts).await {
            Ok(routed) => {
                tickets.post_reply(
                    &ticket.ticket_id,
                    &routed.result.response,
                    serde_json::json!({ "mode": routed.mode }),
                )?;
                Ok(Some(routed))
            }
            Err(EngineError::Timeout { waited_ms }) => {
                let _ = tickets.timeout(&ticket.ticket_id);
                Err(EngineError::Timeout { waited_ms })
            }
            Err(other) => Err(other),
        }
    }
}

#[cfg(test)]
#[path = "router_tests.rs"]
mod tests;
