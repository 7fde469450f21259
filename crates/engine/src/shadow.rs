// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shadow controller: run both delivery modes, compare, keep tmux canonical.
//!
//! Both deliveries run concurrently and settle independently; neither is
//! cancelled when the other finishes first. The comparison row and its
//! telemetry make the headless path's readiness measurable before anyone
//! flips an agent over.

use crate::bus::EventBus;
use crate::error::EngineError;
use crate::router::{DeliveryOptions, DeliveryProvider, ProviderResult};
use crate::telemetry::Telemetry;
use crate::Result;
use kokino_core::{AgentRecord, Clock, Event, IdGen, MetricKind, MetricRecord, TicketId};
use kokino_storage::{ShadowComparison, ShadowStats, ShadowStore};
use std::sync::Arc;

/// Dual-mode execution and comparison.
pub struct ShadowController {
    headless: Arc<dyn DeliveryProvider>,
    tmux: Arc<dyn DeliveryProvider>,
    store: ShadowStore,
    telemetry: Arc<dyn Telemetry>,
    bus: EventBus,
    ids: Arc<dyn IdGen>,
    clock: Arc<dyn Clock>,
}

impl ShadowController {
    pub fn new(
        headless: Arc<dyn DeliveryProvider>,
        tmux: Arc<dyn DeliveryProvider>,
        store: ShadowStore,
        telemetry: Arc<dyn Telemetry>,
        bus: EventBus,
        ids: Arc<dyn IdGen>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            headless,
            tmux,
            store,
            telemetry,
            bus,
            ids,
            clock,
        }
    }

    /// Run both modes for one prompt; the tmux result is returned.
    pub async fn run(
        &self,
        agent: &AgentRecord,
        payload: &str,
        opts: &DeliveryOptions,
    ) -> Result<ProviderResult> {
        // Comparison rows need their own id: ticket retries must not collide.
        let suffix: String = self.ids.next().chars().take(8).collect();
        let comparison_id = match &opts.ticket_id {
            Some(ticket_id) => TicketId::new(format!("{}-shadow-{}", ticket_id, suffix)),
            None => TicketId::new(format!("shadow-{}", suffix)),
        };

        let (tmux_result, headless_result) = tokio::join!(
            self.tmux.deliver(agent, payload, opts),
            self.headless.deliver(agent, payload, opts),
        );

        let comparison = build_comparison(&comparison_id, agent, &tmux_result, &headless_result);
        if let Err(e) = self.store.insert(&comparison) {
            tracing::error!(
                ticket_id = %comparison_id,
                error = %e,
                "shadow comparison row not persisted"
            );
        }
        self.record(agent, &comparison);

        // Tmux stays canonical during the shadow phase.
        tmux_result
    }

    fn record(&self, agent: &AgentRecord, comparison: &ShadowComparison) {
        let now = self.clock.now_ms();
        let agent_id = agent.agent_id.clone();

        if comparison.tmux_success && comparison.headless_success {
            self.telemetry.record(
                MetricRecord::new(MetricKind::ShadowCompared, now)
                    .agent(agent_id.clone())
                    .success(comparison.output_match),
            );
            if !comparison.output_match {
                self.telemetry.record(
                    MetricRecord::new(MetricKind::ShadowMismatch, now).agent(agent_id.clone()),
                );
                self.bus.publish(Event::ShadowMismatch {
                    agent_id: agent_id.clone(),
                    ticket_id: comparison.ticket_id.clone(),
                });
            }
        }
        if !comparison.headless_success {
            self.telemetry.record(
                MetricRecord::new(MetricKind::ShadowHeadlessFailure, now).agent(agent_id.clone()),
            );
            self.bus.publish(Event::ShadowHeadlessFailure {
                agent_id: agent_id.clone(),
                ticket_id: comparison.ticket_id.clone(),
                error: comparison.headless_error.clone().unwrap_or_default(),
            });
        }
        if !comparison.tmux_success {
            self.telemetry.record(
                MetricRecord::new(MetricKind::ShadowTmuxFailure, now).agent(agent_id.clone()),
            );
            self.bus.publish(Event::ShadowTmuxFailure {
                agent_id,
                ticket_id: comparison.ticket_id.clone(),
                error: comparison.tmux_error.clone().unwrap_or_default(),
            });
        }
    }

    /// Rolling stats over the trailing window.
    pub fn stats(&self, window_ms: i64) -> Result<ShadowStats> {
        Ok(self.store.stats(window_ms)?)
    }

    /// Recent mismatches for drill-down.
    pub fn mismatches(&self, limit: usize) -> Result<Vec<ShadowComparison>> {
        Ok(self.store.mismatches(limit)?)
    }

    /// Recent single-mode failures for drill-down.
    pub fn failures(&self, limit: usize) -> Result<Vec<ShadowComparison>> {
        Ok(self.store.failures(limit)?)
    }
}

fn build_comparison(
    comparison_id: &TicketId,
    agent: &AgentRecord,
    tmux: &Result<ProviderResult>,
    headless: &Result<ProviderResult>,
) -> ShadowComparison {
    let tmux_ok = tmux.as_ref().ok();
    let headless_ok = headless.as_ref().ok();

    let output_match = match (tmux_ok, headless_ok) {
        (Some(t), Some(h)) => normalize(&t.response) == normalize(&h.response),
        _ => false,
    };
    let latency_delta_ms = match (tmux_ok, headless_ok) {
        // headless minus tmux: negative means headless was faster.
        (Some(t), Some(h)) => Some(h.duration_ms - t.duration_ms),
        _ => None,
    };

    ShadowComparison {
        ticket_id: comparison_id.clone(),
        agent_id: agent.agent_id.clone(),
        tmux_success: tmux.is_ok(),
        headless_success: headless.is_ok(),
        output_match,
        latency_delta_ms,
        tmux_duration_ms: tmux_ok.map(|t| t.duration_ms),
        headless_duration_ms: headless_ok.map(|h| h.duration_ms),
        tmux_error: tmux.as_ref().err().map(|e| e.to_string()),
        headless_error: headless.as_ref().err().map(|e| e.to_string()),
        tmux_response: tmux_ok.map(|t| t.response.clone()),
        headless_response: headless_ok.map(|h| h.response.clone()),
    }
}

/// Fuzzy compare form: collapse whitespace, lowercase, trim.
fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[cfg(test)]
#[path = "shadow_tests.rs"]
mod tests;
