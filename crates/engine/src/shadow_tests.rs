// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::telemetry::RecordingTelemetry;
use kokino_core::test_support::AgentRecordBuilder;
use kokino_core::{FakeClock, SequentialIdGen};
use kokino_storage::Db;
use parking_lot::Mutex;
use std::collections::VecDeque;

struct ScriptedProvider {
    script: Mutex<VecDeque<Result<ProviderResult>>>,
}

impl ScriptedProvider {
    fn new(script: Vec<Result<ProviderResult>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into_iter().collect()),
        })
    }
}

#[async_trait::async_trait]
impl DeliveryProvider for ScriptedProvider {
    async fn deliver(
        &self,
        _agent: &AgentRecord,
        _payload: &str,
        _opts: &DeliveryOptions,
    ) -> Result<ProviderResult> {
        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(EngineError::Internal("script exhausted".into())))
    }
}

fn ok(response: &str, duration_ms: i64) -> Result<ProviderResult> {
    Ok(ProviderResult {
        response: response.to_string(),
        duration_ms,
        turn: None,
    })
}

struct Fixture {
    controller: ShadowController,
    store: ShadowStore,
    telemetry: RecordingTelemetry,
}

fn fixture(tmux: Vec<Result<ProviderResult>>, headless: Vec<Result<ProviderResult>>) -> Fixture {
    let clock = Arc::new(FakeClock::new(50_000));
    let db = Db::open_in_memory().unwrap();
    let store = ShadowStore::new(db, clock.clone());
    let telemetry = RecordingTelemetry::new();
    let controller = ShadowController::new(
        ScriptedProvider::new(headless),
        ScriptedProvider::new(tmux),
        store.clone(),
        Arc::new(telemetry.clone()),
        EventBus::new(clock.clone()),
        Arc::new(SequentialIdGen::new("shadowgen")),
        clock,
    );
    Fixture {
        controller,
        store,
        telemetry,
    }
}

fn agent() -> AgentRecord {
    AgentRecordBuilder::new("alice").build()
}

fn opts(ticket: &str) -> DeliveryOptions {
    DeliveryOptions {
        ticket_id: Some(kokino_core::TicketId::new(ticket)),
        ..Default::default()
    }
}

#[tokio::test]
async fn matching_outputs_record_clean_comparison() {
    let f = fixture(vec![ok("Hello   World", 200)], vec![ok("hello world", 150)]);

    let result = f
        .controller
        .run(&agent(), "hi", &opts("t-1"))
        .await
        .unwrap();
    // Tmux result is canonical.
    assert_eq!(result.response, "Hello   World");

    let stats = f.store.stats(60_000).unwrap();
    assert_eq!(stats.total, 1);
    assert_eq!(stats.matches, 1);
    assert_eq!(stats.mismatches, 0);
    // headless - tmux = 150 - 200
    assert_eq!(stats.avg_latency_delta_ms, Some(-50));
    assert_eq!(f.telemetry.count_of(MetricKind::ShadowCompared), 1);
    assert_eq!(f.telemetry.count_of(MetricKind::ShadowMismatch), 0);
}

#[tokio::test]
async fn mismatch_is_persisted_and_reported() {
    let f = fixture(vec![ok("answer A", 100)], vec![ok("answer B", 300)]);

    f.controller.run(&agent(), "hi", &opts("t-1")).await.unwrap();

    let mismatches = f.store.mismatches(10).unwrap();
    assert_eq!(mismatches.len(), 1);
    let row = &mismatches[0];
    assert!(row.tmux_success && row.headless_success);
    assert!(!row.output_match);
    assert_eq!(row.latency_delta_ms, Some(200));
    assert!(row.ticket_id.as_str().starts_with("t-1-shadow-"));
    assert_eq!(f.telemetry.count_of(MetricKind::ShadowMismatch), 1);
}

#[tokio::test]
async fn headless_failure_still_returns_tmux_result() {
    let f = fixture(
        vec![ok("tmux fine", 100)],
        vec![Err(EngineError::Upstream("spawn failed".into()))],
    );

    let result = f
        .controller
        .run(&agent(), "hi", &opts("t-1"))
        .await
        .unwrap();
    assert_eq!(result.response, "tmux fine");

    let failures = f.store.failures(10).unwrap();
    assert_eq!(failures.len(), 1);
    assert!(!failures[0].headless_success);
    assert_eq!(
        failures[0].headless_error.as_deref(),
        Some("upstream failure: spawn failed")
    );
    assert_eq!(f.telemetry.count_of(MetricKind::ShadowHeadlessFailure), 1);
    // No comparison metric when only one side succeeded.
    assert_eq!(f.telemetry.count_of(MetricKind::ShadowCompared), 0);
}

#[tokio::test]
async fn tmux_failure_propagates_as_the_caller_error() {
    let f = fixture(
        vec![Err(EngineError::Timeout { waited_ms: 500 })],
        vec![ok("headless fine", 100)],
    );

    let err = f
        .controller
        .run(&agent(), "hi", &opts("t-1"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Timeout { .. }));
    assert_eq!(f.telemetry.count_of(MetricKind::ShadowTmuxFailure), 1);

    let failures = f.store.failures(10).unwrap();
    assert_eq!(failures.len(), 1);
    assert!(failures[0].headless_success);
}

#[tokio::test]
async fn comparison_ids_are_unique_per_run() {
    let f = fixture(
        vec![ok("a", 1), ok("a", 1)],
        vec![ok("a", 1), ok("a", 1)],
    );
    f.controller.run(&agent(), "hi", &opts("t-1")).await.unwrap();
    f.controller.run(&agent(), "hi", &opts("t-1")).await.unwrap();

    let stats = f.store.stats(60_000).unwrap();
    assert_eq!(stats.total, 2);
}

#[tokio::test]
async fn normalization_ignores_case_and_whitespace() {
    let f = fixture(
        vec![ok("  The ANSWER\n\tis 42  ", 10)],
        vec![ok("the answer is 42", 10)],
    );
    f.controller.run(&agent(), "hi", &opts("t-1")).await.unwrap();
    assert_eq!(f.store.stats(60_000).unwrap().matches, 1);
}
