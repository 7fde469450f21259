// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::config::Config;
use crate::lifecycle::assemble;
use kokino_adapters::{FakeProcessSupervisor, FakeTermBackend, ScriptedOutcome};
use kokino_core::{CliKind, DeliveryMode, FakeClock, MetricKind, SequentialIdGen, TicketMetadata};
use kokino_engine::RecordingTelemetry;
use kokino_storage::Db;

struct Fixture {
    ctx: Arc<ListenCtx>,
    supervisor: FakeProcessSupervisor,
    telemetry: RecordingTelemetry,
}

fn fixture() -> Fixture {
    let clock = Arc::new(FakeClock::new(500_000));
    let supervisor = FakeProcessSupervisor::new();
    let telemetry = RecordingTelemetry::new();
    let ctx = assemble(
        Config::default(),
        Db::open_in_memory().unwrap(),
        kokino_storage::TelemetryStore::open_in_memory(clock.clone()).unwrap(),
        Arc::new(telemetry.clone()),
        Arc::new(supervisor.clone()),
        FakeTermBackend::new(),
        clock,
        Arc::new(SequentialIdGen::new("d")),
    );
    Fixture {
        ctx,
        supervisor,
        telemetry,
    }
}

async fn call(f: &Fixture, request: Request) -> Response {
    handle_request(&f.ctx, request).await
}

fn register_request(id: &str, mode: DeliveryMode) -> Request {
    Request::AgentRegister {
        agent_id: id.to_string(),
        kind: CliKind::Mock,
        delivery_mode: Some(mode),
        metadata: serde_json::json!({}),
        heartbeat_interval_ms: 30_000,
    }
}

#[tokio::test]
async fn ping_pongs() {
    let f = fixture();
    assert_eq!(call(&f, Request::Ping).await, Response::Pong);
}

#[tokio::test]
async fn hello_reports_version() {
    let f = fixture();
    match call(
        &f,
        Request::Hello {
            version: "9.9.9".into(),
        },
    )
    .await
    {
        Response::Hello { version } => assert_eq!(version, PROTOCOL_VERSION),
        other => panic!("unexpected: {:?}", other),
    }
}

#[tokio::test]
async fn register_validates_and_creates() {
    let f = fixture();
    match call(&f, register_request("alice", DeliveryMode::Headless)).await {
        Response::Agent { agent } => {
            assert_eq!(agent.agent_id, "alice");
            assert_eq!(agent.kind, CliKind::Mock);
        }
        other => panic!("unexpected: {:?}", other),
    }

    // Whitespace ids are rejected with a 400.
    match call(&f, register_request("bad id", DeliveryMode::Headless)).await {
        Response::Error { code, .. } => assert_eq!(code, 400),
        other => panic!("unexpected: {:?}", other),
    }
}

#[tokio::test]
async fn unknown_agent_maps_to_404() {
    let f = fixture();
    match call(
        &f,
        Request::AgentHeartbeat {
            agent_id: "ghost".into(),
        },
    )
    .await
    {
        Response::Error { code, .. } => assert_eq!(code, 404),
        other => panic!("unexpected: {:?}", other),
    }
}

#[tokio::test]
async fn delete_cascades_and_404s_after() {
    let f = fixture();
    call(&f, register_request("alice", DeliveryMode::Headless)).await;
    assert_eq!(
        call(
            &f,
            Request::AgentDelete {
                agent_id: "alice".into()
            }
        )
        .await,
        Response::Ok
    );
    match call(
        &f,
        Request::AgentDelete {
            agent_id: "alice".into(),
        },
    )
    .await
    {
        Response::Error { code, .. } => assert_eq!(code, 404),
        other => panic!("unexpected: {:?}", other),
    }
}

#[tokio::test]
async fn execute_runs_headless_turn() {
    let f = fixture();
    call(&f, register_request("alice", DeliveryMode::Headless)).await;
    f.supervisor
        .push(ScriptedOutcome::jsonl_result("hi there", "s-1"));

    match call(
        &f,
        Request::Execute {
            agent_id: "alice".into(),
            prompt: "hello".into(),
            timeout_ms: None,
            conversation_id: None,
            metadata: None,
        },
    )
    .await
    {
        Response::ExecuteResult { result } => {
            assert_eq!(result.response, "hi there");
            assert_eq!(result.mode, DeliveryMode::Headless);
            assert!(result.conversation_id.is_some());
            assert_eq!(result.session_id.as_deref(), Some("s-1"));
        }
        other => panic!("unexpected: {:?}", other),
    }
}

#[tokio::test]
async fn ticket_send_dispatches_and_wait_returns_reply() {
    let f = fixture();
    call(&f, register_request("alice", DeliveryMode::Headless)).await;
    call(&f, register_request("bob", DeliveryMode::Headless)).await;
    f.supervisor
        .push(ScriptedOutcome::jsonl_result("pong", "s-bob"));

    let ticket_id = match call(
        &f,
        Request::TicketSend {
            target: "bob".into(),
            origin: Some("alice".into()),
            payload: "ping".into(),
            metadata: TicketMetadata::default(),
            expect_reply: true,
            timeout_ms: Some(10_000),
        },
    )
    .await
    {
        Response::Ticket { ticket } => ticket.ticket_id,
        other => panic!("unexpected: {:?}", other),
    };

    match call(
        &f,
        Request::TicketWait {
            ticket_id: ticket_id.to_string(),
            timeout_ms: 5_000,
        },
    )
    .await
    {
        Response::Reply { payload } => assert_eq!(payload, "pong"),
        other => panic!("unexpected: {:?}", other),
    }

    // Reverse ticket lands in alice's queue.
    for _ in 0..100 {
        if let Response::Tickets { tickets } = call(
            &f,
            Request::TicketsPending {
                agent_id: "alice".into(),
            },
        )
        .await
        {
            if !tickets.is_empty() {
                assert!(tickets[0].metadata.is_reply);
                assert_eq!(tickets[0].payload, "pong");
                return;
            }
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("reverse ticket never arrived");
}

#[tokio::test]
async fn tmux_agent_tickets_stay_pending_for_polling() {
    let f = fixture();
    call(&f, register_request("alice", DeliveryMode::Tmux)).await;

    let ticket_id = match call(
        &f,
        Request::TicketSend {
            target: "alice".into(),
            origin: None,
            payload: "poll me".into(),
            metadata: TicketMetadata::default(),
            expect_reply: false,
            timeout_ms: None,
        },
    )
    .await
    {
        Response::Ticket { ticket } => ticket.ticket_id,
        other => panic!("unexpected: {:?}", other),
    };

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    match call(
        &f,
        Request::TicketsPending {
            agent_id: "alice".into(),
        },
    )
    .await
    {
        Response::Tickets { tickets } => {
            assert_eq!(tickets.len(), 1);
            assert_eq!(tickets[0].ticket_id, ticket_id);
        }
        other => panic!("unexpected: {:?}", other),
    }

    // The polling agent acknowledges and replies by hand.
    call(
        &f,
        Request::TicketAcknowledge {
            ticket_id: ticket_id.to_string(),
        },
    )
    .await;
    match call(
        &f,
        Request::ReplyPost {
            ticket_id: ticket_id.to_string(),
            payload: "manual reply".into(),
            metadata: serde_json::json!({}),
        },
    )
    .await
    {
        Response::Ticket { ticket } => {
            assert_eq!(ticket.response.as_deref(), Some("manual reply"));
        }
        other => panic!("unexpected: {:?}", other),
    }
}

#[tokio::test]
async fn conversations_surface_after_execution() {
    let f = fixture();
    call(&f, register_request("alice", DeliveryMode::Headless)).await;
    f.supervisor.push(ScriptedOutcome::jsonl_result("resp", "s"));
    call(
        &f,
        Request::Execute {
            agent_id: "alice".into(),
            prompt: "q".into(),
            timeout_ms: None,
            conversation_id: None,
            metadata: None,
        },
    )
    .await;

    let conversation_id = match call(
        &f,
        Request::ConversationsList {
            agent_id: "alice".into(),
        },
    )
    .await
    {
        Response::Conversations { conversations } => {
            assert_eq!(conversations.len(), 1);
            conversations[0].conversation_id.clone()
        }
        other => panic!("unexpected: {:?}", other),
    };

    match call(
        &f,
        Request::ConversationGet {
            conversation_id: conversation_id.to_string(),
        },
    )
    .await
    {
        Response::Conversation { turns, .. } => assert_eq!(turns.len(), 2),
        other => panic!("unexpected: {:?}", other),
    }
}

#[tokio::test]
async fn integrity_check_is_clean_on_fresh_store() {
    let f = fixture();
    match call(&f, Request::IntegrityCheck).await {
        Response::Integrity { report } => assert!(report.is_clean()),
        other => panic!("unexpected: {:?}", other),
    }
    assert_eq!(f.telemetry.count_of(MetricKind::IntegrityViolation), 0);
}

#[tokio::test]
async fn slo_endpoint_validates_sli_name() {
    let f = fixture();
    match call(
        &f,
        Request::MetricsSlo {
            sli: "vibes".into(),
            window_hours: 24,
        },
    )
    .await
    {
        Response::Error { code, .. } => assert_eq!(code, 400),
        other => panic!("unexpected: {:?}", other),
    }

    match call(
        &f,
        Request::MetricsSlo {
            sli: "availability".into(),
            window_hours: 24,
        },
    )
    .await
    {
        Response::Slo { budget } => {
            assert!((budget.target - 0.995).abs() < f64::EPSILON);
        }
        other => panic!("unexpected: {:?}", other),
    }
}

#[tokio::test]
async fn every_request_records_endpoint_telemetry() {
    let f = fixture();
    call(&f, Request::Ping).await;
    call(
        &f,
        Request::AgentHeartbeat {
            agent_id: "ghost".into(),
        },
    )
    .await;

    let requests: Vec<_> = f
        .telemetry
        .records()
        .into_iter()
        .filter(|r| r.event == MetricKind::Request)
        .collect();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].metadata["path"], "/ping");
    assert_eq!(requests[0].success, Some(true));
    assert_eq!(requests[1].metadata["path"], "/agents/heartbeat");
    assert_eq!(requests[1].success, Some(false));
}

#[tokio::test]
async fn status_reports_counts() {
    let f = fixture();
    call(&f, register_request("alice", DeliveryMode::Headless)).await;
    match call(&f, Request::Status).await {
        Response::Status { status } => {
            assert_eq!(status.agents_total, 1);
            assert_eq!(status.agents_online, 1);
            assert_eq!(status.active_executions, 0);
        }
        other => panic!("unexpected: {:?}", other),
    }
}

#[tokio::test]
async fn shutdown_request_notifies() {
    let f = fixture();
    let notified = {
        let shutdown = Arc::clone(&f.ctx.shutdown);
        tokio::spawn(async move { shutdown.notified().await })
    };
    tokio::task::yield_now().await;
    assert_eq!(call(&f, Request::Shutdown).await, Response::Ok);
    notified.await.unwrap();
}
