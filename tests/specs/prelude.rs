//! Shared fixture: a fully wired engine over in-memory stores and fakes.

use kokino_adapters::{FakeProcessSupervisor, FakeTermBackend};
use kokino_core::{
    AgentId, CliKind, DeliveryMode, FakeClock, SequentialIdGen, TicketMetadata,
};
use kokino_engine::router::TmuxProviderConfig;
use kokino_engine::{
    CircuitBreaker, CircuitBreakerConfig, DeliveryProvider, DeliveryRouter, EventBus,
    FallbackController, HeadlessProvider, RecordingTelemetry, Runner, RunnerConfig,
    SessionManager, ShadowController, TicketRequest, TicketService, TmuxProvider,
};
use kokino_storage::{
    AgentStore, ConversationStore, Db, MessageStore, ShadowStore, TicketStore,
};
use std::sync::Arc;
use std::time::Duration;

pub struct World {
    pub clock: FakeClock,
    pub agents: AgentStore,
    pub conversations: ConversationStore,
    pub shadow_store: ShadowStore,
    pub tickets: TicketService,
    pub sessions: SessionManager,
    pub breaker: CircuitBreaker,
    pub router: DeliveryRouter,
    pub supervisor: FakeProcessSupervisor,
    pub term: FakeTermBackend,
    pub fallback: FallbackController,
    pub telemetry: RecordingTelemetry,
}

pub fn world() -> World {
    world_with_breaker(CircuitBreakerConfig::default())
}

pub fn world_with_breaker(breaker_config: CircuitBreakerConfig) -> World {
    let clock = FakeClock::new(1_000_000);
    let shared_clock: Arc<FakeClock> = Arc::new(clock.clone());
    let db = Db::open_in_memory().unwrap();
    let ids = Arc::new(SequentialIdGen::new("spec"));
    let telemetry = RecordingTelemetry::new();
    let bus = EventBus::new(shared_clock.clone());

    let agents = AgentStore::new(db.clone(), shared_clock.clone());
    let conversations = ConversationStore::new(db.clone(), shared_clock.clone());
    let messages = MessageStore::new(db.clone(), shared_clock.clone());
    let shadow_store = ShadowStore::new(db.clone(), shared_clock.clone());

    let sessions = SessionManager::new(
        Arc::new(telemetry.clone()),
        bus.clone(),
        shared_clock.clone(),
    );
    let supervisor = FakeProcessSupervisor::new();
    let runner = Runner::new(
        agents.clone(),
        conversations.clone(),
        sessions.clone(),
        Arc::new(supervisor.clone()),
        Arc::new(telemetry.clone()),
        bus.clone(),
        ids.clone(),
        shared_clock.clone(),
        RunnerConfig::default(),
    );

    let headless: Arc<dyn DeliveryProvider> = Arc::new(HeadlessProvider::new(runner));
    let term = FakeTermBackend::new();
    let tmux: Arc<dyn DeliveryProvider> = Arc::new(TmuxProvider::new(
        term.clone(),
        TmuxProviderConfig {
            cwd: std::env::temp_dir(),
            poll_interval: Duration::from_millis(20),
            capture_lines: 50,
        },
    ));
    let shadow = Arc::new(ShadowController::new(
        headless.clone(),
        tmux.clone(),
        shadow_store.clone(),
        Arc::new(telemetry.clone()),
        bus.clone(),
        ids.clone(),
        shared_clock.clone(),
    ));

    let fallback = FallbackController::new();
    let breaker = CircuitBreaker::new(
        breaker_config,
        Arc::new(telemetry.clone()),
        bus.clone(),
        shared_clock.clone(),
    );
    let tickets = TicketService::new(
        agents.clone(),
        TicketStore::new(db, shared_clock.clone()),
        messages,
        bus.clone(),
        ids,
        shared_clock,
    );
    let router = DeliveryRouter::new(
        agents.clone(),
        fallback.clone(),
        breaker.clone(),
        headless,
        tmux,
        shadow,
        bus,
    );

    World {
        clock,
        agents,
        conversations,
        shadow_store,
        tickets,
        sessions,
        breaker,
        router,
        supervisor,
        term,
        fallback,
        telemetry,
    }
}

impl World {
    pub fn register(&self, id: &str, mode: DeliveryMode) {
        self.agents
            .register(
                &AgentId::new(id),
                CliKind::ClaudeCode,
                mode,
                serde_json::json!({}),
                30_000,
            )
            .unwrap();
    }

    pub fn ticket(&self, target: &str, origin: Option<&str>, payload: &str) -> TicketRequest {
        TicketRequest {
            target: AgentId::new(target),
            origin: origin.map(AgentId::new),
            payload: payload.to_string(),
            metadata: TicketMetadata::default(),
            expect_reply: true,
            timeout_ms: 30_000,
        }
    }
}
