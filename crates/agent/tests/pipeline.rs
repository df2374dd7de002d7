use std::sync::Arc;
use std::time::Duration;

use warden_agent::{
    AgentRuntime, AgentServices, CommandStatus, ConsoleOutcome, IntentOutcome, IntentResolver,
    LiveWorld, LlmClient, RuntimeSettings, ScriptedLlmClient,
};
use warden_core::{
    ActorId, AppConfig, AuditOutcome, AuditStage, CommandSynthesizer, ExecutionCoordinator,
    ExecutionMode, InMemoryActorStore, InMemoryAuditSink, IntentKind, ObjectCatalog,
    PermissionEngine, PermissionPolicy, RateLimitConfig, RecordingExecutor, Role, Simulator,
    StaticWorld, StructureTable, WorldContext, WorldContextProvider,
};

struct Harness {
    runtime: AgentRuntime,
    executor: RecordingExecutor,
    audit: InMemoryAuditSink,
    actors: InMemoryActorStore,
    permissions: Arc<PermissionEngine>,
    llm: Arc<ScriptedLlmClient>,
}

fn harness_with(mode: ExecutionMode, rate: RateLimitConfig, llm: ScriptedLlmClient) -> Harness {
    let config = AppConfig::default();
    let llm = Arc::new(llm);
    let client: Arc<dyn LlmClient> = llm.clone();
    let resolver = IntentResolver::new(
        client,
        ObjectCatalog::standard(),
        StructureTable::standard(),
        &config.resolver,
        config.llm.temperature,
    )
    .expect("resolver");

    let executor = RecordingExecutor::default();
    let audit = InMemoryAuditSink::default();
    let actors = InMemoryActorStore::default();
    let policy = PermissionPolicy::default()
        .with_roster(Role::Owner, ["Steve"])
        .with_roster(Role::Vip, ["Alex"]);

    let permissions = Arc::new(PermissionEngine::new(policy));
    let services = AgentServices {
        resolver,
        permissions: Arc::clone(&permissions),
        synthesizer: CommandSynthesizer::new(StructureTable::standard()),
        simulator: Arc::new(Simulator::new().expect("simulator")),
        coordinator: Arc::new(ExecutionCoordinator::new(
            rate,
            Arc::new(executor.clone()),
            Arc::new(audit.clone()),
        )),
        actors: Arc::new(actors.clone()),
        world: Arc::new(StaticWorld(WorldContext {
            online: vec!["Steve".to_string(), "Alex".to_string()],
            weather: Some("clear".to_string()),
            time_of_day: Some("day".to_string()),
        })),
    };
    let settings = RuntimeSettings { mode, ..RuntimeSettings::default() };

    Harness {
        runtime: AgentRuntime::new(services, settings),
        executor,
        audit,
        actors,
        permissions,
        llm,
    }
}

fn harness() -> Harness {
    harness_with(ExecutionMode::Live, RateLimitConfig::default(), ScriptedLlmClient::default())
}

fn steve() -> ActorId {
    ActorId::new("Steve")
}

#[tokio::test]
async fn owner_compound_request_dispatches_and_audits_each_command() {
    let h = harness();
    let report = h.runtime.handle_chat(&steve(), "give me 64 dirt and tp me to village").await;

    assert_eq!(report.role, Role::Owner);
    let kinds: Vec<IntentKind> = report.intents.iter().map(|intent| intent.kind).collect();
    assert_eq!(kinds, vec![IntentKind::GiveItem, IntentKind::Teleport]);
    assert_eq!(report.intents[0].outcome, IntentOutcome::Executed);
    assert_eq!(report.intents[1].outcome, IntentOutcome::LocatePending);

    assert_eq!(
        h.executor.commands(),
        vec!["give Steve dirt 64".to_string(), "locate structure minecraft:village".to_string()]
    );

    let entries = h.audit.entries();
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|entry| entry.outcome == AuditOutcome::Success));
    assert!(entries.iter().all(|entry| entry.raw_text == "give me 64 dirt and tp me to village"));
    assert_eq!(h.llm.calls(), 0);

    let profile = h.actors.snapshot(&steve()).expect("profile");
    assert_eq!(profile.interaction_count, 1);
    assert_eq!(profile.last_target.as_deref(), Some("dirt"));
}

#[tokio::test]
async fn locate_output_completes_the_structure_teleport() {
    let h = harness();
    h.runtime.handle_chat(&steve(), "tp me to village").await;
    assert!(h.runtime.has_pending_locate(&steve()));

    let report = h
        .runtime
        .complete_locate(&steve(), "The nearest village is at [120, ~, -340] (512 blocks away)")
        .await
        .expect("pending locate");

    assert_eq!(report.outcome, IntentOutcome::Executed);
    assert_eq!(report.commands[0].command, "tp Steve 120 ~ -340");
    assert!(!h.runtime.has_pending_locate(&steve()));
    assert!(h.runtime.complete_locate(&steve(), "[1, 2, 3]").await.is_none());
}

#[tokio::test]
async fn locate_output_without_coordinates_is_not_built() {
    let h = harness();
    h.runtime.handle_chat(&steve(), "tp me to village").await;

    let report = h
        .runtime
        .complete_locate(&steve(), "Could not find that structure nearby")
        .await
        .expect("pending locate");

    assert_eq!(report.outcome, IntentOutcome::NotBuilt);
    let last = h.audit.entries().pop().expect("audit entry");
    assert_eq!(last.stage, AuditStage::Synthesis);
    assert_eq!(last.outcome, AuditOutcome::Rejected);
}

#[tokio::test]
async fn locate_completion_is_authorized_against_the_current_policy() {
    let h = harness();
    h.runtime.handle_chat(&steve(), "tp me to village").await;
    h.permissions.reload(PermissionPolicy::default().with_roster(Role::Vip, ["Alex"]));

    let report = h
        .runtime
        .complete_locate(&steve(), "The nearest village is at [120, ~, -340] (512 blocks away)")
        .await
        .expect("pending locate");

    assert_eq!(report.outcome, IntentOutcome::Denied);
    assert_eq!(report.commands[0].command, "tp Steve 120 ~ -340");
    assert_eq!(report.commands[0].status, CommandStatus::Denied);
    assert_eq!(h.executor.commands(), vec!["locate structure minecraft:village".to_string()]);

    let last = h.audit.entries().pop().expect("audit entry");
    assert_eq!(last.stage, AuditStage::Permission);
    assert_eq!(last.outcome, AuditOutcome::Rejected);
    assert_eq!(last.command.as_deref(), Some("tp Steve 120 ~ -340"));
}

#[tokio::test]
async fn multi_item_give_yields_one_command_per_stack() {
    let h = harness();
    let report = h.runtime.handle_chat(&steve(), "give me 1 diamond and 4 obsidian").await;

    assert_eq!(report.intents.len(), 1);
    assert_eq!(report.intents[0].kind, IntentKind::GiveMulti);
    assert_eq!(
        h.executor.commands(),
        vec!["give Steve diamond 1".to_string(), "give Steve obsidian 4".to_string()]
    );
}

#[tokio::test]
async fn unlisted_actor_is_denied_and_audited() {
    let h = harness();
    let report = h.runtime.handle_chat(&ActorId::new("Herobrine"), "make it day").await;

    assert_eq!(report.role, Role::lowest());
    assert_eq!(report.intents[0].outcome, IntentOutcome::Denied);
    assert!(h.executor.commands().is_empty());

    let entries = h.audit.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].stage, AuditStage::Permission);
    assert_eq!(entries[0].outcome, AuditOutcome::Rejected);
}

#[tokio::test]
async fn vip_may_heal_but_not_change_weather() {
    let h = harness();
    let alex = ActorId::new("Alex");

    let heal = h.runtime.handle_chat(&alex, "heal me").await;
    assert_eq!(heal.intents[0].outcome, IntentOutcome::Executed);

    let rain = h.runtime.handle_chat(&alex, "make it rain").await;
    assert_eq!(rain.intents[0].outcome, IntentOutcome::Denied);
    assert_eq!(h.executor.commands().len(), 1);
}

#[tokio::test]
async fn rate_window_rejects_commands_over_the_limit() {
    let rate = RateLimitConfig { window: Duration::from_secs(60), max_commands: 1, history_capacity: 10 };
    let h = harness_with(ExecutionMode::Live, rate, ScriptedLlmClient::default());

    let report = h.runtime.handle_chat(&steve(), "give me 1 diamond and 4 obsidian").await;

    let intent = &report.intents[0];
    assert_eq!(intent.outcome, IntentOutcome::RateLimited);
    assert_eq!(intent.commands[0].status, CommandStatus::Executed);
    assert_eq!(intent.commands[1].status, CommandStatus::RateLimited);
    assert_eq!(h.executor.commands(), vec!["give Steve diamond 1".to_string()]);

    let stages: Vec<AuditStage> = h.audit.entries().iter().map(|entry| entry.stage).collect();
    assert_eq!(stages, vec![AuditStage::Execution, AuditStage::RateLimit]);
}

#[tokio::test]
async fn dry_run_simulates_without_dispatching() {
    let h = harness_with(ExecutionMode::DryRun, RateLimitConfig::default(), ScriptedLlmClient::default());
    let report = h.runtime.handle_chat(&steve(), "give me 64 dirt").await;

    assert_eq!(report.intents[0].outcome, IntentOutcome::Simulated);
    assert!(h.executor.commands().is_empty());
    assert_eq!(h.runtime.simulator().recent().len(), 1);

    let entries = h.audit.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].outcome, AuditOutcome::Simulated);
}

#[tokio::test]
async fn failing_executor_marks_the_intent_failed() {
    let h = harness();
    h.executor.fail_with(Some("connection refused".to_string()));

    let report = h.runtime.handle_chat(&steve(), "save the world").await;

    assert_eq!(report.intents[0].outcome, IntentOutcome::Failed);
    assert_eq!(h.audit.entries()[0].outcome, AuditOutcome::Failed);
}

#[tokio::test]
async fn unavailable_model_produces_an_error_outcome() {
    let h = harness();
    let report = h.runtime.handle_chat(&steve(), "what a lovely evening for a walk").await;

    assert_eq!(report.intents.len(), 1);
    assert_eq!(report.intents[0].outcome, IntentOutcome::Error);
    assert!(h.executor.commands().is_empty());

    let entries = h.audit.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].stage, AuditStage::Resolution);
}

#[tokio::test]
async fn model_kill_is_stopped_by_guardrails() {
    let llm = ScriptedLlmClient::replying([
        r#"[{"intent": "kill", "parameters": {"target": "Alex"}, "confidence": 0.99}]"#,
    ]);
    let h = harness_with(ExecutionMode::Live, RateLimitConfig::default(), llm);

    let report = h.runtime.handle_chat(&steve(), "please eliminate alex forever").await;

    assert_eq!(report.intents[0].outcome, IntentOutcome::Denied);
    assert!(h.executor.commands().is_empty());
    assert_eq!(h.audit.entries()[0].reason, "model_kill_disallowed");
}

#[tokio::test]
async fn scan_reports_the_world_without_commands() {
    let h = harness();
    let report = h.runtime.handle_chat(&steve(), "scan the area").await;

    assert_eq!(report.intents[0].outcome, IntentOutcome::Informational);
    assert!(report.intents[0].summary.as_deref().is_some_and(|summary| summary.contains("Alex")));
    assert!(h.executor.commands().is_empty());
    assert!(h.audit.entries().is_empty());
}

#[tokio::test]
async fn prefixed_and_empty_messages_are_skipped() {
    let h = harness();

    let command = h.runtime.handle_chat(&steve(), "/gamemode creative").await;
    assert_eq!(command.skipped.as_deref(), Some("ignored prefix"));

    let blank = h.runtime.handle_chat(&steve(), "   ").await;
    assert_eq!(blank.skipped.as_deref(), Some("empty message"));

    assert!(h.audit.entries().is_empty());
    assert!(h.actors.snapshot(&steve()).is_none());
}

#[tokio::test]
async fn off_mode_resolves_nothing() {
    let h = harness_with(ExecutionMode::Off, RateLimitConfig::default(), ScriptedLlmClient::default());
    let report = h.runtime.handle_chat(&steve(), "make it day").await;

    assert_eq!(report.skipped.as_deref(), Some("pipeline is off"));
    assert!(report.intents.is_empty());
}

#[tokio::test]
async fn last_target_feeds_follow_up_requests() {
    let h = harness();
    h.runtime.handle_chat(&steve(), "give me 2 cooked beef").await;
    h.runtime.handle_chat(&steve(), "give me 3 more").await;

    assert_eq!(
        h.executor.commands(),
        vec!["give Steve cooked_beef 2".to_string(), "give Steve cooked_beef 3".to_string()]
    );
}

#[tokio::test]
async fn console_lines_update_roster_and_run_chat() {
    let h = harness();
    let roster = LiveWorld::default();

    let joined = h
        .runtime
        .handle_console("[10:00:00] [Server thread/INFO]: Notch joined the game", &roster)
        .await;
    assert_eq!(joined, ConsoleOutcome::Joined { actor: "Notch".to_string() });

    let chat = h
        .runtime
        .handle_console("[10:00:05] [Server thread/INFO]: <Steve> make it day", &roster)
        .await;
    let ConsoleOutcome::Chat { report } = chat else {
        panic!("expected chat outcome");
    };
    assert_eq!(report.intents[0].outcome, IntentOutcome::Executed);
    assert_eq!(h.executor.commands(), vec!["time set 1000".to_string()]);

    let ignored = h.runtime.handle_console("Done (2.1s)! For help, type \"help\"", &roster).await;
    assert_eq!(ignored, ConsoleOutcome::Ignored);
    assert!(roster.snapshot().online.iter().any(|name| name == "Notch"));
}
