use std::sync::Arc;

use warden_agent::llm::client_from_config;
use warden_agent::{AgentRuntime, AgentServices, RuntimeSettings};
use warden_core::config::{AppConfig, ExecutionMode, LoadOptions};
use warden_core::domain::actor::{ActorId, InMemoryActorStore};
use warden_core::domain::world::{StaticWorld, WorldContext};
use warden_core::{InMemoryAuditSink, RecordingExecutor};

use crate::commands::{current_thread_runtime, CommandResult};

/// Runs one chat message through the full pipeline with dispatch forced to
/// dry run. Nothing reaches a server and nothing is written to the audit
/// store; the configured model is still called for unmatched text.
pub fn run(actor: &str, message: &str) -> CommandResult {
    let actor = actor.trim();
    if actor.is_empty() {
        return CommandResult::failure("plan", "invalid_input", "actor must not be empty", 2);
    }

    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "plan",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match build_runtime(&config, actor) {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "plan",
                "pattern_tables",
                format!("pattern tables failed to compile: {error}"),
                2,
            );
        }
    };

    let executor = match current_thread_runtime("plan") {
        Ok(executor) => executor,
        Err(failure) => return failure,
    };

    let report = executor.block_on(runtime.handle_chat(&ActorId::new(actor), message));
    let summary = match &report.skipped {
        Some(reason) => format!("message skipped: {reason}"),
        None => format!("{} intent(s) planned as {}", report.intents.len(), report.role.as_str()),
    };
    CommandResult::success_with("plan", summary, &report)
}

fn build_runtime(config: &AppConfig, actor: &str) -> Result<AgentRuntime, regex::Error> {
    let world = StaticWorld(WorldContext {
        online: vec![actor.to_string()],
        weather: None,
        time_of_day: None,
    });
    let services = AgentServices::from_config(
        config,
        client_from_config(&config.llm),
        Arc::new(RecordingExecutor::default()),
        Arc::new(InMemoryAuditSink::default()),
        Arc::new(InMemoryActorStore::default()),
        Arc::new(world),
    )?;

    let mut settings = RuntimeSettings::from(&config.pipeline);
    settings.mode = ExecutionMode::DryRun;
    Ok(AgentRuntime::new(services, settings))
}
