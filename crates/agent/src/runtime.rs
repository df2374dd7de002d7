use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use warden_core::audit::{AuditOutcome, AuditSink, AuditStage};
use warden_core::catalog::{ObjectCatalog, StructureTable};
use warden_core::commands::CommandSynthesizer;
use warden_core::config::{AppConfig, ExecutionMode, PipelineConfig};
use warden_core::domain::actor::{Actor, ActorId, ActorStore, Role};
use warden_core::domain::command::{Command, CommandPlan, LocatePlan};
use warden_core::domain::intent::{Confidence, Intent, IntentAction, IntentKind, IntentSource};
use warden_core::domain::world::{WorldContext, WorldContextProvider};
use warden_core::execution::{CommandExecutor, ExecutionCoordinator, ExecutionMeta};
use warden_core::permissions::{PermissionEngine, PermissionPolicy};
use warden_core::validation::Simulator;

use crate::console::{parse_line, ConsoleEvent, LiveWorld};
use crate::guardrails::{GuardrailDecision, GuardrailPolicy};
use crate::llm::LlmClient;
use crate::resolver::IntentResolver;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentOutcome {
    Executed,
    Simulated,
    Denied,
    NotBuilt,
    Rejected,
    RateLimited,
    Failed,
    LocatePending,
    Informational,
    NoIntent,
    Error,
}

impl IntentOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Executed => "executed",
            Self::Simulated => "simulated",
            Self::Denied => "denied",
            Self::NotBuilt => "not_built",
            Self::Rejected => "rejected",
            Self::RateLimited => "rate_limited",
            Self::Failed => "failed",
            Self::LocatePending => "locate_pending",
            Self::Informational => "informational",
            Self::NoIntent => "no_intent",
            Self::Error => "error",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    Executed,
    Simulated,
    Denied,
    Rejected,
    RateLimited,
    Failed,
}

impl CommandStatus {
    fn outcome(self) -> IntentOutcome {
        match self {
            Self::Executed => IntentOutcome::Executed,
            Self::Simulated => IntentOutcome::Simulated,
            Self::Denied => IntentOutcome::Denied,
            Self::Rejected => IntentOutcome::Rejected,
            Self::RateLimited => IntentOutcome::RateLimited,
            Self::Failed => IntentOutcome::Failed,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CommandReport {
    pub command: String,
    pub status: CommandStatus,
    pub reason: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct IntentReport {
    pub kind: IntentKind,
    pub confidence: Confidence,
    pub source: IntentSource,
    pub outcome: IntentOutcome,
    pub reason: Option<String>,
    pub commands: Vec<CommandReport>,
    pub locate: Option<LocatePlan>,
    pub summary: Option<String>,
}

impl IntentReport {
    fn new(intent: &Intent, outcome: IntentOutcome) -> Self {
        Self {
            kind: intent.kind(),
            confidence: intent.confidence,
            source: intent.source,
            outcome,
            reason: None,
            commands: Vec::new(),
            locate: None,
            summary: None,
        }
    }

    fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PipelineReport {
    pub actor: ActorId,
    pub role: Role,
    pub mode: ExecutionMode,
    pub skipped: Option<String>,
    pub intents: Vec<IntentReport>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConsoleOutcome {
    Chat { report: PipelineReport },
    Joined { actor: String },
    Left { actor: String },
    Ignored,
}

/// Collaborators the runtime drives. Built once at startup and shared.
pub struct AgentServices {
    pub resolver: IntentResolver,
    pub permissions: Arc<PermissionEngine>,
    pub synthesizer: CommandSynthesizer,
    pub simulator: Arc<Simulator>,
    pub coordinator: Arc<ExecutionCoordinator>,
    pub actors: Arc<dyn ActorStore>,
    pub world: Arc<dyn WorldContextProvider>,
}

impl AgentServices {
    /// Standard catalogue and structure tables plus the configured policy,
    /// rate window and resolver limits around the given collaborators.
    pub fn from_config(
        config: &AppConfig,
        llm: Arc<dyn LlmClient>,
        executor: Arc<dyn CommandExecutor>,
        audit: Arc<dyn AuditSink>,
        actors: Arc<dyn ActorStore>,
        world: Arc<dyn WorldContextProvider>,
    ) -> Result<Self, regex::Error> {
        let structures = StructureTable::standard();
        Ok(Self {
            resolver: IntentResolver::new(
                llm,
                ObjectCatalog::standard(),
                structures.clone(),
                &config.resolver,
                config.llm.temperature,
            )?,
            permissions: Arc::new(PermissionEngine::new(config.permission_policy())),
            synthesizer: CommandSynthesizer::new(structures),
            simulator: Arc::new(Simulator::new()?),
            coordinator: Arc::new(ExecutionCoordinator::new(
                config.rate_limit_config(),
                executor,
                audit,
            )),
            actors,
            world,
        })
    }
}

#[derive(Clone, Debug)]
pub struct RuntimeSettings {
    pub mode: ExecutionMode,
    pub ignore_prefixes: Vec<String>,
    pub guardrails: GuardrailPolicy,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::Live,
            ignore_prefixes: vec!["/".to_string(), "!".to_string()],
            guardrails: GuardrailPolicy::default(),
        }
    }
}

impl From<&PipelineConfig> for RuntimeSettings {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            mode: config.mode,
            ignore_prefixes: config.ignore_prefixes.clone(),
            guardrails: GuardrailPolicy::default(),
        }
    }
}

struct PendingLocate {
    plan: LocatePlan,
    meta: ExecutionMeta,
}

pub struct AgentRuntime {
    services: AgentServices,
    settings: RuntimeSettings,
    pending_locates: Mutex<HashMap<ActorId, PendingLocate>>,
}

impl AgentRuntime {
    pub fn new(services: AgentServices, settings: RuntimeSettings) -> Self {
        Self { services, settings, pending_locates: Mutex::default() }
    }

    pub fn mode(&self) -> ExecutionMode {
        self.settings.mode
    }

    pub fn permissions(&self) -> &Arc<PermissionEngine> {
        &self.services.permissions
    }

    pub fn coordinator(&self) -> &Arc<ExecutionCoordinator> {
        &self.services.coordinator
    }

    pub fn simulator(&self) -> &Arc<Simulator> {
        &self.services.simulator
    }

    pub fn world(&self) -> WorldContext {
        self.services.world.snapshot()
    }

    pub fn has_pending_locate(&self, actor: &ActorId) -> bool {
        self.with_pending(|pending| pending.contains_key(actor))
    }

    /// Runs one chat line through resolution, guardrails, permission,
    /// synthesis, validation and execution.
    pub async fn handle_chat(&self, actor_id: &ActorId, text: &str) -> PipelineReport {
        let policy = self.services.permissions.snapshot();
        let role = policy.role_of(actor_id);
        let mut report = PipelineReport {
            actor: actor_id.clone(),
            role,
            mode: self.settings.mode,
            skipped: None,
            intents: Vec::new(),
        };

        if self.settings.mode == ExecutionMode::Off {
            report.skipped = Some("pipeline is off".to_string());
            return report;
        }
        let trimmed = text.trim();
        if trimmed.is_empty() {
            report.skipped = Some("empty message".to_string());
            return report;
        }
        if self.settings.ignore_prefixes.iter().any(|prefix| trimmed.starts_with(prefix.as_str())) {
            report.skipped = Some("ignored prefix".to_string());
            return report;
        }

        let mut actor = match self.services.actors.get_actor(actor_id).await {
            Ok(actor) => actor,
            Err(error) => {
                tracing::warn!(
                    event_name = "pipeline.actor.lookup_failed",
                    correlation_id = %actor_id,
                    error = %error,
                    "actor store unavailable, continuing with a blank profile"
                );
                Actor::new(actor_id.clone())
            }
        };
        actor.role = role;
        if let Err(error) = self.services.actors.increment_interaction_count(actor_id).await {
            tracing::warn!(
                event_name = "pipeline.actor.count_failed",
                correlation_id = %actor_id,
                error = %error,
                "interaction count not updated"
            );
        }

        let world = self.services.world.snapshot();
        let intents = self.services.resolver.resolve(trimmed, &actor, &world).await;
        tracing::info!(
            event_name = "pipeline.intent.resolved",
            correlation_id = %actor_id,
            role = role.as_str(),
            intents = intents.len(),
            kinds = ?intents.iter().map(|intent| intent.kind().as_str()).collect::<Vec<_>>(),
            "message resolved"
        );

        for intent in intents {
            let intent_report = self.process(&policy, &actor, &intent, &world).await;
            tracing::info!(
                event_name = "pipeline.intent.outcome",
                correlation_id = %actor_id,
                intent_kind = intent_report.kind.as_str(),
                outcome = intent_report.outcome.as_str(),
                "intent handled"
            );
            report.intents.push(intent_report);
        }
        report
    }

    /// Finishes a structure teleport once the external system has answered
    /// the locate query issued for `actor_id`. `None` when nothing is
    /// pending for that actor.
    pub async fn complete_locate(&self, actor_id: &ActorId, output: &str) -> Option<IntentReport> {
        let pending = self.with_pending(|pending| pending.remove(actor_id))?;
        let intent = Intent::new(
            IntentAction::Teleport {
                target: Some(pending.plan.target.clone()),
                destination: Some(pending.plan.structure.clone()),
            },
            pending.meta.confidence.value(),
            IntentSource::Resolver,
            pending.meta.raw_text.clone(),
        );

        let Some(travel) = pending.plan.travel_command(output) else {
            let reason = "locate output contained no coordinates";
            self.services
                .coordinator
                .record_rejection(actor_id, &pending.meta, AuditStage::Synthesis, None, reason)
                .await;
            return Some(IntentReport::new(&intent, IntentOutcome::NotBuilt).with_reason(reason));
        };

        let policy = self.services.permissions.snapshot();
        let commands = self.run_commands(&policy, actor_id, &pending.meta, &[travel]).await;
        Some(finish(IntentReport::new(&intent, IntentOutcome::Executed), commands))
    }

    pub async fn handle_console(&self, line: &str, roster: &LiveWorld) -> ConsoleOutcome {
        let Some(event) = parse_line(line) else {
            return ConsoleOutcome::Ignored;
        };
        roster.observe(&event);
        match event {
            ConsoleEvent::Chat { actor, message } => ConsoleOutcome::Chat {
                report: self.handle_chat(&ActorId::new(actor), &message).await,
            },
            ConsoleEvent::Joined { actor } => ConsoleOutcome::Joined { actor },
            ConsoleEvent::Left { actor } => ConsoleOutcome::Left { actor },
        }
    }

    async fn process(
        &self,
        policy: &PermissionPolicy,
        actor: &Actor,
        intent: &Intent,
        world: &WorldContext,
    ) -> IntentReport {
        let meta = ExecutionMeta::new(intent.raw_text.clone(), intent.kind(), intent.confidence);
        let coordinator = &self.services.coordinator;

        match self.settings.guardrails.evaluate(intent) {
            GuardrailDecision::Allow => {}
            GuardrailDecision::Deny { reason_code, user_message, .. } => {
                coordinator
                    .record_rejection(&actor.id, &meta, AuditStage::Permission, None, reason_code)
                    .await;
                return IntentReport::new(intent, IntentOutcome::Denied).with_reason(user_message);
            }
            GuardrailDecision::Degrade { user_message, .. } => {
                return match &intent.action {
                    IntentAction::Scan => {
                        let mut report = IntentReport::new(intent, IntentOutcome::Informational)
                            .with_reason(user_message);
                        report.summary = Some(world.describe());
                        report
                    }
                    IntentAction::Error { reason } => {
                        coordinator
                            .record_rejection(&actor.id, &meta, AuditStage::Resolution, None, reason)
                            .await;
                        IntentReport::new(intent, IntentOutcome::Error).with_reason(reason.clone())
                    }
                    _ => {
                        coordinator
                            .record_rejection(
                                &actor.id,
                                &meta,
                                AuditStage::Resolution,
                                None,
                                "no actionable intent",
                            )
                            .await;
                        IntentReport::new(intent, IntentOutcome::NoIntent).with_reason(user_message)
                    }
                };
            }
        }

        let decision = policy.decide(&actor.id, intent.kind(), intent.confidence);
        if !decision.allowed {
            tracing::warn!(
                event_name = "pipeline.permission.denied",
                correlation_id = %actor.id,
                role = decision.role.as_str(),
                capability = %decision.capability,
                reason = %decision.reason,
                "intent denied"
            );
            coordinator
                .record_rejection(&actor.id, &meta, AuditStage::Permission, None, &decision.reason)
                .await;
            return IntentReport::new(intent, IntentOutcome::Denied).with_reason(decision.reason);
        }

        let action = intent.action.clone().with_default_target(actor.id.as_str());
        let plan = match self.services.synthesizer.build(&action) {
            Ok(Some(plan)) => plan,
            Ok(None) => {
                let reason = "no command could be built";
                coordinator
                    .record_rejection(&actor.id, &meta, AuditStage::Synthesis, None, reason)
                    .await;
                return IntentReport::new(intent, IntentOutcome::NotBuilt).with_reason(reason);
            }
            Err(error) => {
                tracing::debug!(
                    event_name = "pipeline.synthesis.failed",
                    correlation_id = %actor.id,
                    code = error.code(),
                    error = %error,
                    "command synthesis failed"
                );
                coordinator
                    .record_rejection(
                        &actor.id,
                        &meta,
                        AuditStage::Synthesis,
                        None,
                        error.to_string(),
                    )
                    .await;
                return IntentReport::new(intent, IntentOutcome::NotBuilt)
                    .with_reason(error.to_string());
            }
        };

        let report = match plan {
            CommandPlan::LocateThenTravel { plan } => {
                let commands = self
                    .run_commands(
                        policy,
                        &actor.id,
                        &meta,
                        std::slice::from_ref(&plan.locate_command),
                    )
                    .await;
                let mut report = finish(IntentReport::new(intent, IntentOutcome::Executed), commands);
                if matches!(report.outcome, IntentOutcome::Executed | IntentOutcome::Simulated) {
                    report.outcome = IntentOutcome::LocatePending;
                    report.locate = Some(plan.clone());
                    self.with_pending(|pending| {
                        pending.insert(actor.id.clone(), PendingLocate { plan, meta: meta.clone() })
                    });
                }
                report
            }
            plan => {
                let commands = self.run_commands(policy, &actor.id, &meta, plan.commands()).await;
                finish(IntentReport::new(intent, IntentOutcome::Executed), commands)
            }
        };

        if report.outcome == IntentOutcome::Executed {
            self.remember_target(&actor.id, &action).await;
        }
        report
    }

    /// Each command is authorized on its own against `policy`, the snapshot
    /// the request started with, before it is validated.
    async fn run_commands(
        &self,
        policy: &PermissionPolicy,
        actor: &ActorId,
        meta: &ExecutionMeta,
        commands: &[Command],
    ) -> Vec<CommandReport> {
        let mut reports = Vec::with_capacity(commands.len());
        for command in commands {
            let decision = policy.decide(actor, meta.intent_kind, meta.confidence);
            if !decision.allowed {
                tracing::warn!(
                    event_name = "pipeline.permission.denied",
                    correlation_id = %actor,
                    command = command.as_str(),
                    reason = %decision.reason,
                    "command denied"
                );
                self.services
                    .coordinator
                    .record_rejection(
                        actor,
                        meta,
                        AuditStage::Permission,
                        Some(command.as_str()),
                        &decision.reason,
                    )
                    .await;
                reports.push(CommandReport {
                    command: command.as_str().to_string(),
                    status: CommandStatus::Denied,
                    reason: decision.reason,
                });
                continue;
            }

            let validated = match self.services.simulator.validator().check(command) {
                Ok(validated) => validated,
                Err(verdict) => {
                    tracing::warn!(
                        event_name = "pipeline.validation.rejected",
                        correlation_id = %actor,
                        command = command.as_str(),
                        reason = %verdict.reason,
                        "command rejected by validator"
                    );
                    self.services
                        .coordinator
                        .record_rejection(
                            actor,
                            meta,
                            AuditStage::Validation,
                            Some(command.as_str()),
                            &verdict.reason,
                        )
                        .await;
                    reports.push(CommandReport {
                        command: command.as_str().to_string(),
                        status: CommandStatus::Rejected,
                        reason: verdict.reason,
                    });
                    continue;
                }
            };

            let receipt = if self.settings.mode == ExecutionMode::DryRun {
                let verdict = self.services.simulator.simulate(validated.as_str(), actor);
                if !verdict.ok {
                    self.services
                        .coordinator
                        .record_rejection(
                            actor,
                            meta,
                            AuditStage::Validation,
                            Some(validated.as_str()),
                            &verdict.reason,
                        )
                        .await;
                    reports.push(CommandReport {
                        command: validated.as_str().to_string(),
                        status: CommandStatus::Rejected,
                        reason: verdict.reason,
                    });
                    continue;
                }
                self.services.coordinator.rehearse(&validated, actor, meta).await
            } else {
                self.services.coordinator.execute(&validated, actor, meta).await
            };

            let status = match (receipt.outcome, receipt.stage) {
                (AuditOutcome::Success, _) => CommandStatus::Executed,
                (AuditOutcome::Simulated, _) => CommandStatus::Simulated,
                (AuditOutcome::Rejected, AuditStage::RateLimit) => CommandStatus::RateLimited,
                (AuditOutcome::Rejected, _) => CommandStatus::Rejected,
                (AuditOutcome::Failed, _) => CommandStatus::Failed,
            };
            reports.push(CommandReport {
                command: validated.as_str().to_string(),
                status,
                reason: receipt.reason,
            });
        }
        reports
    }

    async fn remember_target(&self, actor: &ActorId, action: &IntentAction) {
        if !matches!(
            action.kind(),
            IntentKind::GiveItem
                | IntentKind::GiveMulti
                | IntentKind::Summon
                | IntentKind::SummonMulti
                | IntentKind::Teleport
        ) {
            return;
        }
        let Some(reference) = action.reference() else {
            return;
        };
        if let Err(error) = self.services.actors.set_last_target(actor, &reference).await {
            tracing::warn!(
                event_name = "pipeline.actor.last_target_failed",
                correlation_id = %actor,
                error = %error,
                "last target not stored"
            );
        }
    }

    fn with_pending<T>(&self, apply: impl FnOnce(&mut HashMap<ActorId, PendingLocate>) -> T) -> T {
        match self.pending_locates.lock() {
            Ok(mut pending) => apply(&mut *pending),
            Err(poisoned) => apply(&mut *poisoned.into_inner()),
        }
    }
}

/// The first command that did not go through decides the intent outcome.
fn finish(mut report: IntentReport, commands: Vec<CommandReport>) -> IntentReport {
    let problem = commands
        .iter()
        .find(|command| !matches!(command.status, CommandStatus::Executed | CommandStatus::Simulated));
    match problem {
        Some(command) => {
            report.outcome = command.status.outcome();
            report.reason = Some(command.reason.clone());
        }
        None if commands.iter().all(|command| command.status == CommandStatus::Simulated) => {
            report.outcome = IntentOutcome::Simulated;
        }
        None => report.outcome = IntentOutcome::Executed,
    }
    report.commands = commands;
    report
}
