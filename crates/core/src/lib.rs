pub mod audit;
pub mod catalog;
pub mod commands;
pub mod config;
pub mod domain;
pub mod errors;
pub mod execution;
pub mod permissions;
pub mod validation;

pub use audit::{AuditEntry, AuditError, AuditOutcome, AuditSink, AuditStage, InMemoryAuditSink};
pub use catalog::{ObjectCatalog, StructureTable};
pub use commands::{CommandSynthesizer, SynthesisError};
pub use config::{AppConfig, ExecutionMode};
pub use domain::actor::{Actor, ActorId, ActorStore, ActorStoreError, InMemoryActorStore, Role};
pub use domain::command::{Command, CommandPlan, LocatePlan};
pub use domain::intent::{Confidence, Intent, IntentAction, IntentKind, IntentSource};
pub use domain::world::{StaticWorld, WorldContext, WorldContextProvider};
pub use errors::{ApplicationError, DomainError, InterfaceError, PipelineRejection};
pub use execution::{
    CommandExecutor, ExecutionCoordinator, ExecutionMeta, ExecutionReceipt, ExecutorError,
    RateLimitConfig, RecordingExecutor,
};
pub use permissions::{PermissionDecision, PermissionEngine, PermissionPolicy};
pub use validation::{Simulator, ValidatedCommand, ValidationVerdict, Validator};
