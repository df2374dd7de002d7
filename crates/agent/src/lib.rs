//! Language side of the warden pipeline.
//!
//! Chat text is rewritten for pronouns, split into sub-messages and resolved
//! by a single dispatcher: ordered patterns first, then acquisition and
//! travel heuristics, and only then the language model. [`AgentRuntime`]
//! carries each resolved intent through guardrails, permissions, synthesis,
//! validation and rate-limited execution.
//!
//! The model is strictly a translator. It never decides who may do what;
//! that is the permission engine's job in `warden-core`.

pub mod acquisition;
pub mod console;
pub mod guardrails;
pub mod llm;
pub mod model;
pub mod pronouns;
pub mod resolver;
pub mod rules;
pub mod runtime;
pub mod travel;

pub use console::{parse_line, ConsoleEvent, LiveWorld};
pub use guardrails::{GuardrailDecision, GuardrailPolicy};
pub use llm::{DisabledLlmClient, HttpLlmClient, LlmClient, LlmError, ScriptedLlmClient};
pub use resolver::IntentResolver;
pub use runtime::{
    AgentRuntime, AgentServices, CommandReport, CommandStatus, ConsoleOutcome, IntentOutcome,
    IntentReport, PipelineReport, RuntimeSettings,
};
