use serde::Serialize;
use warden_core::config::{AppConfig, LoadOptions};
use warden_core::domain::actor::{ActorId, Role};

use crate::commands::CommandResult;

#[derive(Debug, Serialize)]
struct Standing {
    actor: String,
    role: Role,
    capabilities: Vec<String>,
    min_confidence: f32,
}

pub fn run(actor: &str) -> CommandResult {
    let actor = actor.trim();
    if actor.is_empty() {
        return CommandResult::failure("whois", "invalid_input", "actor must not be empty", 2);
    }

    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "whois",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let policy = config.permission_policy();
    let role = policy.role_of(&ActorId::new(actor));
    let standing = Standing {
        actor: actor.to_string(),
        role,
        capabilities: policy.capabilities(role),
        min_confidence: policy.min_confidence(role),
    };

    CommandResult::success_with("whois", format!("{actor} is {}", role.as_str()), &standing)
}
