use warden_core::domain::intent::{Intent, IntentAction, IntentSource};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardrailDecision {
    Allow,
    Deny { reason_code: &'static str, user_message: String, fallback_path: &'static str },
    Degrade { reason_code: &'static str, user_message: String, fallback_path: &'static str },
}

/// Gate applied to every resolved intent before permission checks. The
/// model is a translator: what it may trigger on its own is narrower than
/// what a deterministic rule may.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GuardrailPolicy {
    pub llm_can_kill: bool,
    pub mass_selectors_for_destructive: bool,
}

impl Default for GuardrailPolicy {
    fn default() -> Self {
        Self { llm_can_kill: false, mass_selectors_for_destructive: false }
    }
}

impl GuardrailPolicy {
    pub fn evaluate(&self, intent: &Intent) -> GuardrailDecision {
        match &intent.action {
            IntentAction::Kill { target } => {
                if intent.source == IntentSource::Model && !self.llm_can_kill {
                    return GuardrailDecision::Deny {
                        reason_code: "model_kill_disallowed",
                        user_message: "I will not kill anything on a guess. Ask with an explicit kill request."
                            .to_string(),
                        fallback_path: "explicit_kill_request",
                    };
                }
                if is_mass_selector(target.as_deref()) && !self.mass_selectors_for_destructive {
                    return GuardrailDecision::Deny {
                        reason_code: "mass_selector_disallowed",
                        user_message: "Destructive commands must name a single target.".to_string(),
                        fallback_path: "name_single_target",
                    };
                }
                GuardrailDecision::Allow
            }
            IntentAction::Scan => GuardrailDecision::Degrade {
                reason_code: "informational_only",
                user_message: "Here is what I can see right now.".to_string(),
                fallback_path: "world_snapshot",
            },
            IntentAction::NoIntent => GuardrailDecision::Degrade {
                reason_code: "no_actionable_intent",
                user_message: "I did not find anything to do in that message.".to_string(),
                fallback_path: "no_action",
            },
            IntentAction::Error { .. } => GuardrailDecision::Degrade {
                reason_code: "resolver_error",
                user_message: "I could not safely work out what you asked for.".to_string(),
                fallback_path: "no_action",
            },
            _ => GuardrailDecision::Allow,
        }
    }
}

fn is_mass_selector(target: Option<&str>) -> bool {
    target.is_some_and(|target| {
        let target = target.trim();
        target.starts_with("@a") || target.starts_with("@e")
    })
}
