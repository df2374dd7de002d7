//! Last line of defence before anything reaches the game server.
//!
//! [`Validator`] is a pure classifier over command text. [`Simulator`] adds a
//! structural dry run and remembers its recent verdicts for operators.

use std::collections::VecDeque;
use std::sync::Mutex;

use regex::{Regex, RegexBuilder};
use serde::Serialize;

use crate::domain::actor::ActorId;
use crate::domain::command::Command;

pub const SIMULATION_LOG_CAPACITY: usize = 100;

const DANGEROUS_PATTERNS: &[(&str, &str)] = &[
    (r";", "statement separator"),
    (r"&&|\|\|", "shell operator"),
    (r"\|", "pipe operator"),
    (r"`", "backtick"),
    (r"\$", "variable expansion"),
    (r"[\x00-\x1f\x7f]", "control character"),
    (r"[()]", "parentheses"),
    (r"\b(?:op|deop)\b", "operator status change"),
    (r"\bsudo\b", "privilege escalation"),
    (r"\bexecute\b", "execute indirection"),
    (r"\btellraw\s+@a\b", "broadcast to everyone"),
    (r"\bbroadcast\b", "broadcast to everyone"),
    (r"\bwhitelist\s+off\b", "whitelist disabled"),
    (r"\bplugman\b", "plugin management"),
    (r"\bmultiverse\b", "world management"),
    (r"\bworldedit\b", "world editing"),
    (r"^\s*/?/?we\b", "world editing"),
    (r"^\s*/?(?:stop|restart|reload)\s*$", "server lifecycle"),
];

const BLACKLISTED_PREFIXES: &[&str] = &[
    "stop",
    "restart",
    "reload",
    "op ",
    "deop ",
    "whitelist off",
    "execute as",
    "sudo ",
    "console ",
    "plugman",
    "multiverse",
    "mv ",
    "worldedit",
    "we ",
    "//",
];

const KNOWN_COMMANDS: &[&str] = &[
    "time", "weather", "give", "summon", "tp", "teleport", "gamemode", "effect", "kill",
    "save-all", "ability", "xp", "enchant", "locate", "say", "tell", "msg", "clear",
];

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ValidationVerdict {
    pub ok: bool,
    pub reason: String,
}

impl ValidationVerdict {
    fn accept() -> Self {
        Self { ok: true, reason: "ok".to_string() }
    }

    fn reject(reason: impl Into<String>) -> Self {
        Self { ok: false, reason: reason.into() }
    }
}

/// A command that passed [`Validator::check`]. Only the validator can build
/// one, so holding it proves validation happened.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidatedCommand(Command);

impl ValidatedCommand {
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn command(&self) -> &Command {
        &self.0
    }
}

#[derive(Debug)]
pub struct Validator {
    patterns: Vec<(Regex, &'static str)>,
}

impl Validator {
    pub fn new() -> Result<Self, regex::Error> {
        let patterns = DANGEROUS_PATTERNS
            .iter()
            .map(|(pattern, label)| {
                RegexBuilder::new(pattern).case_insensitive(true).build().map(|re| (re, *label))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    pub fn validate(&self, text: &str) -> ValidationVerdict {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return ValidationVerdict::reject("empty command");
        }

        if let Some((_, label)) = self.patterns.iter().find(|(re, _)| re.is_match(text)) {
            return ValidationVerdict::reject(format!("dangerous pattern: {label}"));
        }

        let lowered = trimmed.to_lowercase();
        let head = lowered.strip_prefix('/').unwrap_or(&lowered);
        if let Some(prefix) = BLACKLISTED_PREFIXES
            .iter()
            .find(|prefix| head.starts_with(**prefix) || lowered.starts_with(**prefix))
        {
            return ValidationVerdict::reject(format!("blacklisted prefix `{}`", prefix.trim()));
        }

        ValidationVerdict::accept()
    }

    /// Validates and, on success, wraps the command as proof.
    pub fn check(&self, command: &Command) -> Result<ValidatedCommand, ValidationVerdict> {
        let verdict = self.validate(command.as_str());
        if verdict.ok {
            Ok(ValidatedCommand(Command::new(command.as_str().trim())))
        } else {
            Err(verdict)
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SimulationRecord {
    pub actor: ActorId,
    pub command: String,
    pub verdict: ValidationVerdict,
}

/// Dry-run checker: validation plus a known-command and bracket check. No
/// side effects beyond its own bounded log.
#[derive(Debug)]
pub struct Simulator {
    validator: Validator,
    log: Mutex<VecDeque<SimulationRecord>>,
}

impl Simulator {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            validator: Validator::new()?,
            log: Mutex::new(VecDeque::with_capacity(SIMULATION_LOG_CAPACITY)),
        })
    }

    pub fn validator(&self) -> &Validator {
        &self.validator
    }

    pub fn simulate(&self, text: &str, actor: &ActorId) -> ValidationVerdict {
        let verdict = self.validator.validate(text);
        let verdict = if verdict.ok { structural_check(text) } else { verdict };

        let mut log = match self.log.lock() {
            Ok(log) => log,
            Err(poisoned) => poisoned.into_inner(),
        };
        while log.len() >= SIMULATION_LOG_CAPACITY {
            log.pop_front();
        }
        log.push_back(SimulationRecord {
            actor: actor.clone(),
            command: text.trim().to_string(),
            verdict: verdict.clone(),
        });
        verdict
    }

    pub fn recent(&self) -> Vec<SimulationRecord> {
        match self.log.lock() {
            Ok(log) => log.iter().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().iter().cloned().collect(),
        }
    }
}

fn structural_check(text: &str) -> ValidationVerdict {
    let trimmed = text.trim();
    let head = trimmed.trim_start_matches('/').split_whitespace().next().unwrap_or_default();
    let lowered = head.to_ascii_lowercase();
    let base = lowered.strip_prefix("minecraft:").unwrap_or(&lowered);
    if !KNOWN_COMMANDS.contains(&base) {
        return ValidationVerdict::reject(format!("unknown command `{base}`"));
    }

    let mut stack = Vec::new();
    for ch in trimmed.chars() {
        match ch {
            '[' | '{' => stack.push(ch),
            ']' | '}' => {
                let expected = if ch == ']' { '[' } else { '{' };
                if stack.pop() != Some(expected) {
                    return ValidationVerdict::reject("unbalanced brackets");
                }
            }
            _ => {}
        }
    }
    if !stack.is_empty() {
        return ValidationVerdict::reject("unbalanced brackets");
    }

    ValidationVerdict::accept()
}

#[cfg(test)]
mod tests {
    use super::{Simulator, Validator, SIMULATION_LOG_CAPACITY};
    use crate::commands::templates::{Field, FieldValues, TEMPLATES};
    use crate::domain::actor::ActorId;
    use crate::domain::command::{Command, LocatePlan};

    fn validator() -> Validator {
        Validator::new().expect("patterns compile")
    }

    #[test]
    fn dangerous_text_is_rejected_regardless_of_case_and_padding() {
        let validator = validator();
        let samples = [
            "give Steve dirt; stop",
            "say hi && rm",
            "say a || b",
            "say `id`",
            "say $HOME",
            "say (nested (parens))",
            "op Steve",
            "  DEOP   Alex",
            "/sudo Steve",
            "execute as @a run kill @s",
            "tellraw @a hello",
            "broadcast hello",
            "whitelist off",
            "plugman unload Essentials",
            "mv create world2",
            "multiverse delete",
            "//set stone",
            "we wand",
            "  STOP  ",
            "Restart",
            "reload",
            "say line\u{7}bell",
        ];
        for sample in samples {
            for variant in [sample.to_string(), sample.to_uppercase(), format!("  {sample}\t")] {
                let verdict = validator.validate(&variant);
                assert!(!verdict.ok, "expected rejection for {variant:?}");
                assert!(!verdict.reason.is_empty());
            }
        }
    }

    #[test]
    fn empty_and_whitespace_are_rejected() {
        let validator = validator();
        assert_eq!(validator.validate("").reason, "empty command");
        assert!(!validator.validate(" \t ").ok);
    }

    #[test]
    fn ordinary_commands_are_accepted() {
        let validator = validator();
        for text in ["give Steve diamond 1", "time set 1000", "tp Alex 100 ~ 200", "weather clear"] {
            assert!(validator.validate(text).ok, "expected acceptance for {text}");
        }
        assert!(validator.validate("say we are open").ok);
    }

    #[test]
    fn validated_command_only_comes_from_check() {
        let validator = validator();
        let ok = validator.check(&Command::new(" save-all ")).expect("valid");
        assert_eq!(ok.as_str(), "save-all");
        assert!(validator.check(&Command::new("op Steve")).is_err());
    }

    fn sample_values() -> FieldValues {
        [
            (Field::Target, "Steve"),
            (Field::Item, "diamond"),
            (Field::Amount, "4"),
            (Field::Entity, "zombie"),
            (Field::Value, "13000"),
            (Field::Weather, "thunder"),
            (Field::Mode, "creative"),
            (Field::Destination, "100 ~ 200"),
            (Field::Enable, "true"),
            (Field::Effect, "speed"),
            (Field::Duration, "30"),
            (Field::Amplifier, "1"),
            (Field::Enchantment, "sharpness"),
            (Field::Level, "5"),
        ]
        .into_iter()
        .map(|(field, value)| (field, value.to_string()))
        .collect()
    }

    #[test]
    fn every_template_renders_text_the_validator_and_simulator_accept() {
        let validator = validator();
        let simulator = Simulator::new().expect("patterns compile");
        let actor = ActorId::new("Steve");
        let values = sample_values();

        for template in TEMPLATES {
            let command = template.render(&values).expect("template renders");
            let verdict = validator.validate(command.as_str());
            assert!(verdict.ok, "{} rejected: {}", command, verdict.reason);
            let simulated = simulator.simulate(command.as_str(), &actor);
            assert!(simulated.ok, "{} failed simulation: {}", command, simulated.reason);
        }

        let locate = LocatePlan::new("Steve", "village");
        assert!(validator.validate(locate.locate_command.as_str()).ok);
        let travel = locate.travel_command("at [120, ~, -340]").expect("coordinates");
        assert!(validator.validate(travel.as_str()).ok);
    }

    #[test]
    fn simulation_checks_known_commands_and_brackets() {
        let simulator = Simulator::new().expect("patterns compile");
        let actor = ActorId::new("Steve");
        assert!(simulator.simulate("minecraft:give Steve dirt", &actor).ok);
        assert!(!simulator.simulate("fly Steve", &actor).ok);
        assert!(!simulator.simulate("give Steve diamond_sword{Enchantments:[", &actor).ok);
        assert!(simulator.simulate("give Steve diamond_sword{Unbreakable:1b}", &actor).ok);
        assert!(!simulator.simulate("stop", &actor).ok);
    }

    #[test]
    fn simulation_log_is_bounded() {
        let simulator = Simulator::new().expect("patterns compile");
        let actor = ActorId::new("Steve");
        for step in 0..(SIMULATION_LOG_CAPACITY + 5) {
            simulator.simulate(&format!("xp add Steve {step}"), &actor);
        }
        let recent = simulator.recent();
        assert_eq!(recent.len(), SIMULATION_LOG_CAPACITY);
        assert_eq!(recent[0].command, "xp add Steve 5");
    }
}
