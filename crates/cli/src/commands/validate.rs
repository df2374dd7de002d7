use warden_core::domain::actor::ActorId;
use warden_core::validation::{Simulator, ValidationVerdict};

use crate::commands::CommandResult;

const CONSOLE_ACTOR: &str = "console";

pub fn run(command: &str, simulate: bool) -> CommandResult {
    let simulator = match Simulator::new() {
        Ok(simulator) => simulator,
        Err(error) => {
            return CommandResult::failure(
                "validate",
                "pattern_tables",
                format!("dangerous-pattern table failed to compile: {error}"),
                2,
            );
        }
    };

    let verdict = verdict_for(&simulator, command, simulate);
    if verdict.ok {
        let stage = if simulate { "simulation" } else { "validation" };
        CommandResult::success_with("validate", format!("command passed {stage}"), &verdict)
    } else {
        CommandResult::failure("validate", "rejected", verdict.reason, 1)
    }
}

fn verdict_for(simulator: &Simulator, command: &str, simulate: bool) -> ValidationVerdict {
    if simulate {
        simulator.simulate(command, &ActorId::new(CONSOLE_ACTOR))
    } else {
        simulator.validator().validate(command)
    }
}
