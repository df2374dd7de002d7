use std::fmt;

use serde::{Deserialize, Serialize};

/// Fully substituted command text. Never fed back into the resolver.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Command(String);

impl Command {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CommandPlan {
    Single { command: Command },
    Batch { commands: Vec<Command> },
    LocateThenTravel { plan: LocatePlan },
}

impl CommandPlan {
    /// Commands ready for validation now. A locate plan has none until the
    /// caller feeds back the locate output.
    pub fn commands(&self) -> &[Command] {
        match self {
            Self::Single { command } => std::slice::from_ref(command),
            Self::Batch { commands } => commands,
            Self::LocateThenTravel { .. } => &[],
        }
    }
}

/// Deferred travel to a named structure: run `locate_command`, then turn its
/// output into a concrete teleport with [`LocatePlan::travel_command`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocatePlan {
    pub target: String,
    pub structure: String,
    pub locate_command: Command,
}

impl LocatePlan {
    pub fn new(target: impl Into<String>, structure: impl Into<String>) -> Self {
        let structure = structure.into();
        let locate_command = Command::new(format!("locate structure minecraft:{structure}"));
        Self { target: target.into(), structure, locate_command }
    }

    pub fn travel_command(&self, locate_output: &str) -> Option<Command> {
        let (x, y, z) = first_coordinate_triple(locate_output)?;
        Some(Command::new(format!("tp {} {x} {y} {z}", self.target)))
    }
}

/// Finds the first `x y z` run in free text. Brackets and commas are treated
/// as separators and the vertical coordinate may be `~`.
fn first_coordinate_triple(text: &str) -> Option<(String, String, String)> {
    let cleaned: String = text
        .chars()
        .map(|ch| if matches!(ch, '[' | ']' | ',' | '(' | ')') { ' ' } else { ch })
        .collect();
    let tokens: Vec<&str> = cleaned.split_whitespace().collect();

    tokens.windows(3).find_map(|window| {
        let [x, y, z] = window else {
            return None;
        };
        let vertical_ok = *y == "~" || y.parse::<i64>().is_ok();
        if x.parse::<i64>().is_ok() && vertical_ok && z.parse::<i64>().is_ok() {
            Some((x.to_string(), y.to_string(), z.to_string()))
        } else {
            None
        }
    })
}
