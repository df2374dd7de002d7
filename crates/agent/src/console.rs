//! Server console lines and the live world roster they maintain.

use std::sync::RwLock;

use warden_core::domain::world::{WorldContext, WorldContextProvider};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConsoleEvent {
    Chat { actor: String, message: String },
    Joined { actor: String },
    Left { actor: String },
}

/// Accepts a raw log line, with or without the `[time] [thread/LEVEL]: `
/// prefix. Anything that is not chat or a roster change is `None`.
pub fn parse_line(line: &str) -> Option<ConsoleEvent> {
    let body = strip_log_prefix(line).trim();

    if let Some(rest) = body.strip_prefix('<') {
        let (actor, message) = rest.split_once('>')?;
        let actor = actor.trim();
        let message = message.trim();
        if !is_player_name(actor) || message.is_empty() {
            return None;
        }
        return Some(ConsoleEvent::Chat { actor: actor.to_string(), message: message.to_string() });
    }

    if let Some(actor) = body.strip_suffix(" joined the game") {
        return is_player_name(actor).then(|| ConsoleEvent::Joined { actor: actor.to_string() });
    }
    if let Some(actor) = body.strip_suffix(" left the game") {
        return is_player_name(actor).then(|| ConsoleEvent::Left { actor: actor.to_string() });
    }
    None
}

/// Only the leading prefix is removed; the first `]: ` ends it. Later
/// occurrences belong to the chat text.
fn strip_log_prefix(line: &str) -> &str {
    let trimmed = line.trim_start();
    if !trimmed.starts_with('[') {
        return trimmed;
    }
    match trimmed.find("]: ") {
        Some(at) => &trimmed[at + 3..],
        None => trimmed,
    }
}

fn is_player_name(name: &str) -> bool {
    (1..=16).contains(&name.len()) && name.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
}

/// World context fed by console events.
#[derive(Debug, Default)]
pub struct LiveWorld {
    state: RwLock<WorldContext>,
}

impl LiveWorld {
    pub fn new(initial: WorldContext) -> Self {
        Self { state: RwLock::new(initial) }
    }

    pub fn observe(&self, event: &ConsoleEvent) {
        match event {
            ConsoleEvent::Joined { actor } => self.update(|world| {
                if !world.online.iter().any(|name| name.eq_ignore_ascii_case(actor)) {
                    world.online.push(actor.clone());
                }
            }),
            ConsoleEvent::Left { actor } => {
                self.update(|world| world.online.retain(|name| !name.eq_ignore_ascii_case(actor)))
            }
            ConsoleEvent::Chat { .. } => {}
        }
    }

    pub fn set_weather(&self, weather: impl Into<String>) {
        let weather = weather.into();
        self.update(|world| world.weather = Some(weather));
    }

    pub fn set_time_of_day(&self, time: impl Into<String>) {
        let time = time.into();
        self.update(|world| world.time_of_day = Some(time));
    }

    fn update(&self, apply: impl FnOnce(&mut WorldContext)) {
        match self.state.write() {
            Ok(mut world) => apply(&mut *world),
            Err(poisoned) => apply(&mut *poisoned.into_inner()),
        }
    }
}

impl WorldContextProvider for LiveWorld {
    fn snapshot(&self) -> WorldContext {
        match self.state.read() {
            Ok(world) => world.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}
