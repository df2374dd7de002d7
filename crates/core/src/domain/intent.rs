use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    SetTime,
    SetWeather,
    GiveItem,
    GiveMulti,
    Summon,
    SummonMulti,
    Teleport,
    Gamemode,
    Heal,
    Feed,
    GodMode,
    Kill,
    Save,
    Fly,
    Xp,
    Effect,
    Enchant,
    Scan,
    #[serde(rename = "none")]
    NoIntent,
    Error,
}

impl IntentKind {
    pub const ALL: [IntentKind; 20] = [
        IntentKind::SetTime,
        IntentKind::SetWeather,
        IntentKind::GiveItem,
        IntentKind::GiveMulti,
        IntentKind::Summon,
        IntentKind::SummonMulti,
        IntentKind::Teleport,
        IntentKind::Gamemode,
        IntentKind::Heal,
        IntentKind::Feed,
        IntentKind::GodMode,
        IntentKind::Kill,
        IntentKind::Save,
        IntentKind::Fly,
        IntentKind::Xp,
        IntentKind::Effect,
        IntentKind::Enchant,
        IntentKind::Scan,
        IntentKind::NoIntent,
        IntentKind::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SetTime => "set_time",
            Self::SetWeather => "set_weather",
            Self::GiveItem => "give_item",
            Self::GiveMulti => "give_multi",
            Self::Summon => "summon",
            Self::SummonMulti => "summon_multi",
            Self::Teleport => "teleport",
            Self::Gamemode => "gamemode",
            Self::Heal => "heal",
            Self::Feed => "feed",
            Self::GodMode => "god_mode",
            Self::Kill => "kill",
            Self::Save => "save",
            Self::Fly => "fly",
            Self::Xp => "xp",
            Self::Effect => "effect",
            Self::Enchant => "enchant",
            Self::Scan => "scan",
            Self::NoIntent => "none",
            Self::Error => "error",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|kind| kind.as_str() == normalized)
    }

    /// Kinds that can turn into commands. `scan` is answered from world state.
    pub fn produces_commands(self) -> bool {
        !matches!(self, Self::Scan | Self::NoIntent | Self::Error)
    }
}

impl fmt::Display for IntentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemStack {
    pub item: Option<String>,
    pub amount: Option<u32>,
}

impl ItemStack {
    pub fn new(item: impl Into<String>, amount: u32) -> Self {
        Self { item: Some(item.into()), amount: Some(amount) }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityBatch {
    pub entity: Option<String>,
    pub amount: Option<u32>,
}

impl EntityBatch {
    pub fn new(entity: impl Into<String>, amount: u32) -> Self {
        Self { entity: Some(entity.into()), amount: Some(amount) }
    }
}

/// One variant per intent kind, each with the parameters its template needs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "intent", content = "parameters", rename_all = "snake_case")]
pub enum IntentAction {
    SetTime { value: String },
    SetWeather { weather: String },
    GiveItem { target: Option<String>, item: String, amount: u32 },
    GiveMulti { target: Option<String>, items: Vec<ItemStack> },
    Summon { entity: String, amount: u32 },
    SummonMulti { entities: Vec<EntityBatch> },
    Teleport { target: Option<String>, destination: Option<String> },
    Gamemode { target: Option<String>, mode: String },
    Heal { target: Option<String> },
    Feed { target: Option<String> },
    GodMode { target: Option<String> },
    Kill { target: Option<String> },
    Save,
    Fly { target: Option<String>, enable: bool },
    Xp { target: Option<String>, amount: u32 },
    Effect { target: Option<String>, effect: String, duration: u32, amplifier: u8 },
    Enchant { target: Option<String>, enchantment: String, level: u8 },
    Scan,
    #[serde(rename = "none")]
    NoIntent,
    Error { reason: String },
}

impl IntentAction {
    pub fn kind(&self) -> IntentKind {
        match self {
            Self::SetTime { .. } => IntentKind::SetTime,
            Self::SetWeather { .. } => IntentKind::SetWeather,
            Self::GiveItem { .. } => IntentKind::GiveItem,
            Self::GiveMulti { .. } => IntentKind::GiveMulti,
            Self::Summon { .. } => IntentKind::Summon,
            Self::SummonMulti { .. } => IntentKind::SummonMulti,
            Self::Teleport { .. } => IntentKind::Teleport,
            Self::Gamemode { .. } => IntentKind::Gamemode,
            Self::Heal { .. } => IntentKind::Heal,
            Self::Feed { .. } => IntentKind::Feed,
            Self::GodMode { .. } => IntentKind::GodMode,
            Self::Kill { .. } => IntentKind::Kill,
            Self::Save => IntentKind::Save,
            Self::Fly { .. } => IntentKind::Fly,
            Self::Xp { .. } => IntentKind::Xp,
            Self::Effect { .. } => IntentKind::Effect,
            Self::Enchant { .. } => IntentKind::Enchant,
            Self::Scan => IntentKind::Scan,
            Self::NoIntent => IntentKind::NoIntent,
            Self::Error { .. } => IntentKind::Error,
        }
    }

    fn target_slot(&mut self) -> Option<&mut Option<String>> {
        match self {
            Self::GiveItem { target, .. }
            | Self::GiveMulti { target, .. }
            | Self::Teleport { target, .. }
            | Self::Gamemode { target, .. }
            | Self::Heal { target }
            | Self::Feed { target }
            | Self::GodMode { target }
            | Self::Kill { target }
            | Self::Fly { target, .. }
            | Self::Xp { target, .. }
            | Self::Effect { target, .. }
            | Self::Enchant { target, .. } => Some(target),
            _ => None,
        }
    }

    pub fn target(&self) -> Option<&str> {
        match self {
            Self::GiveItem { target, .. }
            | Self::GiveMulti { target, .. }
            | Self::Teleport { target, .. }
            | Self::Gamemode { target, .. }
            | Self::Heal { target }
            | Self::Feed { target }
            | Self::GodMode { target }
            | Self::Kill { target }
            | Self::Fly { target, .. }
            | Self::Xp { target, .. }
            | Self::Effect { target, .. }
            | Self::Enchant { target, .. } => target.as_deref(),
            _ => None,
        }
    }

    /// Fills a missing target with `actor`. Destructive kinds keep their
    /// target untouched: an absent victim stays absent and fails synthesis.
    pub fn with_default_target(mut self, actor: &str) -> Self {
        if matches!(self, Self::Kill { .. }) {
            return self;
        }
        if let Some(slot) = self.target_slot() {
            if slot.as_deref().map(str::trim).unwrap_or_default().is_empty() {
                *slot = Some(actor.to_string());
            }
        }
        self
    }

    /// The object a follow-up "more" or "again" should point at.
    pub fn reference(&self) -> Option<String> {
        match self {
            Self::GiveItem { item, .. } => Some(item.clone()),
            Self::GiveMulti { items, .. } => items.iter().rev().find_map(|stack| stack.item.clone()),
            Self::Summon { entity, .. } => Some(entity.clone()),
            Self::SummonMulti { entities } => {
                entities.iter().rev().find_map(|batch| batch.entity.clone())
            }
            Self::Teleport { destination, .. } => destination.clone(),
            _ => None,
        }
    }
}

/// Certainty in `[0, 1]`, attached once by the resolver stage that produced
/// the intent.
#[derive(Clone, Copy, Debug, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Confidence(f32);

impl Confidence {
    pub const ZERO: Confidence = Confidence(0.0);

    pub fn new(value: f32) -> Self {
        if value.is_nan() {
            return Self::ZERO;
        }
        Self(value.clamp(0.0, 1.0))
    }

    pub fn value(self) -> f32 {
        self.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentSource {
    Pattern,
    Resolver,
    Model,
}

impl IntentSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pattern => "pattern",
            Self::Resolver => "resolver",
            Self::Model => "model",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Intent {
    pub action: IntentAction,
    pub confidence: Confidence,
    pub source: IntentSource,
    pub raw_text: String,
}

impl Intent {
    pub fn new(
        action: IntentAction,
        confidence: f32,
        source: IntentSource,
        raw_text: impl Into<String>,
    ) -> Self {
        Self { action, confidence: Confidence::new(confidence), source, raw_text: raw_text.into() }
    }

    pub fn none(source: IntentSource, raw_text: impl Into<String>) -> Self {
        Self::new(IntentAction::NoIntent, 0.0, source, raw_text)
    }

    pub fn error(reason: impl Into<String>, raw_text: impl Into<String>) -> Self {
        Self::new(IntentAction::Error { reason: reason.into() }, 0.0, IntentSource::Model, raw_text)
    }

    pub fn kind(&self) -> IntentKind {
        self.action.kind()
    }
}
