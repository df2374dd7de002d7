//! Model fallback: the whole message goes to the language model, and the
//! first well-formed JSON object or array in its reply becomes intents.

use std::sync::Arc;

use serde_json::{Map, Value};
use warden_core::commands::destination::normalize_coordinates;
use warden_core::domain::actor::Actor;
use warden_core::domain::intent::{
    EntityBatch, Intent, IntentAction, IntentKind, IntentSource, ItemStack,
};
use warden_core::domain::world::WorldContext;

use crate::acquisition::QuantityPolicy;
use crate::llm::LlmClient;

pub const INTENT_SYSTEM_PROMPT: &str = r#"You turn Minecraft chat into server intents.
Answer with JSON only: one object, or an array of objects when the player asks for several things.
Each object has "intent", "parameters" and "confidence" (0.0 to 1.0).

Supported intents and parameters:
- set_time: value (day, noon, sunset, night or ticks 0-24000)
- set_weather: weather (clear, rain, thunder)
- give_item: target, item, amount
- give_multi: target, items [{item, amount}]
- summon: entity, amount
- summon_multi: entities [{entity, amount}]
- teleport: target, destination (player name, "x y z" or structure such as village)
- gamemode: target, mode (creative, survival, adventure, spectator)
- heal, feed, god_mode, kill: target
- save: no parameters
- fly: target, enable (true or false)
- xp: target, amount
- effect: target, effect, duration (seconds), amplifier
- enchant: target, enchantment, level
- scan: no parameters (the player wants to know what is around)
- none: the message is conversation, not a request

Use Minecraft identifiers for items and entities (diamond_sword, zombie).
Examples:
"give me 1 diamond and 4 obsidian" -> {"intent": "give_multi", "parameters": {"target": "Steve", "items": [{"item": "diamond", "amount": 1}, {"item": "obsidian", "amount": 4}]}, "confidence": 0.9}
"give me 64 dirt and tp me to village" -> [{"intent": "give_item", "parameters": {"target": "Steve", "item": "dirt", "amount": 64}, "confidence": 0.9}, {"intent": "teleport", "parameters": {"target": "Steve", "destination": "village"}, "confidence": 0.9}]
"how are you" -> {"intent": "none", "confidence": 0.0}"#;

pub struct ModelFallback {
    llm: Arc<dyn LlmClient>,
    temperature: f32,
    quantities: QuantityPolicy,
}

impl ModelFallback {
    pub fn new(llm: Arc<dyn LlmClient>, temperature: f32, quantities: QuantityPolicy) -> Self {
        Self { llm, temperature, quantities }
    }

    pub async fn resolve(&self, text: &str, actor: &Actor, world: &WorldContext) -> Vec<Intent> {
        let user = format!(
            "Player: {}\nRole: {}\nLast target: {}\nMessage: {text}\nServer context: {}",
            actor.id,
            actor.role,
            actor.last_target.as_deref().unwrap_or("none"),
            world.describe()
        );

        match self.llm.complete(INTENT_SYSTEM_PROMPT, &user, self.temperature).await {
            Ok(reply) => {
                let intents = parse_reply(&reply, text, &self.quantities);
                tracing::debug!(
                    event_name = "pipeline.resolver.model_parsed",
                    actor = %actor.id,
                    intents = intents.len(),
                    "model reply parsed"
                );
                intents
            }
            Err(error) => {
                tracing::warn!(
                    event_name = "pipeline.resolver.model_failed",
                    actor = %actor.id,
                    error = %error,
                    "model fallback failed"
                );
                vec![Intent::error(error.to_string(), text)]
            }
        }
    }
}

/// Never returns an empty list: a reply without usable JSON is one `error`
/// intent and an empty array is one `none` intent.
pub fn parse_reply(reply: &str, raw_text: &str, quantities: &QuantityPolicy) -> Vec<Intent> {
    let Some(value) = first_json(reply) else {
        return vec![Intent::error("model reply contained no JSON intent", raw_text)];
    };

    let elements = match value {
        Value::Array(elements) => elements,
        Value::Object(mut map) => {
            let wrapper = map.get("intent").and_then(Value::as_str) == Some("multi");
            match map.remove("commands") {
                Some(Value::Array(commands)) if wrapper => commands,
                Some(other) => {
                    map.insert("commands".to_string(), other);
                    vec![Value::Object(map)]
                }
                None => vec![Value::Object(map)],
            }
        }
        _ => Vec::new(),
    };
    if elements.is_empty() {
        return vec![Intent::none(IntentSource::Model, raw_text)];
    }

    elements.iter().map(|element| intent_from_value(element, raw_text, quantities)).collect()
}

fn first_json(text: &str) -> Option<Value> {
    text.char_indices().filter(|(_, ch)| matches!(ch, '{' | '[')).find_map(|(at, _)| {
        let mut stream = serde_json::Deserializer::from_str(&text[at..]).into_iter::<Value>();
        match stream.next() {
            Some(Ok(value)) if looks_like_intents(&value) => Some(value),
            _ => None,
        }
    })
}

fn looks_like_intents(value: &Value) -> bool {
    match value {
        Value::Object(_) => true,
        Value::Array(elements) => elements.iter().all(Value::is_object),
        _ => false,
    }
}

fn intent_from_value(value: &Value, raw_text: &str, quantities: &QuantityPolicy) -> Intent {
    let Some(map) = value.as_object() else {
        return Intent::error("model intent is not a JSON object", raw_text);
    };
    let Some(name) = map.get("intent").and_then(Value::as_str) else {
        return Intent::error("model intent has no `intent` field", raw_text);
    };
    let Some(kind) = IntentKind::parse(name) else {
        return Intent::error(format!("unsupported intent kind `{name}`"), raw_text);
    };

    let confidence = map.get("confidence").and_then(Value::as_f64).unwrap_or(0.0) as f32;
    let params = map.get("parameters").and_then(Value::as_object).unwrap_or(map);

    match action_for(kind, params, quantities) {
        Ok(IntentAction::NoIntent) => Intent::none(IntentSource::Model, raw_text),
        Ok(IntentAction::Error { reason }) => Intent::error(reason, raw_text),
        Ok(action) => Intent::new(action, confidence, IntentSource::Model, raw_text),
        Err(reason) => Intent::error(reason, raw_text),
    }
}

fn action_for(
    kind: IntentKind,
    params: &Map<String, Value>,
    quantities: &QuantityPolicy,
) -> Result<IntentAction, String> {
    let target = text(params, &["target", "player"]);
    let action = match kind {
        IntentKind::SetTime => {
            IntentAction::SetTime { value: required(kind, "value", text(params, &["value", "time"]))? }
        }
        IntentKind::SetWeather => IntentAction::SetWeather {
            weather: required(kind, "weather", text(params, &["weather", "type", "value"]))?,
        },
        IntentKind::GiveItem | IntentKind::GiveMulti => {
            match params.get("items").and_then(Value::as_array) {
                Some(items) => IntentAction::GiveMulti {
                    target,
                    items: items
                        .iter()
                        .map(|item| stack(item, quantities.max_give))
                        .collect::<Result<_, _>>()?,
                },
                None if kind == IntentKind::GiveMulti => {
                    return Err("`give_multi` requires `items`".to_string())
                }
                None => IntentAction::GiveItem {
                    target,
                    item: required(kind, "item", text(params, &["item"]))?,
                    amount: capped(count(params, "amount")?, quantities.max_give),
                },
            }
        }
        IntentKind::Summon | IntentKind::SummonMulti => {
            match params.get("entities").and_then(Value::as_array) {
                Some(entities) => IntentAction::SummonMulti {
                    entities: entities
                        .iter()
                        .map(|entity| batch(entity, quantities.max_summon))
                        .collect::<Result<_, _>>()?,
                },
                None if kind == IntentKind::SummonMulti => {
                    return Err("`summon_multi` requires `entities`".to_string())
                }
                None => IntentAction::Summon {
                    entity: required(kind, "entity", text(params, &["entity", "mob"]))?,
                    amount: capped(count(params, "amount")?, quantities.max_summon),
                },
            }
        }
        IntentKind::Teleport => {
            let destination = text(params, &["destination", "location"])
                .or_else(|| coordinate_fields(params))
                .map(|phrase| normalize_coordinates(&phrase).unwrap_or(phrase));
            IntentAction::Teleport { target, destination }
        }
        IntentKind::Gamemode => {
            IntentAction::Gamemode { target, mode: required(kind, "mode", text(params, &["mode"]))? }
        }
        IntentKind::Heal => IntentAction::Heal { target },
        IntentKind::Feed => IntentAction::Feed { target },
        IntentKind::GodMode => IntentAction::GodMode { target },
        IntentKind::Kill => IntentAction::Kill { target },
        IntentKind::Save => IntentAction::Save,
        IntentKind::Fly => IntentAction::Fly {
            target,
            enable: flag(params, &["enable", "enabled"])?.unwrap_or(true),
        },
        IntentKind::Xp => IntentAction::Xp {
            target,
            amount: count(params, "amount")?.ok_or_else(|| "`xp` requires `amount`".to_string())?,
        },
        IntentKind::Effect => IntentAction::Effect {
            target,
            effect: required(kind, "effect", text(params, &["effect"]))?,
            duration: count(params, "duration")?.unwrap_or(30),
            amplifier: small(count(params, "amplifier")?.unwrap_or(0)),
        },
        IntentKind::Enchant => IntentAction::Enchant {
            target,
            enchantment: required(kind, "enchantment", text(params, &["enchantment"]))?,
            level: small(count(params, "level")?.unwrap_or(1)),
        },
        IntentKind::Scan => IntentAction::Scan,
        IntentKind::NoIntent => IntentAction::NoIntent,
        IntentKind::Error => IntentAction::Error {
            reason: text(params, &["reason", "message"])
                .unwrap_or_else(|| "model reported an error".to_string()),
        },
    };
    Ok(action)
}

fn stack(value: &Value, cap: u32) -> Result<ItemStack, String> {
    match value {
        Value::String(item) => Ok(ItemStack::new(item.trim(), 1)),
        Value::Object(map) => Ok(ItemStack {
            item: text(map, &["item", "id"]),
            amount: Some(capped(count(map, "amount")?, cap)),
        }),
        _ => Err("`items` entries must be objects".to_string()),
    }
}

fn batch(value: &Value, cap: u32) -> Result<EntityBatch, String> {
    match value {
        Value::String(entity) => Ok(EntityBatch::new(entity.trim(), 1)),
        Value::Object(map) => Ok(EntityBatch {
            entity: text(map, &["entity", "mob"]),
            amount: Some(capped(count(map, "amount")?, cap)),
        }),
        _ => Err("`entities` entries must be objects".to_string()),
    }
}

fn text(params: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match params.get(*key)? {
        Value::String(value) if !value.trim().is_empty() => Some(value.trim().to_string()),
        Value::Number(value) => Some(value.to_string()),
        _ => None,
    })
}

fn count(params: &Map<String, Value>, key: &str) -> Result<Option<u32>, String> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(number)) => number
            .as_u64()
            .map(|value| Some(u32::try_from(value).unwrap_or(u32::MAX)))
            .ok_or_else(|| format!("`{key}` must be a non-negative integer")),
        Some(Value::String(value)) => value
            .trim()
            .parse::<u32>()
            .map(Some)
            .map_err(|_| format!("`{key}` must be a non-negative integer")),
        Some(_) => Err(format!("`{key}` must be a non-negative integer")),
    }
}

fn flag(params: &Map<String, Value>, keys: &[&str]) -> Result<Option<bool>, String> {
    for key in keys {
        match params.get(*key) {
            None | Some(Value::Null) => continue,
            Some(Value::Bool(value)) => return Ok(Some(*value)),
            Some(Value::String(value)) => {
                return match value.trim().to_ascii_lowercase().as_str() {
                    "true" | "on" | "yes" => Ok(Some(true)),
                    "false" | "off" | "no" => Ok(Some(false)),
                    _ => Err(format!("`{key}` must be a boolean")),
                }
            }
            Some(_) => return Err(format!("`{key}` must be a boolean")),
        }
    }
    Ok(None)
}

fn coordinate_fields(params: &Map<String, Value>) -> Option<String> {
    let x = text(params, &["x"])?;
    let z = text(params, &["z"])?;
    let y = text(params, &["y"]).unwrap_or_else(|| "~".to_string());
    Some(format!("{x} {y} {z}"))
}

fn required(kind: IntentKind, field: &str, value: Option<String>) -> Result<String, String> {
    value.ok_or_else(|| format!("`{kind}` requires `{field}`"))
}

fn capped(amount: Option<u32>, cap: u32) -> u32 {
    amount.unwrap_or(1).clamp(1, cap.max(1))
}

fn small(value: u32) -> u8 {
    u8::try_from(value).unwrap_or(u8::MAX)
}
