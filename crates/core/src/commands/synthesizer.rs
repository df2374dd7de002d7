use crate::catalog::{normalize_identifier, StructureTable};
use crate::commands::destination::Destination;
use crate::commands::templates::{template_for, Arity, CommandTemplate, Field, FieldValues};
use crate::commands::vocabulary::{gamemode_token, time_ticks, weather_token};
use crate::commands::SynthesisError;
use crate::domain::command::{Command, CommandPlan, LocatePlan};
use crate::domain::intent::{IntentAction, IntentKind};

/// Upper bound on copies produced by a repeated template.
pub const MAX_REPEAT: u32 = 64;

#[derive(Clone, Debug, Default)]
pub struct CommandSynthesizer {
    structures: StructureTable,
}

impl CommandSynthesizer {
    pub fn new(structures: StructureTable) -> Self {
        Self { structures }
    }

    /// Turns an intent into a plan. `Ok(None)` means there is nothing to run:
    /// the kind has no template or a batch lost every element.
    pub fn build(&self, action: &IntentAction) -> Result<Option<CommandPlan>, SynthesisError> {
        let kind = action.kind();
        let Some(template) = template_for(kind) else {
            return Ok(None);
        };

        let mut values = FieldValues::new();
        if let Some(target) = action.target() {
            values.insert(Field::Target, target.trim().to_string());
        }

        match action {
            IntentAction::SetTime { value } => {
                let ticks = time_ticks(value).ok_or_else(|| SynthesisError::UnknownVocabulary {
                    field: Field::Value,
                    value: value.clone(),
                })?;
                values.insert(Field::Value, ticks.to_string());
            }
            IntentAction::SetWeather { weather } => {
                let token = weather_token(weather).ok_or_else(|| {
                    SynthesisError::UnknownVocabulary { field: Field::Weather, value: weather.clone() }
                })?;
                values.insert(Field::Weather, token.to_string());
            }
            IntentAction::Gamemode { mode, .. } => {
                let token = gamemode_token(mode).ok_or_else(|| SynthesisError::UnknownVocabulary {
                    field: Field::Mode,
                    value: mode.clone(),
                })?;
                values.insert(Field::Mode, token.to_string());
            }
            IntentAction::GiveItem { item, amount, .. } => {
                insert_identifier(&mut values, Field::Item, item);
                values.insert(Field::Amount, (*amount).max(1).to_string());
            }
            IntentAction::Summon { entity, amount } => {
                insert_identifier(&mut values, Field::Entity, entity);
                values.insert(Field::Amount, (*amount).max(1).to_string());
            }
            IntentAction::Teleport { destination, .. } => {
                let phrase = destination
                    .as_deref()
                    .filter(|phrase| !phrase.trim().is_empty())
                    .ok_or(SynthesisError::MissingField { kind, field: Field::Destination })?;
                let resolved = Destination::parse(phrase, &self.structures)
                    .ok_or_else(|| SynthesisError::UnresolvedDestination(phrase.to_string()))?;

                if let Destination::Structure { id } = resolved {
                    let target = values
                        .get(&Field::Target)
                        .filter(|target| !target.is_empty())
                        .cloned()
                        .ok_or(SynthesisError::MissingField { kind, field: Field::Target })?;
                    return Ok(Some(CommandPlan::LocateThenTravel {
                        plan: LocatePlan::new(target, id),
                    }));
                }
                if let Some(argument) = resolved.as_argument() {
                    values.insert(Field::Destination, argument);
                }
            }
            IntentAction::Fly { enable, .. } => {
                values.insert(Field::Enable, enable.to_string());
            }
            IntentAction::Xp { amount, .. } => {
                values.insert(Field::Amount, amount.to_string());
            }
            IntentAction::Effect { effect, duration, amplifier, .. } => {
                insert_identifier(&mut values, Field::Effect, effect);
                values.insert(Field::Duration, duration.to_string());
                values.insert(Field::Amplifier, amplifier.to_string());
            }
            IntentAction::Enchant { enchantment, level, .. } => {
                insert_identifier(&mut values, Field::Enchantment, enchantment);
                values.insert(Field::Level, (*level).max(1).to_string());
            }
            IntentAction::GiveMulti { items, .. } => {
                let elements = items.iter().map(|stack| {
                    let mut element = values.clone();
                    if let Some(item) = &stack.item {
                        insert_identifier(&mut element, Field::Item, item);
                    }
                    if let Some(amount) = stack.amount {
                        element.insert(Field::Amount, amount.max(1).to_string());
                    }
                    element
                });
                return expand_elements(template, elements.collect());
            }
            IntentAction::SummonMulti { entities } => {
                let elements = entities.iter().map(|batch| {
                    let mut element = values.clone();
                    if let Some(entity) = &batch.entity {
                        insert_identifier(&mut element, Field::Entity, entity);
                    }
                    element.insert(Field::Amount, batch.amount.unwrap_or(1).max(1).to_string());
                    element
                });
                return expand_elements(template, elements.collect());
            }
            IntentAction::Heal { .. }
            | IntentAction::Feed { .. }
            | IntentAction::GodMode { .. }
            | IntentAction::Kill { .. }
            | IntentAction::Save => {}
            IntentAction::Scan | IntentAction::NoIntent | IntentAction::Error { .. } => {
                return Ok(None);
            }
        }

        let commands = render_with_arity(template, &values)?;
        Ok(match commands.len() {
            0 => None,
            1 => commands.into_iter().next().map(|command| CommandPlan::Single { command }),
            _ => Some(CommandPlan::Batch { commands }),
        })
    }

    /// Whether `kind` maps to a command template at all. Says nothing about
    /// whether a given action of that kind has the fields to build one.
    pub fn has_template(kind: IntentKind) -> bool {
        template_for(kind).is_some()
    }
}

fn insert_identifier(values: &mut FieldValues, field: Field, raw: &str) {
    let identifier = normalize_identifier(raw);
    if !identifier.is_empty() {
        values.insert(field, identifier);
    }
}

fn render_with_arity(
    template: &CommandTemplate,
    values: &FieldValues,
) -> Result<Vec<Command>, SynthesisError> {
    let command = template.render(values)?;
    let copies = match template.arity {
        Arity::Repeated(count) | Arity::PerElementRepeated(count) => values
            .get(&count)
            .and_then(|value| value.parse::<u32>().ok())
            .unwrap_or(1)
            .clamp(1, MAX_REPEAT),
        Arity::Single | Arity::PerElement => 1,
    };
    Ok(std::iter::repeat(command).take(copies as usize).collect())
}

/// Renders each element on its own. Elements missing a required field are
/// skipped; other errors abort the batch.
fn expand_elements(
    template: &CommandTemplate,
    elements: Vec<FieldValues>,
) -> Result<Option<CommandPlan>, SynthesisError> {
    let mut commands = Vec::new();
    for element in &elements {
        match render_with_arity(template, element) {
            Ok(rendered) => commands.extend(rendered),
            Err(SynthesisError::MissingField { field, .. }) => {
                tracing::debug!(
                    event_name = "pipeline.synthesis.element_skipped",
                    kind = template.kind.as_str(),
                    field = field.as_str(),
                    "batch element skipped for missing field"
                );
            }
            Err(error) => return Err(error),
        }
    }

    Ok(match commands.len() {
        0 => None,
        _ => Some(CommandPlan::Batch { commands }),
    })
}
