use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::commands::SynthesisError;
use crate::domain::command::Command;
use crate::domain::intent::IntentKind;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Target,
    Item,
    Amount,
    Entity,
    Value,
    Weather,
    Mode,
    Destination,
    Enable,
    Effect,
    Duration,
    Amplifier,
    Enchantment,
    Level,
}

impl Field {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Target => "target",
            Self::Item => "item",
            Self::Amount => "amount",
            Self::Entity => "entity",
            Self::Value => "value",
            Self::Weather => "weather",
            Self::Mode => "mode",
            Self::Destination => "destination",
            Self::Enable => "enable",
            Self::Effect => "effect",
            Self::Duration => "duration",
            Self::Amplifier => "amplifier",
            Self::Enchantment => "enchantment",
            Self::Level => "level",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Segment {
    Literal(&'static str),
    Required(Field),
    Optional(Field),
    /// Required field rendered with a `minecraft:` namespace unless it
    /// already carries one.
    Namespaced(Field),
}

/// How many commands one intent expands to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Arity {
    Single,
    /// The same command, repeated by the value of the given count field.
    Repeated(Field),
    /// One command per array element.
    PerElement,
    /// One command per element, each repeated by the element's count.
    PerElementRepeated(Field),
}

pub type FieldValues = BTreeMap<Field, String>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommandTemplate {
    pub kind: IntentKind,
    pub segments: &'static [Segment],
    pub requires_privilege: bool,
    pub is_destructive: bool,
    pub arity: Arity,
}

const fn template(
    kind: IntentKind,
    segments: &'static [Segment],
    arity: Arity,
    is_destructive: bool,
) -> CommandTemplate {
    CommandTemplate { kind, segments, requires_privilege: true, is_destructive, arity }
}

use Segment::{Literal as L, Namespaced as N, Optional as O, Required as R};

pub static TEMPLATES: &[CommandTemplate] = &[
    template(
        IntentKind::SetTime,
        &[L("time"), L("set"), R(Field::Value)],
        Arity::Single,
        false,
    ),
    template(IntentKind::SetWeather, &[L("weather"), R(Field::Weather)], Arity::Single, false),
    template(
        IntentKind::GiveItem,
        &[L("give"), R(Field::Target), R(Field::Item), O(Field::Amount)],
        Arity::Single,
        false,
    ),
    template(
        IntentKind::GiveMulti,
        &[L("give"), R(Field::Target), R(Field::Item), O(Field::Amount)],
        Arity::PerElement,
        false,
    ),
    template(
        IntentKind::Summon,
        &[L("summon"), R(Field::Entity), L("~"), L("~"), L("~")],
        Arity::Repeated(Field::Amount),
        false,
    ),
    template(
        IntentKind::SummonMulti,
        &[L("summon"), R(Field::Entity), L("~"), L("~"), L("~")],
        Arity::PerElementRepeated(Field::Amount),
        false,
    ),
    template(
        IntentKind::Teleport,
        &[L("tp"), R(Field::Target), R(Field::Destination)],
        Arity::Single,
        false,
    ),
    template(
        IntentKind::Gamemode,
        &[L("gamemode"), R(Field::Mode), R(Field::Target)],
        Arity::Single,
        false,
    ),
    template(
        IntentKind::Heal,
        &[
            L("effect"),
            L("give"),
            R(Field::Target),
            L("minecraft:instant_health"),
            L("1"),
            L("5"),
            L("true"),
        ],
        Arity::Single,
        false,
    ),
    template(
        IntentKind::Feed,
        &[L("effect"), L("give"), R(Field::Target), L("minecraft:saturation"), L("1"), L("5"), L("true")],
        Arity::Single,
        false,
    ),
    template(
        IntentKind::GodMode,
        &[
            L("effect"),
            L("give"),
            R(Field::Target),
            L("minecraft:resistance"),
            L("1000000"),
            L("255"),
            L("true"),
        ],
        Arity::Single,
        false,
    ),
    template(IntentKind::Kill, &[L("kill"), R(Field::Target)], Arity::Single, true),
    template(IntentKind::Save, &[L("save-all")], Arity::Single, false),
    template(
        IntentKind::Fly,
        &[L("ability"), R(Field::Target), L("mayfly"), R(Field::Enable)],
        Arity::Single,
        false,
    ),
    template(
        IntentKind::Xp,
        &[L("xp"), L("add"), R(Field::Target), R(Field::Amount)],
        Arity::Single,
        false,
    ),
    template(
        IntentKind::Effect,
        &[
            L("effect"),
            L("give"),
            R(Field::Target),
            N(Field::Effect),
            R(Field::Duration),
            R(Field::Amplifier),
            L("true"),
        ],
        Arity::Single,
        false,
    ),
    template(
        IntentKind::Enchant,
        &[L("enchant"), R(Field::Target), N(Field::Enchantment), R(Field::Level)],
        Arity::Single,
        false,
    ),
];

pub fn template_for(kind: IntentKind) -> Option<&'static CommandTemplate> {
    TEMPLATES.iter().find(|template| template.kind == kind)
}

impl CommandTemplate {
    pub fn is_multi_valued(&self) -> bool {
        matches!(self.arity, Arity::PerElement | Arity::PerElementRepeated(_))
    }

    pub fn required_fields(&self) -> Vec<Field> {
        self.segments
            .iter()
            .filter_map(|segment| match segment {
                Segment::Required(field) | Segment::Namespaced(field) => Some(*field),
                _ => None,
            })
            .collect()
    }

    /// Human readable shape, e.g. `give {target} {item} [amount]`.
    pub fn text_pattern(&self) -> String {
        self.segments
            .iter()
            .map(|segment| match segment {
                Segment::Literal(text) => (*text).to_string(),
                Segment::Required(field) => format!("{{{field}}}"),
                Segment::Optional(field) => format!("[{field}]"),
                Segment::Namespaced(field) => format!("minecraft:{{{field}}}"),
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn render(&self, values: &FieldValues) -> Result<Command, SynthesisError> {
        let mut parts = Vec::with_capacity(self.segments.len());
        for segment in self.segments {
            match segment {
                Segment::Literal(text) => parts.push((*text).to_string()),
                Segment::Required(field) => {
                    parts.push(self.checked_value(values, *field)?.to_string());
                }
                Segment::Optional(field) => {
                    if values.contains_key(field) {
                        parts.push(self.checked_value(values, *field)?.to_string());
                    }
                }
                Segment::Namespaced(field) => {
                    let value = self.checked_value(values, *field)?;
                    if value.contains(':') {
                        parts.push(value.to_string());
                    } else {
                        parts.push(format!("minecraft:{value}"));
                    }
                }
            }
        }
        Ok(Command::new(parts.join(" ")))
    }

    fn checked_value<'a>(
        &self,
        values: &'a FieldValues,
        field: Field,
    ) -> Result<&'a str, SynthesisError> {
        let value = values
            .get(&field)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
            .ok_or(SynthesisError::MissingField { kind: self.kind, field })?;

        if !value.split_whitespace().all(is_safe_token) {
            return Err(SynthesisError::InvalidToken { field, value: value.to_string() });
        }
        Ok(value)
    }
}

fn is_safe_token(token: &str) -> bool {
    !token.is_empty()
        && token
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | ':' | '@' | '.' | '~' | '-'))
}

#[cfg(test)]
mod tests {
    use super::{template_for, Arity, Field, FieldValues, TEMPLATES};
    use crate::commands::SynthesisError;
    use crate::domain::intent::IntentKind;

    #[test]
    fn every_command_kind_has_exactly_one_template() {
        for kind in IntentKind::ALL {
            let count = TEMPLATES.iter().filter(|template| template.kind == kind).count();
            let expected = usize::from(kind.produces_commands());
            assert_eq!(count, expected, "template count for {kind}");
        }
    }

    #[test]
    fn only_kill_is_destructive_and_batches_are_multi_valued() {
        for template in TEMPLATES {
            assert_eq!(template.is_destructive, template.kind == IntentKind::Kill);
            assert!(template.requires_privilege);
        }
        assert!(template_for(IntentKind::GiveMulti).is_some_and(|t| t.is_multi_valued()));
        assert!(template_for(IntentKind::SummonMulti).is_some_and(|t| t.is_multi_valued()));
        assert!(template_for(IntentKind::Summon)
            .is_some_and(|t| t.arity == Arity::Repeated(Field::Amount)));
    }

    #[test]
    fn render_substitutes_and_omits_absent_optional_fields() {
        let template = template_for(IntentKind::GiveItem).expect("give template");
        assert_eq!(template.text_pattern(), "give {target} {item} [amount]");

        let mut values = FieldValues::new();
        values.insert(Field::Target, "Steve".into());
        values.insert(Field::Item, "dirt".into());
        assert_eq!(template.render(&values).expect("render").as_str(), "give Steve dirt");

        values.insert(Field::Amount, "64".into());
        assert_eq!(template.render(&values).expect("render").as_str(), "give Steve dirt 64");
    }

    #[test]
    fn missing_required_field_is_a_typed_error() {
        let template = template_for(IntentKind::Kill).expect("kill template");
        let error = template.render(&FieldValues::new()).expect_err("target is required");
        assert_eq!(error, SynthesisError::MissingField { kind: IntentKind::Kill, field: Field::Target });
    }

    #[test]
    fn unsafe_tokens_are_rejected_before_rendering() {
        let template = template_for(IntentKind::Kill).expect("kill template");
        let mut values = FieldValues::new();
        values.insert(Field::Target, "Steve;op".into());
        assert!(matches!(
            template.render(&values),
            Err(SynthesisError::InvalidToken { field: Field::Target, .. })
        ));
    }

    #[test]
    fn namespaced_fields_keep_existing_namespace() {
        let template = template_for(IntentKind::Effect).expect("effect template");
        let mut values = FieldValues::new();
        values.insert(Field::Target, "Alex".into());
        values.insert(Field::Effect, "speed".into());
        values.insert(Field::Duration, "30".into());
        values.insert(Field::Amplifier, "1".into());
        assert_eq!(
            template.render(&values).expect("render").as_str(),
            "effect give Alex minecraft:speed 30 1 true"
        );

        values.insert(Field::Effect, "modpack:glow".into());
        assert!(template.render(&values).expect("render").as_str().contains(" modpack:glow "));
    }
}
