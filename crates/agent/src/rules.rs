//! Ordered deterministic rules. The table is evaluated top to bottom and
//! the first matching rule wins; rule order is the only tie-break.

use regex::{Captures, Regex, RegexBuilder};
use warden_core::domain::intent::IntentAction;

const PATTERN_CONFIDENCE: f32 = 0.95;
const SOFT_PATTERN_CONFIDENCE: f32 = 0.9;

const TIME_PREFIX: &str = r"\b(?:make\s+it|set(?:\s+(?:the\s+)?time)?(?:\s+to)?|time(?:\s+to)?|it'?s)\s+";

/// Words that can follow a verb without naming anyone.
const TARGET_FILLERS: &[&str] =
    &["please", "up", "us", "now", "mode", "a", "the", "to", "me", "myself"];

type Builder = fn(&Captures<'_>) -> Option<IntentAction>;

#[derive(Debug)]
pub struct PatternRule {
    pub name: &'static str,
    pattern: Regex,
    pub confidence: f32,
    build: Builder,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RuleMatch {
    pub rule: &'static str,
    pub action: IntentAction,
    pub confidence: f32,
}

#[derive(Debug)]
pub struct PatternTable {
    rules: Vec<PatternRule>,
}

impl PatternTable {
    pub fn standard() -> Result<Self, regex::Error> {
        let specs: Vec<(&'static str, String, f32, Builder)> = vec![
            (
                "stop_flying",
                r"\b(?:stop|disable|no\s+more|turn\s+off)\s+fly(?:ing)?\b|\bfly(?:ing)?\s+off\b"
                    .to_string(),
                PATTERN_CONFIDENCE,
                |_| Some(IntentAction::Fly { target: None, enable: false }),
            ),
            (
                "fly_on",
                r"\b(?:enable\s+fly(?:ing)?|fly(?:ing)?\s+on|turn\s+on\s+fly(?:ing)?|want\s+to\s+fly|let\s+\w+\s+fly|(?:can|may)\s+\w+\s+fly|fly\s+mode)\b"
                    .to_string(),
                PATTERN_CONFIDENCE,
                |_| Some(IntentAction::Fly { target: None, enable: true }),
            ),
            (
                "clear_weather",
                r"\b(?:clear|stop)\s+(?:the\s+)?(?:rain|weather|storm|thunder)\b|\b(?:clear|sunny)\s+(?:weather|skies|sky)\b|\bweather\s+clear\b"
                    .to_string(),
                PATTERN_CONFIDENCE,
                |_| Some(IntentAction::SetWeather { weather: "clear".to_string() }),
            ),
            (
                "rain",
                r"\b(?:(?:make|let)\s+it|start(?:\s+to)?)\s+rain(?:ing)?\b|\bweather\s+rain\b"
                    .to_string(),
                PATTERN_CONFIDENCE,
                |_| Some(IntentAction::SetWeather { weather: "rain".to_string() }),
            ),
            (
                "thunder",
                r"\b(?:(?:make|let)\s+it\s+|start\s+(?:a\s+)?)(?:thunder|storm)|\bthunderstorm\b|\bweather\s+thunder\b"
                    .to_string(),
                PATTERN_CONFIDENCE,
                |_| Some(IntentAction::SetWeather { weather: "thunder".to_string() }),
            ),
            (
                "day",
                format!(r"{TIME_PREFIX}(?:day(?:time)?|morning|sunrise)\b"),
                PATTERN_CONFIDENCE,
                |_| Some(IntentAction::SetTime { value: "day".to_string() }),
            ),
            (
                "noon",
                format!(r"{TIME_PREFIX}(?:noon|midday)\b"),
                SOFT_PATTERN_CONFIDENCE,
                |_| Some(IntentAction::SetTime { value: "noon".to_string() }),
            ),
            (
                "sunset",
                format!(r"{TIME_PREFIX}(?:sunset|evening|dusk)\b"),
                SOFT_PATTERN_CONFIDENCE,
                |_| Some(IntentAction::SetTime { value: "sunset".to_string() }),
            ),
            (
                "night",
                format!(r"{TIME_PREFIX}(?:night(?:time)?|midnight)\b"),
                PATTERN_CONFIDENCE,
                |_| Some(IntentAction::SetTime { value: "night".to_string() }),
            ),
            (
                "numeric_time",
                r"\bset\s+(?:the\s+)?time\s+(?:to\s+)?(\d{1,5})\b|\btime\s+set\s+(\d{1,5})\b"
                    .to_string(),
                PATTERN_CONFIDENCE,
                |caps| {
                    let value = caps.get(1).or_else(|| caps.get(2))?.as_str().to_string();
                    Some(IntentAction::SetTime { value })
                },
            ),
            (
                "save",
                r"^\s*(?:please\s+)?save(?:\s+(?:the\s+)?(?:world|game|server))?(?:\s+please)?\s*[.!]*\s*$"
                    .to_string(),
                PATTERN_CONFIDENCE,
                |_| Some(IntentAction::Save),
            ),
            (
                "heal",
                r"\bheal(?:\s+(@?\w+))?\b".to_string(),
                PATTERN_CONFIDENCE,
                |caps| Some(IntentAction::Heal { target: captured_target(caps, 1) }),
            ),
            (
                "feed",
                r"\bfeed(?:\s+(@?\w+))?\b".to_string(),
                PATTERN_CONFIDENCE,
                |caps| Some(IntentAction::Feed { target: captured_target(caps, 1) }),
            ),
            (
                "god_mode",
                r"\bgod\s*mode\b|\bmake\s+(@?\w+)\s+(?:a\s+)?god\b|\binvincib(?:le|ility)\b"
                    .to_string(),
                PATTERN_CONFIDENCE,
                |caps| Some(IntentAction::GodMode { target: captured_target(caps, 1) }),
            ),
            (
                "gamemode",
                r"\b(creative|survival|adventure|spectator)\s+mode\b|\b(?:gamemode|gm|mode)\s+(creative|survival|adventure|spectator)\b|\b(?:switch|change|go|put)\s+(?:\w+\s+)?(?:to|in|into)\s+(creative|survival|adventure|spectator)\b"
                    .to_string(),
                PATTERN_CONFIDENCE,
                |caps| {
                    let mode = caps.get(1).or_else(|| caps.get(2)).or_else(|| caps.get(3))?;
                    Some(IntentAction::Gamemode { target: None, mode: mode.as_str().to_string() })
                },
            ),
            (
                "scan",
                r"\b(?:scan|look\s+around|what'?s\s+around|who'?s\s+online)\b".to_string(),
                SOFT_PATTERN_CONFIDENCE,
                |_| Some(IntentAction::Scan),
            ),
        ];

        let rules = specs
            .into_iter()
            .map(|(name, source, confidence, build)| {
                let pattern = RegexBuilder::new(&source).case_insensitive(true).build()?;
                Ok(PatternRule { name, pattern, confidence, build })
            })
            .collect::<Result<Vec<_>, regex::Error>>()?;

        Ok(Self { rules })
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|rule| rule.name).collect()
    }

    pub fn first_match(&self, text: &str) -> Option<RuleMatch> {
        self.rules.iter().find_map(|rule| {
            let caps = rule.pattern.captures(text)?;
            let action = (rule.build)(&caps)?;
            Some(RuleMatch { rule: rule.name, action, confidence: rule.confidence })
        })
    }
}

fn captured_target(caps: &Captures<'_>, group: usize) -> Option<String> {
    let word = caps.get(group)?.as_str();
    let lowered = word.to_ascii_lowercase();
    if TARGET_FILLERS.contains(&lowered.as_str()) {
        return None;
    }
    match lowered.as_str() {
        "everyone" | "everybody" | "all" => Some("@a".to_string()),
        _ => Some(word.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use warden_core::domain::intent::IntentAction;

    use super::PatternTable;

    fn table() -> PatternTable {
        PatternTable::standard().expect("rules compile")
    }

    fn action(text: &str) -> Option<IntentAction> {
        table().first_match(text).map(|found| found.action)
    }

    #[test]
    fn rule_order_is_fixed() {
        assert_eq!(
            table().rule_names(),
            vec![
                "stop_flying",
                "fly_on",
                "clear_weather",
                "rain",
                "thunder",
                "day",
                "noon",
                "sunset",
                "night",
                "numeric_time",
                "save",
                "heal",
                "feed",
                "god_mode",
                "gamemode",
                "scan",
            ]
        );
    }

    #[test]
    fn earlier_rules_win_over_later_ones() {
        assert_eq!(
            action("stop flying, fly mode is annoying"),
            Some(IntentAction::Fly { target: None, enable: false })
        );
        assert_eq!(
            action("stop the rain"),
            Some(IntentAction::SetWeather { weather: "clear".to_string() })
        );
    }

    #[test]
    fn weather_and_time_phrases_match() {
        assert_eq!(
            action("make it rain"),
            Some(IntentAction::SetWeather { weather: "rain".to_string() })
        );
        assert_eq!(
            action("make it thunder"),
            Some(IntentAction::SetWeather { weather: "thunder".to_string() })
        );
        assert_eq!(action("make it night"), Some(IntentAction::SetTime { value: "night".to_string() }));
        assert_eq!(
            action("set time to 6000"),
            Some(IntentAction::SetTime { value: "6000".to_string() })
        );

        let noon = table().first_match("make it noon").map(|found| (found.rule, found.confidence));
        assert_eq!(noon, Some(("noon", 0.9)));
    }

    #[test]
    fn save_is_anchored_to_whole_message() {
        assert_eq!(action("save the world"), Some(IntentAction::Save));
        assert_eq!(action("please save!"), Some(IntentAction::Save));
        assert_eq!(action("save me a diamond"), None);
    }

    #[test]
    fn heal_and_feed_capture_targets_and_skip_fillers() {
        assert_eq!(action("heal Alex"), Some(IntentAction::Heal { target: Some("Alex".to_string()) }));
        assert_eq!(action("heal please"), Some(IntentAction::Heal { target: None }));
        assert_eq!(action("feed everyone"), Some(IntentAction::Feed { target: Some("@a".to_string()) }));
    }

    #[test]
    fn modes_and_scan_match() {
        assert_eq!(
            action("put Steve in creative"),
            Some(IntentAction::Gamemode { target: None, mode: "creative".to_string() })
        );
        assert_eq!(
            action("survival mode please"),
            Some(IntentAction::Gamemode { target: None, mode: "survival".to_string() })
        );
        assert_eq!(action("god mode"), Some(IntentAction::GodMode { target: None }));
        assert_eq!(action("look around"), Some(IntentAction::Scan));
    }

    #[test]
    fn ordinary_requests_fall_through() {
        assert_eq!(action("give Steve 64 dirt"), None);
        assert_eq!(action("tp Steve to village"), None);
        assert_eq!(action("hello there"), None);
    }
}
