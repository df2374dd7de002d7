//! Movement phrases: "tp me to the village", "take alex to 100 64 200",
//! "find me the stronghold".

use warden_core::catalog::StructureTable;
use warden_core::commands::destination::normalize_coordinates;
use warden_core::commands::Destination;
use warden_core::domain::intent::IntentAction;

const TELEPORT_VERBS: &[&str] = &["tp", "teleport", "warp"];
const TRAVEL_VERBS: &[&str] = &["go", "travel", "take"];

const TELEPORT_CONFIDENCE: f32 = 0.85;
const TRAVEL_CONFIDENCE: f32 = 0.8;
const STRUCTURE_CONFIDENCE: f32 = 0.9;

#[derive(Clone, Debug, PartialEq)]
pub struct TravelMatch {
    pub action: IntentAction,
    pub confidence: f32,
}

#[derive(Clone, Debug, Default)]
pub struct TravelMatcher {
    structures: StructureTable,
}

impl TravelMatcher {
    pub fn new(structures: StructureTable) -> Self {
        Self { structures }
    }

    pub fn parse(&self, segment: &str, recipients: &[&str]) -> Option<TravelMatch> {
        let tokens: Vec<&str> = segment
            .split_whitespace()
            .map(|token| token.trim_matches(|ch: char| matches!(ch, '?' | '!' | '.')))
            .filter(|token| !token.is_empty())
            .collect();
        let verb_at = tokens.iter().position(|token| {
            let token = token.to_ascii_lowercase();
            TELEPORT_VERBS.contains(&token.as_str())
                || TRAVEL_VERBS.contains(&token.as_str())
                || token == "find"
        })?;
        let verb = tokens[verb_at].to_ascii_lowercase();
        let rest = &tokens[verb_at + 1..];

        let (who, phrase, confidence) = if TELEPORT_VERBS.contains(&verb.as_str()) {
            let (who, phrase) = split_teleport(rest, recipients);
            (who, phrase, TELEPORT_CONFIDENCE)
        } else if verb == "find" {
            let (who, phrase) = match rest.split_first() {
                Some((first, tail)) if is_recipient(first, recipients) => (Some(*first), tail),
                _ => (None, rest),
            };
            // only structures can be found
            self.structures.lookup(&join(phrase))?;
            (who, phrase, TRAVEL_CONFIDENCE)
        } else {
            let to_at = rest.iter().position(|token| *token == "to")?;
            let who = match &rest[..to_at] {
                [single] if is_recipient(single, recipients) => Some(*single),
                _ => None,
            };
            (who, &rest[to_at + 1..], TRAVEL_CONFIDENCE)
        };

        let phrase = join(phrase);
        if phrase.is_empty() {
            return None;
        }
        let destination = normalize_coordinates(&phrase).unwrap_or(phrase);
        let parsed = Destination::parse(&destination, &self.structures)?;
        let confidence = match parsed {
            Destination::Structure { .. } => STRUCTURE_CONFIDENCE,
            _ => confidence,
        };

        Some(TravelMatch {
            action: IntentAction::Teleport {
                target: who.map(str::to_string),
                destination: Some(destination),
            },
            confidence,
        })
    }
}

fn split_teleport<'a>(rest: &'a [&'a str], recipients: &[&str]) -> (Option<&'a str>, &'a [&'a str]) {
    if let Some(to_at) = rest.iter().position(|token| *token == "to") {
        let who = match &rest[..to_at] {
            [single] => Some(*single),
            _ => None,
        };
        return (who, &rest[to_at + 1..]);
    }
    match rest.split_first() {
        Some((first, tail)) if !tail.is_empty() && is_recipient(first, recipients) => {
            (Some(*first), tail)
        }
        _ => (None, rest),
    }
}

fn is_recipient(token: &str, recipients: &[&str]) -> bool {
    token.starts_with('@') || recipients.iter().any(|name| name.eq_ignore_ascii_case(token))
}

fn join(tokens: &[&str]) -> String {
    let mut words: Vec<&str> = tokens.to_vec();
    while words.last().is_some_and(|word| *word == "please") {
        words.pop();
    }
    words.join(" ")
}

#[cfg(test)]
mod tests {
    use warden_core::domain::intent::IntentAction;

    use super::TravelMatcher;

    fn parse(text: &str) -> Option<(IntentAction, f32)> {
        TravelMatcher::default()
            .parse(text, &["Steve", "Alex"])
            .map(|found| (found.action, found.confidence))
    }

    fn teleport(target: Option<&str>, destination: &str) -> IntentAction {
        IntentAction::Teleport {
            target: target.map(str::to_string),
            destination: Some(destination.to_string()),
        }
    }

    #[test]
    fn teleport_to_structure_raises_confidence() {
        assert_eq!(parse("tp Steve to village"), Some((teleport(Some("Steve"), "village"), 0.9)));
        assert_eq!(
            parse("warp to the nearest stronghold please"),
            Some((teleport(None, "the nearest stronghold"), 0.9))
        );
    }

    #[test]
    fn teleport_coordinates_and_players() {
        assert_eq!(parse("tp Steve 100 200"), Some((teleport(Some("Steve"), "100 ~ 200"), 0.85)));
        assert_eq!(parse("teleport Steve to Alex"), Some((teleport(Some("Steve"), "Alex"), 0.85)));
        assert_eq!(parse("tp to @p"), Some((teleport(None, "@p"), 0.85)));
    }

    #[test]
    fn travel_verbs_need_a_destination() {
        assert_eq!(
            parse("take Alex to 10, 64, -30"),
            Some((teleport(Some("Alex"), "10 64 -30"), 0.8))
        );
        assert_eq!(parse("go to the end city"), Some((teleport(None, "the end city"), 0.9)));
        assert_eq!(parse("go home"), None);
        assert_eq!(parse("tp to the moon and back"), None);
    }

    #[test]
    fn find_only_matches_structures() {
        assert_eq!(parse("find Steve the mansion"), Some((teleport(Some("Steve"), "the mansion"), 0.9)));
        assert_eq!(parse("find Steve some diamonds"), None);
    }
}
