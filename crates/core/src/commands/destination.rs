use serde::{Deserialize, Serialize};

use crate::catalog::StructureTable;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Destination {
    /// Literal position; `y` is `~` when the phrase gave only `x z`.
    Coordinates { x: String, y: String, z: String },
    /// A selector (`@p`) or another actor's name.
    Reference { name: String },
    /// A structure that has to be located before travelling.
    Structure { id: String },
}

impl Destination {
    pub fn parse(phrase: &str, structures: &StructureTable) -> Option<Self> {
        let trimmed = phrase.trim();
        if trimmed.is_empty() {
            return None;
        }

        if let Some((x, y, z)) = parse_coordinates(trimmed) {
            return Some(Self::Coordinates { x, y, z });
        }
        if let Some(id) = structures.lookup(trimmed) {
            return Some(Self::Structure { id: id.to_string() });
        }
        if is_reference(trimmed) {
            return Some(Self::Reference { name: trimmed.to_string() });
        }
        None
    }

    /// Text as it appears in a travel command; `None` for structures.
    pub fn as_argument(&self) -> Option<String> {
        match self {
            Self::Coordinates { x, y, z } => Some(format!("{x} {y} {z}")),
            Self::Reference { name } => Some(name.clone()),
            Self::Structure { .. } => None,
        }
    }
}

/// Rewrites "100 200" or "100, 64, 200" as `x y z`, leaving anything else
/// untouched.
pub fn normalize_coordinates(phrase: &str) -> Option<String> {
    parse_coordinates(phrase.trim()).map(|(x, y, z)| format!("{x} {y} {z}"))
}

fn parse_coordinates(phrase: &str) -> Option<(String, String, String)> {
    let parts: Vec<&str> =
        phrase.split(|ch: char| ch == ',' || ch.is_whitespace()).filter(|p| !p.is_empty()).collect();
    if !parts.iter().all(|part| part.parse::<i64>().is_ok()) {
        return None;
    }
    match parts.as_slice() {
        [x, z] => Some((x.to_string(), "~".to_string(), z.to_string())),
        [x, y, z] => Some((x.to_string(), y.to_string(), z.to_string())),
        _ => None,
    }
}

fn is_reference(phrase: &str) -> bool {
    if let Some(selector) = phrase.strip_prefix('@') {
        return matches!(selector, "p" | "s" | "r" | "a" | "e");
    }
    (1..=16).contains(&phrase.len())
        && phrase.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
}

#[cfg(test)]
mod tests {
    use super::{normalize_coordinates, Destination};
    use crate::catalog::StructureTable;

    #[test]
    fn pairs_default_vertical_to_current() {
        assert_eq!(normalize_coordinates("100 200").as_deref(), Some("100 ~ 200"));
        assert_eq!(normalize_coordinates("100, 64, -200").as_deref(), Some("100 64 -200"));
        assert_eq!(normalize_coordinates("1 2 3 4"), None);
        assert_eq!(normalize_coordinates("spawn"), None);
    }

    #[test]
    fn destinations_resolve_by_shape() {
        let table = StructureTable::standard();
        assert_eq!(
            Destination::parse("10 70 -5", &table),
            Some(Destination::Coordinates { x: "10".into(), y: "70".into(), z: "-5".into() })
        );
        assert_eq!(
            Destination::parse("the village", &table),
            Some(Destination::Structure { id: "village".into() })
        );
        assert_eq!(
            Destination::parse("Alex", &table),
            Some(Destination::Reference { name: "Alex".into() })
        );
        assert_eq!(
            Destination::parse("@p", &table),
            Some(Destination::Reference { name: "@p".into() })
        );
        assert_eq!(Destination::parse("somewhere over the rainbow", &table), None);
        assert_eq!(Destination::parse("@everyone", &table), None);
    }
}
