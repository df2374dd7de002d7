use regex::{Captures, Regex, RegexBuilder};

/// Word-boundary pronoun rewriting. Self references become the speaker's
/// name; anaphora become the speaker's last target when one is known.
#[derive(Debug)]
pub struct PronounResolver {
    pattern: Regex,
}

impl PronounResolver {
    pub fn new() -> Result<Self, regex::Error> {
        let pattern = RegexBuilder::new(r"\b(?:myself|me|my|i|him|her|them|more|again)\b")
            .case_insensitive(true)
            .build()?;
        Ok(Self { pattern })
    }

    /// Lowercases and trims `text`, then substitutes. Text without any
    /// referent comes back unchanged apart from case and padding.
    pub fn substitute(&self, text: &str, actor: &str, last_target: Option<&str>) -> String {
        let lowered = text.trim().to_lowercase();
        self.pattern
            .replace_all(&lowered, |caps: &Captures<'_>| {
                let Some(found) = caps.get(0) else {
                    return String::new();
                };
                let word = found.as_str();
                // "i'm", "me'd": contractions are left alone
                if lowered[found.end()..].starts_with('\'') {
                    return word.to_string();
                }
                match word {
                    "me" | "i" | "myself" => actor.to_string(),
                    "my" => format!("{actor}'s"),
                    _ => last_target.map(str::to_string).unwrap_or_else(|| word.to_string()),
                }
            })
            .into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::PronounResolver;

    fn resolver() -> PronounResolver {
        PronounResolver::new().expect("pattern compiles")
    }

    #[test]
    fn self_references_become_the_actor() {
        let resolver = resolver();
        assert_eq!(resolver.substitute("Give ME a diamond", "Steve", None), "give Steve a diamond");
        assert_eq!(resolver.substitute("i want bread", "Steve", None), "Steve want bread");
        assert_eq!(resolver.substitute("tp me to my house", "Steve", None), "tp Steve to Steve's house");
    }

    #[test]
    fn substitution_respects_word_boundaries() {
        let resolver = resolver();
        assert_eq!(resolver.substitute("summon a sheep", "Steve", None), "summon a sheep");
        assert_eq!(resolver.substitute("make it thunder", "Steve", Some("diamond")), "make it thunder");
        assert_eq!(resolver.substitute("give mining gear", "Steve", None), "give mining gear");
        assert_eq!(resolver.substitute("i'm hungry", "Steve", None), "i'm hungry");
    }

    #[test]
    fn anaphora_use_last_target_only_when_present() {
        let resolver = resolver();
        assert_eq!(
            resolver.substitute("give me more", "Steve", Some("cooked_beef")),
            "give Steve cooked_beef"
        );
        assert_eq!(resolver.substitute("do that again", "Steve", None), "do that again");
        assert_eq!(resolver.substitute("heal him", "Steve", Some("Alex")), "heal Alex");
    }

    #[test]
    fn text_without_referents_is_unchanged() {
        let resolver = resolver();
        let text = "make it rain";
        assert_eq!(resolver.substitute(text, "Steve", Some("zombie")), text);
    }
}
