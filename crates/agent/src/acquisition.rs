//! Acquisition requests ("give me 4 obsidian", "spawn some zombies") and
//! the object resolver that turns their noun phrases into identifiers.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::OnceCell;
use warden_core::catalog::{is_identifier_shaped, normalize_identifier, ObjectCatalog};
use warden_core::config::ResolverConfig;

use crate::llm::LlmClient;

const SUMMON_VERBS: &[&str] = &["spawn", "summon"];
const GIVE_VERBS: &[&str] =
    &["give", "want", "need", "get", "receive", "gimme", "gimmie", "have", "create"];
const SINGLE_WORDS: &[&str] = &["a", "an", "one"];
const SOME_WORDS: &[&str] = &["some", "few", "couple"];
const MANY_WORDS: &[&str] = &["many", "lots", "lot", "bunch", "stack", "stacks"];
const OBJECT_FILLERS: &[&str] = &["of", "the", "please", "pls", "x", "me", "us"];

const RESOLVER_TEMPERATURE: f32 = 0.3;
const PROMPT_SAMPLE: usize = 100;
const RESOLVER_SYSTEM_PROMPT: &str = "You map a player's description of a Minecraft item or \
entity to its identifier. Reply with exactly one lowercase identifier such as diamond_sword or \
cave_spider and nothing else. Reply NONE if nothing fits.";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquisitionVerb {
    Give,
    Summon,
}

impl AcquisitionVerb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Give => "give",
            Self::Summon => "summon",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestedObject {
    pub phrase: String,
    pub amount: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AcquisitionRequest {
    pub verb: AcquisitionVerb,
    pub target: Option<String>,
    pub objects: Vec<RequestedObject>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QuantityPolicy {
    pub max_give: u32,
    pub max_summon: u32,
    pub some: u32,
    pub many: u32,
}

impl Default for QuantityPolicy {
    fn default() -> Self {
        Self { max_give: 64, max_summon: 20, some: 5, many: 32 }
    }
}

impl From<&ResolverConfig> for QuantityPolicy {
    fn from(config: &ResolverConfig) -> Self {
        Self {
            max_give: config.max_give_amount,
            max_summon: config.max_summon_amount,
            some: config.some_amount,
            many: config.many_amount,
        }
    }
}

impl QuantityPolicy {
    fn cap(&self, verb: AcquisitionVerb) -> u32 {
        match verb {
            AcquisitionVerb::Give => self.max_give,
            AcquisitionVerb::Summon => self.max_summon,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct AcquisitionParser {
    quantities: QuantityPolicy,
}

impl AcquisitionParser {
    pub fn new(quantities: QuantityPolicy) -> Self {
        Self { quantities }
    }

    pub fn verb_of(&self, segment: &str) -> Option<AcquisitionVerb> {
        let tokens = tokenize(segment);
        find_verb(&tokens).map(|(_, verb)| verb)
    }

    /// Parses a sub-message that carries an acquisition verb. `recipients`
    /// are names that may appear as the receiver (the speaker, who is
    /// online).
    pub fn parse(&self, segment: &str, recipients: &[&str]) -> Option<AcquisitionRequest> {
        let tokens = tokenize(segment);
        let (verb_at, verb) = find_verb(&tokens)?;
        let mut rest: Vec<&str> = tokens[verb_at + 1..].to_vec();
        let mut target = None;

        if rest.len() > 1 && is_recipient(rest[0], recipients) {
            target = Some(rest.remove(0).to_string());
        }
        if rest.len() > 2 {
            let last = rest.len() - 1;
            if matches!(rest[last - 1], "to" | "for") && is_recipient(rest[last], recipients) {
                target = Some(rest[last].to_string());
                rest.truncate(last - 1);
            }
        }
        if verb == AcquisitionVerb::Summon {
            target = None;
        }

        let object = self.object_from(&rest, verb)?;
        Some(AcquisitionRequest { verb, target, objects: vec![object] })
    }

    /// A verb-less sub-message following an acquisition: "4 obsidian".
    pub fn continuation(&self, segment: &str, verb: AcquisitionVerb) -> Option<RequestedObject> {
        let tokens = tokenize(segment);
        if find_verb(&tokens).is_some() {
            return None;
        }
        self.object_from(&tokens, verb)
    }

    fn object_from(&self, tokens: &[&str], verb: AcquisitionVerb) -> Option<RequestedObject> {
        let mut amount = None;
        let mut words = Vec::new();
        for token in tokens {
            if amount.is_none() {
                if let Ok(value) = token.trim_end_matches('x').parse::<u32>() {
                    amount = Some(value);
                    continue;
                }
            }
            words.push(*token);
        }

        let amount = amount.unwrap_or_else(|| self.qualitative_amount(&words));
        let phrase = words
            .into_iter()
            .filter(|word| !is_quantity_word(word) && !OBJECT_FILLERS.contains(word))
            .collect::<Vec<_>>()
            .join(" ");
        if phrase.is_empty() {
            return None;
        }

        Some(RequestedObject { phrase, amount: amount.clamp(1, self.quantities.cap(verb)) })
    }

    fn qualitative_amount(&self, words: &[&str]) -> u32 {
        if words.iter().any(|word| MANY_WORDS.contains(word)) {
            self.quantities.many
        } else if words.iter().any(|word| SOME_WORDS.contains(word)) {
            self.quantities.some
        } else {
            1
        }
    }
}

fn tokenize(text: &str) -> Vec<&str> {
    text.split_whitespace()
        .map(|token| token.trim_matches(|ch: char| matches!(ch, '?' | '!' | '.' | ',' | '"')))
        .filter(|token| !token.is_empty())
        .collect()
}

fn find_verb(tokens: &[&str]) -> Option<(usize, AcquisitionVerb)> {
    let position = |verbs: &[&str]| {
        tokens.iter().position(|token| verbs.contains(&token.to_ascii_lowercase().as_str()))
    };
    position(SUMMON_VERBS)
        .map(|at| (at, AcquisitionVerb::Summon))
        .or_else(|| position(GIVE_VERBS).map(|at| (at, AcquisitionVerb::Give)))
}

fn is_recipient(token: &str, recipients: &[&str]) -> bool {
    token.starts_with('@') || recipients.iter().any(|name| name.eq_ignore_ascii_case(token))
}

fn is_quantity_word(word: &str) -> bool {
    SINGLE_WORDS.contains(&word) || SOME_WORDS.contains(&word) || MANY_WORDS.contains(&word)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObjectSource {
    Catalogue,
    Model,
}

impl ObjectSource {
    pub fn confidence(self, verb: AcquisitionVerb) -> f32 {
        match (self, verb) {
            (Self::Catalogue, _) => 0.95,
            (Self::Model, AcquisitionVerb::Give) => 0.85,
            (Self::Model, AcquisitionVerb::Summon) => 0.8,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedObject {
    pub identifier: String,
    pub source: ObjectSource,
}

/// Catalogue-first identifier resolution with a model fallback. Successful
/// lookups are cached per normalised phrase; concurrent lookups of one
/// phrase share a single model call, other phrases never wait on it.
pub struct ObjectResolver {
    catalog: ObjectCatalog,
    llm: Arc<dyn LlmClient>,
    capacity: usize,
    cache: Mutex<HashMap<String, Arc<OnceCell<ResolvedObject>>>>,
}

impl ObjectResolver {
    pub fn new(catalog: ObjectCatalog, llm: Arc<dyn LlmClient>, capacity: usize) -> Self {
        Self { catalog, llm, capacity: capacity.max(1), cache: Mutex::default() }
    }

    pub fn catalog(&self) -> &ObjectCatalog {
        &self.catalog
    }

    pub fn cached(&self) -> usize {
        match self.cache.lock() {
            Ok(cache) => cache.values().filter(|cell| cell.initialized()).count(),
            Err(poisoned) => poisoned.into_inner().values().filter(|cell| cell.initialized()).count(),
        }
    }

    pub async fn resolve(&self, phrase: &str) -> Option<ResolvedObject> {
        let key = normalize_identifier(phrase);
        if key.is_empty() {
            return None;
        }

        let cell = self.cell_for(&key);
        let resolved = cell.get_or_try_init(|| self.lookup(phrase, &key)).await.ok()?;
        Some(resolved.clone())
    }

    fn cell_for(&self, key: &str) -> Arc<OnceCell<ResolvedObject>> {
        let mut cache = match self.cache.lock() {
            Ok(cache) => cache,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(cell) = cache.get(key) {
            return Arc::clone(cell);
        }
        if cache.len() >= self.capacity {
            if let Some(evicted) = cache.keys().next().cloned() {
                cache.remove(&evicted);
            }
        }
        let cell = Arc::new(OnceCell::new());
        cache.insert(key.to_string(), Arc::clone(&cell));
        cell
    }

    async fn lookup(&self, phrase: &str, key: &str) -> Result<ResolvedObject, ()> {
        if let Some(identifier) = self.catalog.lookup(phrase) {
            return Ok(ResolvedObject {
                identifier: identifier.to_string(),
                source: ObjectSource::Catalogue,
            });
        }

        let user = format!(
            "Known identifiers include: {}\nDescription: {phrase}",
            self.catalog.sample(PROMPT_SAMPLE).join(", ")
        );
        let reply = match self.llm.complete(RESOLVER_SYSTEM_PROMPT, &user, RESOLVER_TEMPERATURE).await
        {
            Ok(reply) => reply,
            Err(error) => {
                tracing::warn!(
                    event_name = "pipeline.resolver.object_miss",
                    phrase = %key,
                    error = %error,
                    "object resolution model call failed"
                );
                return Err(());
            }
        };

        match clean_model_identifier(&reply) {
            Some(identifier) => {
                tracing::debug!(
                    event_name = "pipeline.resolver.object_resolved",
                    phrase = %key,
                    identifier = %identifier,
                    "object resolved by model"
                );
                Ok(ResolvedObject { identifier, source: ObjectSource::Model })
            }
            None => {
                tracing::debug!(
                    event_name = "pipeline.resolver.object_miss",
                    phrase = %key,
                    "model reply was not an identifier"
                );
                Err(())
            }
        }
    }
}

fn clean_model_identifier(reply: &str) -> Option<String> {
    let line = reply.lines().map(str::trim).find(|line| !line.is_empty())?;
    let stripped = line.trim_matches(|ch: char| matches!(ch, '"' | '\'' | '`' | '.'));
    let identifier = normalize_identifier(stripped);
    if identifier.len() < 2 || matches!(identifier.as_str(), "none" | "null" | "unknown") {
        return None;
    }
    is_identifier_shaped(&identifier).then_some(identifier)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use warden_core::catalog::ObjectCatalog;

    use super::{
        clean_model_identifier, AcquisitionParser, AcquisitionVerb, ObjectResolver, ObjectSource,
        QuantityPolicy, RequestedObject,
    };
    use crate::llm::{LlmError, ScriptedLlmClient};

    fn parser() -> AcquisitionParser {
        AcquisitionParser::new(QuantityPolicy::default())
    }

    #[test]
    fn parses_target_quantity_and_phrase() {
        let request = parser().parse("give Steve 64 dirt", &["Steve"]).expect("request");
        assert_eq!(request.verb, AcquisitionVerb::Give);
        assert_eq!(request.target.as_deref(), Some("Steve"));
        assert_eq!(request.objects, vec![RequestedObject { phrase: "dirt".to_string(), amount: 64 }]);

        let request =
            parser().parse("can Steve get 3 golden apples please", &["Steve"]).expect("request");
        assert_eq!(request.target, None);
        assert_eq!(request.objects[0], RequestedObject { phrase: "golden apples".to_string(), amount: 3 });
    }

    #[test]
    fn trailing_recipient_becomes_target() {
        let request = parser().parse("give 5 diamonds to alex", &["Steve", "Alex"]).expect("request");
        assert_eq!(request.target.as_deref(), Some("alex"));
        assert_eq!(request.objects[0].phrase, "diamonds");
    }

    #[test]
    fn quantities_are_capped_and_qualitative_words_map_to_defaults() {
        let give = parser().parse("give Steve 500 torches", &["Steve"]).expect("request");
        assert_eq!(give.objects[0].amount, 64);

        let summon = parser().parse("spawn 50 zombies", &[]).expect("request");
        assert_eq!(summon.verb, AcquisitionVerb::Summon);
        assert_eq!(summon.objects[0].amount, 20);

        let some = parser().parse("Steve want some bread", &["Steve"]).expect("request");
        assert_eq!(some.objects[0], RequestedObject { phrase: "bread".to_string(), amount: 5 });

        let many = parser().parse("gimme a stack of torches", &[]).expect("request");
        assert_eq!(many.objects[0], RequestedObject { phrase: "torches".to_string(), amount: 32 });

        let single = parser().parse("Steve need a diamond sword", &["Steve"]).expect("request");
        assert_eq!(single.objects[0].amount, 1);
    }

    #[test]
    fn summon_verbs_take_precedence_over_give_verbs() {
        assert_eq!(parser().verb_of("can Steve get you to spawn a pig"), Some(AcquisitionVerb::Summon));
        assert_eq!(parser().verb_of("hello there"), None);
    }

    #[test]
    fn continuation_requires_no_verb() {
        assert_eq!(
            parser().continuation("4 obsidian", AcquisitionVerb::Give),
            Some(RequestedObject { phrase: "obsidian".to_string(), amount: 4 })
        );
        assert_eq!(parser().continuation("give Steve stone", AcquisitionVerb::Give), None);
        assert_eq!(parser().continuation("please", AcquisitionVerb::Give), None);
    }

    #[test]
    fn model_replies_are_cleaned_into_identifiers() {
        assert_eq!(clean_model_identifier("\"Golden Apple\"\n").as_deref(), Some("golden_apple"));
        assert_eq!(clean_model_identifier("minecraft:blue_ice.").as_deref(), Some("blue_ice"));
        assert_eq!(clean_model_identifier("NONE"), None);
        assert_eq!(clean_model_identifier("it is a diamond!"), None);
    }

    #[tokio::test]
    async fn catalogue_hits_never_reach_the_model() {
        let llm = Arc::new(ScriptedLlmClient::default());
        let resolver = ObjectResolver::new(ObjectCatalog::standard(), llm.clone(), 16);

        let resolved = resolver.resolve("Diamonds").await.expect("catalogue hit");
        assert_eq!(resolved.identifier, "diamond");
        assert_eq!(resolved.source, ObjectSource::Catalogue);
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn model_results_are_cached_and_failures_are_not() {
        let llm = Arc::new(ScriptedLlmClient::new([
            Err(LlmError::Timeout(15)),
            Ok("blue_ice".to_string()),
        ]));
        let resolver = ObjectResolver::new(ObjectCatalog::standard(), llm.clone(), 16);

        assert_eq!(resolver.resolve("frozen blue block").await, None);
        let resolved = resolver.resolve("frozen blue block").await.expect("model hit");
        assert_eq!(resolved.identifier, "blue_ice");
        assert_eq!(resolved.source, ObjectSource::Model);
        assert_eq!(resolved.source.confidence(AcquisitionVerb::Give), 0.85);

        assert!(resolver.resolve("Frozen  Blue Block").await.is_some());
        assert_eq!(llm.calls(), 2);
        assert_eq!(resolver.cached(), 1);
    }
}
