//! Single dispatcher over the resolution stages. Each sub-message is tried
//! against the pattern table, then acquisition, then travel phrases. One
//! unresolved sub-message sends the whole message to the model instead.

use std::sync::Arc;

use regex::{Regex, RegexBuilder};
use warden_core::catalog::{ObjectCatalog, StructureTable};
use warden_core::config::ResolverConfig;
use warden_core::domain::actor::Actor;
use warden_core::domain::intent::{
    EntityBatch, Intent, IntentAction, IntentSource, ItemStack,
};
use warden_core::domain::world::WorldContext;

use crate::acquisition::{
    AcquisitionParser, AcquisitionRequest, AcquisitionVerb, ObjectResolver, QuantityPolicy,
};
use crate::llm::LlmClient;
use crate::model::ModelFallback;
use crate::pronouns::PronounResolver;
use crate::rules::PatternTable;
use crate::travel::TravelMatcher;

const SEGMENT_SEPARATORS: &str = r"\s*(?:,|\band\s+then\b|\bthen\b|\band\b)\s*";

enum Step {
    Ready { action: IntentAction, confidence: f32, source: IntentSource },
    Acquire(AcquisitionRequest),
}

pub struct IntentResolver {
    pronouns: PronounResolver,
    rules: PatternTable,
    acquisitions: AcquisitionParser,
    objects: ObjectResolver,
    travel: TravelMatcher,
    model: ModelFallback,
    separators: Regex,
}

impl IntentResolver {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        catalog: ObjectCatalog,
        structures: StructureTable,
        config: &ResolverConfig,
        temperature: f32,
    ) -> Result<Self, regex::Error> {
        let quantities = QuantityPolicy::from(config);
        Ok(Self {
            pronouns: PronounResolver::new()?,
            rules: PatternTable::standard()?,
            acquisitions: AcquisitionParser::new(quantities),
            objects: ObjectResolver::new(catalog, Arc::clone(&llm), config.cache_capacity),
            travel: TravelMatcher::new(structures),
            model: ModelFallback::new(llm, temperature, quantities),
            separators: RegexBuilder::new(SEGMENT_SEPARATORS).case_insensitive(true).build()?,
        })
    }

    pub fn objects(&self) -> &ObjectResolver {
        &self.objects
    }

    /// Always returns at least one intent.
    pub async fn resolve(&self, text: &str, actor: &Actor, world: &WorldContext) -> Vec<Intent> {
        let rewritten =
            self.pronouns.substitute(text, actor.id.as_str(), actor.last_target.as_deref());
        let segments = self.split_segments(&rewritten);
        if segments.is_empty() {
            return vec![Intent::none(IntentSource::Pattern, text)];
        }

        let recipients: Vec<&str> = std::iter::once(actor.id.as_str())
            .chain(world.online.iter().map(String::as_str))
            .collect();

        let Some(steps) = self.plan_segments(&segments, &recipients) else {
            return self.fall_back(text, actor, world, "unmatched sub-message").await;
        };

        let mut intents = Vec::with_capacity(steps.len());
        for step in steps {
            match step {
                Step::Ready { action, confidence, source } => {
                    intents.push(Intent::new(action, confidence, source, text));
                }
                Step::Acquire(request) => match self.acquire(request, text).await {
                    Some(intent) => intents.push(intent),
                    None => return self.fall_back(text, actor, world, "unresolved object").await,
                },
            }
        }
        intents
    }

    /// Splits on the separator table, except for a comma between two
    /// coordinate components ("100, 64, -200").
    fn split_segments<'t>(&self, text: &'t str) -> Vec<&'t str> {
        let mut segments = Vec::new();
        let mut start = 0;
        for found in self.separators.find_iter(text) {
            let is_comma = found.as_str().trim() == ",";
            if is_comma && joins_coordinates(&text[..found.start()], &text[found.end()..]) {
                continue;
            }
            segments.push(&text[start..found.start()]);
            start = found.end();
        }
        segments.push(&text[start..]);
        segments.into_iter().map(str::trim).filter(|segment| !segment.is_empty()).collect()
    }

    fn plan_segments(&self, segments: &[&str], recipients: &[&str]) -> Option<Vec<Step>> {
        let mut steps: Vec<Step> = Vec::with_capacity(segments.len());
        for segment in segments {
            if let Some(found) = self.rules.first_match(segment) {
                steps.push(Step::Ready {
                    action: found.action,
                    confidence: found.confidence,
                    source: IntentSource::Pattern,
                });
                continue;
            }
            if let Some(request) = self.acquisitions.parse(segment, recipients) {
                steps.push(Step::Acquire(request));
                continue;
            }
            if let Some(found) = self.travel.parse(segment, recipients) {
                steps.push(Step::Ready {
                    action: found.action,
                    confidence: found.confidence,
                    source: IntentSource::Resolver,
                });
                continue;
            }
            if let Some(Step::Acquire(previous)) = steps.last_mut() {
                if let Some(object) = self.acquisitions.continuation(segment, previous.verb) {
                    previous.objects.push(object);
                    continue;
                }
            }
            return None;
        }
        Some(steps)
    }

    async fn acquire(&self, request: AcquisitionRequest, raw_text: &str) -> Option<Intent> {
        let verb = request.verb;
        let mut confidence: f32 = 1.0;
        let mut resolved = Vec::with_capacity(request.objects.len());
        for object in &request.objects {
            let found = self.objects.resolve(&object.phrase).await?;
            confidence = confidence.min(found.source.confidence(verb));
            resolved.push((found.identifier, object.amount));
        }

        let action = match (verb, resolved.as_slice()) {
            (AcquisitionVerb::Give, [(item, amount)]) => IntentAction::GiveItem {
                target: request.target,
                item: item.clone(),
                amount: *amount,
            },
            (AcquisitionVerb::Give, _) => IntentAction::GiveMulti {
                target: request.target,
                items: resolved.iter().map(|(item, amount)| ItemStack::new(item, *amount)).collect(),
            },
            (AcquisitionVerb::Summon, [(entity, amount)]) => {
                IntentAction::Summon { entity: entity.clone(), amount: *amount }
            }
            (AcquisitionVerb::Summon, _) => IntentAction::SummonMulti {
                entities: resolved
                    .iter()
                    .map(|(entity, amount)| EntityBatch::new(entity, *amount))
                    .collect(),
            },
        };
        Some(Intent::new(action, confidence, IntentSource::Resolver, raw_text))
    }

    async fn fall_back(
        &self,
        text: &str,
        actor: &Actor,
        world: &WorldContext,
        cause: &'static str,
    ) -> Vec<Intent> {
        tracing::debug!(
            event_name = "pipeline.resolver.model_fallback",
            actor = %actor.id,
            cause,
            "deterministic stages did not resolve the message"
        );
        self.model.resolve(text, actor, world).await
    }
}

fn joins_coordinates(before: &str, after: &str) -> bool {
    let ends_with_component =
        before.chars().next_back().is_some_and(|ch| ch.is_ascii_digit() || ch == '~');
    let mut next = after.chars();
    let starts_with_component = match next.next() {
        Some('-') => next.next().is_some_and(|ch| ch.is_ascii_digit()),
        Some(ch) => ch.is_ascii_digit() || ch == '~',
        None => false,
    };
    ends_with_component && starts_with_component
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use warden_core::catalog::{ObjectCatalog, StructureTable};
    use warden_core::config::AppConfig;
    use warden_core::domain::actor::{Actor, ActorId};
    use warden_core::domain::intent::{IntentAction, IntentKind, IntentSource, ItemStack};
    use warden_core::domain::world::WorldContext;

    use super::IntentResolver;
    use crate::llm::{LlmClient, ScriptedLlmClient};

    fn resolver(llm: Arc<ScriptedLlmClient>) -> IntentResolver {
        let config = AppConfig::default();
        let llm: Arc<dyn LlmClient> = llm;
        IntentResolver::new(
            llm,
            ObjectCatalog::standard(),
            StructureTable::standard(),
            &config.resolver,
            config.llm.temperature,
        )
        .expect("resolver")
    }

    fn steve() -> Actor {
        Actor::new(ActorId::new("Steve"))
    }

    #[tokio::test]
    async fn multi_item_give_merges_into_one_intent() {
        let llm = Arc::new(ScriptedLlmClient::default());
        let intents = resolver(llm.clone())
            .resolve("give me 1 diamond and 4 obsidian", &steve(), &WorldContext::default())
            .await;

        assert_eq!(intents.len(), 1);
        assert_eq!(
            intents[0].action,
            IntentAction::GiveMulti {
                target: Some("Steve".to_string()),
                items: vec![ItemStack::new("diamond", 1), ItemStack::new("obsidian", 4)],
            }
        );
        assert_eq!(intents[0].confidence.value(), 0.95);
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn compound_message_yields_ordered_intents() {
        let llm = Arc::new(ScriptedLlmClient::default());
        let intents = resolver(llm.clone())
            .resolve("give me 64 dirt and tp me to village", &steve(), &WorldContext::default())
            .await;

        let kinds: Vec<IntentKind> = intents.iter().map(|intent| intent.kind()).collect();
        assert_eq!(kinds, vec![IntentKind::GiveItem, IntentKind::Teleport]);
        assert_eq!(intents[1].source, IntentSource::Resolver);
        assert_eq!(intents[1].confidence.value(), 0.9);
        assert!(intents.iter().all(|intent| intent.raw_text == "give me 64 dirt and tp me to village"));
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn patterns_win_and_anaphora_use_last_target() {
        let llm = Arc::new(ScriptedLlmClient::default());
        let resolver = resolver(llm);
        let world = WorldContext::default();

        let rain = resolver.resolve("make it rain", &steve(), &world).await;
        assert_eq!(rain[0].action, IntentAction::SetWeather { weather: "rain".to_string() });
        assert_eq!(rain[0].source, IntentSource::Pattern);

        let remembered = steve().with_last_target("cooked_beef");
        let more = resolver.resolve("give me 3 more", &remembered, &world).await;
        assert_eq!(
            more[0].action,
            IntentAction::GiveItem {
                target: Some("Steve".to_string()),
                item: "cooked_beef".to_string(),
                amount: 3,
            }
        );
    }

    #[tokio::test]
    async fn one_unmatched_segment_sends_the_whole_message_to_the_model() {
        let llm = Arc::new(ScriptedLlmClient::replying([
            r#"[{"intent": "set_time", "parameters": {"value": "day"}, "confidence": 0.9}]"#,
        ]));
        let intents = resolver(llm.clone())
            .resolve("make it day and dance for me", &steve(), &WorldContext::default())
            .await;

        assert_eq!(llm.calls(), 1);
        assert!(llm.prompts()[0].1.contains("Message: make it day and dance for me"));
        assert_eq!(intents.len(), 1);
        assert_eq!(intents[0].source, IntentSource::Model);
    }

    #[tokio::test]
    async fn comma_separated_coordinates_stay_in_one_segment() {
        let llm = Arc::new(ScriptedLlmClient::default());
        let intents = resolver(llm.clone())
            .resolve("tp me to 100, 64, -200", &steve(), &WorldContext::default())
            .await;

        assert_eq!(intents.len(), 1);
        assert_eq!(
            intents[0].action,
            IntentAction::Teleport {
                target: Some("Steve".to_string()),
                destination: Some("100 64 -200".to_string()),
            }
        );
        assert_eq!(llm.calls(), 0);

        let split = resolver(llm.clone())
            .resolve("tp me to 10, 20, make it rain", &steve(), &WorldContext::default())
            .await;
        let kinds: Vec<IntentKind> = split.iter().map(|intent| intent.kind()).collect();
        assert_eq!(kinds, vec![IntentKind::Teleport, IntentKind::SetWeather]);
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn unknown_objects_use_the_model_resolver_at_lower_confidence() {
        let llm = Arc::new(ScriptedLlmClient::replying(["blue_ice"]));
        let intents = resolver(llm.clone())
            .resolve("give me some frozen blue blocks", &steve(), &WorldContext::default())
            .await;

        assert_eq!(
            intents[0].action,
            IntentAction::GiveItem {
                target: Some("Steve".to_string()),
                item: "blue_ice".to_string(),
                amount: 5,
            }
        );
        assert_eq!(intents[0].confidence.value(), 0.85);
    }

    #[tokio::test]
    async fn failed_model_fallback_is_an_explicit_non_actionable_intent() {
        let llm = Arc::new(ScriptedLlmClient::default());
        let intents = resolver(llm)
            .resolve("what a lovely evening for a walk", &steve(), &WorldContext::default())
            .await;

        assert_eq!(intents.len(), 1);
        assert!(!intents[0].kind().produces_commands());
    }
}
