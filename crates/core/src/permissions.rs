use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, RwLock};

use serde::Serialize;

use crate::domain::actor::{ActorId, Role};
use crate::domain::intent::{Confidence, IntentKind};

pub const WILDCARD_CAPABILITY: &str = "*";

/// Immutable authorization inputs. Replaced wholesale on reload.
#[derive(Clone, Debug, PartialEq)]
pub struct PermissionPolicy {
    rosters: BTreeMap<Role, BTreeSet<String>>,
    capabilities: BTreeMap<Role, BTreeSet<String>>,
    min_confidence: BTreeMap<Role, f32>,
    intent_capabilities: BTreeMap<IntentKind, String>,
}

impl Default for PermissionPolicy {
    fn default() -> Self {
        let capabilities = [
            (Role::Owner, vec![WILDCARD_CAPABILITY]),
            (
                Role::Admin,
                vec![
                    "time", "weather", "give", "tp", "summon", "heal", "god", "gamemode", "xp",
                    "kill", "save", "kick", "ban", "unban", "fly", "feed", "repair", "enchant",
                    "effect", "setblock", "fill",
                ],
            ),
            (Role::Moderator, vec!["kick", "ban", "unban", "mute", "tempban", "warn"]),
            (Role::Builder, vec!["gamemode", "give", "fly", "tp"]),
            (Role::Vip, vec!["fly", "feed", "heal", "tp"]),
            (Role::Player, vec![]),
        ]
        .into_iter()
        .map(|(role, caps)| (role, caps.into_iter().map(str::to_string).collect()))
        .collect();

        let min_confidence = [
            (Role::Owner, 0.6),
            (Role::Admin, 0.7),
            (Role::Moderator, 0.8),
            (Role::Builder, 0.85),
            (Role::Vip, 0.9),
            (Role::Player, 1.0),
        ]
        .into_iter()
        .collect();

        let intent_capabilities = [
            (IntentKind::GiveItem, "give"),
            (IntentKind::GiveMulti, "give"),
            (IntentKind::SetTime, "time"),
            (IntentKind::SetWeather, "weather"),
            (IntentKind::Summon, "summon"),
            (IntentKind::SummonMulti, "summon"),
            (IntentKind::Teleport, "tp"),
            (IntentKind::GodMode, "god"),
        ]
        .into_iter()
        .map(|(kind, capability)| (kind, capability.to_string()))
        .collect();

        Self { rosters: BTreeMap::new(), capabilities, min_confidence, intent_capabilities }
    }
}

impl PermissionPolicy {
    pub fn with_roster<I, S>(mut self, role: Role, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let roster = self.rosters.entry(role).or_default();
        roster.extend(members.into_iter().map(|member| member.as_ref().trim().to_lowercase()));
        self
    }

    pub fn with_capabilities<I, S>(mut self, role: Role, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.capabilities.insert(
            role,
            capabilities.into_iter().map(|cap| cap.as_ref().trim().to_string()).collect(),
        );
        self
    }

    pub fn with_min_confidence(mut self, role: Role, threshold: f32) -> Self {
        self.min_confidence.insert(role, threshold.clamp(0.0, 1.0));
        self
    }

    /// First roster containing the actor wins, scanning from the most
    /// privileged role down.
    pub fn role_of(&self, actor: &ActorId) -> Role {
        let key = actor.as_str().trim().to_lowercase();
        Role::ALL
            .into_iter()
            .filter(|role| !role.is_lowest())
            .find(|role| self.rosters.get(role).is_some_and(|roster| roster.contains(&key)))
            .unwrap_or_else(Role::lowest)
    }

    pub fn roster_size(&self, role: Role) -> usize {
        self.rosters.get(&role).map_or(0, |roster| roster.len())
    }

    pub fn capability_for(&self, kind: IntentKind) -> String {
        self.intent_capabilities
            .get(&kind)
            .cloned()
            .unwrap_or_else(|| kind.as_str().to_string())
    }

    pub fn min_confidence(&self, role: Role) -> f32 {
        self.min_confidence.get(&role).copied().unwrap_or(1.0)
    }

    pub fn capabilities(&self, role: Role) -> Vec<String> {
        self.capabilities.get(&role).map(|caps| caps.iter().cloned().collect()).unwrap_or_default()
    }

    fn grants(&self, role: Role, capability: &str) -> bool {
        self.capabilities.get(&role).is_some_and(|caps| {
            caps.contains(WILDCARD_CAPABILITY) || caps.contains(capability)
        })
    }

    pub fn decide(
        &self,
        actor: &ActorId,
        kind: IntentKind,
        confidence: Confidence,
    ) -> PermissionDecision {
        let role = self.role_of(actor);
        let capability = self.capability_for(kind);
        let threshold = self.min_confidence(role);

        let (allowed, reason) = if role.is_lowest() {
            (false, format!("role `{role}` may not run commands"))
        } else if confidence.value() < threshold {
            (
                false,
                format!(
                    "confidence {:.2} is below the {threshold:.2} required for role `{role}`",
                    confidence.value()
                ),
            )
        } else if !self.grants(role, &capability) {
            (false, format!("role `{role}` lacks capability `{capability}`"))
        } else {
            (true, format!("role `{role}` holds capability `{capability}`"))
        };

        PermissionDecision { allowed, role, capability, threshold, reason }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PermissionDecision {
    pub allowed: bool,
    pub role: Role,
    pub capability: String,
    pub threshold: f32,
    pub reason: String,
}

/// Service handle over the current policy snapshot. Readers clone the `Arc`
/// and keep deciding against it even if a reload lands mid-request.
#[derive(Debug, Default)]
pub struct PermissionEngine {
    policy: RwLock<Arc<PermissionPolicy>>,
}

impl PermissionEngine {
    pub fn new(policy: PermissionPolicy) -> Self {
        Self { policy: RwLock::new(Arc::new(policy)) }
    }

    pub fn snapshot(&self) -> Arc<PermissionPolicy> {
        match self.policy.read() {
            Ok(policy) => Arc::clone(&policy),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    pub fn reload(&self, policy: PermissionPolicy) {
        let next = Arc::new(policy);
        match self.policy.write() {
            Ok(mut current) => *current = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
        tracing::info!(
            event_name = "pipeline.permission.policy_reloaded",
            correlation_id = "policy",
            "permission policy snapshot replaced"
        );
    }

    pub fn role_of(&self, actor: &ActorId) -> Role {
        self.snapshot().role_of(actor)
    }

    pub fn decide(
        &self,
        actor: &ActorId,
        kind: IntentKind,
        confidence: Confidence,
    ) -> PermissionDecision {
        self.snapshot().decide(actor, kind, confidence)
    }

    pub fn authorize(&self, actor: &ActorId, kind: IntentKind, confidence: Confidence) -> bool {
        self.decide(actor, kind, confidence).allowed
    }
}
