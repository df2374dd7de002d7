use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActorId(pub String);

impl ActorId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Closed set of privilege tiers, declared from most to least privileged.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Owner,
    Admin,
    Moderator,
    Builder,
    Vip,
    Player,
}

impl Role {
    pub const ALL: [Role; 6] =
        [Role::Owner, Role::Admin, Role::Moderator, Role::Builder, Role::Vip, Role::Player];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Admin => "admin",
            Self::Moderator => "moderator",
            Self::Builder => "builder",
            Self::Vip => "vip",
            Self::Player => "player",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "owner" => Some(Self::Owner),
            "admin" => Some(Self::Admin),
            "moderator" | "mod" => Some(Self::Moderator),
            "builder" => Some(Self::Builder),
            "vip" => Some(Self::Vip),
            "player" => Some(Self::Player),
            _ => None,
        }
    }

    pub fn lowest() -> Self {
        Self::Player
    }

    pub fn is_lowest(self) -> bool {
        self == Self::lowest()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: ActorId,
    pub role: Role,
    pub last_target: Option<String>,
    pub interaction_count: u64,
}

impl Actor {
    pub fn new(id: ActorId) -> Self {
        Self { id, role: Role::lowest(), last_target: None, interaction_count: 0 }
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    pub fn with_last_target(mut self, target: impl Into<String>) -> Self {
        self.last_target = Some(target.into());
        self
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ActorStoreError {
    #[error("actor store unavailable: {0}")]
    Unavailable(String),
}

/// Profile storage owned outside the pipeline. Only `last_target` and the
/// interaction counter are written back.
#[async_trait]
pub trait ActorStore: Send + Sync {
    async fn get_actor(&self, id: &ActorId) -> Result<Actor, ActorStoreError>;
    async fn set_last_target(&self, id: &ActorId, target: &str) -> Result<(), ActorStoreError>;
    async fn increment_interaction_count(&self, id: &ActorId) -> Result<u64, ActorStoreError>;
}

/// Process-local profiles. Unknown actors are created on first lookup.
#[derive(Clone, Debug, Default)]
pub struct InMemoryActorStore {
    actors: Arc<Mutex<HashMap<ActorId, Actor>>>,
}

impl InMemoryActorStore {
    pub fn with_actors<I>(actors: I) -> Self
    where
        I: IntoIterator<Item = Actor>,
    {
        let actors = actors.into_iter().map(|actor| (actor.id.clone(), actor)).collect();
        Self { actors: Arc::new(Mutex::new(actors)) }
    }

    pub fn snapshot(&self, id: &ActorId) -> Option<Actor> {
        self.with_actors_mut(|actors| actors.get(id).cloned())
    }

    fn with_actors_mut<T>(&self, apply: impl FnOnce(&mut HashMap<ActorId, Actor>) -> T) -> T {
        match self.actors.lock() {
            Ok(mut actors) => apply(&mut *actors),
            Err(poisoned) => apply(&mut *poisoned.into_inner()),
        }
    }
}

#[async_trait]
impl ActorStore for InMemoryActorStore {
    async fn get_actor(&self, id: &ActorId) -> Result<Actor, ActorStoreError> {
        Ok(self.with_actors_mut(|actors| {
            actors.entry(id.clone()).or_insert_with(|| Actor::new(id.clone())).clone()
        }))
    }

    async fn set_last_target(&self, id: &ActorId, target: &str) -> Result<(), ActorStoreError> {
        self.with_actors_mut(|actors| {
            actors.entry(id.clone()).or_insert_with(|| Actor::new(id.clone())).last_target =
                Some(target.to_string());
        });
        Ok(())
    }

    async fn increment_interaction_count(&self, id: &ActorId) -> Result<u64, ActorStoreError> {
        Ok(self.with_actors_mut(|actors| {
            let actor = actors.entry(id.clone()).or_insert_with(|| Actor::new(id.clone()));
            actor.interaction_count += 1;
            actor.interaction_count
        }))
    }
}
