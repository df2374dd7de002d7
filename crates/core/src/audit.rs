use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::actor::ActorId;
use crate::domain::intent::{Confidence, IntentKind};

pub const DEFAULT_AUDIT_RETENTION: usize = 1000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    Rejected,
    Failed,
    Simulated,
}

impl AuditOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Rejected => "rejected",
            Self::Failed => "failed",
            Self::Simulated => "simulated",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "success" => Some(Self::Success),
            "rejected" => Some(Self::Rejected),
            "failed" => Some(Self::Failed),
            "simulated" => Some(Self::Simulated),
            _ => None,
        }
    }
}

/// Pipeline stage that produced the entry's outcome.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStage {
    Resolution,
    Permission,
    Synthesis,
    Validation,
    RateLimit,
    Execution,
}

impl AuditStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Resolution => "resolution",
            Self::Permission => "permission",
            Self::Synthesis => "synthesis",
            Self::Validation => "validation",
            Self::RateLimit => "rate_limit",
            Self::Execution => "execution",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "resolution" => Some(Self::Resolution),
            "permission" => Some(Self::Permission),
            "synthesis" => Some(Self::Synthesis),
            "validation" => Some(Self::Validation),
            "rate_limit" => Some(Self::RateLimit),
            "execution" => Some(Self::Execution),
            _ => None,
        }
    }
}

/// Append-only decision record. Built once, never edited.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub entry_id: String,
    pub actor: ActorId,
    pub raw_text: String,
    pub intent_kind: IntentKind,
    pub confidence: Confidence,
    pub command: Option<String>,
    pub outcome: AuditOutcome,
    pub stage: AuditStage,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(
        actor: ActorId,
        raw_text: impl Into<String>,
        intent_kind: IntentKind,
        confidence: Confidence,
        outcome: AuditOutcome,
        stage: AuditStage,
    ) -> Self {
        Self {
            entry_id: Uuid::new_v4().to_string(),
            actor,
            raw_text: raw_text.into(),
            intent_kind,
            confidence,
            command: None,
            outcome,
            stage,
            reason: String::new(),
            occurred_at: Utc::now(),
        }
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }
}

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit storage failed: {0}")]
    Storage(String),
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, entry: AuditEntry) -> Result<(), AuditError>;

    /// Most recent entries, oldest first.
    async fn recent(&self, limit: usize) -> Result<Vec<AuditEntry>, AuditError>;

    /// Most recent entries for one actor, oldest first.
    async fn recent_for_actor(
        &self,
        actor: &ActorId,
        limit: usize,
    ) -> Result<Vec<AuditEntry>, AuditError> {
        let mut entries: Vec<AuditEntry> = self
            .recent(usize::MAX)
            .await?
            .into_iter()
            .filter(|entry| &entry.actor == actor)
            .collect();
        let skip = entries.len().saturating_sub(limit);
        Ok(entries.split_off(skip))
    }
}

/// Records an entry and swallows failures after logging them. Audit writes
/// never fail a request.
pub async fn record_best_effort(sink: &dyn AuditSink, entry: AuditEntry) {
    let entry_id = entry.entry_id.clone();
    if let Err(error) = sink.record(entry).await {
        tracing::warn!(
            event_name = "pipeline.audit.write_failed",
            correlation_id = %entry_id,
            error = %error,
            "audit entry could not be recorded"
        );
    }
}

/// Ring buffer that drops the oldest entry once `capacity` is reached.
#[derive(Clone)]
pub struct InMemoryAuditSink {
    capacity: usize,
    entries: Arc<Mutex<VecDeque<AuditEntry>>>,
}

impl Default for InMemoryAuditSink {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_AUDIT_RETENTION)
    }
}

impl InMemoryAuditSink {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { capacity, entries: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))) }
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        match self.entries.lock() {
            Ok(entries) => entries.iter().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().iter().cloned().collect(),
        }
    }

    pub fn for_actor(&self, actor: &ActorId) -> Vec<AuditEntry> {
        self.entries().into_iter().filter(|entry| &entry.actor == actor).collect()
    }

    /// Case-insensitive match over raw text, command and reason.
    pub fn search(&self, needle: &str) -> Vec<AuditEntry> {
        let needle = needle.to_lowercase();
        self.entries()
            .into_iter()
            .filter(|entry| {
                entry.raw_text.to_lowercase().contains(&needle)
                    || entry.reason.to_lowercase().contains(&needle)
                    || entry.command.as_deref().is_some_and(|c| c.to_lowercase().contains(&needle))
            })
            .collect()
    }

    fn push(&self, entry: AuditEntry) {
        let mut entries = match self.entries.lock() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        };
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditSink {
    async fn record(&self, entry: AuditEntry) -> Result<(), AuditError> {
        self.push(entry);
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<AuditEntry>, AuditError> {
        let entries = self.entries();
        let skip = entries.len().saturating_sub(limit);
        Ok(entries.into_iter().skip(skip).collect())
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::{
        record_best_effort, AuditEntry, AuditError, AuditOutcome, AuditSink, AuditStage,
        InMemoryAuditSink,
    };
    use crate::domain::actor::ActorId;
    use crate::domain::intent::{Confidence, IntentKind};

    fn entry(actor: &str, text: &str) -> AuditEntry {
        AuditEntry::new(
            ActorId::new(actor),
            text,
            IntentKind::GiveItem,
            Confidence::new(0.95),
            AuditOutcome::Success,
            AuditStage::Execution,
        )
    }

    #[tokio::test]
    async fn ring_buffer_drops_oldest_first() {
        let sink = InMemoryAuditSink::with_capacity(2);
        for text in ["first", "second", "third"] {
            sink.record(entry("Steve", text)).await.expect("record");
        }

        let texts: Vec<String> = sink.entries().into_iter().map(|e| e.raw_text).collect();
        assert_eq!(texts, vec!["second", "third"]);

        let recent = sink.recent(1).await.expect("recent");
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].raw_text, "third");
    }

    #[tokio::test]
    async fn filters_by_actor_and_text() {
        let sink = InMemoryAuditSink::default();
        sink.record(entry("Steve", "give me dirt").with_command("give Steve dirt 1"))
            .await
            .expect("record");
        sink.record(entry("Alex", "make it rain").with_reason("role `player` may not run commands"))
            .await
            .expect("record");

        assert_eq!(sink.for_actor(&ActorId::new("Alex")).len(), 1);
        let steve = sink.recent_for_actor(&ActorId::new("Steve"), 5).await.expect("recent");
        assert_eq!(steve.len(), 1);
        assert_eq!(steve[0].command.as_deref(), Some("give Steve dirt 1"));
        assert_eq!(sink.search("DIRT").len(), 1);
        assert_eq!(sink.search("may not run").len(), 1);
        assert!(sink.search("creeper").is_empty());
    }

    struct BrokenSink;

    #[async_trait]
    impl AuditSink for BrokenSink {
        async fn record(&self, _entry: AuditEntry) -> Result<(), AuditError> {
            Err(AuditError::Storage("disk full".into()))
        }

        async fn recent(&self, _limit: usize) -> Result<Vec<AuditEntry>, AuditError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn best_effort_recording_swallows_sink_failures() {
        record_best_effort(&BrokenSink, entry("Steve", "heal me")).await;
    }

    #[test]
    fn outcome_and_stage_names_round_trip() {
        for outcome in [
            AuditOutcome::Success,
            AuditOutcome::Rejected,
            AuditOutcome::Failed,
            AuditOutcome::Simulated,
        ] {
            assert_eq!(AuditOutcome::parse(outcome.as_str()), Some(outcome));
        }
        assert_eq!(AuditStage::parse("rate_limit"), Some(AuditStage::RateLimit));
        assert_eq!(AuditStage::parse("teleport"), None);
    }
}
