//! Rate-limited dispatch of validated commands.
//!
//! Each actor owns a sliding [`RateWindow`] behind its own lock, so two
//! actors never contend while two messages from the same actor are
//! serialized. Every request that reaches the coordinator leaves an audit
//! entry, whether it was throttled, dispatched or failed downstream.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::time::Instant;

use crate::audit::{record_best_effort, AuditEntry, AuditOutcome, AuditSink, AuditStage};
use crate::domain::actor::ActorId;
use crate::domain::intent::{Confidence, IntentKind};
use crate::validation::ValidatedCommand;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub window: Duration,
    pub max_commands: usize,
    pub history_capacity: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self { window: Duration::from_secs(10), max_commands: 20, history_capacity: 500 }
    }
}

/// Timestamps of accepted commands inside the current window.
#[derive(Clone, Debug)]
pub struct RateWindow {
    window: Duration,
    max_commands: usize,
    accepted: VecDeque<Instant>,
}

impl RateWindow {
    pub fn new(window: Duration, max_commands: usize) -> Self {
        Self { window, max_commands, accepted: VecDeque::with_capacity(max_commands) }
    }

    /// Records `now` and returns true if the window still had room.
    pub fn admit(&mut self, now: Instant) -> bool {
        while let Some(oldest) = self.accepted.front() {
            if now.saturating_duration_since(*oldest) >= self.window {
                self.accepted.pop_front();
            } else {
                break;
            }
        }
        if self.accepted.len() >= self.max_commands {
            return false;
        }
        self.accepted.push_back(now);
        true
    }

    pub fn len(&self) -> usize {
        self.accepted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accepted.is_empty()
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ExecutorError {
    #[error("executor unavailable: {0}")]
    Unavailable(String),
    #[error("command failed: {0}")]
    Failed(String),
}

/// Hands a command to the game server. Called once per command; the
/// coordinator never retries.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn dispatch(&self, command: &ValidatedCommand, actor: &ActorId)
        -> Result<(), ExecutorError>;
}

/// Intent context carried alongside a command for auditing.
#[derive(Clone, Debug, PartialEq)]
pub struct ExecutionMeta {
    pub raw_text: String,
    pub intent_kind: IntentKind,
    pub confidence: Confidence,
}

impl ExecutionMeta {
    pub fn new(raw_text: impl Into<String>, intent_kind: IntentKind, confidence: Confidence) -> Self {
        Self { raw_text: raw_text.into(), intent_kind, confidence }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ExecutionReceipt {
    pub accepted: bool,
    pub reason: String,
    pub outcome: AuditOutcome,
    pub stage: AuditStage,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    pub actor: ActorId,
    pub command: String,
    pub accepted_at: DateTime<Utc>,
}

pub struct ExecutionCoordinator {
    config: RateLimitConfig,
    windows: Mutex<HashMap<ActorId, Arc<tokio::sync::Mutex<RateWindow>>>>,
    history: Mutex<VecDeque<HistoryEntry>>,
    executor: Arc<dyn CommandExecutor>,
    audit: Arc<dyn AuditSink>,
}

impl ExecutionCoordinator {
    pub fn new(
        config: RateLimitConfig,
        executor: Arc<dyn CommandExecutor>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            config,
            windows: Mutex::new(HashMap::new()),
            history: Mutex::new(VecDeque::with_capacity(config.history_capacity)),
            executor,
            audit,
        }
    }

    pub fn config(&self) -> RateLimitConfig {
        self.config
    }

    pub fn audit_sink(&self) -> Arc<dyn AuditSink> {
        Arc::clone(&self.audit)
    }

    fn window_for(&self, actor: &ActorId) -> Arc<tokio::sync::Mutex<RateWindow>> {
        let mut windows = match self.windows.lock() {
            Ok(windows) => windows,
            Err(poisoned) => poisoned.into_inner(),
        };
        let entry = windows.entry(actor.clone()).or_insert_with(|| {
            Arc::new(tokio::sync::Mutex::new(RateWindow::new(
                self.config.window,
                self.config.max_commands,
            )))
        });
        Arc::clone(entry)
    }

    pub async fn execute(
        &self,
        command: &ValidatedCommand,
        actor: &ActorId,
        meta: &ExecutionMeta,
    ) -> ExecutionReceipt {
        let admitted = {
            let window = self.window_for(actor);
            let mut window = window.lock().await;
            window.admit(Instant::now())
        };

        if !admitted {
            let reason = format!(
                "rate limit: more than {} commands in {}s",
                self.config.max_commands,
                self.config.window.as_secs()
            );
            tracing::warn!(
                event_name = "pipeline.execution.rate_limited",
                correlation_id = %actor,
                command = command.as_str(),
                "command rejected by rate window"
            );
            return self
                .finish(command, actor, meta, AuditOutcome::Rejected, AuditStage::RateLimit, reason)
                .await;
        }

        self.push_history(command, actor);

        match self.executor.dispatch(command, actor).await {
            Ok(()) => {
                tracing::info!(
                    event_name = "pipeline.execution.dispatched",
                    correlation_id = %actor,
                    command = command.as_str(),
                    intent_kind = meta.intent_kind.as_str(),
                    "command dispatched"
                );
                self.finish(
                    command,
                    actor,
                    meta,
                    AuditOutcome::Success,
                    AuditStage::Execution,
                    "dispatched".to_string(),
                )
                .await
            }
            Err(error) => {
                tracing::warn!(
                    event_name = "pipeline.execution.failed",
                    correlation_id = %actor,
                    command = command.as_str(),
                    error = %error,
                    "executor reported failure"
                );
                self.finish(
                    command,
                    actor,
                    meta,
                    AuditOutcome::Failed,
                    AuditStage::Execution,
                    error.to_string(),
                )
                .await
            }
        }
    }

    /// Audits a dry-run command without touching the rate window or the
    /// executor.
    pub async fn rehearse(
        &self,
        command: &ValidatedCommand,
        actor: &ActorId,
        meta: &ExecutionMeta,
    ) -> ExecutionReceipt {
        self.finish(
            command,
            actor,
            meta,
            AuditOutcome::Simulated,
            AuditStage::Execution,
            "dry run".to_string(),
        )
        .await
    }

    /// Audits a request that was stopped before it reached dispatch.
    pub async fn record_rejection(
        &self,
        actor: &ActorId,
        meta: &ExecutionMeta,
        stage: AuditStage,
        command: Option<&str>,
        reason: impl Into<String>,
    ) {
        let mut entry = AuditEntry::new(
            actor.clone(),
            meta.raw_text.clone(),
            meta.intent_kind,
            meta.confidence,
            AuditOutcome::Rejected,
            stage,
        )
        .with_reason(reason);
        if let Some(command) = command {
            entry = entry.with_command(command);
        }
        record_best_effort(self.audit.as_ref(), entry).await;
    }

    async fn finish(
        &self,
        command: &ValidatedCommand,
        actor: &ActorId,
        meta: &ExecutionMeta,
        outcome: AuditOutcome,
        stage: AuditStage,
        reason: String,
    ) -> ExecutionReceipt {
        let entry = AuditEntry::new(
            actor.clone(),
            meta.raw_text.clone(),
            meta.intent_kind,
            meta.confidence,
            outcome,
            stage,
        )
        .with_command(command.as_str())
        .with_reason(reason.clone());
        record_best_effort(self.audit.as_ref(), entry).await;

        ExecutionReceipt { accepted: outcome == AuditOutcome::Success, reason, outcome, stage }
    }

    fn push_history(&self, command: &ValidatedCommand, actor: &ActorId) {
        let mut history = match self.history.lock() {
            Ok(history) => history,
            Err(poisoned) => poisoned.into_inner(),
        };
        while history.len() >= self.config.history_capacity.max(1) {
            history.pop_front();
        }
        history.push_back(HistoryEntry {
            actor: actor.clone(),
            command: command.as_str().to_string(),
            accepted_at: Utc::now(),
        });
    }

    /// Up to `limit` most recent commands for `actor`, newest last.
    pub fn history(&self, actor: &ActorId, limit: usize) -> Vec<HistoryEntry> {
        let history = match self.history.lock() {
            Ok(history) => history,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut matching: Vec<HistoryEntry> =
            history.iter().rev().filter(|entry| &entry.actor == actor).take(limit).cloned().collect();
        matching.reverse();
        matching
    }
}

/// Executor that keeps dispatched commands in memory. Used by dry tooling
/// and tests; can be switched to fail every call.
#[derive(Clone, Default)]
pub struct RecordingExecutor {
    dispatched: Arc<Mutex<Vec<(ActorId, String)>>>,
    failure: Arc<Mutex<Option<String>>>,
}

impl RecordingExecutor {
    pub fn failing(message: impl Into<String>) -> Self {
        let executor = Self::default();
        executor.fail_with(Some(message.into()));
        executor
    }

    pub fn fail_with(&self, message: Option<String>) {
        match self.failure.lock() {
            Ok(mut failure) => *failure = message,
            Err(poisoned) => *poisoned.into_inner() = message,
        }
    }

    pub fn dispatched(&self) -> Vec<(ActorId, String)> {
        match self.dispatched.lock() {
            Ok(dispatched) => dispatched.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn commands(&self) -> Vec<String> {
        self.dispatched().into_iter().map(|(_, command)| command).collect()
    }
}

#[async_trait]
impl CommandExecutor for RecordingExecutor {
    async fn dispatch(
        &self,
        command: &ValidatedCommand,
        actor: &ActorId,
    ) -> Result<(), ExecutorError> {
        let failure = match self.failure.lock() {
            Ok(failure) => failure.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        if let Some(message) = failure {
            return Err(ExecutorError::Failed(message));
        }
        match self.dispatched.lock() {
            Ok(mut dispatched) => dispatched.push((actor.clone(), command.as_str().to_string())),
            Err(poisoned) => {
                poisoned.into_inner().push((actor.clone(), command.as_str().to_string()))
            }
        }
        Ok(())
    }
}
