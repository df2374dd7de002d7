//! Outbox executors. The server never talks to the game process directly;
//! a wrapper tails the outbox (or the log) and feeds lines to the console.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use warden_core::config::{ExecutorConfig, ExecutorKind};
use warden_core::domain::actor::ActorId;
use warden_core::execution::{CommandExecutor, ExecutorError};
use warden_core::validation::ValidatedCommand;

#[derive(Debug, Default)]
pub struct LogExecutor;

#[async_trait]
impl CommandExecutor for LogExecutor {
    async fn dispatch(
        &self,
        command: &ValidatedCommand,
        actor: &ActorId,
    ) -> Result<(), ExecutorError> {
        tracing::info!(
            event_name = "pipeline.executor.command",
            correlation_id = %actor,
            command = command.as_str(),
            "command ready for console"
        );
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct OutboxLine<'a> {
    actor: &'a str,
    command: &'a str,
    queued_at: String,
}

/// Appends one JSON object per command to a file.
#[derive(Debug)]
pub struct FileOutboxExecutor {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileOutboxExecutor {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), write_lock: Mutex::new(()) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CommandExecutor for FileOutboxExecutor {
    async fn dispatch(
        &self,
        command: &ValidatedCommand,
        actor: &ActorId,
    ) -> Result<(), ExecutorError> {
        let line = OutboxLine {
            actor: actor.as_str(),
            command: command.as_str(),
            queued_at: Utc::now().to_rfc3339(),
        };
        let mut encoded = serde_json::to_string(&line)
            .map_err(|error| ExecutorError::Failed(format!("outbox encode: {error}")))?;
        encoded.push('\n');

        let _guard = self.write_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|error| {
                ExecutorError::Unavailable(format!("{}: {error}", self.path.display()))
            })?;
        file.write_all(encoded.as_bytes())
            .await
            .map_err(|error| ExecutorError::Failed(format!("outbox write: {error}")))?;
        file.flush().await.map_err(|error| ExecutorError::Failed(format!("outbox flush: {error}")))
    }
}

/// Config validation guarantees `path` is present for the file kind.
pub fn from_config(config: &ExecutorConfig) -> Arc<dyn CommandExecutor> {
    match (config.kind, &config.path) {
        (ExecutorKind::File, Some(path)) => Arc::new(FileOutboxExecutor::new(path.clone())),
        _ => Arc::new(LogExecutor),
    }
}

#[cfg(test)]
mod tests {
    use warden_core::domain::actor::ActorId;
    use warden_core::domain::command::Command;
    use warden_core::execution::CommandExecutor;
    use warden_core::validation::Validator;

    use super::FileOutboxExecutor;

    #[tokio::test]
    async fn file_outbox_appends_one_json_line_per_command() {
        let dir = tempfile::tempdir().expect("tempdir");
        let executor = FileOutboxExecutor::new(dir.path().join("outbox.jsonl"));
        let validator = Validator::new().expect("validator");
        let steve = ActorId::new("Steve");

        for text in ["give Steve dirt 64", "time set 1000"] {
            let command = validator.check(&Command::new(text)).expect("valid");
            executor.dispatch(&command, &steve).await.expect("dispatch");
        }

        let written = std::fs::read_to_string(executor.path()).expect("read outbox");
        let lines: Vec<serde_json::Value> = written
            .lines()
            .map(|line| serde_json::from_str(line).expect("json line"))
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["actor"], "Steve");
        assert_eq!(lines[1]["command"], "time set 1000");
    }

    #[tokio::test]
    async fn unwritable_outbox_reports_unavailable() {
        let dir = tempfile::tempdir().expect("tempdir");
        let executor = FileOutboxExecutor::new(dir.path().join("missing").join("outbox.jsonl"));
        let validator = Validator::new().expect("validator");
        let command = validator.check(&Command::new("save-all")).expect("valid");

        let error = executor.dispatch(&command, &ActorId::new("Steve")).await.expect_err("fails");
        assert!(error.to_string().starts_with("executor unavailable"));
    }
}
