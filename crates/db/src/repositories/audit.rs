use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};
use warden_core::audit::{AuditEntry, AuditError, AuditOutcome, AuditSink, AuditStage};
use warden_core::domain::actor::ActorId;
use warden_core::domain::intent::{Confidence, IntentKind};

use super::RepositoryError;
use crate::DbPool;

const SELECT_COLUMNS: &str = "SELECT
        entry_id,
        actor,
        raw_text,
        intent_kind,
        confidence,
        command,
        outcome,
        stage,
        reason,
        occurred_at
     FROM audit_entry";

/// Durable audit trail. Keeps at most `retention` rows, dropping the oldest
/// after each insert.
pub struct SqlAuditSink {
    pool: DbPool,
    retention: usize,
}

impl SqlAuditSink {
    pub fn new(pool: DbPool, retention: usize) -> Self {
        Self { pool, retention: retention.max(1) }
    }

    pub async fn insert(&self, entry: &AuditEntry) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO audit_entry (
                entry_id,
                actor,
                raw_text,
                intent_kind,
                confidence,
                command,
                outcome,
                stage,
                reason,
                occurred_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&entry.entry_id)
        .bind(entry.actor.as_str())
        .bind(&entry.raw_text)
        .bind(entry.intent_kind.as_str())
        .bind(f64::from(entry.confidence.value()))
        .bind(entry.command.as_deref())
        .bind(entry.outcome.as_str())
        .bind(entry.stage.as_str())
        .bind(&entry.reason)
        .bind(entry.occurred_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Deletes everything older than the newest `retention` rows. Returns the
    /// number of rows removed.
    pub async fn prune(&self) -> Result<u64, RepositoryError> {
        let keep = i64::try_from(self.retention).unwrap_or(i64::MAX);
        let result = sqlx::query(
            "DELETE FROM audit_entry
             WHERE seq <= (
                SELECT seq FROM audit_entry ORDER BY seq DESC LIMIT 1 OFFSET ?
             )",
        )
        .bind(keep)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn count(&self) -> Result<i64, RepositoryError> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM audit_entry")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get::<i64, _>("count")?)
    }

    pub async fn latest(&self, limit: usize) -> Result<Vec<AuditEntry>, RepositoryError> {
        let rows = sqlx::query(&format!("{SELECT_COLUMNS} ORDER BY seq DESC LIMIT ?"))
            .bind(limit_param(limit))
            .fetch_all(&self.pool)
            .await?;
        oldest_first(rows)
    }

    pub async fn latest_for_actor(
        &self,
        actor: &ActorId,
        limit: usize,
    ) -> Result<Vec<AuditEntry>, RepositoryError> {
        let rows =
            sqlx::query(&format!("{SELECT_COLUMNS} WHERE actor = ? ORDER BY seq DESC LIMIT ?"))
                .bind(actor.as_str())
                .bind(limit_param(limit))
                .fetch_all(&self.pool)
                .await?;
        oldest_first(rows)
    }
}

#[async_trait]
impl AuditSink for SqlAuditSink {
    async fn record(&self, entry: AuditEntry) -> Result<(), AuditError> {
        self.insert(&entry).await?;
        let pruned = self.prune().await?;
        if pruned > 0 {
            tracing::debug!(
                event_name = "pipeline.audit.pruned",
                correlation_id = %entry.entry_id,
                pruned,
                retention = self.retention,
                "audit retention applied"
            );
        }
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<AuditEntry>, AuditError> {
        Ok(self.latest(limit).await?)
    }

    async fn recent_for_actor(
        &self,
        actor: &ActorId,
        limit: usize,
    ) -> Result<Vec<AuditEntry>, AuditError> {
        Ok(self.latest_for_actor(actor, limit).await?)
    }
}

fn limit_param(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

fn oldest_first(rows: Vec<SqliteRow>) -> Result<Vec<AuditEntry>, RepositoryError> {
    let mut entries = rows.into_iter().map(entry_from_row).collect::<Result<Vec<_>, _>>()?;
    entries.reverse();
    Ok(entries)
}

fn entry_from_row(row: SqliteRow) -> Result<AuditEntry, RepositoryError> {
    let intent_kind: String = row.try_get("intent_kind")?;
    let outcome: String = row.try_get("outcome")?;
    let stage: String = row.try_get("stage")?;
    let occurred_at: String = row.try_get("occurred_at")?;

    Ok(AuditEntry {
        entry_id: row.try_get("entry_id")?,
        actor: ActorId::new(row.try_get::<String, _>("actor")?),
        raw_text: row.try_get("raw_text")?,
        intent_kind: IntentKind::parse(&intent_kind)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown intent kind `{intent_kind}`")))?,
        confidence: Confidence::new(row.try_get::<f64, _>("confidence")? as f32),
        command: row.try_get("command")?,
        outcome: AuditOutcome::parse(&outcome)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown outcome `{outcome}`")))?,
        stage: AuditStage::parse(&stage)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown stage `{stage}`")))?,
        reason: row.try_get("reason")?,
        occurred_at: DateTime::parse_from_rfc3339(&occurred_at)
            .map(|at| at.with_timezone(&Utc))
            .map_err(|error| RepositoryError::Decode(format!("occurred_at: {error}")))?,
    })
}
