use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use warden_core::config::DatabaseConfig;

pub type DbPool = sqlx::SqlitePool;

pub async fn connect(config: &DatabaseConfig) -> Result<DbPool, sqlx::Error> {
    connect_with_settings(&config.url, config.max_connections, config.timeout_secs).await
}

/// Opens the pool, creating the database file when missing. In-memory URLs
/// keep their single shared connection alive by capping the pool at one.
pub async fn connect_with_settings(
    database_url: &str,
    max_connections: u32,
    timeout_secs: u64,
) -> Result<DbPool, sqlx::Error> {
    let options: SqliteConnectOptions = database_url.parse()?;
    let options = options
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));

    let in_memory = database_url.contains(":memory:");
    let max_connections = if in_memory { 1 } else { max_connections.max(1) };

    let mut pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(timeout_secs.max(1)));
    if in_memory {
        pool = pool.idle_timeout(None).max_lifetime(None);
    }
    pool.connect_with(options).await
}

#[cfg(test)]
mod tests {
    use sqlx::Row;

    use super::connect_with_settings;

    #[tokio::test]
    async fn file_database_runs_in_wal_mode() {
        let dir = tempfile::tempdir().expect("tempdir");
        let url = format!("sqlite://{}", dir.path().join("warden.db").display());
        let pool = connect_with_settings(&url, 2, 5).await.expect("connect");

        let mode = sqlx::query("PRAGMA journal_mode")
            .fetch_one(&pool)
            .await
            .expect("journal mode")
            .get::<String, _>(0);
        assert_eq!(mode.to_lowercase(), "wal");

        let timeout = sqlx::query("PRAGMA busy_timeout")
            .fetch_one(&pool)
            .await
            .expect("busy timeout")
            .get::<i64, _>(0);
        assert_eq!(timeout, 5000);
    }
}
