use std::sync::Arc;

use thiserror::Error;
use tracing::info;
use warden_agent::llm::client_from_config;
use warden_agent::{AgentRuntime, AgentServices, LiveWorld, LlmClient, RuntimeSettings};
use warden_core::audit::AuditSink;
use warden_core::config::{AppConfig, ConfigError, LoadOptions};
use warden_core::domain::actor::{ActorStore, InMemoryActorStore};
use warden_core::execution::CommandExecutor;
use warden_db::{connect, migrations, DbPool, SqlAuditSink};

use crate::executor;

pub struct Application {
    pub config: AppConfig,
    pub load_options: LoadOptions,
    pub db_pool: DbPool,
    pub runtime: Arc<AgentRuntime>,
    pub world: Arc<LiveWorld>,
    pub audit: Arc<dyn AuditSink>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("pattern tables failed to compile: {0}")]
    Patterns(String),
}

/// `options` is kept so policy reloads read the same file.
pub async fn bootstrap_with_config(
    config: AppConfig,
    options: LoadOptions,
) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        mode = ?config.pipeline.mode,
        "starting application bootstrap"
    );

    let db_pool = connect(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let audit: Arc<dyn AuditSink> =
        Arc::new(SqlAuditSink::new(db_pool.clone(), config.audit.retention));
    let llm = client_from_config(&config.llm);
    let executor = executor::from_config(&config.executor);
    let application = assemble(config, options, db_pool, audit, llm, executor)?;

    info!(
        event_name = "system.bootstrap.ready",
        correlation_id = "bootstrap",
        "pipeline assembled"
    );
    Ok(application)
}

/// Wires the runtime around already-built collaborators.
pub fn assemble(
    config: AppConfig,
    load_options: LoadOptions,
    db_pool: DbPool,
    audit: Arc<dyn AuditSink>,
    llm: Arc<dyn LlmClient>,
    executor: Arc<dyn CommandExecutor>,
) -> Result<Application, BootstrapError> {
    let world = Arc::new(LiveWorld::default());
    let actors: Arc<dyn ActorStore> = Arc::new(InMemoryActorStore::default());
    let services = AgentServices::from_config(
        &config,
        llm,
        executor,
        Arc::clone(&audit),
        actors,
        world.clone(),
    )
    .map_err(|error| BootstrapError::Patterns(error.to_string()))?;
    let runtime = Arc::new(AgentRuntime::new(services, RuntimeSettings::from(&config.pipeline)));

    Ok(Application { config, load_options, db_pool, runtime, world, audit })
}

#[cfg(test)]
mod tests {
    use warden_core::config::{AppConfig, ConfigOverrides, ExecutionMode, ExecutorKind, LoadOptions};

    use crate::bootstrap::{bootstrap_with_config, Application, BootstrapError};

    async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
        let config = AppConfig::load(options.clone())?;
        bootstrap_with_config(config, options).await
    }

    fn in_memory(overrides: ConfigOverrides) -> LoadOptions {
        LoadOptions {
            config_path: Some("does-not-exist/warden.toml".into()),
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:".to_string()),
                ..overrides
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_migrates_and_assembles_the_pipeline() {
        let app = bootstrap(in_memory(ConfigOverrides {
            pipeline_mode: Some(ExecutionMode::DryRun),
            ..ConfigOverrides::default()
        }))
        .await
        .expect("bootstrap should succeed with in-memory database");

        let (tables,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'audit_entry'",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("audit table present");
        assert_eq!(tables, 1);
        assert_eq!(app.runtime.mode(), ExecutionMode::DryRun);

        app.db_pool.close().await;
    }

    #[tokio::test]
    async fn file_executor_without_path_fails_validation() {
        let result = bootstrap(in_memory(ConfigOverrides {
            executor_kind: Some(ExecutorKind::File),
            ..ConfigOverrides::default()
        }))
        .await;

        let message = result.err().map(|error| error.to_string()).unwrap_or_default();
        assert!(message.contains("executor.path"));
    }
}
