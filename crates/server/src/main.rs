mod api;
mod bootstrap;
mod executor;
mod health;

use std::time::Duration;

use anyhow::Result;
use tracing_subscriber::EnvFilter;
use warden_core::config::{AppConfig, LoadOptions};

fn init_logging(config: &AppConfig) {
    use warden_core::config::LogFormat::*;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone()));
    let builder = tracing_subscriber::fmt().with_target(false).with_env_filter(filter);

    match config.logging.format {
        Compact => builder.compact().init(),
        Pretty => builder.pretty().init(),
        Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    let options = LoadOptions::default();
    let config = AppConfig::load(options.clone())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config, options).await?;
    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);

    let routes = api::router(api::ApiState::new(
        app.runtime.clone(),
        app.world.clone(),
        app.audit.clone(),
        app.load_options.clone(),
    ))
    .merge(health::router(health::HealthState::new(app.db_pool.clone(), app.config.pipeline.mode)));

    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        mode = ?app.config.pipeline.mode,
        "warden-server listening"
    );

    axum::serve(listener, routes).with_graceful_shutdown(wait_for_shutdown()).await?;

    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        grace_secs = grace.as_secs(),
        "warden-server stopping"
    );
    if tokio::time::timeout(grace, app.db_pool.close()).await.is_err() {
        tracing::warn!(
            event_name = "system.server.shutdown_timeout",
            correlation_id = "shutdown",
            "database pool did not close within the grace period"
        );
    }

    Ok(())
}

async fn wait_for_shutdown() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(
            event_name = "system.server.signal_error",
            correlation_id = "shutdown",
            error = %error,
            "could not listen for shutdown signal"
        );
    }
}
