mod bootstrap;
mod coach;
mod error;
mod feedback;
mod health;
mod routes;
mod state;

use std::time::Duration;

use anyhow::Result;
use coachline_core::config::{AppConfig, LoadOptions};
use tracing_subscriber::EnvFilter;

fn init_logging(config: &AppConfig) {
    use coachline_core::config::LogFormat::*;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.to_ascii_lowercase()));
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
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;
    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        environment = %app.config.telemetry.environment,
        "coachline-server listening"
    );

    axum::serve(listener, routes::router(app.state.clone()))
        .with_graceful_shutdown(wait_for_shutdown())
        .await?;

    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "coachline-server draining"
    );

    // Detached telemetry writes share the grace period; the pool refuses new
    // acquires once closing starts, so it closes only after they drain.
    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    let started = tokio::time::Instant::now();
    if !app.state.recorder.drain(grace).await {
        tracing::warn!(
            event_name = "system.server.telemetry_drain_timeout",
            correlation_id = "shutdown",
            pending_writes = app.state.recorder.pending_writes(),
            grace_secs = grace.as_secs(),
            "telemetry writes still pending at shutdown"
        );
    }
    let remaining = grace.saturating_sub(started.elapsed());
    if tokio::time::timeout(remaining, app.db_pool.close()).await.is_err() {
        tracing::warn!(
            event_name = "system.server.shutdown_timeout",
            correlation_id = "shutdown",
            grace_secs = grace.as_secs(),
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
            "failed to listen for shutdown signal"
        );
    }
}
