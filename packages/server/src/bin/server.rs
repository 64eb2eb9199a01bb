//! Smart media server
//!
//! Serves the refresh API and runs the cron sweep that keeps posts current.

use std::sync::Arc;

use anyhow::{Context, Result};
use smart_media_core::domains::smart_media::activities::UpdateOrchestrator;
use smart_media_core::kernel::jobs::TaskQueue;
use smart_media_core::kernel::scheduled_tasks::start_scheduler;
use smart_media_core::kernel::ServerDeps;
use smart_media_core::server::build_app;
use smart_media_core::Config;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,smart_media_core=debug,sqlx=warn".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_line_number(true),
        )
        .init();

    tracing::info!("Starting Smart Media Server");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!(
        max_concurrent = config.queue.max_concurrent,
        backoff = ?config.queue.retry.backoff,
        max_attempts = ?config.queue.retry.max_attempts,
        "Configuration loaded"
    );

    // Connect to database, run migrations, build clients
    let deps = Arc::new(ServerDeps::connect(&config).await?);

    let queue = TaskQueue::new(config.queue.clone());
    let orchestrator = UpdateOrchestrator::new(deps.clone(), queue, config.refresh);

    let mut scheduler = start_scheduler(orchestrator.clone(), &config.refresh_cron)
        .await
        .context("Failed to start scheduler")?;

    let app = build_app(orchestrator);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("Server listening on {}", addr);
    tracing::info!("Health check: http://localhost:{}/health", config.port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Shutting down");
    if let Err(e) = scheduler.shutdown().await {
        tracing::warn!(error = %e, "Scheduler did not shut down cleanly");
    }
    deps.shutdown().await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
