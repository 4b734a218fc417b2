use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use pixelforge_db::queue::PgTaskQueue;
use pixelforge_db::store::PgJobStore;
use pixelforge_events::PgNotifyBus;
use pixelforge_storage::S3Gateway;
use pixelforge_worker::config::WorkerConfig;
use pixelforge_worker::converter::ConversionWorker;
use pixelforge_worker::publisher::StatusPublisher;
use pixelforge_worker::runner::Runner;
use pixelforge_worker::supervisor::Supervisor;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pixelforge_worker=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = WorkerConfig::from_env();
    tracing::info!(
        concurrency = config.concurrency,
        max_attempts = config.retry.max_attempts,
        "Loaded worker configuration"
    );

    // --- Database ---
    let pool = pixelforge_db::create_pool(&config.database_url, config.max_db_connections())
        .await
        .context("failed to connect to database")?;
    pixelforge_db::health_check(&pool)
        .await
        .context("database health check failed")?;
    pixelforge_db::run_migrations(&pool)
        .await
        .context("failed to run database migrations")?;
    tracing::info!("Database ready");

    // --- Collaborators ---
    let store = Arc::new(PgJobStore::new(pool.clone()));
    let queue = Arc::new(PgTaskQueue::new(pool.clone(), config.retry));
    let bus = Arc::new(PgNotifyBus::new(pool.clone()));
    let blobs = Arc::new(S3Gateway::connect(&config.storage).await);
    let publisher = StatusPublisher::new(bus);

    let worker = Arc::new(ConversionWorker::new(
        store.clone(),
        blobs,
        publisher.clone(),
    ));
    let runner = Arc::new(Runner::new(queue.clone(), worker, config.poll_interval));
    let supervisor = Supervisor::new(store, queue, publisher, config.supervisor);

    // --- Run ---
    let cancel = CancellationToken::new();
    let supervisor_handle = tokio::spawn(supervisor.run(cancel.clone()));
    let runner_handle = tokio::spawn(runner.run(config.concurrency, cancel.clone()));

    shutdown_signal().await;
    cancel.cancel();

    // In-flight conversions finish before their loop exits.
    if let Err(e) = runner_handle.await {
        tracing::error!(error = %e, "Queue runner task failed");
    }
    let _ = tokio::time::timeout(Duration::from_secs(5), supervisor_handle).await;

    pool.close().await;
    tracing::info!("Worker shut down");
    Ok(())
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), draining in-flight tasks");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, draining in-flight tasks");
        }
    }
}
