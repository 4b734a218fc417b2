use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use pixelforge_db::queue::{PgTaskQueue, RetryPolicy};
use pixelforge_db::store::{PgJobStore, PgUserStore};
use pixelforge_events::PgNotifyBus;
use pixelforge_storage::{BlobGateway, S3Gateway, StorageConfig};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pixelforge_api::app::build_app;
use pixelforge_api::config::ServerConfig;
use pixelforge_api::service::JobService;
use pixelforge_api::state::AppState;
use pixelforge_api::ws::{self, ListenerExit, LiveRegistry};

/// Request handlers plus the fan-out listener's dedicated connection.
const MAX_DB_CONNECTIONS: u32 = 20;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pixelforge_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    let storage_config = StorageConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = pixelforge_db::create_pool(&database_url, MAX_DB_CONNECTIONS)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    pixelforge_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database health check passed");

    pixelforge_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    // --- Blob storage ---
    let blobs = S3Gateway::connect(&storage_config).await;
    blobs
        .ensure_buckets()
        .await
        .expect("Failed to create storage buckets");
    tracing::info!(
        upload = %storage_config.upload_bucket,
        converted = %storage_config.converted_bucket,
        "Storage buckets ready"
    );

    // --- Job service ---
    let jobs = Arc::new(JobService::new(
        Arc::new(PgJobStore::new(pool.clone())),
        Arc::new(PgTaskQueue::new(pool.clone(), RetryPolicy::default())),
        Arc::new(blobs),
        config.download_url_ttl,
    ));

    // --- Live connections ---
    let registry = Arc::new(LiveRegistry::new());
    let heartbeat_handle = ws::start_heartbeat(Arc::clone(&registry));

    // --- Fan-out listener ---
    let bus = Arc::new(PgNotifyBus::new(pool.clone()));
    let listener_cancel = CancellationToken::new();
    let listener_handle =
        ws::start_fanout_listener(bus, Arc::clone(&registry), listener_cancel.clone())
            .await
            .expect("Failed to subscribe to the fan-out bus");

    // Losing the listener means this process can no longer notify anyone;
    // stop serving instead of staying up deaf.
    let listener_lost = CancellationToken::new();
    let watch_lost = listener_lost.clone();
    let watcher_handle = tokio::spawn(async move {
        match listener_handle.await {
            Ok(ListenerExit::Cancelled) => {}
            Ok(ListenerExit::BusClosed) => {
                tracing::error!("Fan-out listener exited; shutting down");
                watch_lost.cancel();
            }
            Err(e) => {
                tracing::error!(error = %e, "Fan-out listener panicked; shutting down");
                watch_lost.cancel();
            }
        }
    });

    // --- App state ---
    let state = AppState {
        config: Arc::new(config.clone()),
        jobs,
        users: Arc::new(PgUserStore::new(pool.clone())),
        registry: Arc::clone(&registry),
    };
    let app = build_app(state);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(listener_lost.clone()))
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    listener_cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), watcher_handle).await;
    tracing::info!("Fan-out listener stopped");

    let ws_count = registry.connection_count();
    tracing::info!(ws_count, "Closing remaining WebSocket connections");
    registry.shutdown_all();

    heartbeat_handle.abort();
    tracing::info!("Heartbeat task stopped");

    pool.close().await;

    if listener_lost.is_cancelled() {
        tracing::error!("Exiting after losing the fan-out listener");
        std::process::exit(1);
    }
    tracing::info!("Graceful shutdown complete");
}

/// Wait for SIGINT, SIGTERM (on Unix), or loss of the fan-out listener.
async fn shutdown_signal(listener_lost: CancellationToken) {
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
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
        () = listener_lost.cancelled() => {
            tracing::info!("Fan-out listener lost, starting shutdown");
        }
    }
}
