//! Logingest Server - Main entry point

use anyhow::{Context, Result};
use axum::Router;
use logingest_common::logging::LogSettings;
use sqlx::postgres::PgPoolOptions;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::signal;
use tower_http::compression::CompressionLayer;
use tracing::info;

use logingest_server::{
    config::{Config, StoreBackend},
    features::{self, AppState, IntakeSettings},
    ingest::LogProcessor,
    middleware,
    queue::LocalQueue,
    store::{LogStore, MemoryLogStore, PgLogStore},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Environment variables take precedence over these defaults
    let log_settings = LogSettings::new("logingest-server")
        .with_directives("logingest_server=debug,tower_http=debug,sqlx=warn")
        .merge_env()?;

    let _log_guard = log_settings.init()?;

    info!("Starting Logingest Server");

    let config = Config::load()?;
    info!(
        "Configuration loaded - server will bind to {}:{}",
        config.server.host, config.server.port
    );

    let store = connect_store(&config).await?;

    tokio::fs::create_dir_all(&config.ingest.uploads_dir)
        .await
        .with_context(|| {
            format!(
                "Failed to create uploads directory {}",
                config.ingest.uploads_dir.display()
            )
        })?;

    // Job queue and the worker pool that drains it
    let queue = LocalQueue::new(config.ingest.queue_settings());
    let processor = LogProcessor::new(store.clone(), config.ingest.processor_settings())
        .context("Failed to build log processor")?;
    let dispatcher = queue.start(Arc::new(processor));
    info!(
        concurrency = config.ingest.worker_concurrency,
        "Ingestion workers started"
    );

    let state = AppState {
        store,
        queue: Arc::new(queue.clone()),
        intake: IntakeSettings::from_config(&config),
    };

    let app = create_router(state, &config);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!(
        "Waiting up to {} seconds for running jobs",
        config.server.shutdown_timeout_secs
    );
    queue
        .shutdown(Duration::from_secs(config.server.shutdown_timeout_secs))
        .await;
    dispatcher.abort();

    info!("Server shut down gracefully");

    Ok(())
}

/// Build the configured store; Postgres runs pending migrations first.
async fn connect_store(config: &Config) -> Result<Arc<dyn LogStore>> {
    match config.store {
        StoreBackend::Postgres => {
            let db_pool = PgPoolOptions::new()
                .max_connections(config.database.max_connections)
                .min_connections(config.database.min_connections)
                .acquire_timeout(Duration::from_secs(config.database.connect_timeout_secs))
                .idle_timeout(Duration::from_secs(config.database.idle_timeout_secs))
                .connect(&config.database.url)
                .await
                .context("Failed to connect to database")?;

            info!("Database connection pool established");

            sqlx::migrate!("../../migrations")
                .run(&db_pool)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to run migrations: {}", e))?;

            info!("Database migrations completed");

            Ok(Arc::new(PgLogStore::new(db_pool)))
        },
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store; data is lost on restart");
            Ok(Arc::new(MemoryLogStore::new()))
        },
    }
}

/// Create the application router with all routes and middleware
fn create_router(state: AppState, config: &Config) -> Router {
    features::router(state)
        // Apply layers from innermost to outermost
        .layer(CompressionLayer::new())
        .layer(middleware::tracing_layer())
        .layer(middleware::cors_layer(&config.cors))
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        },
    }
}
