//! Incoming server - main entry point

use anyhow::Result;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use incoming_common::logging::{init_logging, LogConfig};
use serde_json::json;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use incoming_server::{
    config::Config,
    db, features,
    ingest::{FtpConnector, IngestOrchestrator, JobScheduler, PgBatchLoader, PgImportLedger},
    middleware,
};

#[tokio::main]
async fn main() -> Result<()> {
    let log_config = LogConfig::builder()
        .log_file_prefix("incoming-server")
        .filter_directives("incoming_server=debug,tower_http=debug,sqlx=info")
        .build()
        .merge_env()?;

    // Flushes the file writer on exit
    let _log_guard = init_logging(&log_config)?;

    info!("Starting Incoming server");

    let config = Config::load()?;
    info!(
        host = %config.server.host,
        port = config.server.port,
        ftp = ?config.ingest.ftp,
        "Configuration loaded"
    );

    let pool = db::create_pool(&config.database).await?;
    db::run_migrations(&pool).await?;

    let loader = PgBatchLoader::new(pool.clone(), config.ingest.table_name.clone())?;
    loader.ensure_table().await?;

    let shutdown = CancellationToken::new();

    let orchestrator = Arc::new(
        IngestOrchestrator::new(
            config.ingest.pipeline.clone(),
            Arc::new(FtpConnector::new(config.ingest.ftp.clone())),
            Arc::new(PgImportLedger::new(pool.clone())),
            Arc::new(loader),
        )
        .with_remote_dir(config.ingest.ftp.remote_dir.clone())
        .with_shutdown(shutdown.clone()),
    );

    let scheduler = JobScheduler::new(
        orchestrator.clone(),
        config.ingest.schedule.clone(),
        shutdown.clone(),
    );
    let controller = scheduler.controller();
    let scheduler_handle = scheduler.start();

    let app = create_router(
        pool,
        features::FeatureState {
            orchestrator,
            controller,
        },
        &config,
    );

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    // In-flight runs see the token and stop at their next checkpoint
    shutdown.cancel();
    let grace = Duration::from_secs(config.server.shutdown_timeout_secs);
    match tokio::time::timeout(grace, scheduler_handle).await {
        Ok(Ok(())) => info!("Scheduler stopped"),
        Ok(Err(e)) => error!(error = %e, "Scheduler task failed"),
        Err(_) => warn!(
            timeout_secs = config.server.shutdown_timeout_secs,
            "Scheduler did not stop in time"
        ),
    }

    info!("Server shut down gracefully");
    Ok(())
}

fn create_router(pool: sqlx::PgPool, state: features::FeatureState, config: &Config) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .with_state(pool)
        .merge(features::router(state))
        .layer(middleware::tracing_layer())
        .layer(middleware::cors_layer(&config.cors))
}

/// GET /health
async fn health_check(State(pool): State<sqlx::PgPool>) -> impl IntoResponse {
    match db::health_check(&pool).await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({ "status": "healthy", "database": "connected" })),
        ),
        Err(e) => {
            error!(error = %e, "Health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unhealthy", "database": "disconnected" })),
            )
        }
    }
}

/// Resolves on Ctrl+C or SIGTERM and cancels `shutdown`
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }

    shutdown.cancel();
}
