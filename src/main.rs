//! SchemaWatch API - Schema Change Detection & Impact Analysis
//!
//! Watches a relational database's object catalog for structural change:
//! - Snapshot & diff: point-in-time captures compared against a baseline
//! - Column lineage: procedural SQL parsed into an AST and walked for
//!   column-level data flow, with PII flagging
//! - Impact analysis: downstream dependencies classified and folded into a
//!   0-100 risk score per change
//! - Detection runs: the capture -> diff -> analyze pipeline as a state
//!   machine, fire-and-forget per run

mod catalog;
mod config;
mod detection;
mod error;
mod events;
mod impact;
mod lineage;
mod routes;
mod snapshot;
mod state;

use crate::config::Settings;
use crate::routes::create_router;
use crate::state::AppState;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing subscriber for structured logging
    init_tracing();

    info!("🚀 Starting SchemaWatch - Schema Change Detection Platform...");

    // Load configuration
    let settings = Settings::load()?;
    info!("📋 Configuration loaded successfully");

    // Initialize catalog pool - REQUIRED
    let state = match init_database_pool(&settings).await {
        Ok(pool) => {
            info!("✅ Catalog pool created successfully");
            Arc::new(AppState::new(pool, &settings))
        }
        Err(e) => {
            error!("❌ FATAL: Failed to initialize catalog pool: {}", e);
            error!("DATABASE_URL must be set and the database must be accessible");
            return Err(e);
        }
    };

    // Build the router
    let app = create_router(state, &settings);

    // Create socket address
    let addr = SocketAddr::from((settings.server.host, settings.server.port));

    info!("🌐 Server listening on http://{}", addr);
    info!("");
    info!("📚 API Endpoints:");
    info!("   ─── Detection Runs ───");
    info!("   POST /api/runs                  - Start a detection run");
    info!("   GET  /api/runs                  - List recent runs");
    info!("   GET  /api/runs/{{id}}             - Run status and counters");
    info!("   POST /api/runs/{{id}}/cancel      - Request cancellation");
    info!("");
    info!("   ─── Detected Changes ───");
    info!("   GET  /api/changes               - List detected changes");
    info!("   GET  /api/changes/{{id}}          - Change with impacts and lineage");
    info!("   POST /api/changes/{{id}}/acknowledge - Acknowledge a change");
    info!("");
    info!("   ─── Snapshots (Core Feature) ───");
    info!("   POST /api/snapshots             - Capture a snapshot");
    info!("   GET  /api/snapshots             - List snapshot metadata");
    info!("   GET  /api/snapshots/diff        - Diff current state vs baseline");
    info!("");
    info!("   ─── Column Lineage ───");
    info!("   POST /api/lineage/parse         - Extract lineage from SQL");
    info!("   GET  /api/lineage/{{schema}}/{{object}}              - Stored lineage");
    info!("   GET  /api/lineage/{{schema}}/{{object}}/dependencies - Downstream closure");
    info!("");

    // Create TCP listener and serve
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("👋 Server shutdown complete");
    Ok(())
}

/// Initialize tracing with structured logging
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,schemawatch_api=debug,tower_http=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .compact(),
        )
        .init();
}

/// Initialize the catalog pool from settings
async fn init_database_pool(settings: &Settings) -> anyhow::Result<deadpool_postgres::Pool> {
    use deadpool_postgres::{Config, ManagerConfig, RecyclingMethod};

    let mut cfg = Config::new();
    cfg.host = Some(settings.database.host.clone());
    cfg.port = Some(settings.database.port);
    cfg.user = Some(settings.database.user.clone());
    cfg.password = Some(settings.database.password.clone());
    cfg.dbname = Some(settings.database.database.clone());
    cfg.manager = Some(ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    });

    let pool = cfg
        .create_pool(Some(deadpool_postgres::Runtime::Tokio1), tokio_postgres::NoTls)
        .map_err(|e| anyhow::anyhow!("Failed to create pool: {}", e))?;

    // Fail fast if the catalog is unreachable
    let client = pool.get().await?;
    client.simple_query("SELECT 1").await?;
    drop(client);

    Ok(pool)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("📴 Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            info!("📴 Received terminate signal, initiating graceful shutdown...");
        },
    }
}
