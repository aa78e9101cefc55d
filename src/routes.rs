//! Route definitions and router setup
//!
//! Configures all API routes and middleware.

mod change;
mod lineage;
mod run;
mod snapshot;

use crate::config::Settings;
use crate::state::SharedState;
use axum::{
    http::{header, Method},
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    request_id::MakeRequestUuid,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
    ServiceBuilderExt,
};
use tracing::Level;

/// Create the application router with all routes and middleware
pub fn create_router(state: SharedState, settings: &Settings) -> Router {
    // Build CORS layer
    let cors = build_cors_layer(settings);

    // Build tracing/logging layer
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    // Build middleware stack
    let middleware = ServiceBuilder::new()
        .set_x_request_id(MakeRequestUuid)
        .layer(trace_layer)
        .layer(CompressionLayer::new())
        .layer(cors)
        .propagate_x_request_id();

    // Build the router
    Router::new()
        // Health check
        .route("/health", get(health_check))
        // Detection runs
        .route("/api/runs", post(run::start_run).get(run::list_runs))
        .route("/api/runs/{id}", get(run::get_run))
        .route("/api/runs/{id}/cancel", post(run::cancel_run))
        // Detected changes
        .route("/api/changes", get(change::list_changes))
        .route("/api/changes/{id}", get(change::get_change))
        .route("/api/changes/{id}/acknowledge", post(change::acknowledge_change))
        // Snapshots and diffing
        .route("/api/snapshots", post(snapshot::create_snapshot).get(snapshot::list_snapshots))
        .route("/api/snapshots/diff", get(snapshot::diff_against_baseline))
        // Column lineage
        .route("/api/lineage/parse", post(lineage::parse_lineage))
        .route("/api/lineage/{schema}/{object}", get(lineage::get_lineage))
        .route(
            "/api/lineage/{schema}/{object}/dependencies",
            get(lineage::get_dependencies),
        )
        .layer(middleware)
        .with_state(state)
}

/// Build the CORS layer based on configuration
fn build_cors_layer(settings: &Settings) -> CorsLayer {
    let origins: Vec<_> = settings
        .cors
        .allowed_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();

    if origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
    } else {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
    }
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "ok"
}
