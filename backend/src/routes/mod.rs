//! Route definitions for the GardenWatch monitor

use axum::{middleware, routing::get, Router};

use crate::{handlers, middleware::cron_auth, AppState};

/// Create API routes
pub fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        // Health check (public)
        .route("/health", get(handlers::health_check))
        // Trend insights (public, read-only)
        .route("/insights", get(handlers::get_insights))
        // Scheduler triggers, shared-secret protected
        .nest("/cron", cron_routes(state))
}

/// Batch job triggers
fn cron_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/weather-rules", get(handlers::weather_rules))
        .route("/hazard-scan", get(handlers::hazard_scan))
        .route("/insight-digest", get(handlers::insight_digest))
        .route("/weather-history", get(handlers::weather_history))
        .route_layer(middleware::from_fn_with_state(state, cron_auth))
}
