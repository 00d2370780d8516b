use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use super::handlers::{self, AppState};

/// Create the main router with all routes
pub fn create_router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        .route("/usage/today", get(handlers::usage_today))
        .route("/usage/cost-report", get(handlers::cost_report))
        .route("/usage/:date", get(handlers::usage_for_date))
        .route("/sessions/active", get(handlers::active_sessions));

    // The dashboard is served from a different origin
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .nest("/api", api_routes)
        .route("/health", get(handlers::health_check))
        .layer(cors)
        .with_state(state)
}
