//! Route table.

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tower_http::trace::TraceLayer;

use crate::server::AppState;
use crate::server::handlers;

/// Ingestion API routes.
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/data", get(handlers::list).post(handlers::submit))
        .route("/sensors", axum::routing::post(handlers::submit))
        .route("/latest", get(handlers::latest))
        .route("/api/dashboard", get(handlers::dashboard_json))
        .route("/healthz", get(handlers::healthz))
}

/// Dashboard page routes.
pub fn ui_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(handlers::dashboard_page))
        .route("/dashboard", get(handlers::static_dashboard))
}

/// Full application router with access logging.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(api_routes())
        .merge(ui_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
