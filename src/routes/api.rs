use std::sync::Arc;

use axum::http::HeaderValue;
use axum::{routing::get, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers::{diagnostics, health_check, ready_check};
use crate::websocket::websocket_handler;
use crate::AppState;

/// Create API routes
fn create_api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/v1/health", get(health_check))
        .route("/v1/ready", get(ready_check))
        .route("/v1/diagnostics", get(diagnostics))
}

/// Assemble the full application router: the REST surface under `/api` and
/// the per-room presence socket under `/ws/:room`.
pub fn create_routes(state: Arc<AppState>) -> Router {
    let cors = cors_layer(state.config.cors_origins.as_deref());

    Router::new()
        .nest("/api", create_api_routes())
        .route("/ws/:room", get(websocket_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn cors_layer(origins: Option<&str>) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    match origins {
        Some(origins) => {
            let origins: Vec<HeaderValue> = origins
                .split(',')
                .filter_map(|origin| origin.trim().parse().ok())
                .collect();
            layer.allow_origin(origins)
        }
        None => layer.allow_origin(Any),
    }
}
