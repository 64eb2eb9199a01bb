//! Application setup and server configuration.

use axum::{
    extract::Extension,
    http::{header::CONTENT_TYPE, Method},
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::domains::smart_media::activities::UpdateOrchestrator;
use crate::server::routes::{get_post_handler, health_handler, refresh_handler};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: UpdateOrchestrator,
}

/// Build the Axum application router
pub fn build_app(orchestrator: UpdateOrchestrator) -> Router {
    let app_state = AppState { orchestrator };

    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE]);

    Router::new()
        .route("/health", get(health_handler))
        .route("/smart-media/:post_id", get(get_post_handler))
        .route("/smart-media/:post_id/refresh", post(refresh_handler))
        // Middleware layers (applied in reverse order - last added runs first)
        .layer(Extension(app_state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
