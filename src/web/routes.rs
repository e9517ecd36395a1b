use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers;
use crate::state::AppState;

/// Create the main application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/status", get(handlers::status))
        .route("/models", get(handlers::list_models))
        .route("/select_model", post(handlers::select_model))
        .route(
            "/logs",
            get(handlers::get_logs).delete(handlers::clear_logs),
        );

    // Stream endpoints live at the root so existing pages can embed them
    let stream_routes = Router::new()
        .route("/video_feed", get(handlers::video_feed))
        .route("/snapshot", get(handlers::snapshot));

    let static_dir = state.config.get().web.static_dir.clone();
    let static_routes = super::static_files::static_file_router(static_dir);

    Router::new()
        .nest("/api", api_routes)
        .merge(stream_routes)
        .merge(static_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
