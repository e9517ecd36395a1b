use axum::{
    body::Body,
    extract::State,
    http::{header, Response, StatusCode},
    routing::get,
    Router,
};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::services::ServeDir;

use crate::state::AppState;

/// Create router for static file serving
///
/// `/` serves `<static_dir>/index.html`, falling back to a built-in viewer
/// page; everything else under `/static` comes straight from the directory.
pub fn static_file_router(static_dir: impl Into<PathBuf>) -> Router<Arc<AppState>> {
    let static_dir = static_dir.into();
    Router::new()
        .route("/", get(index_handler))
        .nest_service("/static", ServeDir::new(static_dir))
}

async fn index_handler(State(state): State<Arc<AppState>>) -> Response<Body> {
    let path = PathBuf::from(&state.config.get().web.static_dir).join("index.html");

    let body = match tokio::fs::read(&path).await {
        Ok(data) => Body::from(data),
        Err(e) => {
            tracing::debug!("No index page at {}: {}", path.display(), e);
            Body::from(fallback_html())
        }
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/html; charset=utf-8")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(body)
        .unwrap()
}

/// Minimal viewer used when no index.html is deployed
pub fn fallback_html() -> &'static str {
    r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Vision Relay</title>
    <style>
        body {
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            margin: 0;
            background: #111;
            color: #eee;
            text-align: center;
        }
        h1 { font-size: 1.5rem; margin: 1rem 0; }
        img { max-width: 100%; background: #000; }
        p { color: #888; }
    </style>
</head>
<body>
    <h1>Vision Relay</h1>
    <img src="/video_feed" alt="Live video feed">
    <p>Models: <a href="/api/models">/api/models</a> &middot; Logs: <a href="/api/logs">/api/logs</a></p>
</body>
</html>"#
}
