use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::plugin::PluginError;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Plugin error: {0}")]
    Plugin(#[from] PluginError),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Video error: {0}")]
    VideoError(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
}

/// Error response body (unified success format)
#[derive(Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Plugin(PluginError::NotFound(_)) => StatusCode::NOT_FOUND,
            AppError::Plugin(_) => StatusCode::BAD_REQUEST,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            success: false,
            message: self.to_string(),
        };

        tracing::error!(
            status = status.as_u16(),
            error_message = %body.message,
            "Request failed"
        );

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plugin_errors_map_to_status() {
        let not_found = AppError::from(PluginError::NotFound("ghost".into()));
        assert_eq!(not_found.status_code(), StatusCode::NOT_FOUND);

        let load = AppError::from(PluginError::LoadError {
            id: "broken".into(),
            reason: "bad manifest".into(),
        });
        assert_eq!(load.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_error_body_is_unified() {
        let response = AppError::ServiceUnavailable("no frame".into()).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
