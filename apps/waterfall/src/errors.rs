use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::layout::LayoutError;
use crate::pagination::LoadError;

/// Service-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Gone: {0}")]
    Gone(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<LayoutError> for AppError {
    fn from(e: LayoutError) -> Self {
        AppError::Validation(e.to_string())
    }
}

impl From<LoadError> for AppError {
    fn from(e: LoadError) -> Self {
        match e {
            LoadError::Busy => AppError::Conflict(e.to_string()),
            LoadError::Exhausted => AppError::Gone(e.to_string()),
            LoadError::Transport { .. } | LoadError::Parse { .. } => {
                AppError::Upstream(e.to_string())
            }
            LoadError::Internal { .. } => AppError::Internal(anyhow::Error::new(e)),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "PAGE_LOADING", msg.clone()),
            AppError::Gone(msg) => (StatusCode::GONE, "NO_MORE_PAGES", msg.clone()),
            AppError::Upstream(msg) => {
                tracing::warn!("Upstream error: {msg}");
                (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR", msg.clone())
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SourceError;

    fn status_of(e: AppError) -> StatusCode {
        e.into_response().status()
    }

    #[test]
    fn test_load_errors_map_to_statuses() {
        assert_eq!(status_of(LoadError::Busy.into()), StatusCode::CONFLICT);
        assert_eq!(status_of(LoadError::Exhausted.into()), StatusCode::GONE);
        assert_eq!(
            status_of(LoadError::Parse { page: 3 }.into()),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_of(
                LoadError::Transport {
                    page: 0,
                    source: SourceError::Unavailable("down".to_string()),
                }
                .into()
            ),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_layout_error_is_validation() {
        assert_eq!(
            status_of(LayoutError::InvalidColumnCount.into()),
            StatusCode::BAD_REQUEST
        );
    }
}
