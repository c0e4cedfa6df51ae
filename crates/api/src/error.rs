use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use virtsync_core::error::CoreError;
use virtsync_pipeline::SyncError;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] and [`SyncError`] and adds HTTP-specific variants.
/// Implements [`IntoResponse`] to produce consistent JSON error responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `virtsync_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// An error raised by the sync pipeline.
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let AppError::Sync(SyncError::Throttled { remaining_secs }) = &self {
            let body = json!({
                "error": self.to_string(),
                "code": "THROTTLED",
                "remaining_seconds": remaining_secs,
            });
            return (StatusCode::TOO_MANY_REQUESTS, axum::Json(body)).into_response();
        }

        let (status, code, message) = match &self {
            AppError::Core(core) => match core {
                CoreError::Validation(msg) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
                }
                CoreError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
            },

            AppError::Sync(err) => classify_sync_error(err),

            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

fn internal(msg: &str) -> (StatusCode, &'static str, String) {
    tracing::error!(error = %msg, "Internal error");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "An internal error occurred".to_string(),
    )
}

/// Classify a pipeline error into an HTTP status, error code, and message.
///
/// - Unknown or inactive platforms map to 404.
/// - Unknown sync types map to 400.
/// - A store that cannot be reached maps to 503.
/// - Everything else maps to 500 with a sanitized message.
fn classify_sync_error(err: &SyncError) -> (StatusCode, &'static str, String) {
    match err {
        SyncError::NotFound { .. } => (StatusCode::NOT_FOUND, "NOT_FOUND", err.to_string()),
        SyncError::InvalidSyncType(_) => {
            (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", err.to_string())
        }
        SyncError::Throttled { .. } => {
            (StatusCode::TOO_MANY_REQUESTS, "THROTTLED", err.to_string())
        }
        SyncError::Persistence(store) if store.is_unavailable() => {
            tracing::error!(error = %store, "Store unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "SERVICE_UNAVAILABLE",
                "The database is unavailable".to_string(),
            )
        }
        other => internal(&other.to_string()),
    }
}
