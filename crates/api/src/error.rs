use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::header::ETAG;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tablesync_core::error::CoreError;
use tablesync_core::types::Version;

use crate::conditional;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] for domain errors and adds the sync-specific and
/// HTTP-specific variants. Implements [`IntoResponse`] to produce consistent
/// JSON error responses of the form `{ "error", "code" [, "entity"] }`.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `tablesync_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The caller's version is stale. Carries the current server entity so
    /// the client can merge without another round trip.
    #[error("Version mismatch: current version is {current}")]
    VersionMismatch {
        entity: serde_json::Value,
        current: Version,
        /// The stale version arrived in `If-Match`: answer 412 instead of 409.
        precondition: bool,
    },

    /// Create with an id that is already taken. Carries the existing entity.
    #[error("Entity {id} already exists")]
    AlreadyExists {
        id: String,
        entity: serde_json::Value,
    },

    /// Storage stayed unreachable after the retry budget was spent.
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// An internal error with a human-readable message.
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Core(CoreError::Validation(rejection.body_text()))
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::Core(CoreError::Validation(rejection.body_text()))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut entity = None;
        let mut etag = None;

        let (status, code, message) = match self {
            // --- CoreError variants ---
            AppError::Core(core) => match core {
                CoreError::NotFound { entity, id } => (
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    format!("{entity} with id {id} not found"),
                ),
                CoreError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg),
                CoreError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
                CoreError::Internal(msg) => {
                    tracing::error!(error = %msg, "Internal core error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "INTERNAL_ERROR",
                        "An internal error occurred".to_string(),
                    )
                }
            },

            // --- Sync conflicts ---
            AppError::VersionMismatch {
                entity: current_entity,
                current,
                precondition,
            } => {
                let status = if precondition {
                    StatusCode::PRECONDITION_FAILED
                } else {
                    StatusCode::CONFLICT
                };
                let message = format!("Version mismatch: current version is {current}");
                entity = Some(current_entity);
                etag = Some(current);
                (status, "VERSION_MISMATCH", message)
            }
            AppError::AlreadyExists {
                id,
                entity: existing,
            } => {
                entity = Some(existing);
                (
                    StatusCode::CONFLICT,
                    "CONFLICT",
                    format!("Entity with id {id} already exists"),
                )
            }

            // --- Storage ---
            AppError::StorageUnavailable(msg) => {
                tracing::warn!(error = %msg, "Storage unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "STORAGE_UNAVAILABLE",
                    "Storage is temporarily unavailable".to_string(),
                )
            }
            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let mut body = json!({
            "error": message,
            "code": code,
        });
        if let Some(entity) = entity {
            body["entity"] = entity;
        }

        let mut response = (status, axum::Json(body)).into_response();
        if let Some(value) = etag.and_then(|v| conditional::etag(&v).ok()) {
            response.headers_mut().insert(ETAG, value);
        }
        response
    }
}
