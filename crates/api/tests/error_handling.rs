//! Tests for `AppError` → HTTP response mapping.
//!
//! These tests verify that each `AppError` variant produces the correct HTTP
//! status code, error code, and message. They do NOT need an HTTP server --
//! they call `IntoResponse` directly on `AppError` values.

use axum::http::header::ETAG;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use http_body_util::BodyExt;
use serde_json::json;
use tablesync_api::error::AppError;
use tablesync_core::error::CoreError;
use tablesync_core::types::Version;

/// Helper: convert an `AppError` into its status code, ETag and parsed JSON body.
async fn error_to_response(err: AppError) -> (StatusCode, Option<String>, serde_json::Value) {
    let response = err.into_response();
    let status = response.status();
    let etag = response
        .headers()
        .get(ETAG)
        .map(|v| v.to_str().unwrap().to_string());
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    (status, etag, json)
}

// ---------------------------------------------------------------------------
// Test: CoreError::NotFound maps to 404 with NOT_FOUND code
// ---------------------------------------------------------------------------

#[tokio::test]
async fn not_found_error_returns_404() {
    let err = AppError::Core(CoreError::NotFound {
        entity: "KitchenSink",
        id: "abc".into(),
    });

    let (status, _, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "NOT_FOUND");
    assert_eq!(json["error"], "KitchenSink with id abc not found");
    assert!(json.get("entity").is_none());
}

// ---------------------------------------------------------------------------
// Test: CoreError::Validation maps to 400 with VALIDATION_ERROR code
// ---------------------------------------------------------------------------

#[tokio::test]
async fn validation_error_returns_400() {
    let err = AppError::Core(CoreError::Validation("pageSize must be greater than zero".into()));

    let (status, _, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "VALIDATION_ERROR");
    assert_eq!(json["error"], "pageSize must be greater than zero");
}

// ---------------------------------------------------------------------------
// Test: VersionMismatch maps to 409, or 412 for If-Match preconditions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn version_mismatch_returns_409_with_current_entity() {
    let err = AppError::VersionMismatch {
        entity: json!({ "id": "a", "version": "v2", "stringValue": "winner" }),
        current: Version::parse("v2").unwrap(),
        precondition: false,
    };

    let (status, etag, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(etag.as_deref(), Some("\"v2\""));
    assert_eq!(json["code"], "VERSION_MISMATCH");
    assert_eq!(json["entity"]["version"], "v2");
    assert_eq!(json["entity"]["stringValue"], "winner");
}

#[tokio::test]
async fn failed_precondition_returns_412() {
    let err = AppError::VersionMismatch {
        entity: json!({ "id": "a", "version": "v2" }),
        current: Version::parse("v2").unwrap(),
        precondition: true,
    };

    let (status, _, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::PRECONDITION_FAILED);
    assert_eq!(json["code"], "VERSION_MISMATCH");
}

// ---------------------------------------------------------------------------
// Test: AlreadyExists maps to 409 with CONFLICT code and the existing entity
// ---------------------------------------------------------------------------

#[tokio::test]
async fn already_exists_returns_409_with_existing_entity() {
    let err = AppError::AlreadyExists {
        id: "dup".into(),
        entity: json!({ "id": "dup", "version": "v1" }),
    };

    let (status, etag, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(etag, None);
    assert_eq!(json["code"], "CONFLICT");
    assert_eq!(json["entity"]["id"], "dup");
}

// ---------------------------------------------------------------------------
// Test: StorageUnavailable maps to 503 and hides backend details
// ---------------------------------------------------------------------------

#[tokio::test]
async fn storage_unavailable_returns_503() {
    let err = AppError::StorageUnavailable("pool timed out at 10.0.0.7:5432".into());

    let (status, _, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["code"], "STORAGE_UNAVAILABLE");
    assert!(!json.to_string().contains("10.0.0.7"));
}

// ---------------------------------------------------------------------------
// Test: AppError::InternalError maps to 500 and sanitizes the message
// ---------------------------------------------------------------------------

#[tokio::test]
async fn internal_error_returns_500_and_sanitizes_message() {
    let err = AppError::InternalError("secret database credentials leaked".into());

    let (status, _, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["code"], "INTERNAL_ERROR");

    // The response body must NOT contain the original error details.
    let body_text = json.to_string();
    assert!(
        !body_text.contains("secret"),
        "Internal error response must not leak sensitive details"
    );
    assert_eq!(json["error"], "An internal error occurred");
}
