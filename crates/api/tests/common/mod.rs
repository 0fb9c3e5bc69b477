#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use tablesync_api::config::ServerConfig;
use tablesync_api::retry::RetryPolicy;
use tablesync_api::router::build_app_router;
use tablesync_api::routes;
use tablesync_api::state::AppState;
use tablesync_api::table::{TableController, TableOptions};
use tablesync_core::entity::TableData;

/// Collection path of the in-memory kitchen-sink table.
pub const TABLE: &str = "/api/in-memory/kitchensink";

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
        default_page_size: 100,
        max_page_size: 1000,
        storage_retry_attempts: 3,
        storage_retry_base_ms: 1,
        database_url: None,
    }
}

/// Table options matching [`test_config`], with millisecond retries.
pub fn test_options() -> TableOptions {
    TableOptions {
        default_page_size: 100,
        max_page_size: 1000,
        retry: RetryPolicy::new(3, Duration::from_millis(1)),
    }
}

/// Build the full application router with the in-memory kitchen-sink table.
///
/// Uses the same builder as `main.rs` so integration tests exercise the
/// production middleware stack. The returned router is cheap to clone and
/// every clone shares the same table contents.
pub fn build_test_app() -> Router {
    let config = test_config();
    let tables = routes::api_routes(test_options(), None);
    let state = AppState {
        config: Arc::new(config.clone()),
        pool: None,
    };
    build_app_router(state, &config, tables)
}

/// Build the application around a single custom table.
pub fn build_app_with<T: TableData>(controller: TableController<T>) -> Router {
    let config = test_config();
    let state = AppState {
        config: Arc::new(config.clone()),
        pool: None,
    };
    build_app_router(state, &config, routes::tables::router(controller))
}

pub async fn send(app: &Router, request: Request<Body>) -> Response<Body> {
    app.clone().oneshot(request).await.unwrap()
}

pub async fn get(app: &Router, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    send(app, request).await
}

pub async fn post_json(app: &Router, uri: &str, json: serde_json::Value) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(json.to_string()))
        .unwrap();
    send(app, request).await
}

pub async fn put_json(app: &Router, uri: &str, json: serde_json::Value) -> Response<Body> {
    let request = Request::builder()
        .method(Method::PUT)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(json.to_string()))
        .unwrap();
    send(app, request).await
}

pub async fn delete(app: &Router, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::DELETE)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    send(app, request).await
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Create a kitchen-sink entity and return its JSON form.
pub async fn create_sink(app: &Router, string_value: &str) -> serde_json::Value {
    let response = post_json(
        app,
        TABLE,
        serde_json::json!({ "stringValue": string_value }),
    )
    .await;
    assert_eq!(response.status(), axum::http::StatusCode::CREATED);
    body_json(response).await
}
