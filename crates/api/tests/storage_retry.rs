//! Transient storage failures: retried with backoff, then surfaced as 503.

mod common;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::StatusCode;
use common::{body_json, build_app_with, get, post_json, test_options};
use futures::StreamExt;
use serde_json::json;
use tablesync_api::table::TableController;
use tablesync_core::entity::{Entity, NewEntity};
use tablesync_core::types::{EntityId, Version};
use tablesync_db::models::kitchen_sink::KitchenSink;
use tablesync_db::repositories::InMemoryRepository;
use tablesync_db::repository::{
    EntityStream, ListQuery, Repository, RepositoryError, RepositoryResult,
};

const FLAKY: &str = "/api/flaky";

/// In-memory repository whose next `failures` calls report the storage as
/// unavailable. `u32::MAX` fails forever.
struct FlakyRepository {
    inner: InMemoryRepository<KitchenSink>,
    failures: AtomicU32,
    calls: AtomicU32,
}

impl FlakyRepository {
    fn new(failures: u32) -> Self {
        Self {
            inner: InMemoryRepository::new(),
            failures: AtomicU32::new(failures),
            calls: AtomicU32::new(0),
        }
    }

    fn trip(&self) -> RepositoryResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining == 0 {
            return Ok(());
        }
        if remaining != u32::MAX {
            self.failures.fetch_sub(1, Ordering::SeqCst);
        }
        Err(RepositoryError::StorageUnavailable("connection refused".into()))
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Repository<KitchenSink> for FlakyRepository {
    async fn get(&self, id: &EntityId) -> RepositoryResult<Entity<KitchenSink>> {
        self.trip()?;
        self.inner.get(id).await
    }

    fn list(&self, query: ListQuery) -> EntityStream<'_, KitchenSink> {
        match self.trip() {
            Ok(()) => self.inner.list(query),
            Err(e) => futures::stream::once(async move { Err(e) }).boxed(),
        }
    }

    async fn create(&self, entity: NewEntity<KitchenSink>) -> RepositoryResult<Entity<KitchenSink>> {
        self.trip()?;
        self.inner.create(entity).await
    }

    async fn replace(
        &self,
        id: &EntityId,
        data: KitchenSink,
        expected: &Version,
    ) -> RepositoryResult<Entity<KitchenSink>> {
        self.trip()?;
        self.inner.replace(id, data, expected).await
    }

    async fn soft_delete(&self, id: &EntityId, expected: &Version) -> RepositoryResult<()> {
        self.trip()?;
        self.inner.soft_delete(id, expected).await
    }
}

fn flaky_app(repository: Arc<FlakyRepository>) -> axum::Router {
    build_app_with(TableController::<KitchenSink>::new(
        "KitchenSink",
        FLAKY,
        repository,
        test_options(),
    ))
}

#[tokio::test]
async fn transient_failures_are_retried_transparently() {
    let repository = Arc::new(FlakyRepository::new(2));
    let app = flaky_app(Arc::clone(&repository));

    let response = post_json(&app, FLAKY, json!({ "stringValue": "survivor" })).await;

    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(repository.calls(), 3);
    assert_eq!(repository.inner.len().await, 1);
}

#[tokio::test]
async fn list_is_retried_too() {
    let repository = Arc::new(FlakyRepository::new(0));
    let app = flaky_app(Arc::clone(&repository));
    let response = post_json(&app, FLAKY, json!({ "stringValue": "a" })).await;
    assert_eq!(response.status(), StatusCode::CREATED);

    repository.failures.store(3, Ordering::SeqCst);
    let response = get(&app, FLAKY).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["items"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn persistent_outage_returns_503() {
    let repository = Arc::new(FlakyRepository::new(u32::MAX));
    let app = flaky_app(Arc::clone(&repository));

    let response = get(&app, &format!("{FLAKY}/some-id")).await;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let json = body_json(response).await;
    assert_eq!(json["code"], "STORAGE_UNAVAILABLE");
    assert!(!json["error"].as_str().unwrap().contains("connection refused"));
    // One attempt plus three retries.
    assert_eq!(repository.calls(), 4);
}

#[tokio::test]
async fn validation_failures_never_reach_storage() {
    let repository = Arc::new(FlakyRepository::new(u32::MAX));
    let app = flaky_app(Arc::clone(&repository));

    let response = post_json(&app, FLAKY, json!({ "stringValue": "" })).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = get(&app, &format!("{FLAKY}?pageSize=0")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    assert_eq!(repository.calls(), 0);
}
