//! Handlers for a synchronized table collection.
//!
//! Every handler is generic over the payload type and receives its
//! [`TableController`] as router state, so one set of handlers serves every
//! mounted table. Request validation always happens before the repository is
//! touched; transient storage failures are retried per the table's
//! [`RetryPolicy`](crate::retry::RetryPolicy).

use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::header::{InvalidHeaderValue, ETAG, LAST_MODIFIED, LOCATION};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::{StreamExt, TryStreamExt};
use serde::{Deserialize, Deserializer};
use tablesync_core::cursor::Cursor;
use tablesync_core::entity::{Entity, NewEntity, TableData};
use tablesync_core::error::CoreError;
use tablesync_core::filter::Filter;
use tablesync_core::types::{EntityId, Version};
use tablesync_db::repository::{ListQuery, RepositoryError};
use validator::Validate;

use crate::conditional::{self, Precondition};
use crate::error::{AppError, AppResult};
use crate::response::PageResponse;
use crate::retry::with_retry;
use crate::table::TableController;

/// Query parameters for the delta query endpoint.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    /// Opaque cursor from a previous page, or an RFC 3339 timestamp.
    pub since: Option<String>,
    pub filter: Option<String>,
    pub page_size: Option<usize>,
    /// Defaults to `true` when `since` is given, `false` otherwise.
    pub include_deleted: Option<bool>,
    #[serde(default)]
    pub include_count: bool,
}

/// Query parameters for the single-entity read.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadParams {
    #[serde(default)]
    pub include_deleted: bool,
}

/// Query parameters for delete.
#[derive(Debug, Default, Deserialize)]
pub struct DeleteParams {
    /// Last-observed version, unless sent in `If-Match`.
    pub version: Option<String>,
}

/// Request body for create and replace: the payload plus whichever system
/// properties the client echoed back. `updatedAt` is server-owned and ignored.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityBody<T> {
    #[serde(default)]
    pub id: Option<String>,
    /// Outer `Some` when the field was sent at all, even as `null`.
    #[serde(default, deserialize_with = "present")]
    pub version: Option<Option<String>>,
    #[serde(default)]
    pub deleted: Option<bool>,
    #[serde(flatten)]
    pub data: T,
}

fn present<'de, D, V>(deserializer: D) -> Result<Option<V>, D::Error>
where
    D: Deserializer<'de>,
    V: Deserialize<'de>,
{
    V::deserialize(deserializer).map(Some)
}

/// Expected version for a mutation and where it came from.
struct Expected {
    version: Version,
    from_header: bool,
}

/// GET /{collection}
///
/// Delta query: entities after `since` in `(updatedAt, id)` order, at most
/// `pageSize` of them, plus the cursor to continue from.
pub async fn list<T: TableData>(
    State(table): State<Arc<TableController<T>>>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> AppResult<Json<PageResponse<T>>> {
    let Query(params) = params?;

    let page_size = table.options().page_size(params.page_size)?;
    let since = params.since.as_deref().map(Cursor::decode).transpose()?;
    let filter = params.filter.as_deref().map(Filter::parse).transpose()?;
    let include_deleted = params.include_deleted.unwrap_or(since.is_some());

    let query = ListQuery {
        filter,
        since: since.clone(),
        include_deleted,
    };

    let retry = table.options().retry;
    let mut items: Vec<Entity<T>> = with_retry(&retry, "list", || {
        let query = query.clone();
        let repository = table.repository();
        async move {
            repository
                .list(query)
                .take(page_size + 1)
                .try_collect::<Vec<_>>()
                .await
        }
    })
    .await
    .map_err(|e| table.map_error(e))?;

    let has_more = items.len() > page_size;
    items.truncate(page_size);

    let count = if params.include_count {
        let count = with_retry(&retry, "count", || table.repository().count(query.clone()))
            .await
            .map_err(|e| table.map_error(e))?;
        Some(count)
    } else {
        None
    };

    let next_cursor = items
        .last()
        .map(Entity::cursor)
        .or(since)
        .map(|c| c.encode());

    tracing::debug!(
        table = table.name(),
        returned = items.len(),
        has_more,
        include_deleted,
        "Delta query served"
    );

    Ok(Json(PageResponse {
        items,
        next_cursor,
        has_more,
        count,
    }))
}

/// GET /{collection}/{id}
///
/// Soft-deleted entities are hidden unless `includeDeleted=true`. Answers
/// `304 Not Modified` when `If-None-Match` names the current version.
pub async fn read<T: TableData>(
    State(table): State<Arc<TableController<T>>>,
    Path(id): Path<String>,
    params: Result<Query<ReadParams>, QueryRejection>,
    headers: HeaderMap,
) -> AppResult<Response> {
    let Query(params) = params?;
    let id = EntityId::parse(&id)?;

    let entity = with_retry(&table.options().retry, "get", || table.repository().get(&id))
        .await
        .map_err(|e| table.map_error(e))?;

    if entity.deleted && !params.include_deleted {
        return Err(table.map_error(RepositoryError::NotFound { id }));
    }

    if conditional::if_none_match(&headers, &entity.version) {
        let etag = conditional::etag(&entity.version).map_err(header_error)?;
        return Ok((StatusCode::NOT_MODIFIED, [(ETAG, etag)]).into_response());
    }

    entity_response(StatusCode::OK, &entity)
}

/// POST /{collection}
///
/// Insert a new entity. The server assigns version and timestamp, and the id
/// when the client sends none. Returns 201 with `Location` and `ETag`.
pub async fn create<T: TableData>(
    State(table): State<Arc<TableController<T>>>,
    body: Result<Json<EntityBody<T>>, JsonRejection>,
) -> AppResult<Response> {
    let Json(body) = body?;

    if body.version.is_some() {
        return Err(CoreError::Validation("version must not be supplied on create".into()).into());
    }
    if body.deleted == Some(true) {
        return Err(CoreError::Validation("cannot create a deleted entity".into()).into());
    }
    let id = body.id.as_deref().map(EntityId::parse).transpose()?;
    body.data.validate().map_err(CoreError::from)?;

    let created = with_retry(&table.options().retry, "create", || {
        table.repository().create(NewEntity {
            id: id.clone(),
            data: body.data.clone(),
        })
    })
    .await;

    let entity = match created {
        Ok(entity) => entity,
        Err(RepositoryError::Conflict { id }) => {
            tracing::info!(table = table.name(), %id, "Create rejected: id already exists");
            return Err(table.already_exists(&id).await);
        }
        Err(e) => return Err(table.map_error(e)),
    };

    tracing::info!(
        table = table.name(),
        id = %entity.id,
        version = %entity.version,
        "Entity created"
    );

    let mut response = entity_response(StatusCode::CREATED, &entity)?;
    let location = HeaderValue::from_str(&table.location(&entity.id)).map_err(header_error)?;
    response.headers_mut().insert(LOCATION, location);
    Ok(response)
}

/// PUT /{collection}/{id}
///
/// Replace the payload of a live entity. The last-observed version comes from
/// the body or `If-Match`; a stale version answers with the current entity.
pub async fn replace<T: TableData>(
    State(table): State<Arc<TableController<T>>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Result<Json<EntityBody<T>>, JsonRejection>,
) -> AppResult<Response> {
    let id = EntityId::parse(&id)?;
    let Json(body) = body?;

    if body.id.as_deref().is_some_and(|body_id| body_id != id.as_str()) {
        return Err(CoreError::Validation("body id does not match the path id".into()).into());
    }
    if body.deleted == Some(true) {
        return Err(CoreError::Validation("use DELETE to delete an entity".into()).into());
    }
    body.data.validate().map_err(CoreError::from)?;

    let supplied = body.version.as_ref().and_then(|v| v.as_deref());
    let expected = expected_version(&table, &id, &headers, supplied).await?;

    let replaced = with_retry(&table.options().retry, "replace", || {
        table
            .repository()
            .replace(&id, body.data.clone(), &expected.version)
    })
    .await;

    match replaced {
        Ok(entity) => {
            tracing::info!(
                table = table.name(),
                id = %entity.id,
                version = %entity.version,
                "Entity replaced"
            );
            entity_response(StatusCode::OK, &entity)
        }
        Err(RepositoryError::VersionMismatch { current, .. }) => {
            tracing::info!(
                table = table.name(),
                %id,
                expected = %expected.version,
                %current,
                "Replace rejected: stale version"
            );
            Err(table.version_conflict(&id, expected.from_header).await)
        }
        Err(e) => Err(table.map_error(e)),
    }
}

/// DELETE /{collection}/{id}
///
/// Soft-delete. The last-observed version comes from `?version=` or
/// `If-Match`. Repeating the delete with the tombstone's version is a no-op.
pub async fn delete<T: TableData>(
    State(table): State<Arc<TableController<T>>>,
    Path(id): Path<String>,
    params: Result<Query<DeleteParams>, QueryRejection>,
    headers: HeaderMap,
) -> AppResult<StatusCode> {
    let Query(params) = params?;
    let id = EntityId::parse(&id)?;

    let expected = expected_version(&table, &id, &headers, params.version.as_deref()).await?;

    let deleted = with_retry(&table.options().retry, "soft_delete", || {
        table.repository().soft_delete(&id, &expected.version)
    })
    .await;

    match deleted {
        Ok(()) => {
            tracing::info!(table = table.name(), %id, "Entity deleted");
            Ok(StatusCode::NO_CONTENT)
        }
        Err(RepositoryError::VersionMismatch { current, .. }) => {
            tracing::info!(
                table = table.name(),
                %id,
                expected = %expected.version,
                %current,
                "Delete rejected: stale version"
            );
            Err(table.version_conflict(&id, expected.from_header).await)
        }
        Err(e) => Err(table.map_error(e)),
    }
}

/// Resolve the expected version from `If-Match` and the request's own
/// `version` field. `If-Match: *` resolves to whatever is stored now.
async fn expected_version<T: TableData>(
    table: &TableController<T>,
    id: &EntityId,
    headers: &HeaderMap,
    supplied: Option<&str>,
) -> AppResult<Expected> {
    let header = conditional::if_match(headers)?;
    let supplied = supplied.map(Version::parse).transpose()?;

    match (header, supplied) {
        (Some(Precondition::Version(tag)), Some(version)) if tag != version => Err(
            CoreError::Validation("If-Match and version disagree".into()).into(),
        ),
        (Some(Precondition::Version(version)), _) => Ok(Expected {
            version,
            from_header: true,
        }),
        (_, Some(version)) => Ok(Expected {
            version,
            from_header: false,
        }),
        (Some(Precondition::Any), None) => {
            let current = with_retry(&table.options().retry, "get", || table.repository().get(id))
                .await
                .map_err(|e| table.map_error(e))?;
            Ok(Expected {
                version: current.version,
                from_header: true,
            })
        }
        (None, None) => Err(CoreError::Validation(
            "version is required: send it in the request or in If-Match".into(),
        )
        .into()),
    }
}

/// JSON entity with `ETag` and `Last-Modified` headers.
fn entity_response<T: TableData>(status: StatusCode, entity: &Entity<T>) -> AppResult<Response> {
    let etag = conditional::etag(&entity.version).map_err(header_error)?;
    let last_modified = conditional::last_modified(&entity.updated_at).map_err(header_error)?;

    let mut response = (status, Json(entity)).into_response();
    let headers = response.headers_mut();
    headers.insert(ETAG, etag);
    headers.insert(LAST_MODIFIED, last_modified);
    Ok(response)
}

fn header_error(err: InvalidHeaderValue) -> AppError {
    AppError::InternalError(format!("invalid header value: {err}"))
}
