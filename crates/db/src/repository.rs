//! The storage capability set shared by every adapter.
//!
//! A [`Repository`] stores [`Entity<T>`] values for one collection. All
//! mutations are conditional on the caller's last-observed [`Version`] and
//! replace `version` and `updated_at` atomically with the visible change.

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::TryStreamExt;
use tablesync_core::cursor::Cursor;
use tablesync_core::entity::{Entity, NewEntity, TableData};
use tablesync_core::filter::Filter;
use tablesync_core::types::{EntityId, Version};

/// Number of entities an adapter reads from storage per list batch.
pub const LIST_BATCH_SIZE: usize = 256;

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Entity {id} not found")]
    NotFound { id: EntityId },

    /// Insert of an id that already exists (tombstones included).
    #[error("Entity {id} already exists")]
    Conflict { id: EntityId },

    /// The stored version differs from the caller's expected version.
    #[error("Version mismatch for entity {id}: current version is {current}")]
    VersionMismatch { id: EntityId, current: Version },

    /// Transient backend failure; the operation may be retried.
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl RepositoryError {
    pub fn is_transient(&self) -> bool {
        matches!(self, RepositoryError::StorageUnavailable(_))
    }
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Lazily evaluated list result, ordered by `(updated_at, id)`.
pub type EntityStream<'a, T> = BoxStream<'a, RepositoryResult<Entity<T>>>;

/// Selection applied by [`Repository::list`] and [`Repository::count`].
#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    pub filter: Option<Filter>,
    /// Only entities sorting strictly after this cursor are returned.
    pub since: Option<Cursor>,
    pub include_deleted: bool,
}

impl ListQuery {
    /// Whether `entity` passes the tombstone and filter rules.
    pub fn admits<T: TableData>(&self, entity: &Entity<T>) -> RepositoryResult<bool> {
        if entity.deleted && !self.include_deleted {
            return Ok(false);
        }
        match &self.filter {
            None => Ok(true),
            Some(filter) => {
                let doc = entity
                    .to_json()
                    .map_err(|e| RepositoryError::Storage(e.to_string()))?;
                Ok(filter.matches(&doc))
            }
        }
    }
}

/// CRUD + delta query over the entities of one collection.
#[async_trait]
pub trait Repository<T: TableData>: Send + Sync {
    /// Fetch by id. Tombstones are returned; visibility is the caller's call.
    async fn get(&self, id: &EntityId) -> RepositoryResult<Entity<T>>;

    /// Stream entities admitted by `query` in `(updated_at, id)` order.
    ///
    /// Storage is read in batches of [`LIST_BATCH_SIZE`] so the stream never
    /// pins a lock or server-side cursor; a change committed while the stream
    /// is being consumed moves the entity to a later key, where it is still
    /// picked up. Implementations must hand out `updated_at` stamps in commit
    /// order within a collection, otherwise a cursor can pass a stamp whose
    /// write has not committed yet.
    fn list(&self, query: ListQuery) -> EntityStream<'_, T>;

    /// Number of entities `list(query)` would yield.
    async fn count(&self, query: ListQuery) -> RepositoryResult<u64> {
        self.list(query)
            .try_fold(0u64, |n, _| async move { Ok(n + 1) })
            .await
    }

    /// Insert a new entity, assigning its id when absent.
    async fn create(&self, entity: NewEntity<T>) -> RepositoryResult<Entity<T>>;

    /// Replace the payload of a live entity whose version is `expected`.
    async fn replace(
        &self,
        id: &EntityId,
        data: T,
        expected: &Version,
    ) -> RepositoryResult<Entity<T>>;

    /// Mark an entity deleted. Repeating the delete with the tombstone's
    /// version is a no-op.
    async fn soft_delete(&self, id: &EntityId, expected: &Version) -> RepositoryResult<()>;
}
