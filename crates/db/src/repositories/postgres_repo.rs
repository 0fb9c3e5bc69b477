//! PostgreSQL repository over the shared `table_entities` relation.
//!
//! Each mutation is a single conditional statement keyed on
//! `(collection, id, version)`, so the compare-and-swap is atomic. Mutations
//! of one collection run under a transaction-scoped advisory lock and stamp
//! `updated_at` past the collection's newest row, so stamp order matches
//! commit order and a delta cursor never overtakes an uncommitted write.
//! The filter predicate is evaluated in-process on each keyset batch.

use std::marker::PhantomData;

use async_trait::async_trait;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use tablesync_core::cursor::Cursor;
use tablesync_core::entity::{Entity, NewEntity, TableData};
use tablesync_core::types::{EntityId, Timestamp, Version};

use crate::repository::{
    EntityStream, ListQuery, Repository, RepositoryError, RepositoryResult, LIST_BATCH_SIZE,
};
use crate::stream::keyset_stream;

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, version, updated_at, deleted, payload";

/// Next `updated_at` in a collection (bound as `$1`): strictly after every
/// existing stamp, even if the wall clock stepped back. `GREATEST` skips the
/// `NULL` of an empty collection.
const NEXT_STAMP: &str = "GREATEST(clock_timestamp(), \
     (SELECT max(updated_at) + interval '1 microsecond' \
      FROM table_entities WHERE collection = $1))";

/// A row from the `table_entities` table.
#[derive(Debug, FromRow)]
struct EntityRow {
    id: String,
    version: String,
    updated_at: Timestamp,
    deleted: bool,
    payload: serde_json::Value,
}

impl EntityRow {
    fn into_entity<T: TableData>(self) -> RepositoryResult<Entity<T>> {
        let corrupt = |what: &str, e: &dyn std::fmt::Display| {
            RepositoryError::Storage(format!("corrupt {what} in row {}: {e}", self.id))
        };
        let id = EntityId::parse(&self.id).map_err(|e| corrupt("id", &e))?;
        let version = Version::parse(&self.version).map_err(|e| corrupt("version", &e))?;
        let data = serde_json::from_value(self.payload).map_err(|e| corrupt("payload", &e))?;
        Ok(Entity {
            id,
            version,
            updated_at: self.updated_at,
            deleted: self.deleted,
            data,
        })
    }
}

/// Repository for one collection stored in `table_entities`.
pub struct PgRepository<T> {
    pool: PgPool,
    collection: String,
    _payload: PhantomData<fn() -> T>,
}

impl<T: TableData> PgRepository<T> {
    pub fn new(pool: PgPool, collection: impl Into<String>) -> Self {
        Self {
            pool,
            collection: collection.into(),
            _payload: PhantomData,
        }
    }

    async fn fetch_batch(
        pool: &PgPool,
        collection: &str,
        include_deleted: bool,
        cursor: Option<Cursor>,
    ) -> RepositoryResult<Vec<Entity<T>>> {
        let limit = LIST_BATCH_SIZE as i64;
        let rows = match cursor {
            None => {
                let query = format!(
                    "SELECT {COLUMNS} FROM table_entities \
                     WHERE collection = $1 AND ($2 OR NOT deleted) \
                     ORDER BY updated_at, id LIMIT $3"
                );
                sqlx::query_as::<_, EntityRow>(&query)
                    .bind(collection)
                    .bind(include_deleted)
                    .bind(limit)
                    .fetch_all(pool)
                    .await?
            }
            Some(Cursor {
                updated_at,
                id: Some(id),
            }) => {
                let query = format!(
                    "SELECT {COLUMNS} FROM table_entities \
                     WHERE collection = $1 AND ($2 OR NOT deleted) \
                       AND (updated_at, id) > ($3, $4) \
                     ORDER BY updated_at, id LIMIT $5"
                );
                sqlx::query_as::<_, EntityRow>(&query)
                    .bind(collection)
                    .bind(include_deleted)
                    .bind(updated_at)
                    .bind(id.as_str())
                    .bind(limit)
                    .fetch_all(pool)
                    .await?
            }
            Some(Cursor {
                updated_at,
                id: None,
            }) => {
                let query = format!(
                    "SELECT {COLUMNS} FROM table_entities \
                     WHERE collection = $1 AND ($2 OR NOT deleted) AND updated_at > $3 \
                     ORDER BY updated_at, id LIMIT $4"
                );
                sqlx::query_as::<_, EntityRow>(&query)
                    .bind(collection)
                    .bind(include_deleted)
                    .bind(updated_at)
                    .bind(limit)
                    .fetch_all(pool)
                    .await?
            }
        };
        rows.into_iter().map(EntityRow::into_entity).collect()
    }

    /// Open a write transaction holding the collection's advisory lock until
    /// commit or rollback.
    async fn begin_write(&self) -> RepositoryResult<Transaction<'static, Postgres>> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(&self.collection)
            .execute(&mut *tx)
            .await?;
        Ok(tx)
    }

    async fn find(&self, id: &EntityId) -> RepositoryResult<Option<Entity<T>>> {
        let query =
            format!("SELECT {COLUMNS} FROM table_entities WHERE collection = $1 AND id = $2");
        sqlx::query_as::<_, EntityRow>(&query)
            .bind(&self.collection)
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?
            .map(EntityRow::into_entity)
            .transpose()
    }
}

#[async_trait]
impl<T: TableData> Repository<T> for PgRepository<T> {
    async fn get(&self, id: &EntityId) -> RepositoryResult<Entity<T>> {
        self.find(id)
            .await?
            .ok_or_else(|| RepositoryError::NotFound { id: id.clone() })
    }

    fn list(&self, query: ListQuery) -> EntityStream<'_, T> {
        let pool = &self.pool;
        let collection = self.collection.as_str();
        let include_deleted = query.include_deleted;
        keyset_stream(query, move |cursor| {
            Self::fetch_batch(pool, collection, include_deleted, cursor)
        })
    }

    async fn create(&self, entity: NewEntity<T>) -> RepositoryResult<Entity<T>> {
        let id = entity.id.unwrap_or_else(EntityId::generate);
        let payload = serde_json::to_value(&entity.data)
            .map_err(|e| RepositoryError::Storage(e.to_string()))?;
        let query = format!(
            "INSERT INTO table_entities (collection, id, version, updated_at, deleted, payload) \
             VALUES ($1, $2, $3, {NEXT_STAMP}, false, $4) \
             ON CONFLICT (collection, id) DO NOTHING \
             RETURNING {COLUMNS}"
        );
        let mut tx = self.begin_write().await?;
        let row = sqlx::query_as::<_, EntityRow>(&query)
            .bind(&self.collection)
            .bind(id.as_str())
            .bind(Version::generate().as_str())
            .bind(payload)
            .fetch_optional(&mut *tx)
            .await?;
        tx.commit().await?;
        match row {
            Some(row) => row.into_entity(),
            None => Err(RepositoryError::Conflict { id }),
        }
    }

    async fn replace(
        &self,
        id: &EntityId,
        data: T,
        expected: &Version,
    ) -> RepositoryResult<Entity<T>> {
        let payload =
            serde_json::to_value(&data).map_err(|e| RepositoryError::Storage(e.to_string()))?;
        let query = format!(
            "UPDATE table_entities SET \
                payload = $3, \
                version = $4, \
                updated_at = {NEXT_STAMP} \
             WHERE collection = $1 AND id = $2 AND version = $5 AND NOT deleted \
             RETURNING {COLUMNS}"
        );
        let mut tx = self.begin_write().await?;
        let row = sqlx::query_as::<_, EntityRow>(&query)
            .bind(&self.collection)
            .bind(id.as_str())
            .bind(payload)
            .bind(Version::generate().as_str())
            .bind(expected.as_str())
            .fetch_optional(&mut *tx)
            .await?;
        tx.commit().await?;
        if let Some(row) = row {
            return row.into_entity();
        }

        // The conditional update matched nothing: work out why.
        match self.find(id).await? {
            Some(current) if !current.deleted => Err(RepositoryError::VersionMismatch {
                id: id.clone(),
                current: current.version,
            }),
            _ => Err(RepositoryError::NotFound { id: id.clone() }),
        }
    }

    async fn soft_delete(&self, id: &EntityId, expected: &Version) -> RepositoryResult<()> {
        let query = format!(
            "UPDATE table_entities SET \
                deleted = true, \
                version = $3, \
                updated_at = {NEXT_STAMP} \
             WHERE collection = $1 AND id = $2 AND version = $4 AND NOT deleted"
        );
        let mut tx = self.begin_write().await?;
        let result = sqlx::query(&query)
            .bind(&self.collection)
            .bind(id.as_str())
            .bind(Version::generate().as_str())
            .bind(expected.as_str())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        if result.rows_affected() > 0 {
            return Ok(());
        }

        match self.find(id).await? {
            None => Err(RepositoryError::NotFound { id: id.clone() }),
            Some(current) if current.version != *expected => {
                Err(RepositoryError::VersionMismatch {
                    id: id.clone(),
                    current: current.version,
                })
            }
            // Already a tombstone at the expected version.
            Some(_) => Ok(()),
        }
    }
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        if is_transient(&err) {
            tracing::warn!(error = %err, "Transient storage failure");
            RepositoryError::StorageUnavailable(err.to_string())
        } else {
            tracing::error!(error = %err, "Storage failure");
            RepositoryError::Storage(err.to_string())
        }
    }
}

/// Connection-level failures and serialization conflicts are worth retrying;
/// everything else is not.
fn is_transient(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => true,
        sqlx::Error::Database(db_err) => db_err
            .code()
            .is_some_and(|code| is_transient_sqlstate(&code)),
        _ => false,
    }
}

/// SQLSTATE class 08 (connection exception), 40001 (serialization failure),
/// 40P01 (deadlock), 57P01..57P03 (shutdown / cannot connect now).
fn is_transient_sqlstate(code: &str) -> bool {
    code.starts_with("08") || matches!(code, "40001" | "40P01" | "57P01" | "57P02" | "57P03")
}
