//! A synchronized table: one repository mounted at one collection path.

use std::sync::Arc;
use std::time::Duration;

use tablesync_core::entity::TableData;
use tablesync_core::error::CoreError;
use tablesync_core::types::EntityId;
use tablesync_db::repository::{Repository, RepositoryError};

use crate::config::ServerConfig;
use crate::error::AppError;
use crate::retry::{with_retry, RetryPolicy};

/// Paging and retry settings shared by every table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableOptions {
    pub default_page_size: usize,
    pub max_page_size: usize,
    pub retry: RetryPolicy,
}

impl TableOptions {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            default_page_size: config.default_page_size,
            max_page_size: config.max_page_size,
            retry: RetryPolicy::new(
                config.storage_retry_attempts,
                Duration::from_millis(config.storage_retry_base_ms),
            ),
        }
    }

    /// Effective page size for a request. Oversized requests are clamped;
    /// zero is rejected.
    pub fn page_size(&self, requested: Option<usize>) -> Result<usize, CoreError> {
        match requested {
            None => Ok(self.default_page_size),
            Some(0) => Err(CoreError::Validation(
                "pageSize must be greater than zero".into(),
            )),
            Some(n) => Ok(n.min(self.max_page_size)),
        }
    }
}

impl Default for TableOptions {
    fn default() -> Self {
        Self {
            default_page_size: 100,
            max_page_size: 1000,
            retry: RetryPolicy::default(),
        }
    }
}

/// Serves one collection of `Entity<T>` over HTTP.
pub struct TableController<T> {
    name: &'static str,
    path: String,
    repository: Arc<dyn Repository<T>>,
    options: TableOptions,
}

impl<T: TableData> TableController<T> {
    /// `name` labels the table in errors and logs; `path` is the collection
    /// route, e.g. `/api/kitchensink`.
    pub fn new(
        name: &'static str,
        path: impl Into<String>,
        repository: Arc<dyn Repository<T>>,
        options: TableOptions,
    ) -> Self {
        Self {
            name,
            path: path.into(),
            repository,
            options,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn repository(&self) -> &dyn Repository<T> {
        self.repository.as_ref()
    }

    pub fn options(&self) -> &TableOptions {
        &self.options
    }

    /// Route of a single entity.
    pub fn location(&self, id: &EntityId) -> String {
        format!("{}/{}", self.path, id)
    }

    /// Translate a repository failure into the HTTP error taxonomy.
    pub fn map_error(&self, err: RepositoryError) -> AppError {
        match err {
            RepositoryError::NotFound { id } => AppError::Core(CoreError::NotFound {
                entity: self.name,
                id: id.to_string(),
            }),
            RepositoryError::Conflict { id } => AppError::Core(CoreError::Conflict(format!(
                "{} with id {id} already exists",
                self.name
            ))),
            RepositoryError::VersionMismatch { id, current } => {
                AppError::Core(CoreError::Conflict(format!(
                    "{} with id {id} is at version {current}",
                    self.name
                )))
            }
            RepositoryError::StorageUnavailable(msg) => AppError::StorageUnavailable(msg),
            RepositoryError::Storage(msg) => AppError::InternalError(msg),
        }
    }

    /// Conflict response for a stale mutation, carrying the current entity.
    pub async fn version_conflict(&self, id: &EntityId, precondition: bool) -> AppError {
        let current = with_retry(&self.options.retry, "get", || self.repository.get(id)).await;
        match current {
            Ok(current) => match current.to_json() {
                Ok(entity) => AppError::VersionMismatch {
                    entity,
                    current: current.version,
                    precondition,
                },
                Err(e) => e.into(),
            },
            Err(e) => self.map_error(e),
        }
    }

    /// Conflict response for a create whose id is taken.
    pub async fn already_exists(&self, id: &EntityId) -> AppError {
        let existing = with_retry(&self.options.retry, "get", || self.repository.get(id)).await;
        match existing {
            Ok(existing) => match existing.to_json() {
                Ok(entity) => AppError::AlreadyExists {
                    id: id.to_string(),
                    entity,
                },
                Err(e) => e.into(),
            },
            Err(e) => self.map_error(e),
        }
    }
}
