//! The entity envelope shared by every synchronized table.
//!
//! A table stores `Entity<T>`: the four system properties the sync protocol
//! relies on, plus a client-defined payload `T` flattened alongside them in
//! the JSON form.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::cursor::Cursor;
use crate::error::CoreError;
use crate::types::{EntityId, Timestamp, Version};

/// Bound satisfied by every payload type that can be stored in a table.
pub trait TableData:
    Clone + Serialize + DeserializeOwned + Validate + Send + Sync + 'static
{
}

impl<T> TableData for T where
    T: Clone + Serialize + DeserializeOwned + Validate + Send + Sync + 'static
{
}

/// A stored record: system properties plus payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity<T> {
    pub id: EntityId,
    /// Replaced on every mutation, including soft delete.
    pub version: Version,
    pub updated_at: Timestamp,
    /// Tombstone flag. Deleted entities are never mutated again.
    pub deleted: bool,
    #[serde(flatten)]
    pub data: T,
}

impl<T: TableData> Entity<T> {
    /// Cursor positioned at this entity's `(updated_at, id)` key.
    pub fn cursor(&self) -> Cursor {
        Cursor::at(self.updated_at, self.id.clone())
    }

    /// JSON form used for filter evaluation and conflict payloads.
    pub fn to_json(&self) -> Result<serde_json::Value, CoreError> {
        serde_json::to_value(self).map_err(|e| CoreError::Internal(e.to_string()))
    }
}

/// An entity about to be inserted. The repository assigns the id when absent
/// and always assigns version and timestamp.
#[derive(Debug, Clone)]
pub struct NewEntity<T> {
    pub id: Option<EntityId>,
    pub data: T,
}
