//! Shared response envelope types for table handlers.

use serde::Serialize;
use tablesync_core::entity::Entity;

/// One page of a delta query.
///
/// `next_cursor` is the position to resume from: the cursor of the last item,
/// or the request's own `since` when the page is empty. It is `None` only
/// when a full scan returned nothing.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResponse<T> {
    pub items: Vec<Entity<T>>,
    pub next_cursor: Option<String>,
    pub has_more: bool,
    /// Total number of entities matching the query, when requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
}
