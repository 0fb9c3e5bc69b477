use std::sync::Arc;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
/// Table handlers carry their own [`TableController`](crate::table::TableController)
/// state instead.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Database connection pool, present when `DATABASE_URL` is configured.
    pub pool: Option<tablesync_db::DbPool>,
}
