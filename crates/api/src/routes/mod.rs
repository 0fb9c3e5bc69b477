pub mod health;
pub mod tables;

use std::sync::Arc;

use axum::Router;
use tablesync_db::models::kitchen_sink::{KitchenSink, KITCHEN_SINK_COLLECTION};
use tablesync_db::repositories::{InMemoryRepository, PgRepository};
use tablesync_db::DbPool;

use crate::state::AppState;
use crate::table::{TableController, TableOptions};

/// Build the table route tree.
///
/// ```text
/// /api/in-memory/kitchensink[/{id}]    process-local table
/// /api/kitchensink[/{id}]              Postgres table (only with a pool)
/// ```
pub fn api_routes(options: TableOptions, pool: Option<&DbPool>) -> Router<AppState> {
    let in_memory = TableController::<KitchenSink>::new(
        "KitchenSink",
        "/api/in-memory/kitchensink",
        Arc::new(InMemoryRepository::<KitchenSink>::new()),
        options,
    );
    let mut router = Router::new().merge(tables::router(in_memory));

    if let Some(pool) = pool {
        let persistent = TableController::<KitchenSink>::new(
            "KitchenSink",
            "/api/kitchensink",
            Arc::new(PgRepository::<KitchenSink>::new(pool.clone(), KITCHEN_SINK_COLLECTION)),
            options,
        );
        router = router.merge(tables::router(persistent));
    }

    router
}
