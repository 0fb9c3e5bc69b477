use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tablesync_core::entity::TableData;

use crate::handlers::table;
use crate::state::AppState;
use crate::table::TableController;

/// Mount one table at its collection path.
///
/// ```text
/// GET    {path}          delta query
/// POST   {path}          create
/// GET    {path}/{id}     read
/// PUT    {path}/{id}     replace
/// DELETE {path}/{id}     soft delete
/// ```
pub fn router<T: TableData>(controller: TableController<T>) -> Router<AppState> {
    let collection = controller.path().to_string();
    let item = format!("{collection}/{{id}}");

    Router::new()
        .route(&collection, get(table::list::<T>).post(table::create::<T>))
        .route(
            &item,
            get(table::read::<T>)
                .put(table::replace::<T>)
                .delete(table::delete::<T>),
        )
        .with_state(Arc::new(controller))
}
