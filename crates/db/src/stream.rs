use std::future::{ready, Future};

use futures::stream::{self, StreamExt, TryStreamExt};
use tablesync_core::cursor::Cursor;
use tablesync_core::entity::{Entity, TableData};

use crate::repository::{
    EntityStream, ListQuery, RepositoryError, RepositoryResult, LIST_BATCH_SIZE,
};

/// Turn a keyset batch reader into an [`EntityStream`].
///
/// `fetch(cursor)` must return up to [`LIST_BATCH_SIZE`] entities sorting
/// after `cursor`, in `(updated_at, id)` order. A short batch ends the
/// stream. Tombstone and filter rules from `query` are applied here, so the
/// cursor keeps advancing even when a whole batch is filtered out.
pub(crate) fn keyset_stream<'a, T, F, Fut>(query: ListQuery, fetch: F) -> EntityStream<'a, T>
where
    T: TableData,
    F: FnMut(Option<Cursor>) -> Fut + Send + 'a,
    Fut: Future<Output = RepositoryResult<Vec<Entity<T>>>> + Send + 'a,
{
    let start = query.since.clone();

    stream::try_unfold(
        (start, fetch, false),
        |(cursor, mut fetch, exhausted)| async move {
            if exhausted {
                return Ok::<_, RepositoryError>(None);
            }
            let batch = fetch(cursor.clone()).await?;
            let exhausted = batch.len() < LIST_BATCH_SIZE;
            let next = batch.last().map(Entity::cursor).or(cursor);
            Ok(Some((batch, (next, fetch, exhausted))))
        },
    )
    .map_ok(|batch| stream::iter(batch.into_iter().map(Ok::<_, RepositoryError>)))
    .try_flatten()
    .try_filter_map(move |entity| ready(query.admits(&entity).map(|ok| ok.then_some(entity))))
    .boxed()
}
