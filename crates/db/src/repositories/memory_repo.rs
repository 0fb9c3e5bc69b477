//! In-memory repository.
//!
//! Entities live in a map guarded by a `tokio::sync::RwLock`, with a
//! secondary `(updated_at, id)` index for delta scans. Mutations check the
//! expected version and stamp the new `updated_at` under the write lock, so
//! commit order and timestamp order coincide: a reader that has passed a
//! cursor can never miss a later commit.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Bound;

use async_trait::async_trait;
use tablesync_core::clock;
use tablesync_core::cursor::Cursor;
use tablesync_core::entity::{Entity, NewEntity, TableData};
use tablesync_core::types::{EntityId, Timestamp, Version};
use tokio::sync::RwLock;

use crate::repository::{
    EntityStream, ListQuery, Repository, RepositoryError, RepositoryResult, LIST_BATCH_SIZE,
};
use crate::stream::keyset_stream;

struct MemoryState<T> {
    entities: HashMap<EntityId, Entity<T>>,
    index: BTreeMap<Timestamp, BTreeSet<EntityId>>,
    last_stamp: Option<Timestamp>,
}

impl<T: TableData> MemoryState<T> {
    fn new() -> Self {
        Self {
            entities: HashMap::new(),
            index: BTreeMap::new(),
            last_stamp: None,
        }
    }

    /// Next mutation timestamp, strictly after every one issued before.
    fn stamp(&mut self) -> Timestamp {
        let ts = clock::tick(self.last_stamp);
        self.last_stamp = Some(ts);
        ts
    }

    fn unindex(&mut self, updated_at: Timestamp, id: &EntityId) {
        if let Some(ids) = self.index.get_mut(&updated_at) {
            ids.remove(id);
            if ids.is_empty() {
                self.index.remove(&updated_at);
            }
        }
    }

    /// Insert or overwrite, keeping the index in step.
    fn store(&mut self, entity: Entity<T>) {
        self.index
            .entry(entity.updated_at)
            .or_default()
            .insert(entity.id.clone());
        if let Some(previous) = self.entities.insert(entity.id.clone(), entity) {
            self.unindex(previous.updated_at, &previous.id);
        }
    }

    /// Up to `limit` entities sorting after `cursor`.
    fn batch_after(&self, cursor: Option<&Cursor>, limit: usize) -> Vec<Entity<T>> {
        let lower = match cursor {
            None => Bound::Unbounded,
            Some(c) if c.id.is_some() => Bound::Included(c.updated_at),
            Some(c) => Bound::Excluded(c.updated_at),
        };
        self.index
            .range((lower, Bound::Unbounded))
            .flat_map(|(ts, ids)| ids.iter().map(move |id| (ts, id)))
            .filter(|&(ts, id)| cursor.map_or(true, |c| c.is_before(ts, id)))
            .filter_map(|(_, id)| self.entities.get(id).cloned())
            .take(limit)
            .collect()
    }
}

/// Process-local repository, mainly for tests and the in-memory endpoint.
pub struct InMemoryRepository<T> {
    state: RwLock<MemoryState<T>>,
}

impl<T: TableData> InMemoryRepository<T> {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(MemoryState::new()),
        }
    }

    /// Number of stored entities, tombstones included.
    pub async fn len(&self) -> usize {
        self.state.read().await.entities.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl<T: TableData> Default for InMemoryRepository<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: TableData> Repository<T> for InMemoryRepository<T> {
    async fn get(&self, id: &EntityId) -> RepositoryResult<Entity<T>> {
        self.state
            .read()
            .await
            .entities
            .get(id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound { id: id.clone() })
    }

    fn list(&self, query: ListQuery) -> EntityStream<'_, T> {
        let state = &self.state;
        keyset_stream(query, move |cursor| async move {
            let guard = state.read().await;
            Ok::<_, RepositoryError>(guard.batch_after(cursor.as_ref(), LIST_BATCH_SIZE))
        })
    }

    async fn create(&self, entity: NewEntity<T>) -> RepositoryResult<Entity<T>> {
        let id = entity.id.unwrap_or_else(EntityId::generate);
        let mut state = self.state.write().await;
        if state.entities.contains_key(&id) {
            return Err(RepositoryError::Conflict { id });
        }
        let created = Entity {
            id,
            version: Version::generate(),
            updated_at: state.stamp(),
            deleted: false,
            data: entity.data,
        };
        state.store(created.clone());
        Ok(created)
    }

    async fn replace(
        &self,
        id: &EntityId,
        data: T,
        expected: &Version,
    ) -> RepositoryResult<Entity<T>> {
        let mut state = self.state.write().await;
        let current = match state.entities.get(id) {
            Some(entity) if !entity.deleted => entity.version.clone(),
            _ => return Err(RepositoryError::NotFound { id: id.clone() }),
        };
        if current != *expected {
            return Err(RepositoryError::VersionMismatch {
                id: id.clone(),
                current,
            });
        }
        let replaced = Entity {
            id: id.clone(),
            version: Version::generate(),
            updated_at: state.stamp(),
            deleted: false,
            data,
        };
        state.store(replaced.clone());
        Ok(replaced)
    }

    async fn soft_delete(&self, id: &EntityId, expected: &Version) -> RepositoryResult<()> {
        let mut state = self.state.write().await;
        let mut tombstone = match state.entities.get(id) {
            None => return Err(RepositoryError::NotFound { id: id.clone() }),
            Some(entity) if entity.version != *expected => {
                return Err(RepositoryError::VersionMismatch {
                    id: id.clone(),
                    current: entity.version.clone(),
                })
            }
            Some(entity) if entity.deleted => return Ok(()),
            Some(entity) => entity.clone(),
        };
        tombstone.deleted = true;
        tombstone.version = Version::generate();
        tombstone.updated_at = state.stamp();
        state.store(tombstone);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};
    use validator::Validate;

    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
    struct Item {
        n: i32,
    }

    #[tokio::test]
    async fn store_moves_index_entry_on_update() {
        let repo = InMemoryRepository::<Item>::new();
        let created = repo
            .create(NewEntity {
                id: None,
                data: Item { n: 1 },
            })
            .await
            .unwrap();
        let replaced = repo
            .replace(&created.id, Item { n: 2 }, &created.version)
            .await
            .unwrap();

        let state = repo.state.read().await;
        assert!(!state.index.contains_key(&created.updated_at));
        assert!(state.index[&replaced.updated_at].contains(&created.id));
        assert_eq!(state.index.values().map(BTreeSet::len).sum::<usize>(), 1);
    }

    #[tokio::test]
    async fn batch_after_respects_limit_and_cursor() {
        let repo = InMemoryRepository::<Item>::new();
        let mut created = Vec::new();
        for n in 0..5 {
            created.push(
                repo.create(NewEntity {
                    id: None,
                    data: Item { n },
                })
                .await
                .unwrap(),
            );
        }

        let state = repo.state.read().await;
        let first = state.batch_after(None, 2);
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].id, created[0].id);

        let rest = state.batch_after(Some(&first[1].cursor()), 10);
        let ids: Vec<_> = rest.iter().map(|e| e.id.clone()).collect();
        let expected: Vec<_> = created[2..].iter().map(|e| e.id.clone()).collect();
        assert_eq!(ids, expected);
    }
}
