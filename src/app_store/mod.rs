//! Application Store - materialized entity rows
//!
//! Holds the eagerly-folded state of every live entity so CQRS reads skip
//! replay. Rows are derived data: the store can be cleared and rebuilt from
//! the event log at any time.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::types::{Attributes, MaterializedEntity};

/// Result type for application store operations
pub type AppStoreResult<T> = Result<T, AppStoreError>;

/// Errors raised by an application store backend
#[derive(Debug, thiserror::Error)]
pub enum AppStoreError {
    /// The backend rejected the read or write
    #[error("application store unavailable: {0}")]
    Unavailable(String),
}

/// Single-row operations over materialized entities
///
/// Every method is atomic for the row it touches; `insert_if_absent` is the
/// check-then-insert used by rebuilds.
pub trait ApplicationStore: Send + Sync {
    fn get(&self, id: &str) -> AppStoreResult<Option<MaterializedEntity>>;

    /// All rows, ordered by id
    fn list(&self) -> AppStoreResult<Vec<MaterializedEntity>>;

    fn count(&self) -> AppStoreResult<usize>;

    fn contains(&self, id: &str) -> AppStoreResult<bool> {
        Ok(self.get(id)?.is_some())
    }

    /// Insert unless a row with the same id exists; returns whether it inserted
    fn insert_if_absent(&self, entity: MaterializedEntity) -> AppStoreResult<bool>;

    /// Insert or replace a row
    fn upsert(&self, entity: MaterializedEntity) -> AppStoreResult<()>;

    /// Merge changes into an existing row; returns `None` when the row is missing
    fn merge(&self, id: &str, changes: &Attributes) -> AppStoreResult<Option<MaterializedEntity>>;

    /// Remove a row; returns whether it existed
    fn remove(&self, id: &str) -> AppStoreResult<bool>;

    /// Drop every row; returns how many were removed
    fn clear(&self) -> AppStoreResult<usize>;
}

/// Application store kept in process memory
#[derive(Debug, Default)]
pub struct InMemoryApplicationStore {
    rows: RwLock<HashMap<String, MaterializedEntity>>,
}

impl InMemoryApplicationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ApplicationStore for InMemoryApplicationStore {
    fn get(&self, id: &str) -> AppStoreResult<Option<MaterializedEntity>> {
        Ok(self.rows.read().get(id).cloned())
    }

    fn list(&self) -> AppStoreResult<Vec<MaterializedEntity>> {
        let mut rows: Vec<MaterializedEntity> = self.rows.read().values().cloned().collect();
        rows.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(rows)
    }

    fn count(&self) -> AppStoreResult<usize> {
        Ok(self.rows.read().len())
    }

    fn contains(&self, id: &str) -> AppStoreResult<bool> {
        Ok(self.rows.read().contains_key(id))
    }

    fn insert_if_absent(&self, entity: MaterializedEntity) -> AppStoreResult<bool> {
        let mut rows = self.rows.write();
        if rows.contains_key(&entity.id) {
            return Ok(false);
        }
        rows.insert(entity.id.clone(), entity);
        Ok(true)
    }

    fn upsert(&self, entity: MaterializedEntity) -> AppStoreResult<()> {
        self.rows.write().insert(entity.id.clone(), entity);
        Ok(())
    }

    fn merge(&self, id: &str, changes: &Attributes) -> AppStoreResult<Option<MaterializedEntity>> {
        let mut rows = self.rows.write();
        Ok(rows.get_mut(id).map(|row| {
            row.merge(changes);
            row.clone()
        }))
    }

    fn remove(&self, id: &str) -> AppStoreResult<bool> {
        Ok(self.rows.write().remove(id).is_some())
    }

    fn clear(&self) -> AppStoreResult<usize> {
        let mut rows = self.rows.write();
        let removed = rows.len();
        rows.clear();
        Ok(removed)
    }
}
