//! Per-entity mutual exclusion
//!
//! Appends for one entity, and every application-store write derived from
//! them, run under that entity's lock. Different entities never contend.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{ArcMutexGuard, Mutex, RawMutex};

/// Registry of one mutex per entity id
#[derive(Debug, Default)]
pub struct EntityLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

/// Guard holding one entity's lock; releases the registry slot when unused
pub struct EntityGuard<'a> {
    registry: &'a EntityLocks,
    entity_id: String,
    guard: Option<ArcMutexGuard<RawMutex, ()>>,
}

impl EntityLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until the lock for `entity_id` is held
    pub fn lock(&self, entity_id: &str) -> EntityGuard<'_> {
        let slot = {
            let mut locks = self.locks.lock();
            Arc::clone(locks.entry(entity_id.to_string()).or_default())
        };

        EntityGuard {
            registry: self,
            entity_id: entity_id.to_string(),
            guard: Some(slot.lock_arc()),
        }
    }

    /// Number of entity slots currently allocated
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for EntityGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());

        let mut locks = self.registry.locks.lock();
        // Only the registry still references the slot: nobody holds or waits on it
        if let Some(slot) = locks.get(&self.entity_id) {
            if Arc::strong_count(slot) == 1 {
                locks.remove(&self.entity_id);
            }
        }
    }
}
