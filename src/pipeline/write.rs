//! Write Pipeline
//!
//! Validates create/update/delete commands against the entity's history,
//! appends the state-change record, keeps the application store in step and
//! publishes the domain notification.

use std::sync::Arc;

use tracing::{debug, warn};

use super::locks::EntityLocks;
use crate::app_store::{AppStoreError, ApplicationStore};
use crate::cqrs::StoreSelector;
use crate::error::{CatalogError, CatalogResult};
use crate::event_store::EventLog;
use crate::notify::{Notification, Publisher};
use crate::replay::fold_entity_history;
use crate::types::{
    Attributes, MaterializedEntity, Method, PendingRecord, StateChangeRecord, ID_KEY,
};

/// Appends commands to the event log and fans them out
pub struct WritePipeline {
    entity_type: String,
    log: Arc<dyn EventLog>,
    store: Arc<dyn ApplicationStore>,
    selector: Arc<StoreSelector>,
    publisher: Arc<dyn Publisher>,
    locks: Arc<EntityLocks>,
}

impl WritePipeline {
    pub fn new(
        entity_type: impl Into<String>,
        log: Arc<dyn EventLog>,
        store: Arc<dyn ApplicationStore>,
        selector: Arc<StoreSelector>,
        publisher: Arc<dyn Publisher>,
        locks: Arc<EntityLocks>,
    ) -> Self {
        Self {
            entity_type: entity_type.into(),
            log,
            store,
            selector,
            publisher,
            locks,
        }
    }

    /// Create a new entity; returns its freshly minted id
    pub fn create_entity(&self, attributes: Attributes, user: &str) -> CatalogResult<String> {
        validate_attributes(&attributes)?;

        let entity_id = uuid::Uuid::new_v4().to_string();
        let _guard = self.locks.lock(&entity_id);

        let record = self.log.append(PendingRecord::create(
            entity_id.clone(),
            &self.entity_type,
            attributes,
            user.to_string(),
        ))?;

        let entity = match &record.changes {
            Some(changes) => MaterializedEntity::with_attributes(&entity_id, changes),
            None => MaterializedEntity::new(&entity_id),
        };

        // The history is exactly one CREATE, so no replay is needed
        if self.selector.is_enabled() {
            if let Err(e) = self.store.upsert(entity.clone()) {
                self.evict(&entity_id, e);
            }
        }

        debug!(entity_id = %entity_id, user, "Entity created");
        self.publisher
            .publish(Notification::EntityCreated { entity, record });

        Ok(entity_id)
    }

    /// Append an UPDATE carrying `changes` to a live entity
    pub fn update_entity(
        &self,
        entity_id: &str,
        changes: Attributes,
        user: &str,
    ) -> CatalogResult<StateChangeRecord> {
        if changes.is_empty() {
            return Err(CatalogError::NoOpUpdate(entity_id.to_string()));
        }
        validate_attributes(&changes)?;

        let _guard = self.locks.lock(entity_id);
        self.ensure_live(entity_id)?;

        let record = self.log.append(PendingRecord::update(
            entity_id.to_string(),
            &self.entity_type,
            changes.clone(),
            user.to_string(),
        ))?;

        if self.selector.is_enabled() {
            self.apply_update(entity_id, &changes);
        } else {
            // Rebuilds never overwrite rows, so a stale row must become a hole instead
            self.discard_row(entity_id);
        }

        debug!(entity_id, user, seq = record.seq, "Entity updated");
        self.publisher.publish(Notification::EntityUpdated {
            entity_id: entity_id.to_string(),
            changes,
            record: record.clone(),
        });

        Ok(record)
    }

    /// Append a DELETE to a live entity; returns its id
    pub fn delete_entity(&self, entity_id: &str, user: &str) -> CatalogResult<String> {
        let _guard = self.locks.lock(entity_id);
        self.ensure_live(entity_id)?;

        self.log.append(PendingRecord::delete(
            entity_id.to_string(),
            &self.entity_type,
            user.to_string(),
        ))?;

        self.discard_row(entity_id);

        debug!(entity_id, user, "Entity deleted");
        self.publisher.publish(Notification::EntityRemoved {
            entity_id: entity_id.to_string(),
            user: user.to_string(),
        });

        Ok(entity_id.to_string())
    }

    fn ensure_live(&self, entity_id: &str) -> CatalogResult<()> {
        let history = self.log.find_by_entity(entity_id)?;
        match history.last() {
            Some(last) if last.method != Method::Delete => Ok(()),
            _ => Err(CatalogError::NotFound(entity_id.to_string())),
        }
    }

    /// Merge into the existing row, or refold the whole history if the row is missing
    fn apply_update(&self, entity_id: &str, changes: &Attributes) {
        match self.store.merge(entity_id, changes) {
            Ok(Some(_)) => {}
            Ok(None) => {
                let refolded = self
                    .log
                    .find_by_entity(entity_id)
                    .map_err(|e| e.to_string())
                    .and_then(|history| fold_entity_history(&history).map_err(|e| e.to_string()));

                match refolded.map(|folded| folded.into_live()) {
                    Ok(Some(entity)) => {
                        if let Err(e) = self.store.upsert(entity) {
                            self.evict(entity_id, e);
                        }
                    }
                    Ok(None) => {}
                    Err(reason) => {
                        warn!(entity_id, error = %reason, "Could not materialize updated entity");
                    }
                }
            }
            Err(e) => self.evict(entity_id, e),
        }
    }

    fn discard_row(&self, entity_id: &str) {
        if let Err(e) = self.store.remove(entity_id) {
            warn!(entity_id, error = %e, "Could not remove application store row");
        }
    }

    /// The log append already succeeded; drop the row so the next rebuild repopulates it
    fn evict(&self, entity_id: &str, cause: AppStoreError) {
        warn!(entity_id, error = %cause, "Application store write failed, evicting row");
        self.discard_row(entity_id);
    }
}

fn validate_attributes(attributes: &Attributes) -> CatalogResult<()> {
    if attributes.contains_key(ID_KEY) {
        return Err(CatalogError::InvalidAttributes(format!(
            "'{}' is reserved for the entity id",
            ID_KEY
        )));
    }
    Ok(())
}
