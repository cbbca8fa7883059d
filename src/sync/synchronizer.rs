//! Application Store Synchronizer
//!
//! Rebuilds the application store from the event log. A rebuild only fills
//! holes: rows that already exist are never overwritten, because they may
//! carry an incremental write newer than the rebuild's snapshot.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{error, info, warn};

use super::throttle::ProgressThrottle;
use crate::app_store::{AppStoreError, ApplicationStore};
use crate::event_store::{EventLog, EventStoreError};
use crate::notify::{Notification, Publisher};
use crate::pipeline::EntityLocks;
use crate::replay::{fold_all_entities, fold_entity_history, group_by_entity, Folded, ReplayResult};
use crate::types::{MaterializedEntity, Method, StateChangeRecord};
use crate::utils::{current_timestamp_millis, elapsed_millis};

/// Errors that abort a synchronizer operation
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The event log could not be read; nothing was rebuilt
    #[error("rebuild failed: {0}")]
    RebuildFailed(#[source] EventStoreError),

    #[error(transparent)]
    Store(#[from] AppStoreError),
}

/// Per-entity tallies of one rebuild
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RebuildReport {
    /// Entity groups folded
    pub total: u64,
    pub inserted: u64,
    /// Rows that already existed and were left untouched
    pub skipped_existing: u64,
    /// Tombstoned entities
    pub skipped_absent: u64,
    pub corrupt: u64,
    /// Entities whose store write or re-read failed
    pub failed: u64,
}

/// How a rebuild ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebuildOutcome {
    Finished(RebuildReport),
    /// Superseded by a later toggle; no `replay-finished` was published
    Cancelled(RebuildReport),
}

impl RebuildOutcome {
    pub fn report(&self) -> &RebuildReport {
        match self {
            RebuildOutcome::Finished(report) | RebuildOutcome::Cancelled(report) => report,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, RebuildOutcome::Cancelled(_))
    }
}

enum EntityOutcome {
    Inserted,
    Existing,
    Absent,
    Corrupt,
    Failed,
}

/// Keeps the application store consistent with the event log
pub struct Synchronizer {
    log: Arc<dyn EventLog>,
    store: Arc<dyn ApplicationStore>,
    publisher: Arc<dyn Publisher>,
    locks: Arc<EntityLocks>,
    progress_interval: Duration,
}

impl Synchronizer {
    pub fn new(
        log: Arc<dyn EventLog>,
        store: Arc<dyn ApplicationStore>,
        publisher: Arc<dyn Publisher>,
        locks: Arc<EntityLocks>,
        progress_interval: Duration,
    ) -> Self {
        Self {
            log,
            store,
            publisher,
            locks,
            progress_interval,
        }
    }

    /// Populate every missing row of `entity_type` from the event log
    ///
    /// `is_cancelled` is polled before each entity and before each progress
    /// notification; once it returns true the rebuild stops without publishing
    /// further notifications.
    pub fn rebuild_all<F>(
        &self,
        entity_type: &str,
        is_cancelled: F,
    ) -> Result<RebuildOutcome, SyncError>
    where
        F: Fn() -> bool,
    {
        let start_time = current_timestamp_millis();
        let estimate = self.log.count_by_method(Method::Create).ok();
        self.publisher.publish(Notification::ReplayStarted {
            total: estimate,
            start_time,
        });
        info!(entity_type, estimate = ?estimate, "Rebuild started");

        let records = match self.log.find_by_type(entity_type) {
            Ok(records) => records,
            Err(e) => {
                error!(entity_type, error = %e, "Rebuild aborted: event log unreadable");
                self.publisher.publish(Notification::ReplayFinished { total: 0, start_time });
                return Err(SyncError::RebuildFailed(e));
            }
        };

        let groups = group_by_entity(records);
        let folded = fold_all_entities(&groups);
        let mut report = RebuildReport {
            total: groups.len() as u64,
            ..Default::default()
        };
        let mut throttle = ProgressThrottle::new(report.total, self.progress_interval);

        for (processed, ((entity_id, result), (_, history))) in
            folded.into_iter().zip(groups.iter()).enumerate()
        {
            if is_cancelled() {
                info!(entity_type, processed, "Rebuild cancelled");
                return Ok(RebuildOutcome::Cancelled(report));
            }

            match self.materialize(&entity_id, result, history) {
                EntityOutcome::Inserted => report.inserted += 1,
                EntityOutcome::Existing => report.skipped_existing += 1,
                EntityOutcome::Absent => report.skipped_absent += 1,
                EntityOutcome::Corrupt => report.corrupt += 1,
                EntityOutcome::Failed => report.failed += 1,
            }

            if let Some(percent) = throttle.tick(processed as u64 + 1) {
                if is_cancelled() {
                    info!(entity_type, processed, "Rebuild cancelled");
                    return Ok(RebuildOutcome::Cancelled(report));
                }
                self.publisher.publish(Notification::ReplayProgress {
                    total: report.total,
                    start_time,
                    percent,
                });
            }
        }

        if is_cancelled() {
            info!(entity_type, "Rebuild cancelled");
            return Ok(RebuildOutcome::Cancelled(report));
        }

        self.publisher.publish(Notification::ReplayFinished {
            total: report.total,
            start_time,
        });
        info!(
            entity_type,
            total = report.total,
            inserted = report.inserted,
            skipped_existing = report.skipped_existing,
            corrupt = report.corrupt,
            failed = report.failed,
            elapsed_ms = elapsed_millis(start_time),
            "Rebuild finished"
        );

        Ok(RebuildOutcome::Finished(report))
    }

    /// Drop every application store row
    pub fn reset(&self) -> Result<usize, SyncError> {
        let removed = self.store.clear()?;
        self.publisher.publish(Notification::StoreCleared { removed });
        info!(removed, "Application store cleared");
        Ok(removed)
    }

    fn materialize(
        &self,
        entity_id: &str,
        folded: ReplayResult<Folded>,
        snapshot: &[StateChangeRecord],
    ) -> EntityOutcome {
        let entity = match folded {
            Ok(Folded::Live(entity)) => entity,
            // DELETE is terminal, so a tombstone can never come back to life
            Ok(Folded::Tombstone) | Ok(Folded::Missing) => return EntityOutcome::Absent,
            Err(e) => {
                warn!(entity_id, error = %e, "Skipping entity with corrupt history");
                return EntityOutcome::Corrupt;
            }
        };

        let _guard = self.locks.lock(entity_id);

        match self.store.contains(entity_id) {
            Ok(true) => return EntityOutcome::Existing,
            Ok(false) => {}
            Err(e) => {
                warn!(entity_id, error = %e, "Skipping entity: application store unreadable");
                return EntityOutcome::Failed;
            }
        }

        let entity = match self.refresh_if_stale(entity_id, entity, snapshot) {
            Ok(Some(entity)) => entity,
            Ok(None) => return EntityOutcome::Absent,
            Err(outcome) => return outcome,
        };

        match self.store.insert_if_absent(entity) {
            Ok(true) => EntityOutcome::Inserted,
            Ok(false) => EntityOutcome::Existing,
            Err(e) => {
                warn!(entity_id, error = %e, "Skipping entity: insert failed");
                EntityOutcome::Failed
            }
        }
    }

    /// Refold from the live log when records were appended after the snapshot
    fn refresh_if_stale(
        &self,
        entity_id: &str,
        entity: MaterializedEntity,
        snapshot: &[StateChangeRecord],
    ) -> Result<Option<MaterializedEntity>, EntityOutcome> {
        let snapshot_seq = snapshot.iter().map(|r| r.seq).max();
        let latest_seq = self.log.last_sequence(entity_id).map_err(|e| {
            warn!(entity_id, error = %e, "Skipping entity: history unreadable");
            EntityOutcome::Failed
        })?;

        if latest_seq == snapshot_seq {
            return Ok(Some(entity));
        }

        let history = self.log.find_by_entity(entity_id).map_err(|e| {
            warn!(entity_id, error = %e, "Skipping entity: history unreadable");
            EntityOutcome::Failed
        })?;

        match fold_entity_history(&history) {
            Ok(folded) => Ok(folded.into_live()),
            Err(e) => {
                warn!(entity_id, error = %e, "Skipping entity with corrupt history");
                Err(EntityOutcome::Corrupt)
            }
        }
    }
}
