//! Catalog - the engine facade
//!
//! Owns the CQRS selector, the event log, the application store and the
//! notification channel, and exposes every inbound command. Reads are routed
//! per request: the application store when CQRS is enabled, an on-demand
//! replay of the event log otherwise.

mod bulk;
mod handle;

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::app_store::{ApplicationStore, InMemoryApplicationStore};
use crate::config::CatalogConfig;
use crate::cqrs::{CqrsMode, RebuildTicket, StoreSelector};
use crate::error::CatalogResult;
use crate::event_store::{EventLog, EventStore};
use crate::notify::{Broadcaster, Envelope, Notification, Publisher};
use crate::pipeline::{EntityLocks, WritePipeline};
use crate::replay::{fold_all_entities, fold_entity_history, group_by_entity};
use crate::sync::{RebuildOutcome, Synchronizer};
use crate::types::{
    Attributes, MaterializedEntity, StateChangeCounts, StateChangeRecord, BOOK_ENTITY_TYPE,
};

pub use bulk::BulkReport;
pub use handle::RebuildHandle;

/// Result of `Catalog::toggle_cqrs`
pub struct ToggleResult {
    pub mode: CqrsMode,
    /// Present when the toggle enabled CQRS
    pub rebuild: Option<RebuildHandle>,
}

/// One page of books
#[derive(Debug, Clone, Serialize)]
pub struct BookPage {
    pub items: Vec<MaterializedEntity>,
    pub total: usize,
}

/// Event-sourced book catalog with optional CQRS projection
pub struct Catalog {
    config: CatalogConfig,
    entity_type: String,
    log: Arc<dyn EventLog>,
    store: Arc<dyn ApplicationStore>,
    selector: Arc<StoreSelector>,
    broadcaster: Arc<Broadcaster>,
    pipeline: WritePipeline,
    synchronizer: Synchronizer,
}

impl Catalog {
    /// Open the JSONL event log under `config.data_dir`
    pub fn open(config: CatalogConfig) -> CatalogResult<Self> {
        let log = Arc::new(EventStore::open(config.event_store())?);
        Ok(Self::with_parts(
            config,
            log,
            Arc::new(InMemoryApplicationStore::new()),
        ))
    }

    /// Catalog whose event log lives in memory only
    pub fn in_memory(config: CatalogConfig) -> Self {
        Self::with_parts(
            config,
            Arc::new(EventStore::in_memory()),
            Arc::new(InMemoryApplicationStore::new()),
        )
    }

    /// Assemble a catalog from explicit backends
    pub fn with_parts(
        config: CatalogConfig,
        log: Arc<dyn EventLog>,
        store: Arc<dyn ApplicationStore>,
    ) -> Self {
        let entity_type = BOOK_ENTITY_TYPE.to_string();
        let selector = Arc::new(StoreSelector::new(config.cqrs_enabled));
        let broadcaster = Arc::new(Broadcaster::default());
        let locks = Arc::new(EntityLocks::new());

        let pipeline = WritePipeline::new(
            entity_type.clone(),
            Arc::clone(&log),
            Arc::clone(&store),
            Arc::clone(&selector),
            broadcaster.clone(),
            Arc::clone(&locks),
        );
        let synchronizer = Synchronizer::new(
            Arc::clone(&log),
            Arc::clone(&store),
            broadcaster.clone(),
            locks,
            config.progress_interval,
        );

        Self {
            config,
            entity_type,
            log,
            store,
            selector,
            broadcaster,
            pipeline,
            synchronizer,
        }
    }

    pub fn config(&self) -> &CatalogConfig {
        &self.config
    }

    /// Run the startup rebuild when CQRS starts enabled
    pub fn start(self: &Arc<Self>) -> CatalogResult<Option<RebuildHandle>> {
        if !self.selector.is_enabled() {
            return Ok(None);
        }
        info!("CQRS enabled at startup, rebuilding application store");
        self.spawn_rebuild(self.selector.ticket()).map(Some)
    }

    // ---- Commands ----

    pub fn create(&self, attributes: Attributes, user: &str) -> CatalogResult<String> {
        self.pipeline.create_entity(attributes, user)
    }

    pub fn update(
        &self,
        entity_id: &str,
        changes: Attributes,
        user: &str,
    ) -> CatalogResult<StateChangeRecord> {
        self.pipeline.update_entity(entity_id, changes, user)
    }

    pub fn delete(&self, entity_id: &str, user: &str) -> CatalogResult<String> {
        self.pipeline.delete_entity(entity_id, user)
    }

    pub fn cqrs_status(&self) -> bool {
        self.selector.is_enabled()
    }

    pub fn cqrs_mode(&self) -> CqrsMode {
        self.selector.mode()
    }

    /// Flip the CQRS flag
    ///
    /// The flag flips and `cqrs-status-changed` is published before the
    /// rebuild starts, so a read right after enabling may see a partial store.
    /// The rebuild runs on the tokio blocking pool when called inside a
    /// runtime and on its own thread otherwise. If it cannot be started the
    /// flag is flipped back.
    pub fn toggle_cqrs(self: &Arc<Self>) -> CatalogResult<ToggleResult> {
        let toggle = self.selector.toggle();
        let enabled = toggle.mode.is_enabled();
        info!(enabled, "CQRS toggled");
        self.broadcaster
            .publish(Notification::CqrsStatusChanged { enabled });

        let rebuild = match toggle.rebuild {
            Some(ticket) => match self.spawn_rebuild(ticket) {
                Ok(handle) => Some(handle),
                Err(e) => {
                    error!(error = %e, "Rebuild could not start, reverting CQRS toggle");
                    let reverted = self.selector.toggle();
                    self.broadcaster.publish(Notification::CqrsStatusChanged {
                        enabled: reverted.mode.is_enabled(),
                    });
                    return Err(e);
                }
            },
            None => None,
        };

        Ok(ToggleResult {
            mode: toggle.mode,
            rebuild,
        })
    }

    /// Rebuild the application store regardless of the flag
    pub fn replay_all(self: &Arc<Self>) -> CatalogResult<RebuildHandle> {
        self.spawn_rebuild(self.selector.ticket())
    }

    /// Run a rebuild on the current thread
    pub fn rebuild(&self, ticket: RebuildTicket) -> CatalogResult<RebuildOutcome> {
        Ok(self
            .synchronizer
            .rebuild_all(&self.entity_type, || self.selector.is_cancelled(ticket))?)
    }

    /// Ticket for a rebuild started now
    pub fn rebuild_ticket(&self) -> RebuildTicket {
        self.selector.ticket()
    }

    fn spawn_rebuild(self: &Arc<Self>, ticket: RebuildTicket) -> CatalogResult<RebuildHandle> {
        let catalog = Arc::clone(self);
        RebuildHandle::spawn(move || catalog.rebuild(ticket))
    }

    /// Administrator purge of the application store
    pub fn purge(&self) -> CatalogResult<usize> {
        Ok(self.synchronizer.reset()?)
    }

    // ---- Queries ----

    pub fn count_state_changes(&self) -> CatalogResult<StateChangeCounts> {
        Ok(self.log.counts()?)
    }

    /// Ordered history of one entity; empty if it never existed
    pub fn history(&self, entity_id: &str) -> CatalogResult<Vec<StateChangeRecord>> {
        Ok(self.log.find_by_entity(entity_id)?)
    }

    /// Current state of one book, if it exists
    pub fn get_book(&self, entity_id: &str) -> CatalogResult<Option<MaterializedEntity>> {
        if self.selector.is_enabled() {
            return Ok(self.store.get(entity_id)?);
        }

        let history = self.log.find_by_entity(entity_id)?;
        Ok(fold_entity_history(&history)?.into_live())
    }

    /// Books ordered by id
    pub fn list_books(&self, offset: usize, limit: usize) -> CatalogResult<BookPage> {
        let books = self.all_books()?;
        let total = books.len();
        let items = books.into_iter().skip(offset).take(limit).collect();
        Ok(BookPage { items, total })
    }

    /// Number of live books
    pub fn count_books(&self) -> CatalogResult<usize> {
        if self.selector.is_enabled() {
            return Ok(self.store.count()?);
        }
        Ok(self.replay_books()?.len())
    }

    fn all_books(&self) -> CatalogResult<Vec<MaterializedEntity>> {
        if self.selector.is_enabled() {
            return Ok(self.store.list()?);
        }
        self.replay_books()
    }

    fn replay_books(&self) -> CatalogResult<Vec<MaterializedEntity>> {
        let groups = group_by_entity(self.log.find_by_type(&self.entity_type)?);

        let mut books: Vec<MaterializedEntity> = fold_all_entities(&groups)
            .into_iter()
            .filter_map(|(entity_id, result)| match result {
                Ok(folded) => folded.into_live(),
                Err(e) => {
                    warn!(
                        entity_id = %entity_id,
                        error = %e,
                        "Skipping entity with corrupt history"
                    );
                    None
                }
            })
            .collect();
        books.sort_by(|a, b| a.id.cmp(&b.id));

        Ok(books)
    }

    // ---- Notifications ----

    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.broadcaster.subscribe()
    }

    pub fn current_sequence_id(&self) -> u64 {
        self.broadcaster.current_sequence_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    use crate::error::CatalogError;
    use crate::event_store::EventStoreResult;
    use crate::types::{Method, PendingRecord};

    fn attrs(value: serde_json::Value) -> Attributes {
        value.as_object().cloned().unwrap()
    }

    fn catalog() -> Arc<Catalog> {
        let config = CatalogConfig {
            progress_interval: Duration::ZERO,
            ..Default::default()
        };
        Arc::new(Catalog::in_memory(config))
    }

    #[test]
    fn test_reads_replay_when_cqrs_disabled() {
        let catalog = catalog();
        let id = catalog.create(attrs(json!({"title": "Dune"})), "ann").unwrap();

        let book = catalog.get_book(&id).unwrap().unwrap();
        assert_eq!(book.get("title"), Some(&json!("Dune")));
        assert_eq!(catalog.count_books().unwrap(), 1);
        assert!(catalog.get_book("unknown").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_toggle_routes_next_read() {
        let catalog = catalog();
        let id = catalog.create(attrs(json!({"title": "Dune"})), "ann").unwrap();

        let toggle = catalog.toggle_cqrs().unwrap();
        assert_eq!(toggle.mode, CqrsMode::CqrsEnabled);
        toggle.rebuild.unwrap().join().await.unwrap();
        assert!(catalog.get_book(&id).unwrap().is_some());

        // Purged store: CQRS reads see nothing, replay reads still see the book
        catalog.purge().unwrap();
        assert!(catalog.get_book(&id).unwrap().is_none());

        let toggle = catalog.toggle_cqrs().unwrap();
        assert!(toggle.rebuild.is_none());
        assert!(catalog.get_book(&id).unwrap().is_some());
    }

    #[test]
    fn test_list_pages_by_id() {
        let catalog = catalog();
        for title in ["A", "B", "C", "D", "E"] {
            catalog.create(attrs(json!({ "title": title })), "ann").unwrap();
        }

        let page = catalog.list_books(1, 2).unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.items.len(), 2);

        let all = catalog.list_books(0, 100).unwrap();
        let ids: Vec<&String> = all.items.iter().map(|b| &b.id).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
        assert_eq!(page.items[0].id, all.items[1].id);
    }

    #[test]
    fn test_corrupt_entity_skipped_in_lists_but_reported_on_get() {
        let log = Arc::new(EventStore::in_memory());
        log.append(PendingRecord::update(
            "broken".to_string(),
            BOOK_ENTITY_TYPE,
            attrs(json!({"title": "?"})),
            "ann".to_string(),
        ))
        .unwrap();
        let catalog = Catalog::with_parts(
            CatalogConfig::default(),
            log,
            Arc::new(InMemoryApplicationStore::new()),
        );
        catalog.create(attrs(json!({"title": "Fine"})), "ann").unwrap();

        assert_eq!(catalog.count_books().unwrap(), 1);
        assert!(matches!(
            catalog.get_book("broken"),
            Err(CatalogError::CorruptHistory(_))
        ));
    }

    #[test]
    fn test_state_change_counts_and_history() {
        let catalog = catalog();
        let id = catalog.create(attrs(json!({"title": "Dune"})), "ann").unwrap();
        catalog.update(&id, attrs(json!({"year": 1965})), "ann").unwrap();
        catalog.delete(&id, "ann").unwrap();
        catalog.create(attrs(json!({"title": "Emma"})), "ann").unwrap();

        let counts = catalog.count_state_changes().unwrap();
        assert_eq!(counts, StateChangeCounts::new(2, 1, 1));

        let methods: Vec<Method> = catalog.history(&id).unwrap().iter().map(|r| r.method).collect();
        assert_eq!(methods, vec![Method::Create, Method::Update, Method::Delete]);
        assert!(catalog.history("unknown").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_startup_rebuild_when_enabled() {
        let config = CatalogConfig {
            cqrs_enabled: true,
            ..Default::default()
        };
        let log = Arc::new(EventStore::in_memory());
        log.append(PendingRecord::create(
            "b-1".to_string(),
            BOOK_ENTITY_TYPE,
            attrs(json!({"title": "Dune"})),
            "ann".to_string(),
        ))
        .unwrap();
        let catalog = Arc::new(Catalog::with_parts(
            config,
            log,
            Arc::new(InMemoryApplicationStore::new()),
        ));

        let outcome = catalog.start().unwrap().unwrap().join().await.unwrap();
        assert_eq!(outcome.report().inserted, 1);
        assert!(catalog.get_book("b-1").unwrap().is_some());
    }

    #[test]
    fn test_stale_ticket_cancels_rebuild() {
        let catalog = catalog();
        catalog.create(attrs(json!({"title": "Dune"})), "ann").unwrap();

        let ticket = catalog.rebuild_ticket();
        catalog.selector.toggle();
        let outcome = catalog.rebuild(ticket).unwrap();
        assert!(outcome.is_cancelled());
    }

    #[test]
    fn test_toggle_without_runtime_rebuilds_on_thread() {
        let catalog = catalog();
        let id = catalog.create(attrs(json!({"title": "Dune"})), "ann").unwrap();

        let toggle = catalog.toggle_cqrs().unwrap();
        assert!(catalog.cqrs_status());
        let outcome = toggle.rebuild.unwrap().join_blocking().unwrap();
        assert_eq!(outcome.report().inserted, 1);
        assert!(catalog.get_book(&id).unwrap().is_some());

        let handle = catalog.replay_all().unwrap();
        assert_eq!(handle.join_blocking().unwrap().report().skipped_existing, 1);
    }

    struct Unreadable;

    impl EventLog for Unreadable {
        fn append(&self, _record: PendingRecord) -> EventStoreResult<StateChangeRecord> {
            Err(crate::event_store::EventStoreError::WriteFailure("down".to_string()))
        }
        fn find_by_entity(&self, _entity_id: &str) -> EventStoreResult<Vec<StateChangeRecord>> {
            Err(crate::event_store::EventStoreError::ReadFailure("down".to_string()))
        }
        fn find_by_type(&self, _entity_type: &str) -> EventStoreResult<Vec<StateChangeRecord>> {
            Err(crate::event_store::EventStoreError::ReadFailure("down".to_string()))
        }
        fn count_by_method(&self, _method: Method) -> EventStoreResult<u64> {
            Ok(0)
        }
    }

    #[test]
    fn test_rebuild_failure_maps_to_rebuild_failed() {
        let catalog = Catalog::with_parts(
            CatalogConfig::default(),
            Arc::new(Unreadable),
            Arc::new(InMemoryApplicationStore::new()),
        );
        let result = catalog.rebuild(catalog.rebuild_ticket());
        assert!(matches!(result, Err(CatalogError::RebuildFailed(_))));
    }
}
