//! Library Catalog
//!
//! An event-sourced book catalog. Every create, update and delete is appended
//! to an event log as a state-change record; current state is derived by
//! replaying the log. An optional CQRS mode maintains a materialized
//! application store that serves reads instead.
//!
//! # Modules
//!
//! - `types`: State-change records, materialized entities, counts
//! - `event_store`: Append-only JSONL event log with an in-memory index
//! - `replay`: Grouping and folding of entity histories
//! - `app_store`: Materialized rows keyed by entity id
//! - `cqrs`: The CQRS flag and rebuild cancellation
//! - `sync`: Full rebuilds and purges of the application store
//! - `pipeline`: Validated writes with per-entity locking
//! - `notify`: Typed notifications over a broadcast channel
//! - `catalog`: The `Catalog` facade exposing every command and read
//! - `api`: Axum REST router and WebSocket notification stream
//! - `config`: Environment configuration
//! - `utils`: Timestamps
//!
//! # Example
//!
//! ```no_run
//! use library_catalog::{Catalog, CatalogConfig};
//! use serde_json::json;
//!
//! let catalog = Catalog::open(CatalogConfig::from_env()).unwrap();
//! let attributes = json!({"title": "Dune"}).as_object().cloned().unwrap();
//! let id = catalog.create(attributes, "ann").unwrap();
//! assert!(catalog.get_book(&id).unwrap().is_some());
//! ```

pub mod api;
pub mod app_store;
pub mod catalog;
pub mod config;
pub mod cqrs;
pub mod error;
pub mod event_store;
pub mod notify;
pub mod pipeline;
pub mod replay;
pub mod sync;
pub mod types;
pub mod utils;

// Re-export commonly used items at crate root
pub use app_store::{ApplicationStore, InMemoryApplicationStore};
pub use catalog::{BookPage, BulkReport, Catalog, RebuildHandle, ToggleResult};
pub use config::CatalogConfig;
pub use cqrs::CqrsMode;
pub use error::{CatalogError, CatalogResult};
pub use event_store::{EventLog, EventStore, EventStoreConfig};
pub use notify::{Envelope, Notification};
pub use replay::{fold_entity_history, Folded, ReplayError};
pub use sync::{RebuildOutcome, RebuildReport};
pub use types::{
    Attributes, MaterializedEntity, Method, PendingRecord, StateChangeCounts, StateChangeRecord,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
