//! Data types for the Library Catalog
//!
//! This module contains the core data structures shared by the event log,
//! the replay engine and the application store.

mod entity;
mod record;
mod summary;

pub use entity::{MaterializedEntity, ID_KEY};
pub use record::{Method, PendingRecord, StateChangeRecord};
pub use summary::StateChangeCounts;

/// Partial attribute map: property name -> new value
pub type Attributes = serde_json::Map<String, serde_json::Value>;

/// Entity type tag used for books
pub const BOOK_ENTITY_TYPE: &str = "Book";

/// Default user for serde deserialization
pub fn default_user() -> String {
    "system".to_string()
}
