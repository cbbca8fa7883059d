//! Replay Engine
//!
//! Derives current entity state from the event log by grouping records per
//! entity and folding each group through the CREATE/UPDATE/DELETE state
//! machine:
//!
//! ```text
//! records ──► group_by_entity ──► fold_entity_history (per group) ──► Live | Tombstone | Missing
//! ```
//!
//! The same log always folds to the same result: groups are sorted by
//! `(timestamp, seq)` and attribute maps are key-ordered.

mod fold;

pub use fold::{
    fold_all_entities, fold_entity_history, group_by_entity, Folded, ReplayError, ReplayResult,
};
