//! Event Store Module for Event Sourcing
//!
//! This module provides the append-only state-change log:
//! - `EventLog`: the storage contract (append, history by entity, counts)
//! - `EventStore`: JSONL-backed (or in-memory) implementation with an index
//!
//! # Architecture
//!
//! ```text
//! Write Path:
//! ┌──────────┐    ┌──────────────┐    ┌──────────────┐
//! │ Pipeline │───►│ stamp id/seq │───►│ append+fsync │───► index
//! └──────────┘    └──────────────┘    │ events.jsonl │
//!                                     └──────────────┘
//!
//! Read Path:
//! ┌──────────────┐    ┌────────────────────┐
//! │ entity id    │───►│ index lookup, sort │───► ordered history
//! └──────────────┘    │ by (ts, seq)       │
//!                     └────────────────────┘
//! ```

mod store;

pub use store::{EventLog, EventStore, EventStoreConfig, EventStoreError, EventStoreResult};
