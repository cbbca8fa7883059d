//! Shared application state for HTTP handlers

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::catalog::Catalog;
use crate::notify::Envelope;

/// State handed to every axum handler
pub struct AppState {
    pub catalog: Arc<Catalog>,
}

impl AppState {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self { catalog }
    }

    /// Get the current sequence ID
    pub fn current_sequence_id(&self) -> u64 {
        self.catalog.current_sequence_id()
    }

    /// Subscribe to receive notification envelopes
    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.catalog.subscribe()
    }
}
