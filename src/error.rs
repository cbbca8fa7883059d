//! Crate-level error types for catalog commands and reads

use crate::app_store::AppStoreError;
use crate::event_store::EventStoreError;
use crate::replay::ReplayError;
use crate::sync::SyncError;

/// Result type for catalog operations
pub type CatalogResult<T> = Result<T, CatalogError>;

/// Error returned by a catalog command or read
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// The entity has no history, or its last record is a DELETE
    #[error("entity '{0}' not found")]
    NotFound(String),

    /// An update carried an empty changes map; nothing was appended
    #[error("update of '{0}' carries no changes")]
    NoOpUpdate(String),

    /// Attributes or changes that can never be stored
    #[error("invalid attributes: {0}")]
    InvalidAttributes(String),

    /// The entity's record sequence violates the state machine
    #[error(transparent)]
    CorruptHistory(#[from] ReplayError),

    /// The event log rejected an append or could not be read
    #[error("persistence failure: {0}")]
    PersistenceFailure(#[from] EventStoreError),

    /// The application store rejected a read or write
    #[error(transparent)]
    Store(#[from] AppStoreError),

    /// A full rebuild could not read the event log
    #[error("rebuild failed: {0}")]
    RebuildFailed(#[source] EventStoreError),

    /// A background task panicked or was aborted
    #[error("background task failed: {0}")]
    Join(String),
}

impl From<SyncError> for CatalogError {
    fn from(e: SyncError) -> Self {
        match e {
            SyncError::RebuildFailed(source) => CatalogError::RebuildFailed(source),
            SyncError::Store(source) => CatalogError::Store(source),
        }
    }
}

impl From<tokio::task::JoinError> for CatalogError {
    fn from(e: tokio::task::JoinError) -> Self {
        CatalogError::Join(e.to_string())
    }
}
