//! Notification types published by the catalog engine

use serde::{Deserialize, Serialize};

use crate::types::{Attributes, MaterializedEntity, StateChangeRecord};

/// Notifications emitted on the publish channel
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Notification {
    /// The CQRS flag was flipped
    CqrsStatusChanged { enabled: bool },

    /// A full rebuild began; `total` is an estimate and may be unknown
    ReplayStarted {
        #[serde(skip_serializing_if = "Option::is_none")]
        total: Option<u64>,
        start_time: i64,
    },

    /// Throttled rebuild progress
    ReplayProgress { total: u64, start_time: i64, percent: u8 },

    /// A rebuild completed (or failed, with `total` 0)
    ReplayFinished { total: u64, start_time: i64 },

    /// A book was created
    EntityCreated {
        entity: MaterializedEntity,
        record: StateChangeRecord,
    },

    /// A book was updated
    EntityUpdated {
        entity_id: String,
        changes: Attributes,
        record: StateChangeRecord,
    },

    /// A book was deleted
    EntityRemoved { entity_id: String, user: String },

    /// The application store was purged
    StoreCleared { removed: usize },

    /// A bulk import began
    BulkStarted { total: u64, start_time: i64 },

    /// Throttled bulk import progress
    BulkProgress { total: u64, start_time: i64, percent: u8 },

    /// A bulk import ended
    BulkFinished {
        total: u64,
        start_time: i64,
        created: u64,
    },
}

/// Channel message wrapper with metadata
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(flatten)]
    pub notification: Notification,

    /// Monotonically increasing sequence ID for gap detection
    pub sequence_id: u64,

    /// Unix timestamp (milliseconds) when the notification was published
    pub timestamp: i64,
}

/// Client message types
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Ping for heartbeat
    Ping,
}

/// Welcome message sent on connection
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WelcomeMessage {
    #[serde(rename = "type")]
    pub msg_type: String,
    pub current_sequence_id: u64,
    pub cqrs_enabled: bool,
}

impl WelcomeMessage {
    pub fn new(current_sequence_id: u64, cqrs_enabled: bool) -> Self {
        Self {
            msg_type: "connected".to_string(),
            current_sequence_id,
            cqrs_enabled,
        }
    }
}

/// Pong response message
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PongMessage {
    #[serde(rename = "type")]
    pub msg_type: String,
}

impl Default for PongMessage {
    fn default() -> Self {
        Self {
            msg_type: "pong".to_string(),
        }
    }
}
