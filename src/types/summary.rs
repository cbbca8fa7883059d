//! Summary types for event log statistics

use serde::{Deserialize, Serialize};

/// Committed record counts, by method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct StateChangeCounts {
    #[serde(rename = "createCount")]
    pub create_count: u64,
    #[serde(rename = "updateCount")]
    pub update_count: u64,
    #[serde(rename = "deleteCount")]
    pub delete_count: u64,
    #[serde(rename = "totalCount")]
    pub total_count: u64,
}

impl StateChangeCounts {
    /// Build counts from the three per-method values
    pub fn new(create_count: u64, update_count: u64, delete_count: u64) -> Self {
        Self {
            create_count,
            update_count,
            delete_count,
            total_count: create_count + update_count + delete_count,
        }
    }
}
