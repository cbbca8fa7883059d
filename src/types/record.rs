//! State-change records for Event Sourcing
//!
//! A `StateChangeRecord` is one immutable CREATE/UPDATE/DELETE fact about one
//! entity. Records are appended to the event log and never rewritten; the
//! current state of an entity is derived by folding its records in order.

use serde::{Deserialize, Serialize};

use super::{default_user, Attributes};

/// Kind of mutation a record describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Method {
    /// First record of every entity history
    Create,
    /// Partial attribute change
    Update,
    /// Terminal record; the entity no longer exists afterwards
    Delete,
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Method::Create => write!(f, "CREATE"),
            Method::Update => write!(f, "UPDATE"),
            Method::Delete => write!(f, "DELETE"),
        }
    }
}

/// A record accepted by the event log but not yet stamped
///
/// The store assigns `id`, `seq` and (unless given) `timestamp` at append time.
#[derive(Debug, Clone)]
pub struct PendingRecord {
    pub entity_id: String,
    pub entity_type: String,
    pub method: Method,
    pub changes: Option<Attributes>,
    pub user: String,
    /// Explicit timestamp in milliseconds, used by imports
    pub timestamp: Option<i64>,
}

impl PendingRecord {
    pub fn create(entity_id: String, entity_type: &str, changes: Attributes, user: String) -> Self {
        Self {
            entity_id,
            entity_type: entity_type.to_string(),
            method: Method::Create,
            changes: Some(changes),
            user,
            timestamp: None,
        }
    }

    pub fn update(entity_id: String, entity_type: &str, changes: Attributes, user: String) -> Self {
        Self {
            entity_id,
            entity_type: entity_type.to_string(),
            method: Method::Update,
            changes: Some(changes),
            user,
            timestamp: None,
        }
    }

    pub fn delete(entity_id: String, entity_type: &str, user: String) -> Self {
        Self {
            entity_id,
            entity_type: entity_type.to_string(),
            method: Method::Delete,
            changes: None,
            user,
            timestamp: None,
        }
    }

    /// Pin the record to a specific timestamp
    pub fn at(mut self, timestamp: i64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// An immutable record in the event log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateChangeRecord {
    /// Opaque record id, assigned at append time
    pub id: String,

    /// Append order within the log; tie-breaker for equal timestamps
    pub seq: u64,

    #[serde(rename = "entityId")]
    pub entity_id: String,

    #[serde(rename = "entityType")]
    pub entity_type: String,

    pub method: Method,

    /// Milliseconds since the Unix epoch
    #[serde(rename = "ts")]
    pub timestamp: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changes: Option<Attributes>,

    #[serde(default = "default_user")]
    pub user: String,
}

impl StateChangeRecord {
    /// Sort key giving the canonical order inside one entity history
    pub fn order_key(&self) -> (i64, u64) {
        (self.timestamp, self.seq)
    }

    /// Serialize record to JSON string (for JSONL)
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize record from JSON string
    pub fn from_json_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_method_serialization() {
        let json = serde_json::to_string(&Method::Create).unwrap();
        assert_eq!(json, "\"CREATE\"");

        let parsed: Method = serde_json::from_str("\"DELETE\"").unwrap();
        assert_eq!(parsed, Method::Delete);
    }

    #[test]
    fn test_record_json_line() {
        let changes = json!({"title": "Dune"}).as_object().cloned().unwrap();
        let record = StateChangeRecord {
            id: "r-1".to_string(),
            seq: 1,
            entity_id: "b-1".to_string(),
            entity_type: "Book".to_string(),
            method: Method::Create,
            timestamp: 1_704_067_200_000,
            changes: Some(changes),
            user: "ann".to_string(),
        };

        let line = record.to_json_line().unwrap();
        assert!(line.contains("\"entityId\":\"b-1\""));
        assert!(line.contains("\"method\":\"CREATE\""));
        assert!(line.contains("\"ts\":1704067200000"));

        let parsed = StateChangeRecord::from_json_line(&line).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn test_delete_record_omits_changes() {
        let record = StateChangeRecord {
            id: "r-2".to_string(),
            seq: 2,
            entity_id: "b-1".to_string(),
            entity_type: "Book".to_string(),
            method: Method::Delete,
            timestamp: 5,
            changes: None,
            user: "ann".to_string(),
        };

        let line = record.to_json_line().unwrap();
        assert!(!line.contains("changes"));
    }

    #[test]
    fn test_order_key_breaks_ties_by_seq() {
        let mut a = StateChangeRecord {
            id: "a".to_string(),
            seq: 7,
            entity_id: "b".to_string(),
            entity_type: "Book".to_string(),
            method: Method::Update,
            timestamp: 100,
            changes: None,
            user: "x".to_string(),
        };
        let mut b = a.clone();
        b.seq = 3;
        assert!(b.order_key() < a.order_key());

        a.timestamp = 99;
        assert!(a.order_key() < b.order_key());
    }
}
