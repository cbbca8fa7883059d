//! Two-phase fold: group records by entity, then reduce each group
//!
//! Every function here is pure. Errors are returned to the caller as-is.

use std::collections::HashMap;

use crate::types::{MaterializedEntity, Method, StateChangeRecord};

/// Result type for replay operations
pub type ReplayResult<T> = Result<T, ReplayError>;

/// Errors raised while folding an entity history
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReplayError {
    /// The history violates CREATE-first / UPDATE-interior / DELETE-last
    #[error("corrupt history for entity '{entity_id}': {reason}")]
    CorruptHistory { entity_id: String, reason: String },
}

impl ReplayError {
    fn corrupt(entity_id: &str, reason: impl Into<String>) -> Self {
        ReplayError::CorruptHistory {
            entity_id: entity_id.to_string(),
            reason: reason.into(),
        }
    }
}

/// Outcome of folding one entity history
#[derive(Debug, Clone, PartialEq)]
pub enum Folded {
    /// No records at all: the entity was never created
    Missing,
    /// Created, then deleted
    Tombstone,
    /// Current state
    Live(MaterializedEntity),
}

impl Folded {
    /// The materialized entity, if the history ends alive
    pub fn into_live(self) -> Option<MaterializedEntity> {
        match self {
            Folded::Live(entity) => Some(entity),
            Folded::Missing | Folded::Tombstone => None,
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self, Folded::Live(_))
    }
}

/// Fold one entity's history, already ascending by `(timestamp, seq)`
pub fn fold_entity_history(records: &[StateChangeRecord]) -> ReplayResult<Folded> {
    let Some(first) = records.first() else {
        return Ok(Folded::Missing);
    };
    let entity_id = first.entity_id.as_str();

    if let Some(stranger) = records.iter().find(|r| r.entity_id != entity_id) {
        return Err(ReplayError::corrupt(
            entity_id,
            format!("record {} belongs to entity '{}'", stranger.id, stranger.entity_id),
        ));
    }

    if first.method != Method::Create {
        return Err(ReplayError::corrupt(
            entity_id,
            format!("first record is {}, expected CREATE", first.method),
        ));
    }

    let ends_deleted = records.len() > 1 && records[records.len() - 1].method == Method::Delete;
    let interior_end = if ends_deleted { records.len() - 1 } else { records.len() };

    // Interior records must be UPDATEs even when the history ends in DELETE
    for record in &records[1..interior_end] {
        if record.method != Method::Update {
            return Err(ReplayError::corrupt(
                entity_id,
                format!(
                    "record seq {} is {} after CREATE, expected UPDATE",
                    record.seq, record.method
                ),
            ));
        }
    }

    if ends_deleted {
        return Ok(Folded::Tombstone);
    }

    let mut entity = MaterializedEntity::new(entity_id);
    for record in records {
        if let Some(changes) = &record.changes {
            entity.merge(changes);
        }
    }

    Ok(Folded::Live(entity))
}

/// Group records by entity id
///
/// Groups keep the order in which each entity first appears; records inside
/// a group are sorted ascending by `(timestamp, seq)`.
pub fn group_by_entity(records: Vec<StateChangeRecord>) -> Vec<(String, Vec<StateChangeRecord>)> {
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<(String, Vec<StateChangeRecord>)> = Vec::new();

    for record in records {
        match positions.get(&record.entity_id) {
            Some(&i) => groups[i].1.push(record),
            None => {
                positions.insert(record.entity_id.clone(), groups.len());
                groups.push((record.entity_id.clone(), vec![record]));
            }
        }
    }

    for (_, history) in &mut groups {
        history.sort_by_key(|r| r.order_key());
    }

    groups
}

/// Fold every group independently; one corrupt entity does not affect the others
pub fn fold_all_entities(
    groups: &[(String, Vec<StateChangeRecord>)],
) -> Vec<(String, ReplayResult<Folded>)> {
    groups
        .iter()
        .map(|(entity_id, history)| (entity_id.clone(), fold_entity_history(history)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::types::Attributes;

    fn record(
        seq: u64,
        entity_id: &str,
        method: Method,
        ts: i64,
        changes: serde_json::Value,
    ) -> StateChangeRecord {
        let changes: Option<Attributes> = changes.as_object().cloned();
        StateChangeRecord {
            id: format!("r-{}", seq),
            seq,
            entity_id: entity_id.to_string(),
            entity_type: "Book".to_string(),
            method,
            timestamp: ts,
            changes,
            user: "ann".to_string(),
        }
    }

    #[test]
    fn test_empty_history_is_missing() {
        assert_eq!(fold_entity_history(&[]).unwrap(), Folded::Missing);
    }

    #[test]
    fn test_create_then_updates_merge_in_order() {
        let history = vec![
            record(1, "b", Method::Create, 1, json!({"title": "Dune", "author": "Herbert"})),
            record(2, "b", Method::Update, 2, json!({"author": "Frank Herbert"})),
            record(3, "b", Method::Update, 3, json!({"year": 1965})),
        ];

        let entity = fold_entity_history(&history).unwrap().into_live().unwrap();
        assert_eq!(
            serde_json::to_value(&entity).unwrap(),
            json!({"_id": "b", "title": "Dune", "author": "Frank Herbert", "year": 1965})
        );
    }

    #[test]
    fn test_fold_is_deterministic() {
        let history = vec![
            record(1, "b", Method::Create, 1, json!({"z": 1, "a": 2, "m": 3})),
            record(2, "b", Method::Update, 2, json!({"a": 4, "q": 5})),
        ];

        let fold = || fold_entity_history(&history).unwrap().into_live();
        let first = serde_json::to_string(&fold()).unwrap();
        let second = serde_json::to_string(&fold()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_create_then_delete_is_tombstone() {
        let history = vec![
            record(1, "b", Method::Create, 1, json!({"title": "A"})),
            record(2, "b", Method::Delete, 2, serde_json::Value::Null),
        ];
        assert_eq!(fold_entity_history(&history).unwrap(), Folded::Tombstone);
    }

    #[test]
    fn test_updates_before_delete_still_tombstone() {
        let history = vec![
            record(1, "b", Method::Create, 1, json!({"title": "A"})),
            record(2, "b", Method::Update, 2, json!({"title": "B"})),
            record(3, "b", Method::Delete, 3, serde_json::Value::Null),
        ];
        assert_eq!(fold_entity_history(&history).unwrap(), Folded::Tombstone);
    }

    #[test]
    fn test_update_first_is_corrupt() {
        let history = vec![record(1, "b", Method::Update, 1, json!({"title": "A"}))];
        assert!(matches!(
            fold_entity_history(&history),
            Err(ReplayError::CorruptHistory { .. })
        ));
    }

    #[test]
    fn test_lone_delete_is_corrupt() {
        let history = vec![record(1, "b", Method::Delete, 1, serde_json::Value::Null)];
        assert!(fold_entity_history(&history).is_err());
    }

    #[test]
    fn test_record_after_delete_is_corrupt() {
        let history = vec![
            record(1, "b", Method::Create, 1, json!({"title": "A"})),
            record(2, "b", Method::Delete, 2, serde_json::Value::Null),
            record(3, "b", Method::Update, 3, json!({"title": "B"})),
        ];
        let err = fold_entity_history(&history).unwrap_err();
        assert!(err.to_string().contains("DELETE"));
    }

    #[test]
    fn test_interior_create_is_corrupt_even_when_deleted() {
        let history = vec![
            record(1, "b", Method::Create, 1, json!({})),
            record(2, "b", Method::Create, 2, json!({})),
            record(3, "b", Method::Delete, 3, serde_json::Value::Null),
        ];
        assert!(fold_entity_history(&history).is_err());
    }

    #[test]
    fn test_mixed_entities_is_corrupt() {
        let history = vec![
            record(1, "a", Method::Create, 1, json!({})),
            record(2, "b", Method::Update, 2, json!({})),
        ];
        assert!(fold_entity_history(&history).is_err());
    }

    #[test]
    fn test_id_in_changes_is_ignored() {
        let history = vec![record(
            1,
            "b",
            Method::Create,
            1,
            json!({"_id": "other", "title": "A"}),
        )];
        let entity = fold_entity_history(&history).unwrap().into_live().unwrap();
        assert_eq!(entity.id, "b");
        assert!(entity.get("_id").is_none());
    }

    #[test]
    fn test_group_by_entity_sorts_each_group() {
        let records = vec![
            record(1, "a", Method::Update, 20, json!({"n": 2})),
            record(2, "b", Method::Create, 5, json!({})),
            record(3, "a", Method::Create, 10, json!({"n": 1})),
            record(4, "a", Method::Update, 20, json!({"n": 3})),
        ];

        let groups = group_by_entity(records);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, "a");
        let seqs: Vec<u64> = groups[0].1.iter().map(|r| r.seq).collect();
        assert_eq!(seqs, vec![3, 1, 4]);

        let folded = fold_all_entities(&groups);
        let a = folded[0].1.clone().unwrap().into_live().unwrap();
        assert_eq!(a.get("n"), Some(&json!(3)));
    }

    #[test]
    fn test_fold_all_isolates_corrupt_groups() {
        let records = vec![
            record(1, "good", Method::Create, 1, json!({"title": "A"})),
            record(2, "bad", Method::Update, 1, json!({"title": "B"})),
            record(3, "gone", Method::Create, 1, json!({})),
            record(4, "gone", Method::Delete, 2, serde_json::Value::Null),
        ];

        let folded = fold_all_entities(&group_by_entity(records));
        assert_eq!(folded.len(), 3);
        assert!(folded[0].1.as_ref().unwrap().is_live());
        assert!(folded[1].1.is_err());
        assert_eq!(folded[2].1, Ok(Folded::Tombstone));
    }
}
