//! Materialized entity rows for the application store

use serde::{Deserialize, Serialize};

use super::Attributes;

/// Primary-key attribute name of a materialized entity
pub const ID_KEY: &str = "_id";

/// Current state of one entity: the flat merge of its CREATE and UPDATE changes
///
/// Serializes as a single flat object, e.g. `{"_id": "...", "title": "Dune"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterializedEntity {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(flatten)]
    pub attributes: Attributes,
}

impl MaterializedEntity {
    /// Create an entity with no attributes besides its id
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            attributes: Attributes::new(),
        }
    }

    /// Create an entity from a CREATE changes map
    pub fn with_attributes(id: impl Into<String>, attributes: &Attributes) -> Self {
        let mut entity = Self::new(id);
        entity.merge(attributes);
        entity
    }

    /// Merge a changes map; later keys overwrite earlier ones, `_id` is never touched
    pub fn merge(&mut self, changes: &Attributes) {
        for (key, value) in changes {
            if key == ID_KEY {
                continue;
            }
            self.attributes.insert(key.clone(), value.clone());
        }
    }

    /// Look up a single attribute
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.attributes.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn attrs(value: serde_json::Value) -> Attributes {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_serializes_flat_with_id() {
        let entity = MaterializedEntity::with_attributes("b-1", &attrs(json!({"title": "Dune"})));
        let value = serde_json::to_value(&entity).unwrap();
        assert_eq!(value, json!({"_id": "b-1", "title": "Dune"}));

        let parsed: MaterializedEntity = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, entity);
    }

    #[test]
    fn test_merge_overwrites_and_keeps_id() {
        let mut entity = MaterializedEntity::with_attributes(
            "b-1",
            &attrs(json!({"title": "Dune", "author": "Herbert"})),
        );
        entity.merge(&attrs(json!({"author": "Frank Herbert", "_id": "hijack"})));

        assert_eq!(entity.id, "b-1");
        assert_eq!(entity.get("author"), Some(&json!("Frank Herbert")));
        assert_eq!(entity.get("title"), Some(&json!("Dune")));
        assert!(entity.get("_id").is_none());
    }
}
