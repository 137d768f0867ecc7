//! The sync record wire format.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One entity plus its nested child relations, as it travels on the
/// wire.
///
/// `data` holds the entity's scalar columns keyed by column name; a
/// key named after a declared child relation holds an array of nested
/// records instead. `isDeleted` marks a tombstone: the receiver
/// soft-deletes the row by id and does not recurse into children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRecord {
    /// Scalar columns and nested relations.
    pub data: Map<String, Value>,
    /// Tombstone marker.
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_deleted: bool,
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl SyncRecord {
    /// Creates a record from scalar data.
    pub fn new(data: Map<String, Value>) -> Self {
        Self {
            data,
            is_deleted: false,
        }
    }

    /// Creates a tombstone for the given id.
    pub fn tombstone(id: impl Into<String>) -> Self {
        let mut data = Map::new();
        data.insert("id".into(), Value::String(id.into()));
        Self {
            data,
            is_deleted: true,
        }
    }

    /// Returns the record id, if present and a string.
    pub fn id(&self) -> Option<&str> {
        self.data.get("id").and_then(Value::as_str)
    }

    /// Returns the nested child records under a relation name.
    ///
    /// A missing key and an empty array are both "no children".
    pub fn children(&self, relation: &str) -> &[Value] {
        match self.data.get(relation) {
            Some(Value::Array(items)) => items,
            _ => &[],
        }
    }

    /// Nests child records under a relation name.
    pub fn set_children(&mut self, relation: impl Into<String>, children: Vec<SyncRecord>) {
        let items = children
            .into_iter()
            .map(|c| serde_json::to_value(c).unwrap_or(Value::Null))
            .collect();
        self.data.insert(relation.into(), Value::Array(items));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tombstone_wire_shape() {
        let record = SyncRecord::tombstone("p1");
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["data"]["id"], "p1");
        assert_eq!(json["isDeleted"], true);
    }

    #[test]
    fn is_deleted_omitted_when_false() {
        let mut data = Map::new();
        data.insert("id".into(), Value::String("p1".into()));
        let json = serde_json::to_string(&SyncRecord::new(data)).unwrap();
        assert!(!json.contains("isDeleted"));
    }

    #[test]
    fn is_deleted_defaults_false_on_decode() {
        let record: SyncRecord = serde_json::from_str(r#"{"data":{"id":"p1"}}"#).unwrap();
        assert!(!record.is_deleted);
        assert_eq!(record.id(), Some("p1"));
    }

    #[test]
    fn nested_children_round_trip() {
        let mut child_data = Map::new();
        child_data.insert("id".into(), Value::String("e1".into()));
        let child = SyncRecord::new(child_data);

        let mut data = Map::new();
        data.insert("id".into(), Value::String("p1".into()));
        let mut record = SyncRecord::new(data);
        record.set_children("encounters", vec![child]);

        let parsed: SyncRecord =
            serde_json::from_str(&serde_json::to_string(&record).unwrap()).unwrap();
        let children = parsed.children("encounters");
        assert_eq!(children.len(), 1);
        assert_eq!(children[0]["data"]["id"], "e1");
        assert!(parsed.children("diagnoses").is_empty());
    }
}
