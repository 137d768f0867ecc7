//! Property-based test generators using proptest.
//!
//! Provides strategies for generating random sync data that
//! maintains required invariants (non-empty string ids, object-shaped
//! record data).

use carebridge_protocol::SyncRecord;
use proptest::prelude::*;
use serde_json::{Map, Value};

/// Strategy for generating valid record ids.
pub fn record_id_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z0-9]{1,24}").expect("Invalid regex")
}

/// Strategy for generating valid column names.
pub fn column_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_]{0,31}").expect("Invalid regex")
}

/// Strategy for generating scalar wire values.
pub fn scalar_value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|i| Value::Number(i.into())),
        "[ -~]{0,64}".prop_map(Value::String),
    ]
}

/// Strategy for generating flat sync records with a guaranteed id.
pub fn sync_record_strategy() -> impl Strategy<Value = SyncRecord> {
    (
        record_id_strategy(),
        prop::collection::btree_map(column_name_strategy(), scalar_value_strategy(), 0..6),
    )
        .prop_map(|(id, columns)| {
            let mut data = Map::new();
            data.insert("id".into(), Value::String(id));
            for (name, value) in columns {
                if name != "id" {
                    data.insert(name, value);
                }
            }
            SyncRecord::new(data)
        })
}
