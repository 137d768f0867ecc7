//! Fixture builders shared by integration tests.
//!
//! The demo schema models a small clinical record graph:
//! patients own encounters, encounters own survey responses, and
//! survey responses own answers.

use carebridge_plan::PlanCache;
use carebridge_protocol::SyncRecord;
use carebridge_schema::{ChildRelation, RelationSchema, SchemaRegistry};
use carebridge_store::{Store, StoreResult, Value};
use chrono::{TimeZone, Utc};
use std::collections::BTreeMap;

/// Builds the demo clinical schema registry.
///
/// The patient schema declares `password` as an excluded column so
/// tests can assert it never reaches the wire.
pub fn demo_registry() -> SchemaRegistry {
    let mut registry = SchemaRegistry::new();
    registry
        .register(
            RelationSchema::new(
                "patient",
                ["first_name", "last_name", "born_at", "sex", "password"],
                &["password"],
            )
            .with_child(ChildRelation::new("encounters", "encounter", "patient_id")),
        )
        .expect("patient schema");
    registry
        .register(
            RelationSchema::new("encounter", ["patient_id", "reason", "started_at"], &[])
                .with_child(ChildRelation::new(
                    "surveyResponses",
                    "survey_response",
                    "encounter_id",
                )),
        )
        .expect("encounter schema");
    registry
        .register(
            RelationSchema::new(
                "survey_response",
                ["encounter_id", "survey_id", "submitted_at"],
                &[],
            )
            .with_child(ChildRelation::new(
                "answers",
                "survey_response_answer",
                "response_id",
            )),
        )
        .expect("survey_response schema");
    registry
        .register(RelationSchema::new(
            "survey_response_answer",
            ["response_id", "question_id", "body"],
            &[],
        ))
        .expect("answer schema");
    registry
}

/// Builds a plan cache over the demo registry.
pub fn demo_plan_cache() -> PlanCache {
    PlanCache::new(demo_registry())
}

/// Creates a store populated with `patients` dirty patient graphs.
///
/// Patient `p{i}` owns encounter `e{i}`, which owns survey response
/// `r{i}`, which owns answer `a{i}`. All rows are created locally and
/// therefore marked for push.
pub fn populated_store(patients: usize) -> Store {
    let store = Store::new();
    store
        .transaction(|txn| -> StoreResult<()> {
            for i in 0..patients {
                txn.create(
                    "patient",
                    &format!("p{i}"),
                    fields([
                        ("first_name", Value::from(format!("Pat{i}"))),
                        ("last_name", Value::from("Doe")),
                        (
                            "born_at",
                            Value::DateTime(
                                Utc.with_ymd_and_hms(1990, 6, 1, 0, 0, 0).unwrap(),
                            ),
                        ),
                        ("sex", Value::from("other")),
                        ("password", Value::from("hunter2")),
                    ]),
                );
                txn.create(
                    "encounter",
                    &format!("e{i}"),
                    fields([
                        ("patient_id", Value::from(format!("p{i}"))),
                        ("reason", Value::from("checkup")),
                    ]),
                );
                txn.create(
                    "survey_response",
                    &format!("r{i}"),
                    fields([
                        ("encounter_id", Value::from(format!("e{i}"))),
                        ("survey_id", Value::from("intake")),
                    ]),
                );
                txn.create(
                    "survey_response_answer",
                    &format!("a{i}"),
                    fields([
                        ("response_id", Value::from(format!("r{i}"))),
                        ("question_id", Value::from("q1")),
                        ("body", Value::from("yes")),
                    ]),
                );
            }
            Ok(())
        })
        .expect("populate store");
    store
}

/// Builds a field map from an array of pairs.
pub fn fields<const N: usize>(pairs: [(&str, Value); N]) -> BTreeMap<String, Value> {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

/// Builds a wire record from a JSON object literal.
///
/// # Panics
///
/// Panics if `data` is not a JSON object.
pub fn record(data: serde_json::Value) -> SyncRecord {
    match data {
        serde_json::Value::Object(map) => SyncRecord::new(map),
        other => panic!("record fixture requires a JSON object, got {other}"),
    }
}

/// Builds a minimal patient record with the given id and first name.
pub fn patient_record(id: &str, first_name: &str) -> SyncRecord {
    record(serde_json::json!({ "id": id, "first_name": first_name }))
}
