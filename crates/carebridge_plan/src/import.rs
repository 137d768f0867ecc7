//! Import executor: serialized record graphs → store rows.

use crate::node::PlanNode;
use crate::{PlanError, PlanResult};
use carebridge_protocol::SyncRecord;
use carebridge_store::{Store, Transaction, Value};
use chrono::DateTime;
use std::collections::BTreeMap;

/// Applies inbound record graphs along a plan.
///
/// Each call to [`ImportExecutor::apply`] or
/// [`ImportExecutor::apply_page`] runs inside one atomic store
/// transaction: a malformed record or store error rolls back every
/// write for the call, so partial application of a record graph is
/// never observable. Re-applying the same records is idempotent.
pub struct ImportExecutor {
    store: Store,
}

impl ImportExecutor {
    /// Creates an executor over a store.
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Applies one record graph in its own transaction.
    pub fn apply(&self, plan: &PlanNode, record: &SyncRecord) -> PlanResult<()> {
        self.store
            .transaction(|txn| Self::apply_in_txn(txn, plan, record, None))
    }

    /// Applies a whole page of record graphs in one transaction.
    ///
    /// The first bad record aborts the page: consistency over
    /// progress.
    pub fn apply_page(&self, plan: &PlanNode, records: &[SyncRecord]) -> PlanResult<()> {
        self.store.transaction(|txn| {
            for record in records {
                Self::apply_in_txn(txn, plan, record, None)?;
            }
            Ok(())
        })
    }

    fn apply_in_txn(
        txn: &mut Transaction<'_>,
        plan: &PlanNode,
        record: &SyncRecord,
        parent_link: Option<(&str, &str)>,
    ) -> PlanResult<()> {
        let id = record
            .id()
            .map(str::to_owned)
            .ok_or_else(|| PlanError::MalformedRecord {
                entity: plan.entity.to_string(),
            })?;

        if record.is_deleted {
            // children are independently tombstoned; no recursion
            txn.tombstone_synced(plan.entity.as_str(), &id);
            return Ok(());
        }

        let mut fields: BTreeMap<String, Value> = BTreeMap::new();
        for column in &plan.columns {
            if column == "id" {
                continue;
            }
            if let Some(value) = record.data.get(column) {
                fields.insert(column.clone(), decode_wire_value(value));
            }
        }
        if let Some((link_key, parent_id)) = parent_link {
            fields.insert(link_key.to_string(), Value::from(parent_id));
        }

        txn.upsert_synced(plan.entity.as_str(), &id, fields);

        for child in &plan.children {
            for entry in record.children(&child.relation) {
                let child_record: SyncRecord = serde_json::from_value(entry.clone())
                    .map_err(|_| PlanError::MalformedChild {
                        relation: child.relation.clone(),
                    })?;
                Self::apply_in_txn(
                    txn,
                    &child.node,
                    &child_record,
                    Some((&child.link_key, &id)),
                )?;
            }
        }
        Ok(())
    }
}

/// Decodes a wire value into a stored field value.
///
/// Strings that parse as RFC 3339 timestamps come back as typed
/// datetimes, undoing the export sanitizer's canonicalization.
fn decode_wire_value(value: &serde_json::Value) -> Value {
    match value {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else {
                Value::Float(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        serde_json::Value::String(s) => match DateTime::parse_from_rfc3339(s) {
            Ok(dt) => Value::DateTime(dt.into()),
            Err(_) => Value::Text(s.clone()),
        },
        other => Value::Json(other.clone()),
    }
}
