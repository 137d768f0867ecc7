//! Export executor: store rows → serialized record graphs.

use crate::node::PlanNode;
use crate::sanitize::{is_lossy, sanitize_value};
use carebridge_protocol::SyncRecord;
use carebridge_store::{Row, Store};
use serde_json::Map;
use std::collections::HashSet;

/// Keyset cursor over dirty rows.
///
/// `after_id` is the id of the last exported row; `None` starts from
/// the beginning. Keyset (rather than offset) pagination means rows
/// inserted mid-export are never skipped and never duplicated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportCursor {
    /// Id of the last exported row.
    pub after_id: Option<String>,
}

impl ExportCursor {
    /// A cursor positioned before the first row.
    pub fn start() -> Self {
        Self::default()
    }
}

/// One page of exported records.
#[derive(Debug, Clone)]
pub struct ExportPage {
    /// Serialized record graphs, ascending id order.
    pub records: Vec<SyncRecord>,
    /// Ids of the exported root rows, for the post-ack
    /// `mark_pushed` call.
    pub root_ids: Vec<String>,
    /// Cursor for the next call.
    pub next: ExportCursor,
    /// True when fewer than `limit` rows were returned — the channel
    /// is caught up.
    pub caught_up: bool,
}

/// Walks the local store along a plan to serialize dirty record
/// graphs.
pub struct ExportExecutor {
    store: Store,
}

impl ExportExecutor {
    /// Creates an executor over a store.
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Exports up to `limit` dirty root rows after the cursor,
    /// ascending by id, each with its child relations nested.
    ///
    /// Locally tombstoned rows that are still dirty export as
    /// tombstone records so deletions propagate outward.
    pub fn export(&self, plan: &PlanNode, cursor: &ExportCursor, limit: usize) -> ExportPage {
        let rows = self
            .store
            .find_for_push(plan.entity.as_str(), cursor.after_id.as_deref(), limit);

        let mut lossy_logged = HashSet::new();
        let mut records = Vec::with_capacity(rows.len());
        let mut root_ids = Vec::with_capacity(rows.len());
        for row in &rows {
            root_ids.push(row.id.clone());
            records.push(self.serialize_row(plan, row, &mut lossy_logged));
        }

        let caught_up = rows.len() < limit;
        let next = ExportCursor {
            after_id: rows.last().map(|r| r.id.clone()).or_else(|| cursor.after_id.clone()),
        };
        ExportPage {
            records,
            root_ids,
            next,
            caught_up,
        }
    }

    /// Serializes one row and its descendants into a sync record.
    ///
    /// Shared with the server side, which feeds tick-filtered rows
    /// rather than dirty rows.
    pub fn serialize_row(
        &self,
        plan: &PlanNode,
        row: &Row,
        lossy_logged: &mut HashSet<String>,
    ) -> SyncRecord {
        if row.deleted_at.is_some() {
            return SyncRecord::tombstone(row.id.clone());
        }

        let mut data = Map::new();
        data.insert("id".into(), serde_json::Value::String(row.id.clone()));
        for column in &plan.columns {
            if column == "id" {
                continue;
            }
            let value = match row.field(column) {
                Some(v) => {
                    if is_lossy(v) && lossy_logged.insert(format!("{}.{column}", plan.entity)) {
                        tracing::warn!(
                            entity = %plan.entity,
                            column = %column,
                            "unsupported field type nulled during export"
                        );
                    }
                    sanitize_value(v)
                }
                None => serde_json::Value::Null,
            };
            data.insert(column.clone(), value);
        }

        let mut record = SyncRecord::new(data);
        for child in &plan.children {
            let child_rows =
                self.store
                    .children_of(child.node.entity.as_str(), &child.link_key, &row.id);
            let child_records: Vec<SyncRecord> = child_rows
                .iter()
                .map(|r| self.serialize_row(&child.node, r, lossy_logged))
                .collect();
            record.set_children(child.relation.clone(), child_records);
        }
        record
    }
}
