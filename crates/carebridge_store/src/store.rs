//! The transactional record store.

use crate::error::{StoreError, StoreResult};
use crate::jobs::JobTable;
use crate::value::Value;
use crate::workers::WorkerRegistration;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use uuid::Uuid;

/// One stored row: scalar fields plus sync bookkeeping.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// Row id.
    pub id: String,
    /// Scalar columns.
    pub fields: BTreeMap<String, Value>,
    /// Soft-delete timestamp; `Some` means tombstoned.
    pub deleted_at: Option<DateTime<Utc>>,
    /// Monotonic store tick of the last write to this row. Drives
    /// incremental pull on the central side.
    pub updated_tick: i64,
    /// Dirty-for-push flag: set by local writes, cleared when the
    /// remote acknowledges the push or when the row arrives via sync.
    pub marked_for_push: bool,
    /// When the row was last acknowledged by the remote.
    pub pushed_at: Option<DateTime<Utc>>,
    /// When the row last arrived via sync.
    pub pulled_at: Option<DateTime<Utc>>,
}

impl Row {
    /// True if the row is not tombstoned.
    pub fn is_current(&self) -> bool {
        self.deleted_at.is_none()
    }

    /// Returns a field value.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}

#[derive(Debug, Default)]
pub(crate) struct Inner {
    pub(crate) tables: HashMap<String, BTreeMap<String, Row>>,
    pub(crate) meta: HashMap<String, String>,
    pub(crate) jobs: JobTable,
    pub(crate) workers: HashMap<Uuid, WorkerRegistration>,
    pub(crate) tick: i64,
}

impl Inner {
    pub(crate) fn next_tick(&mut self) -> i64 {
        self.tick += 1;
        self.tick
    }
}

/// The shared store handle.
///
/// Clones share the same underlying state.
#[derive(Debug, Clone, Default)]
pub struct Store {
    pub(crate) inner: Arc<RwLock<Inner>>,
}

impl Store {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f` inside one atomic transaction.
    ///
    /// Writes staged through the [`Transaction`] become visible to
    /// other readers only when `f` returns `Ok`; on `Err` every
    /// staged write is discarded. The closure's error type is
    /// preserved so callers can abort with their own errors.
    pub fn transaction<R, E, F>(&self, f: F) -> Result<R, E>
    where
        F: FnOnce(&mut Transaction<'_>) -> Result<R, E>,
    {
        let mut inner = self.inner.write();
        let snapshot_tables = inner.tables.clone();
        let snapshot_tick = inner.tick;
        let mut txn = Transaction { inner: &mut inner };
        match f(&mut txn) {
            Ok(value) => Ok(value),
            Err(e) => {
                inner.tables = snapshot_tables;
                inner.tick = snapshot_tick;
                Err(e)
            }
        }
    }

    /// Returns a row by id, tombstoned or not.
    pub fn get(&self, entity: &str, id: &str) -> Option<Row> {
        self.inner
            .read()
            .tables
            .get(entity)
            .and_then(|t| t.get(id))
            .cloned()
    }

    /// Returns a row by id, excluding tombstones.
    pub fn get_current(&self, entity: &str, id: &str) -> Option<Row> {
        self.get(entity, id).filter(Row::is_current)
    }

    /// Counts non-tombstoned rows for an entity.
    pub fn count_current(&self, entity: &str) -> usize {
        self.inner
            .read()
            .tables
            .get(entity)
            .map(|t| t.values().filter(|r| r.is_current()).count())
            .unwrap_or(0)
    }

    /// Keyset query over rows flagged dirty-for-push.
    ///
    /// Returns up to `limit` rows with `id > after` in ascending id
    /// order. Because the cursor is the last seen id rather than an
    /// offset, rows inserted concurrently are never skipped and never
    /// duplicated.
    pub fn find_for_push(&self, entity: &str, after: Option<&str>, limit: usize) -> Vec<Row> {
        let inner = self.inner.read();
        let Some(table) = inner.tables.get(entity) else {
            return Vec::new();
        };
        table
            .values()
            .filter(|r| r.marked_for_push)
            .filter(|r| after.is_none_or(|a| r.id.as_str() > a))
            .take(limit)
            .cloned()
            .collect()
    }

    /// Non-tombstoned child rows whose `foreign_key` column equals
    /// `parent_id`, in ascending id order.
    pub fn children_of(&self, entity: &str, foreign_key: &str, parent_id: &str) -> Vec<Row> {
        let inner = self.inner.read();
        let Some(table) = inner.tables.get(entity) else {
            return Vec::new();
        };
        table
            .values()
            .filter(|r| r.is_current())
            .filter(|r| {
                r.fields
                    .get(foreign_key)
                    .and_then(Value::as_text)
                    .is_some_and(|v| v == parent_id)
            })
            .cloned()
            .collect()
    }

    /// Rows (tombstones included) written after `since_tick`, in
    /// ascending `(updated_tick, id)` order. Drives server-side
    /// incremental pull.
    pub fn updated_since(&self, entity: &str, since_tick: i64) -> Vec<Row> {
        let inner = self.inner.read();
        let Some(table) = inner.tables.get(entity) else {
            return Vec::new();
        };
        let mut rows: Vec<Row> = table
            .values()
            .filter(|r| r.updated_tick > since_tick)
            .cloned()
            .collect();
        rows.sort_by(|a, b| (a.updated_tick, &a.id).cmp(&(b.updated_tick, &b.id)));
        rows
    }

    /// Clears the dirty flag on the given rows after a remote ack.
    pub fn mark_pushed(&self, entity: &str, ids: &[String], at: DateTime<Utc>) {
        let mut inner = self.inner.write();
        if let Some(table) = inner.tables.get_mut(entity) {
            for id in ids {
                if let Some(row) = table.get_mut(id) {
                    row.marked_for_push = false;
                    row.pushed_at = Some(at);
                }
            }
        }
    }

    /// Current store tick.
    pub fn tick(&self) -> i64 {
        self.inner.read().tick
    }

    /// Reads a metadata value (per-channel cursors and the like).
    pub fn meta_get(&self, key: &str) -> Option<String> {
        self.inner.read().meta.get(key).cloned()
    }

    /// Writes a metadata value.
    pub fn meta_set(&self, key: &str, value: impl Into<String>) {
        self.inner.write().meta.insert(key.to_string(), value.into());
    }

    /// Registers a worker.
    pub fn worker_register(&self, registration: WorkerRegistration) {
        self.inner
            .write()
            .workers
            .insert(registration.id, registration);
    }

    /// Bumps a worker's heartbeat timestamp.
    pub fn worker_heartbeat(&self, id: Uuid) -> StoreResult<()> {
        let mut inner = self.inner.write();
        let worker = inner
            .workers
            .get_mut(&id)
            .ok_or(StoreError::WorkerNotFound(id))?;
        worker.last_heartbeat_at = Utc::now();
        Ok(())
    }

    /// Removes a worker registration.
    pub fn worker_deregister(&self, id: Uuid) {
        self.inner.write().workers.remove(&id);
    }

    /// Lists current worker registrations.
    pub fn workers(&self) -> Vec<WorkerRegistration> {
        self.inner.read().workers.values().cloned().collect()
    }
}

/// A write handle scoped to one [`Store::transaction`] closure.
pub struct Transaction<'a> {
    inner: &'a mut Inner,
}

impl Transaction<'_> {
    /// Creates a row from a local write. The row starts dirty so the
    /// next push cycle picks it up.
    pub fn create(&mut self, entity: &str, id: &str, fields: BTreeMap<String, Value>) {
        let tick = self.inner.next_tick();
        let row = Row {
            id: id.to_string(),
            fields,
            deleted_at: None,
            updated_tick: tick,
            marked_for_push: true,
            pushed_at: None,
            pulled_at: None,
        };
        self.inner
            .tables
            .entry(entity.to_string())
            .or_default()
            .insert(id.to_string(), row);
    }

    /// Updates a row from a local write, marking it dirty. Returns
    /// the number of rows affected (0 or 1).
    pub fn update(&mut self, entity: &str, id: &str, fields: BTreeMap<String, Value>) -> usize {
        let tick = self.inner.next_tick();
        let Some(row) = self
            .inner
            .tables
            .get_mut(entity)
            .and_then(|t| t.get_mut(id))
        else {
            return 0;
        };
        row.fields.extend(fields);
        row.updated_tick = tick;
        row.marked_for_push = true;
        1
    }

    /// Atomic insert-or-update from an inbound sync record.
    ///
    /// One operation regardless of whether the id exists, so
    /// concurrent importers cannot interleave between an update and
    /// an insert. A tombstoned row keeps its tombstone: a later
    /// out-of-order import of an older live state never resurrects a
    /// deleted record. The row comes out clean (`marked_for_push`
    /// false, `pulled_at` stamped) because its state now matches the
    /// remote.
    pub fn upsert_synced(&mut self, entity: &str, id: &str, fields: BTreeMap<String, Value>) {
        let tick = self.inner.next_tick();
        let now = Utc::now();
        let table = self.inner.tables.entry(entity.to_string()).or_default();
        match table.get_mut(id) {
            Some(row) => {
                row.fields.extend(fields);
                row.updated_tick = tick;
                row.marked_for_push = false;
                row.pulled_at = Some(now);
                // deleted_at intentionally untouched
            }
            None => {
                table.insert(
                    id.to_string(),
                    Row {
                        id: id.to_string(),
                        fields,
                        deleted_at: None,
                        updated_tick: tick,
                        marked_for_push: false,
                        pushed_at: None,
                        pulled_at: Some(now),
                    },
                );
            }
        }
    }

    /// Applies an inbound tombstone: soft-deletes the row by id.
    ///
    /// Unknown ids are recorded as already-deleted rows so the
    /// tombstone survives an out-of-order arrival before the row
    /// itself.
    pub fn tombstone_synced(&mut self, entity: &str, id: &str) {
        let tick = self.inner.next_tick();
        let now = Utc::now();
        let table = self.inner.tables.entry(entity.to_string()).or_default();
        match table.get_mut(id) {
            Some(row) => {
                row.deleted_at.get_or_insert(now);
                row.updated_tick = tick;
                row.marked_for_push = false;
                row.pulled_at = Some(now);
            }
            None => {
                table.insert(
                    id.to_string(),
                    Row {
                        id: id.to_string(),
                        fields: BTreeMap::new(),
                        deleted_at: Some(now),
                        updated_tick: tick,
                        marked_for_push: false,
                        pushed_at: None,
                        pulled_at: Some(now),
                    },
                );
            }
        }
    }

    /// Soft-deletes a row from a local write, marking the tombstone
    /// dirty so it propagates on the next push.
    pub fn soft_delete_local(&mut self, entity: &str, id: &str) -> StoreResult<()> {
        let tick = self.inner.next_tick();
        let row = self
            .inner
            .tables
            .get_mut(entity)
            .and_then(|t| t.get_mut(id))
            .ok_or_else(|| StoreError::RowNotFound {
                entity: entity.to_string(),
                id: id.to_string(),
            })?;
        row.deleted_at.get_or_insert(Utc::now());
        row.updated_tick = tick;
        row.marked_for_push = true;
        Ok(())
    }

    /// Reads a row within the transaction, seeing staged writes.
    pub fn get(&self, entity: &str, id: &str) -> Option<&Row> {
        self.inner.tables.get(entity).and_then(|t| t.get(id))
    }
}
