//! # Carebridge Store
//!
//! The storage collaborator consumed by the sync engine and the job
//! worker pool: an in-memory transactional record store with the
//! operations the sync protocol needs (soft delete, dirty-for-push
//! flags, monotonic update ticks, atomic upsert, keyset queries), a
//! persisted job table with atomic claiming, per-channel sync cursor
//! metadata, and worker registrations.
//!
//! ## Concurrency
//!
//! A [`Store`] is cheaply cloneable and shareable across tasks. All
//! mutation goes through single-statement operations or
//! closure-scoped [`Store::transaction`]s taken under one write lock,
//! so claim/advance operations are atomic with respect to every other
//! writer — the in-memory analogue of conditional single-statement
//! `UPDATE`s against a shared database.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod jobs;
mod store;
mod value;
mod workers;

pub use error::{StoreError, StoreResult};
pub use jobs::{Job, JobState, SubmitOptions, JOB_PRIORITY_DEFAULT, JOB_PRIORITY_HIGH, JOB_PRIORITY_LOW};
pub use store::{Row, Store, Transaction};
pub use value::Value;
pub use workers::WorkerRegistration;
