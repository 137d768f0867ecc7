//! # Carebridge Plan
//!
//! Plan trees and the executors that walk them.
//!
//! A [`PlanNode`] describes, for one entity type, which scalar
//! columns and child relations participate in sync. Plans are built
//! from the static [`carebridge_schema`] registry and memoized per
//! entity type for the life of the process.
//!
//! [`ExportExecutor`] walks the local store along a plan to produce
//! serialized record graphs, keyset-paginated over dirty rows.
//! [`ImportExecutor`] mirrors the walk to apply inbound record graphs
//! transactionally, handling create, update, and tombstone.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod export;
mod import;
mod node;
mod sanitize;

pub use export::{ExportCursor, ExportExecutor, ExportPage};
pub use import::ImportExecutor;
pub use node::{ChildPlan, PlanCache, PlanNode};
pub use sanitize::sanitize_value;

use thiserror::Error;

/// Result type for plan operations.
pub type PlanResult<T> = Result<T, PlanError>;

/// Errors raised while building or executing plans.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    /// Schema resolution failed.
    #[error(transparent)]
    Schema(#[from] carebridge_schema::SchemaError),

    /// An inbound record is missing its id; the enclosing
    /// transaction is aborted.
    #[error("malformed record for {entity}: missing id")]
    MalformedRecord {
        /// Entity the record was destined for.
        entity: String,
    },

    /// A nested child entry was not a record object.
    #[error("malformed child under relation {relation:?}: not a record")]
    MalformedChild {
        /// Relation name.
        relation: String,
    },

    /// The schema relation graph contains a cycle.
    #[error("relation cycle detected at entity {0}")]
    RelationCycle(String),

    /// Store operation failed inside the transaction.
    #[error(transparent)]
    Store(#[from] carebridge_store::StoreError),
}
