//! # Carebridge Schema
//!
//! Static, declared descriptions of which columns and child relations
//! participate in sync for each entity type.
//!
//! The schema replaces runtime reflection over ORM association
//! metadata: every entity that syncs registers a [`RelationSchema`]
//! (scalar columns plus declared child relations) in a
//! [`SchemaRegistry`], and the export and import planners consume
//! that registry identically.
//!
//! ## Invariants
//!
//! - A registered schema's columns never contain an excluded column:
//!   exclusions are applied when the schema is built.
//! - The `id` column is always present.
//! - Relation names are unique within one entity.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod registry;
mod relation;

pub use registry::SchemaRegistry;
pub use relation::{ChildRelation, RelationSchema};

use thiserror::Error;

/// Result type for schema operations.
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Errors raised while building or resolving schemas.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// No schema has been registered for the entity type.
    #[error("unknown entity type: {0}")]
    UnknownEntity(String),

    /// A child relation points at an entity with no registered schema.
    #[error("relation {relation:?} on {entity:?} targets unregistered entity {target:?}")]
    DanglingRelation {
        /// Entity declaring the relation.
        entity: String,
        /// Relation name.
        relation: String,
        /// Missing target entity.
        target: String,
    },

    /// Two relations on the same entity share a name.
    #[error("duplicate relation name {relation:?} on entity {entity:?}")]
    DuplicateRelation {
        /// Entity declaring the relations.
        entity: String,
        /// The duplicated name.
        relation: String,
    },
}

/// Identifier for an entity type (its sync table name).
///
/// Entity types are plain strings (`"patient"`, `"encounter"`, …) so
/// deployments can declare schemas from configuration rather than
/// compiled-in tables.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityType(String);

impl EntityType {
    /// Creates an entity type identifier.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the underlying name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityType {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}
