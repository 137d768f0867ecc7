//! Per-entity relation schema.

use crate::EntityType;

/// The id column, always synced.
pub(crate) const ID_COLUMN: &str = "id";

/// A child relation declared on an entity.
///
/// On export the relation is walked by querying the target entity for
/// rows whose `foreign_key` column equals the parent's id; on import
/// the same column is the link key written into each child record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildRelation {
    /// Relation name as it appears nested inside a sync record.
    pub name: String,
    /// Entity type of the child rows.
    pub target: EntityType,
    /// Foreign-key column on the child pointing at the parent id.
    pub foreign_key: String,
}

impl ChildRelation {
    /// Declares a child relation.
    pub fn new(
        name: impl Into<String>,
        target: impl Into<EntityType>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            foreign_key: foreign_key.into(),
        }
    }
}

/// Sync-relevant description of one entity type.
///
/// Built once, registered in a [`crate::SchemaRegistry`], and consumed
/// by both the export and import planners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationSchema {
    /// The entity this schema describes.
    pub entity: EntityType,
    /// Scalar columns included in sync, `id` first.
    pub columns: Vec<String>,
    /// Declared child relations.
    pub children: Vec<ChildRelation>,
}

impl RelationSchema {
    /// Builds a schema from declared columns, applying exclusions.
    ///
    /// The `id` column is always included even if absent from
    /// `columns`; excluded columns are stripped so they can never
    /// appear in a plan tree.
    pub fn new<I, S>(entity: impl Into<EntityType>, columns: I, excluded: &[&str]) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut cols: Vec<String> = vec![ID_COLUMN.to_string()];
        for col in columns {
            let col = col.into();
            if col == ID_COLUMN || excluded.contains(&col.as_str()) {
                continue;
            }
            if !cols.contains(&col) {
                cols.push(col);
            }
        }
        Self {
            entity: entity.into(),
            columns: cols,
            children: Vec::new(),
        }
    }

    /// Adds a child relation.
    pub fn with_child(mut self, child: ChildRelation) -> Self {
        self.children.push(child);
        self
    }

    /// Returns the relation with the given name, if declared.
    pub fn child(&self, name: &str) -> Option<&ChildRelation> {
        self.children.iter().find(|c| c.name == name)
    }

    /// True if the column participates in sync for this entity.
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }
}
