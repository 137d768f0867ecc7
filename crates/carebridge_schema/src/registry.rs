//! Registry of relation schemas.

use crate::{EntityType, RelationSchema, SchemaError, SchemaResult};
use std::collections::HashMap;

/// A registry mapping entity types to their relation schemas.
///
/// Built once at startup from declared schemas; immutable afterwards.
#[derive(Debug, Default, Clone)]
pub struct SchemaRegistry {
    schemas: HashMap<EntityType, RelationSchema>,
}

impl SchemaRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a schema, replacing any previous schema for the
    /// same entity. Fails if the schema declares duplicate relation
    /// names.
    pub fn register(&mut self, schema: RelationSchema) -> SchemaResult<()> {
        for (i, child) in schema.children.iter().enumerate() {
            if schema.children[..i].iter().any(|c| c.name == child.name) {
                return Err(SchemaError::DuplicateRelation {
                    entity: schema.entity.to_string(),
                    relation: child.name.clone(),
                });
            }
        }
        self.schemas.insert(schema.entity.clone(), schema);
        Ok(())
    }

    /// Looks up the schema for an entity type.
    pub fn get(&self, entity: &EntityType) -> SchemaResult<&RelationSchema> {
        self.schemas
            .get(entity)
            .ok_or_else(|| SchemaError::UnknownEntity(entity.to_string()))
    }

    /// Returns all registered entity types.
    pub fn entities(&self) -> impl Iterator<Item = &EntityType> {
        self.schemas.keys()
    }

    /// Verifies that every declared child relation targets a
    /// registered entity.
    pub fn validate(&self) -> SchemaResult<()> {
        for schema in self.schemas.values() {
            for child in &schema.children {
                if !self.schemas.contains_key(&child.target) {
                    return Err(SchemaError::DanglingRelation {
                        entity: schema.entity.to_string(),
                        relation: child.name.clone(),
                        target: child.target.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ChildRelation;

    fn patient() -> RelationSchema {
        RelationSchema::new("patient", ["first_name"], &[])
            .with_child(ChildRelation::new("encounters", "encounter", "patient_id"))
    }

    #[test]
    fn register_and_get() {
        let mut registry = SchemaRegistry::new();
        registry.register(patient()).unwrap();
        let schema = registry.get(&EntityType::new("patient")).unwrap();
        assert_eq!(schema.columns, vec!["id", "first_name"]);
    }

    #[test]
    fn unknown_entity() {
        let registry = SchemaRegistry::new();
        let err = registry.get(&EntityType::new("nope")).unwrap_err();
        assert_eq!(err, SchemaError::UnknownEntity("nope".into()));
    }

    #[test]
    fn validate_catches_dangling_relation() {
        let mut registry = SchemaRegistry::new();
        registry.register(patient()).unwrap();
        // encounter is referenced but never registered
        let err = registry.validate().unwrap_err();
        assert!(matches!(err, SchemaError::DanglingRelation { .. }));
    }

    #[test]
    fn duplicate_relation_rejected() {
        let mut registry = SchemaRegistry::new();
        let schema = RelationSchema::new("patient", Vec::<String>::new(), &[])
            .with_child(ChildRelation::new("kids", "encounter", "patient_id"))
            .with_child(ChildRelation::new("kids", "encounter", "patient_id"));
        let err = registry.register(schema).unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateRelation { .. }));
    }
}
