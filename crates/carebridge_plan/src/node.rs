//! Plan trees and the memoizing cache.

use crate::{PlanError, PlanResult};
use carebridge_schema::{EntityType, SchemaRegistry};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// One child relation inside a plan tree.
///
/// `link_key` is the foreign-key column on the child: the export walk
/// filters child rows by it, and the import walk writes the parent id
/// into it.
#[derive(Debug, PartialEq, Eq)]
pub struct ChildPlan {
    /// Relation name as nested in sync records.
    pub relation: String,
    /// Foreign-key column on the child entity.
    pub link_key: String,
    /// Plan for the child entity.
    pub node: Arc<PlanNode>,
}

/// The per-entity-type sync plan.
#[derive(Debug, PartialEq, Eq)]
pub struct PlanNode {
    /// Entity this plan serializes.
    pub entity: EntityType,
    /// Scalar columns, `id` first. Never contains excluded columns
    /// (the schema strips them before a plan is built).
    pub columns: Vec<String>,
    /// Child relation plans.
    pub children: Vec<ChildPlan>,
}

impl PlanNode {
    fn build(
        registry: &SchemaRegistry,
        entity: &EntityType,
        stack: &mut Vec<EntityType>,
    ) -> PlanResult<Arc<Self>> {
        if stack.contains(entity) {
            return Err(PlanError::RelationCycle(entity.to_string()));
        }
        stack.push(entity.clone());

        let schema = registry.get(entity)?;
        let mut children = Vec::with_capacity(schema.children.len());
        for child in &schema.children {
            children.push(ChildPlan {
                relation: child.name.clone(),
                link_key: child.foreign_key.clone(),
                node: Self::build(registry, &child.target, stack)?,
            });
        }

        stack.pop();
        Ok(Arc::new(Self {
            entity: entity.clone(),
            columns: schema.columns.clone(),
            children,
        }))
    }
}

/// Memoizing plan cache.
///
/// Plans are immutable once built; the cache is keyed by entity type
/// so repeated lookups return the same tree for the life of the
/// process.
#[derive(Debug)]
pub struct PlanCache {
    registry: SchemaRegistry,
    plans: Mutex<HashMap<EntityType, Arc<PlanNode>>>,
}

impl PlanCache {
    /// Creates a cache over a schema registry.
    pub fn new(registry: SchemaRegistry) -> Self {
        Self {
            registry,
            plans: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the plan for an entity type, building it on first use.
    pub fn plan_for(&self, entity: &EntityType) -> PlanResult<Arc<PlanNode>> {
        if let Some(plan) = self.plans.lock().get(entity) {
            return Ok(Arc::clone(plan));
        }
        // built outside the lock; a racing builder just wins the insert
        let plan = PlanNode::build(&self.registry, entity, &mut Vec::new())?;
        let mut plans = self.plans.lock();
        Ok(Arc::clone(plans.entry(entity.clone()).or_insert(plan)))
    }

    /// The registry backing this cache.
    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }
}
