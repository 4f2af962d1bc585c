//! Plan - Collection of Effects
//!
//! A Plan is an ordered list of Effects to be executed, plus the attributes
//! of every resource that needs no change ("settled" bindings), which
//! dependents can read without waiting.
//! No side effects occur until the Plan is applied.

use crate::effect::Effect;
use crate::resolve::BindingMap;
use crate::resource::Attributes;

/// Plan containing Effects to be executed
#[derive(Debug, Clone, Default)]
pub struct Plan {
    effects: Vec<Effect>,
    settled: BindingMap,
}

impl Plan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, effect: Effect) {
        self.effects.push(effect);
    }

    /// Record the known attributes of an unchanged resource
    pub fn settle(&mut self, binding: impl Into<String>, attributes: Attributes) {
        self.settled.insert(binding.into(), attributes);
    }

    pub fn effects(&self) -> &[Effect] {
        &self.effects
    }

    pub fn settled(&self) -> &BindingMap {
        &self.settled
    }

    /// True when nothing would change
    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    /// Number of Effects
    pub fn mutation_count(&self) -> usize {
        self.effects.len()
    }

    /// Generate a summary of the Plan for display
    pub fn summary(&self) -> PlanSummary {
        let mut summary = PlanSummary::default();
        for effect in &self.effects {
            match effect {
                Effect::Create(_) => summary.create += 1,
                Effect::Update { .. } => summary.update += 1,
                Effect::Replace { .. } => summary.replace += 1,
                Effect::Delete { .. } => summary.delete += 1,
            }
        }
        summary.unchanged = self.settled.len();
        summary
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct PlanSummary {
    pub create: usize,
    pub update: usize,
    pub replace: usize,
    pub delete: usize,
    pub unchanged: usize,
}

impl std::fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Plan: {} to create, {} to update, {} to replace, {} to delete",
            self.create, self.update, self.replace, self.delete
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{Resource, ResourceId, State};
    use std::collections::HashMap;

    #[test]
    fn empty_plan() {
        let plan = Plan::new();
        assert!(plan.is_empty());
        assert_eq!(plan.mutation_count(), 0);
    }

    #[test]
    fn settled_bindings_do_not_count_as_changes() {
        let mut plan = Plan::new();
        plan.settle("vpc", HashMap::new());
        assert!(plan.is_empty());
        assert_eq!(plan.summary().unchanged, 1);
    }

    #[test]
    fn plan_summary() {
        let mut plan = Plan::new();
        plan.add(Effect::Create(Resource::new("ec2_subnet", "a")));
        plan.add(Effect::Create(Resource::new("ec2_subnet", "b")));
        plan.add(Effect::Replace {
            id: ResourceId::new("ec2_instance", "app"),
            from: State::existing(ResourceId::new("ec2_instance", "app"), HashMap::new()),
            to: Resource::new("ec2_instance", "app"),
        });
        plan.add(Effect::Delete {
            id: ResourceId::new("ec2_eip", "old"),
            identifier: "eipalloc-1".to_string(),
        });

        let summary = plan.summary();
        assert_eq!(summary.create, 2);
        assert_eq!(summary.replace, 1);
        assert_eq!(summary.delete, 1);
        assert_eq!(
            summary.to_string(),
            "Plan: 2 to create, 0 to update, 1 to replace, 1 to delete"
        );
    }
}
