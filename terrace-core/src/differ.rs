//! Differ - Compare desired state with current state to generate a Plan
//!
//! Compares the desired topology with the current state refreshed from the
//! Provider, and generates the list of required Effects (Plan). References
//! are resolved as far as the plan allows: unchanged resources contribute
//! their full state, everything else only what is already known.

use std::collections::{BTreeSet, HashMap, HashSet};

use log::debug;

use crate::effect::Effect;
use crate::graph::DependencyGraph;
use crate::plan::Plan;
use crate::resolve::{BindingMap, ResolveError, merge_attributes, resolve_resource};
use crate::resource::{Attributes, Resource, ResourceId, State};
use crate::schema::ResourceSchema;

/// Result of a diff operation
#[derive(Debug, Clone, PartialEq)]
pub enum Diff {
    /// Resource does not exist -> needs creation
    Create(Resource),
    /// Resource exists with mutable differences -> needs update
    Update {
        id: ResourceId,
        from: State,
        to: Resource,
        changed_attributes: Vec<String>,
    },
    /// A create-only attribute changed -> needs delete and create
    Replace {
        id: ResourceId,
        from: State,
        to: Resource,
        changed_attributes: Vec<String>,
    },
    /// Resource exists with no differences -> no action needed
    NoChange(ResourceId),
}

impl Diff {
    /// Returns whether this Diff involves a change
    pub fn is_change(&self) -> bool {
        !matches!(self, Diff::NoChange(_))
    }
}

/// Compare a (partially resolved) desired resource with its current state
pub fn diff(desired: &Resource, current: &State, schema: Option<&ResourceSchema>) -> Diff {
    if !current.exists {
        return Diff::Create(desired.clone());
    }

    let changed = find_changed_attributes(&desired.attributes, &current.attributes);

    if changed.is_empty() {
        return Diff::NoChange(desired.id.clone());
    }

    let replace = schema.is_some_and(|s| changed.iter().any(|attr| s.is_create_only(attr)));
    if replace {
        Diff::Replace {
            id: desired.id.clone(),
            from: current.clone(),
            to: desired.clone(),
            changed_attributes: changed,
        }
    } else {
        Diff::Update {
            id: desired.id.clone(),
            from: current.clone(),
            to: desired.clone(),
            changed_attributes: changed,
        }
    }
}

/// Find changed attributes between desired and current state.
/// A value that is not known yet always counts as changed.
fn find_changed_attributes(desired: &Attributes, current: &Attributes) -> Vec<String> {
    let mut changed = Vec::new();

    for (key, desired_value) in desired {
        // Skip internal attributes (starting with _)
        if key.starts_with('_') {
            continue;
        }

        match current.get(key) {
            Some(current_value) if desired_value.is_resolved() && current_value == desired_value => {}
            _ => changed.push(key.clone()),
        }
    }

    changed.sort();
    changed
}

/// Compute Diff for every desired resource and generate a Plan.
///
/// `desired` must be in dependency order (see `graph::sort_resources`).
/// An update that still refers to a replaced binding becomes a replacement
/// too, so no live resource points at one being torn down.
pub fn create_plan(
    desired: &[Resource],
    current_states: &HashMap<ResourceId, State>,
    schemas: &HashMap<String, ResourceSchema>,
) -> Result<Plan, ResolveError> {
    let mut plan = Plan::new();
    let mut bindings = BindingMap::new();
    let mut replaced: HashSet<String> = HashSet::new();

    for resource in desired {
        let candidate = resolve_resource(resource, &bindings)?;
        let current = current_states
            .get(&resource.id)
            .cloned()
            .unwrap_or_else(|| State::not_found(resource.id.clone()));

        let binding = resource.binding();
        match diff(&candidate, &current, schemas.get(&resource.id.resource_type)) {
            Diff::Create(r) => {
                bindings.insert(binding, r.attributes.clone());
                plan.add(Effect::Create(r));
            }
            Diff::Update {
                id,
                from,
                to,
                changed_attributes,
            } if refers_to_any(&to, &changed_attributes, &replaced) => {
                debug!("{} refers to a replaced resource, replacing it too", id);
                replaced.insert(binding.clone());
                bindings.insert(binding, to.attributes.clone());
                plan.add(Effect::Replace { id, from, to });
            }
            Diff::Update { id, from, to, .. } => {
                bindings.insert(binding, merge_attributes(&to.attributes, &from.attributes));
                plan.add(Effect::Update { id, from, to });
            }
            Diff::Replace { id, from, to, .. } => {
                replaced.insert(binding.clone());
                bindings.insert(binding, to.attributes.clone());
                plan.add(Effect::Replace { id, from, to });
            }
            Diff::NoChange(_) => {
                let settled = merge_attributes(&candidate.attributes, &current.attributes);
                bindings.insert(binding.clone(), settled.clone());
                plan.settle(binding, settled);
            }
        }
    }

    Ok(plan)
}

fn refers_to_any(resource: &Resource, attributes: &[String], bindings: &HashSet<String>) -> bool {
    let mut refs = BTreeSet::new();
    for key in attributes {
        if let Some(value) = resource.attributes.get(key) {
            value.collect_references(&mut refs);
        }
    }
    refs.iter().any(|r| bindings.contains(r))
}

/// A resource recorded in state that is no longer declared
#[derive(Debug, Clone, PartialEq)]
pub struct Orphan {
    pub id: ResourceId,
    pub binding: String,
    pub identifier: String,
    /// Bindings this resource depended on when it was created
    pub dependencies: Vec<String>,
}

/// Append Delete effects for orphans, dependents before their dependencies
pub fn add_deletions(plan: &mut Plan, orphans: &[Orphan]) {
    let graph = DependencyGraph::from_edges(
        orphans
            .iter()
            .map(|o| (o.binding.as_str(), o.dependencies.iter().map(String::as_str))),
    );
    let by_binding: HashMap<&str, &Orphan> =
        orphans.iter().map(|o| (o.binding.as_str(), o)).collect();

    // Recorded edges come from an acyclic topology; fall back to input order
    let order = graph
        .destroy_order()
        .unwrap_or_else(|_| orphans.iter().map(|o| o.binding.clone()).collect());

    for binding in order {
        if let Some(orphan) = by_binding.get(binding.as_str()) {
            plan.add(Effect::Delete {
                id: orphan.id.clone(),
                identifier: orphan.identifier.clone(),
            });
        }
    }
}
