//! Dependency graph between resource bindings
//!
//! Edges come from `ResourceRef`s (including those inside computed values)
//! and from explicit `depends_on` entries. The graph yields a deterministic
//! creation order and its reverse for teardown.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::resource::Resource;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GraphError {
    #[error("Binding '{0}' is declared more than once")]
    DuplicateBinding(String),

    #[error("'{from}' depends on undeclared binding '{to}'")]
    UnknownDependency { from: String, to: String },

    #[error("Dependency cycle: {}", path.join(" -> "))]
    Cycle { path: Vec<String> },
}

#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// Bindings in declaration order
    nodes: Vec<String>,
    /// Binding -> bindings it depends on
    edges: HashMap<String, BTreeSet<String>>,
    /// Binding -> bindings that depend on it
    reverse_edges: HashMap<String, BTreeSet<String>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the graph of a declared topology; every dependency must be declared
    pub fn from_resources(resources: &[Resource]) -> Result<Self, GraphError> {
        let mut graph = Self::new();
        for resource in resources {
            let binding = resource.binding();
            if graph.edges.contains_key(&binding) {
                return Err(GraphError::DuplicateBinding(binding));
            }
            graph.add_node(&binding);
        }
        for resource in resources {
            let binding = resource.binding();
            for dep in resource.dependencies() {
                if !graph.edges.contains_key(&dep) {
                    return Err(GraphError::UnknownDependency { from: binding, to: dep });
                }
                graph.add_edge(&binding, &dep);
            }
        }
        Ok(graph)
    }

    /// Build a graph from recorded edges, ignoring dependencies on bindings
    /// that are not part of it (e.g. already removed from state)
    pub fn from_edges<'a, I, D>(entries: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, D)>,
        D: IntoIterator<Item = &'a str>,
    {
        let entries: Vec<(&str, Vec<&str>)> = entries
            .into_iter()
            .map(|(b, deps)| (b, deps.into_iter().collect()))
            .collect();

        let mut graph = Self::new();
        for (binding, _) in &entries {
            graph.add_node(binding);
        }
        for (binding, deps) in &entries {
            for dep in deps {
                if graph.edges.contains_key(*dep) && dep != binding {
                    graph.add_edge(binding, dep);
                }
            }
        }
        graph
    }

    fn add_node(&mut self, binding: &str) {
        if !self.edges.contains_key(binding) {
            self.nodes.push(binding.to_string());
            self.edges.insert(binding.to_string(), BTreeSet::new());
        }
    }

    fn add_edge(&mut self, from: &str, to: &str) {
        self.edges
            .entry(from.to_string())
            .or_default()
            .insert(to.to_string());
        self.reverse_edges
            .entry(to.to_string())
            .or_default()
            .insert(from.to_string());
    }

    pub fn contains(&self, binding: &str) -> bool {
        self.edges.contains_key(binding)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Direct dependencies of a binding
    pub fn dependencies_of(&self, binding: &str) -> impl Iterator<Item = &str> {
        self.edges
            .get(binding)
            .into_iter()
            .flat_map(|deps| deps.iter().map(String::as_str))
    }

    /// Bindings that directly depend on this one
    pub fn dependents_of(&self, binding: &str) -> impl Iterator<Item = &str> {
        self.reverse_edges
            .get(binding)
            .into_iter()
            .flat_map(|deps| deps.iter().map(String::as_str))
    }

    /// Dependencies first; ties keep declaration order
    pub fn topological_order(&self) -> Result<Vec<String>, GraphError> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut visited = HashSet::new();
        let mut stack = Vec::new();

        for node in &self.nodes {
            self.visit(node, &mut visited, &mut stack, &mut order)?;
        }
        Ok(order)
    }

    /// Dependents first, the reverse of the creation order
    pub fn destroy_order(&self) -> Result<Vec<String>, GraphError> {
        let mut order = self.topological_order()?;
        order.reverse();
        Ok(order)
    }

    fn visit(
        &self,
        node: &str,
        visited: &mut HashSet<String>,
        stack: &mut Vec<String>,
        order: &mut Vec<String>,
    ) -> Result<(), GraphError> {
        if let Some(pos) = stack.iter().position(|n| n == node) {
            let mut path = stack[pos..].to_vec();
            path.push(node.to_string());
            return Err(GraphError::Cycle { path });
        }
        if visited.contains(node) {
            return Ok(());
        }

        stack.push(node.to_string());
        if let Some(deps) = self.edges.get(node) {
            for dep in deps {
                self.visit(dep, visited, stack, order)?;
            }
        }
        stack.pop();

        visited.insert(node.to_string());
        order.push(node.to_string());
        Ok(())
    }
}

/// Sort resources so that every resource comes after its dependencies
pub fn sort_resources(resources: &[Resource]) -> Result<Vec<Resource>, GraphError> {
    let graph = DependencyGraph::from_resources(resources)?;
    let by_binding: HashMap<String, &Resource> =
        resources.iter().map(|r| (r.binding(), r)).collect();

    Ok(graph
        .topological_order()?
        .into_iter()
        .filter_map(|b| by_binding.get(&b).map(|r| (*r).clone()))
        .collect())
}
