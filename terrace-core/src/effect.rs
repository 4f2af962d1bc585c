//! Effect - A single planned side effect against a provider

use crate::resource::{Resource, ResourceId, State};

/// One provider operation that a Plan will perform
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Create a resource that does not exist yet
    Create(Resource),
    /// Update mutable attributes in place
    Update {
        id: ResourceId,
        from: State,
        to: Resource,
    },
    /// Delete and recreate because a create-only attribute changed
    Replace {
        id: ResourceId,
        from: State,
        to: Resource,
    },
    /// Delete an existing resource by its provider identifier
    Delete { id: ResourceId, identifier: String },
}

impl Effect {
    /// Returns whether this Effect removes the existing resource first
    pub fn is_destructive(&self) -> bool {
        matches!(self, Effect::Replace { .. } | Effect::Delete { .. })
    }

    pub fn resource_id(&self) -> &ResourceId {
        match self {
            Effect::Create(r) => &r.id,
            Effect::Update { id, .. } | Effect::Replace { id, .. } => id,
            Effect::Delete { id, .. } => id,
        }
    }

    /// Desired resource for effects that produce one
    pub fn desired(&self) -> Option<&Resource> {
        match self {
            Effect::Create(r) => Some(r),
            Effect::Update { to, .. } | Effect::Replace { to, .. } => Some(to),
            Effect::Delete { .. } => None,
        }
    }

    /// Short verb used in progress output
    pub fn verb(&self) -> &'static str {
        match self {
            Effect::Create(_) => "Create",
            Effect::Update { .. } => "Update",
            Effect::Replace { .. } => "Replace",
            Effect::Delete { .. } => "Delete",
        }
    }
}

impl std::fmt::Display for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.verb(), self.resource_id())
    }
}
