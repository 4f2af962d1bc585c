//! State file structures for persisting infrastructure state

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

use terrace_core::differ::Orphan;
use terrace_core::resource::{Attributes, ResourceId, State, Value};

/// The main state file structure that persists to the backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateFile {
    /// State file format version
    pub version: u32,
    /// Monotonically increasing number for each state modification
    pub serial: u64,
    /// Unique identifier for this state lineage (prevents accidental overwrites)
    pub lineage: String,
    /// Version of terrace that last modified this state
    pub terrace_version: String,
    /// All managed resources and their current state
    pub resources: Vec<ResourceState>,
    /// Published outputs of the last successful apply
    #[serde(default)]
    pub outputs: BTreeMap<String, serde_json::Value>,
}

impl StateFile {
    /// Current state file format version
    pub const CURRENT_VERSION: u32 = 1;

    /// Create a new empty state file
    pub fn new() -> Self {
        Self::with_lineage(uuid::Uuid::new_v4().to_string())
    }

    /// Create a new state file with a specific lineage (for initialization)
    pub fn with_lineage(lineage: String) -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            serial: 0,
            lineage,
            terrace_version: env!("CARGO_PKG_VERSION").to_string(),
            resources: Vec::new(),
            outputs: BTreeMap::new(),
        }
    }

    /// Increment serial and update terrace version for a new state write
    pub fn increment_serial(&mut self) {
        self.serial += 1;
        self.terrace_version = env!("CARGO_PKG_VERSION").to_string();
    }

    /// Find a resource by type and name
    pub fn find_resource(&self, resource_type: &str, name: &str) -> Option<&ResourceState> {
        self.resources
            .iter()
            .find(|r| r.resource_type == resource_type && r.name == name)
    }

    /// Find a resource mutably by type and name
    pub fn find_resource_mut(
        &mut self,
        resource_type: &str,
        name: &str,
    ) -> Option<&mut ResourceState> {
        self.resources
            .iter_mut()
            .find(|r| r.resource_type == resource_type && r.name == name)
    }

    /// Add or update a resource in the state
    pub fn upsert_resource(&mut self, resource: ResourceState) {
        if let Some(existing) = self.find_resource_mut(&resource.resource_type, &resource.name) {
            *existing = resource;
        } else {
            self.resources.push(resource);
        }
    }

    /// Remove a resource from the state
    pub fn remove_resource(&mut self, resource_type: &str, name: &str) -> Option<ResourceState> {
        let pos = self
            .resources
            .iter()
            .position(|r| r.resource_type == resource_type && r.name == name)?;
        Some(self.resources.remove(pos))
    }

    /// Recorded state of every resource, keyed by id
    pub fn current_states(&self) -> HashMap<ResourceId, State> {
        self.resources
            .iter()
            .map(|r| (r.resource_id(), r.to_state()))
            .collect()
    }

    /// Recorded resources whose id is not among `declared`
    pub fn orphans(&self, declared: &HashSet<ResourceId>) -> Vec<Orphan> {
        self.resources
            .iter()
            .filter(|r| !declared.contains(&r.resource_id()))
            .filter_map(ResourceState::to_orphan)
            .collect()
    }

    /// Every recorded resource, for a full teardown
    pub fn all_orphans(&self) -> Vec<Orphan> {
        self.orphans(&HashSet::new())
    }

    pub fn set_outputs(&mut self, outputs: &BTreeMap<String, Value>) {
        self.outputs = outputs
            .iter()
            .filter(|(_, v)| v.is_resolved())
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect();
    }
}

impl Default for StateFile {
    fn default() -> Self {
        Self::new()
    }
}

/// State of a single managed resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceState {
    /// Resource type (e.g., "ec2_vpc", "ec2_instance")
    pub resource_type: String,
    /// Resource name (logical name within the topology)
    pub name: String,
    /// Provider name (e.g., "awscc")
    pub provider: String,
    /// Provider-assigned identifier (e.g., "vpc-0a1b2c3d")
    #[serde(default)]
    pub identifier: Option<String>,
    /// Binding other resources referenced this one by
    #[serde(default)]
    pub binding: String,
    /// Bindings this resource depended on when it was applied
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// All attributes of the resource as JSON values
    pub attributes: HashMap<String, serde_json::Value>,
}

impl ResourceState {
    /// Create a new resource state
    pub fn new(
        resource_type: impl Into<String>,
        name: impl Into<String>,
        provider: impl Into<String>,
    ) -> Self {
        Self {
            resource_type: resource_type.into(),
            name: name.into(),
            provider: provider.into(),
            identifier: None,
            binding: String::new(),
            dependencies: Vec::new(),
            attributes: HashMap::new(),
        }
    }

    /// Record an applied resource
    pub fn from_state(
        state: &State,
        binding: impl Into<String>,
        dependencies: impl IntoIterator<Item = String>,
        provider: impl Into<String>,
    ) -> Self {
        Self {
            resource_type: state.id.resource_type.clone(),
            name: state.id.name.clone(),
            provider: provider.into(),
            identifier: state.identifier.clone(),
            binding: binding.into(),
            dependencies: dependencies.into_iter().collect(),
            attributes: state
                .attributes
                .iter()
                .filter(|(k, _)| !k.starts_with('_'))
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        }
    }

    /// Set an attribute value
    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    pub fn with_binding(mut self, binding: impl Into<String>) -> Self {
        self.binding = binding.into();
        self
    }

    pub fn with_dependencies(mut self, dependencies: &[&str]) -> Self {
        self.dependencies = dependencies.iter().map(|d| d.to_string()).collect();
        self
    }

    pub fn resource_id(&self) -> ResourceId {
        ResourceId::new(&self.resource_type, &self.name)
    }

    /// Convert back to the engine's state representation
    pub fn to_state(&self) -> State {
        let attributes: Attributes = self
            .attributes
            .iter()
            .map(|(k, v)| (k.clone(), Value::from_json(v)))
            .collect();
        let state = State::existing(self.resource_id(), attributes);
        match &self.identifier {
            Some(identifier) => state.with_identifier(identifier),
            None => state,
        }
    }

    /// Resources without an identifier were never created and need no delete
    pub fn to_orphan(&self) -> Option<Orphan> {
        let identifier = self.identifier.clone()?;
        let binding = if self.binding.is_empty() {
            self.name.clone()
        } else {
            self.binding.clone()
        };
        Some(Orphan {
            id: self.resource_id(),
            binding,
            identifier,
            dependencies: self.dependencies.clone(),
        })
    }
}
