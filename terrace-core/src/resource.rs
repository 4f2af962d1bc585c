//! Resource - Representing resources and their state

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

/// Attribute key holding the name other resources use to reference this one
pub const BINDING_ATTRIBUTE: &str = "_binding";

/// Attribute map of a resource
pub type Attributes = HashMap<String, Value>;

/// Unique identifier for a resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId {
    /// Resource type (e.g., "ec2_vpc", "ec2_instance")
    pub resource_type: String,
    /// Resource name (logical name within the topology)
    pub name: String,
}

impl ResourceId {
    pub fn new(resource_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.resource_type, self.name)
    }
}

/// Pure function turning resolved inputs into a value
pub type Transform = Arc<dyn Fn(&[Value]) -> Result<Value, String> + Send + Sync>;

/// A value derived from other values once all of them are known.
///
/// Inputs are usually `ResourceRef`s; the transform only runs when every input
/// has been resolved to a concrete value. Two computed values are equal when
/// they share a name and inputs, so a plan stays stable across invocations.
#[derive(Clone)]
pub struct Computed {
    pub name: String,
    pub inputs: Vec<Value>,
    transform: Transform,
}

impl Computed {
    pub fn new(
        name: impl Into<String>,
        inputs: Vec<Value>,
        transform: impl Fn(&[Value]) -> Result<Value, String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            inputs,
            transform: Arc::new(transform),
        }
    }

    /// Same transform over a different set of inputs
    pub fn with_inputs(&self, inputs: Vec<Value>) -> Self {
        Self {
            name: self.name.clone(),
            inputs,
            transform: Arc::clone(&self.transform),
        }
    }

    /// Run the transform over concrete inputs
    pub fn evaluate(&self, inputs: &[Value]) -> Result<Value, String> {
        (self.transform)(inputs)
    }
}

impl fmt::Debug for Computed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("name", &self.name)
            .field("inputs", &self.inputs)
            .finish_non_exhaustive()
    }
}

impl PartialEq for Computed {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.inputs == other.inputs
    }
}

/// Attribute value of a resource
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Int(i64),
    Bool(bool),
    List(Vec<Value>),
    Map(HashMap<String, Value>),
    /// Reference to another resource's attribute (binding_name, attribute_name)
    ResourceRef(String, String),
    /// Value computed from other values after they resolve
    Computed(Computed),
}

impl Value {
    pub fn string(s: impl Into<String>) -> Self {
        Value::String(s.into())
    }

    pub fn reference(binding: impl Into<String>, attribute: impl Into<String>) -> Self {
        Value::ResourceRef(binding.into(), attribute.into())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns true if no reference or computed value remains anywhere inside
    pub fn is_resolved(&self) -> bool {
        match self {
            Value::ResourceRef(_, _) | Value::Computed(_) => false,
            Value::List(items) => items.iter().all(Value::is_resolved),
            Value::Map(map) => map.values().all(Value::is_resolved),
            _ => true,
        }
    }

    /// Convert to JSON for state files; unresolved values become placeholders
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Int(n) => serde_json::Value::Number((*n).into()),
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::List(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
            Value::Map(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
            Value::ResourceRef(binding, attr) => {
                serde_json::Value::String(format!("${{{}.{}}}", binding, attr))
            }
            Value::Computed(computed) => {
                serde_json::Value::String(format!("${{{}(...)}}", computed.name))
            }
        }
    }

    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Number(n) => Value::Int(n.as_i64().unwrap_or(0)),
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Array(items) => Value::List(items.iter().map(Value::from_json).collect()),
            serde_json::Value::Object(map) => Value::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
            serde_json::Value::Null => Value::String(String::new()),
        }
    }

    /// Collect binding names this value refers to
    pub fn collect_references(&self, deps: &mut BTreeSet<String>) {
        match self {
            Value::ResourceRef(binding_name, _) => {
                deps.insert(binding_name.clone());
            }
            Value::Computed(computed) => {
                for input in &computed.inputs {
                    input.collect_references(deps);
                }
            }
            Value::List(items) => {
                for item in items {
                    item.collect_references(deps);
                }
            }
            Value::Map(map) => {
                for v in map.values() {
                    v.collect_references(deps);
                }
            }
            _ => {}
        }
    }
}

/// Desired state of a single resource
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub id: ResourceId,
    pub attributes: Attributes,
    /// Bindings that must be ready before this resource is created,
    /// in addition to the ones referenced from attributes
    pub depends_on: Vec<String>,
}

impl Resource {
    pub fn new(resource_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: ResourceId::new(resource_type, name),
            attributes: HashMap::new(),
            depends_on: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn with_binding(self, binding: impl Into<String>) -> Self {
        self.with_attribute(BINDING_ATTRIBUTE, Value::String(binding.into()))
    }

    pub fn depends_on(mut self, binding: impl Into<String>) -> Self {
        self.depends_on.push(binding.into());
        self
    }

    /// Name used by other resources to reference this one
    pub fn binding(&self) -> String {
        match self.attributes.get(BINDING_ATTRIBUTE) {
            Some(Value::String(s)) => s.clone(),
            _ => format!("{}:{}", self.id.resource_type, self.id.name),
        }
    }

    /// All bindings this resource depends on, referenced or explicit
    pub fn dependencies(&self) -> BTreeSet<String> {
        let mut deps = BTreeSet::new();
        for value in self.attributes.values() {
            value.collect_references(&mut deps);
        }
        deps.extend(self.depends_on.iter().cloned());
        deps.remove(&self.binding());
        deps
    }

    /// Attributes sent to a provider (internal `_` keys stripped)
    pub fn provider_attributes(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.attributes.iter().filter(|(k, _)| !k.starts_with('_'))
    }
}

/// Current state fetched from actual infrastructure
#[derive(Debug, Clone, PartialEq)]
pub struct State {
    pub id: ResourceId,
    /// Provider internal identifier (e.g., vpc-xxx, i-xxx)
    pub identifier: Option<String>,
    pub attributes: Attributes,
    /// Whether this state exists
    pub exists: bool,
}

impl State {
    pub fn not_found(id: ResourceId) -> Self {
        Self {
            id,
            identifier: None,
            attributes: HashMap::new(),
            exists: false,
        }
    }

    pub fn existing(id: ResourceId, attributes: Attributes) -> Self {
        Self {
            id,
            identifier: None,
            attributes,
            exists: true,
        }
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }
}
