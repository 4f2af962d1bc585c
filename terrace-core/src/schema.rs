//! Schema - Define type schemas for resources
//!
//! Providers define schemas for each resource type, enabling type validation
//! before anything is sent to the cloud, and telling the differ which
//! attributes can only be set at creation time.

use std::collections::HashMap;
use std::fmt;

use crate::resource::Value;

/// Attribute type
#[derive(Debug, Clone)]
pub enum AttributeType {
    /// String
    String,
    /// Integer
    Int,
    /// Boolean
    Bool,
    /// Enum (list of allowed values)
    Enum(Vec<String>),
    /// Custom type (with validation function)
    Custom {
        name: String,
        base: Box<AttributeType>,
        validate: fn(&Value) -> Result<(), String>,
    },
    /// List
    List(Box<AttributeType>),
    /// Map
    Map(Box<AttributeType>),
}

impl AttributeType {
    /// Check if a value conforms to this type
    pub fn validate(&self, value: &Value) -> Result<(), TypeError> {
        match (self, value) {
            // References and computed values are checked once they resolve
            (_, Value::ResourceRef(_, _) | Value::Computed(_)) => Ok(()),
            (AttributeType::String, Value::String(_)) => Ok(()),
            (AttributeType::Int, Value::Int(_)) => Ok(()),
            (AttributeType::Bool, Value::Bool(_)) => Ok(()),

            (AttributeType::Enum(variants), Value::String(s)) => {
                if variants.iter().any(|v| v == s) {
                    Ok(())
                } else {
                    Err(TypeError::InvalidEnumVariant {
                        value: s.clone(),
                        expected: variants.clone(),
                    })
                }
            }

            (AttributeType::Custom { validate, .. }, v) => {
                validate(v).map_err(|msg| TypeError::ValidationFailed { message: msg })
            }

            (AttributeType::List(inner), Value::List(items)) => {
                for (i, item) in items.iter().enumerate() {
                    inner.validate(item).map_err(|e| TypeError::ListItemError {
                        index: i,
                        inner: Box::new(e),
                    })?;
                }
                Ok(())
            }

            (AttributeType::Map(inner), Value::Map(map)) => {
                for (k, v) in map {
                    inner.validate(v).map_err(|e| TypeError::MapValueError {
                        key: k.clone(),
                        inner: Box::new(e),
                    })?;
                }
                Ok(())
            }

            _ => Err(TypeError::TypeMismatch {
                expected: self.type_name(),
                got: value.type_name(),
            }),
        }
    }

    fn type_name(&self) -> String {
        match self {
            AttributeType::String => "String".to_string(),
            AttributeType::Int => "Int".to_string(),
            AttributeType::Bool => "Bool".to_string(),
            AttributeType::Enum(variants) => format!("Enum({})", variants.join(" | ")),
            AttributeType::Custom { name, .. } => name.clone(),
            AttributeType::List(inner) => format!("List<{}>", inner.type_name()),
            AttributeType::Map(inner) => format!("Map<{}>", inner.type_name()),
        }
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_name())
    }
}

/// Type error
#[derive(Debug, Clone, thiserror::Error)]
pub enum TypeError {
    #[error("Type mismatch: expected {expected}, got {got}")]
    TypeMismatch { expected: String, got: String },

    #[error("Invalid enum variant '{value}', expected one of: {}", expected.join(", "))]
    InvalidEnumVariant {
        value: String,
        expected: Vec<String>,
    },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    #[error("Required attribute '{name}' is missing")]
    MissingRequired { name: String },

    #[error("Attribute '{name}' is read-only")]
    ReadOnly { name: String },

    #[error("List item at index {index}: {inner}")]
    ListItemError { index: usize, inner: Box<TypeError> },

    #[error("Map value for key '{key}': {inner}")]
    MapValueError { key: String, inner: Box<TypeError> },
}

impl Value {
    fn type_name(&self) -> String {
        match self {
            Value::String(_) => "String".to_string(),
            Value::Int(_) => "Int".to_string(),
            Value::Bool(_) => "Bool".to_string(),
            Value::List(_) => "List".to_string(),
            Value::Map(_) => "Map".to_string(),
            Value::ResourceRef(binding, attr) => format!("ResourceRef({}.{})", binding, attr),
            Value::Computed(computed) => format!("Computed({})", computed.name),
        }
    }
}

/// Attribute schema
#[derive(Debug, Clone)]
pub struct AttributeSchema {
    pub name: String,
    pub attr_type: AttributeType,
    pub required: bool,
    pub default: Option<Value>,
    pub description: Option<String>,
    /// Provider-side property name (e.g., "VpcId" for AWS Cloud Control)
    pub provider_name: Option<String>,
    /// Changing this attribute requires replacing the resource
    pub create_only: bool,
    /// Reported by the provider, never set by the user
    pub read_only: bool,
}

impl AttributeSchema {
    pub fn new(name: impl Into<String>, attr_type: AttributeType) -> Self {
        Self {
            name: name.into(),
            attr_type,
            required: false,
            default: None,
            description: None,
            provider_name: None,
            create_only: false,
            read_only: false,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn create_only(mut self) -> Self {
        self.create_only = true;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn with_provider_name(mut self, name: impl Into<String>) -> Self {
        self.provider_name = Some(name.into());
        self
    }
}

/// Resource schema
#[derive(Debug, Clone)]
pub struct ResourceSchema {
    pub resource_type: String,
    pub attributes: HashMap<String, AttributeSchema>,
    pub description: Option<String>,
}

impl ResourceSchema {
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            attributes: HashMap::new(),
            description: None,
        }
    }

    pub fn attribute(mut self, schema: AttributeSchema) -> Self {
        self.attributes.insert(schema.name.clone(), schema);
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    /// Whether changing `name` forces a replacement
    pub fn is_create_only(&self, name: &str) -> bool {
        self.attributes.get(name).is_some_and(|a| a.create_only)
    }

    /// Validate resource attributes
    pub fn validate(&self, attributes: &HashMap<String, Value>) -> Result<(), Vec<TypeError>> {
        let mut errors = Vec::new();

        // Check required attributes
        for (name, schema) in &self.attributes {
            if schema.required && !attributes.contains_key(name) && schema.default.is_none() {
                errors.push(TypeError::MissingRequired { name: name.clone() });
            }
        }

        // Type check each attribute
        for (name, value) in attributes {
            if name.starts_with('_') {
                continue;
            }
            if let Some(schema) = self.attributes.get(name) {
                if schema.read_only {
                    errors.push(TypeError::ReadOnly { name: name.clone() });
                } else if let Err(e) = schema.attr_type.validate(value) {
                    errors.push(e);
                }
            }
            // Unknown attributes are allowed (for flexibility)
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Helper functions for common types
pub mod types {
    use super::*;

    /// Positive integer type
    pub fn positive_int() -> AttributeType {
        AttributeType::Custom {
            name: "PositiveInt".to_string(),
            base: Box::new(AttributeType::Int),
            validate: |value| {
                if let Value::Int(n) = value {
                    if *n > 0 {
                        Ok(())
                    } else {
                        Err("Value must be positive".to_string())
                    }
                } else {
                    Err("Expected integer".to_string())
                }
            },
        }
    }

    /// CIDR block type (e.g., "10.0.0.0/16")
    pub fn cidr() -> AttributeType {
        AttributeType::Custom {
            name: "Cidr".to_string(),
            base: Box::new(AttributeType::String),
            validate: |value| {
                if let Value::String(s) = value {
                    validate_cidr(s)
                } else {
                    Err("Expected string".to_string())
                }
            },
        }
    }

    /// Port number type (0-65535; -1 paired with protocol "-1" means all)
    pub fn port_number() -> AttributeType {
        AttributeType::Custom {
            name: "PortNumber".to_string(),
            base: Box::new(AttributeType::Int),
            validate: |value| validate_port(value),
        }
    }

    /// Protocol type for security group rules
    pub fn protocol() -> AttributeType {
        AttributeType::Enum(vec![
            "tcp".to_string(),
            "udp".to_string(),
            "icmp".to_string(),
            "-1".to_string(), // All traffic
        ])
    }

    /// One inline security group rule
    pub fn security_group_rule() -> AttributeType {
        AttributeType::Custom {
            name: "SecurityGroupRule".to_string(),
            base: Box::new(AttributeType::Map(Box::new(AttributeType::String))),
            validate: validate_rule,
        }
    }

    fn validate_port(value: &Value) -> Result<(), String> {
        match value {
            Value::Int(n) if (-1..=65535).contains(n) => Ok(()),
            Value::Int(n) => Err(format!("Port number {} must be between 0 and 65535", n)),
            Value::ResourceRef(_, _) | Value::Computed(_) => Ok(()),
            _ => Err("Expected integer".to_string()),
        }
    }

    fn validate_rule(value: &Value) -> Result<(), String> {
        let Value::Map(rule) = value else {
            return Err("Expected a map with ip_protocol, from_port, to_port, cidr_ip".to_string());
        };

        match rule.get("ip_protocol") {
            Some(p) => protocol().validate(p).map_err(|e| e.to_string())?,
            None => return Err("Rule is missing 'ip_protocol'".to_string()),
        }

        let from = rule.get("from_port").ok_or("Rule is missing 'from_port'")?;
        let to = rule.get("to_port").ok_or("Rule is missing 'to_port'")?;
        validate_port(from)?;
        validate_port(to)?;
        if let (Value::Int(from), Value::Int(to)) = (from, to)
            && from > to
        {
            return Err(format!("from_port {} is greater than to_port {}", from, to));
        }

        match rule.get("cidr_ip") {
            Some(Value::String(s)) => validate_cidr(s),
            Some(Value::ResourceRef(_, _)) => Ok(()),
            Some(_) => Err("cidr_ip must be a string".to_string()),
            None => Err("Rule is missing 'cidr_ip'".to_string()),
        }
    }
}

/// Validate CIDR block format (e.g., "10.0.0.0/16")
pub fn validate_cidr(cidr: &str) -> Result<(), String> {
    let parts: Vec<&str> = cidr.split('/').collect();
    if parts.len() != 2 {
        return Err(format!(
            "Invalid CIDR format '{}': expected IP/prefix",
            cidr
        ));
    }

    let ip = parts[0];
    let prefix = parts[1];

    // Validate IP address
    let octets: Vec<&str> = ip.split('.').collect();
    if octets.len() != 4 {
        return Err(format!("Invalid IP address '{}': expected 4 octets", ip));
    }

    for octet in &octets {
        if octet.parse::<u8>().is_err() {
            return Err(format!(
                "Invalid octet '{}' in IP address: must be 0-255",
                octet
            ));
        }
    }

    // Validate prefix length
    match prefix.parse::<u8>() {
        Ok(p) if p <= 32 => Ok(()),
        Ok(p) => Err(format!("Invalid prefix length '{}': must be 0-32", p)),
        Err(_) => Err(format!(
            "Invalid prefix length '{}': must be a number",
            prefix
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(protocol: &str, from: i64, to: i64, cidr: &str) -> Value {
        let mut m = HashMap::new();
        m.insert("ip_protocol".to_string(), Value::String(protocol.to_string()));
        m.insert("from_port".to_string(), Value::Int(from));
        m.insert("to_port".to_string(), Value::Int(to));
        m.insert("cidr_ip".to_string(), Value::String(cidr.to_string()));
        Value::Map(m)
    }

    #[test]
    fn validate_string_type() {
        let t = AttributeType::String;
        assert!(t.validate(&Value::String("hello".to_string())).is_ok());
        assert!(t.validate(&Value::Int(42)).is_err());
    }

    #[test]
    fn references_are_accepted_for_any_type() {
        assert!(
            AttributeType::Int
                .validate(&Value::reference("vpc", "id"))
                .is_ok()
        );
    }

    #[test]
    fn validate_enum_type() {
        let t = AttributeType::Enum(vec!["a".to_string(), "b".to_string()]);
        assert!(t.validate(&Value::String("a".to_string())).is_ok());
        assert!(t.validate(&Value::String("c".to_string())).is_err());
    }

    #[test]
    fn validate_positive_int() {
        let t = types::positive_int();
        assert!(t.validate(&Value::Int(1)).is_ok());
        assert!(t.validate(&Value::Int(0)).is_err());
        assert!(t.validate(&Value::Int(-1)).is_err());
    }

    #[test]
    fn missing_required_attribute() {
        let schema = ResourceSchema::new("ec2_vpc")
            .attribute(AttributeSchema::new("cidr_block", types::cidr()).required());

        let attrs = HashMap::new();
        let result = schema.validate(&attrs);
        assert!(result.is_err());
    }

    #[test]
    fn read_only_attribute_cannot_be_set() {
        let schema = ResourceSchema::new("ec2_instance")
            .attribute(AttributeSchema::new("private_ip", AttributeType::String).read_only());

        let mut attrs = HashMap::new();
        attrs.insert("private_ip".to_string(), Value::string("16.0.2.4"));
        let errors = schema.validate(&attrs).unwrap_err();
        assert!(matches!(errors[0], TypeError::ReadOnly { .. }));
    }

    #[test]
    fn create_only_lookup() {
        let schema = ResourceSchema::new("ec2_instance")
            .attribute(AttributeSchema::new("user_data", AttributeType::String).create_only())
            .attribute(AttributeSchema::new("tags", AttributeType::String));
        assert!(schema.is_create_only("user_data"));
        assert!(!schema.is_create_only("tags"));
        assert!(!schema.is_create_only("unknown"));
    }

    #[test]
    fn validate_cidr_type() {
        let t = types::cidr();

        assert!(t.validate(&Value::String("16.0.0.0/16".to_string())).is_ok());
        assert!(t.validate(&Value::String("0.0.0.0/0".to_string())).is_ok());
        assert!(
            t.validate(&Value::String("255.255.255.255/32".to_string()))
                .is_ok()
        );

        assert!(t.validate(&Value::String("10.0.0.0".to_string())).is_err()); // no prefix
        assert!(t.validate(&Value::String("10.0.0.0/33".to_string())).is_err());
        assert!(t.validate(&Value::String("10.0.0.256/16".to_string())).is_err());
        assert!(t.validate(&Value::String("10.0.0/16".to_string())).is_err());
        assert!(t.validate(&Value::Int(42)).is_err());
    }

    #[test]
    fn validate_security_group_rule() {
        let t = types::security_group_rule();
        assert!(t.validate(&rule("tcp", 22, 22, "0.0.0.0/0")).is_ok());
        assert!(t.validate(&rule("-1", 0, 0, "0.0.0.0/0")).is_ok());
        assert!(t.validate(&rule("tcp", 3306, 22, "0.0.0.0/0")).is_err());
        assert!(t.validate(&rule("sctp", 22, 22, "0.0.0.0/0")).is_err());
        assert!(t.validate(&rule("tcp", 22, 70000, "0.0.0.0/0")).is_err());
        assert!(t.validate(&rule("tcp", 22, 22, "nowhere")).is_err());
    }
}
