//! Resolve - Substitute references and computed values
//!
//! A binding map holds the known attributes of every resource by binding name.
//! Resolution replaces `ResourceRef`s found in the map and runs `Computed`
//! transforms whose inputs are all known. Anything still unknown is kept as-is,
//! which is how the plan marks values as "known after apply".

use std::collections::HashMap;

use crate::resource::{Attributes, Resource, Value};

/// Binding name -> known attributes
pub type BindingMap = HashMap<String, Attributes>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ResolveError {
    #[error("Unresolved reference {binding}.{attribute}")]
    Unresolved { binding: String, attribute: String },

    #[error("Failed to compute '{name}': {message}")]
    Transform { name: String, message: String },
}

/// Resolve as much of a value as the bindings allow
pub fn resolve_value(value: &Value, bindings: &BindingMap) -> Result<Value, ResolveError> {
    match value {
        Value::ResourceRef(binding_name, attr_name) => {
            if let Some(attrs) = bindings.get(binding_name)
                && let Some(attr_value) = attrs.get(attr_name)
                && attr_value != value
            {
                return resolve_value(attr_value, bindings);
            }
            Ok(value.clone())
        }
        Value::Computed(computed) => {
            let inputs = computed
                .inputs
                .iter()
                .map(|v| resolve_value(v, bindings))
                .collect::<Result<Vec<_>, _>>()?;
            if inputs.iter().all(Value::is_resolved) {
                computed
                    .evaluate(&inputs)
                    .map_err(|message| ResolveError::Transform {
                        name: computed.name.clone(),
                        message,
                    })
            } else {
                Ok(Value::Computed(computed.with_inputs(inputs)))
            }
        }
        Value::List(items) => Ok(Value::List(
            items
                .iter()
                .map(|v| resolve_value(v, bindings))
                .collect::<Result<_, _>>()?,
        )),
        Value::Map(map) => Ok(Value::Map(
            map.iter()
                .map(|(k, v)| Ok((k.clone(), resolve_value(v, bindings)?)))
                .collect::<Result<_, ResolveError>>()?,
        )),
        _ => Ok(value.clone()),
    }
}

pub fn resolve_attributes(
    attributes: &Attributes,
    bindings: &BindingMap,
) -> Result<Attributes, ResolveError> {
    attributes
        .iter()
        .map(|(k, v)| Ok((k.clone(), resolve_value(v, bindings)?)))
        .collect()
}

/// Resolve a resource as far as possible
pub fn resolve_resource(resource: &Resource, bindings: &BindingMap) -> Result<Resource, ResolveError> {
    Ok(Resource {
        id: resource.id.clone(),
        attributes: resolve_attributes(&resource.attributes, bindings)?,
        depends_on: resource.depends_on.clone(),
    })
}

/// Resolve a resource completely, failing on the first unknown reference
pub fn resolve_resource_strict(
    resource: &Resource,
    bindings: &BindingMap,
) -> Result<Resource, ResolveError> {
    let resolved = resolve_resource(resource, bindings)?;
    for value in resolved.attributes.values() {
        if let Some((binding, attribute)) = first_unresolved(value) {
            return Err(ResolveError::Unresolved { binding, attribute });
        }
    }
    Ok(resolved)
}

/// Find the first reference still present in a value
pub fn first_unresolved(value: &Value) -> Option<(String, String)> {
    match value {
        Value::ResourceRef(binding, attribute) => Some((binding.clone(), attribute.clone())),
        Value::Computed(computed) => computed.inputs.iter().find_map(first_unresolved),
        Value::List(items) => items.iter().find_map(first_unresolved),
        Value::Map(map) => map.values().find_map(first_unresolved),
        _ => None,
    }
}

/// Merge two attribute maps; keys in `primary` win
pub fn merge_attributes(primary: &Attributes, secondary: &Attributes) -> Attributes {
    let mut merged = secondary.clone();
    for (k, v) in primary {
        merged.insert(k.clone(), v.clone());
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::Computed;

    fn bindings_with(binding: &str, attr: &str, value: Value) -> BindingMap {
        let mut attrs = HashMap::new();
        attrs.insert(attr.to_string(), value);
        let mut bindings = HashMap::new();
        bindings.insert(binding.to_string(), attrs);
        bindings
    }

    #[test]
    fn resolves_known_reference() {
        let bindings = bindings_with("vpc", "id", Value::string("vpc-123"));
        let resolved = resolve_value(&Value::reference("vpc", "id"), &bindings).unwrap();
        assert_eq!(resolved, Value::string("vpc-123"));
    }

    #[test]
    fn keeps_unknown_reference() {
        let bindings = bindings_with("vpc", "cidr_block", Value::string("16.0.0.0/16"));
        let value = Value::reference("vpc", "id");
        assert_eq!(resolve_value(&value, &bindings).unwrap(), value);
    }

    #[test]
    fn computed_runs_once_inputs_are_known() {
        let computed = Value::Computed(Computed::new(
            "greeting",
            vec![Value::reference("db", "private_ip")],
            |inputs| match &inputs[0] {
                Value::String(ip) => Ok(Value::String(format!("DB={}", ip))),
                _ => Err("expected string".to_string()),
            },
        ));

        let pending = resolve_value(&computed, &HashMap::new()).unwrap();
        assert!(matches!(pending, Value::Computed(_)));

        let bindings = bindings_with("db", "private_ip", Value::string("16.0.2.10"));
        let done = resolve_value(&computed, &bindings).unwrap();
        assert_eq!(done, Value::string("DB=16.0.2.10"));
    }

    #[test]
    fn computed_transform_errors_are_reported() {
        let computed = Value::Computed(Computed::new("boom", vec![Value::Int(1)], |_| {
            Err("bad input".to_string())
        }));
        let err = resolve_value(&computed, &HashMap::new()).unwrap_err();
        assert_eq!(
            err,
            ResolveError::Transform {
                name: "boom".to_string(),
                message: "bad input".to_string()
            }
        );
    }

    #[test]
    fn strict_resolution_names_missing_reference() {
        let resource = Resource::new("ec2_subnet", "public")
            .with_attribute("vpc_id", Value::reference("vpc", "id"));
        let err = resolve_resource_strict(&resource, &HashMap::new()).unwrap_err();
        assert_eq!(
            err,
            ResolveError::Unresolved {
                binding: "vpc".to_string(),
                attribute: "id".to_string()
            }
        );
    }

    #[test]
    fn merge_prefers_primary() {
        let mut primary = HashMap::new();
        primary.insert("a".to_string(), Value::Int(1));
        let mut secondary = HashMap::new();
        secondary.insert("a".to_string(), Value::Int(2));
        secondary.insert("b".to_string(), Value::Int(3));

        let merged = merge_attributes(&primary, &secondary);
        assert_eq!(merged.get("a"), Some(&Value::Int(1)));
        assert_eq!(merged.get("b"), Some(&Value::Int(3)));
    }
}
