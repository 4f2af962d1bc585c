//! Conversions between terrace values and CloudFormation property JSON

use std::collections::HashMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use heck::{ToSnakeCase, ToUpperCamelCase};
use serde_json::json;
use terrace_core::resource::Value;

/// Property name for a nested attribute key (e.g., "cidr_ip" -> "CidrIp")
pub fn to_provider_key(name: &str) -> String {
    name.to_upper_camel_case()
}

/// Attribute key for a nested property name (e.g., "IpProtocol" -> "ip_protocol")
pub fn from_provider_key(name: &str) -> String {
    name.to_snake_case()
}

/// EC2 expects user data base64-encoded
pub fn encode_user_data(script: &str) -> String {
    STANDARD.encode(script.as_bytes())
}

/// Decode user data read back from EC2; undecodable input is kept as-is
pub fn decode_user_data(encoded: &str) -> String {
    STANDARD
        .decode(encoded.trim())
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .unwrap_or_else(|| encoded.to_string())
}

/// Convert a resolved value to property JSON; unresolved values yield None
pub fn value_to_json(value: &Value) -> Option<serde_json::Value> {
    match value {
        Value::String(s) => Some(json!(s)),
        Value::Bool(b) => Some(json!(b)),
        Value::Int(i) => Some(json!(i)),
        Value::List(items) => {
            let arr: Vec<serde_json::Value> = items.iter().filter_map(value_to_json).collect();
            Some(serde_json::Value::Array(arr))
        }
        Value::Map(map) => {
            let mut obj = serde_json::Map::new();
            for (key, v) in map {
                if let Some(v) = value_to_json(v) {
                    obj.insert(to_provider_key(key), v);
                }
            }
            Some(serde_json::Value::Object(obj))
        }
        Value::ResourceRef(_, _) | Value::Computed(_) => None,
    }
}

/// Convert property JSON to a value, snake-casing nested object keys
pub fn json_to_value(value: &serde_json::Value) -> Option<Value> {
    match value {
        serde_json::Value::String(s) => Some(Value::String(s.clone())),
        serde_json::Value::Bool(b) => Some(Value::Bool(*b)),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(Value::Int(i))
            } else {
                n.as_f64().map(|f| Value::Int(f as i64))
            }
        }
        serde_json::Value::Array(arr) => {
            let items: Vec<Value> = arr.iter().filter_map(json_to_value).collect();
            Some(Value::List(items))
        }
        serde_json::Value::Object(obj) => {
            let map: HashMap<String, Value> = obj
                .iter()
                .filter_map(|(k, v)| json_to_value(v).map(|v| (from_provider_key(k), v)))
                .collect();
            Some(Value::Map(map))
        }
        serde_json::Value::Null => None,
    }
}

/// Build the CloudFormation tag list from a tags map
pub fn build_tags(user_tags: Option<&Value>) -> Vec<serde_json::Value> {
    let mut tags = Vec::new();
    if let Some(Value::Map(user_tags)) = user_tags {
        let mut keys: Vec<&String> = user_tags.keys().collect();
        keys.sort();
        for key in keys {
            if let Some(Value::String(v)) = user_tags.get(key) {
                tags.push(json!({"Key": key, "Value": v}));
            }
        }
    }
    tags
}

/// Parse a CloudFormation tag list into a map
pub fn parse_tags(tags_array: &[serde_json::Value]) -> HashMap<String, Value> {
    let mut tags_map = HashMap::new();
    for tag in tags_array {
        if let (Some(key), Some(value)) = (
            tag.get("Key").and_then(|v| v.as_str()),
            tag.get("Value").and_then(|v| v.as_str()),
        ) {
            tags_map.insert(key.to_string(), Value::String(value.to_string()));
        }
    }
    tags_map
}
