//! AWS Cloud Control Provider implementation
//!
//! This module contains the main provider implementation that communicates
//! with AWS Cloud Control API to manage resources.

use std::time::Duration;

use aws_config::Region;
use aws_sdk_cloudcontrol::Client as CloudControlClient;
use aws_sdk_cloudcontrol::types::OperationStatus;
use serde_json::json;
use terrace_core::provider::{NOT_FOUND, ProviderError, ProviderResult};
use terrace_core::providers::ec2;
use terrace_core::resource::{Attributes, Resource, ResourceId, State, Value};
use terrace_core::schema::ResourceSchema;

use crate::resources::{ResourceConfig, get_resource_config};
use crate::utils::{
    build_tags, decode_user_data, encode_user_data, json_to_value, parse_tags, value_to_json,
};

const MAX_POLL_ATTEMPTS: u32 = 120;
const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// AWS Cloud Control Provider
pub struct AwsccProvider {
    cloudcontrol_client: CloudControlClient,
    region: String,
}

fn lookup(id: &ResourceId) -> ProviderResult<(&'static ResourceConfig, ResourceSchema)> {
    let config = get_resource_config(&id.resource_type);
    let schema = ec2::schema_for(&id.resource_type);
    match (config, schema) {
        (Some(config), Some(schema)) => Ok((config, schema)),
        _ => Err(
            ProviderError::new(format!("Unknown resource type: {}", id.resource_type))
                .for_resource(id.clone()),
        ),
    }
}

impl AwsccProvider {
    /// Create a new AwsccProvider for the specified region
    pub async fn new(region: &str) -> Self {
        let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .load()
            .await;

        Self {
            cloudcontrol_client: CloudControlClient::new(&config),
            region: region.to_string(),
        }
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    // =========================================================================
    // Cloud Control API Methods
    // =========================================================================

    /// Get a resource by identifier using Cloud Control API
    pub async fn cc_get_resource(
        &self,
        type_name: &str,
        identifier: &str,
    ) -> ProviderResult<Option<serde_json::Value>> {
        let result = self
            .cloudcontrol_client
            .get_resource()
            .type_name(type_name)
            .identifier(identifier)
            .send()
            .await;

        match result {
            Ok(response) => {
                if let Some(desc) = response.resource_description()
                    && let Some(props_str) = desc.properties()
                {
                    let props: serde_json::Value =
                        serde_json::from_str(props_str).unwrap_or_default();
                    Ok(Some(props))
                } else {
                    Ok(None)
                }
            }
            Err(e) => {
                let err_str = format!("{:?}", e);
                if err_str.contains("ResourceNotFound") || err_str.contains("NotFound") {
                    Ok(None)
                } else {
                    Err(ProviderError::new(format!(
                        "Failed to get resource: {:?}",
                        e
                    )))
                }
            }
        }
    }

    /// Create a resource using Cloud Control API
    pub async fn cc_create_resource(
        &self,
        type_name: &str,
        desired_state: serde_json::Value,
    ) -> ProviderResult<String> {
        log::debug!("CreateResource {} {}", type_name, desired_state);
        let result = self
            .cloudcontrol_client
            .create_resource()
            .type_name(type_name)
            .desired_state(desired_state.to_string())
            .send()
            .await
            .map_err(|e| ProviderError::new(format!("Failed to create resource: {:?}", e)))?;

        let request_token = result
            .progress_event()
            .and_then(|p| p.request_token())
            .ok_or_else(|| ProviderError::new("No request token returned"))?;

        self.wait_for_operation(request_token).await
    }

    /// Update a resource using Cloud Control API
    pub async fn cc_update_resource(
        &self,
        type_name: &str,
        identifier: &str,
        patch_ops: Vec<serde_json::Value>,
    ) -> ProviderResult<()> {
        if patch_ops.is_empty() {
            return Ok(());
        }

        let patch_document = serde_json::to_string(&patch_ops)
            .map_err(|e| ProviderError::new(format!("Failed to build patch: {}", e)))?;
        log::debug!("UpdateResource {} {} {}", type_name, identifier, patch_document);

        let result = self
            .cloudcontrol_client
            .update_resource()
            .type_name(type_name)
            .identifier(identifier)
            .patch_document(patch_document)
            .send()
            .await
            .map_err(|e| ProviderError::new(format!("Failed to update resource: {:?}", e)))?;

        if let Some(request_token) = result.progress_event().and_then(|p| p.request_token()) {
            self.wait_for_operation(request_token).await?;
        }

        Ok(())
    }

    /// Delete a resource using Cloud Control API
    pub async fn cc_delete_resource(
        &self,
        type_name: &str,
        identifier: &str,
    ) -> ProviderResult<()> {
        log::debug!("DeleteResource {} {}", type_name, identifier);
        let result = self
            .cloudcontrol_client
            .delete_resource()
            .type_name(type_name)
            .identifier(identifier)
            .send()
            .await
            .map_err(|e| {
                let detail = format!("{:?}", e);
                if detail.contains("ResourceNotFound") {
                    ProviderError::coded(NOT_FOUND, format!("{} does not exist", identifier))
                } else {
                    ProviderError::new(format!("Failed to delete resource: {}", detail))
                }
            })?;

        if let Some(request_token) = result.progress_event().and_then(|p| p.request_token()) {
            self.wait_for_operation(request_token).await?;
        }

        Ok(())
    }

    /// Wait for a Cloud Control operation to complete
    async fn wait_for_operation(&self, request_token: &str) -> ProviderResult<String> {
        for _ in 0..MAX_POLL_ATTEMPTS {
            let status = self
                .cloudcontrol_client
                .get_resource_request_status()
                .request_token(request_token)
                .send()
                .await
                .map_err(|e| {
                    ProviderError::new(format!("Failed to get operation status: {:?}", e))
                })?;

            if let Some(progress) = status.progress_event() {
                match progress.operation_status() {
                    Some(OperationStatus::Success) => {
                        return Ok(progress.identifier().unwrap_or("").to_string());
                    }
                    Some(OperationStatus::Failed) => {
                        let msg = progress.status_message().unwrap_or("Unknown error");
                        return Err(match progress.error_code() {
                            Some(code) => ProviderError::coded(code.as_str(), msg),
                            None => ProviderError::new(format!("Operation failed: {}", msg)),
                        });
                    }
                    Some(OperationStatus::CancelComplete) => {
                        return Err(ProviderError::new("Operation was cancelled"));
                    }
                    _ => {
                        tokio::time::sleep(POLL_INTERVAL).await;
                    }
                }
            }
        }

        Err(ProviderError::new("Operation timed out"))
    }

    // =========================================================================
    // Resource Operations
    // =========================================================================

    /// Read a resource by its provider identifier
    pub async fn read_resource(
        &self,
        id: &ResourceId,
        identifier: Option<&str>,
    ) -> ProviderResult<State> {
        let (config, schema) = lookup(id)?;

        let identifier = match identifier {
            Some(identifier) => identifier,
            None => return Ok(State::not_found(id.clone())),
        };

        let props = match self
            .cc_get_resource(config.aws_type_name, identifier)
            .await
            .map_err(|e| e.for_resource(id.clone()))?
        {
            Some(props) => props,
            None => return Ok(State::not_found(id.clone())),
        };

        let attributes = state_attributes(config, &schema, &props, identifier);
        Ok(State::existing(id.clone(), attributes).with_identifier(identifier))
    }

    /// Create a resource and read back its observed state
    pub async fn create_resource(&self, resource: Resource) -> ProviderResult<State> {
        let (config, schema) = lookup(&resource.id)?;
        let desired_state = desired_state(config, &schema, &resource);

        let identifier = self
            .cc_create_resource(
                config.aws_type_name,
                serde_json::Value::Object(desired_state),
            )
            .await
            .map_err(|e| e.for_resource(resource.id.clone()))?;

        let state = self.read_resource(&resource.id, Some(&identifier)).await?;
        if !state.exists {
            return Err(ProviderError::new(format!(
                "Created resource {} could not be read back",
                identifier
            ))
            .for_resource(resource.id));
        }
        Ok(state)
    }

    /// Update the mutable attributes of a resource in place
    pub async fn update_resource(
        &self,
        id: ResourceId,
        identifier: &str,
        from: &State,
        to: Resource,
    ) -> ProviderResult<State> {
        let (config, schema) = lookup(&id)?;
        let patch_ops = patch_operations(config, &schema, from, &to);

        self.cc_update_resource(config.aws_type_name, identifier, patch_ops)
            .await
            .map_err(|e| e.for_resource(id.clone()))?;

        self.read_resource(&id, Some(identifier)).await
    }

    /// Delete a resource
    pub async fn delete_resource(&self, id: &ResourceId, identifier: &str) -> ProviderResult<()> {
        let (config, _) = lookup(id)?;
        self.cc_delete_resource(config.aws_type_name, identifier)
            .await
            .map_err(|e| e.for_resource(id.clone()))
    }
}

// =============================================================================
// Property Mapping
// =============================================================================

/// Convert one attribute to its property value
fn attribute_to_aws(name: &str, value: &Value) -> Option<serde_json::Value> {
    match (name, value) {
        ("user_data", Value::String(script)) => Some(json!(encode_user_data(script))),
        _ => value_to_json(value),
    }
}

fn attribute_from_aws(name: &str, value: &serde_json::Value) -> Option<Value> {
    match (name, value) {
        ("user_data", serde_json::Value::String(encoded)) => {
            Some(Value::String(decode_user_data(encoded)))
        }
        _ => json_to_value(value),
    }
}

/// CloudFormation desired state for a resource whose attributes are resolved
pub fn desired_state(
    config: &ResourceConfig,
    schema: &ResourceSchema,
    resource: &Resource,
) -> serde_json::Map<String, serde_json::Value> {
    let mut desired_state = serde_json::Map::new();

    for (name, attr_schema) in &schema.attributes {
        if name == "tags" || attr_schema.read_only {
            continue;
        }
        if let Some(aws_name) = &attr_schema.provider_name
            && let Some(value) = resource.attributes.get(name.as_str())
            && let Some(v) = attribute_to_aws(name, value)
        {
            desired_state.insert(aws_name.to_string(), v);
        }
    }

    create_special_attributes(resource, &mut desired_state);

    if config.has_tags {
        let tags = build_tags(resource.attributes.get("tags"));
        if !tags.is_empty() {
            desired_state.insert("Tags".to_string(), json!(tags));
        }
    }

    set_default_values(config.resource_type, &mut desired_state);
    desired_state
}

/// Observed attributes from CloudFormation properties
pub fn state_attributes(
    config: &ResourceConfig,
    schema: &ResourceSchema,
    props: &serde_json::Value,
    identifier: &str,
) -> Attributes {
    let mut attributes = Attributes::new();

    for (name, attr_schema) in &schema.attributes {
        if name == "tags" {
            continue;
        }
        if let Some(aws_name) = &attr_schema.provider_name
            && let Some(value) = props.get(aws_name.as_str())
            && let Some(v) = attribute_from_aws(name, value)
        {
            attributes.insert(name.to_string(), v);
        }
    }

    if config.has_tags
        && let Some(tags_array) = props.get("Tags").and_then(|v| v.as_array())
    {
        let tags_map = parse_tags(tags_array);
        if !tags_map.is_empty() {
            attributes.insert("tags".to_string(), Value::Map(tags_map));
        }
    }

    read_special_attributes(config.resource_type, props, &mut attributes);

    attributes
        .entry("id".to_string())
        .or_insert_with(|| Value::string(identifier));
    attributes
}

/// JSON patch for the mutable attributes that differ between state and desired
pub fn patch_operations(
    config: &ResourceConfig,
    schema: &ResourceSchema,
    from: &State,
    to: &Resource,
) -> Vec<serde_json::Value> {
    let mut names: Vec<&String> = schema.attributes.keys().collect();
    names.sort();

    let mut patch_ops = Vec::new();
    for name in names {
        let attr_schema = &schema.attributes[name];
        if name == "tags" || attr_schema.read_only || attr_schema.create_only {
            continue;
        }
        let Some(aws_name) = &attr_schema.provider_name else {
            continue;
        };
        let desired = to.attributes.get(name.as_str());
        if desired == from.attributes.get(name.as_str()) {
            continue;
        }
        match desired.and_then(|v| attribute_to_aws(name, v)) {
            Some(value) => patch_ops.push(json!({
                "op": "add",
                "path": format!("/{}", aws_name),
                "value": value
            })),
            None if from.attributes.contains_key(name.as_str()) => {
                patch_ops.push(json!({"op": "remove", "path": format!("/{}", aws_name)}))
            }
            None => {}
        }
    }

    if config.has_tags && to.attributes.get("tags") != from.attributes.get("tags") {
        let tags = build_tags(to.attributes.get("tags"));
        patch_ops.push(json!({"op": "add", "path": "/Tags", "value": tags}));
    }

    patch_ops
}

// =============================================================================
// Special Case Handlers
// =============================================================================

/// A public address at launch has to be requested on the primary network
/// interface, which then carries the subnet and security groups
fn create_special_attributes(
    resource: &Resource,
    desired_state: &mut serde_json::Map<String, serde_json::Value>,
) {
    if resource.id.resource_type != "ec2_instance" {
        return;
    }
    let public = resource
        .attributes
        .get("associate_public_ip_address")
        .and_then(Value::as_bool);
    let Some(public) = public else {
        return;
    };

    let mut interface = serde_json::Map::new();
    interface.insert("AssociatePublicIpAddress".to_string(), json!(public));
    interface.insert("DeviceIndex".to_string(), json!("0"));
    if let Some(subnet) = desired_state.remove("SubnetId") {
        interface.insert("SubnetId".to_string(), subnet);
    }
    if let Some(groups) = desired_state.remove("SecurityGroupIds") {
        interface.insert("GroupSet".to_string(), groups);
    }
    desired_state.insert(
        "NetworkInterfaces".to_string(),
        json!([serde_json::Value::Object(interface)]),
    );
}

fn read_special_attributes(
    resource_type: &str,
    props: &serde_json::Value,
    attributes: &mut Attributes,
) {
    if resource_type != "ec2_instance" {
        return;
    }
    let primary = props
        .get("NetworkInterfaces")
        .and_then(|v| v.as_array())
        .and_then(|interfaces| {
            interfaces
                .iter()
                .find(|ni| ni.get("DeviceIndex").and_then(|d| d.as_str()) == Some("0"))
        });
    let Some(primary) = primary else {
        return;
    };

    if let Some(public) = primary
        .get("AssociatePublicIpAddress")
        .and_then(|v| v.as_bool())
    {
        attributes.insert(
            "associate_public_ip_address".to_string(),
            Value::Bool(public),
        );
    }
    if !attributes.contains_key("subnet_id")
        && let Some(subnet) = primary.get("SubnetId").and_then(json_to_value)
    {
        attributes.insert("subnet_id".to_string(), subnet);
    }
    if !attributes.contains_key("security_group_ids")
        && let Some(groups) = primary.get("GroupSet").and_then(json_to_value)
    {
        attributes.insert("security_group_ids".to_string(), groups);
    }
}

/// Set default values for create
fn set_default_values(
    resource_type: &str,
    desired_state: &mut serde_json::Map<String, serde_json::Value>,
) {
    if resource_type == "ec2_eip" && !desired_state.contains_key("Domain") {
        desired_state.insert("Domain".to_string(), json!("vpc"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance(public: bool) -> Resource {
        Resource::new("ec2_instance", "nodejs-server")
            .with_attribute("image_id", Value::string("ami-0abcdef"))
            .with_attribute("instance_type", Value::string("t2.micro"))
            .with_attribute("subnet_id", Value::string("subnet-1"))
            .with_attribute(
                "security_group_ids",
                Value::List(vec![Value::string("sg-1")]),
            )
            .with_attribute("associate_public_ip_address", Value::Bool(public))
            .with_attribute("user_data", Value::string("#!/bin/bash\necho hi\n"))
    }

    fn config(resource_type: &str) -> &'static ResourceConfig {
        get_resource_config(resource_type).unwrap()
    }

    #[test]
    fn public_instance_uses_network_interface() {
        let state = desired_state(
            config("ec2_instance"),
            &ec2::instance_schema(),
            &instance(true),
        );
        assert!(!state.contains_key("SubnetId"));
        assert!(!state.contains_key("SecurityGroupIds"));
        assert_eq!(
            state["NetworkInterfaces"],
            json!([{
                "AssociatePublicIpAddress": true,
                "DeviceIndex": "0",
                "SubnetId": "subnet-1",
                "GroupSet": ["sg-1"]
            }])
        );
        assert_eq!(state["UserData"], json!("IyEvYmluL2Jhc2gKZWNobyBoaQo="));
        assert_eq!(state["InstanceType"], json!("t2.micro"));
    }

    #[test]
    fn read_only_attributes_are_not_sent() {
        let resource = instance(false).with_attribute("private_ip", Value::string("16.0.2.4"));
        let state = desired_state(config("ec2_instance"), &ec2::instance_schema(), &resource);
        assert!(!state.contains_key("PrivateIp"));
        assert!(!state.contains_key("InstanceId"));
    }

    #[test]
    fn eip_defaults_to_vpc_domain() {
        let resource = Resource::new("ec2_eip", "nat-eip");
        let state = desired_state(config("ec2_eip"), &ec2::eip_schema(), &resource);
        assert_eq!(state["Domain"], json!("vpc"));
    }

    #[test]
    fn reads_instance_addresses_and_interface() {
        let props = json!({
            "InstanceId": "i-0123",
            "InstanceType": "t2.micro",
            "PrivateIp": "16.0.1.10",
            "PublicIp": "203.0.113.10",
            "UserData": "IyEvYmluL2Jhc2gKZWNobyBoaQo=",
            "NetworkInterfaces": [{
                "DeviceIndex": "0",
                "AssociatePublicIpAddress": true,
                "SubnetId": "subnet-1",
                "GroupSet": ["sg-1"]
            }],
            "Tags": [{"Key": "Name", "Value": "nodejs-server"}]
        });
        let attrs = state_attributes(
            config("ec2_instance"),
            &ec2::instance_schema(),
            &props,
            "i-0123",
        );
        assert_eq!(attrs["id"], Value::string("i-0123"));
        assert_eq!(attrs["private_ip"], Value::string("16.0.1.10"));
        assert_eq!(attrs["public_ip"], Value::string("203.0.113.10"));
        assert_eq!(attrs["user_data"], Value::string("#!/bin/bash\necho hi\n"));
        assert_eq!(attrs["associate_public_ip_address"], Value::Bool(true));
        assert_eq!(attrs["subnet_id"], Value::string("subnet-1"));
        assert_eq!(
            attrs["security_group_ids"],
            Value::List(vec![Value::string("sg-1")])
        );
        assert!(matches!(attrs.get("tags"), Some(Value::Map(m)) if m.len() == 1));
    }

    #[test]
    fn identifier_fills_missing_id() {
        let attrs = state_attributes(
            config("ec2_route"),
            &ec2::route_schema(),
            &json!({"DestinationCidrBlock": "0.0.0.0/0"}),
            "rtb-1|0.0.0.0/0",
        );
        assert_eq!(attrs["id"], Value::string("rtb-1|0.0.0.0/0"));
    }

    #[test]
    fn patch_touches_only_changed_mutable_attributes() {
        let mut current = Attributes::new();
        current.insert("instance_type".to_string(), Value::string("t2.micro"));
        current.insert("image_id".to_string(), Value::string("ami-0abcdef"));
        let from = State::existing(ResourceId::new("ec2_instance", "nodejs-server"), current);
        let to = instance(false).with_attribute("instance_type", Value::string("t3.small"));

        let ops = patch_operations(config("ec2_instance"), &ec2::instance_schema(), &from, &to);
        assert!(ops.contains(&json!({"op": "add", "path": "/InstanceType", "value": "t3.small"})));
        assert!(!ops.iter().any(|op| op["path"] == "/ImageId"));
        assert!(!ops.iter().any(|op| op["path"] == "/UserData"));
    }
}
