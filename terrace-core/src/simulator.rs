//! Simulated cloud provider
//!
//! An in-process stand-in for the EC2 control plane, optionally persisted to
//! a JSON file so consecutive CLI runs see the same "cloud". It assigns
//! identifiers and addresses the way EC2 does and rejects the requests EC2
//! would reject: unknown identifiers, deleting a resource something else
//! still uses, routes with two targets, and address exhaustion.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::provider::{BoxFuture, Provider, ProviderError, ProviderResult};
use crate::providers::ec2;
use crate::resource::{Attributes, Resource, ResourceId, State, Value};

/// Attributes whose string values must name an existing resource
const REFERENCE_ATTRIBUTES: [&str; 8] = [
    "vpc_id",
    "subnet_id",
    "internet_gateway_id",
    "allocation_id",
    "route_table_id",
    "gateway_id",
    "nat_gateway_id",
    "security_group_ids",
];

/// Attributes assigned by the simulated cloud, kept across updates
const ASSIGNED_ATTRIBUTES: [&str; 3] = ["id", "private_ip", "public_ip"];

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SimulatedResource {
    resource_type: String,
    name: String,
    attributes: BTreeMap<String, serde_json::Value>,
}

impl SimulatedResource {
    fn attributes(&self) -> Attributes {
        self.attributes
            .iter()
            .map(|(k, v)| (k.clone(), Value::from_json(v)))
            .collect()
    }

    fn str_attr(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(|v| v.as_str())
    }

    fn bool_attr(&self, key: &str) -> Option<bool> {
        self.attributes.get(key).and_then(|v| v.as_bool())
    }

    fn mentions(&self, identifier: &str) -> bool {
        fn walk(value: &serde_json::Value, identifier: &str) -> bool {
            match value {
                serde_json::Value::String(s) => s == identifier,
                serde_json::Value::Array(items) => items.iter().any(|v| walk(v, identifier)),
                serde_json::Value::Object(map) => map.values().any(|v| walk(v, identifier)),
                _ => false,
            }
        }
        self.attributes
            .iter()
            .filter(|(k, _)| k.as_str() != "id")
            .any(|(_, v)| walk(v, identifier))
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SimulatedCloud {
    next_id: u64,
    next_public_host: u32,
    /// Subnet identifier -> next host offset for private addresses
    next_private_host: BTreeMap<String, u32>,
    /// Identifier -> resource
    resources: BTreeMap<String, SimulatedResource>,
}

/// Provider backed by the simulated cloud
#[derive(Debug, Default)]
pub struct SimulatedProvider {
    cloud: Mutex<SimulatedCloud>,
    path: Option<PathBuf>,
    address_limit: Option<usize>,
}

impl SimulatedProvider {
    /// Empty, in-memory cloud
    pub fn new() -> Self {
        Self::default()
    }

    /// Cloud persisted at `path`, created on first write
    pub fn open(path: impl AsRef<Path>) -> ProviderResult<Self> {
        let path = path.as_ref().to_path_buf();
        let cloud = if path.exists() {
            let content = fs::read_to_string(&path).map_err(|e| {
                ProviderError::new(format!("Failed to read {}", path.display())).with_cause(e)
            })?;
            serde_json::from_str(&content).map_err(|e| {
                ProviderError::new(format!("Failed to parse {}", path.display())).with_cause(e)
            })?
        } else {
            SimulatedCloud::default()
        };
        Ok(Self {
            cloud: Mutex::new(cloud),
            path: Some(path),
            address_limit: None,
        })
    }

    /// Cap the number of static addresses that can be allocated
    pub fn with_address_limit(mut self, limit: usize) -> Self {
        self.address_limit = Some(limit);
        self
    }

    /// Number of live resources
    pub fn resource_count(&self) -> usize {
        self.lock().map(|c| c.resources.len()).unwrap_or(0)
    }

    /// Identifiers of live resources of one type
    pub fn identifiers_of(&self, resource_type: &str) -> Vec<String> {
        self.lock()
            .map(|c| {
                c.resources
                    .iter()
                    .filter(|(_, r)| r.resource_type == resource_type)
                    .map(|(id, _)| id.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn lock(&self) -> ProviderResult<MutexGuard<'_, SimulatedCloud>> {
        self.cloud
            .lock()
            .map_err(|_| ProviderError::new("simulated cloud state is poisoned"))
    }

    fn persist(&self, cloud: &SimulatedCloud) -> ProviderResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| {
                ProviderError::new(format!("Failed to create {}", parent.display())).with_cause(e)
            })?;
        }
        let content = serde_json::to_string_pretty(cloud)
            .map_err(|e| ProviderError::new("Failed to serialize simulated cloud").with_cause(e))?;
        fs::write(path, content).map_err(|e| {
            ProviderError::new(format!("Failed to write {}", path.display())).with_cause(e)
        })
    }

    fn create_resource(&self, resource: &Resource) -> ProviderResult<State> {
        let mut cloud = self.lock()?;
        let fail = |message: String| cloud_error(&resource.id, message);

        let mut attributes: BTreeMap<String, serde_json::Value> = resource
            .provider_attributes()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect();

        check_references(&cloud, &attributes).map_err(fail)?;

        cloud.next_id += 1;
        let serial = format!("{:08x}", cloud.next_id);
        let identifier = match resource.id.resource_type.as_str() {
            "ec2_vpc" => format!("vpc-{}", serial),
            "ec2_subnet" => format!("subnet-{}", serial),
            "ec2_internet_gateway" => format!("igw-{}", serial),
            "ec2_vpc_gateway_attachment" => format!("attach-{}", serial),
            "ec2_eip" => {
                let allocated = cloud
                    .resources
                    .values()
                    .filter(|r| r.resource_type == "ec2_eip")
                    .count();
                if self.address_limit.is_some_and(|limit| allocated >= limit) {
                    return Err(fail(
                        "AddressLimitExceeded: The maximum number of addresses has been reached"
                            .to_string(),
                    ));
                }
                attributes.insert("public_ip".to_string(), next_public_ip(&mut cloud).into());
                format!("eipalloc-{}", serial)
            }
            "ec2_nat_gateway" => {
                if let Some(allocation) = attributes.get("allocation_id").and_then(|v| v.as_str())
                    && cloud.resources.values().any(|r| {
                        r.resource_type == "ec2_nat_gateway"
                            && r.str_attr("allocation_id") == Some(allocation)
                    })
                {
                    return Err(fail(format!(
                        "Resource.AlreadyAssociated: {} is already associated",
                        allocation
                    )));
                }
                format!("nat-{}", serial)
            }
            "ec2_route_table" => format!("rtb-{}", serial),
            "ec2_route" => {
                let targets = ["gateway_id", "nat_gateway_id"]
                    .iter()
                    .filter(|k| attributes.contains_key(**k))
                    .count();
                if targets != 1 {
                    return Err(fail(
                        "InvalidParameterCombination: specify exactly one route target".to_string(),
                    ));
                }
                format!("r-{}", serial)
            }
            "ec2_subnet_route_table_association" => format!("rtbassoc-{}", serial),
            "ec2_security_group" => format!("sg-{}", serial),
            "ec2_instance" => {
                let subnet_id = attributes
                    .get("subnet_id")
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
                    .ok_or_else(|| fail("MissingParameter: subnet_id".to_string()))?;
                let (private_ip, map_public) =
                    next_private_ip(&mut cloud, &subnet_id).map_err(fail)?;
                attributes.insert("private_ip".to_string(), private_ip.into());

                let public = attributes
                    .get("associate_public_ip_address")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(map_public);
                if public {
                    attributes.insert("public_ip".to_string(), next_public_ip(&mut cloud).into());
                }
                format!("i-{}", serial)
            }
            other => {
                return Err(fail(format!("Unsupported resource type: {}", other)));
            }
        };

        attributes.insert("id".to_string(), identifier.clone().into());
        let record = SimulatedResource {
            resource_type: resource.id.resource_type.clone(),
            name: resource.id.name.clone(),
            attributes,
        };
        let state = State::existing(resource.id.clone(), record.attributes())
            .with_identifier(identifier.clone());

        info!("simulator: created {} as {}", resource.id, identifier);
        cloud.resources.insert(identifier, record);
        self.persist(&cloud)?;
        Ok(state)
    }

    fn update_resource(&self, id: &ResourceId, identifier: &str, to: &Resource) -> ProviderResult<State> {
        let mut cloud = self.lock()?;
        let fail = |message: String| cloud_error(id, message);

        let mut attributes: BTreeMap<String, serde_json::Value> = to
            .provider_attributes()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect();
        check_references(&cloud, &attributes).map_err(fail)?;

        let record = cloud
            .resources
            .get_mut(identifier)
            .ok_or_else(|| fail(format!("NotFound: {} does not exist", identifier)))?;
        for key in ASSIGNED_ATTRIBUTES {
            if let Some(v) = record.attributes.get(key) {
                attributes.insert(key.to_string(), v.clone());
            }
        }
        record.attributes = attributes;
        let state = State::existing(id.clone(), record.attributes()).with_identifier(identifier);

        info!("simulator: updated {} ({})", id, identifier);
        self.persist(&cloud)?;
        Ok(state)
    }

    fn delete_resource(&self, id: &ResourceId, identifier: &str) -> ProviderResult<()> {
        let mut cloud = self.lock()?;
        let fail = |message: String| cloud_error(id, message);

        if !cloud.resources.contains_key(identifier) {
            return Err(fail(format!("NotFound: {} does not exist", identifier)));
        }
        if let Some((dependent, _)) = cloud
            .resources
            .iter()
            .find(|(other, r)| other.as_str() != identifier && r.mentions(identifier))
        {
            return Err(fail(format!(
                "DependencyViolation: {} has a dependent object ({})",
                identifier, dependent
            )));
        }

        cloud.resources.remove(identifier);
        info!("simulator: deleted {} ({})", id, identifier);
        self.persist(&cloud)
    }
}

fn check_references(
    cloud: &SimulatedCloud,
    attributes: &BTreeMap<String, serde_json::Value>,
) -> Result<(), String> {
    for key in REFERENCE_ATTRIBUTES {
        let Some(value) = attributes.get(key) else {
            continue;
        };
        let ids: Vec<&str> = match value {
            serde_json::Value::String(s) => vec![s.as_str()],
            serde_json::Value::Array(items) => items.iter().filter_map(|v| v.as_str()).collect(),
            _ => vec![],
        };
        for id in ids {
            if !cloud.resources.contains_key(id) {
                return Err(format!("InvalidID: {} '{}' does not exist", key, id));
            }
        }
    }
    Ok(())
}

fn next_public_ip(cloud: &mut SimulatedCloud) -> String {
    cloud.next_public_host += 1;
    let n = cloud.next_public_host;
    format!("198.51.{}.{}", 100 + n / 254, n % 254 + 1)
}

/// Next private address in a subnet, and whether the subnet maps public addresses
fn next_private_ip(cloud: &mut SimulatedCloud, subnet_id: &str) -> Result<(String, bool), String> {
    let subnet = cloud
        .resources
        .get(subnet_id)
        .filter(|r| r.resource_type == "ec2_subnet")
        .ok_or_else(|| format!("InvalidSubnetID: {} does not exist", subnet_id))?;
    let cidr = subnet
        .str_attr("cidr_block")
        .ok_or_else(|| format!("Subnet {} has no cidr_block", subnet_id))?
        .to_string();
    let map_public = subnet.bool_attr("map_public_ip_on_launch").unwrap_or(false);

    let (network, prefix) = parse_cidr(&cidr)?;
    let capacity = 1u64 << (32 - u32::from(prefix));
    // First four addresses and the last one are reserved
    let offset = cloud
        .next_private_host
        .entry(subnet_id.to_string())
        .or_insert(4);
    if u64::from(*offset) >= capacity.saturating_sub(1) {
        return Err(format!(
            "InsufficientFreeAddressesInSubnet: {} has no free addresses",
            subnet_id
        ));
    }
    let address = network + *offset;
    *offset += 1;

    let octets = address.to_be_bytes();
    Ok((
        format!("{}.{}.{}.{}", octets[0], octets[1], octets[2], octets[3]),
        map_public,
    ))
}

fn parse_cidr(cidr: &str) -> Result<(u32, u8), String> {
    let (ip, prefix) = cidr
        .split_once('/')
        .ok_or_else(|| format!("Invalid CIDR '{}'", cidr))?;
    let prefix: u8 = prefix
        .parse()
        .ok()
        .filter(|p| *p <= 32)
        .ok_or_else(|| format!("Invalid prefix in '{}'", cidr))?;
    let mut address = 0u32;
    let mut count = 0;
    for octet in ip.split('.') {
        let octet: u8 = octet
            .parse()
            .map_err(|_| format!("Invalid address in '{}'", cidr))?;
        address = (address << 8) | u32::from(octet);
        count += 1;
    }
    if count != 4 {
        return Err(format!("Invalid address in '{}'", cidr));
    }
    let mask = if prefix == 0 { 0 } else { u32::MAX << (32 - u32::from(prefix)) };
    Ok((address & mask, prefix))
}

/// Split an EC2-style "Code: message" into a coded error
fn cloud_error(id: &ResourceId, message: String) -> ProviderError {
    let error = match message.split_once(": ") {
        Some((code, rest)) if !code.contains(' ') => ProviderError::coded(code, rest),
        _ => ProviderError::new(message.as_str()),
    };
    error.for_resource(id.clone())
}

impl Provider for SimulatedProvider {
    fn name(&self) -> &'static str {
        "simulated"
    }

    fn handles(&self, resource_type: &str) -> bool {
        ec2::RESOURCE_TYPES.contains(&resource_type)
    }

    fn read(
        &self,
        id: &ResourceId,
        identifier: Option<&str>,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.map(str::to_string);
        Box::pin(async move {
            let Some(identifier) = identifier else {
                return Ok(State::not_found(id));
            };
            let cloud = self.lock()?;
            match cloud.resources.get(&identifier) {
                Some(r) if r.resource_type == id.resource_type => {
                    debug!("simulator: read {} ({})", id, identifier);
                    Ok(State::existing(id, r.attributes()).with_identifier(identifier))
                }
                _ => Ok(State::not_found(id)),
            }
        })
    }

    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        let result = self.create_resource(resource);
        Box::pin(async move { result })
    }

    fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        _from: &State,
        to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        let result = self.update_resource(id, identifier, to);
        Box::pin(async move { result })
    }

    fn delete(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<()>> {
        let result = self.delete_resource(id, identifier);
        Box::pin(async move { result })
    }
}
