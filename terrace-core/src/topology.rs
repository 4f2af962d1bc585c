//! Topology - The two-tier network declaration
//!
//! A public subnet hosts the application instance and a NAT gateway; a private
//! subnet hosts the database instance, which reaches the internet only through
//! that NAT gateway. The application's boot script is computed from the
//! database instance's private address once it is known.

use std::collections::{BTreeMap, HashMap};

use crate::config::TopologyConfig;
use crate::resolve::{BindingMap, resolve_value};
use crate::resource::{Computed, Resource, ResourceId, Value};
use crate::schema::ResourceSchema;
use crate::scripts::ScriptBundle;
use crate::userdata;

/// Binding names used to reference resources within the topology
pub mod binding {
    pub const VPC: &str = "vpc";
    pub const PUBLIC_SUBNET: &str = "public_subnet";
    pub const PRIVATE_SUBNET: &str = "private_subnet";
    pub const INTERNET_GATEWAY: &str = "internet_gateway";
    pub const GATEWAY_ATTACHMENT: &str = "gateway_attachment";
    pub const ELASTIC_IP: &str = "elastic_ip";
    pub const NAT_GATEWAY: &str = "nat_gateway";
    pub const PUBLIC_ROUTE_TABLE: &str = "public_route_table";
    pub const PRIVATE_ROUTE_TABLE: &str = "private_route_table";
    pub const PUBLIC_ROUTE: &str = "public_route";
    pub const PRIVATE_ROUTE: &str = "private_route";
    pub const PUBLIC_ROUTE_ASSOCIATION: &str = "public_route_association";
    pub const PRIVATE_ROUTE_ASSOCIATION: &str = "private_route_association";
    pub const APP_SECURITY_GROUP: &str = "app_security_group";
    pub const DB_SECURITY_GROUP: &str = "db_security_group";
    pub const DB_INSTANCE: &str = "db_instance";
    pub const APP_INSTANCE: &str = "app_instance";
}

const ANYWHERE: &str = "0.0.0.0/0";

/// A published value: one attribute of one binding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Output {
    pub name: &'static str,
    pub binding: &'static str,
    pub attribute: &'static str,
}

/// Declared resources and published outputs
#[derive(Debug, Clone)]
pub struct Topology {
    pub resources: Vec<Resource>,
    pub outputs: Vec<Output>,
}

impl Topology {
    pub fn resource(&self, binding: &str) -> Option<&Resource> {
        self.resources.iter().find(|r| r.binding() == binding)
    }

    /// Values of the outputs that are known in `bindings`
    pub fn resolve_outputs(&self, bindings: &BindingMap) -> BTreeMap<String, Value> {
        self.outputs
            .iter()
            .filter_map(|o| {
                let value = resolve_value(&Value::reference(o.binding, o.attribute), bindings).ok()?;
                value.is_resolved().then(|| (o.name.to_string(), value))
            })
            .collect()
    }

    /// Check every resource against its schema
    pub fn validate(
        &self,
        schemas: &HashMap<String, ResourceSchema>,
    ) -> Result<(), Vec<(ResourceId, String)>> {
        let mut errors = Vec::new();
        for resource in &self.resources {
            match schemas.get(&resource.id.resource_type) {
                Some(schema) => {
                    if let Err(errs) = schema.validate(&resource.attributes) {
                        errors.extend(errs.into_iter().map(|e| (resource.id.clone(), e.to_string())));
                    }
                }
                None => errors.push((
                    resource.id.clone(),
                    format!("Unknown resource type '{}'", resource.id.resource_type),
                )),
            }
        }
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

fn name_tag(name: &str) -> Value {
    let mut tags = HashMap::new();
    tags.insert("Name".to_string(), Value::string(name));
    Value::Map(tags)
}

fn rule(protocol: &str, from_port: i64, to_port: i64, cidr_ip: Value) -> Value {
    let mut rule = HashMap::new();
    rule.insert("ip_protocol".to_string(), Value::string(protocol));
    rule.insert("from_port".to_string(), Value::Int(from_port));
    rule.insert("to_port".to_string(), Value::Int(to_port));
    rule.insert("cidr_ip".to_string(), cidr_ip);
    Value::Map(rule)
}

fn tcp(port: u16, cidr_ip: Value) -> Value {
    rule("tcp", i64::from(port), i64::from(port), cidr_ip)
}

fn allow_all_egress() -> Value {
    Value::List(vec![rule("-1", 0, 0, Value::string(ANYWHERE))])
}

/// Network and its two subnets
pub fn declare_network(config: &TopologyConfig) -> Vec<Resource> {
    let subnet = |name: &str, binding: &str, cidr: &str, public: bool| {
        Resource::new("ec2_subnet", name)
            .with_binding(binding)
            .with_attribute("vpc_id", Value::reference(binding::VPC, "id"))
            .with_attribute("cidr_block", Value::string(cidr))
            .with_attribute("availability_zone", Value::string(&config.availability_zone))
            .with_attribute("map_public_ip_on_launch", Value::Bool(public))
            .with_attribute("tags", name_tag(name))
    };

    vec![
        Resource::new("ec2_vpc", "nodejs-db-vpc")
            .with_binding(binding::VPC)
            .with_attribute("cidr_block", Value::string(&config.vpc_cidr))
            .with_attribute("enable_dns_hostnames", Value::Bool(true))
            .with_attribute("enable_dns_support", Value::Bool(true))
            .with_attribute("tags", name_tag("nodejs-db-vpc")),
        subnet(
            "public-subnet",
            binding::PUBLIC_SUBNET,
            &config.public_subnet_cidr,
            true,
        ),
        subnet(
            "private-subnet",
            binding::PRIVATE_SUBNET,
            &config.private_subnet_cidr,
            false,
        ),
    ]
}

/// Gateways, route tables, default routes and subnet associations
pub fn declare_egress() -> Vec<Resource> {
    let route_table = |name: &str, binding: &str| {
        Resource::new("ec2_route_table", name)
            .with_binding(binding)
            .with_attribute("vpc_id", Value::reference(binding::VPC, "id"))
            .with_attribute("tags", name_tag(name))
    };
    let association = |name: &str, binding: &str, subnet: &str, table: &str| {
        Resource::new("ec2_subnet_route_table_association", name)
            .with_binding(binding)
            .with_attribute("subnet_id", Value::reference(subnet, "id"))
            .with_attribute("route_table_id", Value::reference(table, "id"))
    };

    vec![
        Resource::new("ec2_internet_gateway", "internet-gateway")
            .with_binding(binding::INTERNET_GATEWAY)
            .with_attribute("tags", name_tag("internet-gateway")),
        Resource::new("ec2_vpc_gateway_attachment", "internet-gateway-attachment")
            .with_binding(binding::GATEWAY_ATTACHMENT)
            .with_attribute("vpc_id", Value::reference(binding::VPC, "id"))
            .with_attribute(
                "internet_gateway_id",
                Value::reference(binding::INTERNET_GATEWAY, "id"),
            ),
        Resource::new("ec2_eip", "eip")
            .with_binding(binding::ELASTIC_IP)
            .with_attribute("domain", Value::string("vpc")),
        Resource::new("ec2_nat_gateway", "nat-gateway")
            .with_binding(binding::NAT_GATEWAY)
            .with_attribute("allocation_id", Value::reference(binding::ELASTIC_IP, "id"))
            .with_attribute("subnet_id", Value::reference(binding::PUBLIC_SUBNET, "id"))
            .with_attribute("tags", name_tag("nat-gateway")),
        route_table("public-route-table", binding::PUBLIC_ROUTE_TABLE),
        route_table("private-route-table", binding::PRIVATE_ROUTE_TABLE),
        // The gateway must be attached before it can be a route target
        Resource::new("ec2_route", "public-default-route")
            .with_binding(binding::PUBLIC_ROUTE)
            .with_attribute(
                "route_table_id",
                Value::reference(binding::PUBLIC_ROUTE_TABLE, "id"),
            )
            .with_attribute("destination_cidr_block", Value::string(ANYWHERE))
            .with_attribute("gateway_id", Value::reference(binding::INTERNET_GATEWAY, "id"))
            .depends_on(binding::GATEWAY_ATTACHMENT),
        Resource::new("ec2_route", "private-default-route")
            .with_binding(binding::PRIVATE_ROUTE)
            .with_attribute(
                "route_table_id",
                Value::reference(binding::PRIVATE_ROUTE_TABLE, "id"),
            )
            .with_attribute("destination_cidr_block", Value::string(ANYWHERE))
            .with_attribute("nat_gateway_id", Value::reference(binding::NAT_GATEWAY, "id")),
        association(
            "public-route-table-association",
            binding::PUBLIC_ROUTE_ASSOCIATION,
            binding::PUBLIC_SUBNET,
            binding::PUBLIC_ROUTE_TABLE,
        ),
        association(
            "private-route-table-association",
            binding::PRIVATE_ROUTE_ASSOCIATION,
            binding::PRIVATE_SUBNET,
            binding::PRIVATE_ROUTE_TABLE,
        ),
    ]
}

/// Security groups for the application and database tiers
pub fn declare_firewall(config: &TopologyConfig) -> Vec<Resource> {
    let public_range = || Value::reference(binding::PUBLIC_SUBNET, "cidr_block");

    vec![
        Resource::new("ec2_security_group", "nodejs-security-group")
            .with_binding(binding::APP_SECURITY_GROUP)
            .with_attribute("vpc_id", Value::reference(binding::VPC, "id"))
            .with_attribute("group_description", Value::string("nodejs security groups"))
            .with_attribute(
                "ingress",
                Value::List(vec![
                    tcp(config.ssh_port, Value::string(ANYWHERE)),
                    tcp(config.app_port, Value::string(ANYWHERE)),
                ]),
            )
            .with_attribute("egress", allow_all_egress())
            .with_attribute("tags", name_tag("nodejs-security-group")),
        Resource::new("ec2_security_group", "db-security-group")
            .with_binding(binding::DB_SECURITY_GROUP)
            .with_attribute("vpc_id", Value::reference(binding::VPC, "id"))
            .with_attribute("group_description", Value::string("db security groups"))
            .with_attribute(
                "ingress",
                Value::List(vec![
                    tcp(config.ssh_port, public_range()),
                    tcp(config.db_port, public_range()),
                ]),
            )
            .with_attribute("egress", allow_all_egress())
            .with_attribute("tags", name_tag("db-security-group")),
    ]
}

fn instance(config: &TopologyConfig, name: &str, binding: &str, subnet: &str, group: &str) -> Resource {
    Resource::new("ec2_instance", name)
        .with_binding(binding)
        .with_attribute("image_id", Value::string(&config.image_id))
        .with_attribute("instance_type", Value::string(&config.instance_type))
        .with_attribute("key_name", Value::string(&config.key_name))
        .with_attribute("subnet_id", Value::reference(subnet, "id"))
        .with_attribute(
            "security_group_ids",
            Value::List(vec![Value::reference(group, "id")]),
        )
        .with_attribute("tags", name_tag(name))
}

/// Database instance in the private subnet
pub fn declare_database(config: &TopologyConfig, scripts: &ScriptBundle) -> Resource {
    instance(
        config,
        "db-instance",
        binding::DB_INSTANCE,
        binding::PRIVATE_SUBNET,
        binding::DB_SECURITY_GROUP,
    )
    .with_attribute(
        "user_data",
        Value::string(userdata::db_user_data(&scripts.db_setup)),
    )
    // Package installation needs the NAT path to be complete
    .depends_on(binding::NAT_GATEWAY)
    .depends_on(binding::PRIVATE_ROUTE)
    .depends_on(binding::PRIVATE_ROUTE_ASSOCIATION)
}

/// Boot script of the application instance as a function of the database address
pub fn app_user_data(scripts: &ScriptBundle) -> Computed {
    let scripts = scripts.clone();
    Computed::new(
        "app_user_data",
        vec![Value::reference(binding::DB_INSTANCE, "private_ip")],
        move |inputs| match inputs {
            [Value::String(db_private_ip)] => Ok(Value::String(userdata::app_user_data(
                db_private_ip,
                &scripts,
            ))),
            _ => Err("expected the database private address".to_string()),
        },
    )
}

/// Application instance in the public subnet
pub fn declare_application(config: &TopologyConfig, scripts: &ScriptBundle) -> Resource {
    instance(
        config,
        "nodejs-instance",
        binding::APP_INSTANCE,
        binding::PUBLIC_SUBNET,
        binding::APP_SECURITY_GROUP,
    )
    .with_attribute("associate_public_ip_address", Value::Bool(true))
    .with_attribute("user_data", Value::Computed(app_user_data(scripts)))
}

/// Values published after a deployment
pub fn outputs() -> Vec<Output> {
    let output = |name, binding, attribute| Output {
        name,
        binding,
        attribute,
    };
    vec![
        output("app_public_ip", binding::APP_INSTANCE, "public_ip"),
        output("app_private_ip", binding::APP_INSTANCE, "private_ip"),
        output("db_private_ip", binding::DB_INSTANCE, "private_ip"),
        output("vpc_id", binding::VPC, "id"),
        output("public_subnet_id", binding::PUBLIC_SUBNET, "id"),
        output("private_subnet_id", binding::PRIVATE_SUBNET, "id"),
    ]
}

/// Declare the whole two-tier topology
pub fn declare(config: &TopologyConfig, scripts: &ScriptBundle) -> Topology {
    let mut resources = declare_network(config);
    resources.extend(declare_egress());
    resources.extend(declare_firewall(config));
    resources.push(declare_database(config, scripts));
    resources.push(declare_application(config, scripts));

    Topology {
        resources,
        outputs: outputs(),
    }
}
