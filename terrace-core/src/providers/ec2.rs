//! EC2 resource schema definitions
//!
//! Attribute names are snake_case; `provider_name` carries the matching
//! CloudFormation property used by the Cloud Control API.

use std::collections::HashMap;

use crate::schema::{AttributeSchema, AttributeType, ResourceSchema, types};

fn tags() -> AttributeSchema {
    AttributeSchema::new("tags", AttributeType::Map(Box::new(AttributeType::String)))
        .with_provider_name("Tags")
        .with_description("Resource tags")
}

fn identifier(provider_name: &str) -> AttributeSchema {
    AttributeSchema::new("id", AttributeType::String)
        .read_only()
        .with_provider_name(provider_name)
}

fn reference(name: &str, provider_name: &str, description: &str) -> AttributeSchema {
    AttributeSchema::new(name, AttributeType::String)
        .required()
        .with_provider_name(provider_name)
        .with_description(description)
}

/// Returns the schema for VPC
pub fn vpc_schema() -> ResourceSchema {
    ResourceSchema::new("ec2_vpc")
        .with_description("An AWS VPC (Virtual Private Cloud)")
        .attribute(identifier("VpcId"))
        .attribute(
            AttributeSchema::new("cidr_block", types::cidr())
                .required()
                .create_only()
                .with_provider_name("CidrBlock")
                .with_description("The IPv4 CIDR block for the VPC"),
        )
        .attribute(
            AttributeSchema::new("enable_dns_support", AttributeType::Bool)
                .with_provider_name("EnableDnsSupport")
                .with_description("Enable DNS resolution support"),
        )
        .attribute(
            AttributeSchema::new("enable_dns_hostnames", AttributeType::Bool)
                .with_provider_name("EnableDnsHostnames")
                .with_description("Enable DNS hostnames"),
        )
        .attribute(tags())
}

/// Returns the schema for Subnet
pub fn subnet_schema() -> ResourceSchema {
    ResourceSchema::new("ec2_subnet")
        .with_description("An AWS VPC Subnet")
        .attribute(identifier("SubnetId"))
        .attribute(reference("vpc_id", "VpcId", "VPC to create the subnet in").create_only())
        .attribute(
            AttributeSchema::new("cidr_block", types::cidr())
                .required()
                .create_only()
                .with_provider_name("CidrBlock")
                .with_description("The IPv4 CIDR block for the subnet"),
        )
        .attribute(
            AttributeSchema::new("availability_zone", AttributeType::String)
                .create_only()
                .with_provider_name("AvailabilityZone")
                .with_description("The availability zone for the subnet"),
        )
        .attribute(
            AttributeSchema::new("map_public_ip_on_launch", AttributeType::Bool)
                .with_provider_name("MapPublicIpOnLaunch")
                .with_description("Assign a public IPv4 address to instances launched here"),
        )
        .attribute(tags())
}

/// Returns the schema for Internet Gateway
pub fn internet_gateway_schema() -> ResourceSchema {
    ResourceSchema::new("ec2_internet_gateway")
        .with_description("An AWS Internet Gateway")
        .attribute(identifier("InternetGatewayId"))
        .attribute(tags())
}

/// Returns the schema for the attachment of an Internet Gateway to a VPC
pub fn vpc_gateway_attachment_schema() -> ResourceSchema {
    ResourceSchema::new("ec2_vpc_gateway_attachment")
        .with_description("Attaches an Internet Gateway to a VPC")
        .attribute(identifier("Id"))
        .attribute(reference("vpc_id", "VpcId", "VPC to attach to").create_only())
        .attribute(
            reference(
                "internet_gateway_id",
                "InternetGatewayId",
                "Internet Gateway to attach",
            )
            .create_only(),
        )
}

/// Returns the schema for Elastic IP
pub fn eip_schema() -> ResourceSchema {
    ResourceSchema::new("ec2_eip")
        .with_description("A static public IPv4 address")
        .attribute(identifier("AllocationId"))
        .attribute(
            AttributeSchema::new("domain", AttributeType::Enum(vec!["vpc".to_string()]))
                .create_only()
                .with_provider_name("Domain")
                .with_description("Address domain"),
        )
        .attribute(
            AttributeSchema::new("public_ip", AttributeType::String)
                .read_only()
                .with_provider_name("PublicIp"),
        )
        .attribute(tags())
}

/// Returns the schema for NAT Gateway
pub fn nat_gateway_schema() -> ResourceSchema {
    ResourceSchema::new("ec2_nat_gateway")
        .with_description("A NAT gateway giving private subnets outbound access")
        .attribute(identifier("NatGatewayId"))
        .attribute(
            reference(
                "allocation_id",
                "AllocationId",
                "Elastic IP allocation used by the gateway",
            )
            .create_only(),
        )
        .attribute(
            reference("subnet_id", "SubnetId", "Public subnet hosting the gateway").create_only(),
        )
        .attribute(tags())
}

/// Returns the schema for Route Table
pub fn route_table_schema() -> ResourceSchema {
    ResourceSchema::new("ec2_route_table")
        .with_description("An AWS VPC Route Table")
        .attribute(identifier("RouteTableId"))
        .attribute(reference("vpc_id", "VpcId", "VPC for the Route Table").create_only())
        .attribute(tags())
}

/// Returns the schema for a single route
pub fn route_schema() -> ResourceSchema {
    ResourceSchema::new("ec2_route")
        .with_description("A route in a Route Table")
        .attribute(identifier("Id"))
        .attribute(
            reference("route_table_id", "RouteTableId", "Route Table to add to").create_only(),
        )
        .attribute(
            AttributeSchema::new("destination_cidr_block", types::cidr())
                .required()
                .create_only()
                .with_provider_name("DestinationCidrBlock")
                .with_description("Traffic destination"),
        )
        .attribute(
            AttributeSchema::new("gateway_id", AttributeType::String)
                .with_provider_name("GatewayId")
                .with_description("Internet Gateway target"),
        )
        .attribute(
            AttributeSchema::new("nat_gateway_id", AttributeType::String)
                .with_provider_name("NatGatewayId")
                .with_description("NAT Gateway target"),
        )
}

/// Returns the schema for Subnet Route Table Association
pub fn subnet_route_table_association_schema() -> ResourceSchema {
    ResourceSchema::new("ec2_subnet_route_table_association")
        .with_description("Associates a subnet with a Route Table")
        .attribute(identifier("Id"))
        .attribute(reference("subnet_id", "SubnetId", "Subnet to associate").create_only())
        .attribute(
            reference("route_table_id", "RouteTableId", "Route Table to associate")
                .create_only(),
        )
}

/// Returns the schema for Security Group
pub fn security_group_schema() -> ResourceSchema {
    let rules = || AttributeType::List(Box::new(types::security_group_rule()));
    ResourceSchema::new("ec2_security_group")
        .with_description("An AWS VPC Security Group")
        .attribute(identifier("GroupId"))
        .attribute(
            reference("vpc_id", "VpcId", "VPC for the Security Group").create_only(),
        )
        .attribute(
            AttributeSchema::new("group_description", AttributeType::String)
                .required()
                .create_only()
                .with_provider_name("GroupDescription")
                .with_description("Description of the Security Group"),
        )
        .attribute(
            AttributeSchema::new("ingress", rules())
                .with_provider_name("SecurityGroupIngress")
                .with_description("Inbound rules"),
        )
        .attribute(
            AttributeSchema::new("egress", rules())
                .with_provider_name("SecurityGroupEgress")
                .with_description("Outbound rules"),
        )
        .attribute(tags())
}

/// Returns the schema for EC2 Instance
pub fn instance_schema() -> ResourceSchema {
    ResourceSchema::new("ec2_instance")
        .with_description("An EC2 compute instance")
        .attribute(identifier("InstanceId"))
        .attribute(
            AttributeSchema::new("image_id", AttributeType::String)
                .required()
                .create_only()
                .with_provider_name("ImageId"),
        )
        .attribute(
            AttributeSchema::new("instance_type", AttributeType::String)
                .required()
                .with_provider_name("InstanceType"),
        )
        .attribute(
            AttributeSchema::new("key_name", AttributeType::String)
                .create_only()
                .with_provider_name("KeyName")
                .with_description("Key pair used for SSH access"),
        )
        .attribute(reference("subnet_id", "SubnetId", "Subnet to launch into").create_only())
        .attribute(
            AttributeSchema::new(
                "security_group_ids",
                AttributeType::List(Box::new(AttributeType::String)),
            )
            .required()
            .with_provider_name("SecurityGroupIds"),
        )
        .attribute(
            // Expressed through a network interface block on create
            AttributeSchema::new("associate_public_ip_address", AttributeType::Bool)
                .create_only()
                .with_description("Request a public IPv4 address at launch"),
        )
        .attribute(
            AttributeSchema::new("user_data", AttributeType::String)
                .create_only()
                .with_provider_name("UserData")
                .with_description("Boot script"),
        )
        .attribute(
            AttributeSchema::new("private_ip", AttributeType::String)
                .read_only()
                .with_provider_name("PrivateIp"),
        )
        .attribute(
            AttributeSchema::new("public_ip", AttributeType::String)
                .read_only()
                .with_provider_name("PublicIp"),
        )
        .attribute(tags())
}

/// Returns all EC2-related schemas
pub fn schemas() -> Vec<ResourceSchema> {
    vec![
        vpc_schema(),
        subnet_schema(),
        internet_gateway_schema(),
        vpc_gateway_attachment_schema(),
        eip_schema(),
        nat_gateway_schema(),
        route_table_schema(),
        route_schema(),
        subnet_route_table_association_schema(),
        security_group_schema(),
        instance_schema(),
    ]
}

/// Resource types covered by this module
pub const RESOURCE_TYPES: [&str; 11] = [
    "ec2_vpc",
    "ec2_subnet",
    "ec2_internet_gateway",
    "ec2_vpc_gateway_attachment",
    "ec2_eip",
    "ec2_nat_gateway",
    "ec2_route_table",
    "ec2_route",
    "ec2_subnet_route_table_association",
    "ec2_security_group",
    "ec2_instance",
];

/// Schema of a single resource type
pub fn schema_for(resource_type: &str) -> Option<ResourceSchema> {
    schemas()
        .into_iter()
        .find(|s| s.resource_type == resource_type)
}

/// All EC2 schemas keyed by resource type
pub fn schema_registry() -> HashMap<String, ResourceSchema> {
    schemas()
        .into_iter()
        .map(|s| (s.resource_type.clone(), s))
        .collect()
}
