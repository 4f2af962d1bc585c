//! Resource type configurations for AWS Cloud Control API
//!
//! Maps each terrace resource type to its CloudFormation type. Schemas
//! come from `terrace_core::providers::ec2`.

/// Resource type configuration
pub struct ResourceConfig {
    /// Terrace resource type (e.g., "ec2_vpc")
    pub resource_type: &'static str,
    /// AWS CloudFormation type name (e.g., "AWS::EC2::VPC")
    pub aws_type_name: &'static str,
    /// Whether this resource type uses tags
    pub has_tags: bool,
}

pub const RESOURCE_CONFIGS: &[ResourceConfig] = &[
    ResourceConfig {
        resource_type: "ec2_vpc",
        aws_type_name: "AWS::EC2::VPC",
        has_tags: true,
    },
    ResourceConfig {
        resource_type: "ec2_subnet",
        aws_type_name: "AWS::EC2::Subnet",
        has_tags: true,
    },
    ResourceConfig {
        resource_type: "ec2_internet_gateway",
        aws_type_name: "AWS::EC2::InternetGateway",
        has_tags: true,
    },
    ResourceConfig {
        resource_type: "ec2_vpc_gateway_attachment",
        aws_type_name: "AWS::EC2::VPCGatewayAttachment",
        has_tags: false,
    },
    ResourceConfig {
        resource_type: "ec2_eip",
        aws_type_name: "AWS::EC2::EIP",
        has_tags: true,
    },
    ResourceConfig {
        resource_type: "ec2_nat_gateway",
        aws_type_name: "AWS::EC2::NatGateway",
        has_tags: true,
    },
    ResourceConfig {
        resource_type: "ec2_route_table",
        aws_type_name: "AWS::EC2::RouteTable",
        has_tags: true,
    },
    ResourceConfig {
        resource_type: "ec2_route",
        aws_type_name: "AWS::EC2::Route",
        has_tags: false,
    },
    ResourceConfig {
        resource_type: "ec2_subnet_route_table_association",
        aws_type_name: "AWS::EC2::SubnetRouteTableAssociation",
        has_tags: false,
    },
    ResourceConfig {
        resource_type: "ec2_security_group",
        aws_type_name: "AWS::EC2::SecurityGroup",
        has_tags: true,
    },
    ResourceConfig {
        resource_type: "ec2_instance",
        aws_type_name: "AWS::EC2::Instance",
        has_tags: true,
    },
];

/// Get the configuration for a resource type
pub fn get_resource_config(resource_type: &str) -> Option<&'static ResourceConfig> {
    RESOURCE_CONFIGS
        .iter()
        .find(|c| c.resource_type == resource_type)
}

#[cfg(test)]
mod tests {
    use super::*;
    use terrace_core::providers::ec2;

    #[test]
    fn every_ec2_type_has_a_config() {
        for resource_type in ec2::RESOURCE_TYPES {
            assert!(
                get_resource_config(resource_type).is_some(),
                "missing config for {}",
                resource_type
            );
        }
        assert_eq!(RESOURCE_CONFIGS.len(), ec2::RESOURCE_TYPES.len());
    }

    #[test]
    fn unknown_type_has_no_config() {
        assert!(get_resource_config("s3_bucket").is_none());
        assert_eq!(
            get_resource_config("ec2_eip").map(|c| c.aws_type_name),
            Some("AWS::EC2::EIP")
        );
    }
}
