//! Provision the two-tier topology end to end against the simulated cloud

use std::collections::HashMap;
use std::sync::Arc;

use terrace_core::config::TopologyConfig;
use terrace_core::differ::{Orphan, add_deletions, create_plan};
use terrace_core::effect::Effect;
use terrace_core::graph::sort_resources;
use terrace_core::interpreter::{ApplyResult, EffectOutcome, Interpreter};
use terrace_core::plan::Plan;
use terrace_core::provider::{Provider, ProviderResult};
use terrace_core::providers::ec2;
use terrace_core::resource::{Resource, ResourceId, State, Value};
use terrace_core::scripts::ScriptBundle;
use terrace_core::simulator::SimulatedProvider;
use terrace_core::topology::{self, Topology, binding};

/// What a state file would remember about one applied resource
struct Recorded {
    state: State,
    binding: String,
    dependencies: Vec<String>,
}

struct Harness {
    provider: Arc<SimulatedProvider>,
    topology: Topology,
    ordered: Vec<Resource>,
    recorded: HashMap<ResourceId, Recorded>,
}

fn scripts() -> ScriptBundle {
    ScriptBundle {
        db_setup: "apt-get install -y mysql-server\n".to_string(),
        app_setup: "npm install\n".to_string(),
        db_health_check: "mysqladmin ping -h \"$DB_PRIVATE_IP\"\n".to_string(),
    }
}

impl Harness {
    fn new(provider: SimulatedProvider) -> Self {
        let topology = topology::declare(&TopologyConfig::default(), &scripts());
        let ordered = sort_resources(&topology.resources).unwrap();
        Self {
            provider: Arc::new(provider),
            topology,
            ordered,
            recorded: HashMap::new(),
        }
    }

    /// Swap in a new declaration, keeping the deployed resources
    fn redeclare(&mut self, config: &TopologyConfig) {
        self.topology = topology::declare(config, &scripts());
        self.ordered = sort_resources(&self.topology.resources).unwrap();
    }

    fn verb_of(&self, plan: &Plan, binding_name: &str) -> Option<&'static str> {
        let id = &self.topology.resource(binding_name).unwrap().id;
        plan.effects()
            .iter()
            .find(|e| e.resource_id() == id)
            .map(|e| e.verb())
    }

    async fn refresh(&self) -> HashMap<ResourceId, State> {
        let mut current = HashMap::new();
        for (id, recorded) in &self.recorded {
            let state = self
                .provider
                .read(id, recorded.state.identifier.as_deref())
                .await
                .unwrap();
            if state.exists {
                current.insert(id.clone(), state);
            }
        }
        current
    }

    async fn plan(&self) -> Plan {
        let current = self.refresh().await;
        create_plan(&self.ordered, &current, &ec2::schema_registry()).unwrap()
    }

    async fn apply(&mut self, plan: &Plan) -> ApplyResult {
        let result = Interpreter::from_shared(Arc::clone(&self.provider))
            .apply(plan)
            .await;
        for (effect, outcome) in plan.effects().iter().zip(&result.outcomes) {
            match outcome {
                Ok(EffectOutcome::Deleted) => {
                    self.recorded.remove(effect.resource_id());
                }
                Ok(outcome) => {
                    if let (Some(state), Some(desired)) = (outcome.state(), effect.desired()) {
                        self.recorded.insert(
                            state.id.clone(),
                            Recorded {
                                state: state.clone(),
                                binding: desired.binding(),
                                dependencies: desired.dependencies().into_iter().collect(),
                            },
                        );
                    }
                }
                Err(_) => {}
            }
        }
        result
    }

    async fn deploy(&mut self) -> ApplyResult {
        let plan = self.plan().await;
        let result = self.apply(&plan).await;
        assert!(result.is_success(), "apply failed: {:?}", result.outcomes);
        result
    }

    fn orphans(&self) -> Vec<Orphan> {
        self.recorded
            .iter()
            .map(|(id, r)| Orphan {
                id: id.clone(),
                binding: r.binding.clone(),
                identifier: r.state.identifier.clone().unwrap(),
                dependencies: r.dependencies.clone(),
            })
            .collect()
    }

    fn attribute(&self, binding_name: &str, key: &str) -> Value {
        let resource = self.topology.resource(binding_name).unwrap();
        self.recorded[&resource.id].state.attributes[key].clone()
    }

    fn outcome<'a>(
        &self,
        plan: &Plan,
        result: &'a ApplyResult,
        binding_name: &str,
    ) -> &'a ProviderResult<EffectOutcome> {
        let id = &self.topology.resource(binding_name).unwrap().id;
        let index = plan
            .effects()
            .iter()
            .position(|e| e.resource_id() == id)
            .unwrap();
        &result.outcomes[index]
    }
}

#[tokio::test]
async fn deploy_creates_both_tiers() {
    let mut harness = Harness::new(SimulatedProvider::new());
    let plan = harness.plan().await;
    assert_eq!(plan.summary().create, harness.ordered.len());

    let result = harness.deploy().await;
    assert_eq!(result.success_count, 17);
    assert_eq!(harness.provider.resource_count(), 17);

    let app_public = harness.attribute(binding::APP_INSTANCE, "public_ip");
    assert!(app_public.as_str().is_some_and(|ip| !ip.is_empty()));
    let app_private = harness.attribute(binding::APP_INSTANCE, "private_ip");
    assert!(app_private.as_str().unwrap().starts_with("16.0.1."));

    let db_private = harness.attribute(binding::DB_INSTANCE, "private_ip");
    assert!(db_private.as_str().unwrap().starts_with("16.0.2."));
    let db = harness.topology.resource(binding::DB_INSTANCE).unwrap();
    assert!(!harness.recorded[&db.id].state.attributes.contains_key("public_ip"));

    let outputs = harness.topology.resolve_outputs(&result.resolved_bindings());
    assert_eq!(outputs["app_public_ip"], app_public);
    assert_eq!(outputs["db_private_ip"], db_private);
    assert_eq!(outputs["vpc_id"], harness.attribute(binding::VPC, "id"));
}

#[tokio::test]
async fn second_plan_is_empty() {
    let mut harness = Harness::new(SimulatedProvider::new());
    harness.deploy().await;

    let plan = harness.plan().await;
    assert!(plan.is_empty(), "unexpected effects: {:?}", plan.effects());
    assert_eq!(plan.settled().len(), 17);
}

#[tokio::test]
async fn database_ingress_is_limited_to_the_public_subnet() {
    let mut harness = Harness::new(SimulatedProvider::new());
    harness.deploy().await;

    let Value::List(rules) = harness.attribute(binding::DB_SECURITY_GROUP, "ingress") else {
        panic!("ingress is not a list");
    };
    assert_eq!(rules.len(), 2);
    for rule in rules {
        let Value::Map(rule) = rule else {
            panic!("rule is not a map");
        };
        assert_eq!(rule["cidr_ip"], Value::string("16.0.1.0/24"));
    }
}

#[tokio::test]
async fn default_routes_use_their_own_gateway() {
    let mut harness = Harness::new(SimulatedProvider::new());
    harness.deploy().await;

    let igw = harness.attribute(binding::INTERNET_GATEWAY, "id");
    let nat = harness.attribute(binding::NAT_GATEWAY, "id");
    assert!(igw.as_str().unwrap().starts_with("igw-"));
    assert!(nat.as_str().unwrap().starts_with("nat-"));

    let public_route = &harness.recorded[&harness.topology.resource(binding::PUBLIC_ROUTE).unwrap().id];
    assert_eq!(public_route.state.attributes["gateway_id"], igw);
    assert!(!public_route.state.attributes.contains_key("nat_gateway_id"));

    let private_route = &harness.recorded[&harness.topology.resource(binding::PRIVATE_ROUTE).unwrap().id];
    assert_eq!(private_route.state.attributes["nat_gateway_id"], nat);
    assert!(!private_route.state.attributes.contains_key("gateway_id"));
}

#[tokio::test]
async fn application_boot_script_points_at_the_database() {
    let mut harness = Harness::new(SimulatedProvider::new());
    harness.deploy().await;

    let db_private = harness.attribute(binding::DB_INSTANCE, "private_ip");
    let user_data = harness.attribute(binding::APP_INSTANCE, "user_data");
    let user_data = user_data.as_str().unwrap();
    assert!(user_data.contains(&format!("DB_PRIVATE_IP={}", db_private.as_str().unwrap())));
    assert!(user_data.contains("npm install"));

    let db_user_data = harness.attribute(binding::DB_INSTANCE, "user_data");
    assert!(db_user_data.as_str().unwrap().contains("mysql-server"));
}

#[tokio::test]
async fn destroy_removes_everything_in_dependency_order() {
    let mut harness = Harness::new(SimulatedProvider::new());
    harness.deploy().await;

    let mut plan = Plan::new();
    add_deletions(&mut plan, &harness.orphans());
    assert_eq!(plan.summary().delete, 17);

    let result = harness.apply(&plan).await;
    assert!(result.is_success(), "destroy failed: {:?}", result.outcomes);
    assert_eq!(harness.provider.resource_count(), 0);
    assert!(harness.recorded.is_empty());

    let position = |binding_name: &str| {
        let id = &harness.topology.resource(binding_name).unwrap().id;
        plan.effects()
            .iter()
            .position(|e| e.resource_id() == id)
            .unwrap()
    };
    assert!(position(binding::APP_INSTANCE) < position(binding::DB_INSTANCE));
    assert!(position(binding::DB_INSTANCE) < position(binding::NAT_GATEWAY));
    assert!(position(binding::PRIVATE_ROUTE) < position(binding::NAT_GATEWAY));
    assert!(position(binding::NAT_GATEWAY) < position(binding::ELASTIC_IP));
    assert!(position(binding::PUBLIC_ROUTE) < position(binding::GATEWAY_ATTACHMENT));
    assert!(position(binding::PUBLIC_SUBNET) < position(binding::VPC));
}

#[tokio::test]
async fn address_exhaustion_abandons_everything_behind_the_nat() {
    let mut harness = Harness::new(SimulatedProvider::new().with_address_limit(0));
    let plan = harness.plan().await;
    let result = harness.apply(&plan).await;

    assert!(!result.is_success());
    let eip = harness.outcome(&plan, &result, binding::ELASTIC_IP);
    assert!(eip.as_ref().err().unwrap().to_string().contains("AddressLimitExceeded"));
    for dependent in [binding::NAT_GATEWAY, binding::DB_INSTANCE, binding::APP_INSTANCE] {
        assert!(
            harness.outcome(&plan, &result, dependent).is_err(),
            "{} should not have been provisioned",
            dependent
        );
    }
    assert!(harness.provider.identifiers_of("ec2_instance").is_empty());
    assert!(harness.provider.identifiers_of("ec2_nat_gateway").is_empty());
}

#[tokio::test]
async fn new_database_address_replaces_the_application() {
    let mut harness = Harness::new(SimulatedProvider::new());
    harness.deploy().await;
    let old_db_ip = harness.attribute(binding::DB_INSTANCE, "private_ip");
    let old_app_id = harness.attribute(binding::APP_INSTANCE, "id");

    // The database disappears outside of terrace
    let db = harness.topology.resource(binding::DB_INSTANCE).unwrap().id.clone();
    let db_identifier = harness.recorded[&db].state.identifier.clone().unwrap();
    harness.provider.delete(&db, &db_identifier).await.unwrap();

    let plan = harness.plan().await;
    let verbs: HashMap<String, &str> = plan
        .effects()
        .iter()
        .map(|e| (e.resource_id().name.clone(), e.verb()))
        .collect();
    assert_eq!(verbs.len(), 2);
    assert!(matches!(plan.effects()[0], Effect::Create(_)));
    assert!(
        plan.effects()
            .iter()
            .any(|e| matches!(e, Effect::Replace { id, .. } if id.name == "nodejs-instance"))
    );

    harness.deploy().await;
    let new_db_ip = harness.attribute(binding::DB_INSTANCE, "private_ip");
    assert_ne!(new_db_ip, old_db_ip);
    assert_ne!(harness.attribute(binding::APP_INSTANCE, "id"), old_app_id);
    let user_data = harness.attribute(binding::APP_INSTANCE, "user_data");
    assert!(
        user_data
            .as_str()
            .unwrap()
            .contains(&format!("DB_PRIVATE_IP={}", new_db_ip.as_str().unwrap()))
    );
    assert_eq!(harness.provider.identifiers_of("ec2_instance").len(), 2);
}

#[tokio::test]
async fn new_private_range_rebuilds_the_database_tier() {
    let mut harness = Harness::new(SimulatedProvider::new());
    harness.deploy().await;
    let old_subnet = harness.attribute(binding::PRIVATE_SUBNET, "id");

    let config = TopologyConfig {
        private_subnet_cidr: "16.0.3.0/24".to_string(),
        ..TopologyConfig::default()
    };
    harness.redeclare(&config);

    let plan = harness.plan().await;
    assert_eq!(plan.effects().len(), 4, "unexpected effects: {:?}", plan.effects());
    for replaced in [
        binding::PRIVATE_SUBNET,
        binding::PRIVATE_ROUTE_ASSOCIATION,
        binding::DB_INSTANCE,
        binding::APP_INSTANCE,
    ] {
        assert_eq!(harness.verb_of(&plan, replaced), Some("Replace"), "{}", replaced);
    }

    let result = harness.apply(&plan).await;
    assert!(result.is_success(), "apply failed: {:?}", result.outcomes);
    assert_eq!(harness.provider.resource_count(), 17);
    assert_ne!(harness.attribute(binding::PRIVATE_SUBNET, "id"), old_subnet);

    let db_private = harness.attribute(binding::DB_INSTANCE, "private_ip");
    let db_private = db_private.as_str().unwrap();
    assert!(db_private.starts_with("16.0.3."));
    let user_data = harness.attribute(binding::APP_INSTANCE, "user_data");
    assert!(user_data.as_str().unwrap().contains(&format!("DB_PRIVATE_IP={}", db_private)));

    let replan = harness.plan().await;
    assert!(replan.is_empty(), "unexpected effects: {:?}", replan.effects());
}

#[tokio::test]
async fn new_availability_zone_rebuilds_both_subnets_and_the_nat() {
    let mut harness = Harness::new(SimulatedProvider::new().with_address_limit(1));
    harness.deploy().await;
    let old_nat = harness.attribute(binding::NAT_GATEWAY, "id");

    let config = TopologyConfig {
        availability_zone: "ap-southeast-1b".to_string(),
        ..TopologyConfig::default()
    };
    harness.redeclare(&config);

    let plan = harness.plan().await;
    let replaced = [
        binding::PUBLIC_SUBNET,
        binding::PRIVATE_SUBNET,
        binding::NAT_GATEWAY,
        binding::PRIVATE_ROUTE,
        binding::PUBLIC_ROUTE_ASSOCIATION,
        binding::PRIVATE_ROUTE_ASSOCIATION,
        binding::DB_INSTANCE,
        binding::APP_INSTANCE,
    ];
    assert_eq!(plan.effects().len(), replaced.len(), "unexpected effects: {:?}", plan.effects());
    for binding_name in replaced {
        assert_eq!(harness.verb_of(&plan, binding_name), Some("Replace"), "{}", binding_name);
    }
    assert_eq!(harness.verb_of(&plan, binding::ELASTIC_IP), None);

    let result = harness.apply(&plan).await;
    assert!(result.is_success(), "apply failed: {:?}", result.outcomes);
    assert_eq!(harness.provider.resource_count(), 17);

    let nat = harness.attribute(binding::NAT_GATEWAY, "id");
    assert_ne!(nat, old_nat);
    assert_eq!(harness.attribute(binding::PRIVATE_ROUTE, "nat_gateway_id"), nat);
    assert_eq!(
        harness.attribute(binding::PUBLIC_SUBNET, "availability_zone"),
        Value::string("ap-southeast-1b")
    );

    let replan = harness.plan().await;
    assert!(replan.is_empty(), "unexpected effects: {:?}", replan.effects());
}
