//! Interpreter - Execute Effects using a Provider
//!
//! Replacements first remove their old resources, dependents before their
//! dependencies. Create, update and replace Effects then run concurrently, one
//! task each. A task first waits for the deferred attributes of every binding
//! it depends on, then resolves its references, calls the Provider and
//! publishes its own attributes. A failed task drops its resolver so dependents
//! fail instead of waiting forever. Deletes run afterwards, one at a time, in
//! plan order.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use log::{debug, info, warn};
use tokio::task::JoinSet;

use crate::deferred::{BindingRegistry, Resolver};
use crate::effect::Effect;
use crate::graph::DependencyGraph;
use crate::plan::Plan;
use crate::provider::{Provider, ProviderError, ProviderResult};
use crate::resolve::{BindingMap, merge_attributes, resolve_resource_strict};
use crate::resource::{Attributes, Resource, ResourceId, State, Value};

const ABORTED: &str = "aborted after an earlier failure";

/// Result of executing each Effect
#[derive(Debug)]
pub enum EffectOutcome {
    /// Create succeeded
    Created { state: State },
    /// Update succeeded
    Updated { state: State },
    /// Delete and create succeeded
    Replaced { state: State },
    /// Delete succeeded
    Deleted,
    /// Skipped (e.g., dry-run, or aborted after a failure)
    Skipped { reason: String },
}

impl EffectOutcome {
    /// State of the resource after the Effect, if it still exists
    pub fn state(&self) -> Option<&State> {
        match self {
            EffectOutcome::Created { state }
            | EffectOutcome::Updated { state }
            | EffectOutcome::Replaced { state } => Some(state),
            EffectOutcome::Deleted | EffectOutcome::Skipped { .. } => None,
        }
    }

    fn skipped(reason: impl Into<String>) -> Self {
        EffectOutcome::Skipped {
            reason: reason.into(),
        }
    }
}

/// Result of executing the entire Plan
#[derive(Debug)]
pub struct ApplyResult {
    /// One outcome per Effect, in plan order
    pub outcomes: Vec<ProviderResult<EffectOutcome>>,
    pub success_count: usize,
    pub failure_count: usize,
    pub skipped_count: usize,
    /// Attributes of every binding, settled or provisioned
    pub bindings: BindingRegistry,
}

impl ApplyResult {
    pub fn is_success(&self) -> bool {
        self.failure_count == 0
    }

    /// Known attributes of every binding after the apply
    pub fn resolved_bindings(&self) -> BindingMap {
        self.bindings.snapshot()
    }
}

/// Interpreter configuration
#[derive(Debug, Clone, Default)]
pub struct InterpreterConfig {
    /// If true, skip actual side effects
    pub dry_run: bool,
}

/// Bindings whose effects were skipped, so their dependents skip too
type SkippedBindings = Arc<Mutex<HashSet<String>>>;

fn mark_skipped(skipped: &SkippedBindings, binding: String) {
    if let Ok(mut set) = skipped.lock() {
        set.insert(binding);
    }
}

/// Interpreter that executes Effects using a Provider
pub struct Interpreter<P: Provider + 'static> {
    provider: Arc<P>,
    config: InterpreterConfig,
}

impl<P: Provider + 'static> Interpreter<P> {
    pub fn new(provider: P) -> Self {
        Self::from_shared(Arc::new(provider))
    }

    pub fn from_shared(provider: Arc<P>) -> Self {
        Self {
            provider,
            config: InterpreterConfig::default(),
        }
    }

    pub fn with_config(mut self, config: InterpreterConfig) -> Self {
        self.config = config;
        self
    }

    /// Execute a Plan, interpreting all Effects and causing side effects
    pub async fn apply(&self, plan: &Plan) -> ApplyResult {
        let effects = plan.effects();
        let mut registry = BindingRegistry::new();
        for (binding, attrs) in plan.settled() {
            registry.settle(binding.clone(), attrs.clone());
        }

        let mut resolvers: HashMap<usize, Resolver<Attributes>> = HashMap::new();
        for (index, effect) in effects.iter().enumerate() {
            if let Some(resource) = effect.desired() {
                resolvers.insert(index, registry.register(resource.binding()));
            }
        }

        let abort = Arc::new(AtomicBool::new(false));
        let skipped: SkippedBindings = Arc::default();
        let mut outcomes: Vec<Option<ProviderResult<EffectOutcome>>> =
            effects.iter().map(|_| None).collect();

        if !self.config.dry_run {
            for index in teardown_order(effects) {
                let Effect::Replace { id, from, to } = &effects[index] else {
                    continue;
                };
                let Some(identifier) = from.identifier.as_deref() else {
                    continue;
                };
                // Removing the resolver abandons dependents of this binding
                if abort.load(Ordering::SeqCst) {
                    warn!("Skipping {} after an earlier failure", effects[index]);
                    mark_skipped(&skipped, to.binding());
                    resolvers.remove(&index);
                    outcomes[index] = Some(Ok(EffectOutcome::skipped(ABORTED)));
                    continue;
                }
                info!("Deleting {} ({}) to replace it", id, identifier);
                if let Err(e) = delete_existing(&*self.provider, id, identifier).await {
                    warn!("{} failed: {}", effects[index], e);
                    abort.store(true, Ordering::SeqCst);
                    resolvers.remove(&index);
                    outcomes[index] = Some(Err(e));
                }
            }
        }

        let mut tasks = JoinSet::new();
        for (index, effect) in effects.iter().enumerate() {
            let Some(resolver) = resolvers.remove(&index) else {
                continue;
            };
            let task = EffectTask {
                provider: Arc::clone(&self.provider),
                registry: registry.clone(),
                abort: Arc::clone(&abort),
                skipped: Arc::clone(&skipped),
                config: self.config.clone(),
                effect: effect.clone(),
            };
            tasks.spawn(async move { (index, task.run(resolver).await) });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => outcomes[index] = Some(result),
                Err(e) => warn!("Effect task ended abnormally: {}", e),
            }
        }

        for (index, effect) in effects.iter().enumerate() {
            if let Effect::Delete { id, identifier } = effect {
                let result = if self.config.dry_run {
                    Ok(EffectOutcome::skipped("dry-run mode"))
                } else if abort.load(Ordering::SeqCst) {
                    warn!("Skipping {} after an earlier failure", effect);
                    Ok(EffectOutcome::skipped(ABORTED))
                } else {
                    info!("Deleting {} ({})", id, identifier);
                    match delete_existing(&*self.provider, id, identifier).await {
                        Ok(()) => Ok(EffectOutcome::Deleted),
                        Err(e) => {
                            abort.store(true, Ordering::SeqCst);
                            Err(e)
                        }
                    }
                };
                outcomes[index] = Some(result);
            }
        }

        let outcomes: Vec<_> = outcomes
            .into_iter()
            .zip(effects)
            .map(|(outcome, effect)| {
                outcome.unwrap_or_else(|| {
                    Err(ProviderError::new("effect did not complete")
                        .for_resource(effect.resource_id().clone()))
                })
            })
            .collect();

        let mut success_count = 0;
        let mut failure_count = 0;
        let mut skipped_count = 0;
        for outcome in &outcomes {
            match outcome {
                Ok(EffectOutcome::Skipped { .. }) => skipped_count += 1,
                Ok(_) => success_count += 1,
                Err(_) => failure_count += 1,
            }
        }

        ApplyResult {
            outcomes,
            success_count,
            failure_count,
            skipped_count,
            bindings: registry,
        }
    }
}

/// Delete a resource, counting one that is already gone as deleted
async fn delete_existing<P: Provider>(
    provider: &P,
    id: &ResourceId,
    identifier: &str,
) -> ProviderResult<()> {
    match provider.delete(id, identifier).await {
        Err(e) if e.is_not_found() => {
            info!("{} ({}) is already gone", id, identifier);
            Ok(())
        }
        result => result,
    }
}

/// Indices of Replace effects, dependents before their dependencies
fn teardown_order(effects: &[Effect]) -> Vec<usize> {
    let replaced: Vec<(usize, String, BTreeSet<String>)> = effects
        .iter()
        .enumerate()
        .filter_map(|(index, effect)| match effect {
            Effect::Replace { to, .. } => Some((index, to.binding(), to.dependencies())),
            _ => None,
        })
        .collect();

    let graph = DependencyGraph::from_edges(
        replaced
            .iter()
            .map(|(_, binding, deps)| (binding.as_str(), deps.iter().map(String::as_str))),
    );
    let by_binding: HashMap<&str, usize> = replaced
        .iter()
        .map(|(index, binding, _)| (binding.as_str(), *index))
        .collect();

    // Plan order is already a creation order; reverse it if the edges cycle
    let order = graph
        .destroy_order()
        .unwrap_or_else(|_| replaced.iter().rev().map(|(_, b, _)| b.clone()).collect());
    order
        .iter()
        .filter_map(|binding| by_binding.get(binding.as_str()).copied())
        .collect()
}

/// Everything one spawned Effect needs
struct EffectTask<P: Provider> {
    provider: Arc<P>,
    registry: BindingRegistry,
    abort: Arc<AtomicBool>,
    skipped: SkippedBindings,
    config: InterpreterConfig,
    effect: Effect,
}

impl<P: Provider> EffectTask<P> {
    async fn run(self, resolver: Resolver<Attributes>) -> ProviderResult<EffectOutcome> {
        let Some(desired) = self.effect.desired() else {
            return Ok(EffectOutcome::skipped("not a provisioning effect"));
        };

        if self.config.dry_run {
            resolver.resolve(desired.attributes.clone());
            return Ok(EffectOutcome::skipped("dry-run mode"));
        }

        let result = self.provision(desired).await;
        match &result {
            Ok(EffectOutcome::Skipped { .. }) => {
                mark_skipped(&self.skipped, desired.binding());
            }
            Ok(outcome) => {
                if let Some(state) = outcome.state() {
                    resolver.resolve(state.attributes.clone());
                }
            }
            Err(e) => {
                warn!("{} failed: {}", self.effect, e);
                self.abort.store(true, Ordering::SeqCst);
            }
        }
        // A resolver still held here is dropped, abandoning dependents
        result
    }

    fn was_skipped(&self, binding: &str) -> bool {
        self.skipped
            .lock()
            .map(|set| set.contains(binding))
            .unwrap_or(false)
    }

    async fn provision(&self, desired: &Resource) -> ProviderResult<EffectOutcome> {
        let id = desired.id.clone();
        let mut bindings = BindingMap::new();

        for dep in desired.dependencies() {
            debug!("{} waiting on '{}'", id, dep);
            let reader = self.registry.get(&dep).ok_or_else(|| {
                ProviderError::new(format!("unknown dependency '{}'", dep)).for_resource(id.clone())
            })?;
            let attrs = match reader.get().await {
                Ok(attrs) => attrs,
                Err(_) if self.was_skipped(&dep) => {
                    warn!("Skipping {}: '{}' was skipped", self.effect, dep);
                    return Ok(EffectOutcome::skipped(format!(
                        "dependency '{}' was skipped",
                        dep
                    )));
                }
                Err(e) => {
                    return Err(ProviderError::new(format!(
                        "dependency '{}' was not provisioned",
                        dep
                    ))
                    .for_resource(id.clone())
                    .with_cause(e));
                }
            };
            bindings.insert(dep, attrs);
        }

        if self.abort.load(Ordering::SeqCst) {
            warn!("Skipping {} after an earlier failure", self.effect);
            return Ok(EffectOutcome::skipped(ABORTED));
        }

        let resolved = resolve_resource_strict(desired, &bindings)
            .map_err(|e| ProviderError::new(e.to_string()).for_resource(id.clone()))?;

        match &self.effect {
            Effect::Create(_) => {
                info!("Creating {}", id);
                let state = self.provider.create(&resolved).await?;
                Ok(EffectOutcome::Created {
                    state: settle_state(state, &resolved),
                })
            }
            Effect::Update { from, .. } => {
                info!("Updating {}", id);
                let identifier = from.identifier.as_deref().unwrap_or("");
                let state = self.provider.update(&id, identifier, from, &resolved).await?;
                Ok(EffectOutcome::Updated {
                    state: settle_state(state, &resolved),
                })
            }
            // The old resource was removed before any task started
            Effect::Replace { .. } => {
                info!("Creating replacement for {}", id);
                let state = self.provider.create(&resolved).await?;
                Ok(EffectOutcome::Replaced {
                    state: settle_state(state, &resolved),
                })
            }
            Effect::Delete { .. } => Ok(EffectOutcome::skipped("not a provisioning effect")),
        }
    }
}

/// Combine what the provider reported with what was requested; the provider wins
fn settle_state(mut state: State, resolved: &Resource) -> State {
    let mut attributes = merge_attributes(&state.attributes, &resolved.attributes);
    if let Some(identifier) = &state.identifier {
        attributes
            .entry("id".to_string())
            .or_insert_with(|| Value::String(identifier.clone()));
    }
    state.attributes = attributes;
    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{BoxFuture, NOT_FOUND};
    use crate::resource::{Computed, ResourceId};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Records calls; fails creates and deletes of the named resources
    #[derive(Default)]
    struct TestProvider {
        calls: Mutex<Vec<String>>,
        fail: Vec<String>,
        slow: Vec<String>,
        /// Already deleted outside of terrace
        gone: Vec<String>,
    }

    impl TestProvider {
        fn failing(name: &str) -> Self {
            Self {
                fail: vec![name.to_string()],
                ..Default::default()
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl Provider for TestProvider {
        fn name(&self) -> &'static str {
            "test"
        }

        fn handles(&self, _resource_type: &str) -> bool {
            true
        }

        fn read(
            &self,
            id: &ResourceId,
            _identifier: Option<&str>,
        ) -> BoxFuture<'_, ProviderResult<State>> {
            let id = id.clone();
            Box::pin(async move { Ok(State::not_found(id)) })
        }

        fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
            let resource = resource.clone();
            Box::pin(async move {
                // Give dependents a chance to run ahead if ordering were broken
                let delay = if self.slow.contains(&resource.id.name) { 50 } else { 10 };
                tokio::time::sleep(Duration::from_millis(delay)).await;
                self.calls
                    .lock()
                    .unwrap()
                    .push(format!("create {}", resource.id.name));
                if self.fail.contains(&resource.id.name) {
                    return Err(ProviderError::new("AddressLimitExceeded")
                        .for_resource(resource.id.clone()));
                }
                let mut attrs = resource.attributes.clone();
                attrs.insert(
                    "private_ip".to_string(),
                    Value::string(format!("16.0.2.{}", resource.id.name.len())),
                );
                Ok(State::existing(resource.id.clone(), attrs)
                    .with_identifier(format!("id-{}", resource.id.name)))
            })
        }

        fn update(
            &self,
            id: &ResourceId,
            identifier: &str,
            _from: &State,
            to: &Resource,
        ) -> BoxFuture<'_, ProviderResult<State>> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("update {}", id.name));
            let state =
                State::existing(id.clone(), to.attributes.clone()).with_identifier(identifier);
            Box::pin(async move { Ok(state) })
        }

        fn delete(&self, id: &ResourceId, _identifier: &str) -> BoxFuture<'_, ProviderResult<()>> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("delete {}", id.name));
            let result = if self.fail.contains(&id.name) {
                Err(ProviderError::new("DependencyViolation").for_resource(id.clone()))
            } else if self.gone.contains(&id.name) {
                Err(ProviderError::coded(NOT_FOUND, "no such resource").for_resource(id.clone()))
            } else {
                Ok(())
            };
            Box::pin(async move { result })
        }
    }

    fn two_tier_plan() -> Plan {
        let user_data = Computed::new(
            "app_user_data",
            vec![Value::reference("db", "private_ip")],
            |inputs| match &inputs[0] {
                Value::String(ip) => Ok(Value::String(format!("DB_PRIVATE_IP={}", ip))),
                _ => Err("expected string".to_string()),
            },
        );
        let mut plan = Plan::new();
        // Dependents listed first: ordering must come from the references
        plan.add(Effect::Create(
            Resource::new("ec2_instance", "app")
                .with_binding("app")
                .with_attribute("subnet_id", Value::reference("vpc", "id"))
                .with_attribute("user_data", Value::Computed(user_data)),
        ));
        plan.add(Effect::Create(
            Resource::new("ec2_instance", "db")
                .with_binding("db")
                .with_attribute("subnet_id", Value::reference("vpc", "id")),
        ));
        plan.add(Effect::Create(
            Resource::new("ec2_vpc", "vpc").with_binding("vpc"),
        ));
        plan
    }

    #[tokio::test]
    async fn apply_empty_plan() {
        let interpreter = Interpreter::new(TestProvider::default());
        let plan = Plan::new();
        let result = interpreter.apply(&plan).await;

        assert!(result.is_success());
        assert_eq!(result.success_count, 0);
    }

    #[tokio::test]
    async fn apply_create_effect() {
        let interpreter = Interpreter::new(TestProvider::default());
        let mut plan = Plan::new();
        plan.add(Effect::Create(Resource::new("ec2_vpc", "main")));

        let result = interpreter.apply(&plan).await;

        assert!(result.is_success());
        assert_eq!(result.success_count, 1);
        let state = result.outcomes[0].as_ref().unwrap().state().unwrap();
        assert_eq!(state.attributes.get("id"), Some(&Value::string("id-main")));
    }

    #[tokio::test]
    async fn dependents_wait_for_dependencies() {
        let provider = Arc::new(TestProvider::default());
        let interpreter = Interpreter::from_shared(Arc::clone(&provider));
        let result = interpreter.apply(&two_tier_plan()).await;

        assert!(result.is_success());
        let calls = provider.calls();
        assert_eq!(calls.last().map(String::as_str), Some("create app"));
        assert_eq!(calls.first().map(String::as_str), Some("create vpc"));

        let app = result.outcomes[0].as_ref().unwrap().state().unwrap();
        assert_eq!(app.attributes["subnet_id"], Value::string("id-vpc"));
        assert_eq!(
            app.attributes["user_data"],
            Value::string("DB_PRIVATE_IP=16.0.2.2")
        );

        let bindings = result.resolved_bindings();
        assert_eq!(bindings["db"]["private_ip"], Value::string("16.0.2.2"));
    }

    #[tokio::test]
    async fn failure_abandons_dependents() {
        let provider = Arc::new(TestProvider::failing("db"));
        let interpreter = Interpreter::from_shared(Arc::clone(&provider));
        let result = interpreter.apply(&two_tier_plan()).await;

        assert!(!result.is_success());
        assert_eq!(result.failure_count, 2);
        let err = result.outcomes[0].as_ref().unwrap_err();
        assert_eq!(
            err.to_string(),
            "[ec2_instance.app] dependency 'db' was not provisioned"
        );
        let err = result.outcomes[1].as_ref().unwrap_err();
        assert_eq!(err.to_string(), "[ec2_instance.db] AddressLimitExceeded");
        assert!(!provider.calls().contains(&"create app".to_string()));
    }

    #[tokio::test]
    async fn dry_run_skips_effects() {
        let config = InterpreterConfig {
            dry_run: true,
            ..Default::default()
        };
        let provider = Arc::new(TestProvider::default());
        let interpreter = Interpreter::from_shared(Arc::clone(&provider)).with_config(config);

        let result = interpreter.apply(&two_tier_plan()).await;

        assert!(result.is_success());
        assert_eq!(result.skipped_count, 3);
        assert!(matches!(
            result.outcomes[0],
            Ok(EffectOutcome::Skipped { .. })
        ));
        assert!(provider.calls().is_empty());
    }

    #[tokio::test]
    async fn settled_bindings_feed_effects() {
        let mut plan = Plan::new();
        let mut vpc = HashMap::new();
        vpc.insert("id".to_string(), Value::string("vpc-settled"));
        plan.settle("vpc", vpc);
        plan.add(Effect::Create(
            Resource::new("ec2_subnet", "public")
                .with_binding("public_subnet")
                .with_attribute("vpc_id", Value::reference("vpc", "id")),
        ));

        let result = Interpreter::new(TestProvider::default()).apply(&plan).await;
        let state = result.outcomes[0].as_ref().unwrap().state().unwrap();
        assert_eq!(state.attributes["vpc_id"], Value::string("vpc-settled"));
    }

    #[tokio::test]
    async fn replace_deletes_before_create_and_deletes_run_last() {
        let id = ResourceId::new("ec2_instance", "app");
        let mut plan = Plan::new();
        plan.add(Effect::Delete {
            id: ResourceId::new("ec2_eip", "old"),
            identifier: "eipalloc-1".to_string(),
        });
        plan.add(Effect::Replace {
            id: id.clone(),
            from: State::existing(id, HashMap::new()).with_identifier("i-1"),
            to: Resource::new("ec2_instance", "app").with_binding("app"),
        });

        let provider = Arc::new(TestProvider::default());
        let result = Interpreter::from_shared(Arc::clone(&provider))
            .apply(&plan)
            .await;

        assert!(result.is_success());
        assert_eq!(
            provider.calls(),
            vec!["delete app", "create app", "delete old"]
        );
        assert!(matches!(result.outcomes[0], Ok(EffectOutcome::Deleted)));
        assert!(matches!(
            result.outcomes[1],
            Ok(EffectOutcome::Replaced { .. })
        ));
    }

    #[tokio::test]
    async fn failure_skips_pending_deletes() {
        let mut plan = Plan::new();
        plan.add(Effect::Create(Resource::new("ec2_eip", "nat").with_binding("nat")));
        plan.add(Effect::Delete {
            id: ResourceId::new("ec2_vpc", "old"),
            identifier: "vpc-old".to_string(),
        });

        let result = Interpreter::new(TestProvider::failing("nat"))
            .apply(&plan)
            .await;
        assert_eq!(result.failure_count, 1);
        assert_eq!(result.skipped_count, 1);
    }

    fn replace(name: &str, resource: Resource) -> Effect {
        let id = ResourceId::new(&resource.id.resource_type, name);
        Effect::Replace {
            id: id.clone(),
            from: State::existing(id, HashMap::new()).with_identifier(format!("old-{}", name)),
            to: resource,
        }
    }

    fn subnet_and_instance_replacement() -> Plan {
        let mut plan = Plan::new();
        plan.add(replace(
            "subnet",
            Resource::new("ec2_subnet", "subnet")
                .with_binding("subnet")
                .with_attribute("cidr_block", Value::string("16.0.3.0/24")),
        ));
        plan.add(replace(
            "db",
            Resource::new("ec2_instance", "db")
                .with_binding("db")
                .with_attribute("subnet_id", Value::reference("subnet", "id")),
        ));
        plan
    }

    #[tokio::test]
    async fn replacements_remove_dependents_first_and_create_dependencies_first() {
        let provider = Arc::new(TestProvider::default());
        let result = Interpreter::from_shared(Arc::clone(&provider))
            .apply(&subnet_and_instance_replacement())
            .await;

        assert!(result.is_success(), "{:?}", result.outcomes);
        assert_eq!(
            provider.calls(),
            vec!["delete db", "delete subnet", "create subnet", "create db"]
        );
        let db = result.outcomes[1].as_ref().unwrap().state().unwrap();
        assert_eq!(db.attributes["subnet_id"], Value::string("id-subnet"));
    }

    #[tokio::test]
    async fn failed_teardown_abandons_the_replacement() {
        let provider = Arc::new(TestProvider::failing("subnet"));
        let result = Interpreter::from_shared(Arc::clone(&provider))
            .apply(&subnet_and_instance_replacement())
            .await;

        assert_eq!(result.failure_count, 2);
        let err = result.outcomes[0].as_ref().unwrap_err();
        assert_eq!(err.to_string(), "[ec2_subnet.subnet] DependencyViolation");
        assert_eq!(provider.calls(), vec!["delete db", "delete subnet"]);
    }

    #[tokio::test]
    async fn vanished_resources_count_as_deleted() {
        let provider = Arc::new(TestProvider {
            gone: vec!["subnet".to_string(), "old".to_string()],
            ..Default::default()
        });
        let mut plan = subnet_and_instance_replacement();
        plan.add(Effect::Delete {
            id: ResourceId::new("ec2_vpc", "old"),
            identifier: "vpc-old".to_string(),
        });
        let result = Interpreter::from_shared(Arc::clone(&provider))
            .apply(&plan)
            .await;

        assert!(result.is_success(), "{:?}", result.outcomes);
        assert!(matches!(result.outcomes[2], Ok(EffectOutcome::Deleted)));
        assert_eq!(
            provider.calls(),
            vec!["delete db", "delete subnet", "create subnet", "create db", "delete old"]
        );
    }

    #[tokio::test]
    async fn skipped_effects_skip_their_dependents() {
        let mut plan = Plan::new();
        plan.add(Effect::Create(Resource::new("ec2_eip", "eip").with_binding("eip")));
        plan.add(Effect::Create(Resource::new("ec2_vpc", "vpc").with_binding("vpc")));
        plan.add(Effect::Create(
            Resource::new("ec2_subnet", "subnet")
                .with_binding("subnet")
                .with_attribute("vpc_id", Value::reference("vpc", "id")),
        ));
        plan.add(Effect::Create(
            Resource::new("ec2_instance", "db")
                .with_binding("db")
                .with_attribute("subnet_id", Value::reference("subnet", "id")),
        ));

        let provider = TestProvider {
            fail: vec!["eip".to_string()],
            slow: vec!["vpc".to_string()],
            ..Default::default()
        };
        let result = Interpreter::new(provider).apply(&plan).await;

        assert_eq!(result.failure_count, 1);
        assert_eq!(result.success_count, 1);
        assert_eq!(result.skipped_count, 2);
        match &result.outcomes[3] {
            Ok(EffectOutcome::Skipped { reason }) => {
                assert_eq!(reason, "dependency 'subnet' was skipped")
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }
}
