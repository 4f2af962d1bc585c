//! Deployment pipeline shared by the commands
//!
//! load config -> read scripts -> declare -> validate -> order -> lock ->
//! refresh state -> plan -> apply -> record state and outputs -> SSH config

use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};

use colored::Colorize;

use terrace_core::config::{ProviderKind, TopologyConfig};
use terrace_core::differ::{Orphan, add_deletions, create_plan};
use terrace_core::graph::sort_resources;
use terrace_core::interpreter::{ApplyResult, EffectOutcome};
use terrace_core::plan::Plan;
use terrace_core::provider::{Provider, check_coverage};
use terrace_core::providers::ec2;
use terrace_core::resolve::merge_attributes;
use terrace_core::resource::{Resource, ResourceId, State};
use terrace_core::schema::ResourceSchema;
use terrace_core::scripts::ScriptBundle;
use terrace_core::simulator::SimulatedProvider;
use terrace_core::topology::{self, Topology};
use terrace_provider_awscc::AwsccProvider;
use terrace_state::{LocalBackend, Operation, ResourceState, StateBackend, StateFile};

/// Flags shared by every command
#[derive(Debug, Clone)]
pub struct GlobalOptions {
    pub config: PathBuf,
    pub provider: Option<ProviderKind>,
    pub state: Option<PathBuf>,
}

/// Configuration with command-line overrides applied
pub fn load_config(opts: &GlobalOptions) -> Result<TopologyConfig, String> {
    let mut config = TopologyConfig::load_or_default(&opts.config).map_err(|e| e.to_string())?;
    if let Some(provider) = opts.provider {
        config.provider = provider;
    }
    if let Some(state) = &opts.state {
        config.state_path = state.clone();
    }
    Ok(config)
}

pub fn open_backend(config: &TopologyConfig) -> Box<dyn StateBackend> {
    Box::new(LocalBackend::new(config.state_path.clone()))
}

/// Everything known before talking to the cloud
pub struct Deployment {
    pub config: TopologyConfig,
    pub topology: Topology,
    pub schemas: HashMap<String, ResourceSchema>,
    /// Declared resources in creation order
    pub ordered: Vec<Resource>,
}

impl Deployment {
    /// Read the scripts, declare the topology, validate it and order it
    pub fn prepare(opts: &GlobalOptions) -> Result<Self, String> {
        let config = load_config(opts)?;
        let base_dir = opts
            .config
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        let scripts =
            ScriptBundle::load_relative(&config.scripts, base_dir).map_err(|e| e.to_string())?;

        let topology = topology::declare(&config, &scripts);
        let schemas = ec2::schema_registry();
        topology.validate(&schemas).map_err(|errors| {
            errors
                .iter()
                .map(|(id, msg)| format!("{}: {}", id, msg))
                .collect::<Vec<_>>()
                .join("\n")
        })?;
        let ordered = sort_resources(&topology.resources).map_err(|e| e.to_string())?;

        Ok(Self {
            config,
            topology,
            schemas,
            ordered,
        })
    }

    pub async fn provider(&self) -> Result<Box<dyn Provider>, String> {
        provider_for(&self.config).await
    }

    /// Plan against refreshed state, deleting recorded resources no longer declared
    pub async fn plan(
        &self,
        provider: &dyn Provider,
        state: &StateFile,
    ) -> Result<(Plan, HashMap<ResourceId, State>), String> {
        check_coverage(provider, &self.ordered).map_err(|e| e.to_string())?;
        let current = refresh(provider, state).await?;
        let mut plan =
            create_plan(&self.ordered, &current, &self.schemas).map_err(|e| e.to_string())?;

        let declared: HashSet<ResourceId> = self.ordered.iter().map(|r| r.id.clone()).collect();
        let orphans: Vec<Orphan> = state
            .orphans(&declared)
            .into_iter()
            .filter(|o| current.contains_key(&o.id))
            .collect();
        add_deletions(&mut plan, &orphans);

        Ok((plan, current))
    }

    /// Record the outcome of an apply into `state`
    pub fn record(
        &self,
        state: &mut StateFile,
        plan: &Plan,
        result: &ApplyResult,
        current: &HashMap<ResourceId, State>,
        provider_name: &str,
    ) {
        let planned: HashSet<&ResourceId> =
            plan.effects().iter().map(|e| e.resource_id()).collect();

        // Unchanged resources keep their refreshed attributes
        for resource in &self.ordered {
            if planned.contains(&resource.id) {
                continue;
            }
            if let Some(existing) = current.get(&resource.id) {
                state.upsert_resource(ResourceState::from_state(
                    existing,
                    resource.binding(),
                    resource.dependencies(),
                    provider_name,
                ));
            }
        }

        record_outcomes(state, plan, result, provider_name);

        let outputs = self.topology.resolve_outputs(&result.resolved_bindings());
        state.set_outputs(&outputs);
    }
}

pub async fn provider_for(config: &TopologyConfig) -> Result<Box<dyn Provider>, String> {
    match config.provider {
        ProviderKind::Awscc => Ok(Box::new(AwsccProvider::new(&config.region).await)),
        ProviderKind::Simulated => {
            let provider =
                SimulatedProvider::open(&config.simulator_path).map_err(|e| e.to_string())?;
            Ok(Box::new(provider))
        }
    }
}

/// Read every recorded resource from the provider.
///
/// Recorded attributes fill in what the provider does not report back
/// (e.g., write-only properties); resources that no longer exist are dropped.
pub async fn refresh(
    provider: &dyn Provider,
    state: &StateFile,
) -> Result<HashMap<ResourceId, State>, String> {
    let mut current = HashMap::new();
    for recorded in &state.resources {
        let Some(identifier) = recorded.identifier.as_deref() else {
            continue;
        };
        let id = recorded.resource_id();
        let observed = provider
            .read(&id, Some(identifier))
            .await
            .map_err(|e| format!("Failed to read state: {}", e))?;
        if !observed.exists {
            log::warn!("{} ({}) no longer exists", id, identifier);
            continue;
        }
        let stored = recorded.to_state();
        let attributes = merge_attributes(&observed.attributes, &stored.attributes);
        current.insert(
            id.clone(),
            State::existing(id, attributes).with_identifier(identifier),
        );
    }
    Ok(current)
}

/// Apply effect outcomes to the recorded resources
pub fn record_outcomes(
    state: &mut StateFile,
    plan: &Plan,
    result: &ApplyResult,
    provider_name: &str,
) {
    for (effect, outcome) in plan.effects().iter().zip(&result.outcomes) {
        let id = effect.resource_id();
        match outcome {
            Ok(EffectOutcome::Deleted) => {
                state.remove_resource(&id.resource_type, &id.name);
            }
            Ok(outcome) => {
                if let (Some(observed), Some(desired)) = (outcome.state(), effect.desired()) {
                    state.upsert_resource(ResourceState::from_state(
                        observed,
                        desired.binding(),
                        desired.dependencies(),
                        provider_name,
                    ));
                }
            }
            Err(e) => log::debug!("Not recording {}: {}", id, e),
        }
    }
}

/// Ask for "yes" on stdin
pub fn confirm(question: &str) -> Result<bool, String> {
    println!("{}", question.yellow().bold());
    println!("  {}", "Only 'yes' will be accepted to approve.".yellow());
    print!("\n  Enter a value: ");
    std::io::stdout().flush().map_err(|e| e.to_string())?;

    let mut input = String::new();
    std::io::stdin()
        .read_line(&mut input)
        .map_err(|e| e.to_string())?;
    println!();
    Ok(input.trim() == "yes")
}

/// Run `body` while holding the state lock for `operation`
pub async fn with_lock<T, F>(
    backend: &dyn StateBackend,
    operation: Operation,
    body: F,
) -> Result<T, String>
where
    F: std::future::Future<Output = Result<T, String>>,
{
    backend.init().await.map_err(|e| e.to_string())?;
    let lock = backend
        .acquire_lock(operation)
        .await
        .map_err(|e| {
            format!(
                "{}\nIf no other terrace process is running, use `terrace force-unlock <lock-id>`.",
                e
            )
        })?;

    let result = body.await;

    if let Err(e) = backend.release_lock(&lock).await {
        eprintln!(
            "{} Failed to release lock {}: {}",
            "Warning:".yellow().bold(),
            lock.id,
            e
        );
    }
    result
}
