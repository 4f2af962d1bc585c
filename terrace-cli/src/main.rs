use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use colored::Colorize;

use terrace_core::config::{DEFAULT_CONFIG_FILE, ProviderKind};
use terrace_core::differ::add_deletions;
use terrace_core::interpreter::{Interpreter, InterpreterConfig};
use terrace_core::plan::Plan;
use terrace_core::ssh_config::{self, SshConfigError};
use terrace_state::{Operation, StateFile};

mod deploy;
mod display;

use deploy::{Deployment, GlobalOptions};

#[derive(Parser)]
#[command(name = "terrace")]
#[command(about = "Provision a two-tier application/database network", long_about = None)]
struct Cli {
    /// Path to the configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Provider to run against (awscc or simulated)
    #[arg(long, global = true)]
    provider: Option<ProviderKind>,

    /// Path to the state file
    #[arg(long, global = true)]
    state: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the declared topology
    Validate,
    /// Show execution plan without applying changes
    Plan,
    /// Apply changes to reach the desired state
    Apply {
        /// Skip confirmation prompt (auto-approve)
        #[arg(long)]
        auto_approve: bool,

        /// Do not write the SSH client config
        #[arg(long)]
        no_ssh_config: bool,

        /// Walk the plan in dependency order without calling the provider
        #[arg(long)]
        dry_run: bool,
    },
    /// Destroy every resource recorded in the state
    Destroy {
        /// Skip confirmation prompt (auto-approve)
        #[arg(long)]
        auto_approve: bool,
    },
    /// Show published outputs
    Output {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove a stale state lock
    ForceUnlock {
        /// ID of the lock to remove
        lock_id: String,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let opts = GlobalOptions {
        config: cli.config,
        provider: cli.provider,
        state: cli.state,
    };

    let result = match cli.command {
        Commands::Validate => run_validate(&opts),
        Commands::Plan => run_plan(&opts).await,
        Commands::Apply {
            auto_approve,
            no_ssh_config,
            dry_run,
        } => {
            if dry_run {
                run_apply_dry(&opts).await
            } else {
                run_apply(&opts, auto_approve, no_ssh_config).await
            }
        }
        Commands::Destroy { auto_approve } => run_destroy(&opts, auto_approve).await,
        Commands::Output { json } => run_output(&opts, json).await,
        Commands::ForceUnlock { lock_id } => run_force_unlock(&opts, &lock_id).await,
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn run_validate(opts: &GlobalOptions) -> Result<(), String> {
    println!("{}", "Validating...".cyan());
    let deployment = Deployment::prepare(opts)?;

    println!(
        "{}",
        format!(
            "✓ {} resources validated successfully.",
            deployment.ordered.len()
        )
        .green()
        .bold()
    );
    for resource in &deployment.ordered {
        println!("  • {}", resource.id);
    }
    Ok(())
}

async fn run_plan(opts: &GlobalOptions) -> Result<(), String> {
    let deployment = Deployment::prepare(opts)?;
    let backend = deploy::open_backend(&deployment.config);
    let state = backend
        .read_state()
        .await
        .map_err(|e| e.to_string())?
        .unwrap_or_default();

    let provider = deployment.provider().await?;
    let (plan, _) = deployment.plan(&*provider, &state).await?;
    display::print_plan(&plan);
    Ok(())
}

async fn run_apply_dry(opts: &GlobalOptions) -> Result<(), String> {
    let deployment = Deployment::prepare(opts)?;
    let backend = deploy::open_backend(&deployment.config);
    let state = backend
        .read_state()
        .await
        .map_err(|e| e.to_string())?
        .unwrap_or_default();

    let provider = Arc::new(deployment.provider().await?);
    let (plan, _) = deployment.plan(&**provider, &state).await?;
    if plan.is_empty() {
        println!("{}", "No changes. Infrastructure is up-to-date.".green());
        return Ok(());
    }
    display::print_plan(&plan);
    println!();
    println!("{}", "Dry run, no changes will be made.".yellow().bold());
    println!();

    let result = Interpreter::from_shared(provider)
        .with_config(InterpreterConfig { dry_run: true })
        .apply(&plan)
        .await;
    display::print_apply_result(&plan, &result);
    Ok(())
}

async fn run_apply(
    opts: &GlobalOptions,
    auto_approve: bool,
    no_ssh_config: bool,
) -> Result<(), String> {
    let deployment = Deployment::prepare(opts)?;
    let backend = deploy::open_backend(&deployment.config);

    deploy::with_lock(&*backend, Operation::Apply, async {
        let mut state = backend
            .read_state()
            .await
            .map_err(|e| e.to_string())?
            .unwrap_or_default();
        let provider = Arc::new(deployment.provider().await?);
        let provider_name = provider.name();

        let (plan, current) = deployment.plan(&**provider, &state).await?;
        if plan.is_empty() {
            println!("{}", "No changes. Infrastructure is up-to-date.".green());
        } else {
            display::print_plan(&plan);
            println!();
            if !auto_approve && !deploy::confirm("Do you want to perform these actions?")? {
                println!("{}", "Apply cancelled.".yellow());
                return Ok(());
            }
            println!("{}", "Applying changes...".cyan().bold());
            println!();
        }

        let result = Interpreter::from_shared(Arc::clone(&provider))
            .with_config(InterpreterConfig::default())
            .apply(&plan)
            .await;
        display::print_apply_result(&plan, &result);

        deployment.record(&mut state, &plan, &result, &current, provider_name);
        state.increment_serial();
        backend
            .write_state(&state)
            .await
            .map_err(|e| e.to_string())?;

        println!();
        if !result.is_success() {
            return Err(format!(
                "Apply failed. {} succeeded, {} failed, {} skipped.",
                result.success_count, result.failure_count, result.skipped_count
            ));
        }
        if !plan.is_empty() {
            println!(
                "{}",
                format!(
                    "Apply complete! {} changes applied.",
                    result.success_count
                )
                .green()
                .bold()
            );
        }

        if !state.outputs.is_empty() {
            println!();
            println!("{}", "Outputs:".cyan().bold());
            display::print_outputs(&state.outputs);
        }

        if !no_ssh_config {
            let outputs = deployment
                .topology
                .resolve_outputs(&result.resolved_bindings());
            match ssh_config::write_from_outputs(
                &deployment.config.ssh,
                &deployment.config.key_name,
                &outputs,
            ) {
                Ok(path) => println!(
                    "\n{} {}",
                    "SSH config written to".green(),
                    path.display()
                ),
                Err(e @ SshConfigError::MissingOutput(_)) => {
                    println!("\n{} {}", "SSH config not written:".yellow(), e)
                }
                Err(e) => return Err(e.to_string()),
            }
        }
        Ok(())
    })
    .await
}

async fn run_destroy(opts: &GlobalOptions, auto_approve: bool) -> Result<(), String> {
    let config = deploy::load_config(opts)?;
    let backend = deploy::open_backend(&config);

    deploy::with_lock(&*backend, Operation::Destroy, async {
        let Some(mut state) = backend.read_state().await.map_err(|e| e.to_string())? else {
            println!("{}", "No resources to destroy.".green());
            return Ok(());
        };
        let provider = Arc::new(deploy::provider_for(&config).await?);
        let current = deploy::refresh(&**provider, &state).await?;

        // Recorded resources that are already gone only need forgetting
        state
            .resources
            .retain(|r| current.contains_key(&r.resource_id()));
        let orphans = state.all_orphans();

        if orphans.is_empty() {
            state.outputs.clear();
            state.increment_serial();
            backend
                .write_state(&state)
                .await
                .map_err(|e| e.to_string())?;
            println!("{}", "No resources to destroy.".green());
            return Ok(());
        }

        let mut plan = Plan::new();
        add_deletions(&mut plan, &orphans);

        println!("{}", "Destroy Plan:".red().bold());
        println!();
        for effect in plan.effects() {
            let id = effect.resource_id();
            println!(
                "  {} {} {}",
                "-".red().bold(),
                id.resource_type.cyan(),
                id.name.bold()
            );
        }
        println!();
        println!("Plan: {} to destroy.", plan.effects().len().to_string().red());
        println!();

        if !auto_approve
            && !deploy::confirm(
                "Do you really want to destroy all resources? This action cannot be undone.",
            )?
        {
            println!("{}", "Destroy cancelled.".yellow());
            return Ok(());
        }

        println!("{}", "Destroying resources...".red().bold());
        println!();
        let result = Interpreter::from_shared(Arc::clone(&provider))
            .apply(&plan)
            .await;
        display::print_apply_result(&plan, &result);

        deploy::record_outcomes(&mut state, &plan, &result, provider.name());
        if state.resources.is_empty() {
            state.outputs.clear();
        }
        state.increment_serial();
        backend
            .write_state(&state)
            .await
            .map_err(|e| e.to_string())?;

        println!();
        if result.is_success() {
            println!(
                "{}",
                format!(
                    "Destroy complete! {} resources destroyed.",
                    result.success_count
                )
                .green()
                .bold()
            );
            Ok(())
        } else {
            Err(format!(
                "Destroy failed. {} succeeded, {} failed, {} skipped.",
                result.success_count, result.failure_count, result.skipped_count
            ))
        }
    })
    .await
}

async fn run_output(opts: &GlobalOptions, json: bool) -> Result<(), String> {
    let config = deploy::load_config(opts)?;
    let backend = deploy::open_backend(&config);
    let state: StateFile = backend
        .read_state()
        .await
        .map_err(|e| e.to_string())?
        .unwrap_or_default();

    if json {
        let rendered = serde_json::to_string_pretty(&state.outputs).map_err(|e| e.to_string())?;
        println!("{}", rendered);
    } else if state.outputs.is_empty() {
        println!(
            "{}",
            "No outputs. Run `terrace apply` to provision the topology.".yellow()
        );
    } else {
        display::print_outputs(&state.outputs);
    }
    Ok(())
}

async fn run_force_unlock(opts: &GlobalOptions, lock_id: &str) -> Result<(), String> {
    let config = deploy::load_config(opts)?;
    let backend = deploy::open_backend(&config);
    backend
        .force_unlock(lock_id)
        .await
        .map_err(|e| e.to_string())?;
    println!(
        "{}",
        format!("Lock {} removed from {}.", lock_id, backend.location()).green()
    );
    Ok(())
}
