//! agent-swarm command line
//!
//! Thin wrapper over the library: route a task against the configured agent
//! pool, run a workflow definition, probe runtimes, or print the effective
//! configuration.

use agent_swarm::config::SwarmConfig;
use agent_swarm::health::{HealthCheckManager, RuntimeHealthCheck};
use agent_swarm::observability::{init_default_logging, metrics::metrics};
use agent_swarm::routing::Task;
use agent_swarm::workflow::{
    Context, NodeProcessor, RoutedProcessor, SimulatedProcessor, WorkflowDefinition,
    WorkflowOrchestrator,
};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use uuid::Uuid;

const DEFAULT_CONFIG_PATHS: [&str; 2] = ["swarm.toml", "config/swarm.toml"];

/// Task routing, workflows and handoffs for agent pools
#[derive(Parser)]
#[command(name = "agent-swarm")]
#[command(about = "Coordinate work across a pool of heterogeneous agents")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", env = "SWARM_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pick an agent for a task
    Route {
        /// Task description matched against agent expertise
        #[arg(short, long)]
        description: String,
        /// Task id (reuses a remembered decision when seen before)
        #[arg(long)]
        task_id: Option<String>,
    },
    /// Execute a workflow definition
    Workflow {
        /// Workflow TOML file
        #[arg(short, long, value_name = "FILE")]
        file: PathBuf,
        /// Initial context as a JSON object
        #[arg(long, default_value = "{}")]
        context: String,
    },
    /// Probe every configured runtime
    Health,
    /// Validate configuration
    Config {
        /// Show the effective configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_default_logging();

    let config = match load_configuration(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Route {
            description,
            task_id,
        } => route_task(&config, description, task_id),
        Commands::Workflow { file, context } => run_workflow(&config, &file, &context).await,
        Commands::Health => check_health(&config).await,
        Commands::Config { show } => handle_config_command(&config, show),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }
}

fn load_configuration(path: Option<&Path>) -> Result<SwarmConfig, Box<dyn std::error::Error>> {
    if let Some(path) = path {
        info!("Loading configuration from: {}", path.display());
        return Ok(SwarmConfig::load_from_file(path)?);
    }

    for candidate in DEFAULT_CONFIG_PATHS {
        let path = Path::new(candidate);
        if path.exists() {
            info!("Loading configuration from: {}", path.display());
            return Ok(SwarmConfig::load_from_file(path)?);
        }
    }

    info!("No configuration file found, using defaults");
    Ok(SwarmConfig::default())
}

fn route_task(
    config: &SwarmConfig,
    description: String,
    task_id: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let router = config.build_router();
    let task_id = task_id.unwrap_or_else(|| Uuid::new_v4().to_string());
    let decision = router.route(&Task::new(task_id, description))?;
    println!("{}", serde_json::to_string_pretty(&decision)?);
    Ok(())
}

async fn run_workflow(
    config: &SwarmConfig,
    file: &Path,
    context: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let definition = WorkflowDefinition::load_from_file(file)?;
    let initial: Context = serde_json::from_str(context)?;

    let simulated =
        SimulatedProcessor::new(Duration::from_millis(config.workflow.max_step_latency_ms));
    let processor: Arc<dyn NodeProcessor> = if config.agents.is_empty() {
        Arc::new(simulated)
    } else {
        Arc::new(RoutedProcessor::new(
            Arc::new(config.build_router()),
            simulated,
        ))
    };

    let orchestrator = WorkflowOrchestrator::from_definition(&definition, processor)?
        .with_max_iterations(config.workflow.max_iterations);
    let execution = orchestrator.execute(initial).await;

    println!("{}", serde_json::to_string_pretty(&execution.to_report())?);
    if let Some(e) = execution.error() {
        return Err(e.clone().into());
    }
    Ok(())
}

async fn check_health(config: &SwarmConfig) -> Result<(), Box<dyn std::error::Error>> {
    let mut manager = HealthCheckManager::new();
    for (entry, runtime) in config.build_runtimes()? {
        manager.add_health_check(Box::new(RuntimeHealthCheck::new(entry.label, runtime)));
    }

    for result in manager.run_health_checks().await {
        println!("{}", serde_json::to_string(&result)?);
    }
    let healthy = manager.calculate_overall_health().await;
    println!("{}", serde_json::to_string_pretty(&metrics().snapshot())?);

    if healthy {
        Ok(())
    } else {
        Err("one or more runtimes are unavailable".into())
    }
}

fn handle_config_command(
    config: &SwarmConfig,
    show: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if show {
        println!("{}", config.to_toml()?);
    }

    info!("Configuration validation complete");
    Ok(())
}
