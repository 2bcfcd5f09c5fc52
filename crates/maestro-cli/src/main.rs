mod demo;

use clap::{Parser, Subcommand};
use demo::{parse_context, RoleExecutor, WorkflowFile, ROSTER};
use maestro_orchestrator::{Orchestrator, OrchestratorConfig, PolicyRegistry, WorkerRegistration};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "maestro", about = "Maestro: multi-agent task orchestration")]
struct Cli {
    /// Path to config file (defaults apply when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the config and print the effective values
    Check,
    /// List the registered assignment policies
    Policies,
    /// Orchestrate one request across the demo workers
    Run {
        /// Free-text request
        request: String,
        /// Run context entry, `key=value` (repeatable)
        #[arg(short = 'C', long = "context")]
        context: Vec<String>,
        /// Simulated work time per task, in milliseconds
        #[arg(long, default_value_t = 0)]
        work_ms: u64,
    },
    /// Execute a workflow definition file across the demo workers
    Workflow {
        /// Path to the workflow TOML file
        file: PathBuf,
        /// Simulated work time per task, in milliseconds
        #[arg(long, default_value_t = 0)]
        work_ms: u64,
    },
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<OrchestratorConfig> {
    match path {
        Some(path) => Ok(OrchestratorConfig::load(path)?),
        None => Ok(OrchestratorConfig::default()),
    }
}

/// Start one worker per roster entry.
async fn spawn_roster(orchestrator: &Orchestrator, work: Duration) -> Vec<JoinHandle<()>> {
    let mut handles = Vec::with_capacity(ROSTER.len());
    for (worker_type, capabilities) in ROSTER {
        let registration = WorkerRegistration::new(*worker_type, *worker_type).with_id(*worker_type);
        let (_, handle) = orchestrator
            .spawn_worker(
                registration,
                capabilities.iter().copied(),
                Arc::new(RoleExecutor::new(*worker_type, work)),
            )
            .await;
        handles.push(handle);
    }
    info!(count = handles.len(), "Demo workers started");
    handles
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Check => {
            // Building the orchestrator resolves the strategy name too.
            Orchestrator::new(config.clone())?;
            println!("Config OK ({})", config.assignment_strategy);
            print!("{}", toml::to_string_pretty(&config)?);
        }
        Commands::Policies => {
            let registry = PolicyRegistry::with_builtins();
            for name in registry.names() {
                let marker = if name == config.assignment_strategy { " (active)" } else { "" };
                println!("{name}{marker}");
            }
        }
        Commands::Run {
            request,
            context,
            work_ms,
        } => {
            let context = parse_context(&context)?;
            let orchestrator = Orchestrator::new(config)?;
            let background = orchestrator.start_background();
            let workers = spawn_roster(&orchestrator, Duration::from_millis(work_ms)).await;

            let report = orchestrator.process_request(&request, context).await;
            for handle in workers {
                handle.abort();
            }
            background.shutdown();

            let report = report?;
            if !report.failed.is_empty() {
                warn!(failed = report.failed.len(), "Some tasks failed");
            }
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Workflow { file, work_ms } => {
            let definition = WorkflowFile::load(&file)?;
            let orchestrator = Orchestrator::new(config)?;
            let background = orchestrator.start_background();
            let workers = spawn_roster(&orchestrator, Duration::from_millis(work_ms)).await;

            let result = async {
                let id = orchestrator
                    .create_workflow(&definition.name, &definition.description, definition.steps)
                    .await?;
                orchestrator
                    .execute_workflow(id, Some(definition.context))
                    .await
            }
            .await;
            for handle in workers {
                handle.abort();
            }
            background.shutdown();

            let result = result?;
            if let Some(step) = &result.failed_step {
                warn!(step = %step, "Workflow stopped at a failed step");
            }
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
    }

    Ok(())
}
