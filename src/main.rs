use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use incident_playbook_engine::{
    config::Config,
    metrics,
    models::{IncidentPlaybook, PlaybookCategory, PlaybookSeverity},
    playbooks::{create_default_registry, loader, PlaybookService},
};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "playbook-engine")]
#[command(about = "Incident response playbook engine", long_about = None)]
struct Cli {
    /// Configuration file layered over the built-in defaults
    #[arg(short, long, global = true, env = "CONFIG_PATH")]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List playbooks
    List {
        #[arg(long)]
        category: Option<PlaybookCategory>,

        #[arg(short, long)]
        severity: Option<PlaybookSeverity>,
    },

    /// Show one playbook
    Show {
        /// Playbook id or name
        #[arg(value_name = "PLAYBOOK")]
        playbook: String,
    },

    /// Execute a playbook against an incident and print the outcome
    Run {
        /// Playbook id or name
        #[arg(value_name = "PLAYBOOK")]
        playbook: String,

        #[arg(value_name = "INCIDENT_ID")]
        incident_id: String,

        /// Give up waiting after this many seconds
        #[arg(short, long, default_value = "300")]
        wait_secs: u64,
    },

    /// Print engine statistics
    Stats {
        /// Also print Prometheus metrics
        #[arg(short, long)]
        metrics: bool,
    },

    /// Validate a playbook definition file
    Validate {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// List registered actions
    Actions,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let loaded = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };
    let config = loaded.unwrap_or_else(|e| {
        eprintln!("Failed to load configuration: {}", e);
        eprintln!("Using default configuration");
        Config::default()
    });

    init_tracing(&config);

    tracing::info!(
        service = %config.observability.service_name,
        "Starting playbook engine v{}",
        env!("CARGO_PKG_VERSION")
    );

    if config.observability.prometheus_enabled {
        if let Err(e) = metrics::init_metrics() {
            tracing::warn!("Failed to initialize metrics: {}", e);
        }
    }

    let registry = create_default_registry();
    let service = if config.engine.seed_default_playbooks {
        PlaybookService::with_defaults(&config.engine, registry)
    } else {
        PlaybookService::new(&config.engine, registry)
    };

    if let Some(dir) = &config.engine.playbooks_dir {
        let definitions = loader::load_definitions_dir(dir)
            .with_context(|| format!("loading playbooks from {}", dir.display()))?;
        service.register_definitions(definitions)?;
    }

    match cli.command {
        Commands::List { category, severity } => {
            let playbooks: Vec<IncidentPlaybook> = service
                .list_playbooks()
                .into_iter()
                .filter(|p| category.map_or(true, |c| p.category == c))
                .filter(|p| severity.map_or(true, |s| p.severity == s))
                .collect();

            for playbook in playbooks {
                println!(
                    "{}  {:<12} {:<9} {:<8} {}",
                    playbook.id,
                    playbook.category,
                    playbook.severity,
                    if playbook.enabled { "enabled" } else { "disabled" },
                    playbook.name
                );
            }
        }

        Commands::Show { playbook } => {
            let playbook = resolve_playbook(&service, &playbook)?;
            println!("{}", serde_json::to_string_pretty(&playbook)?);
        }

        Commands::Run {
            playbook,
            incident_id,
            wait_secs,
        } => {
            let playbook = resolve_playbook(&service, &playbook)?;
            let execution = service.execute_playbook(&playbook.id, incident_id)?;

            let outcome = service
                .wait_for_execution(&execution.id, Duration::from_secs(wait_secs))
                .await;
            service.shutdown();

            let finished = match outcome {
                Ok(finished) => finished,
                Err(e) => {
                    tracing::error!(execution_id = %execution.id, "Gave up waiting: {}", e);
                    service.get_execution(&execution.id)?
                }
            };
            println!("{}", serde_json::to_string_pretty(&finished)?);
        }

        Commands::Stats { metrics: show_metrics } => {
            println!("{}", serde_json::to_string_pretty(&service.get_statistics())?);
            if show_metrics {
                print!("{}", metrics::gather_metrics());
            }
        }

        Commands::Validate { file } => {
            let definitions = loader::load_definitions(&file)?;
            let known = service.action_names();

            for definition in &definitions {
                println!("{}: {} step(s)", definition.name, definition.steps.len());
                for step in &definition.steps {
                    if !known.contains(&step.action) {
                        println!("  warning: step '{}' uses unregistered action '{}'", step.id, step.action);
                    }
                }
            }
            println!("{} playbook(s) valid", definitions.len());
        }

        Commands::Actions => {
            for name in service.action_names() {
                println!("{}", name);
            }
        }
    }

    Ok(())
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.observability.log_level));
    let json = config.observability.json_logs;

    // stdout carries command output, logs go to stderr
    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr)))
        .with((!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)))
        .init();
}

/// Look a playbook up by id, falling back to a case-insensitive name match
fn resolve_playbook(service: &PlaybookService, key: &str) -> anyhow::Result<IncidentPlaybook> {
    if let Ok(id) = key.parse::<Uuid>() {
        return Ok(service.get_playbook(&id)?);
    }

    service
        .list_playbooks()
        .into_iter()
        .find(|p| p.name.eq_ignore_ascii_case(key))
        .ok_or_else(|| anyhow!("No playbook with id or name '{}'", key))
}
