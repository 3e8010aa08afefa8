//! CLI wrapper around the ThreatGuard core (§6: not part of the core
//! itself, only the interface — exit codes 0 success, 1 config error, 2
//! init failure, 3 permanent transport failure at shutdown with
//! unflushed data).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use threatguard::config::AgentConfig;
use threatguard::Agent;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "threatguard-agent")]
#[command(about = "ThreatGuard endpoint telemetry agent")]
#[command(version = "2.0.1")]
struct Cli {
    /// Path to a JSON configuration file. Absence is not an error; `TG_`
    /// environment variables are layered on top regardless (§6).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the agent: discovery timer, filter, and egress flush loop
    /// until interrupted.
    Run,
    /// Run a single discovery cycle and print the resulting event as JSON.
    Discover,
    /// Parse a rules file and report how many rules loaded.
    CheckRules {
        /// Path to the `|`-separated rules file.
        path: PathBuf,
    },
    /// Print an agent health snapshot (zeroed outside of `run`).
    Health,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging();

    let config = match AgentConfig::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            error!("configuration error: {e}");
            return ExitCode::from(1);
        }
    };

    match cli.command {
        Commands::Run => run_agent(config).await,
        Commands::Discover => discover_once(config).await,
        Commands::CheckRules { path } => check_rules(&path),
        Commands::Health => print_health(config),
    }
}

async fn run_agent(config: AgentConfig) -> ExitCode {
    let agent = match Agent::new(config) {
        Ok(a) => std::sync::Arc::new(a),
        Err(e) => {
            error!("agent initialization failed: {e}");
            return ExitCode::from(2);
        }
    };

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let run_agent = std::sync::Arc::clone(&agent);
    let runner = tokio::spawn(async move { run_agent.run(shutdown_rx).await });

    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown signal received, flushing pending batch");
    }
    let _ = shutdown_tx.send(true);
    let _ = runner.await;

    let health = agent.health();
    if health.events_failed > 0 && health.events_in_flight > 0 {
        error!("permanent transport failure at shutdown with unflushed data");
        return ExitCode::from(3);
    }
    ExitCode::SUCCESS
}

async fn discover_once(config: AgentConfig) -> ExitCode {
    let agent = match Agent::new(config) {
        Ok(a) => a,
        Err(e) => {
            error!("agent initialization failed: {e}");
            return ExitCode::from(2);
        }
    };
    agent.run_discovery_cycle().await;
    match agent.last_discovery().await {
        Some(result) => {
            println!("{}", serde_json::to_string_pretty(&result).unwrap_or_default());
        }
        None => {
            error!("discovery cycle produced no result");
            return ExitCode::from(2);
        }
    }
    ExitCode::SUCCESS
}

fn check_rules(path: &PathBuf) -> ExitCode {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            error!("cannot read rules file {}: {e}", path.display());
            return ExitCode::from(1);
        }
    };
    let rules = threatguard::filter::parse_rules_file(&content);
    println!("parsed {} rules from {}", rules.len(), path.display());
    ExitCode::SUCCESS
}

fn print_health(config: AgentConfig) -> ExitCode {
    match Agent::new(config) {
        Ok(agent) => {
            println!("{}", serde_json::to_string_pretty(&agent.health()).unwrap_or_default());
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("agent initialization failed: {e}");
            ExitCode::from(2)
        }
    }
}

fn init_logging() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}
