//! Relay entry point.
//!
//! Spawns the configured backend processes, opens the observer channel,
//! and serves the agent over stdio. When the agent disconnects, the run
//! is scored and the report is published and printed to stderr.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use greenroom_bus::{serve_observers, ObserverServerConfig};
use greenroom_config::RelayConfig;
use greenroom_relay::{run_observer_commands, Relay, RelayServer};
use greenroom_trust::ScenarioConfig;

#[derive(Parser)]
#[command(name = "greenroom-relay", about = "Rehearsal relay for agent tool calls")]
struct Cli {
    /// Path to the relay configuration file.
    #[arg(short, long)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // stdout carries JSON-RPC; logs must go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = RelayConfig::from_file(&cli.config)?;

    let scenario = match &config.scenario_path {
        Some(path) => {
            let content = std::fs::read_to_string(path)?;
            let scenario: ScenarioConfig = serde_yaml::from_str(&content)?;
            info!(service = %scenario.service, assertions = scenario.assertions.len(), "scenario loaded");
            Some(scenario)
        }
        None => None,
    };

    let observer_config = ObserverServerConfig {
        host: config.observer.host.clone(),
        port: config.observer.port,
        shared_secret: config.observer.shared_secret.clone(),
    };

    let relay = Arc::new(Relay::start(config).await?);

    let (commands_tx, commands_rx) = mpsc::channel(64);
    let bus = Arc::clone(relay.bus());
    tokio::spawn(async move {
        if let Err(err) = serve_observers(bus, commands_tx, observer_config).await {
            error!(error = %err, "observer listener failed");
        }
    });
    tokio::spawn(run_observer_commands(Arc::clone(&relay), commands_rx));

    RelayServer::new(Arc::clone(&relay)).run().await?;

    // Agent hung up: score the run.
    let report = relay.evaluate(scenario.as_ref())?;
    info!(
        score = report["score"].as_u64().unwrap_or(0),
        passed = report["passed"].as_bool().unwrap_or(false),
        "run complete"
    );
    eprintln!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
