//! # orchestrator-ctl
//!
//! Thin CLI entry point for the orchestration core workspace: validates and
//! prints the layered configuration the `orchestrator-api` server binary
//! would load. Carries no library code of its own — everything it calls
//! into lives in `orchestrator-shared` and `orchestrator-core`.

use clap::{Parser, Subcommand};
use orchestrator_core::OrchestrationCore;
use orchestrator_shared::config::OrchestratorConfig;

#[derive(Parser)]
#[command(name = "orchestrator-ctl", version, about = "Operator CLI for the orchestration core")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load configuration from the environment and report whether it is valid.
    ValidateConfig,
    /// Load configuration from the environment and print it as TOML.
    PrintConfig,
    /// Bootstrap the orchestration core with an in-memory store and report
    /// readiness, then exit. Useful for smoke-testing a deployment's
    /// configuration (bus brokers, discovery mode) without running the API.
    Bootstrap,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    orchestrator_shared::logging::init_tracing("orchestrator-ctl");
    let cli = Cli::parse();

    match cli.command {
        Command::ValidateConfig => {
            let config = OrchestratorConfig::load()?;
            println!("configuration is valid for service '{}'", config.service_name);
        }
        Command::PrintConfig => {
            let config = OrchestratorConfig::load()?;
            println!("{}", toml::to_string_pretty(&config)?);
        }
        Command::Bootstrap => {
            let config = OrchestratorConfig::load()?;
            let service_name = config.service_name.clone();
            let core = OrchestrationCore::bootstrap(config).await?;
            println!("orchestration core for '{service_name}' bootstrapped, bus connected: {}", core.bus.is_connected());
        }
    }

    Ok(())
}
