//! # Orchestration API Server
//!
//! Thin wrapper binary running the Orchestration API as a standalone
//! server: loads configuration, bootstraps the orchestration core, binds
//! the HTTP router, and shuts down gracefully on Ctrl+C or SIGTERM.

use orchestrator_api::{build_router, AppState};
use orchestrator_core::OrchestrationCore;
use orchestrator_shared::{logging, OrchestratorConfig};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = OrchestratorConfig::load()?;
    logging::init_tracing(&config.service_name);

    info!(version = env!("CARGO_PKG_VERSION"), "starting orchestration api");

    let shutdown_timeout_ms = config.shutdown_timeout_ms;
    let core = OrchestrationCore::bootstrap(config).await?;
    let state = AppState::new(core);
    let router = build_router(state);

    let addr: SocketAddr = std::env::var("API_BIND_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        .parse()?;

    info!("press Ctrl+C to shut down gracefully");

    // `serve` drains in-flight requests once the shutdown signal fires
    // before returning; bound only that drain phase so a stuck connection
    // can't hang the process indefinitely (spec §9 graceful shutdown). The
    // signal is awaited twice: once inside `serve` to trigger the drain,
    // once here to start the hard-deadline clock on top of it.
    let serve_task = tokio::spawn(orchestrator_api::serve(addr, router, shutdown_signal()));

    shutdown_signal().await;
    info!(shutdown_timeout_ms, "shutdown signal received, draining in-flight requests");

    match tokio::time::timeout(Duration::from_millis(shutdown_timeout_ms), serve_task).await {
        Ok(Ok(Ok(()))) => info!("orchestration api server stopped"),
        Ok(Ok(Err(e))) => error!(error = %e, "server exited with an error"),
        Ok(Err(e)) => error!(error = %e, "server task panicked"),
        Err(_) => error!(shutdown_timeout_ms, "graceful shutdown timed out, forcing exit"),
    }

    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install ctrl+c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received ctrl+c"),
        _ = terminate => info!("received sigterm"),
    }
}
