//! statestore entry point
//!
//! Parses arguments, starts the lifecycle coordinator, and serves HTTP once
//! the store is running. Exit codes: 0 clean shutdown, 2 startup timeout or
//! unrecoverable storage failure, 1 anything else.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use statestore::config::Cli;
use statestore::http::{GatewayState, HttpServer};
use statestore::{Coordinator, StoreConfig};

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Cli::parse().into_config();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "failed to start runtime");
            return ExitCode::from(1);
        }
    };

    match runtime.block_on(run(config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => ExitCode::from(code),
    }
}

async fn run(config: StoreConfig) -> Result<(), u8> {
    let coordinator = Coordinator::new();
    let engine = match coordinator.start(config.clone()).await {
        Ok(engine) => engine,
        Err(e) => {
            error!(error = %e, "startup failed");
            return Err(e.exit_code() as u8);
        }
    };

    let gateway = Arc::new(GatewayState::new(Arc::clone(&engine), coordinator.state()));
    let server = HttpServer::new(&config, gateway);

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for shutdown signal");
        }
        info!("shutdown signal received");
    };

    if let Err(e) = server.serve(shutdown).await {
        error!(error = %e, "http server failed");
        coordinator.shutdown(&engine).await;
        return Err(1);
    }

    coordinator.shutdown(&engine).await;
    Ok(())
}
