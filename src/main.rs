//! Telematics Auth Gateway
//!
//! OAuth2 token-exchange gateway between client apps and a vehicle
//! telematics provider. Holds the client secret server-side; clients only
//! ever see authorization codes and issued tokens.

use std::process::ExitCode;

use clap::Parser;
use tracing::error;

use telematics_auth_gateway::{cli::Cli, config::Config, gateway::Gateway, setup_tracing};

#[tokio::main]
async fn main() -> ExitCode {
    // Local .env is a development convenience; absence is fine
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    let mut config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(host) = cli.host {
        config.server.host = host;
    }

    let gateway = match Gateway::new(config) {
        Ok(gateway) => gateway,
        Err(e) => {
            error!(error = %e, "Failed to initialize gateway");
            return ExitCode::FAILURE;
        }
    };

    match gateway.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Gateway exited with error");
            ExitCode::FAILURE
        }
    }
}
