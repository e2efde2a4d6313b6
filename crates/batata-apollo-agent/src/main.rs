//! Main entry point for the Apollo agent.

use std::process::ExitCode;

use batata_apollo_agent::{Cli, Configuration, LoggingConfig, init_logging, run_agent};
use clap::Parser;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let _logging_guard = match init_logging(&LoggingConfig::from_env()) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("{}", e);
            None
        }
    };

    let options = match Configuration::new(cli).and_then(|c| c.agent_options()) {
        Ok(options) => options,
        Err(e) => {
            error!("{}", e);
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    tokio::select! {
        result = run_agent(options) => match result {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                error!("apollo agent stopped: {:#}", e);
                ExitCode::FAILURE
            }
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
            ExitCode::SUCCESS
        }
    }
}
