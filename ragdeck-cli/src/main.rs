#![forbid(unsafe_code)]

use std::process::ExitCode;

use clap::Parser;
use ragdeck_cli::cli::Cli;
use ragdeck_cli::{commands, telemetry};

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    if let Err(error) = telemetry::init_tracing(cli.verbose, cli.log_json) {
        eprintln!("warning: {error:#}");
    }

    match commands::run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::debug!(error = ?error, "command failed");
            eprintln!("error: {error:#}");
            ExitCode::FAILURE
        }
    }
}
