mod cli;
mod commands;
mod error;
mod logging;
mod output;

use clap::Parser;
use std::process::ExitCode;

use crate::cli::Cli;
use crate::error::CliError;
use crate::logging::DotenvLoad;

#[tokio::main]
async fn main() -> ExitCode {
    // Loaded before logging so RUST_LOG may come from .env.
    let dotenv = DotenvLoad::from_result(dotenvy::dotenv());
    logging::init_logging();
    dotenv.log();

    match run().await {
        Ok(code) => code,
        Err(error) => {
            tracing::error!(%error, "command failed");
            eprintln!("error: {error}");
            ExitCode::from(error.exit_code())
        }
    }
}

async fn run() -> Result<ExitCode, CliError> {
    let cli = Cli::parse();

    let result = commands::run(&cli).await?;
    output::render(&result.data, cli.pretty)?;

    if result.partial_failure {
        return Ok(ExitCode::from(3));
    }

    Ok(ExitCode::SUCCESS)
}
