mod correlate;
mod coverage;
mod dashboard;
mod ingest;

use std::path::PathBuf;

use marketlens_core::config::DB_PATH_VAR;
use marketlens_core::{Symbol, Warehouse, WarehouseConfig};
use serde_json::Value;

use crate::cli::{Cli, Command};
use crate::error::CliError;

pub struct CommandResult {
    pub data: Value,
    /// Some of the work failed; the process exits with code 3.
    pub partial_failure: bool,
}

impl CommandResult {
    pub fn ok(data: Value) -> Self {
        Self {
            data,
            partial_failure: false,
        }
    }

    pub fn with_partial_failure(mut self, partial_failure: bool) -> Self {
        self.partial_failure = partial_failure;
        self
    }
}

pub async fn run(cli: &Cli) -> Result<CommandResult, CliError> {
    match &cli.command {
        Command::Ingest(args) => ingest::run(args, cli.db.as_deref()).await,
        Command::Dashboard(args) => dashboard::run(args, &open_warehouse(cli)?),
        Command::Correlate(args) => correlate::run(args, &open_warehouse(cli)?),
        Command::Coverage => coverage::run(&open_warehouse(cli)?),
        Command::Symbols => coverage::symbols(&open_warehouse(cli)?),
    }
}

/// Read-side commands need no API key, only the store location.
fn open_warehouse(cli: &Cli) -> Result<Warehouse, CliError> {
    let db_path = cli
        .db
        .clone()
        .or_else(|| std::env::var_os(DB_PATH_VAR).map(PathBuf::from));
    let warehouse = match db_path {
        Some(db_path) => Warehouse::open(WarehouseConfig::with_db_path(db_path))?,
        None => Warehouse::open_default()?,
    };
    Ok(warehouse)
}

fn parse_symbol(raw: &str) -> Result<Symbol, CliError> {
    Ok(Symbol::parse(raw)?)
}
