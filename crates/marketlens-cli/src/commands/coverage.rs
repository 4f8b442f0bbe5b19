use marketlens_core::{dashboard, SymbolCoverage, Warehouse};
use serde::Serialize;

use crate::error::CliError;

use super::CommandResult;

#[derive(Debug, Serialize)]
struct CoverageResponseData {
    total_rows: u64,
    symbols: Vec<SymbolCoverage>,
}

pub fn run(warehouse: &Warehouse) -> Result<CommandResult, CliError> {
    let data = CoverageResponseData {
        total_rows: warehouse.count_rows(None)?,
        symbols: warehouse.coverage()?,
    };
    Ok(CommandResult::ok(serde_json::to_value(data)?))
}

pub fn symbols(warehouse: &Warehouse) -> Result<CommandResult, CliError> {
    let symbols = dashboard::stored_symbols(warehouse)?;
    Ok(CommandResult::ok(serde_json::json!({ "symbols": symbols })))
}
