use marketlens_core::dashboard;
use marketlens_core::Warehouse;

use crate::cli::CorrelateArgs;
use crate::error::CliError;

use super::{parse_symbol, CommandResult};

pub fn run(args: &CorrelateArgs, warehouse: &Warehouse) -> Result<CommandResult, CliError> {
    let left = parse_symbol(&args.left)?;
    let right = parse_symbol(&args.right)?;

    let view = dashboard::correlation_view(warehouse, left.as_str(), right.as_str())?;
    Ok(CommandResult::ok(serde_json::to_value(view)?))
}
