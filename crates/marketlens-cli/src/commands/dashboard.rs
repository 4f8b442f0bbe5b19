use marketlens_core::dashboard::{self, DashboardSnapshot};
use marketlens_core::Warehouse;
use serde::Serialize;
use serde_json::json;

use crate::cli::DashboardArgs;
use crate::error::CliError;

use super::{parse_symbol, CommandResult};

#[derive(Debug, Serialize)]
struct DashboardResponseData {
    /// Symbols available to the selector.
    symbols: Vec<String>,
    snapshot: DashboardSnapshot,
}

pub fn run(args: &DashboardArgs, warehouse: &Warehouse) -> Result<CommandResult, CliError> {
    let symbols = dashboard::stored_symbols(warehouse)?;

    let selected = match &args.symbol {
        Some(raw) => parse_symbol(raw)?.to_string(),
        None => match symbols.first() {
            Some(first) => first.clone(),
            None => {
                return Ok(CommandResult::ok(json!({
                    "symbols": [],
                    "message": "no prices stored yet; run `marketlens ingest` first",
                })));
            }
        },
    };

    let snapshot = dashboard::snapshot(warehouse, &selected)?;
    let data = serde_json::to_value(DashboardResponseData { symbols, snapshot })?;
    Ok(CommandResult::ok(data))
}

#[cfg(test)]
mod tests {
    use marketlens_core::PriceRecord;
    use time::macros::datetime;

    use super::*;

    #[test]
    fn empty_store_yields_placeholder() {
        let warehouse = Warehouse::open_in_memory().expect("warehouse");
        let result = run(&DashboardArgs { symbol: None }, &warehouse).expect("dashboard");

        assert_eq!(result.data["symbols"], json!([]));
        assert!(result.data["message"].is_string());
    }

    #[test]
    fn defaults_to_first_stored_symbol() {
        let warehouse = Warehouse::open_in_memory().expect("warehouse");
        for symbol in ["SPY", "BTC"] {
            warehouse
                .insert_prices(
                    symbol,
                    &[PriceRecord {
                        timestamp: datetime!(2024-01-02 00:00:00),
                        symbol: symbol.to_owned(),
                        open_price: 1.0,
                        close_price: 1.0,
                        volume: None,
                        load_timestamp: datetime!(2024-01-02 12:00:00),
                    }],
                )
                .expect("insert");
        }

        let result = run(&DashboardArgs { symbol: None }, &warehouse).expect("dashboard");
        assert_eq!(result.data["symbols"], json!(["BTC", "SPY"]));
        assert_eq!(result.data["snapshot"]["symbol"], "BTC");

        let result = run(
            &DashboardArgs {
                symbol: Some(String::from("spy")),
            },
            &warehouse,
        )
        .expect("dashboard");
        assert_eq!(result.data["snapshot"]["symbol"], "SPY");
        assert_eq!(result.data["snapshot"]["rows"], 1);
    }
}
