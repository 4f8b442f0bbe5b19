//! CLI argument definitions for marketlens.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ingest` | Fetch the catalog and persist new daily points |
//! | `dashboard` | KPIs and chart series for one symbol |
//! | `correlate` | Return correlation between two symbols |
//! | `coverage` | Stored range per symbol |
//! | `symbols` | Stored symbols |
//!
//! # Examples
//!
//! ```bash
//! marketlens ingest --mode full-history
//! marketlens ingest --since 2024-06-01 --catalog catalog.toml
//! marketlens dashboard SPY --pretty
//! marketlens correlate BTC ETH
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use marketlens_core::domain::timestamp::parse_date;
use marketlens_core::FetchMode;
use time::Date;

/// Daily price ingestion and analytics for stocks, crypto and forex.
#[derive(Debug, Parser)]
#[command(
    name = "marketlens",
    author,
    version,
    about = "Daily price ingestion and analytics for stocks, crypto and forex",
    long_about = "marketlens pulls daily series from Alpha Vantage into a local DuckDB \
warehouse and computes returns, volatility, growth, 52-week extremes, moving averages \
and cross-asset correlation from what is stored.\n\
\n\
Configuration is read from the environment (a .env file is loaded first):\n\
  ALPHA_VANTAGE_API_KEY, MARKETLENS_DB_PATH, MARKETLENS_HOME,\n\
  MARKETLENS_BACKFILL_START, MARKETLENS_MIN_REQUEST_INTERVAL_MS,\n\
  MARKETLENS_REQUEST_TIMEOUT_MS\n\
\n\
Set RUST_LOG to change log verbosity (logs go to stderr)."
)]
pub struct Cli {
    /// Warehouse database file (overrides MARKETLENS_DB_PATH).
    #[arg(long, global = true, value_name = "PATH")]
    pub db: Option<PathBuf>,

    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch every catalog symbol and persist points not yet stored.
    ///
    /// Prints the run report. Exits with code 3 when any symbol failed.
    Ingest(IngestArgs),

    /// Show KPIs and chart series for one stored symbol.
    ///
    /// Defaults to the first stored symbol.
    Dashboard(DashboardArgs),

    /// Correlate the daily returns of two stored symbols.
    Correlate(CorrelateArgs),

    /// Show first/last timestamp and row count per stored symbol.
    Coverage,

    /// List stored symbols.
    Symbols,
}

/// How much history `ingest` requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Recent points only.
    Incremental,
    /// Full history back to the configured backfill start.
    FullHistory,
}

impl From<Mode> for FetchMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Incremental => Self::Incremental,
            Mode::FullHistory => Self::FullHistory,
        }
    }
}

#[derive(Debug, Args)]
pub struct IngestArgs {
    #[arg(long, value_enum, default_value_t = Mode::Incremental)]
    pub mode: Mode,

    /// Drop points before this date (YYYY-MM-DD).
    #[arg(long, value_parser = parse_date_arg)]
    pub since: Option<Date>,

    /// TOML catalog file with `[catalog]` stock/crypto/forex/stock_intraday arrays.
    #[arg(long, value_name = "FILE")]
    pub catalog: Option<PathBuf>,

    /// Also ingest this stock as 5-minute bars. Repeatable.
    #[arg(long, value_name = "SYMBOL")]
    pub intraday: Vec<String>,

    /// Minimum spacing between upstream calls, in milliseconds.
    #[arg(long, value_name = "MS")]
    pub min_interval_ms: Option<u64>,
}

#[derive(Debug, Args)]
pub struct DashboardArgs {
    pub symbol: Option<String>,
}

#[derive(Debug, Args)]
pub struct CorrelateArgs {
    pub left: String,
    pub right: String,
}

fn parse_date_arg(value: &str) -> Result<Date, String> {
    parse_date(value).map_err(|error| error.to_string())
}
