//! # Marketlens Warehouse
//!
//! DuckDB-backed price store for marketlens.
//!
//! ## Overview
//!
//! The warehouse owns the canonical price series. The ingestion pipeline is
//! its only writer; everything else reads.
//!
//! - **Idempotent ingestion**: rows are keyed by `(timestamp, symbol)` and a
//!   repeated key is silently ignored, never overwritten
//! - **Per-symbol transactions**: a batch is committed or rolled back as a whole
//! - **Ordered reads**: series come back ascending by timestamp
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use marketlens_warehouse::{Warehouse, WarehouseConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let warehouse = Warehouse::open(WarehouseConfig::default())?;
//!
//!     let series = warehouse.load_series("SPY")?;
//!     println!("SPY has {} stored rows", series.len());
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Tables
//!
//! | Table | Description |
//! |-------|-------------|
//! | `stock_prices` | Daily open/close/volume per symbol |
//! | `schema_migrations` | Applied migration versions |
//!
//! ## Views
//!
//! | View | Description |
//! |------|-------------|
//! | `vw_symbol_coverage` | First/last timestamp and row count per symbol |

pub mod duckdb;
pub mod migrations;
pub mod views;

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use ::duckdb::{Connection, ToSql};
use serde::Serialize;
use thiserror::Error;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::PrimitiveDateTime;

pub use duckdb::{DuckDbConnectionManager, PooledConnection};

const SQL_TIMESTAMP: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

const INSERT_PRICE_SQL: &str = "INSERT INTO stock_prices \
     (timestamp, symbol, open_price, close_price, volume, load_timestamp) \
     VALUES (CAST(? AS TIMESTAMP), ?, ?, ?, ?, CAST(? AS TIMESTAMP)) \
     ON CONFLICT (timestamp, symbol) DO NOTHING";

const SELECT_PRICE_COLUMNS: &str = "SELECT \
     strftime(timestamp, '%Y-%m-%d %H:%M:%S'), symbol, open_price, close_price, volume, \
     strftime(load_timestamp, '%Y-%m-%d %H:%M:%S') \
     FROM stock_prices";

/// Errors that can occur during warehouse operations.
#[derive(Debug, Error)]
pub enum WarehouseError {
    /// `DuckDB` database error.
    #[error(transparent)]
    DuckDb(#[from] ::duckdb::Error),

    /// I/O error (file system operations).
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A record was rejected before it reached the database.
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    /// A stored value could not be decoded back into a record.
    #[error("stored {column} value '{value}' could not be decoded")]
    CorruptValue { column: &'static str, value: String },
}

/// Configuration for the warehouse database.
#[derive(Debug, Clone)]
pub struct WarehouseConfig {
    /// Root directory for marketlens data.
    pub marketlens_home: PathBuf,
    /// Path to the `DuckDB` database file.
    pub db_path: PathBuf,
    /// Maximum number of idle connections kept in the pool.
    pub max_pool_size: usize,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        let marketlens_home = resolve_marketlens_home();
        let db_path = marketlens_home.join("warehouse.duckdb");
        Self {
            marketlens_home,
            db_path,
            max_pool_size: 4,
        }
    }
}

impl WarehouseConfig {
    /// Default configuration pointed at an explicit database file.
    pub fn with_db_path(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            ..Self::default()
        }
    }
}

/// One persisted price point.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceRecord {
    /// Trading date (midnight) or intraday instant of the point.
    pub timestamp: PrimitiveDateTime,
    /// Symbol as stored (e.g. "SPY", "BTC", "EUR").
    pub symbol: String,
    /// Opening price.
    pub open_price: f64,
    /// Closing price.
    pub close_price: f64,
    /// Traded volume; `None` for instruments without volume (forex).
    pub volume: Option<f64>,
    /// When the point was fetched and written.
    pub load_timestamp: PrimitiveDateTime,
}

/// Stored range for one symbol, read from `vw_symbol_coverage`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SymbolCoverage {
    pub symbol: String,
    pub first_ts: String,
    pub last_ts: String,
    pub row_count: u64,
    pub last_loaded_at: String,
}

/// The price store.
#[derive(Clone)]
pub struct Warehouse {
    manager: DuckDbConnectionManager,
}

impl Warehouse {
    /// Open a warehouse with default configuration.
    pub fn open_default() -> Result<Self, WarehouseError> {
        Self::open(WarehouseConfig::default())
    }

    /// Open (creating if needed) the warehouse described by `config`.
    pub fn open(config: WarehouseConfig) -> Result<Self, WarehouseError> {
        if let Some(parent) = config.db_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let manager = DuckDbConnectionManager::open(config.db_path, config.max_pool_size)?;
        let warehouse = Self { manager };
        warehouse.initialize()?;
        Ok(warehouse)
    }

    /// Open a throwaway in-memory warehouse.
    pub fn open_in_memory() -> Result<Self, WarehouseError> {
        let manager = DuckDbConnectionManager::in_memory(2)?;
        let warehouse = Self { manager };
        warehouse.initialize()?;
        Ok(warehouse)
    }

    /// Initialize database schema and views.
    pub fn initialize(&self) -> Result<(), WarehouseError> {
        let connection = self.manager.acquire()?;
        migrations::apply_migrations(&connection)?;
        views::create_views(&connection)?;
        Ok(())
    }

    /// Path to the database file, `None` for in-memory stores.
    pub fn db_path(&self) -> Option<&Path> {
        self.manager.db_path()
    }

    /// Insert one symbol's batch inside a single transaction.
    ///
    /// Rows whose `(timestamp, symbol)` already exists are skipped; stored
    /// values are never overwritten. Returns the number of rows actually
    /// inserted. Any error rolls the whole batch back.
    pub fn insert_prices(&self, symbol: &str, rows: &[PriceRecord]) -> Result<usize, WarehouseError> {
        if rows.is_empty() {
            return Ok(0);
        }

        let connection = self.manager.acquire()?;
        connection.execute_batch("BEGIN TRANSACTION")?;
        let result = (|| -> Result<usize, WarehouseError> {
            let before = count_symbol_rows(&connection, symbol)?;

            for row in rows {
                if row.symbol != symbol {
                    return Err(WarehouseError::InvalidRecord(format!(
                        "row for '{}' in batch for '{symbol}'",
                        row.symbol
                    )));
                }

                let ts = format_sql_timestamp(row.timestamp)?;
                let loaded_at = format_sql_timestamp(row.load_timestamp)?;
                let params: [&dyn ToSql; 6] = [
                    &ts,
                    &row.symbol,
                    &row.open_price,
                    &row.close_price,
                    &row.volume,
                    &loaded_at,
                ];
                connection.execute(INSERT_PRICE_SQL, params.as_slice())?;
            }

            let after = count_symbol_rows(&connection, symbol)?;
            Ok(usize::try_from(after.saturating_sub(before)).unwrap_or_default())
        })();

        finalize_transaction(&connection, result)
    }

    /// Load one symbol's series, ascending by timestamp.
    pub fn load_series(&self, symbol: &str) -> Result<Vec<PriceRecord>, WarehouseError> {
        let connection = self.manager.acquire()?;
        let sql = format!("{SELECT_PRICE_COLUMNS} WHERE symbol = ? ORDER BY timestamp ASC");
        let params: [&dyn ToSql; 1] = [&symbol];
        read_price_rows(&connection, &sql, params.as_slice())
    }

    /// Load every stored row, ascending by timestamp.
    pub fn load_all(&self) -> Result<Vec<PriceRecord>, WarehouseError> {
        let connection = self.manager.acquire()?;
        let sql = format!("{SELECT_PRICE_COLUMNS} ORDER BY timestamp ASC, symbol ASC");
        read_price_rows(&connection, &sql, &[])
    }

    /// Distinct stored symbols, sorted.
    pub fn symbols(&self) -> Result<Vec<String>, WarehouseError> {
        let connection = self.manager.acquire()?;
        let mut statement =
            connection.prepare("SELECT DISTINCT symbol FROM stock_prices ORDER BY symbol")?;
        let rows = statement.query_map([], |row| row.get::<_, String>(0))?;
        rows.map(|row| row.map_err(WarehouseError::from)).collect()
    }

    /// Number of stored rows, optionally restricted to one symbol.
    pub fn count_rows(&self, symbol: Option<&str>) -> Result<u64, WarehouseError> {
        let connection = self.manager.acquire()?;
        let count = match symbol {
            Some(symbol) => count_symbol_rows(&connection, symbol)?,
            None => connection.query_row("SELECT COUNT(*) FROM stock_prices", [], |row| {
                row.get::<_, i64>(0)
            })?,
        };
        Ok(u64::try_from(count).unwrap_or_default())
    }

    /// Stored range per symbol.
    pub fn coverage(&self) -> Result<Vec<SymbolCoverage>, WarehouseError> {
        let connection = self.manager.acquire()?;
        let mut statement = connection.prepare(
            "SELECT symbol, \
                    strftime(first_ts, '%Y-%m-%d %H:%M:%S'), \
                    strftime(last_ts, '%Y-%m-%d %H:%M:%S'), \
                    row_count, \
                    strftime(last_loaded_at, '%Y-%m-%d %H:%M:%S') \
             FROM vw_symbol_coverage ORDER BY symbol",
        )?;
        let rows = statement.query_map([], |row| {
            Ok(SymbolCoverage {
                symbol: row.get(0)?,
                first_ts: row.get(1)?,
                last_ts: row.get(2)?,
                row_count: u64::try_from(row.get::<_, i64>(3)?).unwrap_or_default(),
                last_loaded_at: row.get(4)?,
            })
        })?;
        rows.map(|row| row.map_err(WarehouseError::from)).collect()
    }
}

/// Finalize a transaction, committing on success or rolling back on failure.
fn finalize_transaction<T>(
    connection: &Connection,
    result: Result<T, WarehouseError>,
) -> Result<T, WarehouseError> {
    match result {
        Ok(value) => {
            connection.execute_batch("COMMIT")?;
            Ok(value)
        }
        Err(error) => {
            if let Err(rollback_error) = connection.execute_batch("ROLLBACK") {
                tracing::warn!(%rollback_error, "rollback after failed batch did not complete");
            }
            Err(error)
        }
    }
}

fn count_symbol_rows(connection: &Connection, symbol: &str) -> Result<i64, WarehouseError> {
    let params: [&dyn ToSql; 1] = [&symbol];
    let count = connection.query_row(
        "SELECT COUNT(*) FROM stock_prices WHERE symbol = ?",
        params.as_slice(),
        |row| row.get(0),
    )?;
    Ok(count)
}

struct StoredPriceRow {
    timestamp: String,
    symbol: String,
    open_price: f64,
    close_price: f64,
    volume: Option<f64>,
    load_timestamp: String,
}

impl StoredPriceRow {
    fn into_record(self) -> Result<PriceRecord, WarehouseError> {
        Ok(PriceRecord {
            timestamp: parse_sql_timestamp("timestamp", &self.timestamp)?,
            symbol: self.symbol,
            open_price: self.open_price,
            close_price: self.close_price,
            volume: self.volume,
            load_timestamp: parse_sql_timestamp("load_timestamp", &self.load_timestamp)?,
        })
    }
}

fn read_price_rows(
    connection: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> Result<Vec<PriceRecord>, WarehouseError> {
    let mut statement = connection.prepare(sql)?;
    let rows = statement.query_map(params, |row| {
        Ok(StoredPriceRow {
            timestamp: row.get(0)?,
            symbol: row.get(1)?,
            open_price: row.get(2)?,
            close_price: row.get(3)?,
            volume: row.get(4)?,
            load_timestamp: row.get(5)?,
        })
    })?;

    rows.map(|row| row.map_err(WarehouseError::from)?.into_record())
        .collect()
}

fn format_sql_timestamp(value: PrimitiveDateTime) -> Result<String, WarehouseError> {
    value
        .format(SQL_TIMESTAMP)
        .map_err(|error| WarehouseError::InvalidRecord(format!("unformattable timestamp: {error}")))
}

fn parse_sql_timestamp(column: &'static str, value: &str) -> Result<PrimitiveDateTime, WarehouseError> {
    PrimitiveDateTime::parse(value, SQL_TIMESTAMP).map_err(|_| WarehouseError::CorruptValue {
        column,
        value: value.to_owned(),
    })
}

/// Resolve the marketlens home directory from environment or default.
fn resolve_marketlens_home() -> PathBuf {
    if let Some(path) = env::var_os("MARKETLENS_HOME") {
        let path = PathBuf::from(path);
        if !path.as_os_str().is_empty() {
            return path;
        }
    }

    if let Some(home) = env::var_os("HOME") {
        return PathBuf::from(home).join(".marketlens");
    }

    PathBuf::from(".marketlens")
}
