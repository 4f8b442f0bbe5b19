//! Process configuration, built once at start and passed by reference.

use std::fmt::{Debug, Formatter};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use marketlens_warehouse::WarehouseConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::macros::date;
use time::Date;

use crate::adapters::SeriesLayout;
use crate::domain::timestamp::parse_date;
use crate::{AssetType, SeriesInterval, Symbol, ValidationError};

pub const API_KEY_VAR: &str = "ALPHA_VANTAGE_API_KEY";
pub const DB_PATH_VAR: &str = "MARKETLENS_DB_PATH";
pub const HOME_VAR: &str = "MARKETLENS_HOME";
pub const BACKFILL_START_VAR: &str = "MARKETLENS_BACKFILL_START";
pub const MIN_REQUEST_INTERVAL_VAR: &str = "MARKETLENS_MIN_REQUEST_INTERVAL_MS";
pub const REQUEST_TIMEOUT_VAR: &str = "MARKETLENS_REQUEST_TIMEOUT_MS";

pub const DEFAULT_BACKFILL_START: Date = date!(2024 - 01 - 01);
pub const DEFAULT_MIN_REQUEST_INTERVAL: Duration = Duration::from_millis(1_000);
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("environment variable {var} is not set")]
    MissingVar { var: &'static str },

    #[error("{var}='{value}' is invalid: {reason}")]
    InvalidValue {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("API key is empty")]
    EmptyApiKey,

    #[error("symbol catalog is empty")]
    EmptyCatalog,

    #[error("minimum request interval must be greater than zero")]
    ZeroRequestInterval,

    #[error("catalog file {path} is invalid: {source}")]
    Catalog {
        path: PathBuf,
        #[source]
        source: CatalogError,
    },

    #[error("{symbol}: no {interval} series is available for {asset_type}")]
    UnsupportedSeries {
        asset_type: AssetType,
        interval: SeriesInterval,
        symbol: Symbol,
    },

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from parsing a TOML catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("not a valid catalog: {0}")]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Symbol(#[from] ValidationError),
}

/// One series to ingest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogEntry {
    pub asset_type: AssetType,
    pub interval: SeriesInterval,
    pub symbol: Symbol,
}

impl CatalogEntry {
    pub fn new(asset_type: AssetType, interval: SeriesInterval, symbol: Symbol) -> Self {
        Self {
            asset_type,
            interval,
            symbol,
        }
    }

    pub fn daily(asset_type: AssetType, symbol: Symbol) -> Self {
        Self::new(asset_type, SeriesInterval::Daily, symbol)
    }
}

/// Ordered list of instruments the pipeline walks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolCatalog {
    entries: Vec<CatalogEntry>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct CatalogFile {
    #[serde(default)]
    catalog: CatalogSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct CatalogSection {
    #[serde(default, alias = "stocks")]
    stock: Vec<String>,
    #[serde(default)]
    crypto: Vec<String>,
    #[serde(default)]
    forex: Vec<String>,
    /// Stocks ingested as 5-minute bars.
    #[serde(default)]
    stock_intraday: Vec<String>,
}

impl Default for SymbolCatalog {
    fn default() -> Self {
        let seed: [(AssetType, &str); 6] = [
            (AssetType::Stock, "SPY"),
            (AssetType::Crypto, "BTC"),
            (AssetType::Crypto, "ETH"),
            (AssetType::Forex, "EUR"),
            (AssetType::Forex, "JPY"),
            (AssetType::Forex, "GBP"),
        ];
        let entries = seed
            .iter()
            .filter_map(|(asset_type, symbol)| {
                Symbol::parse(symbol)
                    .ok()
                    .map(|symbol| CatalogEntry::daily(*asset_type, symbol))
            })
            .collect();
        Self { entries }
    }
}

impl SymbolCatalog {
    pub fn new(entries: Vec<CatalogEntry>) -> Self {
        Self { entries }
    }

    /// Build a daily catalog from `(asset_type, symbol)` string pairs.
    pub fn from_pairs<'a>(
        pairs: impl IntoIterator<Item = (AssetType, &'a str)>,
    ) -> Result<Self, ValidationError> {
        let entries = pairs
            .into_iter()
            .map(|(asset_type, symbol)| Ok(CatalogEntry::daily(asset_type, Symbol::parse(symbol)?)))
            .collect::<Result<Vec<_>, ValidationError>>()?;
        Ok(Self { entries })
    }

    /// Parse a TOML catalog: a `[catalog]` table with `stock`, `crypto` and
    /// `forex` daily arrays plus a `stock_intraday` array of 5-minute stocks.
    pub fn from_toml_str(raw: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = toml::from_str(raw)?;
        let section = file.catalog;

        let daily = [
            (AssetType::Stock, &section.stock),
            (AssetType::Crypto, &section.crypto),
            (AssetType::Forex, &section.forex),
        ];
        let mut entries = Vec::new();
        for (asset_type, symbols) in daily {
            for symbol in symbols {
                entries.push(CatalogEntry::daily(asset_type, Symbol::parse(symbol)?));
            }
        }
        for symbol in &section.stock_intraday {
            entries.push(CatalogEntry::new(
                AssetType::Stock,
                SeriesInterval::FiveMinutes,
                Symbol::parse(symbol)?,
            ));
        }

        Ok(Self { entries })
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw).map_err(|source| ConfigError::Catalog {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn push(&mut self, entry: CatalogEntry) {
        self.entries.push(entry);
    }

    pub fn iter(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Everything an ingestion run needs.
#[derive(Clone)]
pub struct IngestConfig {
    pub api_key: String,
    pub marketlens_home: PathBuf,
    pub db_path: PathBuf,
    pub catalog: SymbolCatalog,
    /// Earliest point kept by a full-history backfill.
    pub backfill_start: Date,
    /// Global spacing between upstream calls.
    pub min_request_interval: Duration,
    pub request_timeout_ms: u64,
}

impl IngestConfig {
    /// Defaults for everything but the API key.
    pub fn new(api_key: impl Into<String>, db_path: impl Into<PathBuf>) -> Self {
        let db_path = db_path.into();
        let marketlens_home = db_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".marketlens"));
        Self {
            api_key: api_key.into(),
            marketlens_home,
            db_path,
            catalog: SymbolCatalog::default(),
            backfill_start: DEFAULT_BACKFILL_START,
            min_request_interval: DEFAULT_MIN_REQUEST_INTERVAL,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
        }
    }

    /// Build from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let api_key = read(API_KEY_VAR).ok_or(ConfigError::MissingVar { var: API_KEY_VAR })?;

        let marketlens_home = read(HOME_VAR)
            .map(PathBuf::from)
            .or_else(|| read("HOME").map(|home| PathBuf::from(home).join(".marketlens")))
            .unwrap_or_else(|| PathBuf::from(".marketlens"));
        let db_path = read(DB_PATH_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|| marketlens_home.join("warehouse.duckdb"));

        let backfill_start = match read(BACKFILL_START_VAR) {
            Some(value) => parse_date(&value).map_err(|error| ConfigError::InvalidValue {
                var: BACKFILL_START_VAR,
                value: value.clone(),
                reason: error.to_string(),
            })?,
            None => DEFAULT_BACKFILL_START,
        };

        let min_request_interval = match read(MIN_REQUEST_INTERVAL_VAR) {
            Some(value) => Duration::from_millis(parse_millis(MIN_REQUEST_INTERVAL_VAR, &value)?),
            None => DEFAULT_MIN_REQUEST_INTERVAL,
        };

        let request_timeout_ms = match read(REQUEST_TIMEOUT_VAR) {
            Some(value) => parse_millis(REQUEST_TIMEOUT_VAR, &value)?,
            None => DEFAULT_REQUEST_TIMEOUT_MS,
        };

        Ok(Self {
            api_key,
            marketlens_home,
            db_path,
            catalog: SymbolCatalog::default(),
            backfill_start,
            min_request_interval,
            request_timeout_ms,
        })
    }

    pub fn with_catalog(mut self, catalog: SymbolCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_db_path(mut self, db_path: impl Into<PathBuf>) -> Self {
        self.db_path = db_path.into();
        self
    }

    pub fn with_min_request_interval(mut self, interval: Duration) -> Self {
        self.min_request_interval = interval;
        self
    }

    pub fn with_backfill_start(mut self, start: Date) -> Self {
        self.backfill_start = start;
        self
    }

    /// Checked before any network call is made.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::EmptyApiKey);
        }
        if self.catalog.is_empty() {
            return Err(ConfigError::EmptyCatalog);
        }
        if self.min_request_interval.is_zero() {
            return Err(ConfigError::ZeroRequestInterval);
        }
        if let Some(entry) = self
            .catalog
            .iter()
            .find(|entry| SeriesLayout::find(entry.asset_type, entry.interval).is_none())
        {
            return Err(ConfigError::UnsupportedSeries {
                asset_type: entry.asset_type,
                interval: entry.interval,
                symbol: entry.symbol.clone(),
            });
        }
        Ok(())
    }

    pub fn warehouse_config(&self) -> WarehouseConfig {
        WarehouseConfig {
            marketlens_home: self.marketlens_home.clone(),
            db_path: self.db_path.clone(),
            max_pool_size: 4,
        }
    }
}

impl Debug for IngestConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestConfig")
            .field("api_key", &"<redacted>")
            .field("db_path", &self.db_path)
            .field("catalog", &self.catalog)
            .field("backfill_start", &self.backfill_start)
            .field("min_request_interval", &self.min_request_interval)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .finish()
    }
}

fn parse_millis(var: &'static str, value: &str) -> Result<u64, ConfigError> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|error| ConfigError::InvalidValue {
            var,
            value: value.to_owned(),
            reason: error.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn defaults_apply_when_only_the_key_is_set() {
        let config = IngestConfig::from_lookup(lookup(&[
            (API_KEY_VAR, "secret"),
            ("HOME", "/home/analyst"),
        ]))
        .expect("config");

        assert_eq!(config.api_key, "secret");
        assert_eq!(
            config.db_path,
            PathBuf::from("/home/analyst/.marketlens/warehouse.duckdb")
        );
        assert_eq!(config.backfill_start, DEFAULT_BACKFILL_START);
        assert_eq!(config.min_request_interval, Duration::from_secs(1));
        assert_eq!(config.catalog.len(), 6);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn missing_key_is_reported_by_name() {
        let error = IngestConfig::from_lookup(lookup(&[])).expect_err("must fail");
        assert!(matches!(error, ConfigError::MissingVar { var: API_KEY_VAR }));
    }

    #[test]
    fn overrides_are_parsed() {
        let config = IngestConfig::from_lookup(lookup(&[
            (API_KEY_VAR, "secret"),
            (DB_PATH_VAR, "/tmp/prices.duckdb"),
            (BACKFILL_START_VAR, "2023-06-01"),
            (MIN_REQUEST_INTERVAL_VAR, "12000"),
        ]))
        .expect("config");

        assert_eq!(config.db_path, PathBuf::from("/tmp/prices.duckdb"));
        assert_eq!(config.backfill_start, date!(2023 - 06 - 01));
        assert_eq!(config.min_request_interval, Duration::from_secs(12));
    }

    #[test]
    fn malformed_values_are_rejected() {
        let error = IngestConfig::from_lookup(lookup(&[
            (API_KEY_VAR, "secret"),
            (MIN_REQUEST_INTERVAL_VAR, "soon"),
        ]))
        .expect_err("must fail");
        assert!(matches!(
            error,
            ConfigError::InvalidValue {
                var: MIN_REQUEST_INTERVAL_VAR,
                ..
            }
        ));
    }

    #[test]
    fn validate_rejects_empty_catalog_and_zero_interval() {
        let config = IngestConfig::new("secret", "/tmp/w.duckdb");

        let empty = config.clone().with_catalog(SymbolCatalog::new(Vec::new()));
        assert!(matches!(empty.validate(), Err(ConfigError::EmptyCatalog)));

        let zero = config.clone().with_min_request_interval(Duration::ZERO);
        assert!(matches!(zero.validate(), Err(ConfigError::ZeroRequestInterval)));

        let mut blank = config;
        blank.api_key = String::from("  ");
        assert!(matches!(blank.validate(), Err(ConfigError::EmptyApiKey)));
    }

    #[test]
    fn debug_output_hides_the_key() {
        let config = IngestConfig::new("very-secret", "/tmp/w.duckdb");
        assert!(!format!("{config:?}").contains("very-secret"));
    }

    #[test]
    fn toml_catalog_keeps_asset_order() {
        let catalog = SymbolCatalog::from_toml_str(
            r#"
[catalog]
forex = ["chf"]
stock = ["QQQ", "SPY"]
"#,
        )
        .expect("catalog");

        let entries: Vec<(AssetType, &str)> = catalog
            .iter()
            .map(|entry| (entry.asset_type, entry.symbol.as_str()))
            .collect();
        assert_eq!(
            entries,
            vec![
                (AssetType::Stock, "QQQ"),
                (AssetType::Stock, "SPY"),
                (AssetType::Forex, "CHF"),
            ]
        );
    }

    #[test]
    fn toml_catalog_errors_keep_their_cause() {
        let bad_symbol = SymbolCatalog::from_toml_str("[catalog]\nstock = [\"\"]\n")
            .expect_err("empty symbol");
        assert!(matches!(
            bad_symbol,
            CatalogError::Symbol(ValidationError::EmptySymbol)
        ));

        let unknown_key = SymbolCatalog::from_toml_str("[catalog]\nbonds = [\"TLT\"]\n")
            .expect_err("unknown key");
        assert!(matches!(unknown_key, CatalogError::Toml(_)));
    }

    #[test]
    fn catalog_file_errors_name_the_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("catalog.toml");
        fs::write(&path, "[catalog]\nstock = 42\n").expect("write");

        let error = SymbolCatalog::from_file(&path).expect_err("must fail");
        match error {
            ConfigError::Catalog { path: reported, source } => {
                assert_eq!(reported, path);
                assert!(matches!(source, CatalogError::Toml(_)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn toml_catalog_selects_intraday_stocks() {
        let catalog = SymbolCatalog::from_toml_str(
            r#"
[catalog]
stock = ["SPY"]
stock_intraday = ["spy"]
"#,
        )
        .expect("catalog");

        let entries: Vec<(SeriesInterval, &str)> = catalog
            .iter()
            .map(|entry| (entry.interval, entry.symbol.as_str()))
            .collect();
        assert_eq!(
            entries,
            vec![
                (SeriesInterval::Daily, "SPY"),
                (SeriesInterval::FiveMinutes, "SPY"),
            ]
        );
    }

    #[test]
    fn validate_rejects_series_upstream_does_not_offer() {
        let catalog = SymbolCatalog::new(vec![CatalogEntry::new(
            AssetType::Crypto,
            SeriesInterval::FiveMinutes,
            Symbol::parse("BTC").expect("symbol"),
        )]);
        let config = IngestConfig::new("secret", "/tmp/w.duckdb").with_catalog(catalog);

        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnsupportedSeries {
                asset_type: AssetType::Crypto,
                interval: SeriesInterval::FiveMinutes,
                ..
            })
        ));
    }
}
