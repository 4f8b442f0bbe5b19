//! Fetch → parse → validate → persist, one symbol at a time.

use std::sync::Arc;

use marketlens_warehouse::{Warehouse, WarehouseError};
use serde::Serialize;
use thiserror::Error;
use time::{Date, OffsetDateTime, PrimitiveDateTime};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::adapters::alphavantage::parse_series;
use crate::adapters::{AdapterError, AlphaVantageAdapter, FetchMode};
use crate::config::{CatalogEntry, ConfigError, IngestConfig, SymbolCatalog};
use crate::domain::timestamp::{format_date, format_series_timestamp};
use crate::http_client::HttpClient;
use crate::{AssetType, SeriesInterval, Symbol};

/// Errors that stop a run before any symbol is processed.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("store unavailable: {0}")]
    Store(#[from] WarehouseError),
}

/// Where one symbol got to in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolState {
    Pending,
    /// A response arrived.
    Fetched,
    Validated,
    Persisted,
    Skipped,
    Failed,
}

impl SymbolState {
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Persisted | Self::Skipped | Self::Failed)
    }

    pub const fn can_advance_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Fetched)
                | (Self::Fetched, Self::Validated)
                | (Self::Fetched, Self::Skipped)
                | (Self::Validated, Self::Persisted)
                | (Self::Pending | Self::Fetched | Self::Validated, Self::Failed)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("illegal symbol state transition {from:?} -> {to:?}")]
pub struct IllegalTransition {
    pub from: SymbolState,
    pub to: SymbolState,
}

/// Outcome of one catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SymbolReport {
    pub asset_type: AssetType,
    pub interval: SeriesInterval,
    pub symbol: Symbol,
    pub state: SymbolState,
    /// Points parsed from the response, before the date cutoff.
    pub fetched_count: usize,
    /// Rows actually inserted; duplicates are not counted.
    pub saved_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl SymbolReport {
    pub fn pending(entry: &CatalogEntry) -> Self {
        Self {
            asset_type: entry.asset_type,
            interval: entry.interval,
            symbol: entry.symbol.clone(),
            state: SymbolState::Pending,
            fetched_count: 0,
            saved_count: 0,
            skipped_reason: None,
            failure_reason: None,
        }
    }

    pub fn advance(&mut self, next: SymbolState) -> Result<(), IllegalTransition> {
        if !self.state.can_advance_to(next) {
            return Err(IllegalTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }

    fn skip(&mut self, reason: String) {
        match self.advance(SymbolState::Skipped) {
            Ok(()) => self.skipped_reason = Some(reason),
            Err(illegal) => self.fail(format!("{reason} ({illegal})")),
        }
    }

    fn fail(&mut self, reason: String) {
        if !self.state.is_terminal() {
            self.state = SymbolState::Failed;
        }
        self.failure_reason = Some(reason);
    }
}

/// Summary of one run, in catalog order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub mode: FetchMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cutoff: Option<String>,
    pub per_symbol: Vec<SymbolReport>,
}

impl RunReport {
    pub fn has_failures(&self) -> bool {
        self.per_symbol
            .iter()
            .any(|report| report.state == SymbolState::Failed)
    }

    pub fn total_saved(&self) -> usize {
        self.per_symbol.iter().map(|report| report.saved_count).sum()
    }

    pub fn get(&self, symbol: &str) -> Option<&SymbolReport> {
        self.per_symbol
            .iter()
            .find(|report| report.symbol.as_str() == symbol)
    }
}

enum SymbolError {
    Skip(String),
    Fail(String),
}

impl From<AdapterError> for SymbolError {
    fn from(error: AdapterError) -> Self {
        if error.is_skippable() {
            Self::Skip(error.to_string())
        } else {
            Self::Fail(error.to_string())
        }
    }
}

impl From<IllegalTransition> for SymbolError {
    fn from(error: IllegalTransition) -> Self {
        Self::Fail(error.to_string())
    }
}

/// The only writer of the price store.
pub struct IngestionPipeline {
    adapter: AlphaVantageAdapter,
    warehouse: Warehouse,
    backfill_start: Date,
}

impl IngestionPipeline {
    pub fn new(config: &IngestConfig, http_client: Arc<dyn HttpClient>, warehouse: Warehouse) -> Self {
        Self {
            adapter: AlphaVantageAdapter::new(config, http_client),
            warehouse,
            backfill_start: config.backfill_start,
        }
    }

    /// Validate the configuration and open the store; either failure is fatal.
    pub fn open(config: &IngestConfig, http_client: Arc<dyn HttpClient>) -> Result<Self, PipelineError> {
        config.validate()?;
        let warehouse = Warehouse::open(config.warehouse_config())?;
        Ok(Self::new(config, http_client, warehouse))
    }

    pub fn warehouse(&self) -> &Warehouse {
        &self.warehouse
    }

    /// Walk the catalog sequentially. Each symbol succeeds or fails on its own.
    pub async fn run(&self, catalog: &SymbolCatalog, mode: FetchMode, since: Option<Date>) -> RunReport {
        let run_id = Uuid::new_v4();
        let cutoff = match (mode, since) {
            (_, Some(since)) => Some(since),
            (FetchMode::FullHistory, None) => Some(self.backfill_start),
            (FetchMode::Incremental, None) => None,
        };
        let cutoff_label = cutoff.map(format_date);
        info!(
            %run_id,
            mode = mode.as_str(),
            cutoff = cutoff_label.as_deref().unwrap_or("none"),
            symbols = catalog.len(),
            "starting ingestion run"
        );

        let mut per_symbol = Vec::with_capacity(catalog.len());
        for entry in catalog.iter() {
            let mut report = SymbolReport::pending(entry);
            match self.ingest_symbol(entry, mode, cutoff, &mut report).await {
                Ok(()) => info!(
                    symbol = %entry.symbol,
                    asset_type = %entry.asset_type,
                    interval = %entry.interval,
                    fetched = report.fetched_count,
                    saved = report.saved_count,
                    "symbol persisted"
                ),
                Err(SymbolError::Skip(reason)) => {
                    warn!(
                        symbol = %entry.symbol,
                        asset_type = %entry.asset_type,
                    interval = %entry.interval,
                        reason = %reason,
                        "symbol skipped"
                    );
                    report.skip(reason);
                }
                Err(SymbolError::Fail(reason)) => {
                    error!(
                        symbol = %entry.symbol,
                        asset_type = %entry.asset_type,
                    interval = %entry.interval,
                        reason = %reason,
                        "symbol failed"
                    );
                    report.fail(reason);
                }
            }
            per_symbol.push(report);
        }

        let run = RunReport {
            run_id,
            mode,
            cutoff: cutoff_label,
            per_symbol,
        };
        info!(
            %run_id,
            saved = run.total_saved(),
            failed = run.has_failures(),
            "ingestion run finished"
        );
        run
    }

    async fn ingest_symbol(
        &self,
        entry: &CatalogEntry,
        mode: FetchMode,
        cutoff: Option<Date>,
        report: &mut SymbolReport,
    ) -> Result<(), SymbolError> {
        let raw = match self.adapter.fetch_raw(entry, mode).await {
            Ok(raw) => raw,
            Err(error @ AdapterError::UpstreamHttp { .. }) => {
                report.advance(SymbolState::Fetched)?;
                return Err(error.into());
            }
            Err(error) => return Err(error.into()),
        };
        report.advance(SymbolState::Fetched)?;

        let quotes = parse_series(&raw)?;
        report.fetched_count = quotes.len();

        let load_timestamp = now_utc();
        let mut records = Vec::with_capacity(quotes.len());
        for quote in quotes {
            if cutoff.is_some_and(|cutoff| quote.timestamp.date() < cutoff) {
                continue;
            }
            quote.validate().map_err(|error| {
                SymbolError::Fail(format!(
                    "{} point {}: {error}",
                    entry.symbol,
                    format_series_timestamp(quote.timestamp)
                ))
            })?;
            records.push(quote.into_price_record(load_timestamp));
        }
        report.advance(SymbolState::Validated)?;

        report.saved_count = self
            .warehouse
            .insert_prices(entry.symbol.as_str(), &records)
            .map_err(|error| SymbolError::Fail(format!("persist failed: {error}")))?;
        report.advance(SymbolState::Persisted)?;

        Ok(())
    }
}

fn now_utc() -> PrimitiveDateTime {
    let now = OffsetDateTime::now_utc();
    PrimitiveDateTime::new(now.date(), now.time())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> SymbolReport {
        SymbolReport::pending(&CatalogEntry::daily(
            AssetType::Stock,
            Symbol::parse("SPY").expect("symbol"),
        ))
    }

    #[test]
    fn happy_path_transitions_are_legal() {
        let mut report = report();
        report.advance(SymbolState::Fetched).expect("fetched");
        report.advance(SymbolState::Validated).expect("validated");
        report.advance(SymbolState::Persisted).expect("persisted");
        assert!(report.state.is_terminal());
    }

    #[test]
    fn skipping_requires_a_response() {
        let mut report = report();
        let illegal = report
            .advance(SymbolState::Skipped)
            .expect_err("pending cannot skip");
        assert_eq!(illegal.from, SymbolState::Pending);

        report.advance(SymbolState::Fetched).expect("fetched");
        report.skip(String::from("no series"));
        assert_eq!(report.state, SymbolState::Skipped);
        assert_eq!(report.skipped_reason.as_deref(), Some("no series"));
    }

    #[test]
    fn terminal_states_do_not_move() {
        let mut report = report();
        report.advance(SymbolState::Fetched).expect("fetched");
        report.advance(SymbolState::Validated).expect("validated");
        report.advance(SymbolState::Persisted).expect("persisted");

        assert!(report.advance(SymbolState::Failed).is_err());
        assert!(report.advance(SymbolState::Fetched).is_err());
    }

    #[test]
    fn failure_is_reachable_from_every_open_state() {
        for state in [
            SymbolState::Pending,
            SymbolState::Fetched,
            SymbolState::Validated,
        ] {
            assert!(state.can_advance_to(SymbolState::Failed), "{state:?}");
        }
        assert!(!SymbolState::Skipped.can_advance_to(SymbolState::Failed));
    }

    #[test]
    fn report_serializes_states_in_snake_case() {
        let mut report = report();
        report.fail(String::from("transport failure: timeout"));

        let encoded = serde_json::to_value(&report).expect("serialize");
        assert_eq!(encoded["state"], "failed");
        assert_eq!(encoded["symbol"], "SPY");
        assert_eq!(encoded["interval"], "daily");
        assert!(encoded.get("skipped_reason").is_none());
    }
}
