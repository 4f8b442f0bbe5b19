//! # Marketlens Core
//!
//! Ingestion and analytics for daily and intraday stock, crypto and forex prices.
//!
//! ## Overview
//!
//! - **Quote adapter** normalizes the Alpha Vantage daily and 5-minute series
//!   layouts into one [`CanonicalQuote`] shape
//! - **Ingestion pipeline** fetches, validates and idempotently persists each
//!   catalog symbol in its own transaction, behind one global throttle
//! - **Metrics engine** derives returns, volatility, growth, extremes, moving
//!   averages and cross-asset correlation from a stored series
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`adapters`] | Alpha Vantage series layouts and parsing |
//! | [`config`] | Environment and catalog configuration |
//! | [`dashboard`] | Read-side snapshot and correlation queries |
//! | [`domain`] | Asset types, symbols, canonical quotes |
//! | [`error`] | Core error types |
//! | [`http_client`] | HTTP client abstraction |
//! | [`metrics`] | Windowed KPI computations |
//! | [`pipeline`] | Ingestion run and per-symbol state machine |
//! | [`throttling`] | Global request spacing |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use marketlens_core::{FetchMode, IngestConfig, IngestionPipeline, ReqwestHttpClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = IngestConfig::from_env()?;
//!     let pipeline = IngestionPipeline::open(&config, Arc::new(ReqwestHttpClient::new()))?;
//!
//!     let report = pipeline.run(&config.catalog, FetchMode::Incremental, None).await;
//!     println!("saved {} rows", report.total_saved());
//!
//!     let snapshot = marketlens_core::dashboard::snapshot(pipeline.warehouse(), "SPY")?;
//!     println!("{:?}", snapshot.annualized_volatility);
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod config;
pub mod dashboard;
pub mod domain;
pub mod error;
pub mod http_client;
pub mod metrics;
pub mod pipeline;
pub mod throttling;

pub use adapters::{AdapterError, AlphaVantageAdapter, FetchMode, RawSeries, SeriesLayout};
pub use config::{CatalogEntry, CatalogError, ConfigError, IngestConfig, SymbolCatalog};
pub use dashboard::{CorrelationView, DashboardSnapshot, SeriesPoint};
pub use domain::{AssetType, CanonicalQuote, SeriesInterval, Symbol};
pub use error::{CoreError, ValidationError};
pub use http_client::{HttpClient, HttpError, HttpRequest, HttpResponse, ReqwestHttpClient};
pub use metrics::{Kpi, SeriesView, Windowed};
pub use pipeline::{IngestionPipeline, PipelineError, RunReport, SymbolReport, SymbolState};
pub use throttling::RequestThrottle;

pub use marketlens_warehouse::{PriceRecord, SymbolCoverage, Warehouse, WarehouseConfig, WarehouseError};
