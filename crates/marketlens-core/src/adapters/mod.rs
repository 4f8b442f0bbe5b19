//! Upstream quote adapters.

pub mod alphavantage;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use alphavantage::{AlphaVantageAdapter, RawSeries, SeriesLayout};

use crate::{AssetType, SeriesInterval};

/// How much history to request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchMode {
    /// Recent points only (`outputsize=compact` where supported).
    Incremental,
    /// Everything upstream has, cut at the configured backfill start.
    FullHistory,
}

impl FetchMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Incremental => "incremental",
            Self::FullHistory => "full_history",
        }
    }

    pub const fn outputsize(self) -> &'static str {
        match self {
            Self::Incremental => "compact",
            Self::FullHistory => "full",
        }
    }
}

/// Errors raised while fetching or normalizing one series.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AdapterError {
    #[error("upstream returned HTTP status {status}")]
    UpstreamHttp { status: u16 },

    #[error("response has no '{container_key}' section{}", upstream_message(.message))]
    UpstreamSchema {
        container_key: &'static str,
        /// Text of a `Note`, `Information` or `Error Message` body, if any.
        message: Option<String>,
    },

    #[error("malformed upstream data: {message}")]
    Parse { message: String },

    #[error("transport failure: {message}")]
    Transport { message: String },

    #[error("no {interval} series layout for {asset_type}")]
    UnsupportedSeries {
        asset_type: AssetType,
        interval: SeriesInterval,
    },
}

impl AdapterError {
    /// Upstream answered, but not with a usable series. The symbol is skipped.
    pub const fn is_skippable(&self) -> bool {
        matches!(self, Self::UpstreamHttp { .. } | Self::UpstreamSchema { .. })
    }

    pub(crate) fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }
}

fn upstream_message(message: &Option<String>) -> String {
    match message {
        Some(message) => format!(" (upstream says: {message})"),
        None => String::new(),
    }
}
