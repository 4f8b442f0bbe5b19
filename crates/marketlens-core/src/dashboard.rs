//! Read-side queries backing the dashboard.
//!
//! Each call loads a fresh [`SeriesView`] from the store; nothing is cached
//! between requests.

use marketlens_warehouse::Warehouse;
use serde::Serialize;
use time::PrimitiveDateTime;

use crate::domain::timestamp::serde_series_timestamp;
use crate::metrics::{
    self, AlignedReturns, Extremum, Kpi, SeriesView, FIFTY_TWO_WEEK_ROWS, GROWTH_PERIODS,
};
use crate::CoreError;

/// One point of a chart series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SeriesPoint {
    #[serde(with = "serde_series_timestamp")]
    pub timestamp: PrimitiveDateTime,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PeriodGrowth {
    pub rows: usize,
    pub growth: Kpi<f64>,
}

/// Everything the dashboard shows for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardSnapshot {
    pub symbol: String,
    pub rows: usize,
    pub latest_close: Option<f64>,
    pub latest_return: Kpi<f64>,
    pub annualized_volatility: Kpi<f64>,
    pub average_annual_return: Kpi<f64>,
    pub period_growth: Vec<PeriodGrowth>,
    pub high_52_week: Kpi<f64>,
    pub low_52_week: Kpi<f64>,
    pub moving_average_20: Kpi<f64>,
    pub moving_average_50: Kpi<f64>,
    pub price_volume_ratio: Kpi<f64>,
    pub close_series: Vec<SeriesPoint>,
    pub return_series: Vec<SeriesPoint>,
}

impl DashboardSnapshot {
    /// A snapshot with nothing computed yet.
    pub fn pending(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            rows: 0,
            latest_close: None,
            latest_return: Kpi::NotComputed,
            annualized_volatility: Kpi::NotComputed,
            average_annual_return: Kpi::NotComputed,
            period_growth: GROWTH_PERIODS
                .iter()
                .map(|rows| PeriodGrowth {
                    rows: *rows,
                    growth: Kpi::NotComputed,
                })
                .collect(),
            high_52_week: Kpi::NotComputed,
            low_52_week: Kpi::NotComputed,
            moving_average_20: Kpi::NotComputed,
            moving_average_50: Kpi::NotComputed,
            price_volume_ratio: Kpi::NotComputed,
            close_series: Vec::new(),
            return_series: Vec::new(),
        }
    }

    pub fn compute(view: &SeriesView) -> Self {
        let closes = view.closes();
        let volumes = view.volumes();
        let timestamps = view.timestamps();

        let close_series = timestamps
            .iter()
            .zip(&closes)
            .map(|(timestamp, close)| SeriesPoint {
                timestamp: *timestamp,
                value: *close,
            })
            .collect();
        let return_series = timestamps
            .iter()
            .zip(metrics::daily_returns(&closes))
            .filter_map(|(timestamp, daily_return)| {
                daily_return.map(|value| SeriesPoint {
                    timestamp: *timestamp,
                    value,
                })
            })
            .collect();

        Self {
            symbol: view.symbol().to_owned(),
            rows: view.len(),
            latest_close: closes.last().copied(),
            latest_return: metrics::latest_return(&closes).into(),
            annualized_volatility: metrics::annualized_volatility(&closes).into(),
            average_annual_return: metrics::average_annual_return(&closes).into(),
            period_growth: GROWTH_PERIODS
                .iter()
                .map(|rows| PeriodGrowth {
                    rows: *rows,
                    growth: metrics::period_growth(&closes, *rows).into(),
                })
                .collect(),
            high_52_week: metrics::rolling_extremum(&closes, FIFTY_TWO_WEEK_ROWS, Extremum::Max)
                .into(),
            low_52_week: metrics::rolling_extremum(&closes, FIFTY_TWO_WEEK_ROWS, Extremum::Min)
                .into(),
            moving_average_20: metrics::moving_average(&closes, 20).into(),
            moving_average_50: metrics::moving_average(&closes, 50).into(),
            price_volume_ratio: metrics::price_volume_ratio(&closes, &volumes).into(),
            close_series,
            return_series,
        }
    }

    pub fn growth(&self, rows: usize) -> Kpi<f64> {
        self.period_growth
            .iter()
            .find(|entry| entry.rows == rows)
            .map(|entry| entry.growth)
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ReturnPair {
    #[serde(with = "serde_series_timestamp")]
    pub timestamp: PrimitiveDateTime,
    pub left: f64,
    pub right: f64,
}

/// Two symbols' aligned returns and their correlation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationView {
    pub left: String,
    pub right: String,
    pub coefficient: Kpi<f64>,
    pub pairs: Vec<ReturnPair>,
}

impl CorrelationView {
    pub fn compute(left: &SeriesView, right: &SeriesView) -> Self {
        let aligned = metrics::align_returns(left, right);
        Self {
            left: left.symbol().to_owned(),
            right: right.symbol().to_owned(),
            coefficient: metrics::correlation_of(&aligned).into(),
            pairs: return_pairs(&aligned),
        }
    }
}

fn return_pairs(aligned: &AlignedReturns) -> Vec<ReturnPair> {
    aligned
        .timestamps
        .iter()
        .zip(aligned.left.iter().zip(&aligned.right))
        .map(|(timestamp, (left, right))| ReturnPair {
            timestamp: *timestamp,
            left: *left,
            right: *right,
        })
        .collect()
}

/// Distinct stored symbols, sorted; feeds the symbol selector.
pub fn stored_symbols(warehouse: &Warehouse) -> Result<Vec<String>, CoreError> {
    Ok(warehouse.symbols()?)
}

/// The symbol shown when none was chosen.
pub fn default_symbol(warehouse: &Warehouse) -> Result<Option<String>, CoreError> {
    Ok(stored_symbols(warehouse)?.into_iter().next())
}

pub fn load_view(warehouse: &Warehouse, symbol: &str) -> Result<SeriesView, CoreError> {
    let records = warehouse.load_series(symbol)?;
    Ok(SeriesView::new(symbol, records)?)
}

/// Snapshot of one symbol; a symbol with no stored rows has nothing computed.
pub fn snapshot(warehouse: &Warehouse, symbol: &str) -> Result<DashboardSnapshot, CoreError> {
    let view = load_view(warehouse, symbol)?;
    if view.is_empty() {
        return Ok(DashboardSnapshot::pending(view.symbol()));
    }
    Ok(DashboardSnapshot::compute(&view))
}

pub fn correlation_view(
    warehouse: &Warehouse,
    left: &str,
    right: &str,
) -> Result<CorrelationView, CoreError> {
    let left = load_view(warehouse, left)?;
    let right = load_view(warehouse, right)?;
    Ok(CorrelationView::compute(&left, &right))
}

#[cfg(test)]
mod tests {
    use marketlens_warehouse::PriceRecord;
    use time::macros::datetime;
    use time::Duration;

    use super::*;

    fn records(symbol: &str, closes: &[f64], volume: Option<f64>) -> Vec<PriceRecord> {
        let start = datetime!(2024-01-01 00:00:00);
        closes
            .iter()
            .enumerate()
            .map(|(index, close)| PriceRecord {
                timestamp: start + Duration::days(index as i64),
                symbol: symbol.to_owned(),
                open_price: *close,
                close_price: *close,
                volume,
                load_timestamp: start,
            })
            .collect()
    }

    #[test]
    fn unstored_symbol_has_nothing_computed() {
        let warehouse = Warehouse::open_in_memory().expect("warehouse");
        let snapshot = snapshot(&warehouse, "SPY").expect("snapshot");

        assert_eq!(snapshot.symbol, "SPY");
        assert_eq!(snapshot.rows, 0);
        assert_eq!(snapshot.latest_return, Kpi::NotComputed);
        assert_eq!(snapshot.growth(21), Kpi::NotComputed);
        assert_eq!(snapshot.high_52_week, Kpi::NotComputed);
        assert!(snapshot.close_series.is_empty());
    }

    #[test]
    fn short_series_reports_insufficient_windows() {
        let view = SeriesView::new("SPY", records("SPY", &[100.0, 110.0], Some(10.0)))
            .expect("view");
        let snapshot = DashboardSnapshot::compute(&view);

        assert_eq!(snapshot.rows, 2);
        assert_eq!(snapshot.latest_close, Some(110.0));
        let latest = snapshot.latest_return.value().copied().expect("latest return");
        assert!((latest - 0.10).abs() < 1e-12);
        assert!(matches!(
            snapshot.annualized_volatility,
            Kpi::InsufficientData {
                required: 253,
                actual: 2
            }
        ));
        assert!(!snapshot.high_52_week.is_available());
        assert_eq!(snapshot.close_series.len(), 2);
        assert_eq!(snapshot.return_series.len(), 1);
        assert_eq!(snapshot.return_series[0].timestamp, datetime!(2024-01-02 00:00:00));
    }

    #[test]
    fn reads_go_through_the_store() {
        let warehouse = Warehouse::open_in_memory().expect("warehouse");
        warehouse
            .insert_prices("BTC", &records("BTC", &[1.0, 2.0, 4.0, 8.0], Some(5.0)))
            .expect("insert");
        warehouse
            .insert_prices("ETH", &records("ETH", &[1.0, 1.5, 1.5, 3.0], Some(5.0)))
            .expect("insert");

        assert_eq!(default_symbol(&warehouse).expect("default").as_deref(), Some("BTC"));
        assert_eq!(snapshot(&warehouse, "ETH").expect("snapshot").rows, 4);

        let view = correlation_view(&warehouse, "BTC", "ETH").expect("correlation");
        assert_eq!(view.pairs.len(), 3);
        // BTC has constant returns, so there is no variance to correlate.
        assert!(matches!(view.coefficient, Kpi::InsufficientData { .. }));
    }

    #[test]
    fn snapshot_serializes_for_json_output() {
        let view = SeriesView::new("EUR", records("EUR", &[1.09, 1.1], None)).expect("view");
        let encoded = serde_json::to_value(DashboardSnapshot::compute(&view)).expect("serialize");

        assert_eq!(encoded["symbol"], "EUR");
        assert_eq!(encoded["price_volume_ratio"]["status"], "insufficient_data");
        assert_eq!(encoded["close_series"][0]["timestamp"], "2024-01-01");
    }
}
