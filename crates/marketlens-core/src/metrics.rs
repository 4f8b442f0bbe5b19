//! Descriptive statistics over a stored price series.
//!
//! Everything here is pure. Windows count rows, not calendar days, and a
//! window that cannot be filled is reported as [`Windowed::InsufficientData`]
//! rather than as an error. Zero divisors and non-finite results are
//! reported the same way, with `actual` set to the rows that were usable.

use std::collections::BTreeMap;

use marketlens_warehouse::PriceRecord;
use serde::Serialize;
use time::PrimitiveDateTime;

use crate::ValidationError;

pub const TRADING_DAYS_PER_YEAR: usize = 252;
/// Rows needed before volatility and average annual return are reported.
pub const ANNUALIZATION_MIN_ROWS: usize = TRADING_DAYS_PER_YEAR + 1;
pub const FIFTY_TWO_WEEK_ROWS: usize = 252;
pub const GROWTH_PERIODS: [usize; 3] = [21, 30, 252];
pub const VOLUME_WINDOW: usize = 20;

/// Result of a windowed computation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Windowed<T> {
    Value(T),
    InsufficientData { required: usize, actual: usize },
}

impl<T> Windowed<T> {
    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Value(value) => Some(value),
            Self::InsufficientData { .. } => None,
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            Self::Value(value) => Some(value),
            Self::InsufficientData { .. } => None,
        }
    }

    pub const fn is_value(&self) -> bool {
        matches!(self, Self::Value(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Windowed<U> {
        match self {
            Self::Value(value) => Windowed::Value(f(value)),
            Self::InsufficientData { required, actual } => {
                Windowed::InsufficientData { required, actual }
            }
        }
    }
}

impl Windowed<f64> {
    /// Demote NaN and infinities to insufficient data.
    fn finite(value: f64, required: usize, actual: usize) -> Self {
        if value.is_finite() {
            Self::Value(value)
        } else {
            Self::InsufficientData { required, actual }
        }
    }
}

/// A KPI as shown to the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum Kpi<T> {
    Value(T),
    InsufficientData {
        required: usize,
        actual: usize,
    },
    #[default]
    NotComputed,
}

impl<T> Kpi<T> {
    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Value(value) => Some(value),
            _ => None,
        }
    }

    pub const fn is_available(&self) -> bool {
        matches!(self, Self::Value(_))
    }
}

impl<T> From<Windowed<T>> for Kpi<T> {
    fn from(windowed: Windowed<T>) -> Self {
        match windowed {
            Windowed::Value(value) => Self::Value(value),
            Windowed::InsufficientData { required, actual } => {
                Self::InsufficientData { required, actual }
            }
        }
    }
}

/// One symbol's rows, ascending by timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesView {
    symbol: String,
    records: Vec<PriceRecord>,
}

impl SeriesView {
    /// Rows must all belong to `symbol`; they are sorted here.
    pub fn new(symbol: impl Into<String>, mut records: Vec<PriceRecord>) -> Result<Self, ValidationError> {
        let symbol = symbol.into();
        if let Some(foreign) = records.iter().find(|record| record.symbol != symbol) {
            return Err(ValidationError::ForeignSeriesRow {
                expected: symbol,
                found: foreign.symbol.clone(),
            });
        }
        records.sort_by_key(|record| record.timestamp);
        Ok(Self { symbol, records })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[PriceRecord] {
        &self.records
    }

    pub fn last(&self) -> Option<&PriceRecord> {
        self.records.last()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.records.iter().map(|record| record.close_price).collect()
    }

    pub fn volumes(&self) -> Vec<Option<f64>> {
        self.records.iter().map(|record| record.volume).collect()
    }

    pub fn timestamps(&self) -> Vec<PrimitiveDateTime> {
        self.records.iter().map(|record| record.timestamp).collect()
    }
}

/// `close[i] / close[i-1] - 1`, aligned with `closes`; index 0 is `None`,
/// as is any step from a zero close.
pub fn daily_returns(closes: &[f64]) -> Vec<Option<f64>> {
    if closes.is_empty() {
        return Vec::new();
    }

    let mut returns = Vec::with_capacity(closes.len());
    returns.push(None);
    returns.extend(closes.windows(2).map(|pair| pct_change(pair[0], pair[1])));
    returns
}

/// Return of the most recent row.
pub fn latest_return(closes: &[f64]) -> Windowed<f64> {
    match closes {
        [.., previous, last] => match pct_change(*previous, *last) {
            Some(value) => Windowed::Value(value),
            None => Windowed::InsufficientData {
                required: 2,
                actual: 1,
            },
        },
        _ => Windowed::InsufficientData {
            required: 2,
            actual: closes.len(),
        },
    }
}

/// Sample standard deviation of daily returns, scaled by `sqrt(252)`.
pub fn annualized_volatility(closes: &[f64]) -> Windowed<f64> {
    annualized(closes, |returns| {
        sample_std_dev(returns).map(|std_dev| std_dev * (TRADING_DAYS_PER_YEAR as f64).sqrt())
    })
}

/// Mean daily return times 252.
pub fn average_annual_return(closes: &[f64]) -> Windowed<f64> {
    annualized(closes, |returns| {
        mean(returns).map(|mean| mean * TRADING_DAYS_PER_YEAR as f64)
    })
}

fn annualized(closes: &[f64], statistic: impl FnOnce(&[f64]) -> Option<f64>) -> Windowed<f64> {
    if closes.len() < ANNUALIZATION_MIN_ROWS {
        return Windowed::InsufficientData {
            required: ANNUALIZATION_MIN_ROWS,
            actual: closes.len(),
        };
    }

    let returns: Vec<f64> = daily_returns(closes).into_iter().flatten().collect();
    match statistic(&returns) {
        Some(value) => Windowed::finite(value, ANNUALIZATION_MIN_ROWS, returns.len() + 1),
        None => Windowed::InsufficientData {
            required: ANNUALIZATION_MIN_ROWS,
            actual: returns.len() + 1,
        },
    }
}

/// `close[-1] / close[-1-n] - 1`.
pub fn period_growth(closes: &[f64], n: usize) -> Windowed<f64> {
    let required = n.saturating_add(1);
    if closes.len() < required {
        return Windowed::InsufficientData {
            required,
            actual: closes.len(),
        };
    }

    let last = closes[closes.len() - 1];
    let base = closes[closes.len() - required];
    match pct_change(base, last) {
        Some(value) => Windowed::Value(value),
        None => Windowed::InsufficientData {
            required,
            actual: closes.len(),
        },
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extremum {
    Max,
    Min,
}

/// Highest or lowest close over the latest row and the `window` rows before it.
pub fn rolling_extremum(closes: &[f64], window: usize, extremum: Extremum) -> Windowed<f64> {
    let required = window.saturating_add(1);
    if closes.len() < required {
        return Windowed::InsufficientData {
            required,
            actual: closes.len(),
        };
    }

    let span = closes[closes.len() - required..].iter().copied();
    let value = match extremum {
        Extremum::Max => span.fold(f64::NEG_INFINITY, f64::max),
        Extremum::Min => span.fold(f64::INFINITY, f64::min),
    };
    Windowed::finite(value, required, closes.len())
}

/// Mean of the last `n` closes.
pub fn moving_average(closes: &[f64], n: usize) -> Windowed<f64> {
    let required = n.max(1);
    if closes.len() < required {
        return Windowed::InsufficientData {
            required,
            actual: closes.len(),
        };
    }

    match mean(&closes[closes.len() - required..]) {
        Some(value) => Windowed::finite(value, required, closes.len()),
        None => Windowed::InsufficientData {
            required,
            actual: 0,
        },
    }
}

/// Latest close over the mean volume of the last 20 rows.
pub fn price_volume_ratio(closes: &[f64], volumes: &[Option<f64>]) -> Windowed<f64> {
    let rows = closes.len().min(volumes.len());
    if rows < VOLUME_WINDOW {
        return Windowed::InsufficientData {
            required: VOLUME_WINDOW,
            actual: rows,
        };
    }

    let window: Vec<f64> = volumes[volumes.len() - VOLUME_WINDOW..]
        .iter()
        .flatten()
        .copied()
        .collect();
    if window.len() < VOLUME_WINDOW {
        return Windowed::InsufficientData {
            required: VOLUME_WINDOW,
            actual: window.len(),
        };
    }

    let mean_volume = mean(&window).unwrap_or_default();
    if mean_volume == 0.0 {
        return Windowed::InsufficientData {
            required: VOLUME_WINDOW,
            actual: 0,
        };
    }

    Windowed::finite(closes[closes.len() - 1] / mean_volume, VOLUME_WINDOW, window.len())
}

/// Returns of two series over their common timestamps.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct AlignedReturns {
    /// Timestamp of the later row of each pair.
    #[serde(with = "crate::domain::timestamp::serde_series_timestamp_vec")]
    pub timestamps: Vec<PrimitiveDateTime>,
    pub left: Vec<f64>,
    pub right: Vec<f64>,
}

impl AlignedReturns {
    pub fn len(&self) -> usize {
        self.left.len()
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_empty()
    }
}

/// Inner-join on timestamp, then percent change of the aligned closes.
/// Pairs where either side has no return are dropped.
pub fn align_returns(left: &SeriesView, right: &SeriesView) -> AlignedReturns {
    let right_closes: BTreeMap<PrimitiveDateTime, f64> = right
        .records()
        .iter()
        .map(|record| (record.timestamp, record.close_price))
        .collect();

    let joined: Vec<(PrimitiveDateTime, f64, f64)> = left
        .records()
        .iter()
        .filter_map(|record| {
            right_closes
                .get(&record.timestamp)
                .map(|right_close| (record.timestamp, record.close_price, *right_close))
        })
        .collect();

    let mut aligned = AlignedReturns::default();
    for pair in joined.windows(2) {
        let (_, left_prev, right_prev) = pair[0];
        let (timestamp, left_close, right_close) = pair[1];
        if let (Some(left_return), Some(right_return)) =
            (pct_change(left_prev, left_close), pct_change(right_prev, right_close))
        {
            aligned.timestamps.push(timestamp);
            aligned.left.push(left_return);
            aligned.right.push(right_return);
        }
    }
    aligned
}

/// Pearson correlation of aligned daily returns.
pub fn correlation(left: &SeriesView, right: &SeriesView) -> Windowed<f64> {
    correlation_of(&align_returns(left, right))
}

pub fn correlation_of(aligned: &AlignedReturns) -> Windowed<f64> {
    let pairs = aligned.len();
    if pairs < 2 {
        return Windowed::InsufficientData {
            required: 2,
            actual: pairs,
        };
    }

    match pearson(&aligned.left, &aligned.right) {
        Some(value) => Windowed::finite(value.clamp(-1.0, 1.0), 2, pairs),
        None => Windowed::InsufficientData {
            required: 2,
            actual: pairs,
        },
    }
}

fn pct_change(previous: f64, current: f64) -> Option<f64> {
    if previous == 0.0 {
        return None;
    }
    let change = current / previous - 1.0;
    change.is_finite().then_some(change)
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

fn sample_std_dev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let mean = mean(values)?;
    let squares: f64 = values.iter().map(|value| (value - mean).powi(2)).sum();
    Some((squares / (values.len() - 1) as f64).sqrt())
}

/// `None` when either side has zero variance.
fn pearson(xs: &[f64], ys: &[f64]) -> Option<f64> {
    let mean_x = mean(xs)?;
    let mean_y = mean(ys)?;

    let mut covariance = 0.0;
    let mut variance_x = 0.0;
    let mut variance_y = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        let dx = x - mean_x;
        let dy = y - mean_y;
        covariance += dx * dy;
        variance_x += dx * dx;
        variance_y += dy * dy;
    }

    if variance_x == 0.0 || variance_y == 0.0 {
        return None;
    }
    Some(covariance / (variance_x * variance_y).sqrt())
}
