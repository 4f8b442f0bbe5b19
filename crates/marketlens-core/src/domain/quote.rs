use marketlens_warehouse::PriceRecord;
use serde::{Deserialize, Serialize};
use time::PrimitiveDateTime;

use crate::domain::timestamp::serde_series_timestamp;
use crate::{AssetType, Symbol, ValidationError};

/// One normalized price point, independent of the upstream series layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalQuote {
    pub asset_type: AssetType,
    pub symbol: Symbol,
    #[serde(with = "serde_series_timestamp")]
    pub timestamp: PrimitiveDateTime,
    pub open: f64,
    pub close: f64,
    /// Absent for forex, which reports no volume.
    pub volume: Option<f64>,
}

impl CanonicalQuote {
    /// Reject non-finite or negative prices and volumes.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_amount("open", self.open)?;
        validate_amount("close", self.close)?;
        if let Some(volume) = self.volume {
            validate_amount("volume", volume)?;
        }
        Ok(())
    }

    pub fn into_price_record(self, load_timestamp: PrimitiveDateTime) -> PriceRecord {
        PriceRecord {
            timestamp: self.timestamp,
            symbol: self.symbol.into(),
            open_price: self.open,
            close_price: self.close,
            volume: self.volume,
            load_timestamp,
        }
    }
}

fn validate_amount(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::NonFiniteValue { field });
    }
    if value < 0.0 {
        return Err(ValidationError::NegativeValue { field });
    }
    Ok(())
}
