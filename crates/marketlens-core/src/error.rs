use thiserror::Error;

/// Validation and contract errors exposed by `marketlens-core`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("symbol cannot be empty")]
    EmptySymbol,
    #[error("symbol length {len} exceeds max {max}")]
    SymbolTooLong { len: usize, max: usize },
    #[error("symbol must start with an ASCII letter: '{ch}'")]
    SymbolInvalidStart { ch: char },
    #[error("symbol contains invalid character '{ch}' at index {index}")]
    SymbolInvalidChar { ch: char, index: usize },

    #[error("invalid asset type '{value}', expected one of stock, crypto, forex")]
    InvalidAssetType { value: String },

    #[error("invalid series interval '{value}', expected daily or 5min")]
    InvalidInterval { value: String },

    #[error("timestamp must be YYYY-MM-DD or YYYY-MM-DD HH:MM:SS: '{value}'")]
    InvalidTimestamp { value: String },
    #[error("date must be YYYY-MM-DD: '{value}'")]
    InvalidDate { value: String },

    #[error("field '{field}' must be finite")]
    NonFiniteValue { field: &'static str },
    #[error("field '{field}' must be non-negative")]
    NegativeValue { field: &'static str },

    #[error("series row for '{found}' does not belong to series '{expected}'")]
    ForeignSeriesRow { expected: String, found: String },
}

/// Top-level error type for read-side core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Warehouse(#[from] marketlens_warehouse::WarehouseError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
