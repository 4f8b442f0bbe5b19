//! # Domain Models
//!
//! Canonical types shared by the adapter, the pipeline and the metrics engine.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`AssetType`] | Stock, crypto or forex |
//! | [`SeriesInterval`] | Daily or 5-minute bars |
//! | [`Symbol`] | Validated, uppercase instrument code |
//! | [`CanonicalQuote`] | One normalized price point |
//!
//! Construction validates symbols; quotes are validated by the pipeline
//! before they are persisted.

mod asset;
mod interval;
mod quote;
mod symbol;
pub mod timestamp;

pub use asset::AssetType;
pub use interval::SeriesInterval;
pub use quote::CanonicalQuote;
pub use symbol::Symbol;
