//! Parsing and formatting for series timestamps.
//!
//! Daily series key points by trading date; those are stored as midnight.
//! Intraday keys (`YYYY-MM-DD HH:MM:SS`) are accepted as-is.

use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{Date, PrimitiveDateTime, Time};

use crate::ValidationError;

const DATE_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");
const DATETIME_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

/// Parse an upstream series key.
pub fn parse_series_timestamp(value: &str) -> Result<PrimitiveDateTime, ValidationError> {
    let trimmed = value.trim();
    if let Ok(parsed) = PrimitiveDateTime::parse(trimmed, DATETIME_FORMAT) {
        return Ok(parsed);
    }

    Date::parse(trimmed, DATE_FORMAT)
        .map(|date| PrimitiveDateTime::new(date, Time::MIDNIGHT))
        .map_err(|_| ValidationError::InvalidTimestamp {
            value: value.to_owned(),
        })
}

/// Parse a calendar date such as a backfill start or `--since` value.
pub fn parse_date(value: &str) -> Result<Date, ValidationError> {
    Date::parse(value.trim(), DATE_FORMAT).map_err(|_| ValidationError::InvalidDate {
        value: value.to_owned(),
    })
}

/// Format a timestamp, dropping the time part when it is midnight.
pub fn format_series_timestamp(value: PrimitiveDateTime) -> String {
    let formatted = if value.time() == Time::MIDNIGHT {
        value.date().format(DATE_FORMAT)
    } else {
        value.format(DATETIME_FORMAT)
    };
    formatted.unwrap_or_else(|_| value.to_string())
}

pub fn format_date(value: Date) -> String {
    value.format(DATE_FORMAT).unwrap_or_else(|_| value.to_string())
}

/// Serde adapter writing timestamps in the series key format.
pub mod serde_series_timestamp {
    use serde::{Deserialize, Deserializer, Serializer};
    use time::PrimitiveDateTime;

    pub fn serialize<S>(value: &PrimitiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&super::format_series_timestamp(*value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<PrimitiveDateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        super::parse_series_timestamp(&raw).map_err(serde::de::Error::custom)
    }
}

pub mod serde_series_timestamp_vec {
    use serde::ser::SerializeSeq;
    use serde::Serializer;
    use time::PrimitiveDateTime;

    pub fn serialize<S>(values: &[PrimitiveDateTime], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(values.len()))?;
        for value in values {
            seq.serialize_element(&super::format_series_timestamp(*value))?;
        }
        seq.end()
    }
}
