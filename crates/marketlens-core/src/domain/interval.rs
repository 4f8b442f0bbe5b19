use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Bar spacing of an upstream series.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SeriesInterval {
    #[default]
    #[serde(rename = "daily")]
    Daily,
    #[serde(rename = "5min")]
    FiveMinutes,
}

impl SeriesInterval {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::FiveMinutes => "5min",
        }
    }
}

impl Display for SeriesInterval {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SeriesInterval {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "daily" | "1d" => Ok(Self::Daily),
            "5min" | "5m" => Ok(Self::FiveMinutes),
            _ => Err(ValidationError::InvalidInterval {
                value: value.to_owned(),
            }),
        }
    }
}
