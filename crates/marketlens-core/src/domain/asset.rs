use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Asset class of a catalog entry; selects the upstream series layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetType {
    Stock,
    Crypto,
    Forex,
}

impl AssetType {
    pub const ALL: [Self; 3] = [Self::Stock, Self::Crypto, Self::Forex];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stock => "stock",
            Self::Crypto => "crypto",
            Self::Forex => "forex",
        }
    }
}

impl Display for AssetType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssetType {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "stock" | "stocks" => Ok(Self::Stock),
            "crypto" => Ok(Self::Crypto),
            "forex" | "fx" => Ok(Self::Forex),
            _ => Err(ValidationError::InvalidAssetType {
                value: value.to_owned(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_catalog_spellings() {
        assert_eq!("stocks".parse::<AssetType>(), Ok(AssetType::Stock));
        assert_eq!("Crypto".parse::<AssetType>(), Ok(AssetType::Crypto));
        assert_eq!("fx".parse::<AssetType>(), Ok(AssetType::Forex));
        assert!("bond".parse::<AssetType>().is_err());
    }

    #[test]
    fn serializes_as_snake_case() {
        let encoded = serde_json::to_string(&AssetType::Forex).expect("serialize");
        assert_eq!(encoded, "\"forex\"");
    }
}
