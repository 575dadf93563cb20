use std::fmt;

use serde::{Deserialize, Serialize};

use super::Symbol;

/// Kind of asset a lot was bought in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetType {
    Crypto,
    Stock,
    Etf,
    /// User-defined asset outside the catalog; priced manually.
    Custom,
}

impl AssetType {
    /// Quantity precision used when the catalog has no explicit value.
    ///
    /// Custom assets take the configured default instead.
    pub fn default_precision(self, custom_precision: u32) -> u32 {
        match self {
            AssetType::Crypto => 6,
            AssetType::Stock | AssetType::Etf => 2,
            AssetType::Custom => custom_precision,
        }
    }

    pub fn is_custom(self) -> bool {
        matches!(self, AssetType::Custom)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AssetType::Crypto => "crypto",
            AssetType::Stock => "stock",
            AssetType::Etf => "etf",
            AssetType::Custom => "custom",
        }
    }
}

impl fmt::Display for AssetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AssetType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "crypto" => Ok(AssetType::Crypto),
            "stock" => Ok(AssetType::Stock),
            "etf" => Ok(AssetType::Etf),
            "custom" => Ok(AssetType::Custom),
            other => anyhow::bail!("Unknown asset type: {other}"),
        }
    }
}

/// Catalog entry describing a tradable (or user-defined) asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetDefinition {
    pub symbol: Symbol,
    pub name: String,
    pub asset_type: AssetType,
    /// Number of decimal places allowed for quantities of this asset.
    pub precision: u32,
    #[serde(default = "default_available")]
    pub available: bool,
}

fn default_available() -> bool {
    true
}

impl AssetDefinition {
    pub fn new(
        symbol: impl Into<Symbol>,
        name: impl Into<String>,
        asset_type: AssetType,
        precision: u32,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            name: name.into(),
            asset_type,
            precision,
            available: true,
        }
    }

    pub fn crypto(symbol: impl Into<Symbol>, name: impl Into<String>) -> Self {
        Self::new(symbol, name, AssetType::Crypto, 6)
    }

    pub fn stock(symbol: impl Into<Symbol>, name: impl Into<String>) -> Self {
        Self::new(symbol, name, AssetType::Stock, 2)
    }

    pub fn etf(symbol: impl Into<Symbol>, name: impl Into<String>) -> Self {
        Self::new(symbol, name, AssetType::Etf, 2)
    }

    pub fn custom(symbol: impl Into<Symbol>, name: impl Into<String>, precision: u32) -> Self {
        Self::new(symbol, name, AssetType::Custom, precision)
    }
}
