use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::{AssetType, Currency, Known, Symbol};

/// Provider family an asset is priced by. Stocks and ETFs share providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceClass {
    Crypto,
    Equity,
}

impl PriceClass {
    /// `None` for custom assets, which are never sent to providers.
    pub fn for_asset(asset_type: AssetType) -> Option<Self> {
        match asset_type {
            AssetType::Crypto => Some(PriceClass::Crypto),
            AssetType::Stock | AssetType::Etf => Some(PriceClass::Equity),
            AssetType::Custom => None,
        }
    }
}

/// One symbol to resolve.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PriceRequest {
    pub symbol: Symbol,
    pub asset_type: AssetType,
}

impl PriceRequest {
    pub fn new(symbol: impl Into<Symbol>, asset_type: AssetType) -> Self {
        Self {
            symbol: symbol.into(),
            asset_type,
        }
    }
}

/// Quote as returned by a provider, before the resolver stamps it.
///
/// `currency` is the currency the provider actually priced in.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderQuote {
    pub symbol: Symbol,
    pub price: Decimal,
    pub currency: Currency,
    pub change_24h_pct: Option<Decimal>,
}

/// Cached price observation, shared across users.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub symbol: Symbol,
    pub price: Decimal,
    pub currency: Currency,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_24h_pct: Option<Decimal>,
    pub source: String,
    pub fetched_at: DateTime<Utc>,
}

/// Stages of the price waterfall, tried in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceTier {
    Primary,
    Secondary,
    CachedStale,
    Manual,
    Unavailable,
}

impl PriceTier {
    /// Ordered tiers for an asset type.
    pub fn waterfall(asset_type: AssetType) -> &'static [PriceTier] {
        const MARKET: &[PriceTier] = &[
            PriceTier::Primary,
            PriceTier::Secondary,
            PriceTier::CachedStale,
            PriceTier::Unavailable,
        ];
        const CUSTOM: &[PriceTier] = &[PriceTier::Manual, PriceTier::Unavailable];

        if asset_type.is_custom() {
            CUSTOM
        } else {
            MARKET
        }
    }
}

/// Where a resolved quote came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Cached quote still inside its freshness TTL.
    Cache,
    Primary,
    Secondary,
    /// Cached quote past its TTL, used because every provider failed.
    CachedStale,
    Manual,
}

/// Outcome of resolving one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ResolvedPrice {
    Quoted {
        quote: PriceQuote,
        provenance: Provenance,
    },
    Unavailable,
}

impl ResolvedPrice {
    pub fn quote(&self) -> Option<&PriceQuote> {
        match self {
            ResolvedPrice::Quoted { quote, .. } => Some(quote),
            ResolvedPrice::Unavailable => None,
        }
    }

    pub fn provenance(&self) -> Option<Provenance> {
        match self {
            ResolvedPrice::Quoted { provenance, .. } => Some(*provenance),
            ResolvedPrice::Unavailable => None,
        }
    }

    pub fn price(&self) -> Known<Decimal> {
        self.quote().map(|q| q.price).into()
    }

    pub fn is_stale(&self) -> bool {
        self.provenance() == Some(Provenance::CachedStale)
    }

    /// Source label for rendering; stale replays carry a `(cached)` marker.
    pub fn display_source(&self) -> Option<String> {
        match self {
            ResolvedPrice::Quoted {
                quote,
                provenance: Provenance::CachedStale,
            } => Some(format!("{} (cached)", quote.source)),
            ResolvedPrice::Quoted { quote, .. } => Some(quote.source.clone()),
            ResolvedPrice::Unavailable => None,
        }
    }
}
