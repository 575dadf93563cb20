use anyhow::Result;

use super::ProviderQuote;
use crate::models::{ManualPrice, Symbol};

/// Upstream quote provider serving one asset class through a batch endpoint.
#[async_trait::async_trait]
pub trait PriceProvider: Send + Sync {
    /// Current price and 24h change for as many of `symbols` as the provider knows.
    ///
    /// Symbols the provider does not quote are simply absent from the result;
    /// an `Err` fails the whole call.
    async fn fetch_quotes(&self, symbols: &[Symbol]) -> Result<Vec<ProviderQuote>>;

    fn name(&self) -> &str;
}

/// Read access to manually entered prices for custom assets.
#[async_trait::async_trait]
pub trait ManualPriceSource: Send + Sync {
    async fn latest_manual_price(&self, symbol: &Symbol) -> Result<Option<ManualPrice>>;
}
