use anyhow::Result;
use tracing::{debug, warn};

use super::{ExchangeRate, RateTable};
use crate::models::Currency;

/// Upstream source of current exchange rates.
#[async_trait::async_trait]
pub trait FxRateSource: Send + Sync {
    /// Latest directed rate `from->to`, or `None` if the source does not quote the pair.
    async fn fetch_rate(&self, from: &Currency, to: &Currency) -> Result<Option<ExchangeRate>>;

    fn name(&self) -> &str;
}

/// Fill `table` with every pair in `pairs` it does not already hold.
///
/// Source failures are logged and leave the pair missing; the converter then
/// flags any amount that needed it.
pub async fn fill_missing_rates(
    table: &mut RateTable,
    pairs: &[(Currency, Currency)],
    source: &dyn FxRateSource,
) {
    for (from, to) in pairs {
        if from == to || table.contains(from, to) {
            continue;
        }
        match source.fetch_rate(from, to).await {
            Ok(Some(rate)) => {
                debug!(from = %from, to = %to, rate = %rate.rate, source = source.name(), "exchange rate fetched");
                if let Err(e) = table.insert(rate) {
                    warn!(from = %from, to = %to, error = %e, "discarding invalid exchange rate");
                }
            }
            Ok(None) => {
                warn!(from = %from, to = %to, source = source.name(), "exchange rate not quoted by source");
            }
            Err(e) => {
                warn!(from = %from, to = %to, source = source.name(), error = %e, "exchange rate fetch failed");
            }
        }
    }
}
