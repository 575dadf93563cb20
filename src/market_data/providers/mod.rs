pub mod coingecko;
pub mod cryptocompare;
pub mod eodhd;
pub mod frankfurter;
pub mod twelve_data;

pub use coingecko::CoinGeckoProvider;
pub use cryptocompare::CryptoCompareProvider;
pub use eodhd::EodhdProvider;
pub use frankfurter::FrankfurterRateSource;
pub use twelve_data::TwelveDataProvider;

use std::str::FromStr;

use anyhow::{Context, Result};
use reqwest::RequestBuilder;
use rust_decimal::Decimal;
use serde_json::Value;

const USER_AGENT: &str = concat!("lotfolio/", env!("CARGO_PKG_VERSION"));

/// Send `request` and decode the body as JSON, failing on non-2xx statuses.
pub(crate) async fn fetch_json(request: RequestBuilder, provider: &str) -> Result<Value> {
    let response = request
        .header("Accept", "application/json")
        .header("User-Agent", USER_AGENT)
        .send()
        .await
        .with_context(|| format!("Failed to send request to {provider}"))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        anyhow::bail!("{provider} API error: status={status}, body={body}");
    }

    let body = response
        .text()
        .await
        .with_context(|| format!("Failed to read {provider} response body"))?;
    serde_json::from_str(&body).with_context(|| format!("Failed to parse {provider} response"))
}

/// Read a decimal that providers send either as a JSON number or a string.
///
/// Placeholders such as `"NA"` and `null` read as `None`.
pub(crate) fn decimal_field(value: Option<&Value>) -> Option<Decimal> {
    match value? {
        Value::Number(n) => Decimal::from_str(&n.to_string())
            .or_else(|_| Decimal::from_scientific(&n.to_string()))
            .ok(),
        Value::String(s) => Decimal::from_str(s.trim()).ok(),
        _ => None,
    }
}
