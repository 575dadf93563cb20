//! Twelve Data equity price provider.
//!
//! Uses the `/quote` endpoint with a comma-separated symbol list. A single
//! symbol answers with one quote object; several symbols answer with an
//! object keyed by symbol, where individual entries may be error objects.
//! Each quote carries the listing's trading currency; entries without one
//! are taken to be USD.

use anyhow::Result;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::{debug, warn};

use super::{decimal_field, fetch_json};
use crate::market_data::{PriceProvider, ProviderQuote};
use crate::models::{Currency, Symbol};

const BASE_URL: &str = "https://api.twelvedata.com";

pub struct TwelveDataProvider {
    api_key: SecretString,
    client: Client,
    base_url: String,
}

impl TwelveDataProvider {
    pub fn new(api_key: SecretString) -> Self {
        Self {
            api_key,
            client: Client::new(),
            base_url: BASE_URL.to_string(),
        }
    }

    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn is_error(value: &Value) -> bool {
        value.get("status").and_then(Value::as_str) == Some("error")
    }

    fn parse_entry(symbol: &Symbol, entry: &Value) -> Option<ProviderQuote> {
        if Self::is_error(entry) {
            let message = entry.get("message").and_then(Value::as_str).unwrap_or_default();
            debug!(symbol = %symbol, message, "twelve data has no quote for symbol");
            return None;
        }
        let currency = match entry.get("currency").and_then(Value::as_str) {
            None => Currency::usd(),
            Some(code) => match Currency::parse(code) {
                Ok(currency) => currency,
                Err(e) => {
                    warn!(symbol = %symbol, error = %e, "twelve data quote has unusable currency");
                    return None;
                }
            },
        };
        Some(ProviderQuote {
            symbol: symbol.clone(),
            price: decimal_field(entry.get("close"))?,
            currency,
            change_24h_pct: decimal_field(entry.get("percent_change")),
        })
    }

    fn parse_quotes(body: &Value, symbols: &[Symbol]) -> Result<Vec<ProviderQuote>> {
        if let [symbol] = symbols {
            if Self::is_error(body) {
                let message = body.get("message").and_then(Value::as_str).unwrap_or_default();
                // 404-style "symbol not found" is a miss, anything else fails the call.
                if body.get("code").and_then(Value::as_u64) == Some(404) {
                    return Ok(Vec::new());
                }
                anyhow::bail!("Twelve Data API error: {message}");
            }
            return Ok(Self::parse_entry(symbol, body).into_iter().collect());
        }

        if Self::is_error(body) {
            let message = body.get("message").and_then(Value::as_str).unwrap_or_default();
            anyhow::bail!("Twelve Data API error: {message}");
        }

        Ok(symbols
            .iter()
            .filter_map(|symbol| Self::parse_entry(symbol, body.get(symbol.as_str())?))
            .collect())
    }
}

#[async_trait::async_trait]
impl PriceProvider for TwelveDataProvider {
    async fn fetch_quotes(&self, symbols: &[Symbol]) -> Result<Vec<ProviderQuote>> {
        if symbols.is_empty() {
            return Ok(Vec::new());
        }

        let joined = symbols
            .iter()
            .map(Symbol::as_str)
            .collect::<Vec<_>>()
            .join(",");
        let url = format!("{}/quote", self.base_url);
        let request = self.client.get(&url).query(&[
            ("symbol", joined.as_str()),
            ("apikey", self.api_key.expose_secret()),
        ]);

        let body = fetch_json(request, self.name()).await?;
        Self::parse_quotes(&body, symbols)
    }

    fn name(&self) -> &str {
        "twelve_data"
    }
}
