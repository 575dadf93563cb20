//! EODHD (End of Day Historical Data) equity price provider.
//!
//! Uses the live `/real-time/{first}` endpoint; extra tickers go in the `s`
//! parameter. EODHD tickers carry an exchange suffix (`AAPL.US`, `VOD.LSE`).
//! Plain symbols are sent with `.US`. The response is a single object for
//! one ticker and an array otherwise; unknown tickers report `"NA"` fields.
//! The endpoint carries no currency, so it is derived from the exchange
//! suffix. Tickers on exchanges with no known currency are not quoted.

use std::collections::HashMap;

use anyhow::Result;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::debug;

use super::{decimal_field, fetch_json};
use crate::market_data::{PriceProvider, ProviderQuote};
use crate::models::{Currency, Symbol};

const EODHD_BASE_URL: &str = "https://eodhd.com/api";

/// Trading currency of an EODHD exchange code.
fn exchange_currency(exchange: &str) -> Option<Currency> {
    let code = match exchange {
        "US" => "USD",
        "TO" | "V" => "CAD",
        "XETRA" | "F" | "PA" | "AS" | "BR" | "MI" | "MC" => "EUR",
        "SW" => "CHF",
        "AU" => "AUD",
        _ => return None,
    };
    Currency::parse(code).ok()
}

pub struct EodhdProvider {
    api_key: SecretString,
    client: Client,
    base_url: String,
}

impl EodhdProvider {
    pub fn new(api_key: SecretString) -> Self {
        Self {
            api_key,
            client: Client::new(),
            base_url: EODHD_BASE_URL.to_string(),
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

    /// EODHD ticker for a symbol; symbols that already name an exchange pass through.
    fn ticker(symbol: &Symbol) -> String {
        if symbol.as_str().contains('.') {
            symbol.as_str().to_string()
        } else {
            format!("{}.US", symbol.as_str())
        }
    }

    fn parse_quotes(body: &Value, tickers: &HashMap<String, Symbol>) -> Vec<ProviderQuote> {
        let entries: Vec<&Value> = match body {
            Value::Array(items) => items.iter().collect(),
            Value::Object(_) => vec![body],
            _ => Vec::new(),
        };

        entries
            .into_iter()
            .filter_map(|entry| {
                let code = entry.get("code").and_then(Value::as_str)?.to_uppercase();
                let symbol = tickers.get(&code)?;
                let exchange = code.rsplit_once('.').map_or("US", |(_, exchange)| exchange);
                let Some(currency) = exchange_currency(exchange) else {
                    debug!(symbol = %symbol, exchange, "eodhd exchange currency unknown; skipping quote");
                    return None;
                };
                Some(ProviderQuote {
                    symbol: symbol.clone(),
                    price: decimal_field(entry.get("close"))?,
                    currency,
                    change_24h_pct: decimal_field(entry.get("change_p")),
                })
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl PriceProvider for EodhdProvider {
    async fn fetch_quotes(&self, symbols: &[Symbol]) -> Result<Vec<ProviderQuote>> {
        let tickers: Vec<(String, Symbol)> = symbols
            .iter()
            .map(|symbol| (Self::ticker(symbol), symbol.clone()))
            .collect();
        let Some(((first, _), rest)) = tickers.split_first() else {
            return Ok(Vec::new());
        };

        let url = format!("{}/real-time/{}", self.base_url, first);
        let mut query: Vec<(&str, String)> = vec![
            ("api_token", self.api_key.expose_secret().to_string()),
            ("fmt", "json".to_string()),
        ];
        if !rest.is_empty() {
            let others = rest
                .iter()
                .map(|(ticker, _)| ticker.as_str())
                .collect::<Vec<_>>()
                .join(",");
            query.push(("s", others));
        }

        let request = self.client.get(&url).query(&query);
        let body = fetch_json(request, self.name()).await?;
        let by_ticker: HashMap<String, Symbol> = tickers.into_iter().collect();
        Ok(Self::parse_quotes(&body, &by_ticker))
    }

    fn name(&self) -> &str {
        "eodhd"
    }
}
