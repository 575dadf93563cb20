//! CryptoCompare crypto price provider.
//!
//! Uses `/data/pricemultifull`, which returns price and 24h change for many
//! tickers in one request.
//! Docs: https://min-api.cryptocompare.com/

use anyhow::Result;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;

use super::{decimal_field, fetch_json};
use crate::market_data::{PriceProvider, ProviderQuote};
use crate::models::{Currency, Symbol};

const CRYPTOCOMPARE_API_BASE: &str = "https://min-api.cryptocompare.com";

pub struct CryptoCompareProvider {
    client: Client,
    base_url: String,
    api_key: Option<SecretString>,
    quote_currency: Currency,
}

impl CryptoCompareProvider {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            base_url: CRYPTOCOMPARE_API_BASE.to_string(),
            api_key: None,
            quote_currency: Currency::usd(),
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

    pub fn with_api_key(mut self, api_key: SecretString) -> Self {
        self.api_key = Some(api_key);
        self
    }

    pub fn with_quote_currency(mut self, currency: Currency) -> Self {
        self.quote_currency = currency;
        self
    }

    fn parse_quotes(&self, body: &Value, symbols: &[Symbol]) -> Result<Vec<ProviderQuote>> {
        if body.get("Response").and_then(Value::as_str) == Some("Error") {
            let message = body
                .get("Message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            anyhow::bail!("CryptoCompare API error: {message}");
        }

        let Some(raw) = body.get("RAW") else {
            return Ok(Vec::new());
        };

        let quotes = symbols
            .iter()
            .filter_map(|symbol| {
                let entry = raw.get(symbol.as_str())?.get(self.quote_currency.as_str())?;
                Some(ProviderQuote {
                    symbol: symbol.clone(),
                    price: decimal_field(entry.get("PRICE"))?,
                    currency: self.quote_currency.clone(),
                    change_24h_pct: decimal_field(entry.get("CHANGEPCT24HOUR")),
                })
            })
            .collect();
        Ok(quotes)
    }
}

impl Default for CryptoCompareProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl PriceProvider for CryptoCompareProvider {
    async fn fetch_quotes(&self, symbols: &[Symbol]) -> Result<Vec<ProviderQuote>> {
        if symbols.is_empty() {
            return Ok(Vec::new());
        }

        let fsyms = symbols
            .iter()
            .map(Symbol::as_str)
            .collect::<Vec<_>>()
            .join(",");
        let url = format!("{}/data/pricemultifull", self.base_url);
        let mut request = self
            .client
            .get(&url)
            .query(&[("fsyms", fsyms.as_str()), ("tsyms", self.quote_currency.as_str())]);
        if let Some(key) = &self.api_key {
            request = request.header("authorization", format!("Apikey {}", key.expose_secret()));
        }

        let body = fetch_json(request, self.name()).await?;
        self.parse_quotes(&body, symbols)
    }

    fn name(&self) -> &str {
        "cryptocompare"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_fetch_quotes_reads_raw_section() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data/pricemultifull"))
            .and(query_param("fsyms", "BTC,SOL"))
            .and(query_param("tsyms", "USD"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{
                    "RAW": {"BTC": {"USD": {"PRICE": 59950.1, "CHANGEPCT24HOUR": 2.5}}},
                    "DISPLAY": {"BTC": {"USD": {"PRICE": "$ 59,950.1"}}}
                }"#,
            ))
            .expect(1)
            .mount(&server)
            .await;

        let provider = CryptoCompareProvider::new().with_base_url(server.uri());
        let quotes = provider
            .fetch_quotes(&[Symbol::new("BTC"), Symbol::new("SOL")])
            .await
            .unwrap();

        assert_eq!(quotes.len(), 1);
        assert_eq!(quotes[0].symbol, Symbol::new("BTC"));
        assert_eq!(quotes[0].price, dec!(59950.1));
        assert_eq!(quotes[0].change_24h_pct, Some(dec!(2.5)));
    }

    #[tokio::test]
    async fn test_error_payload_fails_the_call() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data/pricemultifull"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"Response": "Error", "Message": "You are over your rate limit"}"#,
            ))
            .mount(&server)
            .await;

        let provider = CryptoCompareProvider::new().with_base_url(server.uri());
        let err = provider.fetch_quotes(&[Symbol::new("BTC")]).await.unwrap_err();
        assert!(err.to_string().contains("rate limit"));
    }
}
