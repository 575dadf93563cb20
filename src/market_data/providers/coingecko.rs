//! CoinGecko crypto price provider.
//!
//! Uses the `/simple/price` endpoint, which quotes any number of coins in one
//! request. CoinGecko identifies coins by id (`bitcoin`), not ticker, so
//! symbols are mapped before the call and back again on the way out.

use std::collections::HashMap;

use anyhow::Result;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;

use super::{decimal_field, fetch_json};
use crate::market_data::{PriceProvider, ProviderQuote};
use crate::models::{Currency, Symbol};

const COINGECKO_API_BASE: &str = "https://api.coingecko.com/api/v3";

pub struct CoinGeckoProvider {
    client: Client,
    base_url: String,
    api_key: Option<SecretString>,
    quote_currency: Currency,
    custom_mappings: HashMap<String, String>,
}

impl CoinGeckoProvider {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            base_url: COINGECKO_API_BASE.to_string(),
            api_key: None,
            quote_currency: Currency::usd(),
            custom_mappings: HashMap::new(),
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

    /// Demo or pro API key, sent as `x-cg-demo-api-key`.
    pub fn with_api_key(mut self, api_key: SecretString) -> Self {
        self.api_key = Some(api_key);
        self
    }

    pub fn with_quote_currency(mut self, currency: Currency) -> Self {
        self.quote_currency = currency;
        self
    }

    /// Quote currency as CoinGecko spells it in requests and responses, e.g. "usd".
    fn vs_currency(&self) -> String {
        self.quote_currency.as_str().to_lowercase()
    }

    /// Adds a single custom mapping from symbol to CoinGecko ID.
    pub fn with_mapping(mut self, symbol: impl AsRef<str>, coingecko_id: impl Into<String>) -> Self {
        self.custom_mappings
            .insert(symbol.as_ref().to_uppercase(), coingecko_id.into());
        self
    }

    /// Maps a ticker to a CoinGecko coin id, falling back to the lowercase ticker.
    fn coin_id(&self, symbol: &Symbol) -> String {
        if let Some(id) = self.custom_mappings.get(symbol.as_str()) {
            return id.clone();
        }

        let id = match symbol.as_str() {
            "BTC" => "bitcoin",
            "ETH" => "ethereum",
            "USDT" => "tether",
            "USDC" => "usd-coin",
            "BNB" => "binancecoin",
            "XRP" => "ripple",
            "ADA" => "cardano",
            "DOGE" => "dogecoin",
            "SOL" => "solana",
            "DOT" => "polkadot",
            "MATIC" | "POL" => "matic-network",
            "LTC" => "litecoin",
            "SHIB" => "shiba-inu",
            "TRX" => "tron",
            "AVAX" => "avalanche-2",
            "DAI" => "dai",
            "LINK" => "chainlink",
            "ATOM" => "cosmos",
            "UNI" => "uniswap",
            "ETC" => "ethereum-classic",
            "XLM" => "stellar",
            "BCH" => "bitcoin-cash",
            "ALGO" => "algorand",
            "NEAR" => "near",
            "ARB" => "arbitrum",
            "OP" => "optimism",
            "AAVE" => "aave",
            "XMR" => "monero",
            "WBTC" => "wrapped-bitcoin",
            "WETH" => "weth",
            "STETH" => "staked-ether",
            other => return other.to_lowercase(),
        };
        id.to_string()
    }

    fn parse_quotes(&self, body: &Value, ids: &HashMap<String, Vec<Symbol>>) -> Vec<ProviderQuote> {
        let vs_currency = self.vs_currency();
        let change_key = format!("{vs_currency}_24h_change");
        let mut quotes = Vec::new();

        for (coin_id, symbols) in ids {
            let Some(entry) = body.get(coin_id) else {
                continue;
            };
            let Some(price) = decimal_field(entry.get(&vs_currency)) else {
                continue;
            };
            let change = decimal_field(entry.get(&change_key));
            for symbol in symbols {
                quotes.push(ProviderQuote {
                    symbol: symbol.clone(),
                    price,
                    currency: self.quote_currency.clone(),
                    change_24h_pct: change,
                });
            }
        }

        quotes
    }
}

impl Default for CoinGeckoProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl PriceProvider for CoinGeckoProvider {
    async fn fetch_quotes(&self, symbols: &[Symbol]) -> Result<Vec<ProviderQuote>> {
        if symbols.is_empty() {
            return Ok(Vec::new());
        }

        // Several tickers can share one coin id (MATIC/POL).
        let mut ids: HashMap<String, Vec<Symbol>> = HashMap::new();
        for symbol in symbols {
            ids.entry(self.coin_id(symbol)).or_default().push(symbol.clone());
        }
        let mut id_list: Vec<&str> = ids.keys().map(String::as_str).collect();
        id_list.sort_unstable();

        let url = format!("{}/simple/price", self.base_url);
        let mut request = self.client.get(&url).query(&[
            ("ids", id_list.join(",")),
            ("vs_currencies", self.vs_currency()),
            ("include_24hr_change", "true".to_string()),
        ]);
        if let Some(key) = &self.api_key {
            request = request.header("x-cg-demo-api-key", key.expose_secret());
        }

        let body = fetch_json(request, self.name()).await?;
        Ok(self.parse_quotes(&body, &ids))
    }

    fn name(&self) -> &str {
        "coingecko"
    }
}
