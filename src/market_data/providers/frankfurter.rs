//! Frankfurter FX rate source using ECB daily reference rates.
//!
//! Frankfurter quotes any directed pair from its `/latest` endpoint, so each
//! pair is asked for explicitly; reciprocals are never computed here.
//! No API key is required.

use anyhow::Result;
use chrono::Utc;
use reqwest::Client;
use serde_json::Value;

use super::{decimal_field, fetch_json};
use crate::fx::{ExchangeRate, FxRateSource};
use crate::models::Currency;

const FRANKFURTER_BASE_URL: &str = "https://api.frankfurter.app";

#[derive(Debug, Clone)]
pub struct FrankfurterRateSource {
    client: Client,
    base_url: String,
}

impl FrankfurterRateSource {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            base_url: FRANKFURTER_BASE_URL.to_string(),
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
}

impl Default for FrankfurterRateSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl FxRateSource for FrankfurterRateSource {
    async fn fetch_rate(&self, from: &Currency, to: &Currency) -> Result<Option<ExchangeRate>> {
        let url = format!("{}/latest", self.base_url);
        let request = self
            .client
            .get(&url)
            .query(&[("from", from.as_str()), ("to", to.as_str())]);
        let body = fetch_json(request, self.name()).await?;

        let rate = body
            .get("rates")
            .and_then(|rates| rates.get(to.as_str()))
            .and_then(|v| decimal_field(Some(v)));
        let Some(rate) = rate else {
            return Ok(None);
        };

        let mut exchange_rate = ExchangeRate::new(from.clone(), to.clone(), rate, self.name());
        exchange_rate.fetched_at = Some(Utc::now());
        if let Some(date) = body.get("date").and_then(Value::as_str) {
            tracing::debug!(from = %from, to = %to, date, "frankfurter reference date");
        }
        Ok(Some(exchange_rate))
    }

    fn name(&self) -> &str {
        "frankfurter"
    }
}
