#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use lotfolio::fx::{ExchangeRate, FxRateSource};
use lotfolio::market_data::{PriceProvider, ProviderQuote};
use lotfolio::models::{Currency, NewLot, Symbol};
use rust_decimal::Decimal;

pub fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn lot(symbol: &str, quantity: Decimal, price: Decimal, currency: &str) -> NewLot {
    NewLot {
        symbol: Symbol::new(symbol),
        quantity,
        purchase_price: price,
        currency: currency.to_string(),
        purchase_date: date(2024, 1, 15),
        platform: "broker".to_string(),
        notes: None,
    }
}

/// Scripted quote provider that counts calls and can fail or stall.
#[derive(Clone)]
pub struct MockProvider {
    name: String,
    prices: Arc<Mutex<HashMap<Symbol, Decimal>>>,
    calls: Arc<AtomicUsize>,
    requested: Arc<Mutex<Vec<Vec<Symbol>>>>,
    currency: Currency,
    delay: Option<Duration>,
    failing: Arc<Mutex<bool>>,
}

impl MockProvider {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            prices: Arc::new(Mutex::new(HashMap::new())),
            calls: Arc::new(AtomicUsize::new(0)),
            requested: Arc::new(Mutex::new(Vec::new())),
            currency: Currency::usd(),
            delay: None,
            failing: Arc::new(Mutex::new(false)),
        }
    }

    pub fn with_price(self, symbol: &str, price: Decimal) -> Self {
        self.set_price(symbol, price);
        self
    }

    pub fn with_currency(mut self, currency: &str) -> Self {
        self.currency = Currency::parse(currency).unwrap();
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn failing(self) -> Self {
        self.set_failing(true);
        self
    }

    pub fn set_price(&self, symbol: &str, price: Decimal) {
        self.prices.lock().unwrap().insert(Symbol::new(symbol), price);
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap() = failing;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requested(&self) -> Vec<Vec<Symbol>> {
        self.requested.lock().unwrap().clone()
    }

    pub fn arc(&self) -> Arc<dyn PriceProvider> {
        Arc::new(self.clone())
    }
}

#[async_trait]
impl PriceProvider for MockProvider {
    async fn fetch_quotes(&self, symbols: &[Symbol]) -> Result<Vec<ProviderQuote>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requested.lock().unwrap().push(symbols.to_vec());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if *self.failing.lock().unwrap() {
            anyhow::bail!("{} unavailable", self.name);
        }

        let prices = self.prices.lock().unwrap();
        Ok(symbols
            .iter()
            .filter_map(|s| {
                prices.get(s).map(|price| ProviderQuote {
                    symbol: s.clone(),
                    price: *price,
                    currency: self.currency.clone(),
                    change_24h_pct: None,
                })
            })
            .collect())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// FX source with a fixed set of directed rates.
pub struct StaticFxSource {
    rates: HashMap<(Currency, Currency), Decimal>,
    pub calls: AtomicUsize,
}

impl StaticFxSource {
    pub fn new(rates: &[(&str, &str, Decimal)]) -> Self {
        Self {
            rates: rates
                .iter()
                .map(|(from, to, rate)| {
                    (
                        (Currency::parse(from).unwrap(), Currency::parse(to).unwrap()),
                        *rate,
                    )
                })
                .collect(),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl FxRateSource for StaticFxSource {
    async fn fetch_rate(&self, from: &Currency, to: &Currency) -> Result<Option<ExchangeRate>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .rates
            .get(&(from.clone(), to.clone()))
            .map(|rate| ExchangeRate::new(from.clone(), to.clone(), *rate, "static")))
    }

    fn name(&self) -> &str {
        "static"
    }
}
