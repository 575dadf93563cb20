use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::{Currency, CurrencyError};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FxError {
    #[error("Exchange rate {from}->{to} must be positive (got {rate})")]
    NonPositiveRate {
        from: Currency,
        to: Currency,
        rate: Decimal,
    },
    #[error("Malformed currency pair {0:?}: expected \"FROM/TO\"")]
    MalformedPair(String),
    #[error("Invalid rate value {0:?}")]
    InvalidRate(String),
    #[error(transparent)]
    Currency(#[from] CurrencyError),
}

/// Directed rate: one unit of `from` is worth `rate` units of `to`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeRate {
    pub from: Currency,
    pub to: Currency,
    pub rate: Decimal,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fetched_at: Option<DateTime<Utc>>,
}

impl ExchangeRate {
    pub fn new(from: Currency, to: Currency, rate: Decimal, source: impl Into<String>) -> Self {
        Self {
            from,
            to,
            rate,
            source: source.into(),
            fetched_at: None,
        }
    }
}

/// Directed exchange rates valid for one valuation.
///
/// `A->B` and `B->A` are independent entries; an inverse is never derived.
#[derive(Debug, Clone, Default)]
pub struct RateTable {
    rates: HashMap<(Currency, Currency), ExchangeRate>,
}

impl RateTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `"FROM/TO" = "rate"` entries from configuration.
    pub fn from_static(entries: &BTreeMap<String, String>) -> Result<Self, FxError> {
        let mut table = Self::new();
        for (pair, value) in entries {
            let (from, to) = pair
                .split_once('/')
                .ok_or_else(|| FxError::MalformedPair(pair.clone()))?;
            let from = Currency::parse(from)?;
            let to = Currency::parse(to)?;
            let rate = Decimal::from_str(value.trim())
                .map_err(|_| FxError::InvalidRate(value.clone()))?;
            table.insert(ExchangeRate::new(from, to, rate, "config"))?;
        }
        Ok(table)
    }

    /// Insert or replace the rate for `rate.from -> rate.to`.
    pub fn insert(&mut self, rate: ExchangeRate) -> Result<(), FxError> {
        if rate.rate <= Decimal::ZERO {
            return Err(FxError::NonPositiveRate {
                from: rate.from,
                to: rate.to,
                rate: rate.rate,
            });
        }
        self.rates
            .insert((rate.from.clone(), rate.to.clone()), rate);
        Ok(())
    }

    pub fn get(&self, from: &Currency, to: &Currency) -> Option<&ExchangeRate> {
        self.rates.get(&(from.clone(), to.clone()))
    }

    pub fn rate(&self, from: &Currency, to: &Currency) -> Option<Decimal> {
        self.get(from, to).map(|r| r.rate)
    }

    pub fn contains(&self, from: &Currency, to: &Currency) -> bool {
        self.rates.contains_key(&(from.clone(), to.clone()))
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExchangeRate> {
        self.rates.values()
    }
}
