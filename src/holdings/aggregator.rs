//! Grouping of lots into per-symbol holdings with weighted-average cost.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::{AssetType, Currency, Lot, Symbol};

/// Internal consistency failures. Lot validation makes these unreachable in
/// practice; they are reported instead of dividing by zero.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HoldingError {
    #[error("Holding {0} has zero total quantity")]
    ZeroQuantity(Symbol),
}

/// Optional pre-filter applied to lots before aggregation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LotFilter {
    pub symbol: Option<Symbol>,
    pub asset_type: Option<AssetType>,
    pub platform: Option<String>,
    /// Case-insensitive substring match on symbol, platform and notes.
    pub search: Option<String>,
}

impl LotFilter {
    pub fn matches(&self, lot: &Lot) -> bool {
        if let Some(symbol) = &self.symbol {
            if &lot.symbol != symbol {
                return false;
            }
        }
        if let Some(asset_type) = self.asset_type {
            if lot.asset_type != asset_type {
                return false;
            }
        }
        if let Some(platform) = &self.platform {
            if !lot.platform.eq_ignore_ascii_case(platform.trim()) {
                return false;
            }
        }
        if let Some(search) = &self.search {
            let needle = search.trim().to_lowercase();
            if !needle.is_empty() {
                let haystacks = [
                    Some(lot.symbol.as_str()),
                    Some(lot.platform.as_str()),
                    lot.notes.as_deref(),
                ];
                let hit = haystacks
                    .iter()
                    .flatten()
                    .any(|h| h.to_lowercase().contains(&needle));
                if !hit {
                    return false;
                }
            }
        }
        true
    }
}

/// Quantity and cost of a holding's lots bought in one currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrencyCost {
    pub currency: Currency,
    pub quantity: Decimal,
    /// Sum of quantity * purchase price, in `currency`.
    pub cost: Decimal,
    /// `cost / quantity`.
    pub average_cost: Decimal,
    pub lot_count: usize,
}

/// All lots of one symbol for one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub symbol: Symbol,
    pub asset_type: AssetType,
    pub precision: u32,
    pub total_quantity: Decimal,
    /// Per purchase currency, in order of first appearance.
    pub costs: Vec<CurrencyCost>,
    /// Majority purchase currency (ties go to the first seen). Display only.
    pub primary_currency: Currency,
    pub mixed_currency: bool,
    pub lots: Vec<Lot>,
}

impl Holding {
    /// Cost breakdown for the primary currency.
    pub fn primary_cost(&self) -> &CurrencyCost {
        self.costs
            .iter()
            .find(|c| c.currency == self.primary_currency)
            .unwrap_or(&self.costs[0])
    }

    /// Weighted-average cost in the primary currency.
    pub fn average_cost(&self) -> Decimal {
        self.primary_cost().average_cost
    }

    /// Cost breakdown when every lot shares one currency.
    pub fn single_currency(&self) -> Option<&CurrencyCost> {
        if self.mixed_currency {
            None
        } else {
            self.costs.first()
        }
    }

    pub fn cost_in(&self, currency: &Currency) -> Option<&CurrencyCost> {
        self.costs.iter().find(|c| &c.currency == currency)
    }

    /// Quantity rounded to the asset's precision, for rendering.
    pub fn display_quantity(&self) -> Decimal {
        self.total_quantity.round_dp(self.precision)
    }
}

/// Group `lots` by symbol into holdings sorted by symbol.
pub fn aggregate(lots: &[Lot], filter: &LotFilter) -> Result<Vec<Holding>, HoldingError> {
    let mut groups: BTreeMap<&Symbol, Vec<&Lot>> = BTreeMap::new();
    for lot in lots.iter().filter(|l| filter.matches(l)) {
        groups.entry(&lot.symbol).or_default().push(lot);
    }

    groups
        .into_iter()
        .map(|(symbol, group)| build_holding(symbol, &group))
        .collect()
}

fn build_holding(symbol: &Symbol, lots: &[&Lot]) -> Result<Holding, HoldingError> {
    let mut costs: Vec<CurrencyCost> = Vec::new();
    let mut total_quantity = Decimal::ZERO;

    for lot in lots {
        total_quantity += lot.quantity;
        match costs.iter_mut().find(|c| c.currency == lot.currency) {
            Some(entry) => {
                entry.quantity += lot.quantity;
                entry.cost += lot.cost();
                entry.lot_count += 1;
            }
            None => costs.push(CurrencyCost {
                currency: lot.currency.clone(),
                quantity: lot.quantity,
                cost: lot.cost(),
                average_cost: Decimal::ZERO,
                lot_count: 1,
            }),
        }
    }

    if total_quantity.is_zero() || costs.is_empty() {
        return Err(HoldingError::ZeroQuantity(symbol.clone()));
    }
    for entry in &mut costs {
        if entry.quantity.is_zero() {
            return Err(HoldingError::ZeroQuantity(symbol.clone()));
        }
        entry.average_cost = entry.cost / entry.quantity;
    }

    // max_by_key returns the last maximum; iterate in reverse so ties go to the first seen.
    let primary_currency = costs
        .iter()
        .rev()
        .max_by_key(|c| c.lot_count)
        .map(|c| c.currency.clone())
        .unwrap_or_else(|| costs[0].currency.clone());

    let first = lots[0];
    Ok(Holding {
        symbol: symbol.clone(),
        asset_type: first.asset_type,
        precision: lots.iter().map(|l| l.precision).max().unwrap_or(first.precision),
        total_quantity,
        mixed_currency: costs.len() > 1,
        costs,
        primary_currency,
        lots: lots.iter().map(|l| (*l).clone()).collect(),
    })
}
