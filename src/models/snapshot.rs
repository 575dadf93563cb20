use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{AssetType, Currency, Id, Known, Symbol};

/// Denormalized copy of one holding at capture time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoldingSummary {
    pub symbol: Symbol,
    pub asset_type: AssetType,
    pub quantity: Decimal,
    pub average_cost: Decimal,
    pub average_cost_currency: Currency,
    pub price: Known<Decimal>,
    pub value: Known<Decimal>,
    pub cost_basis: Decimal,
    pub gain_loss: Known<Decimal>,
}

/// Point-in-time portfolio record; at most one per user and day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub id: Id,
    pub user_id: Id,
    pub snapshot_date: NaiveDate,
    pub currency: Currency,
    pub total_value: Decimal,
    pub total_cost_basis: Decimal,
    pub total_gain_loss: Decimal,
    #[serde(default)]
    pub value_by_asset_type: BTreeMap<AssetType, Decimal>,
    #[serde(default)]
    pub holdings: Vec<HoldingSummary>,
    pub captured_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    Inserted,
    /// An existing row for the same user and day was overwritten in place.
    Updated,
}

impl PortfolioSnapshot {
    /// Overwrite this row's figures with `newer`, keeping the row id.
    pub fn overwrite_with(&mut self, newer: PortfolioSnapshot) {
        let id = self.id.clone();
        *self = PortfolioSnapshot { id, ..newer };
    }
}
