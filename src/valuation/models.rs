use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::market_data::Provenance;
use crate::models::{AssetType, Currency, Known, Symbol};

/// A directed currency pair that had no rate during a valuation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MissingRate {
    pub from: Currency,
    pub to: Currency,
}

/// Figures in the holding's own purchase currency, for single-currency holdings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OriginalCurrencyView {
    pub currency: Currency,
    pub average_cost: Decimal,
    pub cost_basis: Decimal,
    pub current_value: Known<Decimal>,
    pub gain_loss: Known<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoldingValuation {
    pub symbol: Symbol,
    pub asset_type: AssetType,
    pub quantity: Decimal,
    /// Weighted-average cost in `average_cost_currency`.
    pub average_cost: Decimal,
    pub average_cost_currency: Currency,
    pub mixed_currency: bool,
    pub lot_count: usize,

    /// Unit price in `price_currency`.
    pub price: Known<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_currency: Option<Currency>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provenance: Option<Provenance>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change_24h_pct: Option<Decimal>,

    /// Market value in the display currency.
    pub current_value: Known<Decimal>,
    /// Sum of every lot's cost converted individually to the display currency.
    pub cost_basis: Decimal,
    pub gain_loss: Known<Decimal>,
    pub gain_loss_pct: Known<Decimal>,

    /// False when any amount behind this holding was passed through
    /// without an exchange rate.
    pub currency_consistent: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub original: Option<OriginalCurrencyView>,
}

impl HoldingValuation {
    pub fn is_valued(&self) -> bool {
        self.current_value.is_known()
    }
}

/// Share of the valued portfolio held in one asset type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationSlice {
    pub asset_type: AssetType,
    pub value: Decimal,
    pub percent: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioValuation {
    pub currency: Currency,
    pub holdings: Vec<HoldingValuation>,
    /// Sum of known holding values.
    pub total_value: Decimal,
    /// Cost basis over every holding, priced or not.
    pub total_cost_basis: Decimal,
    /// Cost basis over holdings with a known value; the gain/loss denominator.
    pub valued_cost_basis: Decimal,
    pub total_gain_loss: Decimal,
    pub total_gain_loss_pct: Decimal,
    pub allocation: Vec<AllocationSlice>,
    pub unpriced: Vec<Symbol>,
    pub missing_rates: Vec<MissingRate>,
}

impl PortfolioValuation {
    pub fn holding(&self, symbol: &Symbol) -> Option<&HoldingValuation> {
        self.holdings.iter().find(|h| &h.symbol == symbol)
    }

    /// Total value per asset type, for snapshots.
    pub fn value_by_asset_type(&self) -> Vec<(AssetType, Decimal)> {
        self.allocation
            .iter()
            .map(|slice| (slice.asset_type, slice.value))
            .collect()
    }
}
