//! Portfolio valuation in a single display currency.

mod calculator;
mod models;

pub use calculator::{percent_of, value};
pub use models::{
    AllocationSlice, HoldingValuation, MissingRate, OriginalCurrencyView, PortfolioValuation,
};
