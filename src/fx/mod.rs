//! Currency conversion over a directed rate table.

mod converter;
mod rates;
mod source;

pub use converter::{convert, Conversion, ConversionStatus};
pub use rates::{ExchangeRate, FxError, RateTable};
pub use source::{fill_missing_rates, FxRateSource};
