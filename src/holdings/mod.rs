mod aggregator;

pub use aggregator::{aggregate, CurrencyCost, Holding, HoldingError, LotFilter};
