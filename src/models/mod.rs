mod asset;
mod currency;
mod dividend;
mod id;
mod known;
mod lot;
mod manual_price;
mod snapshot;
mod symbol;

pub use asset::{AssetDefinition, AssetType};
pub use currency::{Currency, CurrencyError};
pub use dividend::DividendPayment;
pub use id::{Id, IdError};
pub use known::Known;
pub use lot::{Lot, LotEdit, LotError, NewLot};
pub use manual_price::ManualPrice;
pub use snapshot::{HoldingSummary, PortfolioSnapshot, UpsertOutcome};
pub use symbol::Symbol;
