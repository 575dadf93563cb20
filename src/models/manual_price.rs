use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{Currency, Symbol};

/// A price typed in by the user for an asset no provider covers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManualPrice {
    pub symbol: Symbol,
    pub price: Decimal,
    pub currency: Currency,
    pub entered_at: DateTime<Utc>,
}
