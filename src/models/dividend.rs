use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{Currency, Id, Symbol};

/// A dividend paid on a lot.
///
/// Dividends reference their lot by id only and are removed with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DividendPayment {
    pub id: Id,
    pub lot_id: Id,
    pub symbol: Symbol,
    pub amount: Decimal,
    pub currency: Currency,
    pub paid_on: NaiveDate,
}

impl DividendPayment {
    pub fn new(
        lot_id: Id,
        symbol: impl Into<Symbol>,
        amount: Decimal,
        currency: Currency,
        paid_on: NaiveDate,
    ) -> Self {
        Self {
            id: Id::new(),
            lot_id,
            symbol: symbol.into(),
            amount,
            currency,
            paid_on,
        }
    }
}
