use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::RateTable;
use crate::models::Currency;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionStatus {
    /// Source and target currency are the same; amount returned as-is.
    Identity,
    Converted,
    /// No `from->to` rate was available and the amount was passed through
    /// unconverted. Figures built on it are not currency-consistent.
    MissingRate,
}

/// Result of converting one amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Conversion {
    pub amount: Decimal,
    pub status: ConversionStatus,
}

impl Conversion {
    pub fn is_missing_rate(&self) -> bool {
        self.status == ConversionStatus::MissingRate
    }
}

/// Convert `amount` from one currency to another using the directed rate table.
///
/// A missing rate returns the amount unconverted, tagged
/// [`ConversionStatus::MissingRate`] and logged.
pub fn convert(amount: Decimal, from: &Currency, to: &Currency, rates: &RateTable) -> Conversion {
    if from == to {
        return Conversion {
            amount,
            status: ConversionStatus::Identity,
        };
    }

    match rates.rate(from, to) {
        Some(rate) => Conversion {
            amount: amount * rate,
            status: ConversionStatus::Converted,
        },
        None => {
            warn!(
                from = %from,
                to = %to,
                amount = %amount,
                "no exchange rate available; passing amount through unconverted"
            );
            Conversion {
                amount,
                status: ConversionStatus::MissingRate,
            }
        }
    }
}
