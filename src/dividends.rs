//! Trailing-twelve-month dividend yield.

use chrono::{Months, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::fx::{convert, RateTable};
use crate::models::{Currency, DividendPayment, Known, Symbol};
use crate::valuation::{percent_of, PortfolioValuation};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DividendYield {
    pub symbol: Symbol,
    /// Income inside the window, in `currency`. Unknown without any dividend records.
    pub trailing_income: Known<Decimal>,
    pub current_value: Known<Decimal>,
    pub yield_pct: Known<Decimal>,
    pub currency: Currency,
    pub payments_in_window: usize,
    /// False when a payment had to be summed without an exchange rate.
    pub currency_consistent: bool,
}

/// First day after the excluded start of the trailing window ending at `as_of`.
///
/// The window is `(as_of - 12 months, as_of]`.
pub fn window_start(as_of: NaiveDate) -> NaiveDate {
    as_of
        .checked_sub_months(Months::new(12))
        .map(|d| d.succ_opt().unwrap_or(d))
        .unwrap_or(NaiveDate::MIN)
}

fn in_window(paid_on: NaiveDate, as_of: NaiveDate) -> bool {
    paid_on >= window_start(as_of) && paid_on <= as_of
}

/// Yield of `symbol` given its dividend records and current value.
///
/// Unknown when the value is unknown or zero, or when the symbol has never
/// paid a dividend. Known(0) when it has history but nothing in the window.
pub fn dividend_yield(
    symbol: &Symbol,
    payments: &[DividendPayment],
    current_value: Known<Decimal>,
    as_of: NaiveDate,
    currency: &Currency,
    rates: &RateTable,
) -> DividendYield {
    let history: Vec<&DividendPayment> = payments.iter().filter(|p| &p.symbol == symbol).collect();

    let mut income = Decimal::ZERO;
    let mut consistent = true;
    let mut count = 0;
    for payment in history.iter().filter(|p| in_window(p.paid_on, as_of)) {
        let c = convert(payment.amount, &payment.currency, currency, rates);
        consistent &= !c.is_missing_rate();
        income += c.amount;
        count += 1;
    }

    let trailing_income = if history.is_empty() {
        Known::Unknown
    } else {
        Known::Known(income)
    };
    let yield_pct = match (trailing_income, current_value) {
        (Known::Known(income), Known::Known(value)) if !value.is_zero() => {
            Known::Known(percent_of(income, value))
        }
        _ => Known::Unknown,
    };

    DividendYield {
        symbol: symbol.clone(),
        trailing_income,
        current_value,
        yield_pct,
        currency: currency.clone(),
        payments_in_window: count,
        currency_consistent: consistent,
    }
}

/// Yield for every holding of a valuation.
pub fn portfolio_yields(
    valuation: &PortfolioValuation,
    payments: &[DividendPayment],
    as_of: NaiveDate,
    rates: &RateTable,
) -> Vec<DividendYield> {
    valuation
        .holdings
        .iter()
        .map(|h| {
            dividend_yield(
                &h.symbol,
                payments,
                h.current_value,
                as_of,
                &valuation.currency,
                rates,
            )
        })
        .collect()
}
