//! Money rendering for the CLI. Calculations never go through here.

use rust_decimal::{Decimal, RoundingStrategy};

use crate::config::DisplayConfig;
use crate::models::{Currency, Known};

/// Renders display-currency amounts according to `[display]` settings.
#[derive(Debug, Clone)]
pub struct MoneyFormat {
    decimals: Option<u32>,
    grouping: bool,
}

impl MoneyFormat {
    pub fn new(config: &DisplayConfig) -> Self {
        Self {
            decimals: config.currency_decimals,
            grouping: config.currency_grouping,
        }
    }

    /// `1234.5` in USD with two decimals and grouping renders as `$1,234.50`.
    /// Currencies without a known sign get the code as a suffix.
    pub fn money(&self, value: Decimal, currency: &Currency) -> String {
        let number = self.number(value.abs());
        let sign = if value.is_sign_negative() && !self.round(value).is_zero() {
            "-"
        } else {
            ""
        };
        match currency_sign(currency) {
            Some(symbol) => format!("{sign}{symbol}{number}"),
            None => format!("{sign}{number} {currency}"),
        }
    }

    /// Like [`MoneyFormat::money`], with `n/a` for unknown amounts.
    pub fn known_money(&self, value: Known<Decimal>, currency: &Currency) -> String {
        match value {
            Known::Known(v) => self.money(v, currency),
            Known::Unknown => "n/a".to_string(),
        }
    }

    /// Percentages always use two decimals and carry an explicit sign.
    pub fn percent(&self, value: Known<Decimal>) -> String {
        match value {
            Known::Known(v) => {
                let rounded = v.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
                let body = pad_fraction(&rounded.abs().normalize().to_string(), 2);
                if rounded.is_zero() {
                    format!("{body}%")
                } else if rounded.is_sign_negative() {
                    format!("-{body}%")
                } else {
                    format!("+{body}%")
                }
            }
            Known::Unknown => "n/a".to_string(),
        }
    }

    fn round(&self, value: Decimal) -> Decimal {
        match self.decimals {
            Some(dp) => value.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero),
            None => value,
        }
    }

    fn number(&self, value: Decimal) -> String {
        let mut s = self.round(value).normalize().to_string();
        if let Some(dp) = self.decimals {
            s = pad_fraction(&s, dp);
        }
        if self.grouping {
            s = group_thousands(&s);
        }
        s
    }
}

fn currency_sign(currency: &Currency) -> Option<&'static str> {
    match currency.as_str() {
        "USD" => Some("$"),
        "EUR" => Some("€"),
        "GBP" => Some("£"),
        "JPY" => Some("¥"),
        _ => None,
    }
}

fn pad_fraction(s: &str, dp: u32) -> String {
    let (int_part, frac_part) = s.split_once('.').unwrap_or((s, ""));
    if dp == 0 {
        return int_part.to_string();
    }
    let frac: String = frac_part
        .chars()
        .chain(std::iter::repeat('0'))
        .take(dp as usize)
        .collect();
    format!("{int_part}.{frac}")
}

fn group_thousands(s: &str) -> String {
    let (int_part, frac_part) = match s.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (s, None),
    };

    let len = int_part.len();
    let mut grouped = String::with_capacity(len + len / 3);
    for (i, ch) in int_part.chars().enumerate() {
        grouped.push(ch);
        let remaining = len - i - 1;
        if remaining > 0 && remaining % 3 == 0 {
            grouped.push(',');
        }
    }

    match frac_part {
        Some(f) if !f.is_empty() => format!("{grouped}.{f}"),
        _ => grouped,
    }
}
