use std::collections::{BTreeMap, BTreeSet};

use rust_decimal::Decimal;
use tracing::debug;

use super::{AllocationSlice, HoldingValuation, MissingRate, OriginalCurrencyView, PortfolioValuation};
use crate::fx::{convert, Conversion, RateTable};
use crate::holdings::Holding;
use crate::market_data::ResolvedPrice;
use crate::models::{AssetType, Currency, Known, Symbol};

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// Percentage of `part` over `base`; zero when `base` is zero.
pub fn percent_of(part: Decimal, base: Decimal) -> Decimal {
    if base.is_zero() {
        Decimal::ZERO
    } else {
        part / base * HUNDRED
    }
}

/// Collects conversions made during one valuation and the pairs that had no rate.
struct Converter<'a> {
    rates: &'a RateTable,
    missing: BTreeSet<MissingRate>,
}

impl<'a> Converter<'a> {
    fn new(rates: &'a RateTable) -> Self {
        Self {
            rates,
            missing: BTreeSet::new(),
        }
    }

    fn convert(&mut self, amount: Decimal, from: &Currency, to: &Currency) -> Conversion {
        let conversion = convert(amount, from, to, self.rates);
        if conversion.is_missing_rate() {
            self.missing.insert(MissingRate {
                from: from.clone(),
                to: to.clone(),
            });
        }
        conversion
    }
}

/// Value `holdings` at `prices` in `display_currency`.
///
/// Holdings without a price keep their cost basis in the totals but are
/// left out of value, gain/loss and allocation.
pub fn value(
    holdings: &[Holding],
    prices: &BTreeMap<Symbol, ResolvedPrice>,
    rates: &RateTable,
    display_currency: &Currency,
) -> PortfolioValuation {
    let mut converter = Converter::new(rates);
    let valued: Vec<HoldingValuation> = holdings
        .iter()
        .map(|holding| value_holding(holding, prices.get(&holding.symbol), display_currency, &mut converter))
        .collect();

    let mut total_value = Decimal::ZERO;
    let mut total_cost_basis = Decimal::ZERO;
    let mut valued_cost_basis = Decimal::ZERO;
    let mut by_type: BTreeMap<AssetType, Decimal> = BTreeMap::new();
    let mut unpriced = Vec::new();

    for h in &valued {
        total_cost_basis += h.cost_basis;
        match h.current_value {
            Known::Known(v) => {
                total_value += v;
                valued_cost_basis += h.cost_basis;
                *by_type.entry(h.asset_type).or_default() += v;
            }
            Known::Unknown => unpriced.push(h.symbol.clone()),
        }
    }

    let total_gain_loss = total_value - valued_cost_basis;
    debug!(
        holdings = valued.len(),
        unpriced = unpriced.len(),
        missing_rates = converter.missing.len(),
        total_value = %total_value,
        "portfolio valued"
    );

    PortfolioValuation {
        currency: display_currency.clone(),
        holdings: valued,
        total_value,
        total_cost_basis,
        valued_cost_basis,
        total_gain_loss,
        total_gain_loss_pct: percent_of(total_gain_loss, valued_cost_basis),
        allocation: allocation(by_type, total_value),
        unpriced,
        missing_rates: converter.missing.into_iter().collect(),
    }
}

fn value_holding(
    holding: &Holding,
    price: Option<&ResolvedPrice>,
    display: &Currency,
    converter: &mut Converter<'_>,
) -> HoldingValuation {
    let mut consistent = true;

    let mut cost_basis = Decimal::ZERO;
    for lot in &holding.lots {
        let c = converter.convert(lot.cost(), &lot.currency, display);
        consistent &= !c.is_missing_rate();
        cost_basis += c.amount;
    }

    let quote = price.and_then(ResolvedPrice::quote);
    let current_value: Known<Decimal> = match quote {
        Some(q) => {
            let c = converter.convert(holding.total_quantity * q.price, &q.currency, display);
            consistent &= !c.is_missing_rate();
            Known::Known(c.amount)
        }
        None => Known::Unknown,
    };
    let gain_loss = current_value.map(|v| v - cost_basis);
    let gain_loss_pct = gain_loss.map(|g| percent_of(g, cost_basis));

    // A missing rate leaves this value unknown and is not recorded in `missing_rates`.
    let original = holding.single_currency().map(|cc| {
        let value = quote.and_then(|q| {
            let raw = holding.total_quantity * q.price;
            if q.currency == cc.currency {
                Some(raw)
            } else {
                converter.rates.rate(&q.currency, &cc.currency).map(|rate| raw * rate)
            }
        });
        let value = Known::from(value);
        OriginalCurrencyView {
            currency: cc.currency.clone(),
            average_cost: cc.average_cost,
            cost_basis: cc.cost,
            current_value: value,
            gain_loss: value.map(|v| v - cc.cost),
        }
    });

    HoldingValuation {
        symbol: holding.symbol.clone(),
        asset_type: holding.asset_type,
        quantity: holding.display_quantity(),
        average_cost: holding.average_cost(),
        average_cost_currency: holding.primary_currency.clone(),
        mixed_currency: holding.mixed_currency,
        lot_count: holding.lots.len(),
        price: price.map(ResolvedPrice::price).unwrap_or_default(),
        price_currency: quote.map(|q| q.currency.clone()),
        price_source: price.and_then(ResolvedPrice::display_source),
        provenance: price.and_then(ResolvedPrice::provenance),
        change_24h_pct: quote.and_then(|q| q.change_24h_pct),
        current_value,
        cost_basis,
        gain_loss,
        gain_loss_pct,
        currency_consistent: consistent,
        original,
    }
}

/// Value-weighted allocation; percentages add up to exactly 100.
fn allocation(by_type: BTreeMap<AssetType, Decimal>, total: Decimal) -> Vec<AllocationSlice> {
    if total <= Decimal::ZERO {
        return Vec::new();
    }

    let mut slices: Vec<AllocationSlice> = by_type
        .into_iter()
        .map(|(asset_type, value)| AllocationSlice {
            asset_type,
            value,
            percent: percent_of(value, total),
        })
        .collect();

    // Division leaves a rounding residue; the largest slice absorbs it.
    let sum: Decimal = slices.iter().map(|s| s.percent).sum();
    if let Some(largest) = slices.iter_mut().max_by(|a, b| a.value.cmp(&b.value)) {
        largest.percent += HUNDRED - sum;
    }
    slices
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fx::ExchangeRate;
    use crate::holdings::{aggregate, LotFilter};
    use crate::market_data::{PriceQuote, Provenance};
    use crate::models::{AssetDefinition, Id, Lot, NewLot};
    use chrono::{NaiveDate, TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn lot(def: &AssetDefinition, qty: Decimal, price: Decimal, currency: &str) -> Lot {
        Lot::create(
            Id::from("u1"),
            NewLot {
                symbol: def.symbol.clone(),
                quantity: qty,
                purchase_price: price,
                currency: currency.to_string(),
                purchase_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                platform: String::new(),
                notes: None,
            },
            def,
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        )
        .unwrap()
    }

    fn quoted(symbol: &str, price: Decimal) -> (Symbol, ResolvedPrice) {
        (
            Symbol::new(symbol),
            ResolvedPrice::Quoted {
                quote: PriceQuote {
                    symbol: Symbol::new(symbol),
                    price,
                    currency: Currency::usd(),
                    change_24h_pct: None,
                    source: "test".to_string(),
                    fetched_at: Utc.with_ymd_and_hms(2025, 1, 10, 12, 0, 0).unwrap(),
                },
                provenance: Provenance::Primary,
            },
        )
    }

    fn eur() -> Currency {
        Currency::parse("EUR").unwrap()
    }

    fn eur_usd(rate: Decimal) -> RateTable {
        let mut rates = RateTable::new();
        rates
            .insert(ExchangeRate::new(eur(), Currency::usd(), rate, "static"))
            .unwrap();
        rates
    }

    #[test]
    fn values_single_currency_equity() {
        let aapl = AssetDefinition::stock("AAPL", "Apple");
        let lots = vec![
            lot(&aapl, dec!(10), dec!(150), "USD"),
            lot(&aapl, dec!(5), dec!(180), "USD"),
        ];
        let holdings = aggregate(&lots, &LotFilter::default()).unwrap();
        let prices = BTreeMap::from([quoted("AAPL", dec!(200))]);

        let v = value(&holdings, &prices, &RateTable::new(), &Currency::usd());
        let h = &v.holdings[0];

        assert_eq!(h.average_cost, dec!(160));
        assert_eq!(h.current_value, Known::Known(dec!(3000)));
        assert_eq!(h.cost_basis, dec!(2400));
        assert_eq!(h.gain_loss, Known::Known(dec!(600)));
        assert_eq!(h.gain_loss_pct, Known::Known(dec!(25)));
        assert!(h.currency_consistent);
        assert_eq!(v.total_gain_loss_pct, dec!(25));
        assert_eq!(v.allocation.len(), 1);
        assert_eq!(v.allocation[0].percent, dec!(100));
    }

    #[test]
    fn converts_foreign_cost_basis_to_display_currency() {
        let btc = AssetDefinition::crypto("BTC", "Bitcoin");
        let lots = vec![lot(&btc, dec!(0.5), dec!(40000), "EUR")];
        let holdings = aggregate(&lots, &LotFilter::default()).unwrap();
        let prices = BTreeMap::from([quoted("BTC", dec!(60000))]);

        let v = value(&holdings, &prices, &eur_usd(dec!(1.08)), &Currency::usd());
        let h = &v.holdings[0];

        assert_eq!(h.cost_basis, dec!(21600));
        assert_eq!(h.current_value, Known::Known(dec!(30000)));
        assert_eq!(h.gain_loss, Known::Known(dec!(8400)));
        assert_eq!(h.gain_loss_pct.map(|p| p.round_dp(2)), Known::Known(dec!(38.89)));
        assert!(h.currency_consistent);

        // The EUR view has no USD->EUR rate, so its value is unknown and
        // nothing is flagged against the USD figures.
        let original = h.original.as_ref().unwrap();
        assert_eq!(original.currency, eur());
        assert_eq!(original.cost_basis, dec!(20000));
        assert_eq!(original.current_value, Known::Unknown);
        assert_eq!(original.gain_loss, Known::Unknown);
        assert!(v.missing_rates.is_empty());
    }

    #[test]
    fn original_view_converts_when_rate_exists() {
        let btc = AssetDefinition::crypto("BTC", "Bitcoin");
        let lots = vec![lot(&btc, dec!(0.5), dec!(40000), "EUR")];
        let holdings = aggregate(&lots, &LotFilter::default()).unwrap();
        let prices = BTreeMap::from([quoted("BTC", dec!(60000))]);
        let mut rates = eur_usd(dec!(1.08));
        rates
            .insert(ExchangeRate::new(Currency::usd(), eur(), dec!(0.9), "static"))
            .unwrap();

        let v = value(&holdings, &prices, &rates, &Currency::usd());
        let original = v.holdings[0].original.as_ref().unwrap();

        assert_eq!(original.current_value, Known::Known(dec!(27000)));
        assert_eq!(original.gain_loss, Known::Known(dec!(7000)));
        assert!(v.missing_rates.is_empty());
    }

    #[test]
    fn cost_basis_is_converted_lot_by_lot() {
        let vti = AssetDefinition::etf("VTI", "Vanguard Total Market");
        let lots = vec![
            lot(&vti, dec!(10), dec!(100), "USD"),
            lot(&vti, dec!(10), dec!(100), "EUR"),
            lot(&vti, dec!(5), dec!(100), "USD"),
        ];
        let holdings = aggregate(&lots, &LotFilter::default()).unwrap();
        let prices = BTreeMap::from([quoted("VTI", dec!(120))]);

        let v = value(&holdings, &prices, &eur_usd(dec!(1.10)), &Currency::usd());
        let h = &v.holdings[0];

        // 1000 + 1000 * 1.10 + 500; converting the summed 2500 would give 2750.
        assert_eq!(h.cost_basis, dec!(2600));
        assert_ne!(h.cost_basis, dec!(2500) * dec!(1.10));
        assert!(h.mixed_currency);
        assert!(h.original.is_none());
        assert_eq!(h.average_cost_currency, Currency::usd());
    }

    #[test]
    fn unpriced_holdings_do_not_count_as_losses() {
        let aapl = AssetDefinition::stock("AAPL", "Apple");
        let gold = AssetDefinition::custom("GOLDBAR", "Gold bar", 2);
        let lots = vec![
            lot(&aapl, dec!(10), dec!(100), "USD"),
            lot(&gold, dec!(1), dec!(5000), "USD"),
        ];
        let holdings = aggregate(&lots, &LotFilter::default()).unwrap();
        let mut prices = BTreeMap::from([quoted("AAPL", dec!(110))]);
        prices.insert(Symbol::new("GOLDBAR"), ResolvedPrice::Unavailable);

        let v = value(&holdings, &prices, &RateTable::new(), &Currency::usd());

        assert_eq!(v.total_value, dec!(1100));
        assert_eq!(v.total_cost_basis, dec!(6000));
        assert_eq!(v.valued_cost_basis, dec!(1000));
        assert_eq!(v.total_gain_loss, dec!(100));
        assert_eq!(v.total_gain_loss_pct, dec!(10));
        assert_eq!(v.unpriced, vec![Symbol::new("GOLDBAR")]);

        let gold = v.holding(&Symbol::new("GOLDBAR")).unwrap();
        assert_eq!(gold.current_value, Known::Unknown);
        assert_eq!(gold.gain_loss_pct, Known::Unknown);
        assert_eq!(gold.price, Known::Unknown);
    }

    #[test]
    fn zero_cost_basis_reports_zero_percent() {
        let btc = AssetDefinition::crypto("BTC", "Bitcoin");
        let lots = vec![lot(&btc, dec!(1), dec!(0), "USD")];
        let holdings = aggregate(&lots, &LotFilter::default()).unwrap();
        let prices = BTreeMap::from([quoted("BTC", dec!(100))]);

        let v = value(&holdings, &prices, &RateTable::new(), &Currency::usd());
        assert_eq!(v.holdings[0].gain_loss, Known::Known(dec!(100)));
        assert_eq!(v.holdings[0].gain_loss_pct, Known::Known(Decimal::ZERO));
    }

    #[test]
    fn allocation_sums_to_one_hundred() {
        let a = AssetDefinition::stock("A", "A");
        let b = AssetDefinition::crypto("B", "B");
        let c = AssetDefinition::etf("C", "C");
        let lots = vec![
            lot(&a, dec!(1), dec!(1), "USD"),
            lot(&b, dec!(1), dec!(1), "USD"),
            lot(&c, dec!(1), dec!(1), "USD"),
        ];
        let holdings = aggregate(&lots, &LotFilter::default()).unwrap();
        let prices = BTreeMap::from([
            quoted("A", dec!(1)),
            quoted("B", dec!(1)),
            quoted("C", dec!(1)),
        ]);

        let v = value(&holdings, &prices, &RateTable::new(), &Currency::usd());
        let sum: Decimal = v.allocation.iter().map(|s| s.percent).sum();
        assert_eq!(v.allocation.len(), 3);
        assert_eq!(sum, dec!(100));
    }
}
