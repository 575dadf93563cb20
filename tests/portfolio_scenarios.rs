mod support;

use std::collections::BTreeMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use anyhow::Result;
use lotfolio::clock::ManualClock;
use lotfolio::fx::RateTable;
use lotfolio::holdings::LotFilter;
use lotfolio::market_data::providers::{CoinGeckoProvider, TwelveDataProvider};
use lotfolio::market_data::{MemoryPriceCache, PriceClass, PriceResolver, Provenance};
use lotfolio::models::{Currency, Id, Known, LotEdit, Symbol, UpsertOutcome};
use lotfolio::portfolio::PortfolioService;
use lotfolio::snapshot::SnapshotManager;
use lotfolio::storage::{
    AssetCatalog, JsonFileAssetCatalog, JsonFileStorage, ManualPriceBook, MemoryAssetCatalog, MemoryStorage,
    Storage,
};
use lotfolio::valuation::MissingRate;
use rust_decimal_macros::dec;
use secrecy::SecretString;
use support::{at, date, lot, MockProvider, StaticFxSource};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Fixture {
    service: Arc<PortfolioService>,
    crypto: MockProvider,
    equity: MockProvider,
    clock: Arc<ManualClock>,
}

fn fixture_with(
    storage: Arc<dyn Storage>,
    catalog: Arc<dyn AssetCatalog>,
    configure: impl FnOnce(PortfolioService) -> PortfolioService,
) -> Fixture {
    let clock = Arc::new(ManualClock::new(at(2025, 1, 10, 9, 0)));
    let crypto = MockProvider::new("crypto");
    let equity = MockProvider::new("equity");
    let resolver = PriceResolver::new(Arc::new(MemoryPriceCache::new()))
        .with_clock(clock.clone())
        .with_providers(PriceClass::Crypto, vec![crypto.arc()])
        .with_providers(PriceClass::Equity, vec![equity.arc()])
        .with_manual_prices(Arc::new(ManualPriceBook::new(storage.clone())));
    let service = PortfolioService::new(storage, catalog, Arc::new(resolver)).with_clock(clock.clone());
    Fixture {
        service: Arc::new(configure(service)),
        crypto,
        equity,
        clock,
    }
}

fn configured(configure: impl FnOnce(PortfolioService) -> PortfolioService) -> Fixture {
    fixture_with(
        Arc::new(MemoryStorage::new()),
        Arc::new(MemoryAssetCatalog::with_builtin_assets()),
        configure,
    )
}

fn fixture() -> Fixture {
    configured(|s| s)
}

fn static_rates(entries: &[(&str, &str)]) -> RateTable {
    let map: BTreeMap<String, String> = entries
        .iter()
        .map(|(pair, rate)| (pair.to_string(), rate.to_string()))
        .collect();
    RateTable::from_static(&map).unwrap()
}

#[tokio::test]
async fn aapl_two_lots_gain_twenty_five_percent() -> Result<()> {
    let f = fixture();
    let user = Id::from("u1");
    f.equity.set_price("AAPL", dec!(200));

    f.service.add_lot(&user, lot("AAPL", dec!(10), dec!(150), "USD")).await?;
    f.service.add_lot(&user, lot("AAPL", dec!(5), dec!(180), "USD")).await?;

    let valuation = f.service.valuation(&user, &LotFilter::default(), false).await?;
    let aapl = valuation.holding(&Symbol::new("AAPL")).unwrap();

    assert_eq!(aapl.quantity, dec!(15));
    assert_eq!(aapl.lot_count, 2);
    assert_eq!(aapl.average_cost, dec!(160));
    assert_eq!(aapl.current_value, Known::Known(dec!(3000)));
    assert_eq!(aapl.cost_basis, dec!(2400));
    assert_eq!(aapl.gain_loss, Known::Known(dec!(600)));
    assert_eq!(aapl.gain_loss_pct, Known::Known(dec!(25)));
    assert_eq!(aapl.provenance, Some(Provenance::Primary));
    assert_eq!(valuation.total_value, dec!(3000));
    assert_eq!(valuation.total_gain_loss_pct, dec!(25));
    Ok(())
}

#[tokio::test]
async fn eur_bitcoin_lot_valued_in_usd() -> Result<()> {
    let f = configured(|s| s.with_static_rates(static_rates(&[("EUR/USD", "1.08")])));
    let user = Id::from("u1");
    f.crypto.set_price("BTC", dec!(60000));

    f.service.add_lot(&user, lot("BTC", dec!(0.5), dec!(40000), "EUR")).await?;

    let valuation = f.service.valuation(&user, &LotFilter::default(), false).await?;
    let btc = valuation.holding(&Symbol::new("BTC")).unwrap();

    assert_eq!(btc.cost_basis, dec!(21600));
    assert_eq!(btc.current_value, Known::Known(dec!(30000)));
    assert_eq!(btc.gain_loss, Known::Known(dec!(8400)));
    assert_eq!(btc.gain_loss_pct.map(|p| p.round_dp(2)), Known::Known(dec!(38.89)));
    assert!(btc.currency_consistent);
    assert_eq!(btc.average_cost_currency, Currency::parse("EUR")?);
    // USD->EUR is not configured: the EUR view has no value, the USD figures stand.
    let original = btc.original.as_ref().unwrap();
    assert_eq!(original.cost_basis, dec!(20000));
    assert_eq!(original.current_value, Known::Unknown);
    assert!(valuation.missing_rates.is_empty());
    Ok(())
}

#[tokio::test]
async fn equity_quotes_keep_exchange_currency_with_eur_base() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/quote"))
        .and(query_param("symbol", "AAPL"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{"symbol": "AAPL", "currency": "USD", "close": "200.00"}"#,
        ))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/simple/price"))
        .and(query_param("vs_currencies", "eur"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"bitcoin": {"eur": 55000}}"#))
        .expect(1)
        .mount(&server)
        .await;

    let eur = Currency::parse("EUR")?;
    let equity = TwelveDataProvider::new(SecretString::from("test-key".to_string()))
        .with_base_url(server.uri());
    let crypto = CoinGeckoProvider::new()
        .with_quote_currency(eur.clone())
        .with_base_url(server.uri());
    let resolver = PriceResolver::new(Arc::new(MemoryPriceCache::new()))
        .with_clock(Arc::new(ManualClock::new(at(2025, 1, 10, 9, 0))))
        .with_providers(PriceClass::Equity, vec![Arc::new(equity)])
        .with_providers(PriceClass::Crypto, vec![Arc::new(crypto)]);
    let service = PortfolioService::new(
        Arc::new(MemoryStorage::new()),
        Arc::new(MemoryAssetCatalog::with_builtin_assets()),
        Arc::new(resolver),
    )
    .with_display_currency(eur.clone())
    .with_static_rates(static_rates(&[("USD/EUR", "0.9")]));

    let user = Id::from("u1");
    service.add_lot(&user, lot("AAPL", dec!(1), dec!(150), "USD")).await?;
    service.add_lot(&user, lot("BTC", dec!(0.5), dec!(40000), "EUR")).await?;
    let valuation = service.valuation(&user, &LotFilter::default(), false).await?;

    let aapl = valuation.holding(&Symbol::new("AAPL")).unwrap();
    assert_eq!(aapl.price_currency, Some(Currency::usd()));
    assert_eq!(aapl.current_value, Known::Known(dec!(180)));
    assert_eq!(aapl.cost_basis, dec!(135));
    assert!(aapl.currency_consistent);

    let btc = valuation.holding(&Symbol::new("BTC")).unwrap();
    assert_eq!(btc.price_currency, Some(eur.clone()));
    assert_eq!(btc.current_value, Known::Known(dec!(27500)));
    assert_eq!(btc.cost_basis, dec!(20000));

    assert_eq!(valuation.total_value, dec!(27680));
    assert!(valuation.missing_rates.is_empty());
    Ok(())
}

#[tokio::test]
async fn fx_source_fills_rates_not_in_static_table() -> Result<()> {
    let source = Arc::new(StaticFxSource::new(&[("GBP", "USD", dec!(1.25))]));
    let fx = source.clone();
    let f = configured(move |s| s.with_fx_source(fx));
    let service = &f.service;
    let user = Id::from("u1");
    f.equity.set_price("MSFT", dec!(400));

    service.add_lot(&user, lot("MSFT", dec!(2), dec!(240), "GBP")).await?;
    let valuation = service.valuation(&user, &LotFilter::default(), false).await?;
    let msft = valuation.holding(&Symbol::new("MSFT")).unwrap();

    assert_eq!(msft.cost_basis, dec!(600));
    assert_eq!(msft.current_value, Known::Known(dec!(800)));
    assert!(source.calls.load(Ordering::SeqCst) >= 1);
    Ok(())
}

#[tokio::test]
async fn missing_rate_passes_amount_through_and_is_flagged() -> Result<()> {
    let f = configured(|s| s.with_display_currency(Currency::parse("EUR").unwrap()));
    let service = &f.service;
    let user = Id::from("u1");
    f.equity.set_price("AAPL", dec!(200));

    service.add_lot(&user, lot("AAPL", dec!(1), dec!(150), "USD")).await?;
    let valuation = service.valuation(&user, &LotFilter::default(), false).await?;
    let aapl = valuation.holding(&Symbol::new("AAPL")).unwrap();

    assert_eq!(aapl.current_value, Known::Known(dec!(200)));
    assert_eq!(aapl.cost_basis, dec!(150));
    assert!(!aapl.currency_consistent);
    assert_eq!(
        valuation.missing_rates,
        vec![MissingRate {
            from: Currency::usd(),
            to: Currency::parse("EUR")?,
        }]
    );
    Ok(())
}

#[tokio::test]
async fn unpriced_holding_is_listed_and_excluded_from_gain() -> Result<()> {
    let f = fixture();
    let user = Id::from("u1");
    f.equity.set_price("AAPL", dec!(200));

    f.service.add_lot(&user, lot("AAPL", dec!(10), dec!(150), "USD")).await?;
    f.service.add_lot(&user, lot("NVDA", dec!(4), dec!(100), "USD")).await?;

    let valuation = f.service.valuation(&user, &LotFilter::default(), false).await?;
    let nvda = valuation.holding(&Symbol::new("NVDA")).unwrap();

    assert_eq!(nvda.current_value, Known::Unknown);
    assert_eq!(nvda.gain_loss, Known::Unknown);
    assert_eq!(valuation.unpriced, vec![Symbol::new("NVDA")]);
    assert_eq!(valuation.total_value, dec!(2000));
    assert_eq!(valuation.total_cost_basis, dec!(1900));
    assert_eq!(valuation.total_gain_loss, dec!(500));
    Ok(())
}

#[tokio::test]
async fn edited_and_removed_lots_change_the_valuation() -> Result<()> {
    let f = fixture();
    let user = Id::from("u1");
    f.equity.set_price("AAPL", dec!(200));

    let first = f.service.add_lot(&user, lot("AAPL", dec!(10), dec!(150), "USD")).await?;
    let second = f.service.add_lot(&user, lot("AAPL", dec!(5), dec!(180), "USD")).await?;

    f.clock.advance(chrono::Duration::minutes(1));
    let edited = f
        .service
        .edit_lot(
            &user,
            &first.id,
            LotEdit {
                quantity: Some(dec!(20)),
                ..LotEdit::default()
            },
        )
        .await?;
    assert_eq!(edited.updated_at, at(2025, 1, 10, 9, 1));

    assert!(f.service.remove_lot(&user, &second.id).await?);
    let valuation = f.service.valuation(&user, &LotFilter::default(), false).await?;
    let aapl = valuation.holding(&Symbol::new("AAPL")).unwrap();
    assert_eq!(aapl.quantity, dec!(20));
    assert_eq!(aapl.cost_basis, dec!(3000));
    assert_eq!(aapl.current_value, Known::Known(dec!(4000)));
    Ok(())
}

#[tokio::test]
async fn dividend_yield_over_trailing_year() -> Result<()> {
    let f = fixture();
    let user = Id::from("u1");
    f.equity.set_price("AAPL", dec!(200));
    f.crypto.set_price("BTC", dec!(60000));

    let aapl = f.service.add_lot(&user, lot("AAPL", dec!(10), dec!(150), "USD")).await?;
    f.service.add_lot(&user, lot("BTC", dec!(1), dec!(40000), "USD")).await?;

    // Outside the window, then two inside it.
    f.service
        .record_dividend(&user, &aapl.id, dec!(10), Currency::usd(), date(2024, 1, 10))
        .await?;
    f.service
        .record_dividend(&user, &aapl.id, dec!(25), Currency::usd(), date(2024, 6, 1))
        .await?;
    f.service
        .record_dividend(&user, &aapl.id, dec!(15), Currency::usd(), date(2025, 1, 10))
        .await?;

    let yields = f.service.dividend_yields(&user, date(2025, 1, 10)).await?;
    let aapl_yield = yields.iter().find(|y| y.symbol == Symbol::new("AAPL")).unwrap();
    assert_eq!(aapl_yield.trailing_income, Known::Known(dec!(40)));
    assert_eq!(aapl_yield.payments_in_window, 2);
    assert_eq!(aapl_yield.yield_pct, Known::Known(dec!(2)));

    let btc_yield = yields.iter().find(|y| y.symbol == Symbol::new("BTC")).unwrap();
    assert_eq!(btc_yield.yield_pct, Known::Unknown);
    Ok(())
}

#[tokio::test]
async fn removing_a_lot_removes_its_dividends() -> Result<()> {
    let f = fixture();
    let user = Id::from("u1");
    let aapl = f.service.add_lot(&user, lot("AAPL", dec!(10), dec!(150), "USD")).await?;
    f.service
        .record_dividend(&user, &aapl.id, dec!(5), Currency::usd(), date(2024, 6, 1))
        .await?;

    assert!(f.service.remove_lot(&user, &aapl.id).await?);
    assert!(f.service.storage().list_dividends(&user).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn snapshot_overwrite_persists_one_row_on_disk() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let f = fixture_with(
        Arc::new(JsonFileStorage::new(dir.path())),
        Arc::new(JsonFileAssetCatalog::new(dir.path().join("assets.json"))),
        |s| s,
    );
    let user = Id::from("u1");
    let manager = SnapshotManager::new(f.service.clone()).with_clock(f.clock.clone());

    f.service.define_custom_asset("GOLDBAR", "Gold bar", None).await?;
    f.service.add_lot(&user, lot("GOLDBAR", dec!(1), dec!(9000), "USD")).await?;

    f.service.record_manual_price("GOLDBAR", dec!(10000), Currency::usd()).await?;
    let (_, first) = manager.capture_snapshot(&user, None).await?;

    f.clock.set(at(2025, 1, 10, 20, 0));
    f.service.record_manual_price("GOLDBAR", dec!(10500), Currency::usd()).await?;
    let (_, second) = manager.capture_snapshot(&user, None).await?;

    assert_eq!(first, UpsertOutcome::Inserted);
    assert_eq!(second, UpsertOutcome::Updated);

    let reopened = JsonFileStorage::new(dir.path());
    let rows = reopened.list_snapshots(&user).await?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].snapshot_date, date(2025, 1, 10));
    assert_eq!(rows[0].total_value, dec!(10500));
    assert_eq!(rows[0].holdings.len(), 1);
    assert_eq!(rows[0].holdings[0].value, Known::Known(dec!(10500)));
    Ok(())
}

#[tokio::test]
async fn snapshot_day_follows_configured_timezone() -> Result<()> {
    let f = fixture();
    let user = Id::from("u1");
    f.clock.set(at(2025, 1, 10, 23, 30));
    let manager = SnapshotManager::new(f.service.clone())
        .with_clock(f.clock.clone())
        .with_timezone(chrono_tz::Asia::Tokyo);

    let (snapshot, _) = manager.capture_snapshot(&user, None).await?;
    assert_eq!(snapshot.snapshot_date, date(2025, 1, 11));
    Ok(())
}
