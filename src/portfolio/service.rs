use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::clock::{Clock, SystemClock};
use crate::dividends::{portfolio_yields, DividendYield};
use crate::fx::{fill_missing_rates, FxRateSource, RateTable};
use crate::holdings::{aggregate, Holding, LotFilter};
use crate::market_data::{PriceRequest, PriceResolver, ResolvedPrice};
use crate::models::{
    AssetDefinition, Currency, DividendPayment, Id, Lot, LotEdit, LotError,
    ManualPrice, NewLot, Symbol,
};
use crate::storage::{AssetCatalog, Storage};
use crate::valuation::{value, PortfolioValuation};

/// Entry point for lot management and valuation of one user's portfolio.
pub struct PortfolioService {
    storage: Arc<dyn Storage>,
    catalog: Arc<dyn AssetCatalog>,
    resolver: Arc<PriceResolver>,
    fx_source: Option<Arc<dyn FxRateSource>>,
    static_rates: RateTable,
    display_currency: Currency,
    custom_precision: u32,
    clock: Arc<dyn Clock>,
}

impl PortfolioService {
    pub fn new(
        storage: Arc<dyn Storage>,
        catalog: Arc<dyn AssetCatalog>,
        resolver: Arc<PriceResolver>,
    ) -> Self {
        Self {
            storage,
            catalog,
            resolver,
            fx_source: None,
            static_rates: RateTable::new(),
            display_currency: Currency::usd(),
            custom_precision: 2,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_fx_source(mut self, source: Arc<dyn FxRateSource>) -> Self {
        self.fx_source = Some(source);
        self
    }

    /// Rates that are always available, typically from configuration.
    pub fn with_static_rates(mut self, rates: RateTable) -> Self {
        self.static_rates = rates;
        self
    }

    pub fn with_display_currency(mut self, currency: Currency) -> Self {
        self.display_currency = currency;
        self
    }

    pub fn with_custom_precision(mut self, precision: u32) -> Self {
        self.custom_precision = precision;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn display_currency(&self) -> &Currency {
        &self.display_currency
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    pub fn resolver(&self) -> &Arc<PriceResolver> {
        &self.resolver
    }

    // Assets

    pub async fn list_assets(&self) -> Result<Vec<AssetDefinition>> {
        self.catalog.list_assets().await
    }

    /// Register a user-defined asset priced from manual entries.
    pub async fn define_custom_asset(
        &self,
        symbol: impl Into<Symbol>,
        name: impl Into<String>,
        precision: Option<u32>,
    ) -> Result<AssetDefinition> {
        let symbol = symbol.into();
        if symbol.is_empty() {
            anyhow::bail!("Asset symbol must not be empty");
        }
        if let Some(existing) = self.catalog.get_asset(&symbol).await? {
            if !existing.asset_type.is_custom() {
                anyhow::bail!("{} is already defined as a {} asset", symbol, existing.asset_type);
            }
        }
        let definition = AssetDefinition::custom(
            symbol,
            name,
            precision.unwrap_or(self.custom_precision),
        );
        self.catalog.save_asset(&definition).await?;
        info!(symbol = %definition.symbol, precision = definition.precision, "custom asset defined");
        Ok(definition)
    }

    // Lots

    /// Validate and store a new lot.
    ///
    /// Validation failures surface as [`LotError`] inside the returned error.
    pub async fn add_lot(&self, user_id: &Id, input: NewLot) -> Result<Lot> {
        let definition = self
            .catalog
            .get_asset(&input.symbol)
            .await?
            .ok_or_else(|| LotError::UnknownSymbol(input.symbol.clone()))?;
        let lot = Lot::create(user_id.clone(), input, &definition, self.clock.now())?;
        self.storage.save_lot(&lot).await?;
        info!(user = %user_id, lot = %lot.id, symbol = %lot.symbol, quantity = %lot.quantity, "lot added");
        Ok(lot)
    }

    pub async fn edit_lot(&self, user_id: &Id, lot_id: &Id, edit: LotEdit) -> Result<Lot> {
        let mut lot = self
            .storage
            .get_lot(user_id, lot_id)
            .await?
            .with_context(|| format!("Lot not found: {lot_id}"))?;
        lot.apply_edit(edit, self.clock.now())?;
        self.storage.save_lot(&lot).await?;
        Ok(lot)
    }

    /// Remove a lot and its dividends.
    pub async fn remove_lot(&self, user_id: &Id, lot_id: &Id) -> Result<bool> {
        let removed = self.storage.delete_lot(user_id, lot_id).await?;
        if removed {
            info!(user = %user_id, lot = %lot_id, "lot removed");
        }
        Ok(removed)
    }

    pub async fn list_lots(&self, user_id: &Id, filter: &LotFilter) -> Result<Vec<Lot>> {
        let mut lots: Vec<Lot> = self
            .storage
            .list_lots(user_id)
            .await?
            .into_iter()
            .filter(|l| filter.matches(l))
            .collect();
        lots.sort_by(|a, b| {
            a.symbol
                .cmp(&b.symbol)
                .then(a.purchase_date.cmp(&b.purchase_date))
        });
        Ok(lots)
    }

    // Prices and dividends

    pub async fn record_manual_price(
        &self,
        symbol: impl Into<Symbol>,
        price: Decimal,
        currency: Currency,
    ) -> Result<ManualPrice> {
        if price.is_sign_negative() {
            anyhow::bail!("Price must not be negative (got {price})");
        }
        let manual = ManualPrice {
            symbol: symbol.into(),
            price,
            currency,
            entered_at: self.clock.now(),
        };
        self.storage.add_manual_price(&manual).await?;
        Ok(manual)
    }

    pub async fn record_dividend(
        &self,
        user_id: &Id,
        lot_id: &Id,
        amount: Decimal,
        currency: Currency,
        paid_on: NaiveDate,
    ) -> Result<DividendPayment> {
        if amount.is_sign_negative() {
            anyhow::bail!("Dividend amount must not be negative (got {amount})");
        }
        let lot = self
            .storage
            .get_lot(user_id, lot_id)
            .await?
            .with_context(|| format!("Lot not found: {lot_id}"))?;
        let payment = DividendPayment::new(lot.id, lot.symbol, amount, currency, paid_on);
        self.storage.add_dividend(user_id, &payment).await?;
        Ok(payment)
    }

    pub async fn resolve_prices(
        &self,
        requests: &[PriceRequest],
        force_refresh: bool,
    ) -> BTreeMap<Symbol, ResolvedPrice> {
        self.resolver.resolve(requests, force_refresh).await
    }

    /// Resolve catalog symbols by name. Unknown symbols are an error.
    pub async fn resolve_symbols(
        &self,
        symbols: &[Symbol],
        force_refresh: bool,
    ) -> Result<BTreeMap<Symbol, ResolvedPrice>> {
        let mut requests = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            let definition = self
                .catalog
                .get_asset(symbol)
                .await?
                .ok_or_else(|| LotError::UnknownSymbol(symbol.clone()))?;
            requests.push(PriceRequest::new(definition.symbol, definition.asset_type));
        }
        Ok(self.resolver.resolve(&requests, force_refresh).await)
    }

    // Valuation

    pub async fn holdings(&self, user_id: &Id, filter: &LotFilter) -> Result<Vec<Holding>> {
        let lots = self.storage.list_lots(user_id).await?;
        Ok(aggregate(&lots, filter)?)
    }

    /// Static rates plus whatever the FX source supplies for `pairs`.
    pub async fn rate_table(&self, pairs: &[(Currency, Currency)]) -> RateTable {
        let mut rates = self.static_rates.clone();
        if let Some(source) = &self.fx_source {
            fill_missing_rates(&mut rates, pairs, source.as_ref()).await;
        }
        rates
    }

    pub async fn valuation(
        &self,
        user_id: &Id,
        filter: &LotFilter,
        force_refresh: bool,
    ) -> Result<PortfolioValuation> {
        let (valuation, _) = self.valuation_with_rates(user_id, filter, force_refresh, &[]).await?;
        Ok(valuation)
    }

    async fn valuation_with_rates(
        &self,
        user_id: &Id,
        filter: &LotFilter,
        force_refresh: bool,
        extra_currencies: &[Currency],
    ) -> Result<(PortfolioValuation, RateTable)> {
        let holdings = self.holdings(user_id, filter).await?;
        let requests: Vec<PriceRequest> = holdings
            .iter()
            .map(|h| PriceRequest::new(h.symbol.clone(), h.asset_type))
            .collect();
        let prices = self.resolver.resolve(&requests, force_refresh).await;

        let pairs = self.needed_pairs(&holdings, &prices, extra_currencies);
        let rates = self.rate_table(&pairs).await;
        debug!(user = %user_id, holdings = holdings.len(), pairs = pairs.len(), rates = rates.len(), "valuing portfolio");

        Ok((value(&holdings, &prices, &rates, &self.display_currency), rates))
    }

    /// Every directed pair a valuation may convert through.
    fn needed_pairs(
        &self,
        holdings: &[Holding],
        prices: &BTreeMap<Symbol, ResolvedPrice>,
        extra_currencies: &[Currency],
    ) -> Vec<(Currency, Currency)> {
        let display = &self.display_currency;
        let mut pairs = BTreeSet::new();
        for holding in holdings {
            for cost in &holding.costs {
                pairs.insert((cost.currency.clone(), display.clone()));
            }
            if let Some(quote) = prices.get(&holding.symbol).and_then(ResolvedPrice::quote) {
                pairs.insert((quote.currency.clone(), display.clone()));
                if let Some(single) = holding.single_currency() {
                    pairs.insert((quote.currency.clone(), single.currency.clone()));
                }
            }
        }
        for currency in extra_currencies {
            pairs.insert((currency.clone(), display.clone()));
        }
        pairs.into_iter().filter(|(from, to)| from != to).collect()
    }

    /// Trailing-12-month dividend yield for every holding, as of `as_of`.
    pub async fn dividend_yields(&self, user_id: &Id, as_of: NaiveDate) -> Result<Vec<DividendYield>> {
        let payments = self.storage.list_dividends(user_id).await?;
        let currencies: Vec<Currency> = payments
            .iter()
            .map(|p| p.currency.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let (valuation, rates) = self
            .valuation_with_rates(user_id, &LotFilter::default(), false, &currencies)
            .await?;
        Ok(portfolio_yields(&valuation, &payments, as_of, &rates))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::MemoryPriceCache;
    use crate::models::AssetType;
    use crate::storage::{MemoryAssetCatalog, MemoryStorage};
    use rust_decimal_macros::dec;

    fn service() -> PortfolioService {
        let resolver = PriceResolver::new(Arc::new(MemoryPriceCache::new()));
        PortfolioService::new(
            Arc::new(MemoryStorage::new()),
            Arc::new(MemoryAssetCatalog::with_builtin_assets()),
            Arc::new(resolver),
        )
    }

    fn new_lot(symbol: &str, quantity: Decimal) -> NewLot {
        NewLot {
            symbol: Symbol::new(symbol),
            quantity,
            purchase_price: dec!(10),
            currency: "USD".to_string(),
            purchase_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            platform: String::new(),
            notes: None,
        }
    }

    #[tokio::test]
    async fn add_lot_rejects_unknown_symbols() {
        let service = service();
        let err = service
            .add_lot(&Id::from("u1"), new_lot("NOPE", dec!(1)))
            .await
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<LotError>(),
            Some(&LotError::UnknownSymbol(Symbol::new("NOPE")))
        );
    }

    #[tokio::test]
    async fn add_lot_uses_catalog_precision() {
        let service = service();
        let err = service
            .add_lot(&Id::from("u1"), new_lot("AAPL", dec!(1.234)))
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LotError>(),
            Some(LotError::ExcessPrecision { precision: 2, .. })
        ));

        let lot = service
            .add_lot(&Id::from("u1"), new_lot("BTC", dec!(0.123456)))
            .await
            .unwrap();
        assert_eq!(lot.precision, 6);
    }

    #[tokio::test]
    async fn custom_assets_use_configured_precision() -> Result<()> {
        let service = service().with_custom_precision(4);
        let def = service.define_custom_asset("goldbar", "Gold bar", None).await?;
        assert_eq!(def.precision, 4);
        assert!(service.define_custom_asset("AAPL", "Not Apple", None).await.is_err());

        let lot = service.add_lot(&Id::from("u1"), new_lot("GOLDBAR", dec!(1.2345))).await?;
        assert_eq!(lot.asset_type, AssetType::Custom);
        Ok(())
    }

    #[tokio::test]
    async fn list_lots_applies_filter() -> Result<()> {
        let service = service();
        let user = Id::from("u1");
        service.add_lot(&user, new_lot("AAPL", dec!(1))).await?;
        service.add_lot(&user, new_lot("BTC", dec!(1))).await?;

        let filter = LotFilter {
            asset_type: Some(AssetType::Crypto),
            ..LotFilter::default()
        };
        let lots = service.list_lots(&user, &filter).await?;
        assert_eq!(lots.len(), 1);
        assert_eq!(lots[0].symbol, Symbol::new("BTC"));
        Ok(())
    }
}
