use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::{
    ManualPriceSource, PriceCache, PriceClass, PriceProvider, PriceQuote, PriceRequest, PriceTier,
    Provenance, ProviderQuote, ResolvedPrice,
};
use crate::clock::{Clock, SystemClock};
use crate::config::PricingConfig;
use crate::models::{AssetType, Symbol};

type ProviderHits = HashMap<Symbol, (PriceQuote, PriceTier)>;

/// Resolves current prices through the waterfall: fresh cache, primary
/// provider, secondary providers, stale cache, manual price, unavailable.
pub struct PriceResolver {
    cache: Arc<dyn PriceCache>,
    chains: BTreeMap<PriceClass, Vec<Arc<dyn PriceProvider>>>,
    manual: Option<Arc<dyn ManualPriceSource>>,
    crypto_ttl: Duration,
    equity_ttl: Duration,
    provider_timeout: Duration,
    batch_deadline: Duration,
    limiter: Arc<Semaphore>,
    clock: Arc<dyn Clock>,
}

impl PriceResolver {
    pub fn new(cache: Arc<dyn PriceCache>) -> Self {
        let defaults = PricingConfig::default();
        Self {
            cache,
            chains: BTreeMap::new(),
            manual: None,
            crypto_ttl: defaults.crypto_ttl,
            equity_ttl: defaults.equity_ttl,
            provider_timeout: defaults.provider_timeout,
            batch_deadline: defaults.batch_deadline,
            limiter: Arc::new(Semaphore::new(defaults.max_concurrent_requests)),
            clock: Arc::new(SystemClock),
        }
    }

    /// Apply TTLs, timeouts and the concurrency bound from configuration.
    pub fn with_pricing_config(self, config: &PricingConfig) -> Self {
        self.with_ttl(PriceClass::Crypto, config.crypto_ttl)
            .with_ttl(PriceClass::Equity, config.equity_ttl)
            .with_provider_timeout(config.provider_timeout)
            .with_batch_deadline(config.batch_deadline)
            .with_max_concurrent_requests(config.max_concurrent_requests)
    }

    /// Ordered provider chain for `class`; the first provider is the primary.
    pub fn with_providers(mut self, class: PriceClass, providers: Vec<Arc<dyn PriceProvider>>) -> Self {
        self.chains.insert(class, providers);
        self
    }

    pub fn with_manual_prices(mut self, source: Arc<dyn ManualPriceSource>) -> Self {
        self.manual = Some(source);
        self
    }

    pub fn with_ttl(mut self, class: PriceClass, ttl: Duration) -> Self {
        match class {
            PriceClass::Crypto => self.crypto_ttl = ttl,
            PriceClass::Equity => self.equity_ttl = ttl,
        }
        self
    }

    pub fn with_provider_timeout(mut self, timeout: Duration) -> Self {
        self.provider_timeout = timeout;
        self
    }

    pub fn with_batch_deadline(mut self, deadline: Duration) -> Self {
        self.batch_deadline = deadline;
        self
    }

    pub fn with_max_concurrent_requests(mut self, max: usize) -> Self {
        self.limiter = Arc::new(Semaphore::new(max.max(1)));
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn ttl(&self, class: PriceClass) -> Duration {
        match class {
            PriceClass::Crypto => self.crypto_ttl,
            PriceClass::Equity => self.equity_ttl,
        }
    }

    /// Everything currently in the cache, fresh or not.
    pub async fn cached_quotes(&self) -> anyhow::Result<Vec<PriceQuote>> {
        self.cache.list().await
    }

    /// Resolve `requests` within the configured batch deadline.
    pub async fn resolve(
        &self,
        requests: &[PriceRequest],
        force_refresh: bool,
    ) -> BTreeMap<Symbol, ResolvedPrice> {
        self.resolve_within(requests, force_refresh, self.batch_deadline)
            .await
    }

    /// Resolve `requests`, abandoning provider calls still pending after `deadline`.
    ///
    /// Every requested symbol gets an entry. With `force_refresh` the cached
    /// quotes of the requested symbols are evicted first, so nothing older than
    /// this call is returned.
    pub async fn resolve_within(
        &self,
        requests: &[PriceRequest],
        force_refresh: bool,
        deadline: Duration,
    ) -> BTreeMap<Symbol, ResolvedPrice> {
        let mut wanted: BTreeMap<Symbol, AssetType> = BTreeMap::new();
        for request in requests {
            wanted
                .entry(request.symbol.clone())
                .or_insert(request.asset_type);
        }
        debug!(symbols = wanted.len(), force_refresh, "resolving prices");

        let mut resolved = BTreeMap::new();
        let mut stale: HashMap<Symbol, PriceQuote> = HashMap::new();
        let mut pending: BTreeMap<PriceClass, Vec<Symbol>> = BTreeMap::new();

        for (symbol, asset_type) in &wanted {
            let Some(class) = PriceClass::for_asset(*asset_type) else {
                continue;
            };

            if force_refresh {
                if let Err(e) = self.cache.evict(symbol).await {
                    warn!(symbol = %symbol, error = %e, "failed to evict cached quote");
                }
            } else {
                match self.cache.get(symbol).await {
                    Ok(Some(cached)) if self.is_fresh(&cached, class) => {
                        debug!(symbol = %symbol, source = %cached.source, "returning fresh cached quote");
                        resolved.insert(
                            symbol.clone(),
                            ResolvedPrice::Quoted {
                                quote: cached,
                                provenance: Provenance::Cache,
                            },
                        );
                        continue;
                    }
                    Ok(Some(cached)) => {
                        stale.insert(symbol.clone(), cached);
                    }
                    Ok(None) => {}
                    Err(e) => warn!(symbol = %symbol, error = %e, "price cache read failed"),
                }
            }
            pending.entry(class).or_default().push(symbol.clone());
        }

        let hits = self.fetch_from_providers(pending, deadline).await;

        for (symbol, asset_type) in wanted {
            if resolved.contains_key(&symbol) {
                continue;
            }
            let outcome = self.walk_waterfall(&symbol, asset_type, &hits, &stale).await;
            resolved.insert(symbol, outcome);
        }

        resolved
    }

    fn is_fresh(&self, quote: &PriceQuote, class: PriceClass) -> bool {
        let age = (self.clock.now() - quote.fetched_at)
            .to_std()
            .unwrap_or(Duration::ZERO);
        age < self.ttl(class)
    }

    async fn walk_waterfall(
        &self,
        symbol: &Symbol,
        asset_type: AssetType,
        hits: &ProviderHits,
        stale: &HashMap<Symbol, PriceQuote>,
    ) -> ResolvedPrice {
        for tier in PriceTier::waterfall(asset_type) {
            match tier {
                PriceTier::Primary | PriceTier::Secondary => {
                    if let Some((quote, hit_tier)) = hits.get(symbol) {
                        if hit_tier == tier {
                            let provenance = if *tier == PriceTier::Primary {
                                Provenance::Primary
                            } else {
                                Provenance::Secondary
                            };
                            return ResolvedPrice::Quoted {
                                quote: quote.clone(),
                                provenance,
                            };
                        }
                    }
                }
                PriceTier::CachedStale => {
                    if let Some(quote) = stale.get(symbol) {
                        info!(
                            symbol = %symbol,
                            source = %quote.source,
                            fetched_at = %quote.fetched_at,
                            "providers exhausted; serving stale cached quote"
                        );
                        return ResolvedPrice::Quoted {
                            quote: quote.clone(),
                            provenance: Provenance::CachedStale,
                        };
                    }
                }
                PriceTier::Manual => {
                    if let Some(quote) = self.manual_quote(symbol).await {
                        return ResolvedPrice::Quoted {
                            quote,
                            provenance: Provenance::Manual,
                        };
                    }
                }
                PriceTier::Unavailable => break,
            }
        }

        warn!(symbol = %symbol, asset_type = %asset_type, "no price available");
        ResolvedPrice::Unavailable
    }

    async fn manual_quote(&self, symbol: &Symbol) -> Option<PriceQuote> {
        let source = self.manual.as_ref()?;
        match source.latest_manual_price(symbol).await {
            Ok(Some(manual)) => Some(PriceQuote {
                symbol: symbol.clone(),
                price: manual.price,
                currency: manual.currency,
                change_24h_pct: None,
                source: "manual".to_string(),
                fetched_at: manual.entered_at,
            }),
            Ok(None) => None,
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "manual price lookup failed");
                None
            }
        }
    }

    /// Run every asset class's provider chain concurrently until `deadline`.
    ///
    /// Quotes found before the deadline are kept even if other chains are
    /// abandoned.
    async fn fetch_from_providers(
        &self,
        pending: BTreeMap<PriceClass, Vec<Symbol>>,
        deadline: Duration,
    ) -> ProviderHits {
        if pending.is_empty() {
            return HashMap::new();
        }

        let found = Mutex::new(HashMap::new());
        let chains = pending
            .into_iter()
            .map(|(class, symbols)| self.run_chain(class, symbols, &found));

        if tokio::time::timeout(deadline, join_all(chains)).await.is_err() {
            warn!(
                deadline_ms = deadline.as_millis() as u64,
                "price resolution deadline reached; abandoning pending provider calls"
            );
        }

        found.into_inner().unwrap_or_else(|e| e.into_inner())
    }

    async fn run_chain(&self, class: PriceClass, symbols: Vec<Symbol>, found: &Mutex<ProviderHits>) {
        let providers = self.chains.get(&class).map(Vec::as_slice).unwrap_or(&[]);
        let mut remaining = symbols;

        for (rank, provider) in providers.iter().enumerate() {
            if remaining.is_empty() {
                break;
            }
            let tier = if rank == 0 {
                PriceTier::Primary
            } else {
                PriceTier::Secondary
            };

            let Some(quotes) = self.call_provider(provider.as_ref(), class, &remaining).await else {
                continue;
            };

            let fetched_at = self.clock.now();
            for ProviderQuote {
                symbol,
                price,
                currency,
                change_24h_pct,
            } in quotes
            {
                if !remaining.contains(&symbol) {
                    continue;
                }
                if price.is_sign_negative() {
                    warn!(symbol = %symbol, provider = provider.name(), price = %price, "discarding negative price");
                    continue;
                }

                let quote = PriceQuote {
                    symbol: symbol.clone(),
                    price,
                    currency,
                    change_24h_pct,
                    source: provider.name().to_string(),
                    fetched_at,
                };
                if let Err(e) = self.cache.put(quote.clone()).await {
                    warn!(symbol = %symbol, error = %e, "failed to cache quote");
                }
                remaining.retain(|s| s != &symbol);
                found
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .insert(symbol, (quote, tier));
            }

            if !remaining.is_empty() {
                debug!(
                    provider = provider.name(),
                    class = ?class,
                    missing = remaining.len(),
                    "provider did not quote every symbol"
                );
            }
        }
    }

    async fn call_provider(
        &self,
        provider: &dyn PriceProvider,
        class: PriceClass,
        symbols: &[Symbol],
    ) -> Option<Vec<ProviderQuote>> {
        let _permit = self.limiter.acquire().await.ok()?;
        debug!(provider = provider.name(), class = ?class, symbols = symbols.len(), "querying provider");

        match tokio::time::timeout(self.provider_timeout, provider.fetch_quotes(symbols)).await {
            Ok(Ok(quotes)) => {
                info!(
                    provider = provider.name(),
                    requested = symbols.len(),
                    returned = quotes.len(),
                    "provider quotes fetched"
                );
                Some(quotes)
            }
            Ok(Err(e)) => {
                warn!(provider = provider.name(), class = ?class, error = %e, "provider call failed");
                None
            }
            Err(_) => {
                warn!(
                    provider = provider.name(),
                    class = ?class,
                    timeout_ms = self.provider_timeout.as_millis() as u64,
                    "provider call timed out"
                );
                None
            }
        }
    }
}
