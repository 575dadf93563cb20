//! Builds provider chains and the FX source from configuration.

use std::collections::BTreeMap;
use std::sync::Arc;

use secrecy::SecretString;
use tracing::{debug, warn};

use super::providers::{
    CoinGeckoProvider, CryptoCompareProvider, EodhdProvider, FrankfurterRateSource,
    TwelveDataProvider,
};
use super::{PriceCache, PriceClass, PriceProvider, PriceResolver};
use crate::config::{FxConfig, FxSourceKind, PricingConfig, ProviderKind, ResolvedConfig};
use crate::fx::FxRateSource;
use crate::models::Currency;

/// Source of API keys, normally the process environment.
pub type KeyLookup<'a> = &'a dyn Fn(&str) -> Option<String>;

pub fn env_key_lookup(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn provider_class(kind: ProviderKind) -> PriceClass {
    match kind {
        ProviderKind::Coingecko | ProviderKind::Cryptocompare => PriceClass::Crypto,
        ProviderKind::TwelveData | ProviderKind::Eodhd => PriceClass::Equity,
    }
}

fn build_provider(
    kind: ProviderKind,
    config: &PricingConfig,
    base_currency: &Currency,
    keys: KeyLookup<'_>,
) -> Option<Arc<dyn PriceProvider>> {
    let env_name = config.api_key_env(kind);
    let key = keys(&env_name).map(SecretString::from);

    if kind.requires_api_key() && key.is_none() {
        warn!(provider = ?kind, env = %env_name, "API key not set; provider disabled");
        return None;
    }

    let provider: Arc<dyn PriceProvider> = match kind {
        ProviderKind::Coingecko => {
            let mut p = CoinGeckoProvider::new().with_quote_currency(base_currency.clone());
            if let Some(key) = key {
                p = p.with_api_key(key);
            }
            Arc::new(p)
        }
        ProviderKind::Cryptocompare => {
            let mut p = CryptoCompareProvider::new().with_quote_currency(base_currency.clone());
            if let Some(key) = key {
                p = p.with_api_key(key);
            }
            Arc::new(p)
        }
        ProviderKind::TwelveData => Arc::new(TwelveDataProvider::new(key?)),
        ProviderKind::Eodhd => Arc::new(EodhdProvider::new(key?)),
    };
    Some(provider)
}

/// Ordered provider chain per asset class.
///
/// Providers listed under the wrong class or missing a required key are
/// skipped with a warning.
pub fn build_provider_chains(
    config: &PricingConfig,
    base_currency: &Currency,
    keys: KeyLookup<'_>,
) -> BTreeMap<PriceClass, Vec<Arc<dyn PriceProvider>>> {
    let mut chains = BTreeMap::new();

    for (class, kinds) in [
        (PriceClass::Crypto, &config.providers.crypto),
        (PriceClass::Equity, &config.providers.equity),
    ] {
        let mut chain = Vec::new();
        for kind in kinds {
            if provider_class(*kind) != class {
                warn!(provider = ?kind, class = ?class, "provider does not serve this asset class; skipping");
                continue;
            }
            if let Some(provider) = build_provider(*kind, config, base_currency, keys) {
                debug!(provider = provider.name(), class = ?class, "provider enabled");
                chain.push(provider);
            }
        }
        chains.insert(class, chain);
    }

    chains
}

pub fn build_fx_source(config: &FxConfig) -> Option<Arc<dyn FxRateSource>> {
    match config.source {
        FxSourceKind::Frankfurter => Some(Arc::new(FrankfurterRateSource::new())),
        FxSourceKind::None => None,
    }
}

/// Resolver wired from configuration: TTLs, limits and providers.
///
/// Crypto providers quote in the configured base currency; equity providers
/// report the currency of the exchange they price on.
pub fn resolver_from_config(
    cache: Arc<dyn PriceCache>,
    config: &ResolvedConfig,
    keys: KeyLookup<'_>,
) -> PriceResolver {
    let mut resolver = PriceResolver::new(cache).with_pricing_config(&config.pricing);
    for (class, chain) in build_provider_chains(&config.pricing, &config.base_currency, keys) {
        resolver = resolver.with_providers(class, chain);
    }
    resolver
}
