//! Current prices: provider chains, the shared quote cache and the resolver.

mod cache;
mod models;
mod provider;
pub mod providers;
mod registry;
mod resolver;

pub use cache::{JsonFilePriceCache, MemoryPriceCache, PriceCache};
pub use models::{
    PriceClass, PriceQuote, PriceRequest, PriceTier, Provenance, ProviderQuote, ResolvedPrice,
};
pub use provider::{ManualPriceSource, PriceProvider};
pub use registry::{
    build_fx_source, build_provider_chains, env_key_lookup, resolver_from_config, KeyLookup,
};
pub use resolver::PriceResolver;
