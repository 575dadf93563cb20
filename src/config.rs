use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::duration::{deserialize_duration, serialize_duration};
use crate::models::Currency;

fn default_display_currency() -> String {
    "USD".to_string()
}

/// Display/output formatting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Round display-currency values to this many decimal places when rendering.
    ///
    /// Presentation only; calculations keep full precision.
    pub currency_decimals: Option<u32>,

    /// Render display-currency values with thousands separators.
    pub currency_grouping: bool,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            currency_decimals: Some(2),
            currency_grouping: false,
        }
    }
}

/// Upstream quote providers the resolver knows how to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Coingecko,
    Cryptocompare,
    TwelveData,
    Eodhd,
}

impl ProviderKind {
    pub fn requires_api_key(self) -> bool {
        matches!(self, ProviderKind::TwelveData | ProviderKind::Eodhd)
    }

    fn default_api_key_env(self) -> &'static str {
        match self {
            ProviderKind::Coingecko => "COINGECKO_API_KEY",
            ProviderKind::Cryptocompare => "CRYPTOCOMPARE_API_KEY",
            ProviderKind::TwelveData => "TWELVE_DATA_API_KEY",
            ProviderKind::Eodhd => "EODHD_API_KEY",
        }
    }
}

/// Ordered provider chains per asset class. The first entry is the primary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderChains {
    pub crypto: Vec<ProviderKind>,
    /// Used for both stocks and ETFs.
    pub equity: Vec<ProviderKind>,
}

impl Default for ProviderChains {
    fn default() -> Self {
        Self {
            crypto: vec![ProviderKind::Coingecko, ProviderKind::Cryptocompare],
            equity: vec![ProviderKind::TwelveData, ProviderKind::Eodhd],
        }
    }
}

fn default_crypto_ttl() -> Duration {
    Duration::from_secs(5 * 60)
}

fn default_equity_ttl() -> Duration {
    Duration::from_secs(30 * 60)
}

fn default_provider_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_batch_deadline() -> Duration {
    Duration::from_secs(30)
}

/// Price resolution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PricingConfig {
    /// How long a cached crypto quote counts as fresh.
    #[serde(
        default = "default_crypto_ttl",
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub crypto_ttl: Duration,

    /// How long a cached stock/ETF quote counts as fresh.
    #[serde(
        default = "default_equity_ttl",
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub equity_ttl: Duration,

    /// Timeout for a single provider batch call.
    #[serde(
        default = "default_provider_timeout",
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub provider_timeout: Duration,

    /// Overall deadline for one resolution batch.
    #[serde(
        default = "default_batch_deadline",
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub batch_deadline: Duration,

    /// Upper bound on provider calls in flight at once.
    pub max_concurrent_requests: usize,

    pub providers: ProviderChains,

    /// Environment variable holding each provider's API key.
    pub api_key_env: BTreeMap<ProviderKind, String>,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            crypto_ttl: default_crypto_ttl(),
            equity_ttl: default_equity_ttl(),
            provider_timeout: default_provider_timeout(),
            batch_deadline: default_batch_deadline(),
            max_concurrent_requests: 4,
            providers: ProviderChains::default(),
            api_key_env: BTreeMap::new(),
        }
    }
}

impl PricingConfig {
    /// Name of the environment variable to read `kind`'s API key from.
    pub fn api_key_env(&self, kind: ProviderKind) -> String {
        self.api_key_env
            .get(&kind)
            .cloned()
            .unwrap_or_else(|| kind.default_api_key_env().to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FxSourceKind {
    Frankfurter,
    None,
}

/// Exchange rate settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FxConfig {
    pub source: FxSourceKind,

    /// Static directed rates keyed as `"FROM/TO"`, e.g. `"EUR/USD" = "1.08"`.
    ///
    /// Static rates take precedence over the source.
    pub rates: BTreeMap<String, String>,
}

impl Default for FxConfig {
    fn default() -> Self {
        Self {
            source: FxSourceKind::Frankfurter,
            rates: BTreeMap::new(),
        }
    }
}

/// Asset-related defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetsConfig {
    /// Quantity precision for custom assets without a catalog entry.
    pub custom_precision: u32,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self { custom_precision: 2 }
    }
}

/// Application configuration as written in `lotfolio.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path to data directory. If relative, resolved from the config file location.
    pub data_dir: Option<PathBuf>,

    /// Currency portfolio totals are reported in.
    #[serde(default = "default_display_currency")]
    pub display_currency: String,

    /// Currency provider quotes are requested in.
    #[serde(default = "default_display_currency")]
    pub base_currency: String,

    /// IANA timezone used to decide which calendar day a snapshot belongs to.
    pub timezone: Option<String>,

    pub pricing: PricingConfig,
    pub fx: FxConfig,
    pub display: DisplayConfig,
    pub assets: AssetsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: None,
            display_currency: default_display_currency(),
            base_currency: default_display_currency(),
            timezone: None,
            pricing: PricingConfig::default(),
            fx: FxConfig::default(),
            display: DisplayConfig::default(),
            assets: AssetsConfig::default(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn resolve_data_dir(&self, config_dir: &Path) -> PathBuf {
        match &self.data_dir {
            Some(data_dir) if data_dir.is_absolute() => data_dir.clone(),
            Some(data_dir) => config_dir.join(data_dir),
            None => config_dir.to_path_buf(),
        }
    }

    /// Validate string fields and resolve paths.
    pub fn resolve(self, config_dir: &Path) -> Result<ResolvedConfig> {
        let data_dir = self.resolve_data_dir(config_dir);
        let display_currency = Currency::parse(&self.display_currency)
            .context("Invalid display_currency in config")?;
        let base_currency =
            Currency::parse(&self.base_currency).context("Invalid base_currency in config")?;
        let timezone = match self.timezone.as_deref() {
            Some(name) => name
                .parse::<Tz>()
                .map_err(|e| anyhow::anyhow!("Invalid timezone {name:?} in config: {e}"))?,
            None => Tz::UTC,
        };
        if self.pricing.max_concurrent_requests == 0 {
            anyhow::bail!("pricing.max_concurrent_requests must be at least 1");
        }

        Ok(ResolvedConfig {
            data_dir,
            display_currency,
            base_currency,
            timezone,
            pricing: self.pricing,
            fx: self.fx,
            display: self.display,
            assets: self.assets,
        })
    }
}

/// Loaded configuration with resolved paths and parsed codes.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub data_dir: PathBuf,
    pub display_currency: Currency,
    pub base_currency: Currency,
    pub timezone: Tz,
    pub pricing: PricingConfig,
    pub fx: FxConfig,
    pub display: DisplayConfig,
    pub assets: AssetsConfig,
}

/// Returns the default config file path.
///
/// Resolution order:
/// 1. `./lotfolio.toml` if it exists in current directory
/// 2. `~/.local/share/lotfolio/lotfolio.toml` (XDG data directory)
pub fn default_config_path() -> PathBuf {
    let local_config = PathBuf::from("lotfolio.toml");
    if local_config.exists() {
        return local_config;
    }

    if let Some(data_dir) = dirs::data_dir() {
        return data_dir.join("lotfolio").join("lotfolio.toml");
    }

    local_config
}

impl ResolvedConfig {
    /// Load and resolve config from a file path.
    pub fn load(config_path: &Path) -> Result<Self> {
        let config_path = config_path
            .canonicalize()
            .with_context(|| format!("Config file not found: {}", config_path.display()))?;

        let config_dir = config_path
            .parent()
            .context("Config file has no parent directory")?;

        Config::load(&config_path)?.resolve(config_dir)
    }

    /// Load config, or fall back to defaults rooted at the config file's directory.
    pub fn load_or_default(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            return Self::load(config_path);
        }

        let config_path = if config_path.is_relative() {
            std::env::current_dir()
                .context("Failed to get current directory")?
                .join(config_path)
        } else {
            config_path.to_path_buf()
        };
        let config_dir = config_path
            .parent()
            .context("Config path has no parent directory")?;

        Config::default().resolve(config_dir)
    }
}
