//! Asset catalog: symbol -> definition lookups used to validate lots.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs;
use tokio::sync::RwLock;

use crate::models::{AssetDefinition, Symbol};

#[async_trait::async_trait]
pub trait AssetCatalog: Send + Sync {
    async fn get_asset(&self, symbol: &Symbol) -> Result<Option<AssetDefinition>>;
    async fn list_assets(&self) -> Result<Vec<AssetDefinition>>;
    /// Insert or replace a definition.
    async fn save_asset(&self, definition: &AssetDefinition) -> Result<()>;
}

/// Definitions every catalog starts with.
pub fn builtin_assets() -> Vec<AssetDefinition> {
    vec![
        AssetDefinition::crypto("BTC", "Bitcoin"),
        AssetDefinition::crypto("ETH", "Ethereum"),
        AssetDefinition::crypto("SOL", "Solana"),
        AssetDefinition::crypto("USDC", "USD Coin"),
        AssetDefinition::crypto("ADA", "Cardano"),
        AssetDefinition::crypto("DOGE", "Dogecoin"),
        AssetDefinition::stock("AAPL", "Apple Inc."),
        AssetDefinition::stock("MSFT", "Microsoft Corporation"),
        AssetDefinition::stock("GOOGL", "Alphabet Inc."),
        AssetDefinition::stock("AMZN", "Amazon.com Inc."),
        AssetDefinition::stock("NVDA", "NVIDIA Corporation"),
        AssetDefinition::etf("VTI", "Vanguard Total Stock Market ETF"),
        AssetDefinition::etf("VOO", "Vanguard S&P 500 ETF"),
        AssetDefinition::etf("QQQ", "Invesco QQQ Trust"),
    ]
}

fn index(definitions: Vec<AssetDefinition>) -> BTreeMap<Symbol, AssetDefinition> {
    definitions
        .into_iter()
        .map(|d| (d.symbol.clone(), d))
        .collect()
}

pub struct MemoryAssetCatalog {
    assets: RwLock<BTreeMap<Symbol, AssetDefinition>>,
}

impl MemoryAssetCatalog {
    pub fn new() -> Self {
        Self {
            assets: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn with_assets(definitions: Vec<AssetDefinition>) -> Self {
        Self {
            assets: RwLock::new(index(definitions)),
        }
    }

    pub fn with_builtin_assets() -> Self {
        Self::with_assets(builtin_assets())
    }
}

impl Default for MemoryAssetCatalog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl AssetCatalog for MemoryAssetCatalog {
    async fn get_asset(&self, symbol: &Symbol) -> Result<Option<AssetDefinition>> {
        Ok(self.assets.read().await.get(symbol).cloned())
    }

    async fn list_assets(&self) -> Result<Vec<AssetDefinition>> {
        Ok(self.assets.read().await.values().cloned().collect())
    }

    async fn save_asset(&self, definition: &AssetDefinition) -> Result<()> {
        self.assets
            .write()
            .await
            .insert(definition.symbol.clone(), definition.clone());
        Ok(())
    }
}

/// Catalog stored in `assets.json`; the builtin definitions are used until
/// the file exists.
pub struct JsonFileAssetCatalog {
    path: PathBuf,
    lock: RwLock<()>,
}

impl JsonFileAssetCatalog {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: RwLock::new(()),
        }
    }

    async fn load(&self) -> Result<BTreeMap<Symbol, AssetDefinition>> {
        match fs::read_to_string(&self.path).await {
            Ok(content) => {
                let definitions: Vec<AssetDefinition> = serde_json::from_str(&content)
                    .with_context(|| format!("Failed to parse asset catalog {}", self.path.display()))?;
                Ok(index(definitions))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(index(builtin_assets())),
            Err(e) => Err(e).context("Failed to read asset catalog"),
        }
    }
}

#[async_trait::async_trait]
impl AssetCatalog for JsonFileAssetCatalog {
    async fn get_asset(&self, symbol: &Symbol) -> Result<Option<AssetDefinition>> {
        let _guard = self.lock.read().await;
        Ok(self.load().await?.remove(symbol))
    }

    async fn list_assets(&self) -> Result<Vec<AssetDefinition>> {
        let _guard = self.lock.read().await;
        Ok(self.load().await?.into_values().collect())
    }

    async fn save_asset(&self, definition: &AssetDefinition) -> Result<()> {
        let _guard = self.lock.write().await;
        let mut assets = self.load().await?;
        assets.insert(definition.symbol.clone(), definition.clone());
        let definitions: Vec<&AssetDefinition> = assets.values().collect();
        super::json_file::write_json_atomic(&self.path, &definitions).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AssetType;

    #[tokio::test]
    async fn json_catalog_starts_from_builtins_and_persists() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("assets.json");
        let catalog = JsonFileAssetCatalog::new(&path);

        let btc = catalog.get_asset(&Symbol::new("btc")).await?.unwrap();
        assert_eq!(btc.precision, 6);
        assert!(catalog.get_asset(&Symbol::new("GOLDBAR")).await?.is_none());

        catalog
            .save_asset(&AssetDefinition::custom("GOLDBAR", "Gold bar", 3))
            .await?;

        let reopened = JsonFileAssetCatalog::new(&path);
        let gold = reopened.get_asset(&Symbol::new("GOLDBAR")).await?.unwrap();
        assert_eq!(gold.asset_type, AssetType::Custom);
        assert_eq!(gold.precision, 3);
        assert!(reopened.get_asset(&Symbol::new("AAPL")).await?.is_some());
        Ok(())
    }
}
