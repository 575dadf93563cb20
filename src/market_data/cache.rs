//! Shared quote cache keyed by symbol.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs;
use tokio::sync::{Mutex, RwLock};

use super::PriceQuote;
use crate::models::Symbol;

/// Quote cache shared by every user of a resolver.
///
/// `put` replaces a symbol's quote as one unit, so a concurrent `get` sees
/// either the old quote or the new one, never a mix. Last write wins.
#[async_trait::async_trait]
pub trait PriceCache: Send + Sync {
    async fn get(&self, symbol: &Symbol) -> Result<Option<PriceQuote>>;

    async fn put(&self, quote: PriceQuote) -> Result<()>;

    /// Remove and return the cached quote for `symbol`.
    async fn evict(&self, symbol: &Symbol) -> Result<Option<PriceQuote>>;

    async fn list(&self) -> Result<Vec<PriceQuote>>;
}

#[derive(Default)]
pub struct MemoryPriceCache {
    quotes: RwLock<HashMap<Symbol, PriceQuote>>,
}

impl MemoryPriceCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl PriceCache for MemoryPriceCache {
    async fn get(&self, symbol: &Symbol) -> Result<Option<PriceQuote>> {
        Ok(self.quotes.read().await.get(symbol).cloned())
    }

    async fn put(&self, quote: PriceQuote) -> Result<()> {
        self.quotes.write().await.insert(quote.symbol.clone(), quote);
        Ok(())
    }

    async fn evict(&self, symbol: &Symbol) -> Result<Option<PriceQuote>> {
        Ok(self.quotes.write().await.remove(symbol))
    }

    async fn list(&self) -> Result<Vec<PriceQuote>> {
        let mut quotes: Vec<PriceQuote> = self.quotes.read().await.values().cloned().collect();
        quotes.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        Ok(quotes)
    }
}

/// Quote cache persisted as one JSON file so quotes survive CLI runs.
///
/// The file is rewritten through a temporary file and renamed into place.
pub struct JsonFilePriceCache {
    path: PathBuf,
    quotes: Mutex<Option<HashMap<Symbol, PriceQuote>>>,
}

impl JsonFilePriceCache {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            quotes: Mutex::new(None),
        }
    }

    async fn load(&self) -> Result<HashMap<Symbol, PriceQuote>> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read {}", self.path.display()))
            }
        };
        let quotes: Vec<PriceQuote> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse price cache {}", self.path.display()))?;
        Ok(quotes.into_iter().map(|q| (q.symbol.clone(), q)).collect())
    }

    async fn persist(&self, quotes: &HashMap<Symbol, PriceQuote>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .context("Failed to create price cache directory")?;
        }
        let mut sorted: Vec<&PriceQuote> = quotes.values().collect();
        sorted.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        let content = serde_json::to_string_pretty(&sorted).context("Failed to serialize quotes")?;

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content)
            .await
            .context("Failed to write price cache")?;
        fs::rename(&tmp, &self.path)
            .await
            .context("Failed to replace price cache")?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl PriceCache for JsonFilePriceCache {
    async fn get(&self, symbol: &Symbol) -> Result<Option<PriceQuote>> {
        let mut guard = self.quotes.lock().await;
        if guard.is_none() {
            *guard = Some(self.load().await?);
        }
        Ok(guard.as_ref().and_then(|q| q.get(symbol).cloned()))
    }

    async fn put(&self, quote: PriceQuote) -> Result<()> {
        let mut guard = self.quotes.lock().await;
        let mut quotes = match guard.take() {
            Some(q) => q,
            None => self.load().await?,
        };
        quotes.insert(quote.symbol.clone(), quote);
        let result = self.persist(&quotes).await;
        *guard = Some(quotes);
        result
    }

    async fn evict(&self, symbol: &Symbol) -> Result<Option<PriceQuote>> {
        let mut guard = self.quotes.lock().await;
        let mut quotes = match guard.take() {
            Some(q) => q,
            None => self.load().await?,
        };
        let removed = quotes.remove(symbol);
        let result = if removed.is_some() {
            self.persist(&quotes).await
        } else {
            Ok(())
        };
        *guard = Some(quotes);
        result.map(|_| removed)
    }

    async fn list(&self) -> Result<Vec<PriceQuote>> {
        let mut guard = self.quotes.lock().await;
        if guard.is_none() {
            *guard = Some(self.load().await?);
        }
        let mut quotes: Vec<PriceQuote> = guard
            .as_ref()
            .map(|q| q.values().cloned().collect())
            .unwrap_or_default();
        quotes.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        Ok(quotes)
    }
}
