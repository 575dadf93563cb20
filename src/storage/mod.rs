mod catalog;
mod json_file;
mod memory;

pub use catalog::{builtin_assets, AssetCatalog, JsonFileAssetCatalog, MemoryAssetCatalog};
pub use json_file::JsonFileStorage;
pub use memory::MemoryStorage;

use std::sync::Arc;

use anyhow::Result;
use chrono::NaiveDate;

use crate::market_data::ManualPriceSource;
use crate::models::{DividendPayment, Id, Lot, ManualPrice, PortfolioSnapshot, Symbol, UpsertOutcome};

/// Storage trait for lots, dividends, manual prices and snapshots.
///
/// Lots, dividends and snapshots are scoped to a user; manual prices are
/// shared like the price cache.
#[async_trait::async_trait]
pub trait Storage: Send + Sync {
    // Lots
    async fn list_lots(&self, user_id: &Id) -> Result<Vec<Lot>>;
    async fn get_lot(&self, user_id: &Id, lot_id: &Id) -> Result<Option<Lot>>;
    /// Insert or replace a lot by id.
    async fn save_lot(&self, lot: &Lot) -> Result<()>;
    /// Delete a lot together with its dividends. Returns false if it did not exist.
    async fn delete_lot(&self, user_id: &Id, lot_id: &Id) -> Result<bool>;

    // Dividends
    async fn list_dividends(&self, user_id: &Id) -> Result<Vec<DividendPayment>>;
    /// Record a dividend; fails if the referenced lot does not exist.
    async fn add_dividend(&self, user_id: &Id, dividend: &DividendPayment) -> Result<()>;

    // Manual prices
    async fn add_manual_price(&self, price: &ManualPrice) -> Result<()>;
    async fn latest_manual_price(&self, symbol: &Symbol) -> Result<Option<ManualPrice>>;

    // Snapshots
    /// Insert, or overwrite the existing row for the same user and day keeping
    /// its id. Check and write happen under one lock.
    async fn upsert_snapshot(
        &self,
        snapshot: PortfolioSnapshot,
    ) -> Result<(PortfolioSnapshot, UpsertOutcome)>;
    async fn get_snapshot(&self, user_id: &Id, date: NaiveDate) -> Result<Option<PortfolioSnapshot>>;
    /// Snapshots of a user ordered by date.
    async fn list_snapshots(&self, user_id: &Id) -> Result<Vec<PortfolioSnapshot>>;
}

/// Manual prices read through a [`Storage`].
pub struct ManualPriceBook {
    storage: Arc<dyn Storage>,
}

impl ManualPriceBook {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }
}

#[async_trait::async_trait]
impl ManualPriceSource for ManualPriceBook {
    async fn latest_manual_price(&self, symbol: &Symbol) -> Result<Option<ManualPrice>> {
        self.storage.latest_manual_price(symbol).await
    }
}

/// Most recent entry wins; ties keep the later-recorded one.
fn latest_of<'a>(prices: impl Iterator<Item = &'a ManualPrice>, symbol: &Symbol) -> Option<ManualPrice> {
    prices
        .filter(|p| &p.symbol == symbol)
        .fold(None::<&ManualPrice>, |best, p| match best {
            Some(b) if b.entered_at > p.entered_at => Some(b),
            _ => Some(p),
        })
        .cloned()
}

/// Keep rows ordered by date for `list_snapshots`.
fn sort_snapshots(snapshots: &mut [PortfolioSnapshot]) {
    snapshots.sort_by(|a, b| a.snapshot_date.cmp(&b.snapshot_date));
}

/// Shared upsert over a user's snapshot rows.
fn upsert_into(
    rows: &mut Vec<PortfolioSnapshot>,
    snapshot: PortfolioSnapshot,
) -> (PortfolioSnapshot, UpsertOutcome) {
    match rows
        .iter_mut()
        .find(|row| row.snapshot_date == snapshot.snapshot_date)
    {
        Some(existing) => {
            existing.overwrite_with(snapshot);
            (existing.clone(), UpsertOutcome::Updated)
        }
        None => {
            rows.push(snapshot.clone());
            sort_snapshots(rows);
            (snapshot, UpsertOutcome::Inserted)
        }
    }
}
