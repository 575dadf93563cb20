//! In-memory storage implementation for testing.

use std::collections::HashMap;

use anyhow::Result;
use chrono::NaiveDate;
use tokio::sync::Mutex;

use super::{latest_of, sort_snapshots, upsert_into, Storage};
use crate::models::{
    DividendPayment, Id, Lot, ManualPrice, PortfolioSnapshot, Symbol, UpsertOutcome,
};

#[derive(Default)]
pub struct MemoryStorage {
    lots: Mutex<HashMap<Id, Vec<Lot>>>,
    dividends: Mutex<HashMap<Id, Vec<DividendPayment>>>,
    manual_prices: Mutex<Vec<ManualPrice>>,
    snapshots: Mutex<HashMap<Id, Vec<PortfolioSnapshot>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl Storage for MemoryStorage {
    async fn list_lots(&self, user_id: &Id) -> Result<Vec<Lot>> {
        let lots = self.lots.lock().await;
        Ok(lots.get(user_id).cloned().unwrap_or_default())
    }

    async fn get_lot(&self, user_id: &Id, lot_id: &Id) -> Result<Option<Lot>> {
        let lots = self.lots.lock().await;
        Ok(lots
            .get(user_id)
            .and_then(|l| l.iter().find(|lot| &lot.id == lot_id))
            .cloned())
    }

    async fn save_lot(&self, lot: &Lot) -> Result<()> {
        let mut lots = self.lots.lock().await;
        let user_lots = lots.entry(lot.user_id.clone()).or_default();
        match user_lots.iter_mut().find(|l| l.id == lot.id) {
            Some(existing) => *existing = lot.clone(),
            None => user_lots.push(lot.clone()),
        }
        Ok(())
    }

    async fn delete_lot(&self, user_id: &Id, lot_id: &Id) -> Result<bool> {
        // Lock order: lots, then dividends.
        let mut lots = self.lots.lock().await;
        let mut dividends = self.dividends.lock().await;

        let Some(user_lots) = lots.get_mut(user_id) else {
            return Ok(false);
        };
        let before = user_lots.len();
        user_lots.retain(|l| &l.id != lot_id);
        if user_lots.len() == before {
            return Ok(false);
        }
        if let Some(user_dividends) = dividends.get_mut(user_id) {
            user_dividends.retain(|d| &d.lot_id != lot_id);
        }
        Ok(true)
    }

    async fn list_dividends(&self, user_id: &Id) -> Result<Vec<DividendPayment>> {
        let dividends = self.dividends.lock().await;
        Ok(dividends.get(user_id).cloned().unwrap_or_default())
    }

    async fn add_dividend(&self, user_id: &Id, dividend: &DividendPayment) -> Result<()> {
        let lots = self.lots.lock().await;
        let mut dividends = self.dividends.lock().await;

        let lot_exists = lots
            .get(user_id)
            .is_some_and(|l| l.iter().any(|lot| lot.id == dividend.lot_id));
        if !lot_exists {
            anyhow::bail!("Lot not found: {}", dividend.lot_id);
        }
        dividends
            .entry(user_id.clone())
            .or_default()
            .push(dividend.clone());
        Ok(())
    }

    async fn add_manual_price(&self, price: &ManualPrice) -> Result<()> {
        self.manual_prices.lock().await.push(price.clone());
        Ok(())
    }

    async fn latest_manual_price(&self, symbol: &Symbol) -> Result<Option<ManualPrice>> {
        let prices = self.manual_prices.lock().await;
        Ok(latest_of(prices.iter(), symbol))
    }

    async fn upsert_snapshot(
        &self,
        snapshot: PortfolioSnapshot,
    ) -> Result<(PortfolioSnapshot, UpsertOutcome)> {
        let mut snapshots = self.snapshots.lock().await;
        let rows = snapshots.entry(snapshot.user_id.clone()).or_default();
        Ok(upsert_into(rows, snapshot))
    }

    async fn get_snapshot(&self, user_id: &Id, date: NaiveDate) -> Result<Option<PortfolioSnapshot>> {
        let snapshots = self.snapshots.lock().await;
        Ok(snapshots
            .get(user_id)
            .and_then(|rows| rows.iter().find(|s| s.snapshot_date == date))
            .cloned())
    }

    async fn list_snapshots(&self, user_id: &Id) -> Result<Vec<PortfolioSnapshot>> {
        let snapshots = self.snapshots.lock().await;
        let mut rows = snapshots.get(user_id).cloned().unwrap_or_default();
        sort_snapshots(&mut rows);
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AssetDefinition, Currency, NewLot};
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn new_lot(user: &str) -> Lot {
        Lot::create(
            Id::from(user),
            NewLot {
                symbol: Symbol::new("AAPL"),
                quantity: dec!(1),
                purchase_price: dec!(100),
                currency: "USD".to_string(),
                purchase_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                platform: String::new(),
                notes: None,
            },
            &AssetDefinition::stock("AAPL", "Apple"),
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        )
        .unwrap()
    }

    fn snapshot(user: &str, total: rust_decimal::Decimal) -> PortfolioSnapshot {
        let date = NaiveDate::from_ymd_opt(2025, 1, 10).unwrap();
        PortfolioSnapshot {
            id: Id::for_snapshot(&Id::from(user), date),
            user_id: Id::from(user),
            snapshot_date: date,
            currency: Currency::usd(),
            total_value: total,
            total_cost_basis: dec!(0),
            total_gain_loss: total,
            value_by_asset_type: BTreeMap::new(),
            holdings: Vec::new(),
            captured_at: Utc.with_ymd_and_hms(2025, 1, 10, 9, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn delete_lot_cascades_to_dividends() -> Result<()> {
        let storage = MemoryStorage::new();
        let user = Id::from("u1");
        let lot = new_lot("u1");
        let other = new_lot("u1");
        storage.save_lot(&lot).await?;
        storage.save_lot(&other).await?;

        let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        storage
            .add_dividend(&user, &DividendPayment::new(lot.id.clone(), "AAPL", dec!(1), Currency::usd(), date))
            .await?;
        storage
            .add_dividend(&user, &DividendPayment::new(other.id.clone(), "AAPL", dec!(2), Currency::usd(), date))
            .await?;

        assert!(storage.delete_lot(&user, &lot.id).await?);
        assert!(!storage.delete_lot(&user, &lot.id).await?);

        let dividends = storage.list_dividends(&user).await?;
        assert_eq!(dividends.len(), 1);
        assert_eq!(dividends[0].lot_id, other.id);
        Ok(())
    }

    #[tokio::test]
    async fn dividend_for_unknown_lot_is_rejected() {
        let storage = MemoryStorage::new();
        let payment = DividendPayment::new(
            Id::from("missing"),
            "AAPL",
            dec!(1),
            Currency::usd(),
            NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
        );
        assert!(storage.add_dividend(&Id::from("u1"), &payment).await.is_err());
    }

    #[tokio::test]
    async fn latest_manual_price_wins() -> Result<()> {
        let storage = MemoryStorage::new();
        for (hour, price) in [(9, dec!(100)), (11, dec!(120)), (10, dec!(110))] {
            storage
                .add_manual_price(&ManualPrice {
                    symbol: Symbol::new("GOLDBAR"),
                    price,
                    currency: Currency::usd(),
                    entered_at: Utc.with_ymd_and_hms(2025, 1, 10, hour, 0, 0).unwrap(),
                })
                .await?;
        }
        let latest = storage.latest_manual_price(&Symbol::new("GOLDBAR")).await?.unwrap();
        assert_eq!(latest.price, dec!(120));
        assert!(storage.latest_manual_price(&Symbol::new("OTHER")).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn concurrent_same_day_upserts_leave_one_row() -> Result<()> {
        let storage = Arc::new(MemoryStorage::new());
        let mut handles = Vec::new();
        for i in 0..16 {
            let storage = storage.clone();
            handles.push(tokio::spawn(async move {
                storage.upsert_snapshot(snapshot("u1", dec!(10000) + rust_decimal::Decimal::from(i))).await
            }));
        }
        let mut inserted = 0;
        for handle in handles {
            let (_, outcome) = handle.await??;
            if outcome == UpsertOutcome::Inserted {
                inserted += 1;
            }
        }

        assert_eq!(inserted, 1);
        assert_eq!(storage.list_snapshots(&Id::from("u1")).await?.len(), 1);
        Ok(())
    }
}
