//! Daily portfolio snapshots, one row per user and calendar day.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use tracing::info;

use crate::clock::{Clock, SystemClock};
use crate::holdings::LotFilter;
use crate::models::{HoldingSummary, Id, PortfolioSnapshot, UpsertOutcome};
use crate::portfolio::PortfolioService;
use crate::valuation::PortfolioValuation;

/// Calendar day of `as_of` in `timezone`.
pub fn snapshot_day(as_of: DateTime<Utc>, timezone: Tz) -> NaiveDate {
    as_of.with_timezone(&timezone).date_naive()
}

/// Snapshot row for `valuation`; the id is derived from user and day.
pub fn build_snapshot(
    user_id: &Id,
    date: NaiveDate,
    valuation: &PortfolioValuation,
    captured_at: DateTime<Utc>,
) -> PortfolioSnapshot {
    let holdings = valuation
        .holdings
        .iter()
        .map(|h| HoldingSummary {
            symbol: h.symbol.clone(),
            asset_type: h.asset_type,
            quantity: h.quantity,
            average_cost: h.average_cost,
            average_cost_currency: h.average_cost_currency.clone(),
            price: h.price,
            value: h.current_value,
            cost_basis: h.cost_basis,
            gain_loss: h.gain_loss,
        })
        .collect();

    PortfolioSnapshot {
        id: Id::for_snapshot(user_id, date),
        user_id: user_id.clone(),
        snapshot_date: date,
        currency: valuation.currency.clone(),
        total_value: valuation.total_value,
        total_cost_basis: valuation.total_cost_basis,
        total_gain_loss: valuation.total_gain_loss,
        value_by_asset_type: valuation.value_by_asset_type().into_iter().collect(),
        holdings,
        captured_at,
    }
}

pub struct SnapshotManager {
    portfolio: Arc<PortfolioService>,
    timezone: Tz,
    clock: Arc<dyn Clock>,
}

impl SnapshotManager {
    pub fn new(portfolio: Arc<PortfolioService>) -> Self {
        Self {
            portfolio,
            timezone: Tz::UTC,
            clock: Arc::new(SystemClock),
        }
    }

    /// Timezone that decides which calendar day a capture belongs to.
    pub fn with_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Value the portfolio and store it as the snapshot for `as_of`'s day
    /// (now when `None`). A second capture on the same day overwrites the row.
    pub async fn capture_snapshot(
        &self,
        user_id: &Id,
        as_of: Option<DateTime<Utc>>,
    ) -> Result<(PortfolioSnapshot, UpsertOutcome)> {
        let captured_at = self.clock.now();
        let day = snapshot_day(as_of.unwrap_or(captured_at), self.timezone);

        let valuation = self
            .portfolio
            .valuation(user_id, &LotFilter::default(), false)
            .await?;
        let snapshot = build_snapshot(user_id, day, &valuation, captured_at);

        let (stored, outcome) = self.portfolio.storage().upsert_snapshot(snapshot).await?;
        info!(
            user = %user_id,
            date = %stored.snapshot_date,
            total_value = %stored.total_value,
            outcome = ?outcome,
            "snapshot captured"
        );
        Ok((stored, outcome))
    }

    /// The snapshot stored for `day`, if one was captured.
    pub async fn snapshot_for(&self, user_id: &Id, day: NaiveDate) -> Result<Option<PortfolioSnapshot>> {
        self.portfolio.storage().get_snapshot(user_id, day).await
    }

    /// Stored snapshots between `from` and `to` inclusive, ordered by date.
    pub async fn history(
        &self,
        user_id: &Id,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<PortfolioSnapshot>> {
        let rows = self.portfolio.storage().list_snapshots(user_id).await?;
        Ok(rows
            .into_iter()
            .filter(|s| from.map_or(true, |f| s.snapshot_date >= f))
            .filter(|s| to.map_or(true, |t| s.snapshot_date <= t))
            .collect())
    }
}
