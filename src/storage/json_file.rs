use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use tokio::fs;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

use super::{latest_of, sort_snapshots, upsert_into, Storage};
use crate::models::{
    DividendPayment, Id, Lot, ManualPrice, PortfolioSnapshot, Symbol, UpsertOutcome,
};

/// JSON file-based storage implementation.
///
/// Directory structure:
/// ```text
/// data/
///   manual_prices.jsonl
///   users/
///     {user_id}/
///       lots.json
///       dividends.json
///       snapshots.json
/// ```
///
/// Read-modify-write operations run under one write lock, so a snapshot
/// upsert checks and writes its (user, day) row atomically within a process.
pub struct JsonFileStorage {
    base_path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStorage {
    pub fn new(base_path: impl AsRef<Path>) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    fn user_dir(&self, user_id: &Id) -> Result<PathBuf> {
        if !Id::is_path_safe(user_id.as_str()) {
            anyhow::bail!("Invalid user id {:?}", user_id.as_str());
        }
        Ok(self.base_path.join("users").join(user_id.as_str()))
    }

    fn lots_file(&self, user_id: &Id) -> Result<PathBuf> {
        Ok(self.user_dir(user_id)?.join("lots.json"))
    }

    fn dividends_file(&self, user_id: &Id) -> Result<PathBuf> {
        Ok(self.user_dir(user_id)?.join("dividends.json"))
    }

    fn snapshots_file(&self, user_id: &Id) -> Result<PathBuf> {
        Ok(self.user_dir(user_id)?.join("snapshots.json"))
    }

    fn manual_prices_file(&self) -> PathBuf {
        self.base_path.join("manual_prices.jsonl")
    }

    async fn read_list<T: for<'de> serde::Deserialize<'de>>(&self, path: &Path) -> Result<Vec<T>> {
        match fs::read_to_string(path).await {
            Ok(content) => serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse JSON from {:?}", path)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e).context("Failed to read file"),
        }
    }

    async fn read_jsonl<T: for<'de> serde::Deserialize<'de>>(&self, path: &Path) -> Result<Vec<T>> {
        let file = match fs::File::open(path).await {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e).context("Failed to open file"),
        };

        let reader = BufReader::new(file);
        let mut lines = reader.lines();
        let mut items = Vec::new();

        while let Some(line) = lines.next_line().await.context("Failed to read line")? {
            if line.trim().is_empty() {
                continue;
            }
            let item: T = serde_json::from_str(&line)
                .with_context(|| format!("Failed to parse JSONL line: {}", line))?;
            items.push(item);
        }

        Ok(items)
    }

    async fn append_jsonl<T: serde::Serialize>(&self, path: &Path, item: &T) -> Result<()> {
        ensure_parent(path).await?;

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .context("Failed to open file for append")?;

        let mut line = serde_json::to_string(item).context("Failed to serialize item")?;
        line.push('\n');
        file.write_all(line.as_bytes()).await?;
        Ok(())
    }
}

async fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .context("Failed to create directory")?;
    }
    Ok(())
}

/// Write `value` as pretty JSON through a temporary file renamed into place.
pub(crate) async fn write_json_atomic<T: serde::Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    ensure_parent(path).await?;
    let content = serde_json::to_string_pretty(value).context("Failed to serialize JSON")?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, content)
        .await
        .with_context(|| format!("Failed to write {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .await
        .with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}

#[async_trait::async_trait]
impl Storage for JsonFileStorage {
    async fn list_lots(&self, user_id: &Id) -> Result<Vec<Lot>> {
        self.read_list(&self.lots_file(user_id)?).await
    }

    async fn get_lot(&self, user_id: &Id, lot_id: &Id) -> Result<Option<Lot>> {
        let lots: Vec<Lot> = self.list_lots(user_id).await?;
        Ok(lots.into_iter().find(|l| &l.id == lot_id))
    }

    async fn save_lot(&self, lot: &Lot) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let path = self.lots_file(&lot.user_id)?;
        let mut lots: Vec<Lot> = self.read_list(&path).await?;
        match lots.iter_mut().find(|l| l.id == lot.id) {
            Some(existing) => *existing = lot.clone(),
            None => lots.push(lot.clone()),
        }
        write_json_atomic(&path, &lots).await
    }

    async fn delete_lot(&self, user_id: &Id, lot_id: &Id) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let lots_path = self.lots_file(user_id)?;
        let mut lots: Vec<Lot> = self.read_list(&lots_path).await?;
        let before = lots.len();
        lots.retain(|l| &l.id != lot_id);
        if lots.len() == before {
            return Ok(false);
        }

        // Dividends go first so none outlives its lot.
        let dividends_path = self.dividends_file(user_id)?;
        let mut dividends: Vec<DividendPayment> = self.read_list(&dividends_path).await?;
        let dividend_count = dividends.len();
        dividends.retain(|d| &d.lot_id != lot_id);
        if dividends.len() != dividend_count {
            write_json_atomic(&dividends_path, &dividends).await?;
        }
        write_json_atomic(&lots_path, &lots).await?;
        Ok(true)
    }

    async fn list_dividends(&self, user_id: &Id) -> Result<Vec<DividendPayment>> {
        self.read_list(&self.dividends_file(user_id)?).await
    }

    async fn add_dividend(&self, user_id: &Id, dividend: &DividendPayment) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let lots: Vec<Lot> = self.read_list(&self.lots_file(user_id)?).await?;
        if !lots.iter().any(|l| l.id == dividend.lot_id) {
            anyhow::bail!("Lot not found: {}", dividend.lot_id);
        }
        let path = self.dividends_file(user_id)?;
        let mut dividends: Vec<DividendPayment> = self.read_list(&path).await?;
        dividends.push(dividend.clone());
        write_json_atomic(&path, &dividends).await
    }

    async fn add_manual_price(&self, price: &ManualPrice) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.append_jsonl(&self.manual_prices_file(), price).await
    }

    async fn latest_manual_price(&self, symbol: &Symbol) -> Result<Option<ManualPrice>> {
        let prices: Vec<ManualPrice> = self.read_jsonl(&self.manual_prices_file()).await?;
        Ok(latest_of(prices.iter(), symbol))
    }

    async fn upsert_snapshot(
        &self,
        snapshot: PortfolioSnapshot,
    ) -> Result<(PortfolioSnapshot, UpsertOutcome)> {
        let _guard = self.write_lock.lock().await;
        let path = self.snapshots_file(&snapshot.user_id)?;
        let mut rows: Vec<PortfolioSnapshot> = self.read_list(&path).await?;
        let result = upsert_into(&mut rows, snapshot);
        write_json_atomic(&path, &rows).await?;
        Ok(result)
    }

    async fn get_snapshot(&self, user_id: &Id, date: NaiveDate) -> Result<Option<PortfolioSnapshot>> {
        let rows = self.list_snapshots(user_id).await?;
        Ok(rows.into_iter().find(|s| s.snapshot_date == date))
    }

    async fn list_snapshots(&self, user_id: &Id) -> Result<Vec<PortfolioSnapshot>> {
        let mut rows: Vec<PortfolioSnapshot> = self.read_list(&self.snapshots_file(user_id)?).await?;
        sort_snapshots(&mut rows);
        Ok(rows)
    }
}
