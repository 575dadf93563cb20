pub mod clock;
pub mod config;
pub mod dividends;
pub mod duration;
pub mod format;
pub mod fx;
pub mod holdings;
pub mod market_data;
pub mod models;
pub mod portfolio;
pub mod snapshot;
pub mod storage;
pub mod valuation;
