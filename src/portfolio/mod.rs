//! Orchestration of lots, prices, rates and valuation for one user.

mod service;

pub use service::PortfolioService;
