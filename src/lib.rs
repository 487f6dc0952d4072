// =============================================================================
// Polaris Advisor, a daily trading recommendation engine
// =============================================================================
//
// Polaris runs a set of independent technical-analysis strategies over OHLCV
// market data, condenses their signals into one regime-weighted aggregate and
// turns that aggregate into an explainable BUY / SELL / HOLD recommendation
// per instrument. Recommendations are served over a small REST API and kept
// in an in-memory single-flight cache refreshed by a daily scheduler.

pub mod api;
pub mod app_state;
pub mod cache;
pub mod condenser;
pub mod config;
pub mod decision;
pub mod engine;
pub mod explain;
pub mod indicators;
pub mod market_data;
pub mod observer;
pub mod regime;
pub mod scheduler;
pub mod strategy;
pub mod types;

/// Version stamped into every produced recommendation.
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
