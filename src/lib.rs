//! # Maker Hedger
//!
//! A market-making engine that rests limit orders on a maker venue and hedges
//! every fill immediately on a second venue, keeping net delta near zero.
//!
//! ## Architecture
//!
//! - `config`: Configuration management and validation
//! - `error`: Venue and strategy error types
//! - `exchange`: Venue capability traits, order types and simulated venues
//! - `analysis`: Rolling market analysis (volatility, correlation, regime)
//! - `risk`: Volatility circuit breaker and structured risk alerts
//! - `strategy`: Offset calculation, maker orders, hedging and the cycle loop
//! - `utils`: Shared utilities and decimal arithmetic

pub mod analysis;
pub mod config;
pub mod error;
pub mod exchange;
pub mod risk;
pub mod strategy;
pub mod utils;

pub use config::Config;
