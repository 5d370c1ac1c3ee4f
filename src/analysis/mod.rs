//! Market-condition analysis.
//!
//! Turns the per-cycle snapshot stream into trading signals:
//! - Cross-venue volatility ratio and price correlation
//! - Spike detection on recent returns
//! - Basis level and stability
//! - Regime (RSI + SMA deviation) and hedge-venue liquidity tier

mod analyzer;
mod buffer;
pub mod indicators;

pub use analyzer::{LiquidityTier, MarketAnalysis, MarketAnalyzer, MarketRegime};
pub use buffer::RollingBuffer;
