//! Configuration management for the maker/hedge strategy.
//!
//! Loads settings from environment variables and config files. The loaded
//! configuration is immutable for the lifetime of the process.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Instrument and market-history settings
    #[serde(default)]
    pub market: MarketConfig,
    /// Resting-order pricing and sizing
    #[serde(default)]
    pub quoting: QuotingConfig,
    /// Market-condition circuit breaker
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
    /// Timing budgets and failure policy
    #[serde(default)]
    pub execution: ExecutionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketConfig {
    /// Instrument traded on both venues
    #[serde(default = "default_symbol")]
    pub symbol: String,
    /// Maker-venue price increment
    #[serde(default = "default_tick_size")]
    pub tick_size: Decimal,
    /// Rolling history capacity (samples)
    #[serde(default = "default_lookback")]
    pub lookback: usize,
    /// Samples required before indicators are trusted
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotingConfig {
    /// Offset from the touch before multipliers, in ticks
    #[serde(default = "default_base_offset_ticks")]
    pub base_offset_ticks: u32,
    /// Upper clamp for the computed offset, in ticks
    #[serde(default = "default_max_offset_ticks")]
    pub max_offset_ticks: u32,
    /// Quantity of each resting order (base asset)
    #[serde(default = "default_position_size")]
    pub position_size: Decimal,
    /// Relative price deviation that triggers a re-quote (0.001 = 0.1%)
    #[serde(default = "default_requote_threshold")]
    pub requote_threshold: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Maker/hedge volatility ratio above which the hedge is unreliable
    #[serde(default = "default_max_volatility_ratio")]
    pub max_volatility_ratio: f64,
    /// Minimum maker/hedge price correlation
    #[serde(default = "default_min_correlation")]
    pub min_correlation: f64,
    /// Minimum current/average hedge-venue volume
    #[serde(default = "default_min_volume_ratio")]
    pub min_volume_ratio: f64,
    /// Maximum basis volatility relative to the average price
    #[serde(default = "default_max_basis_instability")]
    pub max_basis_instability: f64,
    /// Spike intensity (in sigmas) that triggers an emergency halt
    #[serde(default = "default_emergency_spike_intensity")]
    pub emergency_spike_intensity: f64,
    /// Halt duration after a trigger
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
    /// Stay halted after cooldown until an operator resets the breaker
    #[serde(default)]
    pub require_manual_reset: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Time between cycle starts
    #[serde(default = "default_cycle_interval_ms")]
    pub cycle_interval_ms: u64,
    /// Cycle duration above which a performance warning is logged
    #[serde(default = "default_cycle_budget_ms")]
    pub cycle_budget_ms: u64,
    /// Hard limit for placing and confirming a hedge
    #[serde(default = "default_hedge_timeout_ms")]
    pub hedge_timeout_ms: u64,
    /// Delay between hedge confirmation polls
    #[serde(default = "default_hedge_poll_interval_ms")]
    pub hedge_poll_interval_ms: u64,
    /// Timeout for a single maker-venue call
    #[serde(default = "default_venue_timeout_ms")]
    pub venue_timeout_ms: u64,
    /// Timeout for a market snapshot fetch
    #[serde(default = "default_market_data_timeout_ms")]
    pub market_data_timeout_ms: u64,
    /// Timeout for each cancel when halting
    #[serde(default = "default_cancel_timeout_ms")]
    pub cancel_timeout_ms: u64,
    /// Absolute net delta (base asset) reported as an invariant violation
    #[serde(default = "default_max_net_delta")]
    pub max_net_delta: Decimal,
    /// Stop the engine on a hedge failure; otherwise pause trading
    #[serde(default = "default_stop_on_hedge_failure")]
    pub stop_on_hedge_failure: bool,
    /// Cycles between metric summaries in the log
    #[serde(default = "default_metrics_log_interval")]
    pub metrics_log_interval: u64,
}

// Default value functions
fn default_symbol() -> String {
    "BTCUSDT".to_string()
}

fn default_tick_size() -> Decimal {
    Decimal::new(1, 2) // 0.01
}

fn default_lookback() -> usize {
    100
}

fn default_min_samples() -> usize {
    20 // SMA(20) window
}

fn default_base_offset_ticks() -> u32 {
    2
}

fn default_max_offset_ticks() -> u32 {
    10
}

fn default_position_size() -> Decimal {
    Decimal::new(1, 3) // 0.001 base asset
}

fn default_requote_threshold() -> Decimal {
    Decimal::new(1, 3) // 0.001 (0.1%)
}

fn default_max_volatility_ratio() -> f64 {
    2.0
}

fn default_min_correlation() -> f64 {
    0.6
}

fn default_min_volume_ratio() -> f64 {
    0.5
}

fn default_max_basis_instability() -> f64 {
    0.15
}

fn default_emergency_spike_intensity() -> f64 {
    3.0
}

fn default_cooldown_secs() -> u64 {
    300
}

fn default_cycle_interval_ms() -> u64 {
    50
}

fn default_cycle_budget_ms() -> u64 {
    50
}

fn default_hedge_timeout_ms() -> u64 {
    100
}

fn default_hedge_poll_interval_ms() -> u64 {
    5
}

fn default_venue_timeout_ms() -> u64 {
    250
}

fn default_market_data_timeout_ms() -> u64 {
    300
}

fn default_cancel_timeout_ms() -> u64 {
    100
}

fn default_max_net_delta() -> Decimal {
    Decimal::new(1, 2) // 0.01 base asset
}

fn default_stop_on_hedge_failure() -> bool {
    true
}

fn default_metrics_log_interval() -> u64 {
    1200 // ~1 minute at 50ms cycles
}

impl Config {
    /// Load configuration from environment variables and config files.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::default().separator("__").prefix("MMH"))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.market.tick_size > Decimal::ZERO,
            "tick_size must be positive"
        );

        anyhow::ensure!(
            self.market.min_samples >= 20 && self.market.lookback >= self.market.min_samples,
            "min_samples must be >= 20 and lookback >= min_samples"
        );

        anyhow::ensure!(
            self.quoting.base_offset_ticks >= 1
                && self.quoting.base_offset_ticks <= self.quoting.max_offset_ticks,
            "base_offset_ticks must be >= 1 and <= max_offset_ticks"
        );

        anyhow::ensure!(
            self.quoting.position_size > Decimal::ZERO,
            "position_size must be positive"
        );

        anyhow::ensure!(
            self.quoting.requote_threshold >= Decimal::ZERO
                && self.quoting.requote_threshold < Decimal::ONE,
            "requote_threshold must be between 0 and 1"
        );

        anyhow::ensure!(
            (-1.0..=1.0).contains(&self.circuit_breaker.min_correlation),
            "min_correlation must be between -1 and 1"
        );

        anyhow::ensure!(
            self.execution.cycle_interval_ms > 0
                && self.execution.hedge_timeout_ms > 0
                && self.execution.venue_timeout_ms > 0
                && self.execution.market_data_timeout_ms > 0
                && self.execution.cancel_timeout_ms > 0,
            "cycle interval and all timeouts must be positive"
        );

        anyhow::ensure!(
            self.execution.hedge_poll_interval_ms < self.execution.hedge_timeout_ms,
            "hedge_poll_interval_ms must be shorter than hedge_timeout_ms"
        );

        anyhow::ensure!(
            self.execution.max_net_delta >= Decimal::ZERO,
            "max_net_delta must not be negative"
        );

        Ok(())
    }
}

impl ExecutionConfig {
    pub fn cycle_interval(&self) -> Duration {
        Duration::from_millis(self.cycle_interval_ms)
    }

    pub fn cycle_budget(&self) -> Duration {
        Duration::from_millis(self.cycle_budget_ms)
    }

    pub fn hedge_timeout(&self) -> Duration {
        Duration::from_millis(self.hedge_timeout_ms)
    }

    pub fn hedge_poll_interval(&self) -> Duration {
        Duration::from_millis(self.hedge_poll_interval_ms)
    }

    pub fn venue_timeout(&self) -> Duration {
        Duration::from_millis(self.venue_timeout_ms)
    }

    pub fn market_data_timeout(&self) -> Duration {
        Duration::from_millis(self.market_data_timeout_ms)
    }

    pub fn cancel_timeout(&self) -> Duration {
        Duration::from_millis(self.cancel_timeout_ms)
    }
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            symbol: default_symbol(),
            tick_size: default_tick_size(),
            lookback: default_lookback(),
            min_samples: default_min_samples(),
        }
    }
}

impl Default for QuotingConfig {
    fn default() -> Self {
        Self {
            base_offset_ticks: default_base_offset_ticks(),
            max_offset_ticks: default_max_offset_ticks(),
            position_size: default_position_size(),
            requote_threshold: default_requote_threshold(),
        }
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            max_volatility_ratio: default_max_volatility_ratio(),
            min_correlation: default_min_correlation(),
            min_volume_ratio: default_min_volume_ratio(),
            max_basis_instability: default_max_basis_instability(),
            emergency_spike_intensity: default_emergency_spike_intensity(),
            cooldown_secs: default_cooldown_secs(),
            require_manual_reset: false,
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            cycle_interval_ms: default_cycle_interval_ms(),
            cycle_budget_ms: default_cycle_budget_ms(),
            hedge_timeout_ms: default_hedge_timeout_ms(),
            hedge_poll_interval_ms: default_hedge_poll_interval_ms(),
            venue_timeout_ms: default_venue_timeout_ms(),
            market_data_timeout_ms: default_market_data_timeout_ms(),
            cancel_timeout_ms: default_cancel_timeout_ms(),
            max_net_delta: default_max_net_delta(),
            stop_on_hedge_failure: default_stop_on_hedge_failure(),
            metrics_log_interval: default_metrics_log_interval(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_budgets() {
        let config = Config::default();
        assert_eq!(config.execution.hedge_timeout(), Duration::from_millis(100));
        assert_eq!(config.execution.cycle_budget(), Duration::from_millis(50));
        assert_eq!(config.circuit_breaker.cooldown_secs, 300);
        assert_eq!(config.market.lookback, 100);
    }

    #[test]
    fn test_offset_bounds_validated() {
        let mut config = Config::default();
        config.quoting.base_offset_ticks = 12;
        assert!(config.validate().is_err());

        config.quoting.base_offset_ticks = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_short_history_rejected() {
        let mut config = Config::default();
        config.market.lookback = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_deserialize_uses_defaults() {
        let json = r#"{ "quoting": { "base_offset_ticks": 3 } }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.quoting.base_offset_ticks, 3);
        assert_eq!(config.quoting.max_offset_ticks, 10);
        assert_eq!(config.execution.hedge_timeout_ms, 100);
    }
}
