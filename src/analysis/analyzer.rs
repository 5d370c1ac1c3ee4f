//! Rolling market-condition analysis across the maker and hedge venues.

use serde::Serialize;
use tracing::{debug, trace};

use super::buffer::RollingBuffer;
use super::indicators::{mean, pearson, returns, rsi, sma, std_dev};
use crate::config::MarketConfig;
use crate::error::StrategyError;
use crate::exchange::MarketSnapshot;
use crate::utils::decimal::to_f64;

/// Returns inspected for spikes (most recent first).
const SPIKE_LOOKBACK: usize = 10;
/// Return z-score that counts as a spike.
const SPIKE_SIGMA: f64 = 2.5;
const RSI_PERIOD: usize = 14;
const SMA_PERIOD: usize = 20;
/// Trend strength above which the market is trending (2%).
const TRENDING_THRESHOLD: f64 = 0.02;
/// Trend strength below which the market may be mean reverting (1%).
const MEAN_REVERTING_THRESHOLD: f64 = 0.01;

/// Price behavior classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MarketRegime {
    Trending,
    MeanReverting,
    Neutral,
}

/// Hedge-venue liquidity bucket, from hourly traded volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LiquidityTier {
    UltraLow,
    Low,
    Medium,
    High,
}

impl LiquidityTier {
    pub fn from_hourly_volume(volume: f64) -> Self {
        if volume < 50_000.0 {
            LiquidityTier::UltraLow
        } else if volume < 100_000.0 {
            LiquidityTier::Low
        } else if volume < 500_000.0 {
            LiquidityTier::Medium
        } else {
            LiquidityTier::High
        }
    }
}

/// Indicators derived from the rolling history after each snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketAnalysis {
    /// Maker return volatility divided by hedge return volatility
    pub volatility_ratio: f64,
    /// Maker-venue return volatility
    pub spot_volatility: f64,
    /// Hedge-venue return volatility
    pub hedge_volatility: f64,
    pub spike_detected: bool,
    /// Largest recent return deviation, in sigmas
    pub spike_intensity: f64,
    /// Pearson correlation of maker and hedge prices
    pub correlation: f64,
    /// Mean of hedge price minus maker price
    pub basis_mean: f64,
    pub basis_volatility: f64,
    pub regime: MarketRegime,
    /// |price - SMA20| / SMA20
    pub trend_strength: f64,
    pub rsi: f64,
    pub liquidity_tier: LiquidityTier,
    /// Mean maker price over the history
    pub average_price: f64,
    /// Latest hourly hedge-venue volume
    pub hedge_volume: f64,
    /// Mean hourly hedge-venue volume over the history
    pub average_hedge_volume: f64,
    pub sample_count: usize,
    /// Too little history; indicators are placeholders
    pub insufficient_data: bool,
}

impl MarketAnalysis {
    /// Conservative analysis used until enough history exists. A zero
    /// correlation keeps the breaker open.
    pub fn insufficient(sample_count: usize, hedge_volume: f64, average_price: f64) -> Self {
        Self {
            volatility_ratio: 1.0,
            spot_volatility: 0.0,
            hedge_volatility: 0.0,
            spike_detected: false,
            spike_intensity: 0.0,
            correlation: 0.0,
            basis_mean: 0.0,
            basis_volatility: 0.0,
            regime: MarketRegime::Neutral,
            trend_strength: 0.0,
            rsi: 50.0,
            liquidity_tier: LiquidityTier::from_hourly_volume(hedge_volume),
            average_price,
            hedge_volume,
            average_hedge_volume: hedge_volume,
            sample_count,
            insufficient_data: true,
        }
    }

    /// Current hedge volume relative to its rolling average.
    pub fn volume_ratio(&self) -> f64 {
        if self.average_hedge_volume <= 0.0 {
            return 0.0;
        }
        self.hedge_volume / self.average_hedge_volume
    }

    /// Basis volatility relative to the average price.
    pub fn basis_instability(&self) -> f64 {
        if self.average_price <= 0.0 {
            return 0.0;
        }
        self.basis_volatility / self.average_price
    }

    /// The data error behind a placeholder analysis.
    pub fn data_error(&self, required: usize) -> Option<StrategyError> {
        self.insufficient_data.then_some(StrategyError::InsufficientData {
            samples: self.sample_count,
            required,
        })
    }
}

/// Maintains bounded price/volume history for both venues and derives
/// [`MarketAnalysis`] from it.
///
/// Output is deterministic given the buffer contents.
#[derive(Debug)]
pub struct MarketAnalyzer {
    min_samples: usize,
    maker_prices: RollingBuffer<f64>,
    hedge_prices: RollingBuffer<f64>,
    hedge_volumes: RollingBuffer<f64>,
}

impl MarketAnalyzer {
    pub fn new(config: &MarketConfig) -> Self {
        Self {
            min_samples: config.min_samples,
            maker_prices: RollingBuffer::new(config.lookback),
            hedge_prices: RollingBuffer::new(config.lookback),
            hedge_volumes: RollingBuffer::new(config.lookback),
        }
    }

    pub fn min_samples(&self) -> usize {
        self.min_samples
    }

    pub fn sample_count(&self) -> usize {
        self.maker_prices.len()
    }

    /// Record a snapshot and recompute indicators.
    pub fn update(&mut self, snapshot: &MarketSnapshot) -> MarketAnalysis {
        self.maker_prices.push(to_f64(snapshot.maker_mid()));
        self.hedge_prices.push(to_f64(snapshot.hedge_mid()));
        self.hedge_volumes.push(to_f64(snapshot.hedge_volume));

        self.analyze()
    }

    /// Indicators for the current buffer contents.
    pub fn analyze(&self) -> MarketAnalysis {
        let maker = self.maker_prices.to_vec();
        let hedge = self.hedge_prices.to_vec();
        let volumes = self.hedge_volumes.to_vec();
        let hedge_volume = self.hedge_volumes.latest().unwrap_or(0.0);

        if maker.len() < self.min_samples {
            trace!(samples = maker.len(), required = self.min_samples, "Warming up analyzer");
            return MarketAnalysis::insufficient(maker.len(), hedge_volume, mean(&maker));
        }

        let maker_returns = returns(&maker);
        let hedge_returns = returns(&hedge);
        let spot_volatility = std_dev(&maker_returns);
        let hedge_volatility = std_dev(&hedge_returns);
        let volatility_ratio = volatility_ratio(spot_volatility, hedge_volatility);

        let (spike_detected, spike_intensity) = detect_spike(&maker_returns);

        let basis: Vec<f64> = hedge.iter().zip(&maker).map(|(h, m)| h - m).collect();

        let price = maker.last().copied().unwrap_or(0.0);
        let sma20 = sma(&maker, SMA_PERIOD);
        let trend_strength = if sma20 > 0.0 {
            (price - sma20).abs() / sma20
        } else {
            0.0
        };
        let rsi = rsi(&maker, RSI_PERIOD);
        let regime = classify_regime(trend_strength, rsi);

        let analysis = MarketAnalysis {
            volatility_ratio,
            spot_volatility,
            hedge_volatility,
            spike_detected,
            spike_intensity,
            correlation: pearson(&maker, &hedge),
            basis_mean: mean(&basis),
            basis_volatility: std_dev(&basis),
            regime,
            trend_strength,
            rsi,
            liquidity_tier: LiquidityTier::from_hourly_volume(hedge_volume),
            average_price: mean(&maker),
            hedge_volume,
            average_hedge_volume: mean(&volumes),
            sample_count: maker.len(),
            insufficient_data: false,
        };

        debug!(
            volatility_ratio = analysis.volatility_ratio,
            correlation = analysis.correlation,
            spike = analysis.spike_detected,
            regime = ?analysis.regime,
            liquidity = ?analysis.liquidity_tier,
            "Market analysis updated"
        );

        analysis
    }
}

fn volatility_ratio(spot: f64, hedge: f64) -> f64 {
    if hedge > 0.0 {
        spot / hedge
    } else if spot > 0.0 {
        f64::INFINITY
    } else {
        1.0
    }
}

/// Largest z-score among the most recent returns, measured against the whole
/// return distribution.
fn detect_spike(returns: &[f64]) -> (bool, f64) {
    let sigma = std_dev(returns);
    if sigma <= 0.0 {
        return (false, 0.0);
    }
    let mu = mean(returns);

    let intensity = returns
        .iter()
        .rev()
        .take(SPIKE_LOOKBACK)
        .map(|r| (r - mu).abs() / sigma)
        .fold(0.0, f64::max);

    (intensity > SPIKE_SIGMA, intensity)
}

fn classify_regime(trend_strength: f64, rsi: f64) -> MarketRegime {
    if trend_strength > TRENDING_THRESHOLD {
        MarketRegime::Trending
    } else if trend_strength < MEAN_REVERTING_THRESHOLD && (30.0..=70.0).contains(&rsi) {
        MarketRegime::MeanReverting
    } else {
        MarketRegime::Neutral
    }
}
