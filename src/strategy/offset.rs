//! Dynamic quote offset from the touch.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;

use crate::analysis::{LiquidityTier, MarketAnalysis, MarketRegime};
use crate::config::QuotingConfig;
use crate::exchange::{BookTop, OrderSide};
use crate::utils::decimal::round_half_up;

/// Multipliers applied to the base offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OffsetMultipliers {
    pub volatility: Decimal,
    pub regime: Decimal,
    pub liquidity: Decimal,
    pub emergency: Decimal,
}

impl OffsetMultipliers {
    pub fn product(&self) -> Decimal {
        self.volatility * self.regime * self.liquidity * self.emergency
    }
}

/// Target for one side's resting order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OffsetDecision {
    pub side: OrderSide,
    pub offset_ticks: u32,
    pub target_price: Decimal,
    pub multipliers: OffsetMultipliers,
}

/// Targets for both sides in one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteDecisions {
    pub buy: OffsetDecision,
    pub sell: OffsetDecision,
}

impl QuoteDecisions {
    pub fn for_side(&self, side: OrderSide) -> &OffsetDecision {
        match side {
            OrderSide::Buy => &self.buy,
            OrderSide::Sell => &self.sell,
        }
    }
}

/// Computes how far behind the touch each resting order sits.
///
/// Wider in volatile, trending, thin or spiking markets; tighter when the
/// market is calm and mean reverting. Stateless.
#[derive(Debug, Clone)]
pub struct DynamicOffsetCalculator {
    base_offset_ticks: u32,
    max_offset_ticks: u32,
    tick_size: Decimal,
}

impl DynamicOffsetCalculator {
    pub fn new(config: &QuotingConfig, tick_size: Decimal) -> Self {
        Self {
            base_offset_ticks: config.base_offset_ticks,
            max_offset_ticks: config.max_offset_ticks.max(1),
            tick_size,
        }
    }

    /// Offset and target price for `side` against the maker book.
    pub fn compute(&self, analysis: &MarketAnalysis, side: OrderSide, book: &BookTop) -> OffsetDecision {
        let multipliers = Self::multipliers(analysis);
        let raw = round_half_up(Decimal::from(self.base_offset_ticks) * multipliers.product());
        let offset_ticks = raw
            .to_u32()
            .unwrap_or(self.max_offset_ticks)
            .clamp(1, self.max_offset_ticks);

        let offset = Decimal::from(offset_ticks) * self.tick_size;
        let target_price = match side {
            OrderSide::Buy => book.best_bid - offset,
            OrderSide::Sell => book.best_ask + offset,
        };

        OffsetDecision {
            side,
            offset_ticks,
            target_price,
            multipliers,
        }
    }

    /// Decisions for both sides.
    pub fn compute_both(&self, analysis: &MarketAnalysis, book: &BookTop) -> QuoteDecisions {
        QuoteDecisions {
            buy: self.compute(analysis, OrderSide::Buy, book),
            sell: self.compute(analysis, OrderSide::Sell, book),
        }
    }

    fn multipliers(analysis: &MarketAnalysis) -> OffsetMultipliers {
        let volatility = if analysis.volatility_ratio > 1.2 {
            dec!(1.5)
        } else if analysis.volatility_ratio < 0.8 {
            dec!(0.8)
        } else {
            dec!(1.0)
        };

        let regime = match analysis.regime {
            MarketRegime::MeanReverting => dec!(0.7),
            MarketRegime::Trending => dec!(1.5),
            MarketRegime::Neutral => dec!(1.0),
        };

        let liquidity = match analysis.liquidity_tier {
            LiquidityTier::UltraLow => dec!(1.5),
            LiquidityTier::Low => dec!(1.3),
            LiquidityTier::Medium => dec!(1.0),
            LiquidityTier::High => dec!(0.8),
        };

        let emergency = if analysis.spike_detected {
            dec!(1.3)
        } else {
            dec!(1.0)
        };

        OffsetMultipliers {
            volatility,
            regime,
            liquidity,
            emergency,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analysis(
        volatility_ratio: f64,
        regime: MarketRegime,
        liquidity_tier: LiquidityTier,
        spike_detected: bool,
    ) -> MarketAnalysis {
        MarketAnalysis {
            volatility_ratio,
            regime,
            liquidity_tier,
            spike_detected,
            insufficient_data: false,
            ..MarketAnalysis::insufficient(100, 750_000.0, 100.0)
        }
    }

    fn calculator(base: u32, max: u32) -> DynamicOffsetCalculator {
        DynamicOffsetCalculator::new(
            &QuotingConfig {
                base_offset_ticks: base,
                max_offset_ticks: max,
                ..Default::default()
            },
            dec!(0.01),
        )
    }

    fn book() -> BookTop {
        BookTop {
            best_bid: dec!(100.00),
            best_ask: dec!(100.02),
        }
    }

    #[test]
    fn test_volatile_mean_reverting_low_liquidity() {
        let analysis = analysis(1.5, MarketRegime::MeanReverting, LiquidityTier::Low, false);
        let decision = calculator(2, 10).compute(&analysis, OrderSide::Buy, &book());

        // round(2 x 1.5 x 0.7 x 1.3 x 1.0) = round(2.73) = 3
        assert_eq!(decision.offset_ticks, 3);
        assert_eq!(decision.multipliers.product(), dec!(1.365));
        assert_eq!(decision.target_price, dec!(99.97));
    }

    #[test]
    fn test_sell_side_quotes_above_ask() {
        let analysis = analysis(1.0, MarketRegime::Neutral, LiquidityTier::Medium, false);
        let decision = calculator(2, 10).compute(&analysis, OrderSide::Sell, &book());

        assert_eq!(decision.offset_ticks, 2);
        assert_eq!(decision.target_price, dec!(100.04));
    }

    #[test]
    fn test_clamped_to_max() {
        let analysis = analysis(2.0, MarketRegime::Trending, LiquidityTier::UltraLow, true);
        // 5 x 1.5 x 1.5 x 1.5 x 1.3 = 21.9
        let decision = calculator(5, 10).compute(&analysis, OrderSide::Buy, &book());
        assert_eq!(decision.offset_ticks, 10);
    }

    #[test]
    fn test_clamped_to_one_tick() {
        let analysis = analysis(0.5, MarketRegime::MeanReverting, LiquidityTier::High, false);
        // 1 x 0.8 x 0.7 x 0.8 = 0.448 rounds to 0
        let decision = calculator(1, 10).compute(&analysis, OrderSide::Buy, &book());
        assert_eq!(decision.offset_ticks, 1);
        assert_eq!(decision.target_price, dec!(99.99));
    }

    #[test]
    fn test_offset_bounds_hold_for_all_inputs() {
        let regimes = [MarketRegime::Trending, MarketRegime::MeanReverting, MarketRegime::Neutral];
        let tiers = [
            LiquidityTier::UltraLow,
            LiquidityTier::Low,
            LiquidityTier::Medium,
            LiquidityTier::High,
        ];

        for base in 1..=6 {
            for max in base..=8 {
                let calc = calculator(base, max);
                for ratio in [0.1, 0.8, 1.0, 1.2, 1.21, 5.0, f64::INFINITY] {
                    for regime in regimes {
                        for tier in tiers {
                            for spike in [false, true] {
                                let a = analysis(ratio, regime, tier, spike);
                                for side in OrderSide::ALL {
                                    let d = calc.compute(&a, side, &book());
                                    assert!(d.offset_ticks >= 1 && d.offset_ticks <= max);
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_compute_both() {
        let analysis = analysis(1.0, MarketRegime::Neutral, LiquidityTier::Medium, false);
        let decisions = calculator(2, 10).compute_both(&analysis, &book());

        assert!(decisions.buy.target_price < book().best_bid);
        assert!(decisions.sell.target_price > book().best_ask);
        assert_eq!(decisions.for_side(OrderSide::Sell).side, OrderSide::Sell);
    }
}
