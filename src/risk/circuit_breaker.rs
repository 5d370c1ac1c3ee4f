//! Market-condition circuit breaker.
//!
//! Halts trading when the maker/hedge relationship becomes unreliable:
//! - Volatility diverging between venues
//! - Price correlation breakdown
//! - Hedge-venue volume drought
//! - Unstable basis
//! - Emergency price spikes
//!
//! Evaluation is a pure function of the analysis; the breaker state
//! (activation time, cooldown) is only changed by [`VolatilityCircuitBreaker::apply`].

use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

use super::alerts::{AlertSeverity, RiskAlert, RiskAlertType};
use crate::analysis::MarketAnalysis;
use crate::config::CircuitBreakerConfig;

/// Reason the breaker tripped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BreakerTrigger {
    VolatilitySpike,
    CorrelationBreakdown,
    VolumeDrought,
    BasisInstability,
    EmergencySpike,
    /// Analyzer is still warming up
    InsufficientData,
}

/// Outcome of evaluating one analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BreakerDecision {
    pub should_trigger: bool,
    pub triggers: Vec<BreakerTrigger>,
    pub cooldown_seconds: u64,
}

impl BreakerDecision {
    fn clear() -> Self {
        Self {
            should_trigger: false,
            triggers: Vec::new(),
            cooldown_seconds: 0,
        }
    }

    fn is_warm_up(&self) -> bool {
        self.triggers == [BreakerTrigger::InsufficientData]
    }
}

/// Live breaker state, present only while the breaker is active.
#[derive(Debug, Clone, Serialize)]
pub struct CircuitBreakerState {
    pub active: bool,
    pub triggers: BTreeSet<BreakerTrigger>,
    pub activated_at: DateTime<Utc>,
    pub cooldown_until: DateTime<Utc>,
}

/// Breaker status after applying a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerStatus {
    /// Not active; trading allowed.
    Armed,
    /// Became active on this evaluation.
    Tripped { cooldown_until: DateTime<Utc> },
    /// Still active (cooling down, re-triggered or awaiting manual reset).
    Active { cooldown_until: DateTime<Utc> },
    /// Cooldown elapsed with a clean evaluation; trading allowed again.
    Reset,
}

impl BreakerStatus {
    pub fn trading_allowed(&self) -> bool {
        matches!(self, BreakerStatus::Armed | BreakerStatus::Reset)
    }
}

/// Decides whether market conditions allow trading.
pub struct VolatilityCircuitBreaker {
    config: CircuitBreakerConfig,
    state: Option<CircuitBreakerState>,
    activations: u64,
}

impl VolatilityCircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            state: None,
            activations: 0,
        }
    }

    /// Evaluate every trigger condition independently and report all that
    /// match. Identical input always yields an identical decision.
    pub fn evaluate(&self, analysis: &MarketAnalysis) -> BreakerDecision {
        if analysis.insufficient_data {
            // Warm-up halts trading without starting a cooldown
            return BreakerDecision {
                should_trigger: true,
                triggers: vec![BreakerTrigger::InsufficientData],
                cooldown_seconds: 0,
            };
        }

        let mut triggers = Vec::new();

        if analysis.volatility_ratio > self.config.max_volatility_ratio {
            triggers.push(BreakerTrigger::VolatilitySpike);
        }
        if analysis.correlation < self.config.min_correlation {
            triggers.push(BreakerTrigger::CorrelationBreakdown);
        }
        if analysis.volume_ratio() < self.config.min_volume_ratio {
            triggers.push(BreakerTrigger::VolumeDrought);
        }
        if analysis.basis_instability() > self.config.max_basis_instability {
            triggers.push(BreakerTrigger::BasisInstability);
        }
        if analysis.spike_detected && analysis.spike_intensity > self.config.emergency_spike_intensity
        {
            triggers.push(BreakerTrigger::EmergencySpike);
        }

        if triggers.is_empty() {
            return BreakerDecision::clear();
        }

        BreakerDecision {
            should_trigger: true,
            triggers,
            cooldown_seconds: self.config.cooldown_secs,
        }
    }

    /// Update breaker state with a decision taken at `now`.
    pub fn apply(
        &mut self,
        decision: &BreakerDecision,
        analysis: &MarketAnalysis,
        now: DateTime<Utc>,
    ) -> BreakerStatus {
        let cooldown = Duration::seconds(decision.cooldown_seconds as i64);

        let Some(state) = self.state.as_mut() else {
            if !decision.should_trigger {
                return BreakerStatus::Armed;
            }
            let cooldown_until = now + cooldown;
            self.state = Some(CircuitBreakerState {
                active: true,
                triggers: decision.triggers.iter().copied().collect(),
                activated_at: now,
                cooldown_until,
            });
            if decision.is_warm_up() {
                debug!("Circuit breaker holding until analyzer has enough history");
            } else {
                self.activations += 1;
                Self::trip_alert(decision, analysis).emit();
            }
            return BreakerStatus::Tripped { cooldown_until };
        };

        if now < state.cooldown_until {
            state.triggers.extend(decision.triggers.iter().copied());
            return BreakerStatus::Active {
                cooldown_until: state.cooldown_until,
            };
        }

        if decision.should_trigger {
            // Conditions still unsafe after cooldown: start a fresh one
            let was_warm_up = state.triggers.iter().all(|t| *t == BreakerTrigger::InsufficientData);
            state.triggers = decision.triggers.iter().copied().collect();
            state.cooldown_until = now + cooldown;
            if was_warm_up && !decision.is_warm_up() {
                self.activations += 1;
                state.activated_at = now;
                Self::trip_alert(decision, analysis).emit();
            } else if !decision.is_warm_up() {
                warn!(triggers = ?decision.triggers, "Circuit breaker re-triggered after cooldown");
            }
            return BreakerStatus::Active {
                cooldown_until: state.cooldown_until,
            };
        }

        if self.config.require_manual_reset {
            debug!("Cooldown elapsed, circuit breaker awaiting manual reset");
            return BreakerStatus::Active {
                cooldown_until: state.cooldown_until,
            };
        }

        let was_warm_up = state.triggers.iter().all(|t| *t == BreakerTrigger::InsufficientData);
        self.state = None;
        if was_warm_up {
            info!("Analyzer warmed up, circuit breaker armed");
        } else {
            RiskAlert::new(
                RiskAlertType::CircuitBreakerReset,
                AlertSeverity::Info,
                "Circuit breaker re-armed after clean evaluation".to_string(),
                "Resume quoting".to_string(),
            )
            .emit();
        }
        BreakerStatus::Reset
    }

    /// Operator reset. Clears the breaker regardless of cooldown.
    pub fn reset(&mut self) {
        if self.state.take().is_some() {
            info!("Circuit breaker reset by operator");
        }
    }

    pub fn state(&self) -> Option<&CircuitBreakerState> {
        self.state.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.state.is_some()
    }

    /// Non-warm-up activations since start.
    pub fn activations(&self) -> u64 {
        self.activations
    }

    fn trip_alert(decision: &BreakerDecision, analysis: &MarketAnalysis) -> RiskAlert {
        let severity = if decision.triggers.contains(&BreakerTrigger::EmergencySpike) {
            AlertSeverity::Critical
        } else {
            AlertSeverity::Error
        };
        let metric = |v: f64| Decimal::from_f64(v).unwrap_or_default();

        RiskAlert::new(
            RiskAlertType::CircuitBreakerTripped {
                triggers: decision.triggers.clone(),
            },
            severity,
            format!(
                "Circuit breaker tripped by {:?}, halting for {}s",
                decision.triggers, decision.cooldown_seconds
            ),
            "Cancel resting orders and wait for cooldown".to_string(),
        )
        .with_metric("volatility_ratio", metric(analysis.volatility_ratio))
        .with_metric("correlation", metric(analysis.correlation))
        .with_metric("volume_ratio", metric(analysis.volume_ratio()))
        .with_metric("basis_instability", metric(analysis.basis_instability()))
        .with_metric("spike_intensity", metric(analysis.spike_intensity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{LiquidityTier, MarketRegime};

    fn healthy() -> MarketAnalysis {
        MarketAnalysis {
            volatility_ratio: 1.0,
            spot_volatility: 0.001,
            hedge_volatility: 0.001,
            spike_detected: false,
            spike_intensity: 1.0,
            correlation: 0.95,
            basis_mean: 0.02,
            basis_volatility: 0.01,
            regime: MarketRegime::Neutral,
            trend_strength: 0.005,
            rsi: 50.0,
            liquidity_tier: LiquidityTier::High,
            average_price: 100.0,
            hedge_volume: 750_000.0,
            average_hedge_volume: 750_000.0,
            sample_count: 100,
            insufficient_data: false,
        }
    }

    fn breaker() -> VolatilityCircuitBreaker {
        VolatilityCircuitBreaker::new(CircuitBreakerConfig::default())
    }

    #[test]
    fn test_healthy_market_is_clear() {
        let decision = breaker().evaluate(&healthy());
        assert!(!decision.should_trigger);
        assert!(decision.triggers.is_empty());
    }

    #[test]
    fn test_correlation_breakdown() {
        let analysis = MarketAnalysis {
            correlation: 0.55,
            ..healthy()
        };
        let decision = breaker().evaluate(&analysis);

        assert!(decision.should_trigger);
        assert!(decision.triggers.contains(&BreakerTrigger::CorrelationBreakdown));
        assert_eq!(decision.cooldown_seconds, 300);
    }

    #[test]
    fn test_all_matching_triggers_reported() {
        let analysis = MarketAnalysis {
            volatility_ratio: 3.0,
            correlation: 0.1,
            hedge_volume: 100_000.0,
            basis_volatility: 20.0,
            spike_detected: true,
            spike_intensity: 4.0,
            ..healthy()
        };
        let decision = breaker().evaluate(&analysis);

        assert_eq!(
            decision.triggers,
            vec![
                BreakerTrigger::VolatilitySpike,
                BreakerTrigger::CorrelationBreakdown,
                BreakerTrigger::VolumeDrought,
                BreakerTrigger::BasisInstability,
                BreakerTrigger::EmergencySpike,
            ]
        );
    }

    #[test]
    fn test_spike_below_emergency_intensity_does_not_trigger() {
        let analysis = MarketAnalysis {
            spike_detected: true,
            spike_intensity: 2.8,
            ..healthy()
        };
        assert!(!breaker().evaluate(&analysis).should_trigger);
    }

    #[test]
    fn test_evaluate_is_idempotent() {
        let breaker = breaker();
        let analysis = MarketAnalysis {
            correlation: 0.3,
            volatility_ratio: 2.5,
            ..healthy()
        };
        assert_eq!(breaker.evaluate(&analysis), breaker.evaluate(&analysis));
        assert_eq!(breaker.evaluate(&healthy()), breaker.evaluate(&healthy()));
    }

    #[test]
    fn test_insufficient_data_blocks_without_cooldown() {
        let mut breaker = breaker();
        let analysis = MarketAnalysis::insufficient(5, 750_000.0, 100.0);
        let decision = breaker.evaluate(&analysis);

        assert_eq!(decision.triggers, vec![BreakerTrigger::InsufficientData]);
        assert_eq!(decision.cooldown_seconds, 0);

        let now = Utc::now();
        assert!(!breaker.apply(&decision, &analysis, now).trading_allowed());
        assert_eq!(breaker.activations(), 0);

        let clean = breaker.evaluate(&healthy());
        assert_eq!(breaker.apply(&clean, &healthy(), now), BreakerStatus::Reset);
    }

    #[test]
    fn test_cooldown_then_rearm() {
        let mut breaker = breaker();
        let bad = MarketAnalysis {
            correlation: 0.55,
            ..healthy()
        };
        let t0 = Utc::now();

        let tripped = breaker.apply(&breaker.evaluate(&bad), &bad, t0);
        assert_eq!(
            tripped,
            BreakerStatus::Tripped {
                cooldown_until: t0 + Duration::seconds(300)
            }
        );
        assert_eq!(breaker.activations(), 1);

        // Clean evaluation during cooldown keeps the breaker active
        let clean = breaker.evaluate(&healthy());
        let during = breaker.apply(&clean, &healthy(), t0 + Duration::seconds(100));
        assert!(!during.trading_allowed());

        // Clean evaluation after cooldown re-arms
        let after = breaker.apply(&clean, &healthy(), t0 + Duration::seconds(301));
        assert_eq!(after, BreakerStatus::Reset);
        assert!(!breaker.is_active());
    }

    #[test]
    fn test_still_unsafe_after_cooldown_restarts_cooldown() {
        let mut breaker = breaker();
        let bad = MarketAnalysis {
            volatility_ratio: 5.0,
            ..healthy()
        };
        let t0 = Utc::now();
        breaker.apply(&breaker.evaluate(&bad), &bad, t0);

        let t1 = t0 + Duration::seconds(301);
        let status = breaker.apply(&breaker.evaluate(&bad), &bad, t1);
        assert_eq!(
            status,
            BreakerStatus::Active {
                cooldown_until: t1 + Duration::seconds(300)
            }
        );
    }

    #[test]
    fn test_manual_reset_required() {
        let mut breaker = VolatilityCircuitBreaker::new(CircuitBreakerConfig {
            require_manual_reset: true,
            ..Default::default()
        });
        let bad = MarketAnalysis {
            correlation: 0.2,
            ..healthy()
        };
        let t0 = Utc::now();
        breaker.apply(&breaker.evaluate(&bad), &bad, t0);

        let clean = breaker.evaluate(&healthy());
        let status = breaker.apply(&clean, &healthy(), t0 + Duration::seconds(400));
        assert!(!status.trading_allowed());

        breaker.reset();
        assert_eq!(breaker.apply(&clean, &healthy(), t0 + Duration::seconds(401)), BreakerStatus::Armed);
    }
}
