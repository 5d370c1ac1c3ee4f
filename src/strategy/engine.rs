//! The per-cycle control loop tying analysis, risk, quoting and hedging
//! together.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, RwLock};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::hedge::{HedgeExecutor, HedgeResult, NetPositionState};
use super::maker::{bounded, FillEvent, MakerOrderEngine, ReconcileResult};
use super::metrics::StrategyMetrics;
use super::offset::DynamicOffsetCalculator;
use crate::analysis::{MarketAnalysis, MarketAnalyzer};
use crate::config::Config;
use crate::exchange::{MarketDataSource, OrderSide, OrderVenue};
use crate::risk::{AlertSeverity, BreakerDecision, RiskAlert, RiskAlertType, VolatilityCircuitBreaker};

/// Engine lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum EngineState {
    /// Quoting on both sides.
    Running,
    /// Circuit breaker active; no resting orders.
    Halted { cooldown_until: DateTime<Utc> },
    /// Hedge failure awaiting operator; analysis continues, no resting orders.
    Paused { reason: String },
    /// Terminal.
    Stopped,
}

impl EngineState {
    pub fn trading_enabled(&self) -> bool {
        matches!(self, EngineState::Running)
    }
}

/// What happened during one cycle.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub state: EngineState,
    pub analysis: Option<MarketAnalysis>,
    pub breaker: Option<BreakerDecision>,
    pub reconcile: ReconcileResult,
    pub hedges: Vec<HedgeResult>,
    pub elapsed: Duration,
}

/// Maker/hedge strategy loop.
///
/// Each cycle: fetch a snapshot, update analysis, gate on the circuit breaker,
/// compute offsets, reconcile resting orders, collect fills and hedge them.
/// Fills are hedged in every non-stopped state so a fill captured while
/// cancelling is never left open.
pub struct StrategyEngine {
    config: Config,
    market_data: Arc<dyn MarketDataSource>,
    analyzer: MarketAnalyzer,
    breaker: VolatilityCircuitBreaker,
    offsets: DynamicOffsetCalculator,
    maker: MakerOrderEngine,
    hedger: HedgeExecutor,
    state: EngineState,
    metrics: StrategyMetrics,
}

impl StrategyEngine {
    pub fn new(
        config: Config,
        market_data: Arc<dyn MarketDataSource>,
        maker_venue: Arc<dyn OrderVenue>,
        hedge_venue: Arc<dyn OrderVenue>,
    ) -> Self {
        let positions = Arc::new(RwLock::new(NetPositionState::default()));

        Self {
            market_data,
            analyzer: MarketAnalyzer::new(&config.market),
            breaker: VolatilityCircuitBreaker::new(config.circuit_breaker.clone()),
            offsets: DynamicOffsetCalculator::new(&config.quoting, config.market.tick_size),
            maker: MakerOrderEngine::new(maker_venue, &config.quoting, &config.execution),
            hedger: HedgeExecutor::new(hedge_venue, positions, &config.execution),
            state: EngineState::Running,
            metrics: StrategyMetrics::default(),
            config,
        }
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    pub fn metrics(&self) -> &StrategyMetrics {
        &self.metrics
    }

    pub fn maker(&self) -> &MakerOrderEngine {
        &self.maker
    }

    pub async fn positions(&self) -> NetPositionState {
        self.hedger.positions().read().await.clone()
    }

    /// Run one cycle. A stopped engine does nothing.
    pub async fn run_cycle(&mut self) -> CycleReport {
        let started = Instant::now();
        let mut report = CycleReport {
            state: self.state.clone(),
            analysis: None,
            breaker: None,
            reconcile: ReconcileResult::default(),
            hedges: Vec::new(),
            elapsed: Duration::ZERO,
        };
        if self.state == EngineState::Stopped {
            return report;
        }

        let symbol = self.config.market.symbol.as_str();
        let snapshot = bounded(
            self.config.execution.market_data_timeout(),
            "get_snapshot",
            self.market_data.get_snapshot(symbol),
        )
        .await;

        match snapshot {
            Ok(snapshot) => {
                let analysis = self.analyzer.update(&snapshot);
                let decision = self.breaker.evaluate(&analysis);
                let status = self.breaker.apply(&decision, &analysis, Utc::now());
                self.metrics.breaker_activations = self.breaker.activations();

                if let Some(e) = analysis.data_error(self.analyzer.min_samples()) {
                    debug!(error = %e, "Quoting held during warm-up");
                }

                let allowed = status.trading_allowed();
                let breaker_until = self.breaker.state().map(|b| b.cooldown_until);
                match self.state {
                    EngineState::Running if !allowed => {
                        let cooldown_until = breaker_until.unwrap_or_else(Utc::now);
                        if !analysis.insufficient_data {
                            warn!(triggers = ?decision.triggers, %cooldown_until, "Trading halted");
                        }
                        self.state = EngineState::Halted { cooldown_until };
                    }
                    EngineState::Halted { .. } if allowed => {
                        info!("Circuit breaker clear, trading resumed");
                        self.state = EngineState::Running;
                    }
                    EngineState::Halted { .. } => {
                        if let Some(cooldown_until) = breaker_until {
                            self.state = EngineState::Halted { cooldown_until };
                        }
                    }
                    _ => {}
                }

                let trading_enabled = self.state.trading_enabled();
                let decisions = self.offsets.compute_both(&analysis, &snapshot.maker_book());
                report.reconcile = self.maker.reconcile(&decisions, trading_enabled).await;
                report.analysis = Some(analysis);
                report.breaker = Some(decision);
            }
            Err(e) => {
                // Resting orders stay; fills are still collected below
                warn!(error = %e, "Market data unavailable, skipping re-quote");
                if !self.state.trading_enabled() {
                    report.reconcile = self.maker.cancel_all().await;
                }
            }
        }
        self.metrics.record_reconcile(&report.reconcile);

        let fills = self.maker.poll_fills().await;
        if !fills.is_empty() {
            report.hedges = self.hedge_fills(fills).await;
            self.handle_hedge_results(&report.hedges).await;
        }

        let elapsed = started.elapsed();
        let budget = self.config.execution.cycle_budget();
        if elapsed > budget {
            warn!(
                elapsed_ms = elapsed.as_millis() as u64,
                budget_ms = budget.as_millis() as u64,
                "Cycle exceeded budget"
            );
        }
        self.metrics.record_cycle(elapsed, budget);

        let interval = self.config.execution.metrics_log_interval;
        if interval > 0 && self.metrics.cycles % interval == 0 {
            self.metrics.log_summary();
        }

        report.state = self.state.clone();
        report.elapsed = elapsed;
        report
    }

    /// Hedge fills in detection order. Fills on one side are hedged one after
    /// another; the two sides run concurrently.
    async fn hedge_fills(&mut self, fills: Vec<FillEvent>) -> Vec<HedgeResult> {
        let (buys, sells): (Vec<_>, Vec<_>) = fills.into_iter().partition(|f| f.side == OrderSide::Buy);

        let hedger = &self.hedger;
        let hedge_side = |fills: Vec<FillEvent>| async move {
            let mut results = Vec::with_capacity(fills.len());
            for fill in &fills {
                results.push(hedger.execute_hedge(fill).await);
            }
            results
        };
        let (mut results, sell_results) = tokio::join!(hedge_side(buys), hedge_side(sells));

        results.extend(sell_results);
        for result in &results {
            self.metrics.record_hedge(result);
        }
        results
    }

    async fn handle_hedge_results(&mut self, results: &[HedgeResult]) {
        let Some(failure) = results.iter().find(|r| r.requires_manual_intervention) else {
            return;
        };
        let reason = failure
            .error
            .as_ref()
            .map_or_else(|| "hedge failed".to_string(), ToString::to_string);

        if self.config.execution.stop_on_hedge_failure {
            error!(%reason, "Stopping after hedge failure");
            self.suspend_alert(&reason, "Stopped").emit();
            self.shutdown().await;
        } else if !matches!(self.state, EngineState::Paused { .. }) {
            warn!(%reason, "Trading paused after hedge failure");
            self.suspend_alert(&reason, "Paused").emit();
            self.state = EngineState::Paused { reason };
            let cancelled = self.maker.cancel_all().await;
            self.metrics.record_reconcile(&cancelled);
        }
    }

    fn suspend_alert(&self, reason: &str, outcome: &str) -> RiskAlert {
        RiskAlert::new(
            RiskAlertType::TradingSuspended {
                reason: reason.to_string(),
            },
            AlertSeverity::Critical,
            format!("{} after hedge failure: {}", outcome, reason),
            "Reconcile positions on both venues, then resume".to_string(),
        )
    }

    /// Leave `Paused` after an operator has dealt with a hedge failure.
    pub fn resume_trading(&mut self) -> bool {
        if !matches!(self.state, EngineState::Paused { .. }) {
            return false;
        }
        info!("Trading resumed by operator");
        self.state = EngineState::Running;
        true
    }

    /// Operator reset of the circuit breaker.
    pub fn reset_circuit_breaker(&mut self) {
        self.breaker.reset();
        if matches!(self.state, EngineState::Halted { .. }) {
            self.state = EngineState::Running;
        }
    }

    /// Stop the engine and cancel resting orders. Idempotent.
    pub async fn shutdown(&mut self) {
        if self.state != EngineState::Stopped {
            info!("Strategy engine stopping");
            self.state = EngineState::Stopped;
        }
        let cancelled = self.maker.cancel_all().await;
        self.metrics.record_reconcile(&cancelled);
    }

    /// Run cycles on the configured interval until `stop` flips to true, the
    /// engine stops itself, or `max_cycles` have run. Resting orders are
    /// cancelled on the way out.
    pub async fn run(&mut self, mut stop: watch::Receiver<bool>, max_cycles: Option<u64>) -> StrategyMetrics {
        let mut interval = tokio::time::interval(self.config.execution.cycle_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            symbol = %self.config.market.symbol,
            interval_ms = self.config.execution.cycle_interval_ms,
            "Strategy engine started"
        );

        let mut cycles = 0u64;
        loop {
            if *stop.borrow() || self.state == EngineState::Stopped {
                break;
            }
            if max_cycles.is_some_and(|max| cycles >= max) {
                break;
            }

            tokio::select! {
                _ = interval.tick() => {
                    self.run_cycle().await;
                    cycles += 1;
                }
                changed = stop.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        self.shutdown().await;
        self.metrics.log_summary();
        self.metrics.clone()
    }
}
