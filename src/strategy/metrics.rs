//! Runtime counters for the strategy loop.

use serde::Serialize;
use std::time::Duration;
use tracing::info;

use super::hedge::HedgeResult;
use super::maker::ReconcileResult;

/// Counters accumulated over the life of the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StrategyMetrics {
    pub cycles: u64,
    pub budget_overruns: u64,
    pub orders_placed: u64,
    pub orders_replaced: u64,
    pub orders_cancelled: u64,
    pub placement_errors: u64,
    pub fills: u64,
    pub hedge_attempts: u64,
    pub hedge_successes: u64,
    pub hedge_failures: u64,
    pub breaker_activations: u64,
    pub invariant_violations: u64,
    pub last_hedge_latency_ms: f64,
    pub max_hedge_latency_ms: f64,
    total_hedge_latency_ms: f64,
}

impl StrategyMetrics {
    pub fn record_cycle(&mut self, elapsed: Duration, budget: Duration) {
        self.cycles += 1;
        if elapsed > budget {
            self.budget_overruns += 1;
        }
    }

    pub fn record_reconcile(&mut self, result: &ReconcileResult) {
        self.orders_placed += u64::from(result.placed + result.replaced);
        self.orders_replaced += u64::from(result.replaced);
        self.orders_cancelled += u64::from(result.cancelled);
        self.placement_errors += result.errors.len() as u64;
    }

    pub fn record_hedge(&mut self, result: &HedgeResult) {
        self.fills += 1;
        self.hedge_attempts += 1;
        if result.success {
            self.hedge_successes += 1;
        } else {
            self.hedge_failures += 1;
        }
        if result.invariant_violated {
            self.invariant_violations += 1;
        }

        let latency = result.execution_time.as_secs_f64() * 1000.0;
        self.last_hedge_latency_ms = latency;
        self.max_hedge_latency_ms = self.max_hedge_latency_ms.max(latency);
        self.total_hedge_latency_ms += latency;
    }

    pub fn mean_hedge_latency_ms(&self) -> f64 {
        if self.hedge_attempts == 0 {
            return 0.0;
        }
        self.total_hedge_latency_ms / self.hedge_attempts as f64
    }

    /// Fraction of hedges that filled completely.
    pub fn hedge_success_rate(&self) -> f64 {
        if self.hedge_attempts == 0 {
            return 1.0;
        }
        self.hedge_successes as f64 / self.hedge_attempts as f64
    }

    pub fn log_summary(&self) {
        info!(
            cycles = self.cycles,
            budget_overruns = self.budget_overruns,
            orders_placed = self.orders_placed,
            orders_replaced = self.orders_replaced,
            orders_cancelled = self.orders_cancelled,
            placement_errors = self.placement_errors,
            fills = self.fills,
            hedge_successes = self.hedge_successes,
            hedge_failures = self.hedge_failures,
            breaker_activations = self.breaker_activations,
            invariant_violations = self.invariant_violations,
            mean_hedge_ms = format!("{:.2}", self.mean_hedge_latency_ms()),
            max_hedge_ms = format!("{:.2}", self.max_hedge_latency_ms),
            "Strategy metrics"
        );
    }
}
