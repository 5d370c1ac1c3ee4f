//! Risk management for the maker/hedge strategy.
//!
//! - Circuit breaker halting trading under unsafe market conditions
//! - Structured alerts for breaker events, hedge failures and net-delta
//!   violations

mod alerts;
mod circuit_breaker;

pub use alerts::{AlertSeverity, RiskAlert, RiskAlertType};
pub use circuit_breaker::{
    BreakerDecision, BreakerStatus, BreakerTrigger, CircuitBreakerState, VolatilityCircuitBreaker,
};
