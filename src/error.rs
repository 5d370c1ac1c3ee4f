//! Error taxonomy for venue interaction and strategy execution.
//!
//! Venue errors never cross into the strategy loop as `Err` values: the maker
//! engine and hedge executor turn them into explicit outcomes. `anyhow` is
//! reserved for start-up wiring and configuration.

use rust_decimal::Decimal;
use thiserror::Error;

/// Errors returned by an [`OrderVenue`](crate::exchange::OrderVenue) or
/// [`MarketDataSource`](crate::exchange::MarketDataSource).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VenueError {
    /// Network failure or venue temporarily unavailable.
    #[error("transient venue error: {0}")]
    Transient(String),

    /// Operation did not complete within its budget.
    #[error("{operation} timed out after {after_ms}ms")]
    Timeout { operation: String, after_ms: u64 },

    /// Venue declined the request. Do not retry at the same price.
    #[error("order rejected: {reason}")]
    Rejected { reason: String },

    /// Venue does not know the order id.
    #[error("unknown order: {0}")]
    UnknownOrder(String),
}

impl VenueError {
    /// Whether the failure is expected to clear on the next cycle.
    pub fn is_transient(&self) -> bool {
        matches!(self, VenueError::Transient(_) | VenueError::Timeout { .. })
    }

    pub(crate) fn timeout(operation: &str, after_ms: u64) -> Self {
        VenueError::Timeout {
            operation: operation.to_string(),
            after_ms,
        }
    }
}

/// Errors surfaced by the strategy components as values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StrategyError {
    #[error("insufficient market history: {samples} of {required} samples")]
    InsufficientData { samples: usize, required: usize },

    /// Hedge not confirmed within budget. Never retried automatically since a
    /// duplicate hedge would double the exposure.
    #[error("hedge not confirmed within {after_ms}ms")]
    HedgeTimeout { after_ms: u64 },

    #[error("hedge order rejected: {reason}")]
    HedgeRejected { reason: String },

    #[error("hedge partially filled: {filled} of {requested}")]
    PartialHedge { requested: Decimal, filled: Decimal },

    #[error("net delta {net_delta} exceeds tolerance {tolerance}")]
    InvariantViolation { net_delta: Decimal, tolerance: Decimal },

    #[error(transparent)]
    Venue(#[from] VenueError),
}

impl StrategyError {
    /// Whether an operator has to reconcile exposure before trading resumes.
    pub fn requires_manual_intervention(&self) -> bool {
        matches!(
            self,
            StrategyError::HedgeTimeout { .. }
                | StrategyError::HedgeRejected { .. }
                | StrategyError::PartialHedge { .. }
                | StrategyError::Venue(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_venue_error_is_transient() {
        struct TestCase {
            input: VenueError,
            expected: bool,
        }

        let tests = vec![
            TestCase {
                // TC0: network failure retries next cycle
                input: VenueError::Transient("connection reset".to_string()),
                expected: true,
            },
            TestCase {
                // TC1: timeout retries next cycle
                input: VenueError::timeout("place_order", 250),
                expected: true,
            },
            TestCase {
                // TC2: rejection is final for that price
                input: VenueError::Rejected {
                    reason: "post only would cross".to_string(),
                },
                expected: false,
            },
            TestCase {
                // TC3: unknown order is not retried
                input: VenueError::UnknownOrder("42".to_string()),
                expected: false,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            assert_eq!(test.input.is_transient(), test.expected, "TC{} failed", index);
        }
    }

    #[test]
    fn test_hedge_failures_require_intervention() {
        assert!(StrategyError::HedgeTimeout { after_ms: 100 }.requires_manual_intervention());
        assert!(!StrategyError::InsufficientData {
            samples: 3,
            required: 20
        }
        .requires_manual_intervention());
    }

    #[test]
    fn test_error_display() {
        let err = VenueError::timeout("get_order_status", 100);
        assert_eq!(err.to_string(), "get_order_status timed out after 100ms");
    }
}
