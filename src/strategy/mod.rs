//! Trading strategy implementation.
//!
//! Contains the core logic for:
//! - Dynamic quote offsets from market analysis
//! - Resting-order lifecycle on the maker venue
//! - Immediate hedging of maker fills on the hedge venue
//! - The cycle loop and its runtime metrics

mod engine;
mod hedge;
mod maker;
mod metrics;
mod offset;

pub use engine::{CycleReport, EngineState, StrategyEngine};
pub use hedge::{HedgeExecutor, HedgeResult, NetPositionState};
pub use maker::{FillEvent, MakerOrderEngine, ReconcileResult, RestingOrder};
pub use metrics::StrategyMetrics;
pub use offset::{DynamicOffsetCalculator, OffsetDecision, OffsetMultipliers, QuoteDecisions};
