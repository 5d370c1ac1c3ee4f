//! Exchange capability interfaces.
//!
//! The strategy consumes two capabilities:
//! - `MarketDataSource`: one snapshot of both venues per cycle
//! - `OrderVenue`: order placement, cancellation and status on one venue
//!
//! `mock` provides in-memory implementations for paper trading and tests.

pub mod mock;
mod traits;
mod types;

pub use mock::{MarketFillBehavior, RandomWalkParams, SimulatedMarketData, SimulatedVenue};
#[cfg(test)]
pub use traits::{MockMarketDataSource, MockOrderVenue};
pub use traits::{MarketDataSource, OrderVenue, Venue};
pub use types::*;
