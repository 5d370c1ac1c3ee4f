//! Venue-agnostic capability traits consumed by the strategy.
//!
//! The strategy never talks to an exchange directly. Each venue adapter
//! implements [`OrderVenue`]; the market-data collaborator implements
//! [`MarketDataSource`]. Both report failures as [`VenueError`] so the
//! strategy components can turn them into explicit outcomes.

use async_trait::async_trait;
use std::fmt;

#[cfg(test)]
use mockall::automock;

use super::types::{MarketSnapshot, OrderRequest, OrderUpdate, VenueOrderId};
use crate::error::VenueError;

/// Role a venue plays in the maker/hedge relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Venue {
    /// Resting limit orders are posted here.
    Maker,
    /// Compensating market orders are executed here.
    Hedge,
}

impl fmt::Display for Venue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Venue::Maker => write!(f, "Maker"),
            Venue::Hedge => write!(f, "Hedge"),
        }
    }
}

impl Venue {
    /// Short code for display (2 chars).
    pub fn short_code(&self) -> &'static str {
        match self {
            Venue::Maker => "MK",
            Venue::Hedge => "HG",
        }
    }
}

/// Source of per-cycle market snapshots covering both venues.
///
/// Implementations should fail fast with [`VenueError::Transient`]; the
/// strategy additionally bounds every call with its own timeout.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    async fn get_snapshot(&self, symbol: &str) -> Result<MarketSnapshot, VenueError>;
}

/// Order management on a single venue.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait OrderVenue: Send + Sync {
    /// Returns the venue role.
    fn venue(&self) -> Venue;

    /// Submit an order and return the venue's id once acknowledged.
    async fn place_order(&self, request: &OrderRequest) -> Result<VenueOrderId, VenueError>;

    /// Cancel an order.
    ///
    /// `Ok(false)` means the venue had nothing left to cancel (the order was
    /// already filled, cancelled or expired).
    async fn cancel_order(&self, id: &VenueOrderId) -> Result<bool, VenueError>;

    /// Current status and cumulative fill of an order.
    async fn get_order_status(&self, id: &VenueOrderId) -> Result<OrderUpdate, VenueError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_venue_display() {
        assert_eq!(Venue::Maker.to_string(), "Maker");
        assert_eq!(Venue::Hedge.short_code(), "HG");
    }
}
