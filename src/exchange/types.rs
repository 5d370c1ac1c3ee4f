//! Shared market and order types for the maker and hedge venues.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::utils::decimal::mid_price;

/// Order side (buy or sell).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Both sides, in the order quotes are reconciled.
    pub const ALL: [OrderSide; 2] = [OrderSide::Buy, OrderSide::Sell];

    /// The compensating side.
    pub fn opposite(&self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }

    /// Signed position change for a quantity traded on this side.
    pub fn signed(&self, quantity: Decimal) -> Decimal {
        match self {
            OrderSide::Buy => quantity,
            OrderSide::Sell => -quantity,
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

/// Venue-assigned order identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VenueOrderId(pub String);

impl fmt::Display for VenueOrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Order request, one variant per order type so each carries exactly the
/// fields it needs.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum OrderRequest {
    /// Resting post-only limit order.
    Limit {
        side: OrderSide,
        quantity: Decimal,
        price: Decimal,
    },
    /// Immediate-or-cancel market order.
    Market { side: OrderSide, quantity: Decimal },
}

impl OrderRequest {
    pub fn side(&self) -> OrderSide {
        match self {
            OrderRequest::Limit { side, .. } | OrderRequest::Market { side, .. } => *side,
        }
    }

    pub fn quantity(&self) -> Decimal {
        match self {
            OrderRequest::Limit { quantity, .. } | OrderRequest::Market { quantity, .. } => {
                *quantity
            }
        }
    }

    /// Limit price, `None` for market orders.
    pub fn price(&self) -> Option<Decimal> {
        match self {
            OrderRequest::Limit { price, .. } => Some(*price),
            OrderRequest::Market { .. } => None,
        }
    }
}

/// Order status as tracked by the strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Placement sent, no venue acknowledgement yet.
    Pending,
    Open,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
}

impl OrderStatus {
    /// Whether any quantity has executed.
    pub fn has_fill(&self) -> bool {
        matches!(self, OrderStatus::Filled | OrderStatus::PartiallyFilled)
    }

    /// Whether the venue will not fill any more of the order.
    pub fn is_closed(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Rejected
        )
    }
}

/// Order state reported by a venue.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderUpdate {
    pub status: OrderStatus,
    pub filled_quantity: Decimal,
    /// Volume-weighted fill price, `None` until something fills.
    pub average_price: Option<Decimal>,
}

impl OrderUpdate {
    pub fn open() -> Self {
        Self {
            status: OrderStatus::Open,
            filled_quantity: Decimal::ZERO,
            average_price: None,
        }
    }
}

/// Best bid/ask on one venue.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BookTop {
    pub best_bid: Decimal,
    pub best_ask: Decimal,
}

impl BookTop {
    pub fn mid(&self) -> Decimal {
        mid_price(self.best_bid, self.best_ask)
    }
}

/// Both venues' top of book plus volume, fetched once per cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketSnapshot {
    pub maker_bid: Decimal,
    pub maker_ask: Decimal,
    pub hedge_bid: Decimal,
    pub hedge_ask: Decimal,
    /// Rolling hourly traded volume on the maker venue (quote currency)
    pub maker_volume: Decimal,
    /// Rolling hourly traded volume on the hedge venue (quote currency)
    pub hedge_volume: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl MarketSnapshot {
    pub fn maker_book(&self) -> BookTop {
        BookTop {
            best_bid: self.maker_bid,
            best_ask: self.maker_ask,
        }
    }

    pub fn hedge_book(&self) -> BookTop {
        BookTop {
            best_bid: self.hedge_bid,
            best_ask: self.hedge_ask,
        }
    }

    pub fn maker_mid(&self) -> Decimal {
        self.maker_book().mid()
    }

    pub fn hedge_mid(&self) -> Decimal {
        self.hedge_book().mid()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_side_helpers() {
        assert_eq!(OrderSide::Buy.opposite(), OrderSide::Sell);
        assert_eq!(OrderSide::Sell.signed(dec!(1.5)), dec!(-1.5));
        assert_eq!(OrderSide::Buy.to_string(), "BUY");
    }

    #[test]
    fn test_order_request_accessors() {
        let limit = OrderRequest::Limit {
            side: OrderSide::Buy,
            quantity: dec!(2),
            price: dec!(99.5),
        };
        let market = OrderRequest::Market {
            side: OrderSide::Sell,
            quantity: dec!(2),
        };

        assert_eq!(limit.price(), Some(dec!(99.5)));
        assert_eq!(market.price(), None);
        assert_eq!(market.side(), OrderSide::Sell);
        assert_eq!(limit.quantity(), market.quantity());
    }

    #[test]
    fn test_order_request_serializes_tagged() {
        let market = OrderRequest::Market {
            side: OrderSide::Sell,
            quantity: dec!(1.5),
        };
        let json = serde_json::to_value(&market).unwrap();
        assert_eq!(json["type"], "MARKET");
        assert_eq!(json["side"], "SELL");
    }

    #[test]
    fn test_status_classification() {
        assert!(OrderStatus::PartiallyFilled.has_fill());
        assert!(!OrderStatus::PartiallyFilled.is_closed());
        assert!(OrderStatus::Rejected.is_closed());
        assert!(!OrderStatus::Open.has_fill());
    }
}
