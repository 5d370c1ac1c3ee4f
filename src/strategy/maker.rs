//! Resting-order lifecycle on the maker venue.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::offset::{OffsetDecision, QuoteDecisions};
use crate::config::{ExecutionConfig, QuotingConfig};
use crate::error::VenueError;
use crate::exchange::{OrderRequest, OrderSide, OrderStatus, OrderUpdate, OrderVenue, VenueOrderId};
use crate::utils::decimal::relative_deviation;

/// A resting limit order tracked for one side.
#[derive(Debug, Clone, Serialize)]
pub struct RestingOrder {
    pub side: OrderSide,
    pub venue_order_id: VenueOrderId,
    pub price: Decimal,
    pub quantity: Decimal,
    pub placed_at: DateTime<Utc>,
    pub status: OrderStatus,
}

/// A maker fill, handed to the hedge executor exactly once.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FillEvent {
    pub side: OrderSide,
    pub venue_order_id: VenueOrderId,
    pub fill_price: Decimal,
    pub fill_quantity: Decimal,
    pub filled_at: DateTime<Utc>,
}

/// What one reconcile pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileResult {
    pub placed: u32,
    /// Orders cancelled and re-placed at a new target
    pub replaced: u32,
    /// Orders left alone because the target moved less than the threshold
    pub kept: u32,
    pub cancelled: u32,
    /// Placements skipped because the venue rejected that exact price
    pub skipped: u32,
    pub errors: Vec<VenueError>,
}

/// Keeps one resting order per side on the maker venue in line with the
/// offset calculator's targets.
///
/// Venue failures are logged and collected in [`ReconcileResult::errors`];
/// the next cycle retries. A side with no order after a failed placement is a
/// valid state.
pub struct MakerOrderEngine {
    venue: Arc<dyn OrderVenue>,
    quantity: Decimal,
    requote_threshold: Decimal,
    call_timeout: Duration,
    cancel_timeout: Duration,
    orders: HashMap<OrderSide, RestingOrder>,
    /// Fills discovered while cancelling, delivered by the next `poll_fills`
    pending_fills: Vec<FillEvent>,
    rejected_prices: HashMap<OrderSide, Decimal>,
}

impl MakerOrderEngine {
    pub fn new(venue: Arc<dyn OrderVenue>, quoting: &QuotingConfig, execution: &ExecutionConfig) -> Self {
        Self {
            venue,
            quantity: quoting.position_size,
            requote_threshold: quoting.requote_threshold,
            call_timeout: execution.venue_timeout(),
            cancel_timeout: execution.cancel_timeout(),
            orders: HashMap::new(),
            pending_fills: Vec::new(),
            rejected_prices: HashMap::new(),
        }
    }

    /// Bring resting orders in line with `decisions`.
    ///
    /// With trading disabled, cancels whatever is still resting and returns.
    /// Repeated disabled calls are no-ops once nothing is left.
    pub async fn reconcile(&mut self, decisions: &QuoteDecisions, trading_enabled: bool) -> ReconcileResult {
        if !trading_enabled {
            return self.cancel_all().await;
        }

        let mut result = ReconcileResult::default();
        for side in OrderSide::ALL {
            self.reconcile_side(decisions.for_side(side), &mut result).await;
        }
        result
    }

    async fn reconcile_side(&mut self, decision: &OffsetDecision, result: &mut ReconcileResult) {
        let side = decision.side;
        let target = decision.target_price;

        let Some(existing) = self.orders.get(&side) else {
            match self.place(decision).await {
                Ok(true) => result.placed += 1,
                Ok(false) => result.skipped += 1,
                Err(e) => result.errors.push(e),
            }
            return;
        };

        let deviation = relative_deviation(existing.price, target);
        if deviation < self.requote_threshold {
            debug!(%side, price = %existing.price, %target, %deviation, "Resting order within threshold");
            result.kept += 1;
            return;
        }

        info!(
            %side,
            old_price = %existing.price,
            new_price = %target,
            %deviation,
            offset_ticks = decision.offset_ticks,
            "Re-quoting resting order"
        );

        if let Err(e) = self.cancel(side).await {
            result.errors.push(e);
            return;
        }
        result.cancelled += 1;

        match self.place(decision).await {
            Ok(true) => result.replaced += 1,
            Ok(false) => result.skipped += 1,
            Err(e) => result.errors.push(e),
        }
    }

    /// Place a limit order at the decision's target.
    ///
    /// Returns `Ok(false)` when the price was previously rejected.
    async fn place(&mut self, decision: &OffsetDecision) -> Result<bool, VenueError> {
        let side = decision.side;
        let price = decision.target_price;

        if self.rejected_prices.get(&side) == Some(&price) {
            debug!(%side, %price, "Skipping previously rejected price");
            return Ok(false);
        }

        let request = OrderRequest::Limit {
            side,
            quantity: self.quantity,
            price,
        };

        match bounded(self.call_timeout, "place_order", self.venue.place_order(&request)).await {
            Ok(venue_order_id) => {
                info!(%side, %price, quantity = %self.quantity, order_id = %venue_order_id, "Resting order placed");
                self.rejected_prices.remove(&side);
                self.orders.insert(
                    side,
                    RestingOrder {
                        side,
                        venue_order_id,
                        price,
                        quantity: self.quantity,
                        placed_at: Utc::now(),
                        status: OrderStatus::Open,
                    },
                );
                Ok(true)
            }
            Err(e @ VenueError::Rejected { .. }) => {
                warn!(%side, %price, error = %e, "Placement rejected, will not retry this price");
                self.rejected_prices.insert(side, price);
                Err(e)
            }
            Err(e) => {
                warn!(%side, %price, error = %e, "Placement failed, retrying next cycle");
                Err(e)
            }
        }
    }

    /// Cancel the order on `side` and capture anything it filled first.
    ///
    /// On error the order stays tracked so the next cycle can retry or detect
    /// its fill.
    async fn cancel(&mut self, side: OrderSide) -> Result<(), VenueError> {
        let Some(order) = self.orders.get(&side) else {
            return Ok(());
        };
        let id = order.venue_order_id.clone();

        let had_open_quantity =
            match bounded(self.cancel_timeout, "cancel_order", self.venue.cancel_order(&id)).await {
                Ok(cancelled) => cancelled,
                Err(VenueError::UnknownOrder(_)) => {
                    warn!(%side, order_id = %id, "Venue does not know resting order, dropping it");
                    self.orders.remove(&side);
                    return Ok(());
                }
                Err(e) => {
                    warn!(%side, order_id = %id, error = %e, "Cancel failed");
                    return Err(e);
                }
            };

        match bounded(self.call_timeout, "get_order_status", self.venue.get_order_status(&id)).await {
            Ok(update) => {
                if let Some(order) = self.orders.remove(&side) {
                    if let Some(fill) = Self::fill_from(&order, &update) {
                        info!(%side, quantity = %fill.fill_quantity, "Fill captured during cancel");
                        self.pending_fills.push(fill);
                    }
                }
                debug!(%side, order_id = %id, "Resting order cancelled");
                Ok(())
            }
            Err(e) if had_open_quantity => {
                warn!(%side, order_id = %id, error = %e, "Cancelled but final fill unknown");
                self.orders.remove(&side);
                Ok(())
            }
            Err(e) => {
                // Nothing to cancel means the order closed on its own; keep it
                // tracked until its fill is known.
                warn!(%side, order_id = %id, error = %e, "Order already closed, status unavailable");
                Err(e)
            }
        }
    }

    /// Cancel every resting order, bounded by the cancel timeout per order.
    pub async fn cancel_all(&mut self) -> ReconcileResult {
        let mut result = ReconcileResult::default();
        for side in OrderSide::ALL {
            if !self.orders.contains_key(&side) {
                continue;
            }
            match self.cancel(side).await {
                Ok(()) => result.cancelled += 1,
                Err(e) => result.errors.push(e),
            }
        }
        if result.cancelled > 0 {
            info!(cancelled = result.cancelled, "Cancelled resting orders");
        }
        result
    }

    /// Check resting orders for fills.
    ///
    /// Each fill or partial fill yields exactly one event and ends tracking of
    /// that order. A partially filled order has its remainder cancelled so it
    /// cannot fill unobserved.
    pub async fn poll_fills(&mut self) -> Vec<FillEvent> {
        let mut fills = std::mem::take(&mut self.pending_fills);

        let buy_id = self.orders.get(&OrderSide::Buy).map(|o| o.venue_order_id.clone());
        let sell_id = self.orders.get(&OrderSide::Sell).map(|o| o.venue_order_id.clone());
        let (buy, sell) = tokio::join!(self.query(buy_id), self.query(sell_id));

        for (side, update) in [(OrderSide::Buy, buy), (OrderSide::Sell, sell)] {
            let Some(update) = update else {
                continue;
            };
            match update {
                Ok(update) if update.status == OrderStatus::PartiallyFilled => {
                    let Some(order) = self.orders.get_mut(&side).map(|o| {
                        o.status = OrderStatus::PartiallyFilled;
                        o.clone()
                    }) else {
                        continue;
                    };
                    // cancel() re-reads the final fill and queues the event
                    let queued = self.pending_fills.len();
                    match self.cancel(side).await {
                        Ok(()) if self.pending_fills.len() > queued => {}
                        Ok(()) => {
                            // Dropped without a final read; keep the fill already seen
                            self.orders.remove(&side);
                            fills.extend(Self::fill_from(&order, &update));
                        }
                        Err(e) => {
                            warn!(%side, error = %e, "Could not cancel partial remainder");
                            if let Some(fill) = self.take_fill(side, &update) {
                                fills.push(fill);
                            }
                        }
                    }
                    fills.append(&mut self.pending_fills);
                }
                Ok(update) if update.status.has_fill() => {
                    if let Some(fill) = self.take_fill(side, &update) {
                        fills.push(fill);
                    }
                }
                Ok(update) if update.status.is_closed() => {
                    warn!(%side, status = ?update.status, "Resting order closed by venue without fill");
                    self.orders.remove(&side);
                }
                Ok(_) => {}
                Err(e) => debug!(%side, error = %e, "Order status unavailable, retrying next cycle"),
            }
        }

        for fill in &fills {
            info!(
                side = %fill.side,
                price = %fill.fill_price,
                quantity = %fill.fill_quantity,
                order_id = %fill.venue_order_id,
                "Maker fill detected"
            );
        }
        fills
    }

    async fn query(&self, id: Option<VenueOrderId>) -> Option<Result<OrderUpdate, VenueError>> {
        let id = id?;
        Some(bounded(self.call_timeout, "get_order_status", self.venue.get_order_status(&id)).await)
    }

    fn take_fill(&mut self, side: OrderSide, update: &OrderUpdate) -> Option<FillEvent> {
        let order = self.orders.remove(&side)?;
        Self::fill_from(&order, update)
    }

    fn fill_from(order: &RestingOrder, update: &OrderUpdate) -> Option<FillEvent> {
        if update.filled_quantity <= Decimal::ZERO {
            return None;
        }
        Some(FillEvent {
            side: order.side,
            venue_order_id: order.venue_order_id.clone(),
            fill_price: update.average_price.unwrap_or(order.price),
            fill_quantity: update.filled_quantity,
            filled_at: Utc::now(),
        })
    }

    /// Currently tracked orders.
    pub fn resting_orders(&self) -> impl Iterator<Item = &RestingOrder> {
        self.orders.values()
    }

    pub fn resting_order(&self, side: OrderSide) -> Option<&RestingOrder> {
        self.orders.get(&side)
    }

    pub fn open_order_count(&self) -> usize {
        self.orders.len()
    }
}

/// Await a venue call with a hard deadline.
pub(crate) async fn bounded<T>(
    limit: Duration,
    operation: &str,
    call: impl Future<Output = Result<T, VenueError>>,
) -> Result<T, VenueError> {
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(VenueError::timeout(operation, limit.as_millis() as u64)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{LiquidityTier, MarketAnalysis, MarketRegime};
    use crate::exchange::{BookTop, MockOrderVenue, SimulatedVenue, Venue};
    use crate::strategy::DynamicOffsetCalculator;
    use rust_decimal_macros::dec;

    fn book(bid: Decimal, ask: Decimal) -> BookTop {
        BookTop {
            best_bid: bid,
            best_ask: ask,
        }
    }

    fn decisions(bid: Decimal, ask: Decimal) -> QuoteDecisions {
        let analysis = MarketAnalysis {
            insufficient_data: false,
            regime: MarketRegime::Neutral,
            liquidity_tier: LiquidityTier::Medium,
            ..MarketAnalysis::insufficient(100, 250_000.0, 100.0)
        };
        let calculator = DynamicOffsetCalculator::new(&QuotingConfig::default(), dec!(0.01));
        calculator.compute_both(&analysis, &book(bid, ask))
    }

    fn engine(venue: Arc<dyn OrderVenue>) -> MakerOrderEngine {
        MakerOrderEngine::new(venue, &QuotingConfig::default(), &ExecutionConfig::default())
    }

    fn sim() -> Arc<SimulatedVenue> {
        Arc::new(SimulatedVenue::new(Venue::Maker, book(dec!(100), dec!(100.02))))
    }

    #[tokio::test]
    async fn test_places_both_sides() {
        let venue = sim();
        let mut engine = engine(venue.clone());

        let result = engine.reconcile(&decisions(dec!(100), dec!(100.02)), true).await;

        assert_eq!(result.placed, 2);
        assert_eq!(venue.open_order_count().await, 2);
        assert_eq!(engine.resting_order(OrderSide::Buy).unwrap().price, dec!(99.98));
        assert_eq!(engine.resting_order(OrderSide::Sell).unwrap().price, dec!(100.04));
    }

    #[tokio::test]
    async fn test_small_move_keeps_order() {
        let mut venue = MockOrderVenue::new();
        venue.expect_place_order().times(2).returning(|request| {
            Ok(VenueOrderId(format!("{}", request.side())))
        });
        venue.expect_cancel_order().never();
        let mut engine = engine(Arc::new(venue));

        engine.reconcile(&decisions(dec!(100), dec!(100.02)), true).await;
        // One tick on a 100 price is 0.01%, below the 0.1% threshold
        let result = engine.reconcile(&decisions(dec!(100.01), dec!(100.03)), true).await;

        assert_eq!(result.kept, 2);
        assert_eq!(result.replaced, 0);
    }

    #[tokio::test]
    async fn test_large_move_replaces_order() {
        let venue = sim();
        let mut engine = engine(venue.clone());
        engine.reconcile(&decisions(dec!(100), dec!(100.02)), true).await;
        let old_buy = engine.resting_order(OrderSide::Buy).unwrap().venue_order_id.clone();

        let result = engine.reconcile(&decisions(dec!(101), dec!(101.02)), true).await;

        assert_eq!(result.replaced, 2);
        assert_eq!(result.cancelled, 2);
        assert_ne!(engine.resting_order(OrderSide::Buy).unwrap().venue_order_id, old_buy);
        assert_eq!(engine.resting_order(OrderSide::Buy).unwrap().price, dec!(100.98));
        assert_eq!(venue.open_order_count().await, 2);
    }

    #[tokio::test]
    async fn test_disabled_cancels_once() {
        let venue = sim();
        let mut engine = engine(venue.clone());
        let d = decisions(dec!(100), dec!(100.02));
        engine.reconcile(&d, true).await;

        let first = engine.reconcile(&d, false).await;
        let second = engine.reconcile(&d, false).await;

        assert_eq!(first.cancelled, 2);
        assert_eq!(second, ReconcileResult::default());
        assert_eq!(engine.open_order_count(), 0);
        assert_eq!(venue.open_order_count().await, 0);
        assert_eq!(venue.cancel_count().await, 2);
    }

    #[tokio::test]
    async fn test_fill_detected_once() {
        let venue = sim();
        let mut engine = engine(venue.clone());
        engine.reconcile(&decisions(dec!(100), dec!(100.02)), true).await;

        venue.cross(book(dec!(99.96), dec!(99.98))).await;

        let fills = engine.poll_fills().await;
        assert_eq!(fills.len(), 1);
        assert_eq!(fills[0].side, OrderSide::Buy);
        assert_eq!(fills[0].fill_price, dec!(99.98));
        assert_eq!(fills[0].fill_quantity, QuotingConfig::default().position_size);
        assert!(engine.resting_order(OrderSide::Buy).is_none());

        assert!(engine.poll_fills().await.is_empty());
    }

    #[tokio::test]
    async fn test_partial_fill_is_terminal() {
        let venue = sim();
        let mut engine = MakerOrderEngine::new(
            venue.clone(),
            &QuotingConfig {
                position_size: dec!(2),
                ..Default::default()
            },
            &ExecutionConfig::default(),
        );
        engine.reconcile(&decisions(dec!(100), dec!(100.02)), true).await;
        let sell_id = engine.resting_order(OrderSide::Sell).unwrap().venue_order_id.clone();

        venue.fill_order(&sell_id, dec!(0.5)).await;
        let fills = engine.poll_fills().await;

        assert_eq!(fills.len(), 1);
        assert_eq!(fills[0].fill_quantity, dec!(0.5));
        assert!(engine.resting_order(OrderSide::Sell).is_none());
        // Remainder no longer rests on the venue
        assert!(venue.open_orders(OrderSide::Sell).await.is_empty());
    }

    #[tokio::test]
    async fn test_partial_fill_kept_when_venue_forgets_order() {
        let mut venue = MockOrderVenue::new();
        venue
            .expect_place_order()
            .returning(|request| Ok(VenueOrderId(format!("{}", request.side()))));
        venue
            .expect_get_order_status()
            .withf(|id| id.0 == "BUY")
            .returning(|_| {
                Ok(OrderUpdate {
                    status: OrderStatus::PartiallyFilled,
                    filled_quantity: dec!(0.0004),
                    average_price: Some(dec!(99.98)),
                })
            });
        venue
            .expect_get_order_status()
            .withf(|id| id.0 == "SELL")
            .returning(|_| Ok(OrderUpdate::open()));
        venue
            .expect_cancel_order()
            .withf(|id| id.0 == "BUY")
            .times(1)
            .returning(|id| Err(VenueError::UnknownOrder(id.0.clone())));
        let mut engine = engine(Arc::new(venue));
        engine.reconcile(&decisions(dec!(100), dec!(100.02)), true).await;

        let fills = engine.poll_fills().await;

        assert_eq!(fills.len(), 1);
        assert_eq!(fills[0].side, OrderSide::Buy);
        assert_eq!(fills[0].fill_quantity, dec!(0.0004));
        assert!(engine.resting_order(OrderSide::Buy).is_none());
        assert!(engine.poll_fills().await.is_empty());
    }

    #[tokio::test]
    async fn test_fill_during_requote_not_lost() {
        let venue = sim();
        let mut engine = engine(venue.clone());
        engine.reconcile(&decisions(dec!(100), dec!(100.02)), true).await;
        let buy_id = engine.resting_order(OrderSide::Buy).unwrap().venue_order_id.clone();

        // Fills between polls, then the book moves enough to re-quote
        venue.fill_order(&buy_id, QuotingConfig::default().position_size).await;
        engine.reconcile(&decisions(dec!(101), dec!(101.02)), true).await;

        let fills = engine.poll_fills().await;
        assert_eq!(fills.len(), 1);
        assert_eq!(fills[0].venue_order_id, buy_id);
    }

    #[tokio::test]
    async fn test_placement_failure_is_not_raised() {
        let venue = sim();
        venue
            .fail_next_placement(VenueError::Transient("503".to_string()))
            .await;
        let mut engine = engine(venue.clone());

        let result = engine.reconcile(&decisions(dec!(100), dec!(100.02)), true).await;
        assert_eq!(result.placed, 1);
        assert_eq!(result.errors.len(), 1);
        assert!(engine.resting_order(OrderSide::Buy).is_none());

        // Retried next cycle
        let result = engine.reconcile(&decisions(dec!(100), dec!(100.02)), true).await;
        assert_eq!(result.placed, 1);
        assert_eq!(engine.open_order_count(), 2);
    }

    #[tokio::test]
    async fn test_rejected_price_not_retried() {
        let mut venue = MockOrderVenue::new();
        venue
            .expect_place_order()
            .withf(|r| r.side() == OrderSide::Buy && r.price() == Some(dec!(99.98)))
            .times(1)
            .returning(|_| {
                Err(VenueError::Rejected {
                    reason: "would cross".to_string(),
                })
            });
        venue
            .expect_place_order()
            .withf(|r| r.side() == OrderSide::Buy && r.price() == Some(dec!(98.98)))
            .times(1)
            .returning(|_| Ok(VenueOrderId("b2".to_string())));
        venue
            .expect_place_order()
            .withf(|r| r.side() == OrderSide::Sell)
            .returning(|_| Ok(VenueOrderId("s".to_string())));
        venue.expect_cancel_order().returning(|_| Ok(true));
        venue
            .expect_get_order_status()
            .returning(|_| Ok(OrderUpdate::open()));
        let mut engine = engine(Arc::new(venue));

        engine.reconcile(&decisions(dec!(100), dec!(100.02)), true).await;
        let again = engine.reconcile(&decisions(dec!(100), dec!(100.02)), true).await;
        assert_eq!(again.skipped, 1);

        let moved = engine.reconcile(&decisions(dec!(99), dec!(99.02)), true).await;
        assert!(engine.resting_order(OrderSide::Buy).is_some());
        assert_eq!(moved.errors.len(), 0);
    }

    #[tokio::test]
    async fn test_hung_venue_bounded_by_timeout() {
        let venue = Arc::new(
            SimulatedVenue::new(Venue::Maker, book(dec!(100), dec!(100.02)))
                .with_latency(Duration::from_millis(500)),
        );
        let execution = ExecutionConfig {
            venue_timeout_ms: 20,
            ..Default::default()
        };
        let mut engine = MakerOrderEngine::new(venue, &QuotingConfig::default(), &execution);

        let started = std::time::Instant::now();
        let result = engine.reconcile(&decisions(dec!(100), dec!(100.02)), true).await;

        assert!(started.elapsed() < Duration::from_millis(200));
        assert_eq!(result.errors.len(), 2);
        assert!(result.errors.iter().all(|e| e.is_transient()));
    }
}
