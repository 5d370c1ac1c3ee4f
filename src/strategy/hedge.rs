//! Immediate hedging of maker fills on the hedge venue.

use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use super::maker::{bounded, FillEvent};
use crate::config::ExecutionConfig;
use crate::error::{StrategyError, VenueError};
use crate::exchange::{OrderRequest, OrderStatus, OrderUpdate, OrderVenue, VenueOrderId};
use crate::risk::{AlertSeverity, RiskAlert, RiskAlertType};

/// Signed base-asset positions on both venues.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NetPositionState {
    pub net_maker_position: Decimal,
    pub net_hedge_position: Decimal,
    /// Signed maker quantity whose hedge never filled
    pub unhedged_exposure: Decimal,
}

impl NetPositionState {
    pub fn net_delta(&self) -> Decimal {
        self.net_maker_position + self.net_hedge_position
    }
}

/// Outcome of hedging one maker fill.
#[derive(Debug, Clone)]
pub struct HedgeResult {
    pub fill: FillEvent,
    pub success: bool,
    pub hedge_order_id: Option<VenueOrderId>,
    pub hedged_quantity: Decimal,
    pub hedge_price: Option<Decimal>,
    pub execution_time: Duration,
    pub net_delta_after: Decimal,
    pub requires_manual_intervention: bool,
    /// |net delta| exceeded tolerance after this hedge
    pub invariant_violated: bool,
    pub error: Option<StrategyError>,
}

/// How the hedge order ended, when it ended before the deadline.
enum Confirmation {
    Filled(OrderUpdate),
    Partial(OrderUpdate),
    Unfilled(OrderStatus),
}

/// Sends an opposite-side IOC market order for each maker fill and books the
/// result into the shared [`NetPositionState`].
///
/// Each fill is hedged at most once. Failures are returned in the
/// [`HedgeResult`], never raised.
pub struct HedgeExecutor {
    venue: Arc<dyn OrderVenue>,
    positions: Arc<RwLock<NetPositionState>>,
    timeout: Duration,
    poll_interval: Duration,
    cancel_timeout: Duration,
    max_net_delta: Decimal,
    attempts: AtomicU64,
}

impl HedgeExecutor {
    pub fn new(
        venue: Arc<dyn OrderVenue>,
        positions: Arc<RwLock<NetPositionState>>,
        config: &ExecutionConfig,
    ) -> Self {
        Self {
            venue,
            positions,
            timeout: config.hedge_timeout(),
            poll_interval: config.hedge_poll_interval(),
            cancel_timeout: config.cancel_timeout(),
            max_net_delta: config.max_net_delta,
            attempts: AtomicU64::new(0),
        }
    }

    pub fn positions(&self) -> Arc<RwLock<NetPositionState>> {
        Arc::clone(&self.positions)
    }

    /// Number of hedge orders attempted so far.
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    /// Hedge one maker fill within the configured timeout.
    pub async fn execute_hedge(&self, fill: &FillEvent) -> HedgeResult {
        let started = Instant::now();
        let attempt = self.attempts.fetch_add(1, Ordering::Relaxed) + 1;
        let request = OrderRequest::Market {
            side: fill.side.opposite(),
            quantity: fill.fill_quantity,
        };

        info!(
            attempt,
            maker_side = %fill.side,
            hedge_side = %request.side(),
            quantity = %fill.fill_quantity,
            maker_price = %fill.fill_price,
            "Hedging maker fill"
        );

        let mut order_id = None;
        let confirmation = tokio::time::timeout(self.timeout, self.place_and_confirm(&request, &mut order_id)).await;

        let (hedged, price, error) = match confirmation {
            Ok(Ok(Confirmation::Filled(update))) => (update.filled_quantity, update.average_price, None),
            Ok(Ok(Confirmation::Partial(update))) => (
                update.filled_quantity,
                update.average_price,
                Some(StrategyError::PartialHedge {
                    requested: fill.fill_quantity,
                    filled: update.filled_quantity,
                }),
            ),
            Ok(Ok(Confirmation::Unfilled(status))) => (
                Decimal::ZERO,
                None,
                Some(StrategyError::HedgeRejected {
                    reason: format!("hedge order ended {:?} with no fill", status),
                }),
            ),
            Ok(Err(VenueError::Rejected { reason })) => (Decimal::ZERO, None, Some(StrategyError::HedgeRejected { reason })),
            Ok(Err(e)) => (Decimal::ZERO, None, Some(StrategyError::Venue(e))),
            Err(_) => (
                Decimal::ZERO,
                None,
                Some(StrategyError::HedgeTimeout {
                    after_ms: self.timeout.as_millis() as u64,
                }),
            ),
        };

        let (net_delta_after, unhedged) = self.book(fill, hedged).await;
        let execution_time = started.elapsed();
        let success = error.is_none();
        let requires_manual_intervention = error
            .as_ref()
            .is_some_and(StrategyError::requires_manual_intervention);

        if success {
            info!(
                attempt,
                hedged = %hedged,
                price = ?price,
                %net_delta_after,
                elapsed_ms = execution_time.as_millis() as u64,
                "Hedge filled"
            );
        } else if let Some(e) = &error {
            error!(
                attempt,
                error = %e,
                hedged = %hedged,
                %unhedged,
                %net_delta_after,
                elapsed_ms = execution_time.as_millis() as u64,
                "Hedge failed"
            );
            RiskAlert::new(
                RiskAlertType::HedgeFailure {
                    side: fill.side,
                    quantity: fill.fill_quantity,
                    unhedged: fill.fill_quantity - hedged,
                    reason: e.to_string(),
                },
                AlertSeverity::Error,
                format!("Maker {} fill of {} not fully hedged: {}", fill.side, fill.fill_quantity, e),
                "Verify hedge venue position and flatten residual exposure".to_string(),
            )
            .with_metric("hedged_quantity", hedged)
            .with_metric("net_delta", net_delta_after)
            .with_metric("unhedged_exposure", unhedged)
            .emit();
        }

        let invariant_violated = self.check_invariant(net_delta_after);

        if let (Some(StrategyError::HedgeTimeout { .. }), Some(id)) = (&error, &order_id) {
            // Off the hedge's clock; a late fill lands in the position ledger
            tokio::spawn(settle_timed_out_hedge(
                Arc::clone(&self.venue),
                Arc::clone(&self.positions),
                id.clone(),
                fill.clone(),
                self.cancel_timeout,
            ));
        }

        HedgeResult {
            fill: fill.clone(),
            success,
            hedge_order_id: order_id,
            hedged_quantity: hedged,
            hedge_price: price,
            execution_time,
            net_delta_after,
            requires_manual_intervention,
            invariant_violated,
            error,
        }
    }

    /// Place the hedge order and poll until it reaches a final state.
    ///
    /// Runs under the caller's deadline; `order_id` is set as soon as the
    /// venue acknowledges so a timed-out order can still be cancelled.
    async fn place_and_confirm(
        &self,
        request: &OrderRequest,
        order_id: &mut Option<VenueOrderId>,
    ) -> Result<Confirmation, VenueError> {
        let id = self.venue.place_order(request).await?;
        debug!(order_id = %id, "Hedge order acknowledged");
        *order_id = Some(id.clone());

        loop {
            match self.venue.get_order_status(&id).await {
                Ok(update) if update.status == OrderStatus::Filled => {
                    return Ok(Confirmation::Filled(update));
                }
                // IOC: any partial fill is final
                Ok(update) if update.status == OrderStatus::PartiallyFilled => {
                    return Ok(Confirmation::Partial(update));
                }
                Ok(update) if update.status.is_closed() => {
                    if update.filled_quantity > Decimal::ZERO {
                        return Ok(Confirmation::Partial(update));
                    }
                    return Ok(Confirmation::Unfilled(update.status));
                }
                Ok(_) => {}
                Err(e) if e.is_transient() => {
                    debug!(order_id = %id, error = %e, "Hedge status unavailable, polling again");
                }
                Err(e) => return Err(e),
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Book the maker fill and whatever hedged in one critical section.
    ///
    /// With no hedge fill at all, positions stay untouched and the fill is
    /// recorded as unhedged exposure. Returns (net delta, unhedged exposure).
    async fn book(&self, fill: &FillEvent, hedged: Decimal) -> (Decimal, Decimal) {
        let maker = fill.side.signed(fill.fill_quantity);
        let mut positions = self.positions.write().await;

        if hedged > Decimal::ZERO {
            positions.net_maker_position += maker;
            positions.net_hedge_position += fill.side.opposite().signed(hedged);
        } else {
            positions.unhedged_exposure += maker;
        }

        (positions.net_delta(), positions.unhedged_exposure)
    }

    fn check_invariant(&self, net_delta: Decimal) -> bool {
        if net_delta.abs() <= self.max_net_delta {
            return false;
        }

        let violation = StrategyError::InvariantViolation {
            net_delta,
            tolerance: self.max_net_delta,
        };
        error!(%net_delta, tolerance = %self.max_net_delta, "{}", violation);
        RiskAlert::new(
            RiskAlertType::NetDeltaViolation {
                net_delta,
                tolerance: self.max_net_delta,
            },
            AlertSeverity::Critical,
            violation.to_string(),
            "Stop quoting and reconcile positions on both venues".to_string(),
        )
        .with_metric("net_delta", net_delta)
        .with_metric("tolerance", self.max_net_delta)
        .emit();
        true
    }
}

/// Cancel a hedge order that missed its deadline and book anything it filled
/// late, moving that maker quantity out of the unhedged ledger.
async fn settle_timed_out_hedge(
    venue: Arc<dyn OrderVenue>,
    positions: Arc<RwLock<NetPositionState>>,
    id: VenueOrderId,
    fill: FillEvent,
    limit: Duration,
) {
    if let Err(e) = bounded(limit, "cancel_order", venue.cancel_order(&id)).await {
        warn!(order_id = %id, error = %e, "Could not cancel timed-out hedge order");
    }

    let update = match bounded(limit, "get_order_status", venue.get_order_status(&id)).await {
        Ok(update) => update,
        Err(e) => {
            warn!(order_id = %id, error = %e, "Final state of timed-out hedge order unknown");
            return;
        }
    };
    if update.filled_quantity <= Decimal::ZERO {
        debug!(order_id = %id, status = ?update.status, "Timed-out hedge order closed unfilled");
        return;
    }

    let maker = fill.side.signed(fill.fill_quantity);
    let mut positions = positions.write().await;
    positions.unhedged_exposure -= maker;
    positions.net_maker_position += maker;
    positions.net_hedge_position += fill.side.opposite().signed(update.filled_quantity);
    warn!(
        order_id = %id,
        filled = %update.filled_quantity,
        net_delta = %positions.net_delta(),
        unhedged = %positions.unhedged_exposure,
        "Timed-out hedge order filled late"
    );
}
