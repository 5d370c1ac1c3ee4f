//! In-memory venues and market data for paper trading and tests.

use super::traits::{MarketDataSource, OrderVenue, Venue};
use super::types::*;
use crate::error::VenueError;
use crate::utils::decimal::round_to_tick;
use async_trait::async_trait;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

/// How a simulated venue treats market (IOC) orders.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MarketFillBehavior {
    /// Fill completely on placement.
    Fill,
    /// Report `Open` until the delay elapses, then fill completely.
    FillAfter(Duration),
    /// Fill the given fraction and cancel the rest.
    Partial(Decimal),
    /// Reject on placement.
    Reject,
    /// Acknowledge but never report a final state.
    Hang,
}

#[derive(Debug, Clone)]
struct SimOrder {
    request: OrderRequest,
    update: OrderUpdate,
    placed_at: Instant,
}

/// Mutable state of a simulated venue.
#[derive(Debug, Default)]
pub struct SimulatedVenueState {
    orders: HashMap<String, SimOrder>,
    /// Every request accepted or rejected, in arrival order
    pub requests: Vec<OrderRequest>,
    /// Signed base-asset position from fills on this venue
    pub position: Decimal,
    pub cancel_count: u64,
}

/// Simulated venue implementing [`OrderVenue`].
///
/// Limit orders rest until [`SimulatedVenue::cross`] moves the book through
/// them or a test calls [`SimulatedVenue::fill_order`]. Market orders follow
/// the configured [`MarketFillBehavior`] at the current top of book.
pub struct SimulatedVenue {
    venue: Venue,
    state: Arc<RwLock<SimulatedVenueState>>,
    order_id_counter: AtomicU64,
    book: RwLock<BookTop>,
    market_behavior: RwLock<MarketFillBehavior>,
    /// Error returned by the next placement, consumed once
    next_placement_error: Mutex<Option<VenueError>>,
    /// Artificial latency applied to every call
    latency: Duration,
}

impl SimulatedVenue {
    /// Create a venue quoting `book` with zero latency.
    pub fn new(venue: Venue, book: BookTop) -> Self {
        Self {
            venue,
            state: Arc::new(RwLock::new(SimulatedVenueState::default())),
            order_id_counter: AtomicU64::new(1),
            book: RwLock::new(book),
            market_behavior: RwLock::new(MarketFillBehavior::Fill),
            next_placement_error: Mutex::new(None),
            latency: Duration::ZERO,
        }
    }

    /// Apply a fixed latency to every venue call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub async fn set_market_behavior(&self, behavior: MarketFillBehavior) {
        *self.market_behavior.write().await = behavior;
    }

    /// Make the next placement fail with `error`.
    pub async fn fail_next_placement(&self, error: VenueError) {
        *self.next_placement_error.lock().await = Some(error);
    }

    /// Update the top of book and fill any resting limit orders it crosses.
    ///
    /// Returns the number of orders filled.
    pub async fn cross(&self, book: BookTop) -> usize {
        *self.book.write().await = book;

        let mut state = self.state.write().await;
        let mut filled = Decimal::ZERO;
        let mut count = 0;

        for (id, order) in state.orders.iter_mut() {
            let OrderRequest::Limit {
                side,
                quantity,
                price,
            } = order.request
            else {
                continue;
            };
            if order.update.status != OrderStatus::Open {
                continue;
            }

            let crossed = match side {
                OrderSide::Buy => book.best_ask <= price,
                OrderSide::Sell => book.best_bid >= price,
            };
            if crossed {
                order.update = OrderUpdate {
                    status: OrderStatus::Filled,
                    filled_quantity: quantity,
                    average_price: Some(price),
                };
                filled += side.signed(quantity);
                count += 1;
                info!(venue = %self.venue, order_id = %id, %side, %price, %quantity, "Simulated limit fill");
            }
        }

        state.position += filled;
        count
    }

    /// Fill `quantity` of a resting limit order at its limit price.
    pub async fn fill_order(&self, id: &VenueOrderId, quantity: Decimal) {
        let mut state = self.state.write().await;
        let Some(order) = state.orders.get_mut(&id.0) else {
            return;
        };
        let Some(price) = order.request.price() else {
            return;
        };

        let total = (order.update.filled_quantity + quantity).min(order.request.quantity());
        let delta = total - order.update.filled_quantity;
        let side = order.request.side();
        order.update = OrderUpdate {
            status: if total >= order.request.quantity() {
                OrderStatus::Filled
            } else {
                OrderStatus::PartiallyFilled
            },
            filled_quantity: total,
            average_price: Some(price),
        };
        state.position += side.signed(delta);
    }

    /// Number of orders the venue currently reports as open.
    pub async fn open_order_count(&self) -> usize {
        self.state
            .read()
            .await
            .orders
            .values()
            .filter(|o| matches!(o.update.status, OrderStatus::Open | OrderStatus::PartiallyFilled))
            .count()
    }

    /// Ids of open limit orders on `side`.
    pub async fn open_orders(&self, side: OrderSide) -> Vec<VenueOrderId> {
        self.state
            .read()
            .await
            .orders
            .iter()
            .filter(|(_, o)| o.update.status == OrderStatus::Open && o.request.side() == side)
            .map(|(id, _)| VenueOrderId(id.clone()))
            .collect()
    }

    /// Every request received so far.
    pub async fn requests(&self) -> Vec<OrderRequest> {
        self.state.read().await.requests.clone()
    }

    pub async fn position(&self) -> Decimal {
        self.state.read().await.position
    }

    pub async fn cancel_count(&self) -> u64 {
        self.state.read().await.cancel_count
    }

    fn next_order_id(&self) -> String {
        format!(
            "{}-{}",
            self.venue.short_code(),
            self.order_id_counter.fetch_add(1, Ordering::SeqCst)
        )
    }

    async fn simulate_latency(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    fn market_fill(request: &OrderRequest, book: BookTop, fraction: Decimal) -> OrderUpdate {
        let price = match request.side() {
            OrderSide::Buy => book.best_ask,
            OrderSide::Sell => book.best_bid,
        };
        let filled = request.quantity() * fraction;
        OrderUpdate {
            status: if fraction >= Decimal::ONE {
                OrderStatus::Filled
            } else {
                OrderStatus::PartiallyFilled
            },
            filled_quantity: filled,
            average_price: Some(price),
        }
    }
}

#[async_trait]
impl OrderVenue for SimulatedVenue {
    fn venue(&self) -> Venue {
        self.venue
    }

    async fn place_order(&self, request: &OrderRequest) -> Result<VenueOrderId, VenueError> {
        self.simulate_latency().await;

        let injected = self.next_placement_error.lock().await.take();
        let behavior = *self.market_behavior.read().await;
        let book = *self.book.read().await;
        let mut state = self.state.write().await;
        state.requests.push(request.clone());

        if let Some(error) = injected {
            debug!(venue = %self.venue, error = %error, "Injected placement failure");
            return Err(error);
        }

        let update = match request {
            OrderRequest::Limit { .. } => OrderUpdate::open(),
            OrderRequest::Market { .. } => match behavior {
                MarketFillBehavior::Fill => Self::market_fill(request, book, Decimal::ONE),
                MarketFillBehavior::Partial(fraction) => {
                    Self::market_fill(request, book, fraction)
                }
                MarketFillBehavior::FillAfter(_) | MarketFillBehavior::Hang => OrderUpdate::open(),
                MarketFillBehavior::Reject => {
                    return Err(VenueError::Rejected {
                        reason: "simulated rejection".to_string(),
                    })
                }
            },
        };

        state.position += request.side().signed(update.filled_quantity);

        let id = self.next_order_id();
        debug!(
            venue = %self.venue,
            order_id = %id,
            side = %request.side(),
            quantity = %request.quantity(),
            price = ?request.price(),
            status = ?update.status,
            "Simulated order accepted"
        );
        state.orders.insert(
            id.clone(),
            SimOrder {
                request: request.clone(),
                update,
                placed_at: Instant::now(),
            },
        );

        Ok(VenueOrderId(id))
    }

    async fn cancel_order(&self, id: &VenueOrderId) -> Result<bool, VenueError> {
        self.simulate_latency().await;

        let mut state = self.state.write().await;
        state.cancel_count += 1;
        let Some(order) = state.orders.get_mut(&id.0) else {
            return Err(VenueError::UnknownOrder(id.0.clone()));
        };

        match order.update.status {
            OrderStatus::Open | OrderStatus::PartiallyFilled | OrderStatus::Pending => {
                order.update.status = OrderStatus::Cancelled;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn get_order_status(&self, id: &VenueOrderId) -> Result<OrderUpdate, VenueError> {
        self.simulate_latency().await;

        let behavior = *self.market_behavior.read().await;
        let book = *self.book.read().await;
        let mut state = self.state.write().await;
        let Some(order) = state.orders.get_mut(&id.0) else {
            return Err(VenueError::UnknownOrder(id.0.clone()));
        };

        if let (OrderRequest::Market { .. }, MarketFillBehavior::FillAfter(delay)) =
            (&order.request, behavior)
        {
            if order.update.status == OrderStatus::Open && order.placed_at.elapsed() >= delay {
                order.update = Self::market_fill(&order.request, book, Decimal::ONE);
                let signed = order.request.side().signed(order.update.filled_quantity);
                let update = order.update.clone();
                state.position += signed;
                return Ok(update);
            }
        }

        Ok(order.update.clone())
    }
}

/// Parameters of the random-walk feed.
#[derive(Debug, Clone)]
pub struct RandomWalkParams {
    pub start_price: Decimal,
    pub tick_size: Decimal,
    /// Half-spread on each venue, in ticks
    pub half_spread_ticks: u32,
    /// Maximum per-step relative move (0.0005 = 5 bp)
    pub step_volatility: f64,
    /// Hedge-venue premium over the maker venue
    pub basis: Decimal,
    pub hourly_volume: Decimal,
    pub seed: u64,
}

impl Default for RandomWalkParams {
    fn default() -> Self {
        Self {
            start_price: dec!(100),
            tick_size: dec!(0.01),
            half_spread_ticks: 2,
            step_volatility: 0.0005,
            basis: dec!(0.02),
            hourly_volume: dec!(750_000),
            seed: 7,
        }
    }
}

enum FeedMode {
    Scripted(VecDeque<MarketSnapshot>),
    RandomWalk {
        params: RandomWalkParams,
        rng: StdRng,
        mid: f64,
    },
}

/// Simulated [`MarketDataSource`].
///
/// Scripted feeds replay a fixed list of snapshots (repeating the last one);
/// random-walk feeds generate correlated maker/hedge books. Attached venues
/// have their books updated, and resting orders crossed, on every snapshot.
pub struct SimulatedMarketData {
    mode: Mutex<FeedMode>,
    last: Mutex<Option<MarketSnapshot>>,
    maker: Option<Arc<SimulatedVenue>>,
    hedge: Option<Arc<SimulatedVenue>>,
}

impl SimulatedMarketData {
    pub fn scripted(snapshots: Vec<MarketSnapshot>) -> Self {
        Self::with_mode(FeedMode::Scripted(snapshots.into()))
    }

    pub fn random_walk(params: RandomWalkParams) -> Self {
        let rng = StdRng::seed_from_u64(params.seed);
        let mid = crate::utils::decimal::to_f64(params.start_price);
        Self::with_mode(FeedMode::RandomWalk { params, rng, mid })
    }

    fn with_mode(mode: FeedMode) -> Self {
        Self {
            mode: Mutex::new(mode),
            last: Mutex::new(None),
            maker: None,
            hedge: None,
        }
    }

    /// Keep the simulated venues' books in step with the feed.
    pub fn attach_venues(mut self, maker: Arc<SimulatedVenue>, hedge: Arc<SimulatedVenue>) -> Self {
        self.maker = Some(maker);
        self.hedge = Some(hedge);
        self
    }

    fn next_random(params: &RandomWalkParams, rng: &mut StdRng, mid: &mut f64) -> MarketSnapshot {
        let step: f64 = rng.random_range(-1.0..1.0) * params.step_volatility;
        *mid *= 1.0 + step;

        let maker_mid = round_to_tick(
            Decimal::from_f64(*mid).unwrap_or(params.start_price),
            params.tick_size,
        );
        let half_spread = params.tick_size * Decimal::from(params.half_spread_ticks);
        let hedge_mid = maker_mid + params.basis;
        let volume_jitter = Decimal::from_f64(rng.random_range(0.8..1.2)).unwrap_or(Decimal::ONE);

        MarketSnapshot {
            maker_bid: maker_mid - half_spread,
            maker_ask: maker_mid + half_spread,
            hedge_bid: hedge_mid - half_spread,
            hedge_ask: hedge_mid + half_spread,
            maker_volume: params.hourly_volume * volume_jitter,
            hedge_volume: params.hourly_volume * volume_jitter,
            timestamp: Utc::now(),
        }
    }
}

#[async_trait]
impl MarketDataSource for SimulatedMarketData {
    async fn get_snapshot(&self, _symbol: &str) -> Result<MarketSnapshot, VenueError> {
        let snapshot = {
            let mut mode = self.mode.lock().await;
            match &mut *mode {
                FeedMode::Scripted(queue) => match queue.pop_front() {
                    Some(snapshot) => snapshot,
                    None => self
                        .last
                        .lock()
                        .await
                        .clone()
                        .ok_or_else(|| VenueError::Transient("no market data".to_string()))?,
                },
                FeedMode::RandomWalk { params, rng, mid } => Self::next_random(params, rng, mid),
            }
        };

        if let Some(maker) = &self.maker {
            maker.cross(snapshot.maker_book()).await;
        }
        if let Some(hedge) = &self.hedge {
            hedge.cross(snapshot.hedge_book()).await;
        }

        *self.last.lock().await = Some(snapshot.clone());
        Ok(snapshot)
    }
}
