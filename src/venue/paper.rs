//! In-memory simulated venue.
//!
//! Serves configured books as quotes and fills orders by walking them, with
//! knobs for latency, partial fills and failure injection. Used for dry-run
//! sessions and tests; nothing here touches the network.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::{debug, warn};
use uuid::Uuid;

use super::adapter::{QuoteStream, VenueAdapter};
use super::types::{Balance, OrderResult, Quote, VenueId};
use crate::error::VenueError;
use crate::orderbook::{BookSide, OrderBook, PriceLevel};
use crate::trading::{ExecutionLeg, Side};
use crate::utils::{bps_of, now_ms};

/// Behaviour knobs for a paper venue.
#[derive(Debug, Clone)]
pub struct PaperConfig {
    /// Delay before an order placement returns.
    pub latency_ms: u64,
    /// Fraction of each order that fills, in `[0, 1]`.
    pub fill_ratio: Decimal,
    /// Taker fee charged on fills.
    pub fee_bps: Decimal,
    /// Reject every order.
    pub fail_orders: bool,
    /// Fail every cancel.
    pub fail_cancels: bool,
    /// Panic inside `place_order`.
    pub panic_on_order: bool,
    /// Reject reduce-only orders only.
    pub reject_reduce_only: bool,
    /// Refuse `connect`.
    pub fail_connect: bool,
    /// Fail every health check.
    pub unhealthy: bool,
    /// Interval between quote stream emissions.
    pub quote_interval_ms: u64,
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self {
            latency_ms: 0,
            fill_ratio: Decimal::ONE,
            fee_bps: Decimal::ZERO,
            fail_orders: false,
            fail_cancels: false,
            panic_on_order: false,
            reject_reduce_only: false,
            fail_connect: false,
            unhealthy: false,
            quote_interval_ms: 250,
        }
    }
}

#[derive(Debug, Clone)]
struct PaperOrder {
    symbol: String,
    remaining: Decimal,
}

#[derive(Debug, Default)]
struct PaperState {
    books: HashMap<String, OrderBook>,
    orders: HashMap<String, PaperOrder>,
    placed: Vec<ExecutionLeg>,
    cancelled: Vec<String>,
    balances: HashMap<String, Balance>,
}

/// Simulated venue adapter.
#[derive(Debug, Clone)]
pub struct PaperVenue {
    id: VenueId,
    config: PaperConfig,
    state: Arc<Mutex<PaperState>>,
    place_calls: Arc<AtomicUsize>,
    cancel_calls: Arc<AtomicUsize>,
}

impl PaperVenue {
    /// Create a paper venue with default behaviour.
    pub fn new(id: impl Into<VenueId>) -> Self {
        Self::with_config(id, PaperConfig::default())
    }

    /// Create a paper venue with custom behaviour.
    pub fn with_config(id: impl Into<VenueId>, config: PaperConfig) -> Self {
        Self {
            id: id.into(),
            config,
            state: Arc::new(Mutex::new(PaperState::default())),
            place_calls: Arc::new(AtomicUsize::new(0)),
            cancel_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn state(&self) -> MutexGuard<'_, PaperState> {
        lock(&self.state)
    }

    /// Replace the book of `book.symbol`.
    pub fn set_book(&self, mut book: OrderBook) {
        book.venue = self.id.clone();
        book.normalize();
        self.state().books.insert(book.symbol.clone(), book);
    }

    /// Current book of a symbol.
    pub fn book(&self, symbol: &str) -> Option<OrderBook> {
        self.state().books.get(symbol).cloned()
    }

    /// Set an asset balance.
    pub fn set_balance(&self, asset: impl Into<String>, free: Decimal) {
        let asset = asset.into();
        self.state().balances.insert(
            asset.clone(),
            Balance {
                asset,
                free,
                locked: Decimal::ZERO,
            },
        );
    }

    /// Number of `place_order` calls so far.
    pub fn place_calls(&self) -> usize {
        self.place_calls.load(Ordering::SeqCst)
    }

    /// Number of `cancel_order` calls so far.
    pub fn cancel_calls(&self) -> usize {
        self.cancel_calls.load(Ordering::SeqCst)
    }

    /// Every leg passed to `place_order`, in arrival order.
    pub fn placed_legs(&self) -> Vec<ExecutionLeg> {
        self.state().placed.clone()
    }

    /// Order ids that were cancelled while still open.
    pub fn cancelled_orders(&self) -> Vec<String> {
        self.state().cancelled.clone()
    }

    fn fill(&self, leg: &ExecutionLeg) -> (Decimal, Decimal) {
        let wanted = (leg.amount * self.config.fill_ratio.clamp(Decimal::ZERO, Decimal::ONE))
            .min(leg.amount);
        if wanted <= Decimal::ZERO {
            return (Decimal::ZERO, Decimal::ZERO);
        }

        let state = self.state();
        let consumed = match leg.side {
            Side::Buy => BookSide::Ask,
            Side::Sell => BookSide::Bid,
        };
        let levels: &[PriceLevel] = match state.books.get(&leg.symbol) {
            Some(book) => book.levels(consumed),
            None => &[],
        };

        if levels.is_empty() {
            // No book: a limit order fills at its own price.
            return match leg.price {
                Some(price) => (wanted, price),
                None => (Decimal::ZERO, Decimal::ZERO),
            };
        }

        let crosses = |price: Decimal| match (leg.side, leg.price) {
            (_, None) => true,
            (Side::Buy, Some(limit)) => price <= limit,
            (Side::Sell, Some(limit)) => price >= limit,
        };

        let mut remaining = wanted;
        let mut cost = Decimal::ZERO;
        for level in levels.iter().take_while(|l| crosses(l.price)) {
            if remaining.is_zero() {
                break;
            }
            let take = remaining.min(level.size);
            cost += take * level.price;
            remaining -= take;
        }

        let filled = wanted - remaining;
        if filled.is_zero() {
            return (Decimal::ZERO, Decimal::ZERO);
        }
        (filled, cost / filled)
    }
}

fn lock(state: &Mutex<PaperState>) -> MutexGuard<'_, PaperState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn quote_from_book(book: &OrderBook) -> Option<Quote> {
    let bid = book.bids.first()?;
    let ask = book.asks.first()?;
    let ts = now_ms();
    Some(Quote {
        venue: book.venue.clone(),
        symbol: book.symbol.clone(),
        bid: bid.price,
        bid_size: bid.size,
        ask: ask.price,
        ask_size: ask.size,
        exchange_ts_ms: ts,
        received_at_ms: ts,
    })
}

#[async_trait]
impl VenueAdapter for PaperVenue {
    fn id(&self) -> &VenueId {
        &self.id
    }

    async fn connect(&self, symbols: &[String]) -> bool {
        if self.config.fail_connect {
            warn!(venue = %self.id, "Paper venue refusing connection");
            return false;
        }
        debug!(venue = %self.id, symbols = symbols.len(), "Paper venue connected");
        true
    }

    fn watch_quotes(&self, symbols: &[String]) -> QuoteStream {
        let state = self.state.clone();
        let symbols = symbols.to_vec();
        let interval = Duration::from_millis(self.config.quote_interval_ms.max(1));

        Box::pin(async_stream::stream! {
            loop {
                let quotes: Vec<Quote> = {
                    let guard = lock(&state);
                    symbols
                        .iter()
                        .filter_map(|s| guard.books.get(s))
                        .filter_map(quote_from_book)
                        .collect()
                };
                for quote in quotes {
                    yield quote;
                }
                tokio::time::sleep(interval).await;
            }
        })
    }

    async fn fetch_order_book(&self, symbol: &str, depth: usize) -> Result<OrderBook, VenueError> {
        let mut book = self.book(symbol).ok_or_else(|| VenueError::Api {
            venue: self.id.clone(),
            message: format!("no book for {symbol}"),
        })?;
        if depth > 0 {
            book.truncate(depth);
        }
        book.timestamp_ms = now_ms();
        Ok(book)
    }

    async fn place_order(&self, leg: &ExecutionLeg) -> Result<OrderResult, VenueError> {
        self.place_calls.fetch_add(1, Ordering::SeqCst);
        self.state().placed.push(leg.clone());

        if self.config.latency_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.latency_ms)).await;
        }

        if self.config.panic_on_order {
            panic!("paper venue {} injected order panic", self.id);
        }

        if self.config.fail_orders || (self.config.reject_reduce_only && leg.reduce_only) {
            return Err(VenueError::OrderRejected {
                venue: self.id.clone(),
                reason: "injected order failure".to_string(),
            });
        }

        if let Err(e) = leg.validate() {
            return Ok(OrderResult {
                success: false,
                error: Some(e.to_string()),
                ..Default::default()
            });
        }

        let (filled_qty, avg_price) = self.fill(leg);
        let order_id = Uuid::new_v4().to_string();
        let remaining = leg.amount - filled_qty;
        if remaining > Decimal::ZERO {
            self.state().orders.insert(
                order_id.clone(),
                PaperOrder {
                    symbol: leg.symbol.clone(),
                    remaining,
                },
            );
        }

        debug!(
            venue = %self.id,
            symbol = %leg.symbol,
            side = %leg.side,
            filled = %filled_qty,
            avg_price = %avg_price,
            "Paper order filled"
        );

        Ok(OrderResult {
            success: true,
            order_id: Some(order_id),
            filled_qty,
            avg_price,
            fee: bps_of(filled_qty * avg_price, self.config.fee_bps),
            error: None,
        })
    }

    async fn cancel_order(&self, symbol: &str, order_id: &str) -> Result<bool, VenueError> {
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);

        if self.config.fail_cancels {
            return Err(VenueError::CancelFailed {
                venue: self.id.clone(),
                order_id: order_id.to_string(),
                reason: "injected cancel failure".to_string(),
            });
        }

        let mut state = self.state();
        let open = state
            .orders
            .get(order_id)
            .is_some_and(|order| order.symbol == symbol && order.remaining > Decimal::ZERO);
        if !open {
            return Ok(false);
        }
        state.orders.remove(order_id);
        state.cancelled.push(order_id.to_string());
        Ok(true)
    }

    async fn fetch_balances(&self) -> Result<HashMap<String, Balance>, VenueError> {
        Ok(self.state().balances.clone())
    }

    async fn health_check(&self) -> bool {
        !self.config.unhealthy
    }
}

/// Builder for paper books with common shapes.
pub struct BookBuilder {
    venue: VenueId,
    symbol: String,
    bids: Vec<PriceLevel>,
    asks: Vec<PriceLevel>,
}

impl BookBuilder {
    /// Create a builder for `symbol` on `venue`.
    pub fn new(venue: impl Into<VenueId>, symbol: impl Into<String>) -> Self {
        Self {
            venue: venue.into(),
            symbol: symbol.into(),
            bids: Vec::new(),
            asks: Vec::new(),
        }
    }

    /// Add a bid level.
    pub fn bid(mut self, price: Decimal, size: Decimal) -> Self {
        self.bids.push(PriceLevel::new(price, size));
        self
    }

    /// Add an ask level.
    pub fn ask(mut self, price: Decimal, size: Decimal) -> Self {
        self.asks.push(PriceLevel::new(price, size));
        self
    }

    /// `levels` levels per side, `step` apart, each holding `size`.
    pub fn ladder(
        mut self,
        best_bid: Decimal,
        best_ask: Decimal,
        size: Decimal,
        levels: usize,
        step: Decimal,
    ) -> Self {
        for i in 0..levels {
            let offset = step * Decimal::from(i);
            self.bids.push(PriceLevel::new(best_bid - offset, size));
            self.asks.push(PriceLevel::new(best_ask + offset, size));
        }
        self
    }

    /// Build a normalized book.
    pub fn build(self) -> OrderBook {
        let mut book = OrderBook {
            venue: self.venue,
            symbol: self.symbol,
            bids: self.bids,
            asks: self.asks,
            timestamp_ms: now_ms(),
        };
        book.normalize();
        book
    }
}
