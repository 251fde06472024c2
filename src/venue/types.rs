//! Venue-level types shared by adapters, the consolidator and execution.

use std::fmt;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::utils::BPS_PER_UNIT;

/// Identifier of an external trading venue.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VenueId(String);

impl VenueId {
    /// Create a venue id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VenueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VenueId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for VenueId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Instrument kind traded on one leg.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum LegKind {
    /// Spot market, no funding.
    #[default]
    #[strum(serialize = "spot", serialize = "SPOT")]
    Spot,
    /// Perpetual swap, pays or receives funding.
    #[strum(serialize = "perpetual", serialize = "perp", serialize = "PERPETUAL")]
    Perpetual,
}

/// Top-of-book snapshot from one venue.
///
/// Immutable: a newer quote for the same venue and symbol replaces it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    /// Source venue.
    pub venue: VenueId,
    /// Symbol, e.g. `ETH/USDT`.
    pub symbol: String,
    /// Best bid price.
    pub bid: Decimal,
    /// Size at best bid.
    pub bid_size: Decimal,
    /// Best ask price.
    pub ask: Decimal,
    /// Size at best ask.
    pub ask_size: Decimal,
    /// Venue timestamp (unix ms).
    pub exchange_ts_ms: i64,
    /// Local receipt timestamp (unix ms).
    pub received_at_ms: i64,
}

impl Quote {
    /// Both prices strictly positive.
    pub fn is_well_formed(&self) -> bool {
        self.bid > Decimal::ZERO && self.ask > Decimal::ZERO
    }

    /// Mid price.
    pub fn mid(&self) -> Decimal {
        (self.bid + self.ask) / Decimal::TWO
    }

    /// Own bid/ask spread in basis points of mid.
    pub fn spread_bps(&self) -> Decimal {
        let mid = self.mid();
        if mid.is_zero() {
            return Decimal::ZERO;
        }
        (self.ask - self.bid) / mid * BPS_PER_UNIT
    }
}

/// Outcome of a single order placement as reported by a venue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct OrderResult {
    /// Venue accepted the order.
    pub success: bool,
    /// Venue order id; never synthesized locally.
    pub order_id: Option<String>,
    /// Filled base quantity.
    pub filled_qty: Decimal,
    /// Average fill price.
    pub avg_price: Decimal,
    /// Fee charged in quote currency.
    pub fee: Decimal,
    /// Venue error text, if any.
    pub error: Option<String>,
}

/// Asset balance on a venue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Balance {
    /// Asset code.
    pub asset: String,
    /// Available amount.
    pub free: Decimal,
    /// Amount reserved by open orders.
    pub locked: Decimal,
}

/// Precision and minimum-size rules of one venue.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VenueRules {
    /// Price increment.
    pub tick_size: Decimal,
    /// Quantity increment.
    pub lot_size: Decimal,
    /// Minimum order notional in quote currency.
    pub min_notional: Decimal,
}

impl Default for VenueRules {
    fn default() -> Self {
        Self {
            tick_size: Decimal::new(1, 2),
            lot_size: Decimal::new(1, 4),
            min_notional: Decimal::new(10, 0),
        }
    }
}

impl VenueRules {
    /// Round a quantity down to the lot size.
    pub fn round_qty(&self, qty: Decimal) -> Decimal {
        round_to_step(qty, self.lot_size, RoundingStrategy::ToZero)
    }

    /// Round a price up to the tick (buy limits never get worse than intended).
    pub fn round_price_up(&self, price: Decimal) -> Decimal {
        round_to_step(price, self.tick_size, RoundingStrategy::AwayFromZero)
    }

    /// Round a price down to the tick.
    pub fn round_price_down(&self, price: Decimal) -> Decimal {
        round_to_step(price, self.tick_size, RoundingStrategy::ToZero)
    }

    /// Whether a quantity at a price clears the minimum notional.
    pub fn clears_min_notional(&self, qty: Decimal, price: Decimal) -> bool {
        qty * price >= self.min_notional
    }
}

fn round_to_step(value: Decimal, step: Decimal, strategy: RoundingStrategy) -> Decimal {
    if step <= Decimal::ZERO {
        return value;
    }
    let steps = (value / step).round_dp_with_strategy(0, strategy);
    (steps * step).normalize()
}
