//! Detected two-leg opportunities.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::venue::VenueId;

/// Which venue is bought and which is sold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Direction {
    /// Buy on the left venue, sell on the right.
    LeftToRight,
    /// Buy on the right venue, sell on the left.
    RightToLeft,
}

/// Cost terms subtracted from the gross edge, all in bps.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct FeeBreakdown {
    /// Taker fee on the buy venue.
    pub buy_taker_bps: Decimal,
    /// Taker fee on the sell venue.
    pub sell_taker_bps: Decimal,
    /// Funding term (negative when funding is received).
    pub funding_bps: Decimal,
}

impl FeeBreakdown {
    /// Round-trip taker fees.
    pub fn taker_bps(&self) -> Decimal {
        self.buy_taker_bps + self.sell_taker_bps
    }
}

/// A fee- and slippage-aware two-leg trade candidate.
///
/// Immutable once detected; executed at most once or discarded at expiry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opportunity {
    /// Deterministic id: symbol, direction and snapshot time.
    pub id: String,
    /// Symbol.
    pub symbol: String,
    /// Trade direction.
    pub direction: Direction,
    /// Venue bought on.
    pub buy_venue: VenueId,
    /// Venue sold on.
    pub sell_venue: VenueId,
    /// Reference buy price (ask on the buy venue).
    pub buy_price: Decimal,
    /// Reference sell price (bid on the sell venue).
    pub sell_price: Decimal,
    /// Base quantity.
    pub size: Decimal,
    /// Notional at the buy price.
    pub notional: Decimal,
    /// Edge before costs.
    pub gross_edge_bps: Decimal,
    /// Edge after fees, slippage and funding.
    pub net_edge_bps: Decimal,
    /// Fee terms.
    pub fees: FeeBreakdown,
    /// Estimated slippage over both legs.
    pub slippage_bps: Decimal,
    /// `notional * net_edge_bps / 10000`.
    pub expected_profit: Decimal,
    /// Heuristic quality score in `[0, 1]`; never gates execution.
    pub confidence: f64,
    /// Snapshot time the opportunity was derived from (unix ms).
    pub created_at_ms: i64,
    /// Expiry (unix ms).
    pub expires_at_ms: i64,
}

impl Opportunity {
    /// Whether the opportunity is past its TTL.
    pub fn is_expired(&self, now_ms: i64) -> bool {
        now_ms >= self.expires_at_ms
    }

    /// Milliseconds of validity left.
    pub fn ttl_remaining_ms(&self, now_ms: i64) -> i64 {
        (self.expires_at_ms - now_ms).max(0)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use rust_decimal_macros::dec;

    /// Left-to-right opportunity: buy 2 on left at 2000, sell on right at 2006.
    pub(crate) fn opportunity(now_ms: i64) -> Opportunity {
        Opportunity {
            id: format!("ETH/USDT-left_to_right-{now_ms}"),
            symbol: "ETH/USDT".to_string(),
            direction: Direction::LeftToRight,
            buy_venue: VenueId::from("left"),
            sell_venue: VenueId::from("right"),
            buy_price: dec!(2000),
            sell_price: dec!(2006),
            size: dec!(2),
            notional: dec!(4000),
            gross_edge_bps: dec!(30),
            net_edge_bps: dec!(9.5),
            fees: FeeBreakdown {
                buy_taker_bps: dec!(7.5),
                sell_taker_bps: dec!(8),
                funding_bps: dec!(0),
            },
            slippage_bps: dec!(5),
            expected_profit: dec!(3.8),
            confidence: 0.8,
            created_at_ms: now_ms,
            expires_at_ms: now_ms + 5_000,
        }
    }
}
