//! Order book types and data structures.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::Display;

use crate::venue::VenueId;

/// Single price level in an order book.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PriceLevel {
    /// Price at this level.
    pub price: Decimal,
    /// Total size available at this price.
    pub size: Decimal,
}

impl PriceLevel {
    /// Create a new price level.
    pub fn new(price: Decimal, size: Decimal) -> Self {
        Self { price, size }
    }

    /// Price times size.
    pub fn notional(&self) -> Decimal {
        self.price * self.size
    }
}

/// Which side of a book is being consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
pub enum BookSide {
    /// Resting buy interest (a seller consumes it).
    #[strum(serialize = "bid")]
    Bid,
    /// Resting sell interest (a buyer consumes it).
    #[strum(serialize = "ask")]
    Ask,
}

/// L2 order book of one symbol on one venue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBook {
    /// Venue this book belongs to.
    pub venue: VenueId,
    /// Symbol.
    pub symbol: String,
    /// Bid levels sorted by price descending.
    pub bids: Vec<PriceLevel>,
    /// Ask levels sorted by price ascending.
    pub asks: Vec<PriceLevel>,
    /// Snapshot time (unix ms).
    pub timestamp_ms: i64,
}

impl OrderBook {
    /// Create an empty book.
    pub fn new(venue: VenueId, symbol: impl Into<String>) -> Self {
        Self {
            venue,
            symbol: symbol.into(),
            bids: Vec::new(),
            asks: Vec::new(),
            timestamp_ms: 0,
        }
    }

    /// Levels of one side.
    pub fn levels(&self, side: BookSide) -> &[PriceLevel] {
        match side {
            BookSide::Bid => &self.bids,
            BookSide::Ask => &self.asks,
        }
    }

    /// Get the best bid price.
    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.first().map(|l| l.price)
    }

    /// Get the best ask price.
    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.first().map(|l| l.price)
    }

    /// Mid price when both sides are present.
    pub fn mid(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some((bid + ask) / Decimal::TWO),
            _ => None,
        }
    }

    /// Get the spread between best bid and ask.
    pub fn spread(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some(ask - bid),
            _ => None,
        }
    }

    /// Check if the book is inverted (best_ask < best_bid).
    pub fn is_inverted(&self) -> bool {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => ask < bid,
            _ => false,
        }
    }

    /// Sort both sides into canonical order (bids desc, asks asc).
    pub fn normalize(&mut self) {
        self.bids.retain(|l| l.size > Decimal::ZERO);
        self.asks.retain(|l| l.size > Decimal::ZERO);
        self.bids.sort_by(|a, b| b.price.cmp(&a.price));
        self.asks.sort_by(|a, b| a.price.cmp(&b.price));
    }

    /// Keep at most `depth` levels per side.
    pub fn truncate(&mut self, depth: usize) {
        self.bids.truncate(depth);
        self.asks.truncate(depth);
    }
}

/// Liquidity of one side of one venue's book near mid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AggregatedLiquidity {
    /// Side that was aggregated.
    pub side: BookSide,
    /// Total base size within the depth band.
    pub total_size: Decimal,
    /// Notional-weighted average price of the counted levels.
    pub vwap: Decimal,
    /// Number of levels counted.
    pub levels_used: usize,
    /// Depth band around mid, in percent.
    pub max_depth_pct: Decimal,
}

impl AggregatedLiquidity {
    /// Result for a side with nothing usable.
    pub fn empty(side: BookSide, max_depth_pct: Decimal) -> Self {
        Self {
            side,
            total_size: Decimal::ZERO,
            vwap: Decimal::ZERO,
            levels_used: 0,
            max_depth_pct,
        }
    }

    /// Whether any size was found.
    pub fn is_empty(&self) -> bool {
        self.total_size.is_zero()
    }

    /// Available notional at the VWAP.
    pub fn notional(&self) -> Decimal {
        self.total_size * self.vwap
    }
}

/// Result of walking a book side to a target size.
#[derive(Debug, Clone, PartialEq)]
pub struct FillInfo {
    /// Total size that can be filled.
    pub filled_size: Decimal,
    /// Total cost to fill.
    pub total_cost: Decimal,
    /// Volume-weighted average price.
    pub vwap: Decimal,
    /// Worst price encountered.
    pub worst_price: Decimal,
    /// Best price available.
    pub best_price: Option<Decimal>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn book() -> OrderBook {
        OrderBook {
            venue: VenueId::from("left"),
            symbol: "ETH/USDT".to_string(),
            bids: vec![
                PriceLevel::new(dec!(1999), dec!(2)),
                PriceLevel::new(dec!(1999.5), dec!(1)),
            ],
            asks: vec![
                PriceLevel::new(dec!(2001), dec!(1)),
                PriceLevel::new(dec!(2000.5), dec!(2)),
                PriceLevel::new(dec!(2002), dec!(0)),
            ],
            timestamp_ms: 1,
        }
    }

    #[test]
    fn normalize_sorts_and_drops_empty_levels() {
        let mut b = book();
        b.normalize();

        assert_eq!(b.best_bid(), Some(dec!(1999.5)));
        assert_eq!(b.best_ask(), Some(dec!(2000.5)));
        assert_eq!(b.asks.len(), 2);
        assert_eq!(b.mid(), Some(dec!(2000)));
        assert_eq!(b.spread(), Some(dec!(1)));
    }

    #[test]
    fn detects_inverted_book() {
        let mut b = book();
        b.normalize();
        assert!(!b.is_inverted());

        b.bids.insert(0, PriceLevel::new(dec!(2010), dec!(1)));
        assert!(b.is_inverted());
    }
}
