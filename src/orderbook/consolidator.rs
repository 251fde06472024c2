//! Per-symbol consolidation of the latest left/right venue quotes.
//!
//! Venue ingest tasks write concurrently; each symbol lives in its own
//! `DashMap` entry so a write holds that entry's shard lock and a reader
//! always clones a consistent (left, right) pair.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ValidationError;
use crate::metrics;
use crate::venue::{Quote, VenueId};

/// Latest quotes of one symbol on both venues.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsolidatedQuote {
    /// Symbol.
    pub symbol: String,
    /// Latest quote from the left venue.
    pub left: Option<Quote>,
    /// Latest quote from the right venue.
    pub right: Option<Quote>,
    /// Receipt time of the most recent update (unix ms).
    pub last_update_ms: i64,
}

impl ConsolidatedQuote {
    fn empty(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            left: None,
            right: None,
            last_update_ms: 0,
        }
    }

    /// Both venues present.
    pub fn is_complete(&self) -> bool {
        self.left.is_some() && self.right.is_some()
    }

    /// Age of the oldest present quote; `None` when no quote is present.
    pub fn age_ms(&self, now_ms: i64) -> Option<i64> {
        let oldest = [self.left.as_ref(), self.right.as_ref()]
            .into_iter()
            .flatten()
            .map(|q| q.received_at_ms)
            .min()?;
        Some((now_ms - oldest).max(0))
    }

    /// Absolute difference of the two venue timestamps.
    pub fn clock_skew_ms(&self) -> Option<i64> {
        match (&self.left, &self.right) {
            (Some(l), Some(r)) => Some((l.exchange_ts_ms - r.exchange_ts_ms).abs()),
            _ => None,
        }
    }
}

/// Callback fired with the updated view whenever it is complete.
pub type QuoteCallback = Arc<dyn Fn(&ConsolidatedQuote) + Send + Sync>;

/// Merges per-venue quotes into one view per symbol.
pub struct QuoteConsolidator {
    left: VenueId,
    right: VenueId,
    max_clock_skew_ms: i64,
    quotes: DashMap<String, ConsolidatedQuote>,
    callbacks: Vec<QuoteCallback>,
    rejected: AtomicU64,
}

impl std::fmt::Debug for QuoteConsolidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuoteConsolidator")
            .field("left", &self.left)
            .field("right", &self.right)
            .field("symbols", &self.quotes.len())
            .field("callbacks", &self.callbacks.len())
            .finish()
    }
}

impl QuoteConsolidator {
    /// Create a consolidator for a venue pair.
    ///
    /// When `max_clock_skew_ms > 0`, an update whose venue timestamp is further
    /// than that from the other venue's quote evicts the other quote, so a
    /// complete view never pairs quotes from different moments.
    pub fn new(left: VenueId, right: VenueId, max_clock_skew_ms: i64) -> Self {
        Self {
            left,
            right,
            max_clock_skew_ms,
            quotes: DashMap::new(),
            callbacks: Vec::new(),
            rejected: AtomicU64::new(0),
        }
    }

    /// Register a completion callback. Must be done before the consolidator is shared.
    pub fn on_complete(mut self, callback: QuoteCallback) -> Self {
        self.callbacks.push(callback);
        self
    }

    /// Left venue of the pair.
    pub fn left_venue(&self) -> &VenueId {
        &self.left
    }

    /// Right venue of the pair.
    pub fn right_venue(&self) -> &VenueId {
        &self.right
    }

    /// Ingest one venue quote, replacing that venue's slot for the symbol.
    ///
    /// Malformed quotes and quotes from venues outside the pair are logged and dropped.
    pub fn update(&self, quote: Quote) -> Result<(), ValidationError> {
        if !quote.is_well_formed() {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            metrics::inc_quotes_rejected();
            warn!(
                venue = %quote.venue,
                symbol = %quote.symbol,
                bid = %quote.bid,
                ask = %quote.ask,
                "Rejected malformed quote"
            );
            return Err(ValidationError::MalformedQuote {
                venue: quote.venue,
                symbol: quote.symbol,
                bid: quote.bid,
                ask: quote.ask,
            });
        }

        let is_left = quote.venue == self.left;
        if !is_left && quote.venue != self.right {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            metrics::inc_quotes_rejected();
            warn!(venue = %quote.venue, symbol = %quote.symbol, "Quote from unpaired venue");
            return Err(ValidationError::UnpairedVenue(quote.venue));
        }

        let snapshot = {
            let mut entry = self
                .quotes
                .entry(quote.symbol.clone())
                .or_insert_with(|| ConsolidatedQuote::empty(&quote.symbol));
            let view: &mut ConsolidatedQuote = &mut entry;

            view.last_update_ms = quote.received_at_ms;
            let incoming_ts = quote.exchange_ts_ms;
            let (own, other) = if is_left {
                (&mut view.left, &mut view.right)
            } else {
                (&mut view.right, &mut view.left)
            };
            *own = Some(quote);

            if self.max_clock_skew_ms > 0 {
                let skewed = other.as_ref().is_some_and(|q| {
                    (q.exchange_ts_ms - incoming_ts).abs() > self.max_clock_skew_ms
                });
                if skewed {
                    debug!(symbol = %view.symbol, "Dropping counter-venue quote outside skew bound");
                    *other = None;
                }
            }

            view.clone()
        };

        metrics::inc_quote_updates();

        if snapshot.is_complete() {
            for callback in &self.callbacks {
                callback(&snapshot);
            }
        }

        Ok(())
    }

    /// Current view of one symbol.
    pub fn get(&self, symbol: &str) -> Option<ConsolidatedQuote> {
        self.quotes.get(symbol).map(|entry| entry.value().clone())
    }

    /// All complete views no older than `max_age_ms`.
    pub fn fresh(&self, max_age_ms: i64, now_ms: i64) -> Vec<ConsolidatedQuote> {
        let mut fresh: Vec<ConsolidatedQuote> = self
            .quotes
            .iter()
            .filter(|entry| entry.is_complete())
            .filter(|entry| entry.age_ms(now_ms).is_some_and(|age| age <= max_age_ms))
            .map(|entry| entry.value().clone())
            .collect();
        fresh.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        fresh
    }

    /// Drop views whose oldest quote is older than `max_age_ms`; returns how many were dropped.
    pub fn evict(&self, max_age_ms: i64, now_ms: i64) -> usize {
        let before = self.quotes.len();
        self.quotes
            .retain(|_, view| view.age_ms(now_ms).is_some_and(|age| age <= max_age_ms));
        let evicted = before.saturating_sub(self.quotes.len());
        if evicted > 0 {
            debug!(evicted, "Evicted stale consolidated quotes");
        }
        evicted
    }

    /// Number of tracked symbols.
    pub fn len(&self) -> usize {
        self.quotes.len()
    }

    /// Whether no symbol is tracked.
    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }

    /// Quotes rejected so far.
    pub fn rejected_count(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::sync::atomic::AtomicUsize;

    fn quote(venue: &str, bid: Decimal, ask: Decimal, ts: i64) -> Quote {
        Quote {
            venue: VenueId::from(venue),
            symbol: "ETH/USDT".to_string(),
            bid,
            bid_size: dec!(5),
            ask,
            ask_size: dec!(5),
            exchange_ts_ms: ts,
            received_at_ms: ts,
        }
    }

    fn consolidator(skew: i64) -> QuoteConsolidator {
        QuoteConsolidator::new(VenueId::from("left"), VenueId::from("right"), skew)
    }

    #[test]
    fn update_fills_slots_and_completes() {
        let c = consolidator(0);
        c.update(quote("left", dec!(99), dec!(100), 1_000)).unwrap();

        let view = c.get("ETH/USDT").unwrap();
        assert!(!view.is_complete());

        c.update(quote("right", dec!(100.5), dec!(101), 1_050)).unwrap();
        let view = c.get("ETH/USDT").unwrap();
        assert!(view.is_complete());
        assert_eq!(view.last_update_ms, 1_050);
        assert_eq!(view.age_ms(1_200), Some(200));
        assert_eq!(view.clock_skew_ms(), Some(50));
    }

    #[test]
    fn newer_quote_supersedes_slot() {
        let c = consolidator(0);
        c.update(quote("left", dec!(99), dec!(100), 1_000)).unwrap();
        c.update(quote("left", dec!(98), dec!(99), 1_100)).unwrap();

        let view = c.get("ETH/USDT").unwrap();
        assert_eq!(view.left.unwrap().ask, dec!(99));
    }

    #[test]
    fn malformed_and_unpaired_quotes_are_not_stored() {
        let c = consolidator(0);
        assert!(c.update(quote("left", dec!(0), dec!(100), 1)).is_err());
        assert!(c.update(quote("other", dec!(1), dec!(2), 1)).is_err());
        assert!(c.get("ETH/USDT").is_none());
        assert_eq!(c.rejected_count(), 2);
    }

    #[test]
    fn callbacks_fire_only_on_complete_views() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let c = consolidator(0).on_complete(Arc::new(move |view: &ConsolidatedQuote| {
            assert!(view.is_complete());
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        c.update(quote("left", dec!(99), dec!(100), 1)).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        c.update(quote("right", dec!(99), dec!(100), 2)).unwrap();
        c.update(quote("left", dec!(99), dec!(100), 3)).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn complete_views_respect_clock_skew_bound() {
        let c = consolidator(100);
        c.update(quote("left", dec!(99), dec!(100), 1_000)).unwrap();
        c.update(quote("right", dec!(99), dec!(100), 1_500)).unwrap();

        let view = c.get("ETH/USDT").unwrap();
        assert!(!view.is_complete());
        assert!(view.left.is_none());

        c.update(quote("left", dec!(99), dec!(100), 1_550)).unwrap();
        let view = c.get("ETH/USDT").unwrap();
        assert!(view.is_complete());
        assert!(view.clock_skew_ms().unwrap() <= 100);
    }

    #[test]
    fn fresh_and_evict_use_oldest_quote_age() {
        let c = consolidator(0);
        c.update(quote("left", dec!(99), dec!(100), 1_000)).unwrap();
        c.update(quote("right", dec!(99), dec!(100), 1_400)).unwrap();

        assert_eq!(c.fresh(500, 1_450).len(), 1);
        assert!(c.fresh(300, 1_450).is_empty());

        assert_eq!(c.evict(300, 1_450), 1);
        assert!(c.is_empty());
    }
}
