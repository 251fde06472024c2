//! Opportunity detection over consolidated quotes.

use std::sync::Arc;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument};

use super::fees::{FeeTable, FundingModel, NoFunding};
use super::opportunity::{Direction, FeeBreakdown, Opportunity};
use crate::metrics;
use crate::orderbook::{AggregatedLiquidity, BookSide, ConsolidatedQuote, DepthAnalyzer, OrderBook};
use crate::utils::{edge_bps, BPS_PER_UNIT};
use crate::venue::{Quote, VenueId};

/// Net edge at which the confidence edge term saturates.
const CONFIDENCE_EDGE_SCALE_BPS: Decimal = Decimal::from_parts(100, 0, 0, false, 0);

/// Detection thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Minimum gross edge.
    pub min_edge_bps: Decimal,
    /// Minimum edge after fees, slippage and funding.
    pub min_net_edge_after_slippage: Decimal,
    /// Maximum own bid/ask spread of either venue.
    pub max_spread_bps: Decimal,
    /// Maximum age of the older quote.
    pub min_book_bbo_age_ms: i64,
    /// Maximum difference between venue timestamps.
    pub max_venue_clock_skew_ms: i64,
    /// Notional cap per opportunity.
    pub max_notional: Decimal,
    /// Each side needs this multiple of the trade size available.
    pub min_liquidity_multiplier: Decimal,
    /// Floor on the slippage estimate.
    pub slippage_buffer_bps: Decimal,
    /// Lifetime of a detected opportunity.
    pub opportunity_ttl_ms: i64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            min_edge_bps: Decimal::TEN,
            min_net_edge_after_slippage: Decimal::new(5, 0),
            max_spread_bps: Decimal::new(20, 0),
            min_book_bbo_age_ms: 1_000,
            max_venue_clock_skew_ms: 500,
            max_notional: Decimal::new(10_000, 0),
            min_liquidity_multiplier: Decimal::TWO,
            slippage_buffer_bps: Decimal::new(5, 0),
            opportunity_ttl_ms: 5_000,
        }
    }
}

/// Why a consolidated quote produced no opportunity.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Rejection {
    /// One venue has no quote.
    #[error("quote incomplete")]
    Incomplete,

    /// Older quote is too old.
    #[error("quote age {age_ms}ms exceeds {max_ms}ms")]
    Stale {
        /// Age of the older quote.
        age_ms: i64,
        /// Allowed age.
        max_ms: i64,
    },

    /// Venue timestamps too far apart.
    #[error("venue clock skew {skew_ms}ms exceeds {max_ms}ms")]
    ClockSkew {
        /// Observed skew.
        skew_ms: i64,
        /// Allowed skew.
        max_ms: i64,
    },

    /// A venue's own spread is too wide.
    #[error("{venue} spread {spread_bps}bps exceeds {max_bps}bps")]
    WideSpread {
        /// Venue.
        venue: VenueId,
        /// Observed spread.
        spread_bps: Decimal,
        /// Allowed spread.
        max_bps: Decimal,
    },

    /// Neither direction is positive.
    #[error("no positive edge")]
    NoEdge,

    /// Best gross edge under the threshold.
    #[error("gross edge {gross_bps}bps below {min_bps}bps")]
    BelowMinEdge {
        /// Best gross edge.
        gross_bps: Decimal,
        /// Threshold.
        min_bps: Decimal,
    },

    /// Sizing produced nothing tradeable.
    #[error("trade size below minimum notional")]
    Unsized,

    /// A side lacks the required liquidity multiple.
    #[error("{venue} has {available} available, {required} required")]
    InsufficientLiquidity {
        /// Venue.
        venue: VenueId,
        /// Available size.
        available: Decimal,
        /// Required size.
        required: Decimal,
    },

    /// Net edge under the threshold.
    #[error("net edge {net_bps}bps below {min_bps}bps")]
    BelowNetEdge {
        /// Net edge.
        net_bps: Decimal,
        /// Threshold.
        min_bps: Decimal,
    },
}

impl Rejection {
    /// Metric label.
    pub fn reason(&self) -> &'static str {
        match self {
            Rejection::Incomplete => "incomplete",
            Rejection::Stale { .. } => "stale",
            Rejection::ClockSkew { .. } => "clock_skew",
            Rejection::WideSpread { .. } => "wide_spread",
            Rejection::NoEdge => "no_edge",
            Rejection::BelowMinEdge { .. } => "below_min_edge",
            Rejection::Unsized => "unsized",
            Rejection::InsufficientLiquidity { .. } => "insufficient_liquidity",
            Rejection::BelowNetEdge { .. } => "below_net_edge",
        }
    }
}

/// Optional L2 books for the left and right venue.
///
/// Missing books fall back to top-of-book sizes from the quote.
#[derive(Debug, Clone, Copy, Default)]
pub struct BookPair<'a> {
    /// Left venue book.
    pub left: Option<&'a OrderBook>,
    /// Right venue book.
    pub right: Option<&'a OrderBook>,
}

/// Computes both-direction edges and emits ranked opportunities.
#[derive(Debug, Clone)]
pub struct OpportunityDetector {
    config: DetectorConfig,
    fees: FeeTable,
    funding: Arc<dyn FundingModel>,
    depth: DepthAnalyzer,
}

impl OpportunityDetector {
    /// Create a detector without a funding term.
    pub fn new(config: DetectorConfig, fees: FeeTable, depth: DepthAnalyzer) -> Self {
        Self {
            config,
            fees,
            funding: Arc::new(NoFunding),
            depth,
        }
    }

    /// Plug in a funding-cost model.
    pub fn with_funding(mut self, funding: Arc<dyn FundingModel>) -> Self {
        self.funding = funding;
        self
    }

    /// Active thresholds.
    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// `(left_to_right, right_to_left)` gross edges in bps.
    pub fn gross_edges(left: &Quote, right: &Quote) -> (Decimal, Decimal) {
        (edge_bps(left.ask, right.bid), edge_bps(right.ask, left.bid))
    }

    /// Evaluate one symbol against top-of-book liquidity.
    pub fn detect(&self, view: &ConsolidatedQuote, now_ms: i64) -> Result<Opportunity, Rejection> {
        self.evaluate(view, BookPair::default(), now_ms)
    }

    /// Evaluate one symbol, using L2 books for liquidity where given.
    #[instrument(level = "debug", skip(self, view, books), fields(symbol = %view.symbol))]
    pub fn evaluate(
        &self,
        view: &ConsolidatedQuote,
        books: BookPair<'_>,
        now_ms: i64,
    ) -> Result<Opportunity, Rejection> {
        let cfg = &self.config;
        let (left, right) = match (&view.left, &view.right) {
            (Some(l), Some(r)) => (l, r),
            _ => return Err(Rejection::Incomplete),
        };

        let age_ms = view.age_ms(now_ms).unwrap_or(i64::MAX);
        if age_ms > cfg.min_book_bbo_age_ms {
            return Err(Rejection::Stale {
                age_ms,
                max_ms: cfg.min_book_bbo_age_ms,
            });
        }

        let skew_ms = view.clock_skew_ms().unwrap_or(0);
        if skew_ms > cfg.max_venue_clock_skew_ms {
            return Err(Rejection::ClockSkew {
                skew_ms,
                max_ms: cfg.max_venue_clock_skew_ms,
            });
        }

        for quote in [left, right] {
            let spread_bps = quote.spread_bps();
            if spread_bps > cfg.max_spread_bps {
                return Err(Rejection::WideSpread {
                    venue: quote.venue.clone(),
                    spread_bps,
                    max_bps: cfg.max_spread_bps,
                });
            }
        }

        let (l2r, r2l) = Self::gross_edges(left, right);
        let (direction, gross_edge_bps, buy, sell, buy_book, sell_book) = if l2r >= r2l {
            (Direction::LeftToRight, l2r, left, right, books.left, books.right)
        } else {
            (Direction::RightToLeft, r2l, right, left, books.right, books.left)
        };

        if gross_edge_bps <= Decimal::ZERO {
            return Err(Rejection::NoEdge);
        }
        if gross_edge_bps < cfg.min_edge_bps {
            return Err(Rejection::BelowMinEdge {
                gross_bps: gross_edge_bps,
                min_bps: cfg.min_edge_bps,
            });
        }

        let buy_liq = self.liquidity(buy, buy_book, BookSide::Ask);
        let sell_liq = self.liquidity(sell, sell_book, BookSide::Bid);

        let decision = self.depth.size_with_config(&buy_liq, &sell_liq, cfg.max_notional);
        if !decision.is_tradeable() {
            return Err(Rejection::Unsized);
        }

        let required = decision.size * cfg.min_liquidity_multiplier;
        for (venue, liq) in [(&buy.venue, &buy_liq), (&sell.venue, &sell_liq)] {
            if liq.total_size < required {
                return Err(Rejection::InsufficientLiquidity {
                    venue: venue.clone(),
                    available: liq.total_size,
                    required,
                });
            }
        }

        let fees = FeeBreakdown {
            buy_taker_bps: self.fees.taker_bps(&buy.venue),
            sell_taker_bps: self.fees.taker_bps(&sell.venue),
            funding_bps: self.funding.funding_cost_bps(
                self.fees.leg_kind(&buy.venue),
                self.fees.leg_kind(&sell.venue),
            ),
        };

        let estimated = DepthAnalyzer::estimate_slippage(&buy_liq, decision.size)
            + DepthAnalyzer::estimate_slippage(&sell_liq, decision.size);
        let slippage_bps = estimated.max(cfg.slippage_buffer_bps);

        let net_edge_bps = gross_edge_bps - fees.taker_bps() - slippage_bps - fees.funding_bps;
        if net_edge_bps < cfg.min_net_edge_after_slippage {
            return Err(Rejection::BelowNetEdge {
                net_bps: net_edge_bps,
                min_bps: cfg.min_net_edge_after_slippage,
            });
        }

        let notional = decision.notional;
        let created_at_ms = view.last_update_ms;

        Ok(Opportunity {
            id: format!("{}-{}-{}", view.symbol, direction, created_at_ms),
            symbol: view.symbol.clone(),
            direction,
            buy_venue: buy.venue.clone(),
            sell_venue: sell.venue.clone(),
            buy_price: buy.ask,
            sell_price: sell.bid,
            size: decision.size,
            notional,
            gross_edge_bps,
            net_edge_bps,
            fees,
            slippage_bps,
            expected_profit: notional * net_edge_bps / BPS_PER_UNIT,
            confidence: self.confidence(view, left, right, net_edge_bps),
            created_at_ms,
            expires_at_ms: created_at_ms + cfg.opportunity_ttl_ms,
        })
    }

    /// Detect across all views, best net edge first.
    pub fn scan(&self, views: &[ConsolidatedQuote], now_ms: i64) -> Vec<Opportunity> {
        let _timer = metrics::timer_detection();

        let mut found: Vec<Opportunity> = views
            .iter()
            .filter_map(|view| match self.detect(view, now_ms) {
                Ok(opp) => {
                    metrics::inc_opportunities_detected();
                    info!(
                        id = %opp.id,
                        buy = %opp.buy_venue,
                        sell = %opp.sell_venue,
                        gross_edge_bps = %opp.gross_edge_bps,
                        net_edge_bps = %opp.net_edge_bps,
                        notional = %opp.notional,
                        "Opportunity detected"
                    );
                    Some(opp)
                }
                Err(rejection) => {
                    metrics::inc_opportunities_rejected(rejection.reason());
                    debug!(symbol = %view.symbol, reason = %rejection, "No opportunity");
                    None
                }
            })
            .collect();

        found.sort_by(|a, b| {
            b.net_edge_bps
                .cmp(&a.net_edge_bps)
                .then_with(|| a.symbol.cmp(&b.symbol))
        });
        found
    }

    fn liquidity(&self, quote: &Quote, book: Option<&OrderBook>, side: BookSide) -> AggregatedLiquidity {
        let max_depth_pct = self.depth.config().max_depth_pct;
        if let Some(book) = book {
            let liq = self.depth.aggregate_book(book, side);
            if !liq.is_empty() {
                return liq;
            }
        }

        let (price, size) = match side {
            BookSide::Ask => (quote.ask, quote.ask_size),
            BookSide::Bid => (quote.bid, quote.bid_size),
        };
        if size <= Decimal::ZERO {
            return AggregatedLiquidity::empty(side, max_depth_pct);
        }
        AggregatedLiquidity {
            side,
            total_size: size,
            vwap: price,
            levels_used: 1,
            max_depth_pct,
        }
    }

    /// Weighted blend of freshness, spread tightness and edge size.
    fn confidence(&self, view: &ConsolidatedQuote, left: &Quote, right: &Quote, net: Decimal) -> f64 {
        let cfg = &self.config;

        // Age of the older quote relative to the newer one keeps this deterministic.
        let internal_age = view.age_ms(view.last_update_ms).unwrap_or(0) as f64;
        let freshness = if cfg.min_book_bbo_age_ms > 0 {
            1.0 - internal_age / cfg.min_book_bbo_age_ms as f64
        } else {
            1.0
        };

        let avg_spread = ((left.spread_bps() + right.spread_bps()) / Decimal::TWO)
            .to_f64()
            .unwrap_or(0.0);
        let max_spread = cfg.max_spread_bps.to_f64().unwrap_or(0.0);
        let tightness = if max_spread > 0.0 {
            1.0 - avg_spread / max_spread
        } else {
            1.0
        };

        let edge = (net / CONFIDENCE_EDGE_SCALE_BPS).to_f64().unwrap_or(0.0);

        let score = 0.3 * freshness.clamp(0.0, 1.0)
            + 0.3 * tightness.clamp(0.0, 1.0)
            + 0.4 * edge.clamp(0.0, 1.0);
        score.clamp(0.0, 1.0)
    }
}
