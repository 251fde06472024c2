//! Concurrent two-leg execution with partial-fill recovery.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};

use super::fees::FeeTable;
use super::opportunity::Opportunity;
use crate::error::{EngineError, ErrorKind, ExecutionFailure, ValidationError};
use crate::metrics;
use crate::orderbook::{walk_book, BookSide, ChildSizes, DepthAnalyzer, OrderBook};
use crate::trading::{
    aggregate_side, place_leg, ExecutionLeg, ExecutionResult, ExecutionStatus, Side, SideFill,
    UnwindOutcome,
};
use crate::utils::{bps_of, BPS_PER_UNIT};
use crate::venue::{VenueHandle, VenueId, VenueRegistry, VenueRules};

/// Execution parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Price buffer added to limit prices.
    pub guard_bps: Decimal,
    /// Per-leg placement budget.
    pub max_leg_latency_ms: u64,
    /// Minimum fill ratio on each side for a completed hedge.
    pub partial_fill_threshold: Decimal,
    /// Unwind unmatched exposure after a partial fill.
    pub cancel_on_partial: bool,
    /// Never keep a one-sided position; implies unwinding.
    pub atomic_hedge: bool,
    /// Levels fetched per side before re-sizing.
    pub book_depth: usize,
    /// Estimated cost of crossing back out of unmatched exposure.
    pub unwind_cost_bps: Decimal,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            guard_bps: Decimal::new(5, 0),
            max_leg_latency_ms: 500,
            partial_fill_threshold: Decimal::new(95, 2),
            cancel_on_partial: true,
            atomic_hedge: false,
            book_depth: 20,
            unwind_cost_bps: Decimal::new(5, 0),
        }
    }
}

impl ExecutionConfig {
    /// Per-leg budget as a duration.
    pub fn leg_budget(&self) -> Duration {
        Duration::from_millis(self.max_leg_latency_ms)
    }

    /// Whether unmatched exposure gets closed.
    pub fn unwinds(&self) -> bool {
        self.cancel_on_partial || self.atomic_hedge
    }
}

/// Plan for one execution after pre-flight checks.
#[derive(Debug, Clone)]
struct ExecutionPlan {
    buy: VenueHandle,
    sell: VenueHandle,
    qty: Decimal,
    buy_limit: Decimal,
    sell_limit: Decimal,
    children: ChildSizes,
}

/// Runs opportunities against live venues.
///
/// Stateless across executions; the engine enforces one execution per symbol.
#[derive(Debug, Clone)]
pub struct ExecutionCoordinator {
    registry: Arc<VenueRegistry>,
    depth: DepthAnalyzer,
    fees: FeeTable,
    config: ExecutionConfig,
    fatal_tx: Option<mpsc::UnboundedSender<EngineError>>,
}

impl ExecutionCoordinator {
    /// Create a coordinator.
    pub fn new(
        registry: Arc<VenueRegistry>,
        depth: DepthAnalyzer,
        fees: FeeTable,
        config: ExecutionConfig,
    ) -> Self {
        Self {
            registry,
            depth,
            fees,
            config,
            fatal_tx: None,
        }
    }

    /// Send unwind failures on `tx` in addition to logging them.
    pub fn with_fatal_alerts(mut self, tx: mpsc::UnboundedSender<EngineError>) -> Self {
        self.fatal_tx = Some(tx);
        self
    }

    /// Active configuration.
    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    /// Execute one opportunity. Never panics and never returns an error:
    /// every failure is classified on the result.
    #[instrument(skip(self, opportunity), fields(id = %opportunity.id, symbol = %opportunity.symbol))]
    pub async fn execute(&self, opportunity: &Opportunity, now_ms: i64) -> ExecutionResult {
        let started = Instant::now();
        debug!(status = %ExecutionStatus::Executing, "Execution started");

        let result = match self.plan(opportunity, now_ms).await {
            Ok(plan) => self.run(opportunity, plan, now_ms, started).await,
            Err(failure) => {
                warn!(kind = %failure.kind, reason = %failure.message, "Execution rejected");
                ExecutionResult::rejected(opportunity, failure, now_ms, elapsed_ms(started))
            }
        };

        metrics::inc_executions(&result.status.to_string());
        info!(
            status = %result.status,
            success = result.success,
            realized_pnl = %result.realized_pnl,
            latency_ms = result.latency_ms,
            "Execution finished"
        );
        result
    }

    /// Resolve healthy venues, re-size against fresh books and apply venue rules.
    async fn plan(&self, opp: &Opportunity, now_ms: i64) -> Result<ExecutionPlan, ExecutionFailure> {
        if opp.is_expired(now_ms) {
            return Err((&ValidationError::Expired(opp.id.clone())).into());
        }

        let buy = self.registry.resolve(&opp.buy_venue).map_err(|e| ExecutionFailure::from(&e))?.clone();
        let sell = self.registry.resolve(&opp.sell_venue).map_err(|e| ExecutionFailure::from(&e))?.clone();

        let (buy_healthy, sell_healthy) =
            tokio::join!(buy.adapter.health_check(), sell.adapter.health_check());
        for (venue, healthy) in [(&opp.buy_venue, buy_healthy), (&opp.sell_venue, sell_healthy)] {
            if !healthy {
                return Err(ExecutionFailure::new(
                    ErrorKind::Venue,
                    format!("venue {venue} failed health check"),
                ));
            }
        }

        let (buy_book, sell_book) = self.fetch_books(opp, &buy, &sell).await?;

        let buy_liq = self.depth.aggregate_book(&buy_book, BookSide::Ask);
        let sell_liq = self.depth.aggregate_book(&sell_book, BookSide::Bid);
        let decision = self.depth.size_with_config(&buy_liq, &sell_liq, opp.notional);
        if !decision.is_tradeable() {
            return Err((&ValidationError::InvalidSize(decision.size)).into());
        }

        let qty = round_both(decision.size, &buy.rules, &sell.rules);
        if qty <= Decimal::ZERO {
            return Err((&ValidationError::InvalidSize(qty)).into());
        }

        let buy_ref = walk_book(&buy_book, BookSide::Ask, qty)
            .map(|f| f.worst_price)
            .unwrap_or(opp.buy_price);
        let sell_ref = walk_book(&sell_book, BookSide::Bid, qty)
            .map(|f| f.worst_price)
            .unwrap_or(opp.sell_price);
        if sell_ref <= buy_ref {
            return Err(ExecutionFailure::new(
                ErrorKind::Validation,
                format!("edge vanished: buy {buy_ref} sell {sell_ref}"),
            ));
        }

        let guard = self.config.guard_bps / BPS_PER_UNIT;
        let buy_limit = buy.rules.round_price_up(buy_ref * (Decimal::ONE + guard));
        let sell_limit = sell.rules.round_price_down(sell_ref * (Decimal::ONE - guard));

        for (rules, price) in [(&buy.rules, buy_limit), (&sell.rules, sell_limit)] {
            if !rules.clears_min_notional(qty, price) {
                return Err((&ValidationError::BelowMinNotional {
                    notional: qty * price,
                    minimum: rules.min_notional,
                })
                    .into());
            }
        }

        let min_child = buy.rules.min_notional.max(sell.rules.min_notional);
        let notionals =
            DepthAnalyzer::split(qty * buy_limit, self.depth.config().per_order_cap, min_child);
        let children = child_quantities(qty, buy_limit, &notionals, &buy.rules, &sell.rules);
        if children.is_empty() {
            return Err((&ValidationError::BelowMinNotional {
                notional: qty * buy_limit,
                minimum: min_child,
            })
                .into());
        }

        debug!(
            qty = %qty,
            buy_limit = %buy_limit,
            sell_limit = %sell_limit,
            children = children.len(),
            liquidity_limited = decision.liquidity_limited,
            ttl_remaining_ms = opp.ttl_remaining_ms(now_ms),
            "Execution planned"
        );

        Ok(ExecutionPlan {
            buy,
            sell,
            qty,
            buy_limit,
            sell_limit,
            children,
        })
    }

    async fn fetch_books(
        &self,
        opp: &Opportunity,
        buy: &VenueHandle,
        sell: &VenueHandle,
    ) -> Result<(OrderBook, OrderBook), ExecutionFailure> {
        let start = Instant::now();
        let (buy_book, sell_book) = tokio::join!(
            buy.adapter.fetch_order_book(&opp.symbol, self.config.book_depth),
            sell.adapter.fetch_order_book(&opp.symbol, self.config.book_depth),
        );
        metrics::record_orderbook_fetch_latency(start, opp.buy_venue.as_str());
        metrics::record_orderbook_fetch_latency(start, opp.sell_venue.as_str());

        let buy_book = buy_book.map_err(|e| ExecutionFailure::from(&e))?;
        let sell_book = sell_book.map_err(|e| ExecutionFailure::from(&e))?;
        for book in [&buy_book, &sell_book] {
            if book.is_inverted() {
                return Err(ExecutionFailure::new(
                    ErrorKind::Venue,
                    format!("crossed book from {}", book.venue),
                ));
            }
        }
        Ok((buy_book, sell_book))
    }

    async fn run(
        &self,
        opp: &Opportunity,
        plan: ExecutionPlan,
        now_ms: i64,
        started: Instant,
    ) -> ExecutionResult {
        let buy_legs: Vec<ExecutionLeg> = plan
            .children
            .iter()
            .map(|q| ExecutionLeg::buy(opp.buy_venue.clone(), &opp.symbol, *q, plan.buy_limit))
            .collect();
        let sell_legs: Vec<ExecutionLeg> = plan
            .children
            .iter()
            .map(|q| ExecutionLeg::sell(opp.sell_venue.clone(), &opp.symbol, *q, plan.sell_limit))
            .collect();

        if let Some(err) = buy_legs.iter().chain(&sell_legs).find_map(|l| l.validate().err()) {
            return ExecutionResult::rejected(opp, (&err).into(), now_ms, elapsed_ms(started));
        }

        let budget = self.config.leg_budget();
        let buy_adapter = plan.buy.adapter.clone();
        let sell_adapter = plan.sell.adapter.clone();
        let (buy_outcomes, sell_outcomes) = tokio::join!(
            join_all(buy_legs.into_iter().map(|leg| place_leg(buy_adapter.clone(), leg, budget))),
            join_all(sell_legs.into_iter().map(|leg| place_leg(sell_adapter.clone(), leg, budget))),
        );

        let buy = aggregate_side(opp.buy_venue.clone(), Side::Buy, plan.qty, buy_outcomes);
        let sell = aggregate_side(opp.sell_venue.clone(), Side::Sell, plan.qty, sell_outcomes);

        let mut result = ExecutionResult {
            opportunity: opp.clone(),
            status: ExecutionStatus::Executing,
            success: false,
            buy,
            sell,
            unwind: None,
            latency_ms: 0,
            realized_pnl: Decimal::ZERO,
            error: None,
            started_at_ms: now_ms,
        };
        self.settle(&mut result, &plan).await;
        result.latency_ms = elapsed_ms(started);
        result
    }

    /// Classify fills, unwind unmatched exposure and book PnL.
    async fn settle(&self, result: &mut ExecutionResult, plan: &ExecutionPlan) {
        let threshold = self.config.partial_fill_threshold;
        let (buy, sell) = (&result.buy, &result.sell);

        let breached = buy.latency_exceeded || sell.latency_exceeded;
        let cancel_failure = buy
            .legs
            .iter()
            .chain(&sell.legs)
            .find_map(|l| l.cancel_error.clone());
        let hedged = buy.success
            && sell.success
            && buy.fill_ratio() >= threshold
            && sell.fill_ratio() >= threshold;

        if hedged && !breached && cancel_failure.is_none() {
            result.status = ExecutionStatus::Completed;
            result.success = true;
            result.realized_pnl = (sell.notional() - sell.fee) - (buy.notional() + buy.fee);
            return;
        }

        let matched = buy.filled_qty.min(sell.filled_qty);
        let excess = buy.filled_qty - sell.filled_qty;
        let nothing_filled = buy.filled_qty.is_zero() && sell.filled_qty.is_zero();
        result.realized_pnl =
            matched * (sell.avg_price - buy.avg_price) - matched_fee(buy, matched) - matched_fee(sell, matched);

        let mut failure = if breached {
            Some(ExecutionFailure::new(
                ErrorKind::LatencyExceeded,
                format!("leg exceeded {}ms budget", self.config.max_leg_latency_ms),
            ))
        } else if nothing_filled {
            Some(ExecutionFailure::new(ErrorKind::Venue, side_errors(buy, sell)))
        } else {
            Some(ExecutionFailure::new(
                ErrorKind::PartialFill,
                format!(
                    "buy filled {} sell filled {} of {}",
                    buy.filled_qty, sell.filled_qty, plan.qty
                ),
            ))
        };

        result.status = if nothing_filled || breached {
            ExecutionStatus::Failed
        } else {
            ExecutionStatus::PartiallyFilled
        };

        if !excess.is_zero() && self.config.unwinds() {
            warn!(excess = %excess, "Unmatched exposure, unwinding");
            result.status = ExecutionStatus::Unwinding;
            let unwind = self.unwind(&result.opportunity, plan, result, excess).await;
            result.realized_pnl -= unwind.estimated_cost;
            if unwind.success {
                metrics::inc_unwinds("ok");
                result.status = ExecutionStatus::Unwound;
            } else {
                metrics::inc_unwinds("failed");
                result.status = ExecutionStatus::Failed;
                let reason = unwind.error.clone().unwrap_or_else(|| "unwind not accepted".to_string());
                self.raise_fatal(&result.opportunity.symbol, &unwind.venue, &reason);
                failure = Some(ExecutionFailure::new(ErrorKind::UnwindFailure, reason));
            }
            result.unwind = Some(unwind);
        }

        if let Some(reason) = cancel_failure {
            if !matches!(failure, Some(ExecutionFailure { kind: ErrorKind::UnwindFailure, .. })) {
                let venue = result
                    .buy
                    .legs
                    .iter()
                    .chain(&result.sell.legs)
                    .find(|l| l.cancel_error.is_some())
                    .map(|l| l.venue.clone())
                    .unwrap_or_else(|| result.buy.venue.clone());
                self.raise_fatal(&result.opportunity.symbol, &venue, &reason);
                failure = Some(ExecutionFailure::new(ErrorKind::UnwindFailure, reason));
            }
            result.status = ExecutionStatus::Failed;
        }

        result.error = failure;
    }

    /// Close `excess` (buy fills minus sell fills) with one reduce-only market order.
    async fn unwind(
        &self,
        opp: &Opportunity,
        plan: &ExecutionPlan,
        result: &ExecutionResult,
        excess: Decimal,
    ) -> UnwindOutcome {
        let (handle, fill) = if excess > Decimal::ZERO {
            (&plan.buy, &result.buy)
        } else {
            (&plan.sell, &result.sell)
        };
        let side = fill.side.opposite();
        let qty = excess.abs();
        let venue = fill.venue.clone();
        let reference = if fill.avg_price > Decimal::ZERO {
            fill.avg_price
        } else {
            opp.buy_price
        };
        let notional = qty * reference;
        let estimated_cost =
            bps_of(notional, self.config.unwind_cost_bps) + self.fees.taker_fee(&venue, notional);

        let leg = ExecutionLeg::unwind(venue.clone(), &opp.symbol, side, qty);
        let outcome = place_leg(handle.adapter.clone(), leg, self.config.leg_budget()).await;
        let fully_filled = outcome.filled_qty >= qty;
        let success = outcome.is_placed() && outcome.cancel_error.is_none() && fully_filled;
        let error = outcome.error.or(outcome.cancel_error).or_else(|| {
            (!fully_filled).then(|| format!("unwind filled {} of {qty}", outcome.filled_qty))
        });

        info!(
            venue = %venue,
            side = %side,
            qty = %qty,
            estimated_cost = %estimated_cost,
            success,
            "Unwind issued"
        );

        UnwindOutcome {
            venue,
            side,
            qty,
            order_id: outcome.order_id,
            estimated_cost,
            success,
            error,
        }
    }

    fn raise_fatal(&self, symbol: &str, venue: &VenueId, reason: &str) {
        let alert = EngineError::UnwindFailure {
            venue: venue.clone(),
            symbol: symbol.to_string(),
            reason: reason.to_string(),
        };
        error!(venue = %venue, symbol, reason, "UNHEDGED POSITION: unwind failed");
        if let Some(tx) = &self.fatal_tx {
            if tx.send(alert).is_err() {
                warn!("Fatal alert channel closed");
            }
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

fn round_both(qty: Decimal, buy: &VenueRules, sell: &VenueRules) -> Decimal {
    sell.round_qty(buy.round_qty(qty))
}

/// Convert child notionals at `price` into lot-rounded quantities summing to `qty`.
fn child_quantities(
    qty: Decimal,
    price: Decimal,
    notionals: &[Decimal],
    buy: &VenueRules,
    sell: &VenueRules,
) -> ChildSizes {
    let mut children = ChildSizes::new();
    let Some((_, head)) = notionals.split_last() else {
        return children;
    };
    if price <= Decimal::ZERO {
        return children;
    }

    let mut assigned = Decimal::ZERO;
    for notional in head {
        let child = round_both(*notional / price, buy, sell);
        if child > Decimal::ZERO && assigned + child < qty {
            children.push(child);
            assigned += child;
        }
    }
    children.push(qty - assigned);
    children
}

/// Share of a side's fee attributable to the `matched` quantity.
fn matched_fee(side: &SideFill, matched: Decimal) -> Decimal {
    if side.filled_qty <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    side.fee * matched / side.filled_qty
}

fn side_errors(buy: &SideFill, sell: &SideFill) -> String {
    let first = |side: &SideFill| {
        side.legs
            .iter()
            .find_map(|l| l.error.clone())
            .unwrap_or_else(|| "no fill".to_string())
    };
    format!("buy: {}; sell: {}", first(buy), first(sell))
}
