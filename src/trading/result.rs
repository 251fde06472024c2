//! Execution outcomes: per order, per side and per opportunity.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::order::Side;
use crate::arbitrage::Opportunity;
use crate::error::{ErrorKind, ExecutionFailure};
use crate::venue::VenueId;

/// Lifecycle of one opportunity execution.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ExecutionStatus {
    /// Accepted, not yet started.
    Pending,
    /// Orders in flight.
    Executing,
    /// Both sides filled above the threshold.
    Completed,
    /// Fills diverged and the position was kept.
    PartiallyFilled,
    /// Closing unmatched exposure.
    Unwinding,
    /// Unmatched exposure was closed.
    Unwound,
    /// Nothing (or nothing safe) happened.
    Failed,
}

impl ExecutionStatus {
    /// Whether no further transition can happen.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Completed
                | ExecutionStatus::PartiallyFilled
                | ExecutionStatus::Unwound
                | ExecutionStatus::Failed
        )
    }
}

/// Outcome of one child order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegOutcome {
    /// Venue.
    pub venue: VenueId,
    /// Side.
    pub side: Side,
    /// Requested quantity.
    pub requested_qty: Decimal,
    /// Venue order id, present only when the venue returned one.
    pub order_id: Option<String>,
    /// Filled quantity.
    pub filled_qty: Decimal,
    /// Average fill price.
    pub avg_price: Decimal,
    /// Fee in quote currency.
    pub fee: Decimal,
    /// Placement round trip.
    pub latency_ms: u64,
    /// Round trip exceeded the per-leg budget.
    pub latency_exceeded: bool,
    /// A reactive cancel found the order open and cancelled it.
    pub cancelled: bool,
    /// A reactive cancel failed; exposure state unknown.
    pub cancel_error: Option<String>,
    /// Placement error, if any.
    pub error: Option<String>,
}

impl LegOutcome {
    /// A leg that never produced an order.
    pub fn failed(venue: VenueId, side: Side, requested_qty: Decimal, error: impl Into<String>) -> Self {
        Self {
            venue,
            side,
            requested_qty,
            order_id: None,
            filled_qty: Decimal::ZERO,
            avg_price: Decimal::ZERO,
            fee: Decimal::ZERO,
            latency_ms: 0,
            latency_exceeded: false,
            cancelled: false,
            cancel_error: None,
            error: Some(error.into()),
        }
    }

    /// Venue accepted the order.
    pub fn is_placed(&self) -> bool {
        self.order_id.is_some() && self.error.is_none()
    }
}

/// All child orders of one side, aggregated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SideFill {
    /// Venue.
    pub venue: VenueId,
    /// Side.
    pub side: Side,
    /// Total requested quantity.
    pub requested_qty: Decimal,
    /// Ids of every accepted child order.
    pub order_ids: Vec<String>,
    /// Total filled quantity.
    pub filled_qty: Decimal,
    /// Notional-weighted average fill price.
    pub avg_price: Decimal,
    /// Total fee.
    pub fee: Decimal,
    /// At least one child order was accepted.
    pub success: bool,
    /// Any child breached its latency budget.
    pub latency_exceeded: bool,
    /// Child outcomes.
    pub legs: Vec<LegOutcome>,
}

impl SideFill {
    /// Side with no orders placed.
    pub fn empty(venue: VenueId, side: Side, requested_qty: Decimal) -> Self {
        Self {
            venue,
            side,
            requested_qty,
            order_ids: Vec::new(),
            filled_qty: Decimal::ZERO,
            avg_price: Decimal::ZERO,
            fee: Decimal::ZERO,
            success: false,
            latency_exceeded: false,
            legs: Vec::new(),
        }
    }

    /// Filled over requested, zero when nothing was requested.
    pub fn fill_ratio(&self) -> Decimal {
        if self.requested_qty <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        self.filled_qty / self.requested_qty
    }

    /// Filled notional.
    pub fn notional(&self) -> Decimal {
        self.filled_qty * self.avg_price
    }
}

/// Reduce-only order closing unmatched exposure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnwindOutcome {
    /// Venue holding the exposure.
    pub venue: VenueId,
    /// Side of the closing order.
    pub side: Side,
    /// Unmatched quantity.
    pub qty: Decimal,
    /// Venue order id of the unwind.
    pub order_id: Option<String>,
    /// Estimated cost booked against PnL.
    pub estimated_cost: Decimal,
    /// Unwind accepted by the venue.
    pub success: bool,
    /// Error, if any.
    pub error: Option<String>,
}

/// Audit record of one opportunity execution. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// The opportunity this result belongs to.
    pub opportunity: Opportunity,
    /// Final status.
    pub status: ExecutionStatus,
    /// Completed without any failure.
    pub success: bool,
    /// Buy side.
    pub buy: SideFill,
    /// Sell side.
    pub sell: SideFill,
    /// Unwind, when one was attempted.
    pub unwind: Option<UnwindOutcome>,
    /// Wall time from start to result.
    pub latency_ms: u64,
    /// Realized PnL in quote currency.
    pub realized_pnl: Decimal,
    /// Failure classification.
    pub error: Option<ExecutionFailure>,
    /// Start time (unix ms).
    pub started_at_ms: i64,
}

impl ExecutionResult {
    /// A result that failed before any order was placed.
    pub fn rejected(
        opportunity: &Opportunity,
        failure: ExecutionFailure,
        started_at_ms: i64,
        latency_ms: u64,
    ) -> Self {
        Self {
            buy: SideFill::empty(opportunity.buy_venue.clone(), Side::Buy, opportunity.size),
            sell: SideFill::empty(opportunity.sell_venue.clone(), Side::Sell, opportunity.size),
            opportunity: opportunity.clone(),
            status: ExecutionStatus::Failed,
            success: false,
            unwind: None,
            latency_ms,
            realized_pnl: Decimal::ZERO,
            error: Some(failure),
            started_at_ms,
        }
    }

    /// Failure class, if any.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }

    /// Whether this result carries a real unhedged position.
    pub fn is_fatal(&self) -> bool {
        self.error_kind().is_some_and(|k| k.is_fatal())
    }

    /// Fees paid on both sides.
    pub fn total_fees(&self) -> Decimal {
        self.buy.fee + self.sell.fee
    }

    /// Notional traded on the buy side.
    pub fn traded_notional(&self) -> Decimal {
        self.buy.notional()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arbitrage::opportunity::fixtures;
    use rust_decimal_macros::dec;

    #[test]
    fn rejected_result_is_failed_and_empty() {
        let opp = fixtures::opportunity(0);
        let result = ExecutionResult::rejected(
            &opp,
            ExecutionFailure::new(ErrorKind::Validation, "expired"),
            0,
            1,
        );
        assert_eq!(result.status, ExecutionStatus::Failed);
        assert!(!result.success);
        assert!(result.buy.order_ids.is_empty());
        assert_eq!(result.error_kind(), Some(ErrorKind::Validation));
        assert!(!result.is_fatal());
    }

    #[test]
    fn side_fill_ratio() {
        let mut side = SideFill::empty(VenueId::from("left"), Side::Buy, dec!(2));
        assert_eq!(side.fill_ratio(), dec!(0));
        side.filled_qty = dec!(1.9);
        assert_eq!(side.fill_ratio(), dec!(0.95));
    }

    #[test]
    fn status_terminality() {
        assert!(ExecutionStatus::Unwound.is_terminal());
        assert!(!ExecutionStatus::Unwinding.is_terminal());
        assert_eq!(ExecutionStatus::PartiallyFilled.to_string(), "partially_filled");
    }
}
