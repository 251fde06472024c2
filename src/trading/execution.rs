//! Order placement under a latency budget and side aggregation.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tokio::time::{timeout, Instant};
use tracing::{debug, error, instrument, warn};

use super::order::{ExecutionLeg, Side};
use super::result::{LegOutcome, SideFill};
use crate::metrics;
use crate::venue::{VenueAdapter, VenueId};

/// Place one order on its own task so an adapter panic cannot escape.
///
/// The whole leg, reactive cancel included, is bounded by `2 * budget`. An
/// order that returns after `budget` is cancelled if still open. A placement
/// that never returns leaves the venue's exposure unknown and is reported
/// through `cancel_error`.
#[instrument(skip(adapter, leg), fields(venue = %leg.venue, side = %leg.side, amount = %leg.amount))]
pub async fn place_leg(adapter: Arc<dyn VenueAdapter>, leg: ExecutionLeg, budget: Duration) -> LegOutcome {
    let deadline = budget * 2;
    let started = Instant::now();
    let task_adapter = adapter.clone();
    let task_leg = leg.clone();
    let mut handle = tokio::spawn(async move {
        let start = Instant::now();
        let result = task_adapter.place_order(&task_leg).await;
        (result, start.elapsed())
    });

    let (placed, elapsed) = match timeout(deadline, &mut handle).await {
        Err(_) => {
            handle.abort();
            metrics::inc_latency_breaches(leg.venue.as_str());
            error!(budget_ms = budget.as_millis() as u64, "Order placement timed out, exposure unknown");
            let mut outcome = LegOutcome::failed(
                leg.venue.clone(),
                leg.side,
                leg.amount,
                format!("placement exceeded {}ms", deadline.as_millis()),
            );
            outcome.latency_ms = deadline.as_millis() as u64;
            outcome.latency_exceeded = true;
            outcome.cancel_error = Some(format!(
                "placement on {} timed out, exposure unknown",
                leg.venue
            ));
            return outcome;
        }
        Ok(Err(join_err)) => {
            error!(error = %join_err, "Order placement task failed");
            return LegOutcome::failed(
                leg.venue.clone(),
                leg.side,
                leg.amount,
                format!("adapter task failed: {join_err}"),
            );
        }
        Ok(Ok(done)) => done,
    };

    metrics::record_leg_latency(leg.venue.as_str(), elapsed);
    let latency_ms = elapsed.as_millis() as u64;

    let result = match placed {
        Ok(result) => result,
        Err(e) => {
            warn!(error = %e, "Order placement failed");
            let mut outcome = LegOutcome::failed(leg.venue.clone(), leg.side, leg.amount, e.to_string());
            outcome.latency_ms = latency_ms;
            return outcome;
        }
    };

    let mut outcome = LegOutcome {
        venue: leg.venue.clone(),
        side: leg.side,
        requested_qty: leg.amount,
        order_id: result.order_id.clone(),
        filled_qty: result.filled_qty,
        avg_price: result.avg_price,
        fee: result.fee,
        latency_ms,
        latency_exceeded: false,
        cancelled: false,
        cancel_error: None,
        error: match (result.success, result.error) {
            (true, _) => None,
            (false, Some(e)) => Some(e),
            (false, None) => Some("order not accepted".to_string()),
        },
    };

    if elapsed > budget {
        outcome.latency_exceeded = true;
        metrics::inc_latency_breaches(leg.venue.as_str());
        warn!(latency_ms, budget_ms = budget.as_millis() as u64, "Leg exceeded latency budget");

        if let Some(order_id) = outcome.order_id.clone() {
            let remaining = deadline.saturating_sub(started.elapsed());
            match cancel_order(adapter.as_ref(), &leg.venue, &leg.symbol, &order_id, remaining).await {
                Ok(cancelled) => outcome.cancelled = cancelled,
                Err(reason) => outcome.cancel_error = Some(reason),
            }
        }
    }

    outcome
}

/// Cancel one order, bounded by `budget`.
///
/// `Ok(false)` means the order was already closed. `Err` means its state is unknown.
pub async fn cancel_order(
    adapter: &dyn VenueAdapter,
    venue: &VenueId,
    symbol: &str,
    order_id: &str,
    budget: Duration,
) -> Result<bool, String> {
    match timeout(budget, adapter.cancel_order(symbol, order_id)).await {
        Ok(Ok(cancelled)) => {
            debug!(venue = %venue, order_id, cancelled, "Reactive cancel done");
            Ok(cancelled)
        }
        Ok(Err(e)) => {
            error!(venue = %venue, order_id, error = %e, "Cancel failed, exposure unknown");
            Err(e.to_string())
        }
        Err(_) => {
            error!(venue = %venue, order_id, "Cancel timed out, exposure unknown");
            Err(format!("cancel of {order_id} on {venue} timed out"))
        }
    }
}

/// Fold child outcomes of one side.
///
/// The side succeeds when at least one child order was accepted; no order id
/// is ever invented for a side whose children all failed.
pub fn aggregate_side(venue: VenueId, side: Side, requested_qty: Decimal, legs: Vec<LegOutcome>) -> SideFill {
    let order_ids: Vec<String> = legs
        .iter()
        .filter(|l| l.is_placed())
        .filter_map(|l| l.order_id.clone())
        .collect();

    let filled_qty: Decimal = legs.iter().map(|l| l.filled_qty).sum();
    let filled_notional: Decimal = legs.iter().map(|l| l.filled_qty * l.avg_price).sum();
    let fee: Decimal = legs.iter().map(|l| l.fee).sum();
    let avg_price = if filled_qty > Decimal::ZERO {
        filled_notional / filled_qty
    } else {
        Decimal::ZERO
    };

    SideFill {
        venue,
        side,
        requested_qty,
        success: !order_ids.is_empty(),
        order_ids,
        filled_qty,
        avg_price,
        fee,
        latency_exceeded: legs.iter().any(|l| l.latency_exceeded),
        legs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::venue::{BookBuilder, PaperConfig, PaperVenue};
    use rust_decimal_macros::dec;

    fn paper(config: PaperConfig) -> Arc<PaperVenue> {
        let venue = PaperVenue::with_config("left", config);
        venue.set_book(
            BookBuilder::new("left", "ETH/USDT")
                .ladder(dec!(1999), dec!(2000), dec!(5), 3, dec!(1))
                .build(),
        );
        Arc::new(venue)
    }

    fn leg(amount: Decimal) -> ExecutionLeg {
        ExecutionLeg::buy(VenueId::from("left"), "ETH/USDT", amount, dec!(2001))
    }

    fn outcome(order_id: Option<&str>, filled: Decimal, price: Decimal) -> LegOutcome {
        LegOutcome {
            venue: VenueId::from("left"),
            side: Side::Buy,
            requested_qty: dec!(1),
            order_id: order_id.map(str::to_string),
            filled_qty: filled,
            avg_price: price,
            fee: dec!(0.1),
            latency_ms: 1,
            latency_exceeded: false,
            cancelled: false,
            cancel_error: None,
            error: None,
        }
    }

    #[tokio::test]
    async fn place_leg_reports_fill() {
        let venue = paper(PaperConfig::default());
        let out = place_leg(venue.clone(), leg(dec!(2)), Duration::from_millis(100)).await;
        assert!(out.is_placed());
        assert_eq!(out.filled_qty, dec!(2));
        assert!(!out.latency_exceeded);
        assert_eq!(venue.cancel_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_leg_is_cancelled_reactively() {
        let venue = paper(PaperConfig {
            latency_ms: 200,
            fill_ratio: dec!(0.5),
            ..Default::default()
        });
        let out = place_leg(venue.clone(), leg(dec!(2)), Duration::from_millis(150)).await;
        assert!(out.latency_exceeded);
        assert!(out.cancelled);
        assert_eq!(venue.cancel_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_leg_times_out_with_unknown_exposure() {
        let venue = paper(PaperConfig {
            latency_ms: 1_000,
            ..Default::default()
        });
        let out = place_leg(venue, leg(dec!(1)), Duration::from_millis(150)).await;
        assert!(out.latency_exceeded);
        assert!(out.order_id.is_none());
        assert!(out.error.is_some());
        assert!(out.cancel_error.unwrap().contains("exposure unknown"));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_leg_and_cancel_fit_in_twice_the_budget() {
        let venue = paper(PaperConfig {
            latency_ms: 250,
            fill_ratio: dec!(0.5),
            ..Default::default()
        });
        let start = Instant::now();
        let out = place_leg(venue, leg(dec!(2)), Duration::from_millis(150)).await;
        assert!(out.latency_exceeded);
        assert!(out.cancelled);
        assert!(start.elapsed() <= Duration::from_millis(300));
    }

    #[tokio::test]
    async fn adapter_panic_becomes_failed_leg() {
        let venue = paper(PaperConfig {
            panic_on_order: true,
            ..Default::default()
        });
        let out = place_leg(venue, leg(dec!(1)), Duration::from_millis(100)).await;
        assert!(!out.is_placed());
        assert!(out.error.unwrap().contains("adapter task failed"));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_reactive_cancel_is_reported() {
        let venue = paper(PaperConfig {
            latency_ms: 200,
            fill_ratio: dec!(0.5),
            fail_cancels: true,
            ..Default::default()
        });
        let out = place_leg(venue, leg(dec!(2)), Duration::from_millis(150)).await;
        assert!(out.cancel_error.is_some());
    }

    #[test]
    fn aggregate_side_weights_by_fill() {
        let side = aggregate_side(
            VenueId::from("left"),
            Side::Buy,
            dec!(3),
            vec![
                outcome(Some("a"), dec!(1), dec!(100)),
                outcome(Some("b"), dec!(2), dec!(103)),
            ],
        );
        assert!(side.success);
        assert_eq!(side.order_ids, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(side.filled_qty, dec!(3));
        assert_eq!(side.avg_price, dec!(102));
        assert_eq!(side.fee, dec!(0.2));
        assert_eq!(side.fill_ratio(), dec!(1));
    }

    #[test]
    fn aggregate_side_never_invents_order_ids() {
        let mut failed = outcome(None, dec!(0), dec!(0));
        failed.error = Some("rejected".to_string());
        let side = aggregate_side(VenueId::from("left"), Side::Buy, dec!(1), vec![failed]);
        assert!(!side.success);
        assert!(side.order_ids.is_empty());
        assert_eq!(side.avg_price, dec!(0));
    }
}
