//! End-to-end scenarios against paper venues. No network.

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::watch;

use cross_arb::arbitrage::{
    DetectorConfig, Direction, ExecutionConfig, ExecutionCoordinator, FeeTable, Opportunity, OpportunityDetector,
};
use cross_arb::engine::{EngineConfig, EngineEvent, TradingEngine};
use cross_arb::error::{EngineError, ErrorKind};
use cross_arb::orderbook::{ConsolidatedQuote, DepthAnalyzer, QuoteConsolidator};
use cross_arb::risk::{RiskConfig, RiskGovernor};
use cross_arb::session::{JournalSink, JsonlJournal, MemoryJournal, SessionConfig, SessionController};
use cross_arb::trading::ExecutionStatus;
use cross_arb::utils::now_ms;
use cross_arb::venue::{BookBuilder, PaperConfig, PaperVenue, Quote, VenueId, VenueRegistry, VenueRules};

const SYMBOL: &str = "ETH/USDT";

fn venues(left: PaperConfig, right: PaperConfig) -> (Arc<PaperVenue>, Arc<PaperVenue>, Arc<VenueRegistry>) {
    let left = Arc::new(PaperVenue::with_config(
        "left",
        PaperConfig {
            quote_interval_ms: 20,
            ..left
        },
    ));
    let right = Arc::new(PaperVenue::with_config(
        "right",
        PaperConfig {
            quote_interval_ms: 20,
            ..right
        },
    ));
    left.set_book(
        BookBuilder::new("left", SYMBOL)
            .ladder(dec!(1999), dec!(2000), dec!(10), 5, dec!(1))
            .build(),
    );
    right.set_book(
        BookBuilder::new("right", SYMBOL)
            .ladder(dec!(2010), dec!(2011), dec!(10), 5, dec!(1))
            .build(),
    );
    let registry = Arc::new(
        VenueRegistry::new()
            .with(left.clone(), VenueRules::default())
            .with(right.clone(), VenueRules::default()),
    );
    (left, right, registry)
}

fn detector() -> OpportunityDetector {
    let config = DetectorConfig {
        max_notional: dec!(4000),
        ..Default::default()
    };
    OpportunityDetector::new(config, FeeTable::default(), DepthAnalyzer::default())
}

fn coordinator(registry: Arc<VenueRegistry>, config: ExecutionConfig) -> ExecutionCoordinator {
    ExecutionCoordinator::new(registry, DepthAnalyzer::default(), FeeTable::default(), config)
}

fn quote(venue: &str, bid: Decimal, ask: Decimal, ts: i64) -> Quote {
    Quote {
        venue: VenueId::from(venue),
        symbol: SYMBOL.to_string(),
        bid,
        bid_size: dec!(10),
        ask,
        ask_size: dec!(10),
        exchange_ts_ms: ts,
        received_at_ms: ts,
    }
}

/// Opportunity detected from the same prices the paper books carry.
fn detected(now: i64) -> Opportunity {
    let consolidator = QuoteConsolidator::new(VenueId::from("left"), VenueId::from("right"), 500);
    consolidator
        .update(quote("left", dec!(1999), dec!(2000), now))
        .unwrap();
    consolidator
        .update(quote("right", dec!(2010), dec!(2011), now))
        .unwrap();
    let view: ConsolidatedQuote = consolidator.get(SYMBOL).unwrap();
    detector().detect(&view, now).unwrap()
}

fn engine(
    registry: Arc<VenueRegistry>,
    risk: RiskConfig,
    session: SessionConfig,
    journal: Arc<dyn JournalSink>,
) -> TradingEngine {
    TradingEngine::new(
        EngineConfig {
            detection_interval_ms: 10,
            drain_timeout_ms: 1_000,
            ..Default::default()
        },
        registry.clone(),
        detector(),
        coordinator(registry, ExecutionConfig::default()),
        RiskGovernor::new(risk, now_ms()),
        SessionController::new(session, now_ms()),
        journal,
    )
}

#[test]
fn detection_matches_book_prices() {
    let opp = detected(now_ms());
    assert_eq!(opp.direction, Direction::LeftToRight);
    assert_eq!(opp.buy_price, dec!(2000));
    assert_eq!(opp.sell_price, dec!(2010));
    assert_eq!(opp.gross_edge_bps, dec!(50));
    assert!(opp.net_edge_bps >= dec!(5));
    assert!(opp.notional <= dec!(4000));
}

#[tokio::test]
async fn profitable_session_runs_to_trade_bound() {
    let (left, right, registry) = venues(PaperConfig::default(), PaperConfig::default());
    let path = std::env::temp_dir().join(format!("cross-arb-{}.jsonl", uuid::Uuid::new_v4()));
    let journal = Arc::new(JsonlJournal::open(&path).await.unwrap());
    let engine = engine(
        registry,
        RiskConfig::default(),
        SessionConfig {
            duration_hours: 0.0,
            max_trades: 3,
        },
        journal,
    );
    let mut events = engine.subscribe();
    let (_tx, rx) = watch::channel(false);

    let summary = engine.run(rx).await.unwrap();

    assert!(summary.trades >= 3);
    assert_eq!(summary.successful_trades, summary.trades);
    assert!(summary.total_pnl > Decimal::ZERO);
    assert_eq!(left.cancel_calls() + right.cancel_calls(), 0);

    let text = tokio::fs::read_to_string(&path).await.unwrap();
    let kinds: Vec<String> = text
        .lines()
        .map(|l| serde_json::from_str::<serde_json::Value>(l).unwrap()["event"].to_string())
        .collect();
    assert!(kinds.iter().any(|k| k == "\"execution\""));
    assert_eq!(kinds.last().map(String::as_str), Some("\"summary\""));
    tokio::fs::remove_file(&path).await.ok();

    let mut executions = 0;
    while let Ok(event) = events.try_recv() {
        if let EngineEvent::ExecutionCompleted(result) = event {
            assert_eq!(result.status, ExecutionStatus::Completed);
            executions += 1;
        }
    }
    assert_eq!(executions as u64, summary.trades);
}

#[tokio::test(start_paused = true)]
async fn slow_leg_is_a_latency_failure_with_one_unwind() {
    let (left, right, registry) = venues(
        PaperConfig::default(),
        PaperConfig {
            latency_ms: 200,
            fill_ratio: dec!(0.5),
            ..Default::default()
        },
    );
    let coordinator = coordinator(
        registry,
        ExecutionConfig {
            max_leg_latency_ms: 150,
            ..Default::default()
        },
    );
    let now = now_ms();

    let result = coordinator.execute(&detected(now), now).await;

    assert!(!result.success);
    assert_eq!(result.error_kind(), Some(ErrorKind::LatencyExceeded));
    assert_eq!(result.status, ExecutionStatus::Unwound);
    assert_eq!(right.cancel_calls(), 1);
    let unwinds = left.placed_legs().iter().filter(|l| l.reduce_only).count();
    assert_eq!(unwinds, 1);
    let unwind = result.unwind.unwrap();
    assert_eq!(unwind.qty, result.buy.filled_qty - result.sell.filled_qty);
}

#[tokio::test]
async fn one_sided_fill_is_unwound_exactly_once() {
    let (left, right, registry) = venues(
        PaperConfig::default(),
        PaperConfig {
            fail_orders: true,
            ..Default::default()
        },
    );
    let coordinator = coordinator(registry, ExecutionConfig::default());
    let now = now_ms();

    let result = coordinator.execute(&detected(now), now).await;

    assert_eq!(result.status, ExecutionStatus::Unwound);
    assert_eq!(result.error_kind(), Some(ErrorKind::PartialFill));
    assert!(result.sell.order_ids.is_empty());
    assert!(result.realized_pnl < Decimal::ZERO);
    assert_eq!(left.placed_legs().iter().filter(|l| l.reduce_only).count(), 1);
    assert_eq!(right.placed_legs().iter().filter(|l| l.reduce_only).count(), 0);
}

#[tokio::test]
async fn losing_streak_halts_the_engine() {
    let (_left, _right, registry) = venues(
        PaperConfig::default(),
        PaperConfig {
            fail_orders: true,
            ..Default::default()
        },
    );
    let journal = Arc::new(MemoryJournal::new());
    let engine = engine(
        registry,
        RiskConfig {
            max_consecutive_losses: 3,
            ..Default::default()
        },
        SessionConfig::default(),
        journal.clone(),
    );
    let risk = engine.handles().risk;
    let (_tx, rx) = watch::channel(false);

    let err = engine.run(rx).await.unwrap_err();

    assert!(matches!(err, EngineError::RiskLimitExceeded(ref reason) if reason.contains("consecutive")));
    let state = risk.read().await.state().clone();
    assert_eq!(state.consecutive_losses, 3);
    assert!(state.halted.is_some());
    assert_eq!(journal.count("execution"), 3);
    assert_eq!(journal.count("risk_alert"), 1);
}

#[tokio::test]
async fn duration_bound_ends_the_session() {
    let (left, _right, registry) = venues(PaperConfig::default(), PaperConfig::default());
    let engine = engine(
        registry,
        RiskConfig {
            // Detect but never trade.
            max_notional_per_trade: dec!(1),
            ..Default::default()
        },
        SessionConfig {
            // About 180ms.
            duration_hours: 0.00005,
            max_trades: 0,
        },
        Arc::new(MemoryJournal::new()),
    );
    let (_tx, rx) = watch::channel(false);

    let summary = tokio::time::timeout(Duration::from_secs(5), engine.run(rx))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(summary.trades, 0);
    assert!(summary.duration_secs >= 0.18);
    assert_eq!(left.place_calls(), 0);
}
