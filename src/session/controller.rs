//! Session bounds, trade recording and summaries.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::journal::{JournalEntry, JournalSink};
use crate::arbitrage::{Direction, Opportunity};
use crate::trading::{ExecutionResult, ExecutionStatus};
use crate::venue::VenueId;

const MS_PER_HOUR: f64 = 3_600_000.0;

/// Bounds of one run. Zero means unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct SessionConfig {
    /// Maximum run time in hours.
    pub duration_hours: f64,
    /// Maximum number of executed trades.
    pub max_trades: u64,
}

/// One exported row per executed trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    /// Execution start (unix ms).
    pub timestamp: i64,
    /// Symbol.
    pub symbol: String,
    /// Direction.
    pub direction: Direction,
    /// Venue bought on.
    pub buy_exchange: VenueId,
    /// Venue sold on.
    pub sell_exchange: VenueId,
    /// Gross edge at detection.
    pub spread_bps: Decimal,
    /// Net edge at detection.
    pub net_edge_bps: Decimal,
    /// Traded notional (detected notional when nothing filled).
    pub trade_size_usd: Decimal,
    /// Fees paid.
    pub fees_usd: Decimal,
    /// Slippage estimate at detection.
    pub slippage_bps: Decimal,
    /// Realized PnL.
    pub realized_pnl: Decimal,
    /// Execution wall time.
    pub execution_time_ms: u64,
    /// Completed hedge.
    pub success: bool,
    /// Final status.
    pub status: ExecutionStatus,
}

impl TradeRecord {
    /// Build the exported row for a result.
    pub fn from_result(result: &ExecutionResult) -> Self {
        let opp = &result.opportunity;
        let traded = result.traded_notional();
        Self {
            timestamp: result.started_at_ms,
            symbol: opp.symbol.clone(),
            direction: opp.direction,
            buy_exchange: opp.buy_venue.clone(),
            sell_exchange: opp.sell_venue.clone(),
            spread_bps: opp.gross_edge_bps,
            net_edge_bps: opp.net_edge_bps,
            trade_size_usd: if traded > Decimal::ZERO { traded } else { opp.notional },
            fees_usd: result.total_fees(),
            slippage_bps: opp.slippage_bps,
            realized_pnl: result.realized_pnl,
            execution_time_ms: result.latency_ms,
            success: result.success,
            status: result.status,
        }
    }
}

/// End-of-run statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    /// Session start (unix ms).
    pub started_at_ms: i64,
    /// Summary time (unix ms).
    pub ended_at_ms: i64,
    /// Elapsed seconds.
    pub duration_secs: f64,
    /// Opportunities recorded.
    pub opportunities: u64,
    /// Trades recorded.
    pub trades: u64,
    /// Successful trades.
    pub successful_trades: u64,
    /// Successful over total trades, zero without trades.
    pub success_rate: f64,
    /// Realized PnL.
    pub total_pnl: Decimal,
    /// PnL per trade, zero without trades.
    pub average_pnl: Decimal,
    /// Fees paid.
    pub total_fees: Decimal,
}

/// Bounds a run and keeps its records.
#[derive(Debug, Clone)]
pub struct SessionController {
    config: SessionConfig,
    started_at_ms: i64,
    opportunities: u64,
    trades: Vec<TradeRecord>,
    total_pnl: Decimal,
    total_fees: Decimal,
    successful: u64,
}

impl SessionController {
    /// Start a session at `now_ms`.
    pub fn new(config: SessionConfig, now_ms: i64) -> Self {
        info!(
            duration_hours = config.duration_hours,
            max_trades = config.max_trades,
            "Session started"
        );
        Self {
            config,
            started_at_ms: now_ms,
            opportunities: 0,
            trades: Vec::new(),
            total_pnl: Decimal::ZERO,
            total_fees: Decimal::ZERO,
            successful: 0,
        }
    }

    /// Session bounds.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Session start.
    pub fn started_at_ms(&self) -> i64 {
        self.started_at_ms
    }

    /// Hours since start.
    pub fn elapsed_hours(&self, now_ms: i64) -> f64 {
        (now_ms - self.started_at_ms).max(0) as f64 / MS_PER_HOUR
    }

    /// False once either nonzero bound is reached.
    pub fn should_continue(&self, now_ms: i64) -> bool {
        let cfg = &self.config;
        if cfg.duration_hours > 0.0 && self.elapsed_hours(now_ms) >= cfg.duration_hours {
            return false;
        }
        if cfg.max_trades > 0 && self.trades.len() as u64 >= cfg.max_trades {
            return false;
        }
        true
    }

    /// Record a detected opportunity.
    pub fn record_opportunity(&mut self, opportunity: &Opportunity) {
        self.opportunities += 1;
        debug!(id = %opportunity.id, count = self.opportunities, "Opportunity recorded");
    }

    /// Record an executed trade.
    pub fn record_trade(&mut self, result: &ExecutionResult) -> TradeRecord {
        let record = TradeRecord::from_result(result);
        self.total_pnl += record.realized_pnl;
        self.total_fees += record.fees_usd;
        if record.success {
            self.successful += 1;
        }
        self.trades.push(record.clone());
        record
    }

    /// Recorded trades.
    pub fn trades(&self) -> &[TradeRecord] {
        &self.trades
    }

    /// Statistics as of `now_ms`.
    pub fn summary(&self, now_ms: i64) -> SessionSummary {
        let trades = self.trades.len() as u64;
        let (success_rate, average_pnl) = if trades > 0 {
            (
                self.successful as f64 / trades as f64,
                self.total_pnl / Decimal::from(trades),
            )
        } else {
            (0.0, Decimal::ZERO)
        };
        SessionSummary {
            started_at_ms: self.started_at_ms,
            ended_at_ms: now_ms,
            duration_secs: (now_ms - self.started_at_ms).max(0) as f64 / 1_000.0,
            opportunities: self.opportunities,
            trades,
            successful_trades: self.successful,
            success_rate,
            total_pnl: self.total_pnl,
            average_pnl,
            total_fees: self.total_fees,
        }
    }

    /// Write trades and the summary to `sink`. Best effort: failures are logged.
    pub async fn export(&self, sink: &dyn JournalSink, now_ms: i64) -> SessionSummary {
        let summary = self.summary(now_ms);
        let mut failed = 0usize;

        for trade in &self.trades {
            if let Err(e) = sink.record(&JournalEntry::Trade(trade.clone())).await {
                failed += 1;
                warn!(error = %e, "Failed to export trade");
            }
        }
        if let Err(e) = sink.record(&JournalEntry::Summary(summary.clone())).await {
            warn!(error = %e, "Failed to export session summary");
        }
        if let Err(e) = sink.flush().await {
            warn!(error = %e, "Failed to flush journal");
        }

        info!(
            trades = summary.trades,
            failed_exports = failed,
            total_pnl = %summary.total_pnl,
            success_rate = summary.success_rate,
            "Session exported"
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arbitrage::opportunity::fixtures;
    use crate::error::{ErrorKind, ExecutionFailure};
    use crate::session::MemoryJournal;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;

    fn result(pnl: Decimal, success: bool) -> ExecutionResult {
        let opp = fixtures::opportunity(0);
        let mut r = ExecutionResult::rejected(&opp, ExecutionFailure::new(ErrorKind::Venue, "x"), 10, 42);
        r.realized_pnl = pnl;
        r.success = success;
        r
    }

    #[test]
    fn unbounded_session_always_continues() {
        let mut s = SessionController::new(SessionConfig::default(), 0);
        for _ in 0..100 {
            s.record_trade(&result(dec!(1), true));
        }
        assert!(s.should_continue(i64::MAX / 2));
    }

    #[test]
    fn duration_bound_is_inclusive() {
        let s = SessionController::new(
            SessionConfig {
                duration_hours: 0.5,
                max_trades: 0,
            },
            1_000,
        );
        assert!(s.should_continue(1_000 + 1_799_999));
        assert!(!s.should_continue(1_000 + 1_800_000));
    }

    #[test]
    fn trade_bound_is_inclusive() {
        let mut s = SessionController::new(
            SessionConfig {
                duration_hours: 0.0,
                max_trades: 2,
            },
            0,
        );
        s.record_trade(&result(dec!(1), true));
        assert!(s.should_continue(1));
        s.record_trade(&result(dec!(1), true));
        assert!(!s.should_continue(1));
    }

    #[test]
    fn trade_record_uses_detected_notional_without_fills() {
        let record = TradeRecord::from_result(&result(dec!(0), false));
        assert_eq!(record.trade_size_usd, dec!(4000));
        assert_eq!(record.spread_bps, dec!(30));
        assert_eq!(record.execution_time_ms, 42);
        assert_eq!(record.timestamp, 10);
        assert_eq!(record.status, ExecutionStatus::Failed);
    }

    #[test]
    fn summary_aggregates() {
        let mut s = SessionController::new(SessionConfig::default(), 0);
        s.record_opportunity(&fixtures::opportunity(0));
        s.record_opportunity(&fixtures::opportunity(1));
        s.record_trade(&result(dec!(3), true));
        s.record_trade(&result(dec!(-1), false));

        let summary = s.summary(60_000);
        assert_eq!(summary.opportunities, 2);
        assert_eq!(summary.trades, 2);
        assert_eq!(summary.success_rate, 0.5);
        assert_eq!(summary.total_pnl, dec!(2));
        assert_eq!(summary.average_pnl, dec!(1));
        assert_eq!(summary.duration_secs, 60.0);
    }

    #[tokio::test]
    async fn export_writes_trades_then_summary() {
        let mut s = SessionController::new(SessionConfig::default(), 0);
        s.record_trade(&result(dec!(1), true));
        let journal = MemoryJournal::new();

        let summary = s.export(&journal, 5).await;

        assert_eq!(summary.trades, 1);
        let entries = journal.entries();
        assert_eq!(entries.len(), 2);
        assert!(matches!(entries[0], JournalEntry::Trade(_)));
        assert!(matches!(entries[1], JournalEntry::Summary(_)));
    }

    struct FailingSink;

    #[async_trait]
    impl JournalSink for FailingSink {
        async fn record(&self, _entry: &JournalEntry) -> crate::error::Result<()> {
            Err(std::io::Error::other("disk full").into())
        }
    }

    #[tokio::test]
    async fn export_failure_does_not_propagate() {
        let mut s = SessionController::new(SessionConfig::default(), 0);
        s.record_trade(&result(dec!(1), true));
        let summary = s.export(&FailingSink, 5).await;
        assert_eq!(summary.total_pnl, dec!(1));
    }
}
