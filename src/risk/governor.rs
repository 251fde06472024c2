//! Pre-trade gate and post-trade circuit breaker.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::arbitrage::Opportunity;
use crate::metrics;
use crate::trading::ExecutionResult;

/// Milliseconds after which daily counters reset on their own.
pub const DAY_MS: i64 = 24 * 60 * 60 * 1_000;

/// Risk envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Losing trades in a row that block trading.
    pub max_consecutive_losses: u32,
    /// Daily loss magnitude that blocks trading.
    pub max_daily_loss: Decimal,
    /// Notional budget per day.
    pub max_daily_notional: Decimal,
    /// Notional cap per trade.
    pub max_notional_per_trade: Decimal,
    /// Drawdown from peak PnL, percent of trading capital.
    pub max_drawdown_pct: Decimal,
    /// Absolute total PnL floor (negative); zero disables.
    pub emergency_stop_pnl: Decimal,
    /// Trades per day; zero disables.
    pub max_trades_per_day: u64,
    /// Trades per session; zero disables.
    pub max_trades_per_session: u64,
    /// Loss on one trade, percent of its notional.
    pub max_loss_per_trade_pct: Decimal,
    /// Session loss, percent of trading capital.
    pub max_session_loss_pct: Decimal,
    /// Capital the percentage limits refer to.
    pub trading_capital: Decimal,
    /// Hard ceiling on the derived risk score.
    pub max_risk_score: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_consecutive_losses: 3,
            max_daily_loss: Decimal::new(500, 0),
            max_daily_notional: Decimal::new(100_000, 0),
            max_notional_per_trade: Decimal::new(10_000, 0),
            max_drawdown_pct: Decimal::new(5, 0),
            emergency_stop_pnl: Decimal::new(-1_000, 0),
            max_trades_per_day: 100,
            max_trades_per_session: 0,
            max_loss_per_trade_pct: Decimal::ONE,
            max_session_loss_pct: Decimal::TWO,
            trading_capital: Decimal::new(10_000, 0),
            max_risk_score: 0.8,
        }
    }
}

/// Cumulative trading metrics. Counters only grow within an epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RiskState {
    /// Trades since start.
    pub total_trades: u64,
    /// Trades since the last daily reset.
    pub daily_trades: u64,
    /// Trades since the last session reset.
    pub session_trades: u64,
    /// Current losing streak.
    pub consecutive_losses: u32,
    /// Winning trades.
    pub wins: u64,
    /// Losing trades.
    pub losses: u64,
    /// Realized PnL since start.
    pub total_pnl: Decimal,
    /// Realized PnL today.
    pub daily_pnl: Decimal,
    /// Realized PnL this session.
    pub session_pnl: Decimal,
    /// Notional traded today.
    pub daily_notional: Decimal,
    /// Notional of executions still in flight.
    pub reserved_notional: Decimal,
    /// Largest single realized loss.
    pub max_drawdown: Decimal,
    /// Highest total PnL seen.
    pub peak_pnl: Decimal,
    /// Weighted risk score in `[0, 1]`.
    pub risk_score: f64,
    /// Last daily reset (unix ms).
    pub last_daily_reset_ms: i64,
    /// Halt reason while the breaker is tripped.
    pub halted: Option<String>,
}

impl RiskState {
    /// Wins over decided trades; `None` before the first decided trade.
    pub fn win_rate(&self) -> Option<f64> {
        let decided = self.wins + self.losses;
        (decided > 0).then(|| self.wins as f64 / decided as f64)
    }
}

/// Pre-trade rejection.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RiskRejection {
    /// Breaker tripped; waiting for a resume or reset.
    #[error("trading halted: {0}")]
    Halted(String),

    /// Opportunity past its TTL.
    #[error("opportunity {0} expired")]
    Expired(String),

    /// Trade larger than the per-trade cap.
    #[error("notional {notional} exceeds per-trade cap {max}")]
    TradeNotional {
        /// Trade notional.
        notional: Decimal,
        /// Cap.
        max: Decimal,
    },

    /// Trade larger than what is left of the daily budget.
    #[error("notional {notional} exceeds remaining daily budget {remaining}")]
    DailyNotional {
        /// Trade notional.
        notional: Decimal,
        /// Remaining budget.
        remaining: Decimal,
    },

    /// Losing streak at the limit.
    #[error("{streak} consecutive losses (max {max})")]
    LossStreak {
        /// Current streak.
        streak: u32,
        /// Limit.
        max: u32,
    },

    /// Daily PnL at or below the loss limit.
    #[error("daily pnl {pnl} at or below -{max}")]
    DailyLoss {
        /// Daily PnL.
        pnl: Decimal,
        /// Loss limit.
        max: Decimal,
    },

    /// Risk score above the ceiling.
    #[error("risk score {score:.2} above {max:.2}")]
    RiskScore {
        /// Current score.
        score: f64,
        /// Ceiling.
        max: f64,
    },
}

impl RiskRejection {
    /// Metric label.
    pub fn reason(&self) -> &'static str {
        match self {
            RiskRejection::Halted(_) => "halted",
            RiskRejection::Expired(_) => "expired",
            RiskRejection::TradeNotional { .. } => "trade_notional",
            RiskRejection::DailyNotional { .. } => "daily_notional",
            RiskRejection::LossStreak { .. } => "loss_streak",
            RiskRejection::DailyLoss { .. } => "daily_loss",
            RiskRejection::RiskScore { .. } => "risk_score",
        }
    }
}

/// Condition that trips the circuit breaker.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StopReason {
    /// Losing streak at the limit.
    #[error("{streak} consecutive losses")]
    LossStreak {
        /// Current streak.
        streak: u32,
    },

    /// Daily loss limit reached.
    #[error("daily pnl {pnl} reached loss limit")]
    DailyLoss {
        /// Daily PnL.
        pnl: Decimal,
    },

    /// Drawdown from peak over the limit.
    #[error("drawdown {pct}% from peak exceeds {max}%")]
    Drawdown {
        /// Drawdown, percent of capital.
        pct: Decimal,
        /// Limit.
        max: Decimal,
    },

    /// Total PnL under the emergency floor.
    #[error("total pnl {pnl} under emergency floor {floor}")]
    EmergencyStop {
        /// Total PnL.
        pnl: Decimal,
        /// Floor.
        floor: Decimal,
    },

    /// Daily trade ceiling reached.
    #[error("{trades} trades today (max {max})")]
    DailyTrades {
        /// Trades today.
        trades: u64,
        /// Ceiling.
        max: u64,
    },

    /// Session trade ceiling reached.
    #[error("{trades} trades this session (max {max})")]
    SessionTrades {
        /// Trades this session.
        trades: u64,
        /// Ceiling.
        max: u64,
    },

    /// Last trade lost more than allowed.
    #[error("last trade lost {pct}% of notional (max {max}%)")]
    TradeLoss {
        /// Loss, percent of notional.
        pct: Decimal,
        /// Limit.
        max: Decimal,
    },

    /// Session lost more than allowed.
    #[error("session lost {pct}% of capital (max {max}%)")]
    SessionLoss {
        /// Loss, percent of capital.
        pct: Decimal,
        /// Limit.
        max: Decimal,
    },
}

/// Alert severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Severity {
    /// Informational.
    Info,
    /// Needs attention.
    Warning,
    /// Trading stopped.
    Critical,
}

/// Alert raised when the breaker trips or a fatal execution occurs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAlert {
    /// Alert type, e.g. `circuit_breaker`.
    pub kind: String,
    /// Severity.
    pub severity: Severity,
    /// Human readable message.
    pub message: String,
}

impl RiskAlert {
    /// Create an alert.
    pub fn new(kind: impl Into<String>, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            severity,
            message: message.into(),
        }
    }
}

/// Owns [`RiskState`]; the only writer.
#[derive(Debug, Clone)]
pub struct RiskGovernor {
    config: RiskConfig,
    state: RiskState,
}

impl RiskGovernor {
    /// Create a governor whose first trading day starts at `now_ms`.
    pub fn new(config: RiskConfig, now_ms: i64) -> Self {
        Self {
            config,
            state: RiskState {
                last_daily_reset_ms: now_ms,
                ..Default::default()
            },
        }
    }

    /// Active limits.
    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// Current state.
    pub fn state(&self) -> &RiskState {
        &self.state
    }

    /// Whether the breaker is tripped.
    pub fn is_halted(&self) -> bool {
        self.state.halted.is_some()
    }

    /// Pre-trade gate.
    pub fn check(&mut self, opportunity: &Opportunity, now_ms: i64) -> Result<(), RiskRejection> {
        self.roll_day(now_ms);
        let verdict = self.evaluate(opportunity, now_ms);
        if let Err(rejection) = &verdict {
            metrics::inc_risk_rejections(rejection.reason());
            debug!(id = %opportunity.id, reason = %rejection, "Risk rejected opportunity");
        }
        verdict
    }

    fn evaluate(&self, opp: &Opportunity, now_ms: i64) -> Result<(), RiskRejection> {
        let cfg = &self.config;
        let st = &self.state;

        if let Some(reason) = &st.halted {
            return Err(RiskRejection::Halted(reason.clone()));
        }
        if opp.is_expired(now_ms) {
            return Err(RiskRejection::Expired(opp.id.clone()));
        }
        if opp.notional > cfg.max_notional_per_trade {
            return Err(RiskRejection::TradeNotional {
                notional: opp.notional,
                max: cfg.max_notional_per_trade,
            });
        }
        let remaining = cfg.max_daily_notional - st.daily_notional - st.reserved_notional;
        if opp.notional > remaining {
            return Err(RiskRejection::DailyNotional {
                notional: opp.notional,
                remaining: remaining.max(Decimal::ZERO),
            });
        }
        if cfg.max_consecutive_losses > 0 && st.consecutive_losses >= cfg.max_consecutive_losses {
            return Err(RiskRejection::LossStreak {
                streak: st.consecutive_losses,
                max: cfg.max_consecutive_losses,
            });
        }
        if cfg.max_daily_loss > Decimal::ZERO && st.daily_pnl <= -cfg.max_daily_loss {
            return Err(RiskRejection::DailyLoss {
                pnl: st.daily_pnl,
                max: cfg.max_daily_loss,
            });
        }
        if st.risk_score > cfg.max_risk_score {
            return Err(RiskRejection::RiskScore {
                score: st.risk_score,
                max: cfg.max_risk_score,
            });
        }
        Ok(())
    }

    /// Hold `notional` of the daily budget for an execution about to start.
    ///
    /// Released by [`RiskGovernor::update`] when its result arrives.
    pub fn reserve(&mut self, notional: Decimal) {
        self.state.reserved_notional += notional;
    }

    /// Fold one execution result into the state.
    pub fn update(&mut self, result: &ExecutionResult, now_ms: i64) {
        self.roll_day(now_ms);
        let pnl = result.realized_pnl;
        let st = &mut self.state;

        st.reserved_notional = (st.reserved_notional - result.opportunity.notional).max(Decimal::ZERO);

        st.total_trades += 1;
        st.daily_trades += 1;
        st.session_trades += 1;
        st.total_pnl += pnl;
        st.daily_pnl += pnl;
        st.session_pnl += pnl;
        st.daily_notional += result.traded_notional();

        if pnl > Decimal::ZERO {
            st.wins += 1;
            st.consecutive_losses = 0;
        } else if pnl < Decimal::ZERO {
            st.losses += 1;
            st.consecutive_losses += 1;
            st.max_drawdown = st.max_drawdown.max(-pnl);
        }
        st.peak_pnl = st.peak_pnl.max(st.total_pnl);

        self.state.risk_score = self.score();
        debug!(
            pnl = %pnl,
            daily_pnl = %self.state.daily_pnl,
            streak = self.state.consecutive_losses,
            risk_score = self.state.risk_score,
            "Risk state updated"
        );
    }

    /// Weighted score: streak 0.3, daily loss 0.3, drawdown 0.2, losing rate 0.2.
    fn score(&self) -> f64 {
        let cfg = &self.config;
        let st = &self.state;

        let streak = if cfg.max_consecutive_losses > 0 {
            f64::from(st.consecutive_losses) / f64::from(cfg.max_consecutive_losses)
        } else {
            0.0
        };
        let daily_loss = ratio((-st.daily_pnl).max(Decimal::ZERO), cfg.max_daily_loss);
        let drawdown_budget = cfg.trading_capital * cfg.max_drawdown_pct / Decimal::ONE_HUNDRED;
        let drawdown = ratio(st.max_drawdown, drawdown_budget);
        let losing = st.win_rate().map(|w| 1.0 - w).unwrap_or(0.0);

        (0.3 * streak.min(1.0) + 0.3 * daily_loss + 0.2 * drawdown + 0.2 * losing).clamp(0.0, 1.0)
    }

    /// First breached stop condition, if any. Pure.
    pub fn should_stop(&self, latest: Option<&ExecutionResult>) -> Option<StopReason> {
        let cfg = &self.config;
        let st = &self.state;

        if cfg.max_consecutive_losses > 0 && st.consecutive_losses >= cfg.max_consecutive_losses {
            return Some(StopReason::LossStreak {
                streak: st.consecutive_losses,
            });
        }
        if cfg.max_daily_loss > Decimal::ZERO && st.daily_pnl <= -cfg.max_daily_loss {
            return Some(StopReason::DailyLoss { pnl: st.daily_pnl });
        }
        if cfg.trading_capital > Decimal::ZERO && cfg.max_drawdown_pct > Decimal::ZERO {
            let pct = (st.peak_pnl - st.total_pnl) / cfg.trading_capital * Decimal::ONE_HUNDRED;
            if pct >= cfg.max_drawdown_pct {
                return Some(StopReason::Drawdown {
                    pct,
                    max: cfg.max_drawdown_pct,
                });
            }
        }
        if cfg.emergency_stop_pnl < Decimal::ZERO && st.total_pnl <= cfg.emergency_stop_pnl {
            return Some(StopReason::EmergencyStop {
                pnl: st.total_pnl,
                floor: cfg.emergency_stop_pnl,
            });
        }
        if cfg.max_trades_per_day > 0 && st.daily_trades >= cfg.max_trades_per_day {
            return Some(StopReason::DailyTrades {
                trades: st.daily_trades,
                max: cfg.max_trades_per_day,
            });
        }
        if cfg.max_trades_per_session > 0 && st.session_trades >= cfg.max_trades_per_session {
            return Some(StopReason::SessionTrades {
                trades: st.session_trades,
                max: cfg.max_trades_per_session,
            });
        }

        let latest = latest?;
        let notional = latest.traded_notional();
        if latest.realized_pnl < Decimal::ZERO && notional > Decimal::ZERO {
            let pct = -latest.realized_pnl / notional * Decimal::ONE_HUNDRED;
            if cfg.max_loss_per_trade_pct > Decimal::ZERO && pct > cfg.max_loss_per_trade_pct {
                return Some(StopReason::TradeLoss {
                    pct,
                    max: cfg.max_loss_per_trade_pct,
                });
            }
        }
        if st.session_pnl < Decimal::ZERO
            && cfg.trading_capital > Decimal::ZERO
            && cfg.max_session_loss_pct > Decimal::ZERO
        {
            let pct = -st.session_pnl / cfg.trading_capital * Decimal::ONE_HUNDRED;
            if pct >= cfg.max_session_loss_pct {
                return Some(StopReason::SessionLoss {
                    pct,
                    max: cfg.max_session_loss_pct,
                });
            }
        }
        None
    }

    /// Trip the breaker.
    pub fn halt(&mut self, reason: impl Into<String>) -> RiskAlert {
        let reason = reason.into();
        metrics::inc_risk_trips();
        error!(reason = %reason, "Circuit breaker tripped, trading halted");
        self.state.halted = Some(reason.clone());
        RiskAlert::new("circuit_breaker", Severity::Critical, reason)
    }

    /// Clear the breaker without touching counters.
    pub fn resume(&mut self) {
        if let Some(reason) = self.state.halted.take() {
            info!(previous = %reason, "Trading resumed");
        }
    }

    /// Start a new trading day.
    pub fn reset_daily(&mut self, now_ms: i64) {
        let st = &mut self.state;
        st.daily_trades = 0;
        st.daily_pnl = Decimal::ZERO;
        st.daily_notional = Decimal::ZERO;
        st.last_daily_reset_ms = now_ms;
        st.halted = None;
        self.state.risk_score = self.score();
        info!("Daily risk counters reset");
    }

    /// Start a new session.
    pub fn reset_session(&mut self) {
        let st = &mut self.state;
        st.session_trades = 0;
        st.session_pnl = Decimal::ZERO;
        st.consecutive_losses = 0;
        st.halted = None;
        self.state.risk_score = self.score();
        info!("Session risk counters reset");
    }

    fn roll_day(&mut self, now_ms: i64) {
        if now_ms - self.state.last_daily_reset_ms >= DAY_MS {
            warn!(
                last_reset_ms = self.state.last_daily_reset_ms,
                "24h elapsed, rolling daily risk counters"
            );
            self.reset_daily(now_ms);
        }
    }
}

fn ratio(value: Decimal, limit: Decimal) -> f64 {
    if limit <= Decimal::ZERO {
        return 0.0;
    }
    (value / limit).min(Decimal::ONE).to_f64().unwrap_or(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arbitrage::opportunity::fixtures;
    use crate::error::{ErrorKind, ExecutionFailure};
    use rust_decimal_macros::dec;

    fn loose() -> RiskConfig {
        RiskConfig {
            max_consecutive_losses: 3,
            max_daily_loss: dec!(10000),
            max_drawdown_pct: dec!(100),
            emergency_stop_pnl: dec!(0),
            max_trades_per_day: 0,
            max_loss_per_trade_pct: dec!(100),
            max_session_loss_pct: dec!(100),
            max_risk_score: 1.0,
            ..Default::default()
        }
    }

    fn result(pnl: Decimal) -> ExecutionResult {
        let opp = fixtures::opportunity(0);
        let mut r = ExecutionResult::rejected(&opp, ExecutionFailure::new(ErrorKind::Venue, "x"), 0, 1);
        r.realized_pnl = pnl;
        r.buy.filled_qty = dec!(2);
        r.buy.avg_price = dec!(2000);
        r
    }

    #[test]
    fn check_accepts_within_limits() {
        let mut gov = RiskGovernor::new(RiskConfig::default(), 0);
        assert!(gov.check(&fixtures::opportunity(0), 1).is_ok());
    }

    #[test]
    fn check_rejects_expired_and_oversized() {
        let mut gov = RiskGovernor::new(RiskConfig::default(), 0);
        let opp = fixtures::opportunity(0);
        assert!(matches!(
            gov.check(&opp, opp.expires_at_ms),
            Err(RiskRejection::Expired(_))
        ));

        let mut big = fixtures::opportunity(0);
        big.notional = dec!(20000);
        assert_eq!(
            gov.check(&big, 1).unwrap_err().reason(),
            "trade_notional"
        );
    }

    #[test]
    fn check_enforces_remaining_daily_notional() {
        let mut gov = RiskGovernor::new(
            RiskConfig {
                max_daily_notional: dec!(5000),
                ..loose()
            },
            0,
        );
        gov.update(&result(dec!(1)), 1);
        // 4000 traded, 1000 left, opportunity needs 4000.
        assert_eq!(
            gov.check(&fixtures::opportunity(0), 2),
            Err(RiskRejection::DailyNotional {
                notional: dec!(4000),
                remaining: dec!(1000),
            })
        );
    }

    #[test]
    fn in_flight_reservations_count_against_daily_notional() {
        let mut gov = RiskGovernor::new(
            RiskConfig {
                max_daily_notional: dec!(6000),
                ..loose()
            },
            0,
        );
        let opp = fixtures::opportunity(0);
        assert!(gov.check(&opp, 1).is_ok());
        gov.reserve(opp.notional);

        assert_eq!(
            gov.check(&opp, 2),
            Err(RiskRejection::DailyNotional {
                notional: dec!(4000),
                remaining: dec!(2000),
            })
        );

        // Released once the result is booked; the traded 4000 now counts instead.
        gov.update(&result(dec!(1)), 3);
        assert_eq!(gov.state().reserved_notional, dec!(0));
        assert_eq!(gov.state().daily_notional, dec!(4000));
    }

    #[test]
    fn streak_resets_on_win_and_ignores_flat_trades() {
        let mut gov = RiskGovernor::new(loose(), 0);
        gov.update(&result(dec!(-1)), 1);
        gov.update(&result(dec!(0)), 2);
        gov.update(&result(dec!(-2)), 3);
        assert_eq!(gov.state().consecutive_losses, 2);
        assert_eq!(gov.state().max_drawdown, dec!(2));
        assert_eq!(gov.state().total_trades, 3);

        gov.update(&result(dec!(5)), 4);
        assert_eq!(gov.state().consecutive_losses, 0);
        assert_eq!(gov.state().total_pnl, dec!(2));
        assert_eq!(gov.state().peak_pnl, dec!(2));
    }

    #[test]
    fn circuit_breaker_holds_until_a_win() {
        let mut gov = RiskGovernor::new(loose(), 0);
        for t in 0..3 {
            gov.update(&result(dec!(-1)), t);
        }
        assert_eq!(gov.should_stop(None), Some(StopReason::LossStreak { streak: 3 }));
        assert_eq!(gov.should_stop(None), Some(StopReason::LossStreak { streak: 3 }));
        assert!(matches!(
            gov.check(&fixtures::opportunity(0), 4),
            Err(RiskRejection::LossStreak { .. })
        ));

        gov.update(&result(dec!(10)), 5);
        assert_eq!(gov.should_stop(None), None);
    }

    #[test]
    fn drawdown_from_peak_and_emergency_floor() {
        let mut gov = RiskGovernor::new(
            RiskConfig {
                max_drawdown_pct: dec!(1),
                trading_capital: dec!(1000),
                max_consecutive_losses: 0,
                ..loose()
            },
            0,
        );
        gov.update(&result(dec!(20)), 1);
        gov.update(&result(dec!(-15)), 2);
        assert_eq!(
            gov.should_stop(None),
            Some(StopReason::Drawdown {
                pct: dec!(1.5),
                max: dec!(1)
            })
        );

        let mut floor = RiskGovernor::new(
            RiskConfig {
                emergency_stop_pnl: dec!(-50),
                max_consecutive_losses: 0,
                ..loose()
            },
            0,
        );
        floor.update(&result(dec!(-60)), 1);
        assert!(matches!(
            floor.should_stop(None),
            Some(StopReason::EmergencyStop { .. })
        ));
    }

    #[test]
    fn latest_result_checks_trade_and_session_loss() {
        let mut gov = RiskGovernor::new(
            RiskConfig {
                max_loss_per_trade_pct: dec!(0.5),
                ..loose()
            },
            0,
        );
        let loss = result(dec!(-40));
        gov.update(&loss, 1);
        assert_eq!(gov.should_stop(None), None);
        // 40 / 4000 = 1% of notional.
        assert_eq!(
            gov.should_stop(Some(&loss)),
            Some(StopReason::TradeLoss {
                pct: dec!(1),
                max: dec!(0.5)
            })
        );

        let mut session = RiskGovernor::new(
            RiskConfig {
                max_session_loss_pct: dec!(0.3),
                ..loose()
            },
            0,
        );
        session.update(&loss, 1);
        assert!(matches!(
            session.should_stop(Some(&loss)),
            Some(StopReason::SessionLoss { .. })
        ));
    }

    #[test]
    fn trade_count_ceilings() {
        let mut gov = RiskGovernor::new(
            RiskConfig {
                max_trades_per_session: 2,
                ..loose()
            },
            0,
        );
        gov.update(&result(dec!(1)), 1);
        assert_eq!(gov.should_stop(None), None);
        gov.update(&result(dec!(1)), 2);
        assert_eq!(
            gov.should_stop(None),
            Some(StopReason::SessionTrades { trades: 2, max: 2 })
        );
        gov.reset_session();
        assert_eq!(gov.should_stop(None), None);
    }

    #[test]
    fn halt_blocks_until_resume() {
        let mut gov = RiskGovernor::new(RiskConfig::default(), 0);
        let alert = gov.halt("manual");
        assert_eq!(alert.severity, Severity::Critical);
        assert!(gov.is_halted());
        assert_eq!(
            gov.check(&fixtures::opportunity(0), 1).unwrap_err().reason(),
            "halted"
        );
        gov.resume();
        assert!(gov.check(&fixtures::opportunity(0), 1).is_ok());
    }

    #[test]
    fn daily_counters_roll_after_24h() {
        let mut gov = RiskGovernor::new(loose(), 0);
        gov.update(&result(dec!(-5)), 1);
        gov.halt("test");
        assert_eq!(gov.state().daily_trades, 1);

        gov.check(&fixtures::opportunity(DAY_MS), DAY_MS + 1).ok();
        assert_eq!(gov.state().daily_trades, 0);
        assert_eq!(gov.state().daily_pnl, dec!(0));
        assert_eq!(gov.state().total_trades, 1);
        assert!(!gov.is_halted());
    }

    #[test]
    fn risk_score_weights_and_ceiling() {
        let mut gov = RiskGovernor::new(
            RiskConfig {
                max_consecutive_losses: 2,
                max_daily_loss: dec!(100),
                max_drawdown_pct: dec!(1),
                trading_capital: dec!(10000),
                max_risk_score: 0.8,
                ..loose()
            },
            0,
        );
        gov.update(&result(dec!(-100)), 1);
        // streak 0.5*0.3 + daily 1*0.3 + drawdown 1*0.2 + losing 1*0.2
        assert!((gov.state().risk_score - 0.85).abs() < 1e-9);
        assert!(matches!(
            gov.check(&fixtures::opportunity(0), 2),
            Err(RiskRejection::DailyLoss { .. })
        ));
    }
}
