//! Application configuration loaded from environment variables.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::arbitrage::{
    DetectorConfig, ExecutionConfig, FeeSchedule, FeeTable, FlatFundingModel, FundingModel, NoFunding,
};
use crate::engine::EngineConfig;
use crate::error::ValidationError;
use crate::orderbook::{DepthConfig, MAX_CHILD_ORDERS};
use crate::risk::RiskConfig;
use crate::session::SessionConfig;
use crate::venue::{LegKind, VenueId, VenueRules};

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // === Venues ===
    /// First venue of the pair.
    #[serde(default = "default_left_venue")]
    pub left_venue: String,

    /// Second venue of the pair.
    #[serde(default = "default_right_venue")]
    pub right_venue: String,

    /// Symbols traded on both venues (comma-separated).
    #[serde(default = "default_symbols")]
    pub symbols: Vec<String>,

    /// Taker fee of the left venue.
    #[serde(default = "default_taker_bps")]
    pub left_taker_bps: Decimal,

    /// Maker fee of the left venue.
    #[serde(default = "default_maker_bps")]
    pub left_maker_bps: Decimal,

    /// Instrument kind on the left venue: spot or perpetual.
    #[serde(default)]
    pub left_leg_kind: LegKind,

    /// Taker fee of the right venue.
    #[serde(default = "default_taker_bps")]
    pub right_taker_bps: Decimal,

    /// Maker fee of the right venue.
    #[serde(default = "default_maker_bps")]
    pub right_maker_bps: Decimal,

    /// Instrument kind on the right venue.
    #[serde(default)]
    pub right_leg_kind: LegKind,

    /// Price increment on the left venue.
    #[serde(default = "default_tick_size")]
    pub left_tick_size: Decimal,

    /// Quantity increment on the left venue.
    #[serde(default = "default_lot_size")]
    pub left_lot_size: Decimal,

    /// Minimum order notional on the left venue.
    #[serde(default = "default_venue_min_notional")]
    pub left_min_notional: Decimal,

    /// Price increment on the right venue.
    #[serde(default = "default_tick_size")]
    pub right_tick_size: Decimal,

    /// Quantity increment on the right venue.
    #[serde(default = "default_lot_size")]
    pub right_lot_size: Decimal,

    /// Minimum order notional on the right venue.
    #[serde(default = "default_venue_min_notional")]
    pub right_min_notional: Decimal,

    /// Funding rate charged on a long perpetual, bps per 8h.
    #[serde(default)]
    pub funding_rate_bps_per_8h: Decimal,

    /// Expected holding time of a hedge.
    #[serde(default = "default_holding_minutes")]
    pub funding_holding_minutes: Decimal,

    // === Detection ===
    /// Minimum gross edge.
    #[serde(default = "default_min_edge_bps")]
    pub min_edge_bps: Decimal,

    /// Minimum edge after fees, slippage and funding.
    #[serde(default = "default_min_net_edge_bps")]
    pub min_net_edge_after_slippage: Decimal,

    /// Maximum own spread of either venue.
    #[serde(default = "default_max_spread_bps")]
    pub max_spread_bps: Decimal,

    /// Maximum age of the older quote.
    #[serde(default = "default_bbo_age_ms")]
    pub min_book_bbo_age_ms: i64,

    /// Maximum venue clock difference.
    #[serde(default = "default_clock_skew_ms")]
    pub max_venue_clock_skew_ms: i64,

    /// Floor on the slippage estimate.
    #[serde(default = "default_slippage_buffer_bps")]
    pub slippage_buffer_bps: Decimal,

    /// Lifetime of a detected opportunity.
    #[serde(default = "default_opportunity_ttl_ms")]
    pub opportunity_ttl_ms: i64,

    // === Sizing ===
    /// Target and maximum notional per opportunity.
    #[serde(default = "default_max_notional")]
    pub max_notional: Decimal,

    /// Smallest tradeable notional.
    #[serde(default = "default_min_notional")]
    pub min_notional: Decimal,

    /// Required liquidity as a multiple of the trade size.
    #[serde(default = "default_liquidity_multiplier")]
    pub liquidity_multiplier: Decimal,

    /// Haircut on the computed size.
    #[serde(default = "default_safety_factor")]
    pub safety_factor: Decimal,

    /// Maximum notional per child order.
    #[serde(default = "default_per_order_cap")]
    pub per_order_cap: Decimal,

    /// Levels counted per side (0 = unlimited).
    #[serde(default = "default_depth_levels")]
    pub depth_levels: usize,

    /// Only levels within this percent of mid count.
    #[serde(default = "default_max_depth_pct")]
    pub max_depth_pct: Decimal,

    // === Execution ===
    /// Price buffer on limit prices.
    #[serde(default = "default_guard_bps")]
    pub guard_bps: Decimal,

    /// Per-leg placement budget.
    #[serde(default = "default_max_leg_latency_ms")]
    pub max_leg_latency_ms: u64,

    /// Minimum fill ratio per side for a completed hedge.
    #[serde(default = "default_partial_fill_threshold")]
    pub partial_fill_threshold: Decimal,

    /// Unwind unmatched exposure after a partial fill.
    #[serde(default = "default_true")]
    pub cancel_on_partial: bool,

    /// Never keep a one-sided position.
    #[serde(default)]
    pub atomic_hedge: bool,

    /// Levels fetched per side before execution.
    #[serde(default = "default_book_depth")]
    pub book_depth: usize,

    /// Estimated cost of crossing out of unmatched exposure.
    #[serde(default = "default_unwind_cost_bps")]
    pub unwind_cost_bps: Decimal,

    // === Risk ===
    /// Losing trades in a row that stop trading.
    #[serde(default = "default_max_consecutive_losses")]
    pub max_consecutive_losses: u32,

    /// Daily loss magnitude that stops trading.
    #[serde(default = "default_max_daily_loss")]
    pub max_daily_loss: Decimal,

    /// Notional budget per day.
    #[serde(default = "default_max_daily_notional")]
    pub max_daily_notional: Decimal,

    /// Notional cap per trade.
    #[serde(default = "default_max_notional")]
    pub max_notional_per_trade: Decimal,

    /// Drawdown from peak, percent of capital.
    #[serde(default = "default_max_drawdown_pct")]
    pub max_drawdown_pct: Decimal,

    /// Total PnL floor (negative, 0 disables).
    #[serde(default = "default_emergency_stop_pnl")]
    pub emergency_stop_pnl: Decimal,

    /// Trades per day (0 = unlimited).
    #[serde(default = "default_max_trades_per_day")]
    pub max_trades_per_day: u64,

    /// Trades per session (0 = unlimited).
    #[serde(default)]
    pub max_trades_per_session: u64,

    /// Loss on one trade, percent of its notional.
    #[serde(default = "default_max_loss_per_trade_pct")]
    pub max_loss_per_trade_pct: Decimal,

    /// Session loss, percent of capital.
    #[serde(default = "default_max_session_loss_pct")]
    pub max_session_loss_pct: Decimal,

    /// Capital the percentage limits refer to.
    #[serde(default = "default_trading_capital")]
    pub trading_capital: Decimal,

    /// Ceiling on the derived risk score.
    #[serde(default = "default_max_risk_score")]
    pub max_risk_score: f64,

    // === Session ===
    /// Run time in hours (0 = unbounded).
    #[serde(default)]
    pub session_duration_hours: f64,

    /// Trades per run (0 = unbounded).
    #[serde(default)]
    pub session_max_trades: u64,

    /// Detection tick.
    #[serde(default = "default_detection_interval_ms")]
    pub detection_interval_ms: u64,

    /// Wait for in-flight executions on shutdown.
    #[serde(default = "default_drain_timeout_ms")]
    pub drain_timeout_ms: u64,

    /// JSONL journal file; journaling is off when unset.
    #[serde(default)]
    pub journal_path: Option<String>,

    // === Server Configuration ===
    /// HTTP server port for health/metrics endpoints.
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_left_venue() -> String {
    "left".to_string()
}

fn default_right_venue() -> String {
    "right".to_string()
}

fn default_symbols() -> Vec<String> {
    vec!["ETH/USDT".to_string()]
}

fn default_taker_bps() -> Decimal {
    Decimal::TEN
}

fn default_maker_bps() -> Decimal {
    Decimal::TWO
}

fn default_tick_size() -> Decimal {
    Decimal::new(1, 2) // 0.01
}

fn default_lot_size() -> Decimal {
    Decimal::new(1, 4) // 0.0001
}

fn default_venue_min_notional() -> Decimal {
    Decimal::TEN
}

fn default_holding_minutes() -> Decimal {
    Decimal::new(60, 0)
}

fn default_min_edge_bps() -> Decimal {
    Decimal::TEN
}

fn default_min_net_edge_bps() -> Decimal {
    Decimal::new(5, 0)
}

fn default_max_spread_bps() -> Decimal {
    Decimal::new(20, 0)
}

fn default_bbo_age_ms() -> i64 {
    1_000
}

fn default_clock_skew_ms() -> i64 {
    500
}

fn default_slippage_buffer_bps() -> Decimal {
    Decimal::new(5, 0)
}

fn default_opportunity_ttl_ms() -> i64 {
    5_000
}

fn default_max_notional() -> Decimal {
    Decimal::new(10_000, 0)
}

fn default_min_notional() -> Decimal {
    Decimal::TEN
}

fn default_liquidity_multiplier() -> Decimal {
    Decimal::TWO
}

fn default_safety_factor() -> Decimal {
    Decimal::new(9, 1) // 0.9
}

fn default_per_order_cap() -> Decimal {
    Decimal::new(5_000, 0)
}

fn default_depth_levels() -> usize {
    10
}

fn default_max_depth_pct() -> Decimal {
    Decimal::new(5, 1) // 0.5%
}

fn default_guard_bps() -> Decimal {
    Decimal::new(5, 0)
}

fn default_max_leg_latency_ms() -> u64 {
    500
}

fn default_partial_fill_threshold() -> Decimal {
    Decimal::new(95, 2) // 0.95
}

fn default_true() -> bool {
    true
}

fn default_book_depth() -> usize {
    20
}

fn default_unwind_cost_bps() -> Decimal {
    Decimal::new(5, 0)
}

fn default_max_consecutive_losses() -> u32 {
    3
}

fn default_max_daily_loss() -> Decimal {
    Decimal::new(500, 0)
}

fn default_max_daily_notional() -> Decimal {
    Decimal::new(100_000, 0)
}

fn default_max_drawdown_pct() -> Decimal {
    Decimal::new(5, 0)
}

fn default_emergency_stop_pnl() -> Decimal {
    Decimal::new(-1_000, 0)
}

fn default_max_trades_per_day() -> u64 {
    100
}

fn default_max_loss_per_trade_pct() -> Decimal {
    Decimal::ONE
}

fn default_max_session_loss_pct() -> Decimal {
    Decimal::TWO
}

fn default_trading_capital() -> Decimal {
    Decimal::new(10_000, 0)
}

fn default_max_risk_score() -> f64 {
    0.8
}

fn default_detection_interval_ms() -> u64 {
    200
}

fn default_drain_timeout_ms() -> u64 {
    5_000
}

fn default_port() -> u16 {
    8080
}

impl Config {
    /// Load configuration from environment, reading .env file first.
    pub fn load() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    /// Check if the configuration is valid.
    pub fn validate(&self) -> Result<(), ValidationError> {
        fn invalid(field: &'static str, reason: impl Into<String>) -> ValidationError {
            ValidationError::Config {
                field,
                reason: reason.into(),
            }
        }

        if self.left_venue.is_empty() || self.right_venue.is_empty() {
            return Err(invalid("left_venue", "both venues must be named"));
        }
        if self.left_venue == self.right_venue {
            return Err(invalid("right_venue", "must differ from left_venue"));
        }
        if self.symbols.iter().all(|s| s.trim().is_empty()) {
            return Err(invalid("symbols", "at least one symbol is required"));
        }

        let non_negative = [
            ("min_edge_bps", self.min_edge_bps),
            ("max_spread_bps", self.max_spread_bps),
            ("slippage_buffer_bps", self.slippage_buffer_bps),
            ("guard_bps", self.guard_bps),
            ("unwind_cost_bps", self.unwind_cost_bps),
            ("left_taker_bps", self.left_taker_bps),
            ("right_taker_bps", self.right_taker_bps),
            ("max_daily_loss", self.max_daily_loss),
            ("funding_holding_minutes", self.funding_holding_minutes),
        ];
        if let Some((field, _)) = non_negative.iter().find(|(_, v)| v.is_sign_negative()) {
            return Err(invalid(field, "must not be negative"));
        }

        let positive = [
            ("max_notional", self.max_notional),
            ("per_order_cap", self.per_order_cap),
            ("trading_capital", self.trading_capital),
            ("max_notional_per_trade", self.max_notional_per_trade),
            ("left_tick_size", self.left_tick_size),
            ("left_lot_size", self.left_lot_size),
            ("right_tick_size", self.right_tick_size),
            ("right_lot_size", self.right_lot_size),
        ];
        if let Some((field, _)) = positive.iter().find(|(_, v)| *v <= Decimal::ZERO) {
            return Err(invalid(field, "must be positive"));
        }

        if self.min_notional > self.max_notional {
            return Err(invalid("min_notional", "must not exceed max_notional"));
        }
        if self.max_notional / self.per_order_cap > Decimal::from(MAX_CHILD_ORDERS) {
            return Err(invalid(
                "per_order_cap",
                format!("splits max_notional into more than {MAX_CHILD_ORDERS} orders"),
            ));
        }
        if self.partial_fill_threshold <= Decimal::ZERO || self.partial_fill_threshold > Decimal::ONE {
            return Err(invalid("partial_fill_threshold", "must be in (0, 1]"));
        }
        if self.safety_factor <= Decimal::ZERO || self.safety_factor > Decimal::ONE {
            return Err(invalid("safety_factor", "must be in (0, 1]"));
        }
        if self.liquidity_multiplier < Decimal::ONE {
            return Err(invalid("liquidity_multiplier", "must be at least 1"));
        }
        if self.emergency_stop_pnl > Decimal::ZERO {
            return Err(invalid("emergency_stop_pnl", "must be zero or negative"));
        }
        if !(0.0..=1.0).contains(&self.max_risk_score) {
            return Err(invalid("max_risk_score", "must be in [0, 1]"));
        }
        if self.max_leg_latency_ms == 0 {
            return Err(invalid("max_leg_latency_ms", "must be positive"));
        }
        if self.detection_interval_ms == 0 {
            return Err(invalid("detection_interval_ms", "must be positive"));
        }
        if self.min_book_bbo_age_ms <= 0 || self.opportunity_ttl_ms <= 0 {
            return Err(invalid("min_book_bbo_age_ms", "ages must be positive"));
        }
        if self.session_duration_hours < 0.0 {
            return Err(invalid("session_duration_hours", "must not be negative"));
        }

        Ok(())
    }

    /// Left venue id.
    pub fn left_id(&self) -> VenueId {
        VenueId::from(self.left_venue.as_str())
    }

    /// Right venue id.
    pub fn right_id(&self) -> VenueId {
        VenueId::from(self.right_venue.as_str())
    }

    /// Symbols with blanks removed.
    pub fn symbol_list(&self) -> Vec<String> {
        self.symbols
            .iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Detection thresholds and sizing for [`OpportunityDetector`](crate::arbitrage::OpportunityDetector).
    pub fn detector_config(&self) -> DetectorConfig {
        DetectorConfig {
            min_edge_bps: self.min_edge_bps,
            min_net_edge_after_slippage: self.min_net_edge_after_slippage,
            max_spread_bps: self.max_spread_bps,
            min_book_bbo_age_ms: self.min_book_bbo_age_ms,
            max_venue_clock_skew_ms: self.max_venue_clock_skew_ms,
            max_notional: self.max_notional,
            min_liquidity_multiplier: self.liquidity_multiplier,
            slippage_buffer_bps: self.slippage_buffer_bps,
            opportunity_ttl_ms: self.opportunity_ttl_ms,
        }
    }

    /// Depth aggregation, sizing and split limits.
    pub fn depth_config(&self) -> DepthConfig {
        DepthConfig {
            max_depth_pct: self.max_depth_pct,
            level_cap: self.depth_levels,
            liquidity_multiplier: self.liquidity_multiplier,
            safety_factor: self.safety_factor,
            per_order_cap: self.per_order_cap,
            min_notional: self.min_notional,
            max_notional: self.max_notional,
        }
    }

    /// Guard, latency budget and hedging behaviour of the coordinator.
    pub fn execution_config(&self) -> ExecutionConfig {
        ExecutionConfig {
            guard_bps: self.guard_bps,
            max_leg_latency_ms: self.max_leg_latency_ms,
            partial_fill_threshold: self.partial_fill_threshold,
            cancel_on_partial: self.cancel_on_partial,
            atomic_hedge: self.atomic_hedge,
            book_depth: self.book_depth,
            unwind_cost_bps: self.unwind_cost_bps,
        }
    }

    /// Risk envelope.
    pub fn risk_config(&self) -> RiskConfig {
        RiskConfig {
            max_consecutive_losses: self.max_consecutive_losses,
            max_daily_loss: self.max_daily_loss,
            max_daily_notional: self.max_daily_notional,
            max_notional_per_trade: self.max_notional_per_trade,
            max_drawdown_pct: self.max_drawdown_pct,
            emergency_stop_pnl: self.emergency_stop_pnl,
            max_trades_per_day: self.max_trades_per_day,
            max_trades_per_session: self.max_trades_per_session,
            max_loss_per_trade_pct: self.max_loss_per_trade_pct,
            max_session_loss_pct: self.max_session_loss_pct,
            trading_capital: self.trading_capital,
            max_risk_score: self.max_risk_score,
        }
    }

    /// Session duration and trade bounds.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            duration_hours: self.session_duration_hours,
            max_trades: self.session_max_trades,
        }
    }

    /// Engine loop settings for the configured venues and symbols.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            left_venue: self.left_id(),
            right_venue: self.right_id(),
            symbols: self.symbol_list(),
            detection_interval_ms: self.detection_interval_ms,
            drain_timeout_ms: self.drain_timeout_ms,
            ..Default::default()
        }
    }

    /// Fee schedules of both venues.
    pub fn fee_table(&self) -> FeeTable {
        FeeTable::default()
            .with(
                self.left_id(),
                FeeSchedule {
                    taker_bps: self.left_taker_bps,
                    maker_bps: self.left_maker_bps,
                    leg_kind: self.left_leg_kind,
                },
            )
            .with(
                self.right_id(),
                FeeSchedule {
                    taker_bps: self.right_taker_bps,
                    maker_bps: self.right_maker_bps,
                    leg_kind: self.right_leg_kind,
                },
            )
    }

    /// Flat funding when a rate is set, none otherwise.
    pub fn funding_model(&self) -> Arc<dyn FundingModel> {
        if self.funding_rate_bps_per_8h.is_zero() {
            Arc::new(NoFunding)
        } else {
            Arc::new(FlatFundingModel {
                rate_bps_per_8h: self.funding_rate_bps_per_8h,
                holding_minutes: self.funding_holding_minutes,
            })
        }
    }

    /// Precision rules of the left venue.
    pub fn left_rules(&self) -> VenueRules {
        VenueRules {
            tick_size: self.left_tick_size,
            lot_size: self.left_lot_size,
            min_notional: self.left_min_notional,
        }
    }

    /// Precision rules of the right venue.
    pub fn right_rules(&self) -> VenueRules {
        VenueRules {
            tick_size: self.right_tick_size,
            lot_size: self.right_lot_size,
            min_notional: self.right_min_notional,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn from_pairs(pairs: &[(&str, &str)]) -> Config {
        envy::from_iter(pairs.iter().map(|(k, v)| (k.to_string(), v.to_string()))).unwrap()
    }

    #[test]
    fn default_values_are_sensible() {
        let config = from_pairs(&[]);
        assert_eq!(config.symbols, vec!["ETH/USDT".to_string()]);
        assert_eq!(config.min_edge_bps, dec!(10));
        assert_eq!(config.partial_fill_threshold, dec!(0.95));
        assert!(config.cancel_on_partial);
        assert!(!config.atomic_hedge);
        assert!(config.journal_path.is_none());
        tokio_test::assert_ok!(config.validate());
    }

    #[test]
    fn environment_overrides_defaults() {
        let config = from_pairs(&[
            ("SYMBOLS", "BTC/USDT,ETH/USDT"),
            ("MIN_EDGE_BPS", "12.5"),
            ("RIGHT_LEG_KIND", "perpetual"),
            ("ATOMIC_HEDGE", "true"),
            ("SESSION_MAX_TRADES", "7"),
        ]);
        assert_eq!(config.symbol_list(), vec!["BTC/USDT", "ETH/USDT"]);
        assert_eq!(config.detector_config().min_edge_bps, dec!(12.5));
        assert_eq!(config.right_leg_kind, LegKind::Perpetual);
        assert!(config.execution_config().unwinds());
        assert_eq!(config.session_config().max_trades, 7);
    }

    #[test]
    fn derived_configs_share_sizing() {
        let config = from_pairs(&[("MAX_NOTIONAL", "2500"), ("LIQUIDITY_MULTIPLIER", "3")]);
        assert_eq!(config.detector_config().max_notional, dec!(2500));
        assert_eq!(config.depth_config().max_notional, dec!(2500));
        assert_eq!(config.detector_config().min_liquidity_multiplier, dec!(3));
        assert_eq!(config.depth_config().liquidity_multiplier, dec!(3));
    }

    #[test]
    fn fee_table_is_per_venue() {
        let config = from_pairs(&[("LEFT_TAKER_BPS", "4"), ("RIGHT_TAKER_BPS", "6")]);
        let fees = config.fee_table();
        assert_eq!(fees.taker_bps(&config.left_id()), dec!(4));
        assert_eq!(fees.taker_bps(&config.right_id()), dec!(6));
        assert_eq!(fees.round_trip_taker_bps(&config.left_id(), &config.right_id()), dec!(10));
    }

    #[test]
    fn funding_model_follows_rate() {
        let config = from_pairs(&[("FUNDING_RATE_BPS_PER_8H", "8"), ("FUNDING_HOLDING_MINUTES", "240")]);
        let model = config.funding_model();
        assert_eq!(model.funding_cost_bps(LegKind::Perpetual, LegKind::Spot), dec!(4));
        let none = from_pairs(&[]).funding_model();
        assert_eq!(none.funding_cost_bps(LegKind::Perpetual, LegKind::Spot), dec!(0));
    }

    #[test]
    fn validate_rejects_same_venue() {
        let config = from_pairs(&[("LEFT_VENUE", "x"), ("RIGHT_VENUE", "x")]);
        assert!(matches!(
            config.validate(),
            Err(ValidationError::Config { field: "right_venue", .. })
        ));
    }

    #[test]
    fn validate_rejects_out_of_range_values() {
        for (key, value, field) in [
            ("PARTIAL_FILL_THRESHOLD", "1.5", "partial_fill_threshold"),
            ("EMERGENCY_STOP_PNL", "100", "emergency_stop_pnl"),
            ("MIN_NOTIONAL", "20000", "min_notional"),
            ("GUARD_BPS", "-1", "guard_bps"),
            ("PER_ORDER_CAP", "0", "per_order_cap"),
            ("PER_ORDER_CAP", "0.0001", "per_order_cap"),
        ] {
            let config = from_pairs(&[(key, value)]);
            match config.validate() {
                Err(ValidationError::Config { field: f, .. }) => assert_eq!(f, field),
                other => panic!("{key}={value} gave {other:?}"),
            }
        }
    }
}
