//! Liquidity-aware sizing, order splitting and slippage estimation.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use tracing::{debug, instrument};

use super::types::{AggregatedLiquidity, BookSide, OrderBook, PriceLevel};

/// Child order sizes of one split; most trades need only a handful.
pub type ChildSizes = SmallVec<[Decimal; 4]>;

/// Upper bound on children of one split.
pub const MAX_CHILD_ORDERS: usize = 64;

/// Decimal places kept on split child sizes before the last child absorbs the remainder.
const CHILD_SIZE_DP: u32 = 8;

/// Parameters for depth aggregation and sizing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DepthConfig {
    /// Only levels within this percent of mid count as liquidity.
    pub max_depth_pct: Decimal,
    /// Maximum number of levels counted per side (0 = unlimited).
    pub level_cap: usize,
    /// Required liquidity as a multiple of the trade size.
    pub liquidity_multiplier: Decimal,
    /// Final haircut applied to the computed size.
    pub safety_factor: Decimal,
    /// Maximum notional of a single child order.
    pub per_order_cap: Decimal,
    /// Smallest tradeable notional.
    pub min_notional: Decimal,
    /// Target (and maximum) trade notional.
    pub max_notional: Decimal,
}

impl Default for DepthConfig {
    fn default() -> Self {
        Self {
            max_depth_pct: Decimal::new(5, 1),
            level_cap: 10,
            liquidity_multiplier: Decimal::TWO,
            safety_factor: Decimal::new(9, 1),
            per_order_cap: Decimal::new(5_000, 0),
            min_notional: Decimal::new(10, 0),
            max_notional: Decimal::new(10_000, 0),
        }
    }
}

/// Outcome of [`DepthAnalyzer::size_trade`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SizeDecision {
    /// Base quantity to trade; zero when rejected.
    pub size: Decimal,
    /// Notional at the reference price.
    pub notional: Decimal,
    /// Reference (buy-side VWAP) price used for conversion.
    pub price: Decimal,
    /// Size was scaled down because of thin books.
    pub liquidity_limited: bool,
}

impl SizeDecision {
    fn rejected(price: Decimal) -> Self {
        Self {
            size: Decimal::ZERO,
            notional: Decimal::ZERO,
            price,
            liquidity_limited: false,
        }
    }

    /// Whether a positive size was produced.
    pub fn is_tradeable(&self) -> bool {
        self.size > Decimal::ZERO
    }
}

/// Turns raw books into liquidity figures, trade sizes and child orders.
#[derive(Debug, Clone, Default)]
pub struct DepthAnalyzer {
    config: DepthConfig,
}

impl DepthAnalyzer {
    /// Create an analyzer.
    pub fn new(config: DepthConfig) -> Self {
        Self { config }
    }

    /// Active configuration.
    pub fn config(&self) -> &DepthConfig {
        &self.config
    }

    /// Aggregate best-first `levels` within `max_depth_pct` of `mid`, capped to `level_cap` levels.
    ///
    /// Zero liquidity yields a zero-size, zero-VWAP result.
    pub fn aggregate(
        levels: &[PriceLevel],
        mid_price: Decimal,
        side: BookSide,
        max_depth_pct: Decimal,
        level_cap: usize,
    ) -> AggregatedLiquidity {
        if mid_price <= Decimal::ZERO {
            return AggregatedLiquidity::empty(side, max_depth_pct);
        }

        let band = mid_price * max_depth_pct / Decimal::ONE_HUNDRED;
        let cap = if level_cap == 0 { usize::MAX } else { level_cap };

        let mut total_size = Decimal::ZERO;
        let mut total_notional = Decimal::ZERO;
        let mut levels_used = 0;

        let in_band = levels.iter().filter(|l| {
            l.size > Decimal::ZERO
                && match side {
                    BookSide::Ask => l.price <= mid_price + band,
                    BookSide::Bid => l.price >= mid_price - band,
                }
        });

        for level in in_band.take(cap) {
            total_size += level.size;
            total_notional += level.notional();
            levels_used += 1;
        }

        if total_size.is_zero() {
            return AggregatedLiquidity::empty(side, max_depth_pct);
        }

        AggregatedLiquidity {
            side,
            total_size,
            vwap: total_notional / total_size,
            levels_used,
            max_depth_pct,
        }
    }

    /// Aggregate one side of a book using the configured band and level cap.
    pub fn aggregate_book(&self, book: &OrderBook, side: BookSide) -> AggregatedLiquidity {
        match book.mid() {
            Some(mid) => Self::aggregate(
                book.levels(side),
                mid,
                side,
                self.config.max_depth_pct,
                self.config.level_cap,
            ),
            None => AggregatedLiquidity::empty(side, self.config.max_depth_pct),
        }
    }

    /// Size a two-leg trade against the liquidity both legs would consume.
    ///
    /// `buy` is the ask liquidity of the buy venue, `sell` the bid liquidity of the
    /// sell venue. Returns a zero size when the result would fall under `min_usd`.
    #[instrument(level = "debug", skip(buy, sell))]
    pub fn size_trade(
        buy: &AggregatedLiquidity,
        sell: &AggregatedLiquidity,
        target_usd: Decimal,
        min_usd: Decimal,
        liquidity_multiplier: Decimal,
        safety_factor: Decimal,
    ) -> SizeDecision {
        let price = buy.vwap;
        if price <= Decimal::ZERO || sell.is_empty() || target_usd <= Decimal::ZERO {
            return SizeDecision::rejected(price);
        }

        let multiplier = if liquidity_multiplier > Decimal::ZERO {
            liquidity_multiplier
        } else {
            Decimal::ONE
        };

        let usable = buy.total_size.min(sell.total_size);
        let mut size = target_usd / price;
        let required = size * multiplier;
        let liquidity_limited = usable < required;
        if liquidity_limited {
            size = usable / multiplier;
        }

        size *= safety_factor;
        if size * price > target_usd {
            size = target_usd / price;
        }

        let notional = size * price;
        if size <= Decimal::ZERO || notional < min_usd {
            debug!(
                notional = %notional,
                min_usd = %min_usd,
                usable = %usable,
                "Trade below minimum notional after sizing"
            );
            return SizeDecision::rejected(price);
        }

        SizeDecision {
            size,
            notional,
            price,
            liquidity_limited,
        }
    }

    /// [`Self::size_trade`] with the configured target, minimum, multiplier and haircut.
    pub fn size_with_config(
        &self,
        buy: &AggregatedLiquidity,
        sell: &AggregatedLiquidity,
        target_usd: Decimal,
    ) -> SizeDecision {
        Self::size_trade(
            buy,
            sell,
            target_usd.min(self.config.max_notional),
            self.config.min_notional,
            self.config.liquidity_multiplier,
            self.config.safety_factor,
        )
    }

    /// Split `total_usd` into equal children of at most `per_order_cap`.
    ///
    /// The child count shrinks until every child clears `min_notional` and never
    /// exceeds [`MAX_CHILD_ORDERS`]; past that bound children grow beyond the cap.
    /// The last child absorbs the rounding remainder so the children sum to
    /// `total_usd`. Returns an empty list when even a single order would be under
    /// the minimum.
    pub fn split(total_usd: Decimal, per_order_cap: Decimal, min_notional: Decimal) -> ChildSizes {
        if total_usd <= Decimal::ZERO || total_usd < min_notional {
            return ChildSizes::new();
        }

        let mut count = if per_order_cap > Decimal::ZERO {
            (total_usd / per_order_cap)
                .ceil()
                .to_usize()
                .unwrap_or(MAX_CHILD_ORDERS)
                .clamp(1, MAX_CHILD_ORDERS)
        } else {
            1
        };
        if min_notional > Decimal::ZERO {
            let by_minimum = (total_usd / min_notional).floor().to_usize().unwrap_or(count).max(1);
            count = count.min(by_minimum);
        }

        let child = (total_usd / Decimal::from(count))
            .round_dp_with_strategy(CHILD_SIZE_DP, RoundingStrategy::ToZero);
        let mut children: ChildSizes = std::iter::repeat(child).take(count - 1).collect();
        children.push(total_usd - child * Decimal::from(count - 1));
        children
    }

    /// Split with the configured cap and minimum notional.
    pub fn split_with_config(&self, total_usd: Decimal) -> ChildSizes {
        Self::split(total_usd, self.config.per_order_cap, self.config.min_notional)
    }

    /// Linear slippage estimate in bps for consuming `trade_size` of `liquidity`.
    ///
    /// Fully consumed (or empty) liquidity costs the whole depth band.
    pub fn estimate_slippage(liquidity: &AggregatedLiquidity, trade_size: Decimal) -> Decimal {
        if trade_size <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        let full_band = liquidity.max_depth_pct * Decimal::ONE_HUNDRED;
        if liquidity.total_size <= Decimal::ZERO {
            return full_band.max(Decimal::ZERO);
        }
        let consumed = (trade_size / liquidity.total_size).min(Decimal::ONE);
        (consumed * full_band).max(Decimal::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn liquidity(side: BookSide, total: Decimal, vwap: Decimal) -> AggregatedLiquidity {
        AggregatedLiquidity {
            side,
            total_size: total,
            vwap,
            levels_used: 1,
            max_depth_pct: dec!(0.5),
        }
    }

    #[test]
    fn aggregate_filters_by_band_and_cap() {
        let asks = vec![
            PriceLevel::new(dec!(100), dec!(1)),
            PriceLevel::new(dec!(100.2), dec!(3)),
            PriceLevel::new(dec!(100.4), dec!(5)),
            PriceLevel::new(dec!(101), dec!(50)),
        ];

        // Band is 0.5% of 100 => asks up to 100.5.
        let liq = DepthAnalyzer::aggregate(&asks, dec!(100), BookSide::Ask, dec!(0.5), 0);
        assert_eq!(liq.total_size, dec!(9));
        assert_eq!(liq.levels_used, 3);
        // (100 + 300.6 + 502) / 9
        assert_eq!(liq.vwap, dec!(902.6) / dec!(9));

        let capped = DepthAnalyzer::aggregate(&asks, dec!(100), BookSide::Ask, dec!(0.5), 2);
        assert_eq!(capped.total_size, dec!(4));
        assert_eq!(capped.vwap, dec!(100.15));
    }

    #[test]
    fn aggregate_bids_counts_levels_above_band_floor() {
        let bids = vec![
            PriceLevel::new(dec!(99.9), dec!(2)),
            PriceLevel::new(dec!(99.0), dec!(7)),
        ];
        let liq = DepthAnalyzer::aggregate(&bids, dec!(100), BookSide::Bid, dec!(0.5), 10);
        assert_eq!(liq.total_size, dec!(2));
        assert_eq!(liq.vwap, dec!(99.9));
    }

    #[test]
    fn aggregate_empty_book_is_zero_not_error() {
        let liq = DepthAnalyzer::aggregate(&[], dec!(100), BookSide::Ask, dec!(0.5), 10);
        assert!(liq.is_empty());
        assert_eq!(liq.vwap, Decimal::ZERO);
        assert_eq!(liq.levels_used, 0);
    }

    #[test]
    fn size_trade_uses_target_when_liquid() {
        let buy = liquidity(BookSide::Ask, dec!(100), dec!(100));
        let sell = liquidity(BookSide::Bid, dec!(100), dec!(101));

        let decision =
            DepthAnalyzer::size_trade(&buy, &sell, dec!(1000), dec!(10), dec!(2), dec!(1));
        assert_eq!(decision.size, dec!(10));
        assert_eq!(decision.notional, dec!(1000));
        assert!(!decision.liquidity_limited);
    }

    #[test]
    fn size_trade_scales_down_to_usable_liquidity() {
        let buy = liquidity(BookSide::Ask, dec!(8), dec!(100));
        let sell = liquidity(BookSide::Bid, dec!(6), dec!(101));

        // Required 10 * 2 = 20 > usable 6 => 6 / 2 = 3, then * 0.9.
        let decision =
            DepthAnalyzer::size_trade(&buy, &sell, dec!(1000), dec!(10), dec!(2), dec!(0.9));
        assert!(decision.liquidity_limited);
        assert_eq!(decision.size, dec!(2.7));
        assert_eq!(decision.notional, dec!(270));
    }

    #[test]
    fn size_trade_rejects_below_minimum_and_caps_at_target() {
        let buy = liquidity(BookSide::Ask, dec!(0.1), dec!(100));
        let sell = liquidity(BookSide::Bid, dec!(0.1), dec!(101));
        let rejected =
            DepthAnalyzer::size_trade(&buy, &sell, dec!(1000), dec!(10), dec!(2), dec!(1));
        assert!(!rejected.is_tradeable());

        let deep = liquidity(BookSide::Ask, dec!(1000), dec!(100));
        let capped =
            DepthAnalyzer::size_trade(&deep, &deep, dec!(500), dec!(10), dec!(1), dec!(1.5));
        assert_eq!(capped.notional, dec!(500));
    }

    #[test]
    fn split_sums_exactly_and_respects_cap() {
        let children = DepthAnalyzer::split(dec!(1000), dec!(300), dec!(10));
        assert_eq!(children.len(), 4);
        assert_eq!(children.iter().copied().sum::<Decimal>(), dec!(1000));
        assert!(children.iter().all(|c| *c <= dec!(300)));
    }

    #[test]
    fn split_absorbs_remainder_in_last_child() {
        let children = DepthAnalyzer::split(dec!(100), dec!(30), dec!(1));
        assert_eq!(children.len(), 4);
        assert_eq!(children[0], dec!(25));
        assert_eq!(children.iter().copied().sum::<Decimal>(), dec!(100));

        let uneven = DepthAnalyzer::split(dec!(10), dec!(3), dec!(1));
        assert_eq!(uneven.len(), 4);
        assert_eq!(uneven.iter().copied().sum::<Decimal>(), dec!(10));
        assert!(uneven.iter().all(|c| *c >= dec!(1)));
    }

    #[test]
    fn split_reduces_count_to_clear_minimum() {
        // ceil(100 / 10) = 10 children of 10 < min 30 => shrink to 3.
        let children = DepthAnalyzer::split(dec!(100), dec!(10), dec!(30));
        assert_eq!(children.len(), 3);
        assert!(children.iter().all(|c| *c >= dec!(30)));
        assert_eq!(children.iter().copied().sum::<Decimal>(), dec!(100));
    }

    #[test]
    fn split_child_count_is_bounded() {
        let children = DepthAnalyzer::split(dec!(10000), dec!(0.0001), dec!(0));
        assert_eq!(children.len(), MAX_CHILD_ORDERS);
        assert_eq!(children.iter().copied().sum::<Decimal>(), dec!(10000));
    }

    #[test]
    fn split_rejects_trade_under_minimum() {
        assert!(DepthAnalyzer::split(dec!(5), dec!(100), dec!(10)).is_empty());
        assert!(DepthAnalyzer::split(dec!(0), dec!(100), dec!(10)).is_empty());
    }

    #[test]
    fn split_sum_holds_across_inputs() {
        for (total, cap) in [
            (dec!(12345.6789), dec!(1000)),
            (dec!(1), dec!(0.3)),
            (dec!(999.99), dec!(333.33)),
            (dec!(50000), dec!(7)),
        ] {
            let children = DepthAnalyzer::split(total, cap, dec!(0.5));
            assert_eq!(children.iter().copied().sum::<Decimal>(), total, "total={total}");
            assert!(children.iter().all(|c| *c >= dec!(0.5)));
        }
    }

    #[test]
    fn slippage_is_linear_and_saturates() {
        let liq = liquidity(BookSide::Ask, dec!(100), dec!(100));
        assert_eq!(DepthAnalyzer::estimate_slippage(&liq, dec!(10)), dec!(5));
        assert_eq!(DepthAnalyzer::estimate_slippage(&liq, dec!(100)), dec!(50));
        assert_eq!(DepthAnalyzer::estimate_slippage(&liq, dec!(500)), dec!(50));
        assert_eq!(DepthAnalyzer::estimate_slippage(&liq, dec!(0)), dec!(0));

        let empty = AggregatedLiquidity::empty(BookSide::Ask, dec!(0.5));
        assert_eq!(DepthAnalyzer::estimate_slippage(&empty, dec!(1)), dec!(50));
    }
}
