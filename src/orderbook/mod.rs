//! Order book module for market data and liquidity.
//!
//! This module handles:
//! - Order book types and data structures
//! - Book walking and fill price calculations
//! - Depth aggregation, trade sizing and order splitting
//! - Consolidation of per-venue quotes into one view per symbol

pub mod aggregator;
pub mod consolidator;
pub mod depth;
pub mod types;

pub use aggregator::{calculate_fill_price, walk_book};
pub use consolidator::{ConsolidatedQuote, QuoteCallback, QuoteConsolidator};
pub use depth::{ChildSizes, DepthAnalyzer, DepthConfig, SizeDecision, MAX_CHILD_ORDERS};
pub use types::{AggregatedLiquidity, BookSide, FillInfo, OrderBook, PriceLevel};
