//! Two-venue hedged arbitrage engine.
//!
//! Watches the same instrument on two venues and, when one venue's ask sits
//! below the other's bid by more than fees, slippage and funding, buys on the
//! cheap venue and sells on the rich one at the same time.
//!
//! # Pipeline
//!
//! ```text
//! venue quotes ─► QuoteConsolidator ─► OpportunityDetector ─► RiskGovernor
//!                                                                 │
//!         SessionController ◄── RiskGovernor::update ◄── ExecutionCoordinator
//! ```
//!
//! A one-sided fill is never left open silently: the over-filled side is
//! unwound with a reduce-only order, and a failed unwind halts the engine.
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from environment
//! - [`error`]: Error taxonomy
//! - [`venue`]: Venue adapter interface, registry and paper venue
//! - [`orderbook`]: Books, depth analysis and quote consolidation
//! - [`arbitrage`]: Fees, detection and two-leg execution
//! - [`trading`]: Order legs and execution results
//! - [`risk`]: Pre-trade checks and the circuit breaker
//! - [`session`]: Session bounds, trade records and the journal
//! - [`engine`]: The trading loop and its event bus
//! - [`api`]: HTTP API for health/status/metrics
//! - [`metrics`]: Prometheus counters and histograms
//! - [`utils`]: Utility functions

pub mod api;
pub mod arbitrage;
pub mod config;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod orderbook;
pub mod risk;
pub mod session;
pub mod trading;
pub mod utils;
pub mod venue;

pub use config::Config;
pub use error::{BotError, Result};
