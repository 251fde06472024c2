//! Order legs and their execution against venues.
//!
//! This module handles:
//! - Execution legs handed to adapters
//! - Leg placement under a latency budget with reactive cancels
//! - Execution results per order, side and opportunity

pub mod execution;
pub mod order;
pub mod result;

pub use execution::{aggregate_side, cancel_order, place_leg};
pub use order::{ExecutionLeg, OrderType, Side};
pub use result::{ExecutionResult, ExecutionStatus, LegOutcome, SideFill, UnwindOutcome};
