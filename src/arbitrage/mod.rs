//! Opportunity detection and two-leg execution.
//!
//! This module handles:
//! - Fee schedules and funding-cost models
//! - Gross/net edge computation over consolidated quotes
//! - Concurrent execution with partial-fill recovery

pub mod detector;
pub mod executor;
pub mod fees;
pub mod opportunity;

pub use detector::{BookPair, DetectorConfig, OpportunityDetector, Rejection};
pub use executor::{ExecutionConfig, ExecutionCoordinator};
pub use fees::{FeeSchedule, FeeTable, FlatFundingModel, FundingModel, NoFunding};
pub use opportunity::{Direction, FeeBreakdown, Opportunity};
