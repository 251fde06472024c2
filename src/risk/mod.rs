//! Risk envelope around execution.
//!
//! This module handles:
//! - Pre-trade checks against notional, streak, loss and score limits
//! - Post-trade state updates and the circuit breaker
//! - Explicit halt, resume and daily/session resets

pub mod governor;

pub use governor::{
    RiskAlert, RiskConfig, RiskGovernor, RiskRejection, RiskState, Severity, StopReason, DAY_MS,
};
