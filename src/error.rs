//! Unified error types for the arbitrage engine.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use thiserror::Error;

use crate::venue::VenueId;

/// Unified error type for the arbitrage engine.
#[derive(Error, Debug)]
pub enum BotError {
    /// Configuration loading error.
    #[error("configuration error: {0}")]
    Config(#[from] envy::Error),

    /// Malformed opportunity, order or configuration.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Venue adapter failure.
    #[error("venue error: {0}")]
    Venue(#[from] VenueError),

    /// Trading loop error.
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    /// JSON serialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Rejections raised before anything reaches a venue.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// A configuration value is out of range.
    #[error("invalid config {field}: {reason}")]
    Config {
        /// Offending field name.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },

    /// Quote carried a non-positive bid or ask.
    #[error("malformed quote from {venue} for {symbol}: bid={bid} ask={ask}")]
    MalformedQuote {
        /// Source venue.
        venue: VenueId,
        /// Symbol.
        symbol: String,
        /// Bid price.
        bid: Decimal,
        /// Ask price.
        ask: Decimal,
    },

    /// Quote came from a venue that is not part of the configured pair.
    #[error("quote from unpaired venue {0}")]
    UnpairedVenue(VenueId),

    /// Venue has no registered adapter.
    #[error("no adapter registered for venue {0}")]
    UnknownVenue(VenueId),

    /// Computed order size is zero or negative.
    #[error("invalid order size: {0}")]
    InvalidSize(Decimal),

    /// Order price is zero or negative.
    #[error("invalid order price: {0}")]
    InvalidPrice(Decimal),

    /// Order notional below the venue minimum.
    #[error("notional {notional} below venue minimum {minimum}")]
    BelowMinNotional {
        /// Order notional.
        notional: Decimal,
        /// Venue minimum.
        minimum: Decimal,
    },

    /// Not enough resting size to fill the request.
    #[error("insufficient liquidity: need {required}, available {available}")]
    InsufficientLiquidity {
        /// Required size.
        required: Decimal,
        /// Available size.
        available: Decimal,
    },

    /// Opportunity expired before execution.
    #[error("opportunity {0} expired")]
    Expired(String),
}

/// Adapter-level network or API failures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VenueError {
    /// Connection could not be established or dropped.
    #[error("{venue} connection failed: {reason}")]
    Connection {
        /// Venue.
        venue: VenueId,
        /// Reason.
        reason: String,
    },

    /// Venue returned an API error.
    #[error("{venue} api error: {message}")]
    Api {
        /// Venue.
        venue: VenueId,
        /// Error message from the venue.
        message: String,
    },

    /// Venue rejected the order.
    #[error("{venue} rejected order: {reason}")]
    OrderRejected {
        /// Venue.
        venue: VenueId,
        /// Rejection reason.
        reason: String,
    },

    /// Cancel request failed.
    #[error("{venue} failed to cancel order {order_id}: {reason}")]
    CancelFailed {
        /// Venue.
        venue: VenueId,
        /// Order that could not be cancelled.
        order_id: String,
        /// Reason.
        reason: String,
    },

    /// Request did not return in time.
    #[error("{venue} request timed out after {elapsed_ms}ms")]
    Timeout {
        /// Venue.
        venue: VenueId,
        /// Elapsed milliseconds.
        elapsed_ms: u64,
    },
}

/// Errors that stop the trading loop.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// Risk envelope breached; requires an explicit resume.
    #[error("risk limit exceeded: {0}")]
    RiskLimitExceeded(String),

    /// An unwind attempt failed, leaving a real unhedged position.
    #[error("unwind failure on {venue} {symbol}: {reason}")]
    UnwindFailure {
        /// Venue holding the exposure.
        venue: VenueId,
        /// Symbol.
        symbol: String,
        /// Reason.
        reason: String,
    },

    /// No venue could be connected.
    #[error("failed to connect venues: {0}")]
    ConnectFailed(String),
}

/// Classification stored on every failed [`crate::trading::ExecutionResult`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    /// Rejected before execution.
    Validation,
    /// Adapter-level failure surfaced as a leg failure.
    Venue,
    /// One leg filled, the other did not.
    PartialFill,
    /// A leg exceeded its latency budget.
    LatencyExceeded,
    /// Risk envelope breached.
    RiskLimitExceeded,
    /// Cancellation or unwind failed.
    UnwindFailure,
}

impl ErrorKind {
    /// Only unwind failures are fatal: they leave a real open position.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ErrorKind::UnwindFailure)
    }
}

/// Structured failure attached to an execution result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionFailure {
    /// Failure class.
    pub kind: ErrorKind,
    /// Human readable detail.
    pub message: String,
}

impl ExecutionFailure {
    /// Create a new failure.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<&ValidationError> for ExecutionFailure {
    fn from(err: &ValidationError) -> Self {
        Self::new(ErrorKind::Validation, err.to_string())
    }
}

impl From<&VenueError> for ExecutionFailure {
    fn from(err: &VenueError) -> Self {
        Self::new(ErrorKind::Venue, err.to_string())
    }
}

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, BotError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_unwind_failure_is_fatal() {
        assert!(ErrorKind::UnwindFailure.is_fatal());
        assert!(!ErrorKind::PartialFill.is_fatal());
        assert!(!ErrorKind::LatencyExceeded.is_fatal());
        assert!(!ErrorKind::RiskLimitExceeded.is_fatal());
    }

    #[test]
    fn error_kind_round_trips_through_strings() {
        use std::str::FromStr;
        assert_eq!(ErrorKind::LatencyExceeded.to_string(), "latency_exceeded");
        assert_eq!(
            ErrorKind::from_str("unwind_failure").unwrap(),
            ErrorKind::UnwindFailure
        );
    }

    #[test]
    fn venue_error_converts_to_execution_failure() {
        let err = VenueError::Timeout {
            venue: VenueId::from("left"),
            elapsed_ms: 300,
        };
        let failure = ExecutionFailure::from(&err);
        assert_eq!(failure.kind, ErrorKind::Venue);
        assert!(failure.message.contains("timed out"));
    }
}
