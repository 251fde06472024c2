//! Events broadcast to journaling, alerting and status collaborators.

use serde::{Deserialize, Serialize};

use crate::arbitrage::Opportunity;
use crate::risk::RiskAlert;
use crate::session::SessionSummary;
use crate::trading::ExecutionResult;

/// Capacity of the event broadcast channel; slow subscribers lag, never block.
pub const EVENT_CAPACITY: usize = 1_024;

/// Engine event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// Opportunity passed detection.
    OpportunityDetected(Opportunity),
    /// Execution finished, successfully or not.
    ExecutionCompleted(ExecutionResult),
    /// Circuit breaker trip or unwind failure.
    RiskAlert(RiskAlert),
    /// Run ended.
    SessionSummary(SessionSummary),
}

impl EngineEvent {
    /// Event label.
    pub fn label(&self) -> &'static str {
        match self {
            EngineEvent::OpportunityDetected(_) => "opportunity_detected",
            EngineEvent::ExecutionCompleted(_) => "execution_completed",
            EngineEvent::RiskAlert(_) => "risk_alert",
            EngineEvent::SessionSummary(_) => "session_summary",
        }
    }
}
