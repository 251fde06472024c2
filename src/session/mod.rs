//! Bounded trading sessions and their journal.
//!
//! This module handles:
//! - Duration and trade-count bounds
//! - Trade records and end-of-run summaries
//! - Journal sinks for opportunities, executions and alerts

pub mod controller;
pub mod journal;

pub use controller::{SessionConfig, SessionController, SessionSummary, TradeRecord};
pub use journal::{JournalEntry, JournalSink, JsonlJournal, MemoryJournal, NullJournal};
