//! Trading engine.
//!
//! This module handles:
//! - Venue connection and per-venue quote ingest
//! - The detection tick, risk gating and dispatch of executions
//! - Booking results into risk and session state
//! - Journaling and broadcasting engine events

pub mod events;
pub mod runner;

pub use events::{EngineEvent, EVENT_CAPACITY};
pub use runner::{EngineConfig, EngineHandles, TradingEngine};
