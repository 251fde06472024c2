//! Venue connectivity.
//!
//! This module handles:
//! - Shared venue types (quotes, order results, balances, precision rules)
//! - The adapter capability interface and the venue registry
//! - An in-memory paper venue for dry runs and tests

pub mod adapter;
pub mod paper;
pub mod types;

pub use adapter::{QuoteStream, VenueAdapter, VenueHandle, VenueRegistry};
pub use paper::{BookBuilder, PaperConfig, PaperVenue};
pub use types::{Balance, LegKind, OrderResult, Quote, VenueId, VenueRules};
