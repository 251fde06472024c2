//! Fee schedules and pluggable funding-cost models.

use std::collections::HashMap;
use std::fmt::Debug;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::utils::bps_of;
use crate::venue::{LegKind, VenueId};

/// Minutes in one funding period.
const FUNDING_PERIOD_MINUTES: Decimal = Decimal::from_parts(480, 0, 0, false, 0);

/// Fee rates and instrument kind of one venue.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeeSchedule {
    /// Taker fee in bps.
    pub taker_bps: Decimal,
    /// Maker fee in bps.
    pub maker_bps: Decimal,
    /// Instrument kind traded on this venue.
    pub leg_kind: LegKind,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            taker_bps: Decimal::TEN,
            maker_bps: Decimal::TWO,
            leg_kind: LegKind::Spot,
        }
    }
}

/// Per-venue fee schedules, injected into the detector and executor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeeTable {
    schedules: HashMap<VenueId, FeeSchedule>,
    fallback: FeeSchedule,
}

impl FeeTable {
    /// Table where unknown venues use `fallback`.
    pub fn new(fallback: FeeSchedule) -> Self {
        Self {
            schedules: HashMap::new(),
            fallback,
        }
    }

    /// Builder-style schedule registration.
    pub fn with(mut self, venue: impl Into<VenueId>, schedule: FeeSchedule) -> Self {
        self.schedules.insert(venue.into(), schedule);
        self
    }

    /// Schedule of a venue.
    pub fn schedule(&self, venue: &VenueId) -> &FeeSchedule {
        self.schedules.get(venue).unwrap_or(&self.fallback)
    }

    /// Taker fee of a venue in bps.
    pub fn taker_bps(&self, venue: &VenueId) -> Decimal {
        self.schedule(venue).taker_bps
    }

    /// Instrument kind of a venue.
    pub fn leg_kind(&self, venue: &VenueId) -> LegKind {
        self.schedule(venue).leg_kind
    }

    /// Taker fees paid crossing both venues once.
    pub fn round_trip_taker_bps(&self, buy: &VenueId, sell: &VenueId) -> Decimal {
        self.taker_bps(buy) + self.taker_bps(sell)
    }

    /// Taker fee in quote currency for `notional` on `venue`.
    pub fn taker_fee(&self, venue: &VenueId, notional: Decimal) -> Decimal {
        bps_of(notional, self.taker_bps(venue))
    }
}

/// Funding-cost term subtracted from the net edge when a leg is a perpetual.
///
/// Positive values are a cost, negative values a credit.
pub trait FundingModel: Send + Sync + Debug {
    /// Funding cost in bps for buying on a `buy` leg and selling on a `sell` leg.
    fn funding_cost_bps(&self, buy: LegKind, sell: LegKind) -> Decimal;

    /// Short label for logs.
    fn name(&self) -> &'static str;
}

/// No funding at all (spot/spot pairs).
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFunding;

impl FundingModel for NoFunding {
    fn funding_cost_bps(&self, _buy: LegKind, _sell: LegKind) -> Decimal {
        Decimal::ZERO
    }

    fn name(&self) -> &'static str {
        "none"
    }
}

/// Flat funding rate per 8h period, scaled linearly by expected holding time.
///
/// A positive rate means longs pay shorts: a long perpetual leg pays it, a
/// short perpetual leg receives it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlatFundingModel {
    /// Funding rate in bps per 8h.
    pub rate_bps_per_8h: Decimal,
    /// Expected holding time of the hedge in minutes.
    pub holding_minutes: Decimal,
}

impl FlatFundingModel {
    /// Funding over the holding period for one long perpetual.
    pub fn period_bps(&self) -> Decimal {
        self.rate_bps_per_8h * self.holding_minutes / FUNDING_PERIOD_MINUTES
    }
}

impl FundingModel for FlatFundingModel {
    fn funding_cost_bps(&self, buy: LegKind, sell: LegKind) -> Decimal {
        let period = self.period_bps();
        let mut cost = Decimal::ZERO;
        if buy == LegKind::Perpetual {
            cost += period;
        }
        if sell == LegKind::Perpetual {
            cost -= period;
        }
        cost
    }

    fn name(&self) -> &'static str {
        "flat"
    }
}
