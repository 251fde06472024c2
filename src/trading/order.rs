//! Order legs handed to venue adapters.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::ValidationError;
use crate::venue::VenueId;

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    /// Buy order.
    #[strum(serialize = "BUY", serialize = "buy")]
    Buy,
    /// Sell order.
    #[strum(serialize = "SELL", serialize = "sell")]
    Sell,
}

impl Side {
    /// The closing side.
    pub fn opposite(&self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

/// Order type.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, Default,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
    /// Immediate-or-cancel limit order: fill what crosses, cancel the rest.
    #[default]
    #[strum(serialize = "IOC", serialize = "ioc")]
    Ioc,
    /// Resting limit order.
    #[strum(serialize = "LIMIT", serialize = "limit")]
    Limit,
    /// Market order, no price.
    #[strum(serialize = "MARKET", serialize = "market")]
    Market,
}

/// One order of an execution plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionLeg {
    /// Target venue.
    pub venue: VenueId,
    /// Symbol.
    pub symbol: String,
    /// Side.
    pub side: Side,
    /// Order type.
    pub order_type: OrderType,
    /// Base quantity.
    pub amount: Decimal,
    /// Guard-adjusted limit price; `None` for market orders.
    pub price: Option<Decimal>,
    /// Only reduces an existing position.
    pub reduce_only: bool,
}

impl ExecutionLeg {
    /// Create an IOC buy.
    pub fn buy(venue: VenueId, symbol: impl Into<String>, amount: Decimal, price: Decimal) -> Self {
        Self {
            venue,
            symbol: symbol.into(),
            side: Side::Buy,
            order_type: OrderType::Ioc,
            amount,
            price: Some(price),
            reduce_only: false,
        }
    }

    /// Create an IOC sell.
    pub fn sell(venue: VenueId, symbol: impl Into<String>, amount: Decimal, price: Decimal) -> Self {
        Self {
            side: Side::Sell,
            ..Self::buy(venue, symbol, amount, price)
        }
    }

    /// Create a reduce-only market order closing exposure on `side`'s opposite.
    pub fn unwind(venue: VenueId, symbol: impl Into<String>, side: Side, amount: Decimal) -> Self {
        Self {
            venue,
            symbol: symbol.into(),
            side,
            order_type: OrderType::Market,
            amount,
            price: None,
            reduce_only: true,
        }
    }

    /// Notional at the limit price, zero for market orders.
    pub fn notional(&self) -> Decimal {
        self.price.map(|p| p * self.amount).unwrap_or(Decimal::ZERO)
    }

    /// Validate order parameters.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.amount <= Decimal::ZERO {
            return Err(ValidationError::InvalidSize(self.amount));
        }
        match (self.order_type, self.price) {
            (OrderType::Market, _) => Ok(()),
            (_, Some(price)) if price > Decimal::ZERO => Ok(()),
            (_, price) => Err(ValidationError::InvalidPrice(price.unwrap_or(Decimal::ZERO))),
        }
    }
}
