//! Book walking and fill price calculations.

use rust_decimal::Decimal;
use tracing::instrument;

use super::types::{BookSide, FillInfo, OrderBook, PriceLevel};
use crate::error::ValidationError;

/// Walk levels best-first until `target_size` is filled.
///
/// Returns VWAP and the worst price needed to fill the whole size.
#[instrument(skip(levels), fields(target_size = %target_size))]
pub fn calculate_fill_price(
    levels: &[PriceLevel],
    target_size: Decimal,
) -> Result<FillInfo, ValidationError> {
    if target_size <= Decimal::ZERO {
        return Err(ValidationError::InvalidSize(target_size));
    }

    if levels.is_empty() {
        return Err(ValidationError::InsufficientLiquidity {
            required: target_size,
            available: Decimal::ZERO,
        });
    }

    let mut remaining = target_size;
    let mut total_cost = Decimal::ZERO;
    let mut worst_price = Decimal::ZERO;
    let best_price = levels.first().map(|l| l.price);

    for level in levels {
        if remaining.is_zero() {
            break;
        }

        let fill_size = remaining.min(level.size);
        total_cost += fill_size * level.price;
        remaining -= fill_size;
        worst_price = level.price;
    }

    if !remaining.is_zero() {
        return Err(ValidationError::InsufficientLiquidity {
            available: target_size - remaining,
            required: target_size,
        });
    }

    Ok(FillInfo {
        filled_size: target_size,
        total_cost,
        vwap: total_cost / target_size,
        worst_price,
        best_price,
    })
}

/// Walk the side a taker of `side` would consume: buys lift asks, sells hit bids.
pub fn walk_book(
    book: &OrderBook,
    consumed: BookSide,
    target_size: Decimal,
) -> Result<FillInfo, ValidationError> {
    calculate_fill_price(book.levels(consumed), target_size)
}
