//! Order book walking: VWAP and fill price calculations.

use rust_decimal::Decimal;
use tracing::instrument;

use super::types::{BookWalk, FillInfo, LevelTake, OrderBook, PriceLevel};
use crate::error::ArbitrageError;

/// Walk one side of a book (best first) for `target_size`.
///
/// Returns VWAP and worst price needed to fill target_size. Partial fills are
/// an error: callers must not treat them as executable.
#[instrument(skip(levels), fields(target_size = %target_size))]
pub fn calculate_fill_price(
    levels: &[PriceLevel],
    target_size: Decimal,
) -> Result<FillInfo, ArbitrageError> {
    if target_size <= Decimal::ZERO {
        return Err(ArbitrageError::InvalidSize(target_size));
    }

    if levels.is_empty() {
        return Err(ArbitrageError::InsufficientLiquidity {
            required: target_size,
            available: Decimal::ZERO,
        });
    }

    let walk = walk_levels(levels, target_size);
    if !walk.is_complete() {
        return Err(ArbitrageError::InsufficientLiquidity {
            available: target_size - walk.remaining,
            required: target_size,
        });
    }

    let total_cost: Decimal = walk.takes.iter().map(|t| t.price * t.quantity).sum();
    let worst_price = walk.takes.last().map(|t| t.price).unwrap_or(Decimal::ZERO);

    Ok(FillInfo {
        filled_size: target_size,
        total_cost,
        vwap: total_cost / target_size,
        worst_price,
        best_price: levels.first().map(|l| l.price),
    })
}

/// Volume-weighted average price to fill `amount`, or `None` on insufficient depth.
pub fn vwap(levels: &[PriceLevel], amount: Decimal) -> Option<Decimal> {
    calculate_fill_price(levels, amount).ok().map(|f| f.vwap)
}

/// Walk levels taking `min(size, remaining)` at each, stopping when filled or exhausted.
pub fn walk_levels(levels: &[PriceLevel], quantity: Decimal) -> BookWalk {
    let mut remaining = quantity.max(Decimal::ZERO);
    let mut takes = Vec::new();

    for level in levels {
        if remaining.is_zero() {
            break;
        }
        if level.size <= Decimal::ZERO {
            continue;
        }

        let take = remaining.min(level.size);
        takes.push(LevelTake {
            price: level.price,
            quantity: take,
        });
        remaining -= take;
    }

    BookWalk { takes, remaining }
}

/// Calculate total cost to buy a given size from the ask book.
pub fn calculate_buy_cost(asks: &[PriceLevel], size: Decimal) -> Option<Decimal> {
    calculate_fill_price(asks, size).ok().map(|f| f.total_cost)
}

/// Calculate total revenue from selling a given size into the bid book.
pub fn calculate_sell_revenue(bids: &[PriceLevel], size: Decimal) -> Option<Decimal> {
    calculate_fill_price(bids, size).ok().map(|f| f.total_cost)
}

/// Calculate the mid price from best bid and ask.
pub fn mid_price(book: &OrderBook) -> Option<Decimal> {
    match (book.best_bid(), book.best_ask()) {
        (Some(bid), Some(ask)) => Some((bid + ask) / Decimal::TWO),
        _ => None,
    }
}
