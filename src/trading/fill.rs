//! Fill simulation: slippage, fees and book walks.

use rust_decimal::Decimal;
use serde::Serialize;
use time::OffsetDateTime;

use super::decision::Direction;
use crate::orderbook::{walk_levels, OrderBook};

const BPS: Decimal = Decimal::from_parts(10_000, 0, 0, false, 0);

/// One simulated execution against a book level.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Fill {
    /// Quantity filled.
    pub quantity: Decimal,
    /// Level price.
    pub price: Decimal,
    /// Simulation time.
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

/// Outcome of walking a book for a requested quantity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FillReport {
    /// Fills, best level first.
    pub fills: Vec<Fill>,
    /// Quantity requested.
    pub requested: Decimal,
    /// Quantity the book could not absorb.
    pub remaining: Decimal,
}

impl FillReport {
    /// Total filled quantity.
    pub fn filled(&self) -> Decimal {
        self.fills.iter().map(|f| f.quantity).sum()
    }

    /// Volume-weighted price of the fills.
    pub fn average_price(&self) -> Option<Decimal> {
        let filled = self.filled();
        if filled.is_zero() {
            return None;
        }
        let cost: Decimal = self.fills.iter().map(|f| f.quantity * f.price).sum();
        Some(cost / filled)
    }
}

/// Adverse slippage and proportional fees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FillModel {
    /// Slippage in basis points, always against the trader.
    pub slippage_bps: Decimal,
    /// Fee as a fraction of executed value.
    pub fee_rate: Decimal,
}

impl Default for FillModel {
    fn default() -> Self {
        Self {
            slippage_bps: Decimal::from(5),
            fee_rate: Decimal::new(1, 3),
        }
    }
}

impl FillModel {
    fn slip(&self) -> Decimal {
        self.slippage_bps / BPS
    }

    /// Entry price: longs pay up, shorts sell down.
    pub fn entry_price(&self, direction: Direction, price: Decimal) -> Decimal {
        match direction {
            Direction::Long => price * (Decimal::ONE + self.slip()),
            Direction::Short => price * (Decimal::ONE - self.slip()),
        }
    }

    /// Exit price: longs sell down, shorts buy back up.
    pub fn exit_price(&self, direction: Direction, price: Decimal) -> Decimal {
        match direction {
            Direction::Long => price * (Decimal::ONE - self.slip()),
            Direction::Short => price * (Decimal::ONE + self.slip()),
        }
    }

    /// Fee for executing `quantity` at `price`.
    pub fn fee(&self, quantity: Decimal, price: Decimal) -> Decimal {
        quantity * price * self.fee_rate
    }
}

/// Walk the side of `book` an entry in `direction` would take.
///
/// Longs lift asks, shorts hit bids. Filled quantity plus `remaining` always
/// equals the request.
pub fn simulate_fills(
    book: &OrderBook,
    direction: Direction,
    quantity: Decimal,
    timestamp: OffsetDateTime,
) -> FillReport {
    let levels = match direction {
        Direction::Long => &book.asks,
        Direction::Short => &book.bids,
    };
    let walk = walk_levels(levels, quantity);

    FillReport {
        fills: walk
            .takes
            .iter()
            .map(|take| Fill {
                quantity: take.quantity,
                price: take.price,
                timestamp,
            })
            .collect(),
        requested: quantity,
        remaining: walk.remaining,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orderbook::PriceLevel;
    use rust_decimal_macros::dec;

    fn book() -> OrderBook {
        OrderBook::from_levels(
            "BTC/USDT",
            vec![PriceLevel::new(dec!(99), dec!(1)), PriceLevel::new(dec!(98), dec!(1))],
            vec![
                PriceLevel::new(dec!(100), dec!(1)),
                PriceLevel::new(dec!(101), dec!(2)),
            ],
        )
    }

    #[test]
    fn slippage_is_adverse() {
        let model = FillModel {
            slippage_bps: dec!(10),
            fee_rate: dec!(0.001),
        };

        assert_eq!(model.entry_price(Direction::Long, dec!(100)), dec!(100.1));
        assert_eq!(model.entry_price(Direction::Short, dec!(100)), dec!(99.9));
        assert_eq!(model.exit_price(Direction::Long, dec!(100)), dec!(99.9));
        assert_eq!(model.exit_price(Direction::Short, dec!(100)), dec!(100.1));
        assert_eq!(model.fee(dec!(2), dec!(50)), dec!(0.1));
    }

    #[test]
    fn fills_conserve_quantity() {
        let now = OffsetDateTime::UNIX_EPOCH;

        let long = simulate_fills(&book(), Direction::Long, dec!(2.5), now);
        assert_eq!(long.fills.len(), 2);
        assert_eq!(long.remaining, Decimal::ZERO);
        assert_eq!(long.filled() + long.remaining, dec!(2.5));
        assert_eq!(long.fills[1].price, dec!(101));

        let short = simulate_fills(&book(), Direction::Short, dec!(5), now);
        assert_eq!(short.filled(), dec!(2));
        assert_eq!(short.filled() + short.remaining, dec!(5));
        assert_eq!(short.average_price(), Some(dec!(98.5)));
    }

    #[test]
    fn empty_book_leaves_everything_unfilled() {
        let report = simulate_fills(
            &OrderBook::empty("BTC/USDT"),
            Direction::Long,
            dec!(1),
            OffsetDateTime::UNIX_EPOCH,
        );
        assert!(report.fills.is_empty());
        assert_eq!(report.remaining, dec!(1));
        assert_eq!(report.average_price(), None);
    }
}
