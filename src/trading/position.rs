//! Position tracking.

use rust_decimal::Decimal;
use serde::Serialize;
use time::OffsetDateTime;

use super::decision::Direction;

/// Simulated position in a single symbol.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Position {
    /// Normalized symbol.
    pub symbol: String,
    /// Long or short.
    pub direction: Direction,
    /// Slippage-adjusted entry price.
    pub entry_price: Decimal,
    /// Remaining notional at entry price.
    pub notional: Decimal,
    /// Remaining quantity.
    pub quantity: Decimal,
    /// When the position was opened.
    #[serde(with = "time::serde::rfc3339")]
    pub entry_time: OffsetDateTime,
    /// Fee charged on entry.
    pub entry_fee: Decimal,
    /// Realized P&L so far, entry fee included.
    pub realized_pnl: Decimal,
    /// Exit price once closed.
    pub exit_price: Option<Decimal>,
    /// Exit time once closed.
    #[serde(with = "time::serde::rfc3339::option")]
    pub exit_time: Option<OffsetDateTime>,
    /// Partial reduces applied.
    pub reduce_count: u32,
    /// Reason given by the closing decision.
    pub exit_reason: Option<String>,
}

impl Position {
    /// Whether the position is still open.
    pub fn is_open(&self) -> bool {
        self.exit_time.is_none()
    }

    /// Calculate the cost basis of the remaining quantity.
    pub fn cost_basis(&self) -> Decimal {
        self.quantity * self.entry_price
    }

    /// Gross P&L of closing `quantity` at `exit_price`, before fees.
    pub fn gross_pnl(&self, quantity: Decimal, exit_price: Decimal) -> Decimal {
        self.direction.sign() * quantity * (exit_price - self.entry_price)
    }

    /// Mark-to-market P&L of the remaining quantity.
    pub fn unrealized_pnl(&self, mark_price: Decimal) -> Decimal {
        self.gross_pnl(self.quantity, mark_price)
    }

    /// Whether a closed trade made money after fees.
    pub fn is_win(&self) -> bool {
        self.realized_pnl > Decimal::ZERO
    }
}
