//! Simulated trading: fills, positions and the ledger.
//!
//! This module handles:
//! - Trade decisions from an external strategy layer
//! - Slippage, fees and book-walk fills
//! - Per-symbol position tracking and realized P&L

pub mod decision;
pub mod fill;
pub mod ledger;
pub mod paper;
pub mod position;

pub use decision::{Direction, TradeAction, TradeDecision};
pub use fill::{simulate_fills, Fill, FillModel, FillReport};
pub use ledger::{LedgerConfig, LedgerEvent, LedgerSummary, PositionLedger};
pub use paper::{PaperOutcome, PaperTrader};
pub use position::Position;
