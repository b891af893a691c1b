//! Trade decisions consumed by the ledger.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// What a decision asks the ledger to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum TradeAction {
    /// Open a new position.
    Enter,
    /// Close part of an open position.
    Reduce,
    /// Close the whole position.
    Exit,
}

/// Position direction.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, Default,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Direction {
    /// Profits when the price rises.
    #[default]
    Long,
    /// Profits when the price falls.
    Short,
}

impl Direction {
    /// `+1` for long, `-1` for short.
    pub fn sign(&self) -> Decimal {
        match self {
            Direction::Long => Decimal::ONE,
            Direction::Short => Decimal::NEGATIVE_ONE,
        }
    }
}

/// Instruction from an external strategy layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeDecision {
    /// Requested action.
    pub action: TradeAction,
    /// Direction for entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<Direction>,
    /// Notional in quote currency for entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<Decimal>,
    /// Fraction of the position to close for reduces.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fraction: Option<Decimal>,
    /// Free-form reason, recorded on exits.
    #[serde(default)]
    pub reason: String,
}

impl TradeDecision {
    /// Enter with the given direction and notional.
    pub fn enter(direction: Direction, size: Decimal, reason: impl Into<String>) -> Self {
        Self {
            action: TradeAction::Enter,
            direction: Some(direction),
            size: Some(size),
            fraction: None,
            reason: reason.into(),
        }
    }

    /// Reduce by a fraction of the open quantity.
    pub fn reduce(fraction: Decimal, reason: impl Into<String>) -> Self {
        Self {
            action: TradeAction::Reduce,
            direction: None,
            size: None,
            fraction: Some(fraction),
            reason: reason.into(),
        }
    }

    /// Close the whole position.
    pub fn exit(reason: impl Into<String>) -> Self {
        Self {
            action: TradeAction::Exit,
            direction: None,
            size: None,
            fraction: None,
            reason: reason.into(),
        }
    }
}
