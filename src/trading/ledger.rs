//! Position ledger.
//!
//! Each symbol is either flat or holds exactly one open position. Entries,
//! partial reduces and exits are priced through a [`FillModel`] so every leg
//! pays adverse slippage and a proportional fee.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::Serialize;
use time::OffsetDateTime;
use tracing::{debug, info, instrument, warn};

use super::decision::{Direction, TradeAction, TradeDecision};
use super::fill::FillModel;
use super::position::Position;
use crate::config::Config;
use crate::error::LedgerError;
use crate::metrics;

/// Reason recorded on positions closed by [`PositionLedger::liquidate_all`].
pub const LIQUIDATION_REASON: &str = "liquidation";

/// Ledger sizing and pricing rules.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerConfig {
    /// Slippage and fees.
    pub fill: FillModel,
    /// Entry notionals are rounded down to a multiple of this.
    pub notional_granularity: Decimal,
    /// Smallest notional an entry may open.
    pub min_notional: Decimal,
    /// Partial reduces allowed before the next reduce becomes an exit.
    pub max_partial_reduces: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            fill: FillModel::default(),
            notional_granularity: Decimal::ONE,
            min_notional: Decimal::TEN,
            max_partial_reduces: 100,
        }
    }
}

impl LedgerConfig {
    /// Create from config values.
    pub fn from_config(config: &Config) -> Self {
        Self {
            fill: FillModel {
                slippage_bps: config.slippage_bps,
                fee_rate: config.fee_rate,
            },
            notional_granularity: config.notional_granularity,
            min_notional: config.min_notional,
            max_partial_reduces: config.max_partial_reduces,
        }
    }

    /// Round a requested notional down to the granularity.
    pub fn round_notional(&self, notional: Decimal) -> Decimal {
        if self.notional_granularity <= Decimal::ZERO {
            return notional;
        }
        (notional / self.notional_granularity).floor() * self.notional_granularity
    }
}

/// What a ledger operation did.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LedgerEvent {
    /// A position was opened.
    Opened {
        /// Symbol.
        symbol: String,
        /// Direction.
        direction: Direction,
        /// Slippage-adjusted entry price.
        entry_price: Decimal,
        /// Quantity bought or sold short.
        quantity: Decimal,
        /// Rounded notional.
        notional: Decimal,
        /// Entry fee.
        fee: Decimal,
    },
    /// Part of a position was closed.
    Reduced {
        /// Symbol.
        symbol: String,
        /// Quantity closed.
        quantity: Decimal,
        /// Slippage-adjusted exit price.
        exit_price: Decimal,
        /// P&L realized by this reduce, net of its fee.
        pnl: Decimal,
        /// Reduces applied so far.
        reduce_count: u32,
    },
    /// A position was closed.
    Closed {
        /// Symbol.
        symbol: String,
        /// Quantity closed.
        quantity: Decimal,
        /// Slippage-adjusted exit price.
        exit_price: Decimal,
        /// Realized P&L over the whole trade.
        realized_pnl: Decimal,
        /// Closing reason.
        reason: String,
    },
}

/// Aggregate ledger statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LedgerSummary {
    /// Open positions.
    pub open_positions: usize,
    /// Closed trades.
    pub closed_trades: usize,
    /// Closed trades with positive realized P&L.
    pub wins: usize,
    /// Closed trades with zero or negative realized P&L.
    pub losses: usize,
    /// Realized P&L across open and closed positions.
    pub total_realized_pnl: Decimal,
}

impl LedgerSummary {
    /// Fraction of closed trades that were wins.
    pub fn win_rate(&self) -> Option<Decimal> {
        if self.closed_trades == 0 {
            return None;
        }
        Some(Decimal::from(self.wins) / Decimal::from(self.closed_trades))
    }
}

/// Simulated positions keyed by symbol.
#[derive(Debug, Default)]
pub struct PositionLedger {
    config: LedgerConfig,
    open: HashMap<String, Position>,
    closed: Vec<Position>,
}

impl PositionLedger {
    /// Create an empty ledger.
    pub fn new(config: LedgerConfig) -> Self {
        Self {
            config,
            open: HashMap::new(),
            closed: Vec::new(),
        }
    }

    /// Ledger rules.
    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Open a position of `notional` quote currency at `price`.
    #[instrument(skip(self))]
    pub fn enter(
        &mut self,
        symbol: &str,
        direction: Direction,
        notional: Decimal,
        price: Decimal,
        now: OffsetDateTime,
    ) -> Result<LedgerEvent, LedgerError> {
        check_price(price)?;
        if self.open.contains_key(symbol) {
            return Err(LedgerError::PositionAlreadyOpen(symbol.to_string()));
        }

        let notional = self.config.round_notional(notional);
        if notional < self.config.min_notional || notional <= Decimal::ZERO {
            return Err(LedgerError::BelowMinimumNotional {
                notional,
                minimum: self.config.min_notional,
            });
        }

        let entry_price = self.config.fill.entry_price(direction, price);
        let quantity = notional / entry_price;
        let fee = self.config.fill.fee(quantity, entry_price);

        self.open.insert(
            symbol.to_string(),
            Position {
                symbol: symbol.to_string(),
                direction,
                entry_price,
                notional,
                quantity,
                entry_time: now,
                entry_fee: fee,
                realized_pnl: -fee,
                exit_price: None,
                exit_time: None,
                reduce_count: 0,
                exit_reason: None,
            },
        );

        metrics::inc_positions_opened();
        info!(
            entry_price = %entry_price,
            quantity = %quantity,
            notional = %notional,
            fee = %fee,
            "Position opened"
        );

        Ok(LedgerEvent::Opened {
            symbol: symbol.to_string(),
            direction,
            entry_price,
            quantity,
            notional,
            fee,
        })
    }

    /// Close `fraction` of an open position at `price`.
    ///
    /// A fraction of one or more, or a position that has used up its partial
    /// reduces, closes the whole position.
    #[instrument(skip(self, reason))]
    pub fn reduce(
        &mut self,
        symbol: &str,
        fraction: Decimal,
        price: Decimal,
        reason: &str,
        now: OffsetDateTime,
    ) -> Result<LedgerEvent, LedgerError> {
        check_price(price)?;
        if fraction <= Decimal::ZERO {
            return Err(LedgerError::InvalidFraction(fraction));
        }

        let max_reduces = self.config.max_partial_reduces;
        let position = self
            .open
            .get_mut(symbol)
            .ok_or_else(|| LedgerError::NoOpenPosition(symbol.to_string()))?;

        if fraction >= Decimal::ONE || position.reduce_count >= max_reduces {
            debug!(reduce_count = position.reduce_count, "Reduce becomes full exit");
            return self.exit(symbol, price, reason, now);
        }

        let fill = self.config.fill;
        let exit_price = fill.exit_price(position.direction, price);
        let quantity = position.quantity * fraction;
        let pnl = position.gross_pnl(quantity, exit_price) - fill.fee(quantity, exit_price);

        position.realized_pnl += pnl;
        position.quantity -= quantity;
        position.notional = position.quantity * position.entry_price;
        position.reduce_count += 1;

        debug!(
            quantity = %quantity,
            exit_price = %exit_price,
            pnl = %pnl,
            reduce_count = position.reduce_count,
            "Position reduced"
        );

        Ok(LedgerEvent::Reduced {
            symbol: symbol.to_string(),
            quantity,
            exit_price,
            pnl,
            reduce_count: position.reduce_count,
        })
    }

    /// Close an open position at `price`.
    #[instrument(skip(self, reason))]
    pub fn exit(
        &mut self,
        symbol: &str,
        price: Decimal,
        reason: &str,
        now: OffsetDateTime,
    ) -> Result<LedgerEvent, LedgerError> {
        check_price(price)?;
        let mut position = self
            .open
            .remove(symbol)
            .ok_or_else(|| LedgerError::NoOpenPosition(symbol.to_string()))?;

        let fill = self.config.fill;
        let exit_price = fill.exit_price(position.direction, price);
        let quantity = position.quantity;
        let pnl = position.gross_pnl(quantity, exit_price) - fill.fee(quantity, exit_price);

        position.realized_pnl += pnl;
        position.quantity = Decimal::ZERO;
        position.notional = Decimal::ZERO;
        position.exit_price = Some(exit_price);
        position.exit_time = Some(now);
        position.exit_reason = Some(reason.to_string());

        let realized_pnl = position.realized_pnl;
        self.closed.push(position);

        metrics::inc_positions_closed();
        info!(
            exit_price = %exit_price,
            realized_pnl = %realized_pnl,
            reason,
            "Position closed"
        );

        Ok(LedgerEvent::Closed {
            symbol: symbol.to_string(),
            quantity,
            exit_price,
            realized_pnl,
            reason: reason.to_string(),
        })
    }

    /// Apply a strategy decision at `price`.
    pub fn apply(
        &mut self,
        symbol: &str,
        decision: &TradeDecision,
        price: Decimal,
        now: OffsetDateTime,
    ) -> Result<LedgerEvent, LedgerError> {
        match decision.action {
            TradeAction::Enter => {
                let direction = decision.direction.ok_or(LedgerError::MissingField("direction"))?;
                let size = decision.size.ok_or(LedgerError::MissingField("size"))?;
                self.enter(symbol, direction, size, price, now)
            }
            TradeAction::Reduce => {
                let fraction = decision.fraction.ok_or(LedgerError::MissingField("fraction"))?;
                self.reduce(symbol, fraction, price, &decision.reason, now)
            }
            TradeAction::Exit => self.exit(symbol, price, &decision.reason, now),
        }
    }

    /// Exit every open position that has a price in `prices`.
    ///
    /// Symbols without a price stay open.
    pub fn liquidate_all(
        &mut self,
        prices: &HashMap<String, Decimal>,
        now: OffsetDateTime,
    ) -> Vec<LedgerEvent> {
        let mut symbols: Vec<String> = self
            .open
            .keys()
            .filter(|s| prices.contains_key(*s))
            .cloned()
            .collect();
        symbols.sort();

        let mut events = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            let Some(&price) = prices.get(&symbol) else {
                continue;
            };
            match self.exit(&symbol, price, LIQUIDATION_REASON, now) {
                Ok(event) => events.push(event),
                Err(e) => warn!(symbol = %symbol, error = %e, "Liquidation skipped"),
            }
        }
        events
    }

    /// Open position for a symbol.
    pub fn position(&self, symbol: &str) -> Option<&Position> {
        self.open.get(symbol)
    }

    /// Open positions sorted by symbol.
    pub fn open_positions(&self) -> Vec<&Position> {
        let mut positions: Vec<&Position> = self.open.values().collect();
        positions.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        positions
    }

    /// Closed trades in closing order.
    pub fn closed_trades(&self) -> &[Position] {
        &self.closed
    }

    /// Aggregate statistics.
    pub fn summary(&self) -> LedgerSummary {
        let wins = self.closed.iter().filter(|p| p.is_win()).count();
        let total_realized_pnl = self
            .closed
            .iter()
            .chain(self.open.values())
            .map(|p| p.realized_pnl)
            .sum();

        LedgerSummary {
            open_positions: self.open.len(),
            closed_trades: self.closed.len(),
            wins,
            losses: self.closed.len() - wins,
            total_realized_pnl,
        }
    }
}

fn check_price(price: Decimal) -> Result<(), LedgerError> {
    if price <= Decimal::ZERO {
        return Err(LedgerError::InvalidPrice(price));
    }
    Ok(())
}
