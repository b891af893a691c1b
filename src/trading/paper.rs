//! Paper trading against a live or simulated feed.

use std::sync::Arc;

use rust_decimal::Decimal;
use time::OffsetDateTime;
use tracing::{debug, instrument};

use super::decision::{TradeAction, TradeDecision};
use super::fill::{simulate_fills, FillReport};
use super::ledger::{LedgerConfig, LedgerEvent, PositionLedger};
use crate::config::Config;
use crate::error::Result;
use crate::feed::ExchangeFeed;
use crate::orderbook::OrderBook;

/// Result of executing one decision.
#[derive(Debug, Clone, PartialEq)]
pub struct PaperOutcome {
    /// Ledger change.
    pub event: LedgerEvent,
    /// Simulated book fills for entries in paper mode.
    pub fills: Option<FillReport>,
}

/// Applies decisions to a ledger, optionally walking the venue's book.
pub struct PaperTrader {
    feed: Arc<dyn ExchangeFeed>,
    ledger: PositionLedger,
    paper_mode: bool,
    depth: usize,
}

impl PaperTrader {
    /// Create a trader over a feed.
    pub fn new(feed: Arc<dyn ExchangeFeed>, ledger: PositionLedger, paper_mode: bool, depth: usize) -> Self {
        Self {
            feed,
            ledger,
            paper_mode,
            depth: depth.max(1),
        }
    }

    /// Create from config values.
    pub fn from_config(feed: Arc<dyn ExchangeFeed>, config: &Config) -> Self {
        Self::new(
            feed,
            PositionLedger::new(LedgerConfig::from_config(config)),
            config.paper_mode,
            config.orderbook_depth,
        )
    }

    /// Venue the trader executes against.
    pub fn venue(&self) -> &str {
        self.feed.venue()
    }

    /// Underlying ledger.
    pub fn ledger(&self) -> &PositionLedger {
        &self.ledger
    }

    /// Apply a decision at `price`.
    ///
    /// In paper mode entries also walk the book to report fills. The book is
    /// fetched before the ledger changes, so a feed failure leaves it untouched.
    #[instrument(skip(self, decision), fields(venue = %self.feed.venue(), action = %decision.action))]
    pub async fn execute(
        &mut self,
        symbol: &str,
        decision: &TradeDecision,
        price: Decimal,
    ) -> Result<PaperOutcome> {
        let book = if self.paper_mode && decision.action == TradeAction::Enter {
            Some(self.feed.get_order_book(symbol, self.depth).await?)
        } else {
            None
        };

        let now = OffsetDateTime::now_utc();
        let event = self.ledger.apply(symbol, decision, price, now)?;
        let fills = book.and_then(|book| entry_fills(&book, &event, now));

        if let Some(report) = &fills {
            debug!(
                fills = report.fills.len(),
                filled = %report.filled(),
                remaining = %report.remaining,
                "Simulated entry fills"
            );
        }

        Ok(PaperOutcome { event, fills })
    }
}

fn entry_fills(book: &OrderBook, event: &LedgerEvent, now: OffsetDateTime) -> Option<FillReport> {
    match event {
        LedgerEvent::Opened {
            direction, quantity, ..
        } => Some(simulate_fills(book, *direction, *quantity, now)),
        _ => None,
    }
}
