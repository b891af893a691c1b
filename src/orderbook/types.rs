//! Order book types and data structures.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Single price level in an order book.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PriceLevel {
    /// Price at this level.
    pub price: Decimal,
    /// Total size available at this price.
    pub size: Decimal,
}

impl PriceLevel {
    /// Create a new price level.
    pub fn new(price: Decimal, size: Decimal) -> Self {
        Self { price, size }
    }
}

/// L2 order book snapshot for one symbol on one venue.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderBook {
    /// Normalized symbol (BASE/QUOTE).
    pub symbol: String,
    /// Bid levels sorted by price descending.
    pub bids: Vec<PriceLevel>,
    /// Ask levels sorted by price ascending.
    pub asks: Vec<PriceLevel>,
    /// When this book was captured.
    pub updated_at: OffsetDateTime,
}

impl OrderBook {
    /// Build a book from unsorted levels, dropping empty levels and sorting each side.
    pub fn from_levels(
        symbol: impl Into<String>,
        bids: impl IntoIterator<Item = PriceLevel>,
        asks: impl IntoIterator<Item = PriceLevel>,
    ) -> Self {
        let mut bids: Vec<PriceLevel> = bids
            .into_iter()
            .filter(|l| l.size > Decimal::ZERO && l.price > Decimal::ZERO)
            .collect();
        let mut asks: Vec<PriceLevel> = asks
            .into_iter()
            .filter(|l| l.size > Decimal::ZERO && l.price > Decimal::ZERO)
            .collect();

        bids.sort_by(|a, b| b.price.cmp(&a.price)); // Descending
        asks.sort_by(|a, b| a.price.cmp(&b.price)); // Ascending

        Self {
            symbol: symbol.into(),
            bids,
            asks,
            updated_at: OffsetDateTime::now_utc(),
        }
    }

    /// An empty book for a symbol.
    pub fn empty(symbol: impl Into<String>) -> Self {
        Self::from_levels(symbol, Vec::new(), Vec::new())
    }

    /// Whether both sides are empty.
    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    /// Keep at most `depth` levels per side.
    pub fn truncated(mut self, depth: usize) -> Self {
        self.bids.truncate(depth);
        self.asks.truncate(depth);
        self
    }

    /// Get the best bid price.
    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.first().map(|l| l.price)
    }

    /// Get the best ask price.
    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.first().map(|l| l.price)
    }

    /// Get the spread between best bid and ask.
    pub fn spread(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some(ask - bid),
            _ => None,
        }
    }

    /// Get size available at best bid.
    pub fn bid_size(&self) -> Decimal {
        self.bids.first().map(|l| l.size).unwrap_or(Decimal::ZERO)
    }

    /// Get size available at best ask.
    pub fn ask_size(&self) -> Decimal {
        self.asks.first().map(|l| l.size).unwrap_or(Decimal::ZERO)
    }

    /// Check if the book is inverted (best_ask < best_bid).
    pub fn is_inverted(&self) -> bool {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => ask < bid,
            _ => false,
        }
    }

    /// Get total liquidity on the bid side.
    pub fn total_bid_liquidity(&self) -> Decimal {
        self.bids.iter().map(|l| l.size).sum()
    }

    /// Get total liquidity on the ask side.
    pub fn total_ask_liquidity(&self) -> Decimal {
        self.asks.iter().map(|l| l.size).sum()
    }
}

/// Result of calculating fill price by walking the book.
#[derive(Debug, Clone)]
pub struct FillInfo {
    /// Total size that can be filled.
    pub filled_size: Decimal,
    /// Total cost to fill.
    pub total_cost: Decimal,
    /// Volume-weighted average price.
    pub vwap: Decimal,
    /// Worst price encountered (highest for buys, lowest for sells).
    pub worst_price: Decimal,
    /// Best price available.
    pub best_price: Option<Decimal>,
}

/// One level consumed while walking a book.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelTake {
    /// Price of the consumed level.
    pub price: Decimal,
    /// Quantity taken from it.
    pub quantity: Decimal,
}

/// Outcome of walking a book for a quantity, partial fills included.
#[derive(Debug, Clone, Default)]
pub struct BookWalk {
    /// Levels consumed, best first.
    pub takes: Vec<LevelTake>,
    /// Quantity the book could not absorb.
    pub remaining: Decimal,
}

impl BookWalk {
    /// Total quantity taken.
    pub fn filled(&self) -> Decimal {
        self.takes.iter().map(|t| t.quantity).sum()
    }

    /// Whether the walk absorbed the full quantity.
    pub fn is_complete(&self) -> bool {
        self.remaining.is_zero()
    }
}
