//! In-memory feed for tests and dry runs.
//!
//! This module provides a feed that can be used in tests
//! without making real network requests.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use rust_decimal::Decimal;
use time::OffsetDateTime;

use super::capability::CurrencyDetails;
use super::symbol;
use super::types::{Ticker, Transport};
use super::ExchangeFeed;
use crate::error::FeedError;
use crate::orderbook::OrderBook;

/// Configuration for mock feed behavior.
#[derive(Debug, Clone, Default)]
pub struct MockConfig {
    /// Whether to fail ticker requests.
    pub fail_tickers: bool,
    /// Whether to fail order book requests.
    pub fail_order_book: bool,
    /// Whether to fail currency metadata requests.
    pub fail_currencies: bool,
    /// Simulated latency for tickers and books in milliseconds.
    pub latency_ms: u64,
    /// Extra latency for order books only, in milliseconds.
    pub book_latency_ms: u64,
    /// Simulated latency for capability and metadata calls in milliseconds.
    pub capability_latency_ms: u64,
}

/// Mock [`ExchangeFeed`] with settable snapshots.
#[derive(Debug)]
pub struct MockFeed {
    venue: String,
    transport: Transport,
    config: MockConfig,
    tickers: DashMap<String, Ticker>,
    books: DashMap<String, OrderBook>,
    currencies: DashMap<String, CurrencyDetails>,
}

impl MockFeed {
    /// Create a new mock feed with default configuration.
    pub fn new(venue: impl Into<String>) -> Self {
        Self::with_config(venue, MockConfig::default())
    }

    /// Create a mock feed with custom configuration.
    pub fn with_config(venue: impl Into<String>, config: MockConfig) -> Self {
        Self {
            venue: venue.into().to_lowercase(),
            transport: Transport::Simulated,
            config,
            tickers: DashMap::new(),
            books: DashMap::new(),
            currencies: DashMap::new(),
        }
    }

    /// Report a different transport (e.g. to stand in for a streaming feed).
    pub fn with_transport(mut self, transport: Transport) -> Self {
        self.transport = transport;
        self
    }

    /// Set a ticker stamped now.
    pub fn set_ticker(&self, symbol: &str, price: Decimal) {
        self.set_ticker_at(symbol, price, Some(OffsetDateTime::now_utc()));
    }

    /// Set a ticker with an explicit (or missing) timestamp.
    pub fn set_ticker_at(&self, symbol: &str, price: Decimal, timestamp: Option<OffsetDateTime>) {
        let normalized = normalize(symbol);
        let mut ticker = Ticker::new(normalized.clone(), price);
        ticker.timestamp = timestamp;
        self.tickers.insert(normalized, ticker);
    }

    /// Set a mock order book; its symbol is the key.
    pub fn set_order_book(&self, book: OrderBook) {
        self.books.insert(normalize(&book.symbol), book);
    }

    /// Set currency metadata for a base asset.
    pub fn set_currency(&self, base_asset: &str, details: CurrencyDetails) {
        self.currencies.insert(base_asset.trim().to_uppercase(), details);
    }

    async fn simulate_latency(ms: u64) {
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }

    fn failure(&self, what: &str) -> FeedError {
        FeedError::RequestFailed {
            venue: self.venue.clone(),
            reason: format!("Mock {what} failure"),
        }
    }
}

fn normalize(symbol: &str) -> String {
    symbol::normalize(symbol).unwrap_or_else(|| symbol.trim().to_uppercase())
}

#[async_trait]
impl ExchangeFeed for MockFeed {
    fn venue(&self) -> &str {
        &self.venue
    }

    fn transport(&self) -> Transport {
        self.transport
    }

    async fn get_tickers(&self) -> Result<HashMap<String, Ticker>, FeedError> {
        Self::simulate_latency(self.config.latency_ms).await;

        if self.config.fail_tickers {
            return Err(self.failure("ticker"));
        }

        Ok(self
            .tickers
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect())
    }

    async fn get_order_book(&self, symbol: &str, depth: usize) -> Result<OrderBook, FeedError> {
        Self::simulate_latency(self.config.latency_ms + self.config.book_latency_ms).await;

        if self.config.fail_order_book {
            return Err(self.failure("order book"));
        }

        let key = normalize(symbol);
        // Return an empty book if not configured
        Ok(self
            .books
            .get(&key)
            .map(|b| b.clone().truncated(depth))
            .unwrap_or_else(|| OrderBook::empty(key)))
    }

    async fn get_currency_details(
        &self,
        base_asset: &str,
    ) -> Result<Option<CurrencyDetails>, FeedError> {
        Self::simulate_latency(self.config.capability_latency_ms).await;

        if self.config.fail_currencies {
            return Err(self.failure("currency"));
        }

        Ok(self
            .currencies
            .get(&base_asset.trim().to_uppercase())
            .map(|d| d.clone()))
    }
}
