//! Snapshot types produced by exchange feeds.

use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use time::OffsetDateTime;

use crate::orderbook::OrderBook;

/// How a feed obtains its data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Transport {
    /// Persistent socket with a background writer.
    Streaming,
    /// REST calls behind a TTL cache.
    Polled,
    /// In-process fixture data.
    Simulated,
}

/// Last traded (or mid) price for one symbol on one venue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticker {
    /// Normalized symbol (BASE/QUOTE).
    pub symbol: String,
    /// Reference price.
    pub price: Decimal,
    /// When the venue produced this quote, if known.
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub timestamp: Option<OffsetDateTime>,
    /// Best bid, when the venue publishes one alongside the price.
    #[serde(default)]
    pub bid: Option<Decimal>,
    /// Best ask, when the venue publishes one alongside the price.
    #[serde(default)]
    pub ask: Option<Decimal>,
    /// 24h volume in quote currency.
    #[serde(default)]
    pub quote_volume: Option<Decimal>,
    /// Market capitalization in quote currency.
    #[serde(default)]
    pub market_cap: Option<Decimal>,
}

impl Ticker {
    /// Create a ticker with only a price.
    pub fn new(symbol: impl Into<String>, price: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            price,
            timestamp: None,
            bid: None,
            ask: None,
            quote_volume: None,
            market_cap: None,
        }
    }

    /// Set the quote timestamp.
    pub fn at(mut self, timestamp: OffsetDateTime) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Set the 24h quote volume.
    pub fn with_quote_volume(mut self, volume: Decimal) -> Self {
        self.quote_volume = Some(volume);
        self
    }

    /// Set the market capitalization.
    pub fn with_market_cap(mut self, market_cap: Decimal) -> Self {
        self.market_cap = Some(market_cap);
        self
    }

    /// Age of the quote relative to `now`; `None` when the timestamp is unknown.
    ///
    /// Quotes stamped in the future report zero age.
    pub fn age(&self, now: OffsetDateTime) -> Option<Duration> {
        let ts = self.timestamp?;
        Some(Duration::try_from(now - ts).unwrap_or(Duration::ZERO))
    }
}

/// One decoded update from a streaming venue.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedUpdate {
    /// Replace the ticker for its symbol.
    Ticker(Ticker),
    /// Replace the book for its symbol.
    Book(OrderBook),
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use time::macros::datetime;

    #[test]
    fn ticker_age() {
        let now = datetime!(2024-01-01 00:00:10 UTC);
        let ticker = Ticker::new("BTC/USDT", dec!(100)).at(datetime!(2024-01-01 00:00:07 UTC));

        assert_eq!(ticker.age(now), Some(Duration::from_secs(3)));
        assert_eq!(Ticker::new("BTC/USDT", dec!(100)).age(now), None);
    }

    #[test]
    fn future_timestamp_has_zero_age() {
        let now = datetime!(2024-01-01 00:00:00 UTC);
        let ticker = Ticker::new("BTC/USDT", dec!(100)).at(datetime!(2024-01-01 00:00:02 UTC));

        assert_eq!(ticker.age(now), Some(Duration::ZERO));
    }

    #[test]
    fn transport_display() {
        assert_eq!(Transport::Streaming.to_string(), "streaming");
        assert_eq!("polled".parse::<Transport>().unwrap(), Transport::Polled);
    }
}
