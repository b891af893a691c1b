//! Exchange data feeds.
//!
//! Every venue is exposed through [`ExchangeFeed`]. Two transport families
//! implement it:
//! - [`StreamingFeed`]: a background task keeps a socket open and replaces
//!   whole snapshots in a concurrent map
//! - [`PolledFeed`]: REST calls behind short TTL caches, optionally preferring
//!   a registered streaming feed for the same venue
//!
//! [`FeedRegistry`] maps venue names to live feeds.

pub mod capability;
pub mod mock;
pub mod registry;
pub mod rest;
pub mod symbol;
pub mod types;
pub mod venues;
pub mod websocket;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::FeedError;
use crate::orderbook::OrderBook;

pub use capability::{CapabilityPolicy, CurrencyDetails, NetworkInfo, TransferAction};
pub use mock::{MockConfig, MockFeed};
pub use registry::FeedRegistry;
pub use rest::{PolledFeed, PolledFeedConfig, VenueRestApi};
pub use types::{FeedUpdate, Ticker, Transport};
pub use websocket::{ReconnectConfig, StreamingFeed, VenueCodec};

/// Uniform snapshot interface over one venue.
#[async_trait]
pub trait ExchangeFeed: Send + Sync {
    /// Venue name (lowercase).
    fn venue(&self) -> &str;

    /// How this feed obtains data.
    fn transport(&self) -> Transport;

    /// Current tickers keyed by normalized symbol.
    async fn get_tickers(&self) -> Result<HashMap<String, Ticker>, FeedError>;

    /// Order book for a symbol in any spelling, at most `depth` levels per side.
    async fn get_order_book(&self, symbol: &str, depth: usize) -> Result<OrderBook, FeedError>;

    /// Venue currency metadata for a base asset, when the venue exposes it.
    async fn get_currency_details(
        &self,
        _base_asset: &str,
    ) -> Result<Option<CurrencyDetails>, FeedError> {
        Ok(None)
    }

    /// Whether the base asset can be withdrawn; `None` when undeterminable.
    async fn supports_withdraw(&self, base_asset: &str) -> Result<Option<bool>, FeedError> {
        Ok(self
            .get_currency_details(base_asset)
            .await?
            .and_then(|details| details.withdraw_enabled()))
    }

    /// Whether the base asset can be deposited; `None` when undeterminable.
    async fn supports_deposit(&self, base_asset: &str) -> Result<Option<bool>, FeedError> {
        Ok(self
            .get_currency_details(base_asset)
            .await?
            .and_then(|details| details.deposit_enabled()))
    }

    /// Stop background work. Idempotent.
    async fn stop(&self) {}
}
