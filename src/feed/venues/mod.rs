//! Per-venue wire protocols and the constructors that turn venue names into feeds.

pub mod binance;
pub mod htx;
pub mod mexc;

use std::sync::Arc;

use crate::config::Config;
use crate::error::FeedError;

use super::registry::FeedRegistry;
use super::rest::{PolledFeed, PolledFeedConfig};
use super::websocket::StreamingFeed;
use super::ExchangeFeed;

pub use binance::{BinanceCodec, BinanceRest};
pub use htx::HtxCodec;
pub use mexc::MexcCodec;

/// Venues with a streaming implementation.
pub const STREAMING_VENUES: &[&str] = &["binance", "mexc", "htx"];

/// Venues with a REST implementation.
pub const POLLED_VENUES: &[&str] = &["binance"];

/// Lowercase venue name with aliases resolved.
pub fn canonical_venue(venue: &str) -> String {
    match venue.trim().to_lowercase().as_str() {
        "huobi" => "htx".to_string(),
        other => other.to_string(),
    }
}

/// Spawn a streaming feed for a venue name. Requires a Tokio runtime.
pub fn streaming_feed(venue: &str, config: &Config) -> Result<Arc<dyn ExchangeFeed>, FeedError> {
    let feed: Arc<dyn ExchangeFeed> = match canonical_venue(venue).as_str() {
        "binance" => Arc::new(StreamingFeed::from_config(BinanceCodec, config)),
        "mexc" => Arc::new(StreamingFeed::from_config(MexcCodec, config)),
        "htx" => Arc::new(StreamingFeed::from_config(HtxCodec, config)),
        other => return Err(FeedError::UnknownVenue(other.to_string())),
    };
    Ok(feed)
}

/// Build a REST-polled feed for a venue name.
///
/// With `registry`, the feed prefers a streaming feed registered under the same venue.
pub fn polled_feed(
    venue: &str,
    config: &Config,
    registry: Option<Arc<FeedRegistry>>,
) -> Result<Arc<dyn ExchangeFeed>, FeedError> {
    let feed_config = PolledFeedConfig::from_config(config);
    let feed: Arc<dyn ExchangeFeed> = match canonical_venue(venue).as_str() {
        "binance" => Arc::new(PolledFeed::new(BinanceRest::new(config)?, feed_config, registry)),
        other => return Err(FeedError::UnknownVenue(other.to_string())),
    };
    Ok(feed)
}
