//! Streaming feed: one background task per venue socket.
//!
//! Features:
//! - Automatic reconnection with exponential backoff
//! - Venue-specific frame decoding behind [`VenueCodec`] (JSON, gzip, protobuf)
//! - Optional application-level heartbeat
//! - Whole-value snapshot replacement so readers never see a half-applied update

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::symbol;
use super::types::{FeedUpdate, Ticker, Transport};
use super::ExchangeFeed;
use crate::config::Config;
use crate::error::{FeedError, WsError};
use crate::metrics;
use crate::orderbook::OrderBook;

/// One raw frame handed to a codec.
#[derive(Debug, Clone, Copy)]
pub enum Frame<'a> {
    /// UTF-8 text frame.
    Text(&'a str),
    /// Binary frame (gzip, protobuf, ...).
    Binary(&'a [u8]),
}

/// Result of decoding one frame.
#[derive(Debug, Default, PartialEq)]
pub struct Decoded {
    /// Snapshot replacements to apply.
    pub updates: Vec<FeedUpdate>,
    /// Text frame to send back (pong replies).
    pub reply: Option<String>,
}

impl Decoded {
    /// A frame carrying nothing to apply (acks, pongs).
    pub fn empty() -> Self {
        Self::default()
    }

    /// A frame carrying updates.
    pub fn updates(updates: Vec<FeedUpdate>) -> Self {
        Self {
            updates,
            reply: None,
        }
    }

    /// A frame that must be answered.
    pub fn reply(reply: String) -> Self {
        Self {
            updates: Vec::new(),
            reply: Some(reply),
        }
    }
}

/// Venue wire protocol: where to connect, what to subscribe, how to decode.
pub trait VenueCodec: Send + Sync + 'static {
    /// Venue name (lowercase).
    fn venue(&self) -> &'static str;

    /// Socket URL for the given normalized symbols.
    fn url(&self, symbols: &[String]) -> String;

    /// Text frames sent right after connecting.
    fn subscriptions(&self, symbols: &[String]) -> Vec<String>;

    /// Application-level ping: interval and payload.
    fn heartbeat(&self) -> Option<(Duration, String)> {
        None
    }

    /// Decode one frame. Errors drop the frame only.
    fn decode(&self, frame: Frame<'_>) -> Result<Decoded, WsError>;
}

/// Reconnection configuration for WebSocket.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Initial backoff delay in milliseconds.
    pub initial_delay_ms: u64,
    /// Maximum backoff delay in seconds.
    pub max_delay_s: u64,
    /// Backoff multiplier (e.g., 2.0 for exponential).
    pub backoff_multiplier: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 1000,
            max_delay_s: 60,
            backoff_multiplier: 2.0,
        }
    }
}

impl ReconnectConfig {
    /// Create from config values.
    pub fn from_config(config: &Config) -> Self {
        Self {
            initial_delay_ms: config.ws_reconnect_initial_ms,
            max_delay_s: config.ws_reconnect_max_delay_s,
            ..Default::default()
        }
    }

    /// Calculate next delay with exponential backoff.
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(32) as i32;
        let delay_ms = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(exponent);
        let max_delay_ms = self.max_delay_s * 1000;
        let clamped_ms = delay_ms.min(max_delay_ms as f64) as u64;
        Duration::from_millis(clamped_ms)
    }
}

/// Latest snapshots written by the feed task and read by everyone else.
#[derive(Debug, Default)]
pub struct SnapshotCache {
    tickers: DashMap<String, Ticker>,
    books: DashMap<String, OrderBook>,
}

impl SnapshotCache {
    /// Replace the stored value for the update's symbol.
    pub fn apply(&self, update: FeedUpdate) {
        match update {
            FeedUpdate::Ticker(ticker) => {
                self.tickers.insert(ticker.symbol.clone(), ticker);
            }
            FeedUpdate::Book(book) => {
                self.books.insert(book.symbol.clone(), book);
            }
        }
    }

    /// Copy of every ticker.
    pub fn tickers(&self) -> HashMap<String, Ticker> {
        self.tickers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Copy of one book.
    pub fn book(&self, symbol: &str) -> Option<OrderBook> {
        self.books.get(symbol).map(|b| b.clone())
    }
}

/// Streaming [`ExchangeFeed`] backed by a [`VenueCodec`].
pub struct StreamingFeed<C: VenueCodec> {
    codec: Arc<C>,
    cache: Arc<SnapshotCache>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
    stop_timeout: Duration,
    reconnects: Arc<AtomicU64>,
}

impl<C: VenueCodec> StreamingFeed<C> {
    /// Spawn the background task. Must be called inside a Tokio runtime.
    pub fn spawn(
        codec: C,
        symbols: Vec<String>,
        reconnect: ReconnectConfig,
        stop_timeout: Duration,
    ) -> Self {
        let codec = Arc::new(codec);
        let cache = Arc::new(SnapshotCache::default());
        let cancel = CancellationToken::new();
        let reconnects = Arc::new(AtomicU64::new(0));

        let symbols: Vec<String> = symbols
            .iter()
            .filter_map(|s| symbol::normalize(s))
            .collect();

        let handle = tokio::spawn(run_feed(
            codec.clone(),
            cache.clone(),
            symbols,
            reconnect,
            cancel.clone(),
            reconnects.clone(),
        ));

        Self {
            codec,
            cache,
            cancel,
            task: Mutex::new(Some(handle)),
            stop_timeout,
            reconnects,
        }
    }

    /// Spawn using reconnect and stop settings from config.
    pub fn from_config(codec: C, config: &Config) -> Self {
        Self::spawn(
            codec,
            config.stream_symbols.clone(),
            ReconnectConfig::from_config(config),
            Duration::from_millis(config.ws_stop_timeout_ms),
        )
    }

    /// Number of reconnect attempts so far.
    pub fn reconnect_attempts(&self) -> u64 {
        self.reconnects.load(Ordering::SeqCst)
    }

    /// Snapshot cache (read side).
    pub fn cache(&self) -> &SnapshotCache {
        &self.cache
    }
}

#[async_trait]
impl<C: VenueCodec> ExchangeFeed for StreamingFeed<C> {
    fn venue(&self) -> &str {
        self.codec.venue()
    }

    fn transport(&self) -> Transport {
        Transport::Streaming
    }

    async fn get_tickers(&self) -> Result<HashMap<String, Ticker>, FeedError> {
        Ok(self.cache.tickers())
    }

    async fn get_order_book(&self, symbol: &str, depth: usize) -> Result<OrderBook, FeedError> {
        let normalized = symbol::normalize(symbol).unwrap_or_else(|| symbol.to_uppercase());
        self.cache
            .book(&normalized)
            .map(|book| book.truncated(depth))
            .ok_or_else(|| FeedError::SymbolNotFound {
                venue: self.codec.venue().to_string(),
                symbol: normalized,
            })
    }

    async fn stop(&self) {
        self.cancel.cancel();

        let Some(mut handle) = self.task.lock().await.take() else {
            return;
        };

        if tokio::time::timeout(self.stop_timeout, &mut handle).await.is_err() {
            warn!(venue = self.codec.venue(), "Feed task did not stop in time, aborting");
            handle.abort();
        }

        info!(
            venue = self.codec.venue(),
            reconnects = self.reconnect_attempts(),
            "Streaming feed stopped"
        );
    }
}

impl<C: VenueCodec> Drop for StreamingFeed<C> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Reconnect loop. Exits promptly on cancellation, including mid-backoff.
async fn run_feed<C: VenueCodec>(
    codec: Arc<C>,
    cache: Arc<SnapshotCache>,
    symbols: Vec<String>,
    reconnect: ReconnectConfig,
    cancel: CancellationToken,
    reconnects: Arc<AtomicU64>,
) {
    let venue = codec.venue();
    let mut attempt = 0u32;

    loop {
        info!(venue, attempt, "Attempting WebSocket connection");

        let outcome = tokio::select! {
            _ = cancel.cancelled() => break,
            outcome = stream_once(codec.as_ref(), &cache, &symbols) => outcome,
        };

        match outcome {
            Ok(()) => {
                attempt = 0; // Connected at least once; restart the backoff
                warn!(venue, "WebSocket stream ended, will reconnect");
            }
            Err(e) => {
                error!(venue, error = %e, attempt, "WebSocket connection failed");
            }
        }

        let delay = reconnect.next_delay(attempt);
        reconnects.fetch_add(1, Ordering::SeqCst);
        metrics::inc_ws_reconnects(venue);

        info!(venue, delay_ms = delay.as_millis() as u64, "Reconnecting after delay");
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }

        attempt = attempt.saturating_add(1);
    }

    debug!(venue, "Feed task exiting");
}

/// One connection lifetime. `Ok` once the socket was established and later closed.
async fn stream_once<C: VenueCodec>(
    codec: &C,
    cache: &SnapshotCache,
    symbols: &[String],
) -> Result<(), WsError> {
    let venue = codec.venue();
    let url = codec.url(symbols);

    info!(venue, url = %url, symbols = ?symbols, "Connecting to WebSocket");

    let (ws_stream, _) = connect_async(&url)
        .await
        .map_err(|e| WsError::ConnectionFailed(e.to_string()))?;

    let (mut write, mut read) = ws_stream.split();

    let subscriptions = codec.subscriptions(symbols);
    let count = subscriptions.len();
    for msg in subscriptions {
        write
            .send(Message::Text(msg))
            .await
            .map_err(|e| WsError::SendFailed(e.to_string()))?;
    }
    info!(venue, subscriptions = count, "Subscribed");

    let heartbeat = codec.heartbeat();
    let mut ticker = heartbeat.as_ref().map(|(period, _)| {
        tokio::time::interval_at(tokio::time::Instant::now() + *period, *period)
    });

    loop {
        let msg = tokio::select! {
            msg = read.next() => msg,
            _ = next_tick(&mut ticker) => {
                if let Some((_, payload)) = &heartbeat {
                    write
                        .send(Message::Text(payload.clone()))
                        .await
                        .map_err(|e| WsError::SendFailed(e.to_string()))?;
                }
                continue;
            }
        };

        let reply = match msg {
            None => return Ok(()),
            Some(Err(e)) => {
                warn!(venue, error = %e, "WebSocket read error");
                return Ok(());
            }
            Some(Ok(Message::Text(text))) => handle_frame(codec, cache, Frame::Text(&text)),
            Some(Ok(Message::Binary(bytes))) => handle_frame(codec, cache, Frame::Binary(&bytes)),
            Some(Ok(Message::Close(frame))) => {
                warn!(venue, frame = ?frame, "WebSocket closed");
                return Ok(());
            }
            // tungstenite answers protocol pings itself
            Some(Ok(_)) => None,
        };

        if let Some(reply) = reply {
            write
                .send(Message::Text(reply))
                .await
                .map_err(|e| WsError::SendFailed(e.to_string()))?;
        }
    }
}

async fn next_tick(interval: &mut Option<tokio::time::Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

/// Decode one frame into the cache. Undecodable frames are dropped.
pub fn handle_frame<C: VenueCodec>(
    codec: &C,
    cache: &SnapshotCache,
    frame: Frame<'_>,
) -> Option<String> {
    let venue = codec.venue();
    let start = Instant::now();
    metrics::inc_ws_messages_received(venue);

    match codec.decode(frame) {
        Ok(decoded) => {
            for update in decoded.updates {
                cache.apply(update);
            }
            metrics::record_ws_message_latency(start, venue);
            decoded.reply
        }
        Err(e) => {
            debug!(venue, error = %e, "Dropping undecodable frame");
            metrics::inc_ws_decode_failures(venue);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    use crate::orderbook::PriceLevel;

    /// Codec for `SYMBOL=PRICE` text frames against an unreachable host.
    struct LineCodec;

    impl VenueCodec for LineCodec {
        fn venue(&self) -> &'static str {
            "line"
        }

        fn url(&self, _symbols: &[String]) -> String {
            "ws://127.0.0.1:1/ws".to_string()
        }

        fn subscriptions(&self, _symbols: &[String]) -> Vec<String> {
            Vec::new()
        }

        fn decode(&self, frame: Frame<'_>) -> Result<Decoded, WsError> {
            let Frame::Text(text) = frame else {
                return Err(WsError::Decode("binary".to_string()));
            };
            if text == "ping" {
                return Ok(Decoded::reply("pong".to_string()));
            }
            let (sym, price) = text
                .split_once('=')
                .ok_or_else(|| WsError::Decode(text.to_string()))?;
            let price = price
                .parse()
                .map_err(|_| WsError::Decode(text.to_string()))?;
            Ok(Decoded::updates(vec![FeedUpdate::Ticker(Ticker::new(sym, price))]))
        }
    }

    #[test]
    fn reconnect_backoff_doubles_and_caps() {
        let config = ReconnectConfig::default();

        assert_eq!(config.next_delay(0), Duration::from_secs(1));
        assert_eq!(config.next_delay(1), Duration::from_secs(2));
        assert_eq!(config.next_delay(5), Duration::from_secs(32));
        assert_eq!(config.next_delay(6), Duration::from_secs(60));
        assert_eq!(config.next_delay(u32::MAX), Duration::from_secs(60));
    }

    #[test]
    fn handle_frame_applies_updates_and_drops_garbage() {
        let cache = SnapshotCache::default();

        assert_eq!(handle_frame(&LineCodec, &cache, Frame::Text("BTC/USDT=100")), None);
        assert_eq!(handle_frame(&LineCodec, &cache, Frame::Text("garbage")), None);
        assert_eq!(handle_frame(&LineCodec, &cache, Frame::Binary(&[1, 2, 3])), None);
        assert_eq!(handle_frame(&LineCodec, &cache, Frame::Text("BTC/USDT=101")), None);

        let tickers = cache.tickers();
        assert_eq!(tickers.len(), 1);
        assert_eq!(tickers["BTC/USDT"].price, dec!(101));
    }

    #[test]
    fn handle_frame_returns_reply() {
        let cache = SnapshotCache::default();
        assert_eq!(
            handle_frame(&LineCodec, &cache, Frame::Text("ping")),
            Some("pong".to_string())
        );
    }

    #[test]
    fn cache_replaces_whole_books() {
        let cache = SnapshotCache::default();
        cache.apply(FeedUpdate::Book(OrderBook::from_levels(
            "BTC/USDT",
            vec![PriceLevel::new(dec!(99), dec!(1))],
            vec![PriceLevel::new(dec!(101), dec!(1))],
        )));
        cache.apply(FeedUpdate::Book(OrderBook::from_levels(
            "BTC/USDT",
            vec![PriceLevel::new(dec!(98), dec!(2))],
            Vec::new(),
        )));

        let book = cache.book("BTC/USDT").unwrap();
        assert_eq!(book.best_bid(), Some(dec!(98)));
        assert!(book.asks.is_empty());
    }

    #[tokio::test]
    async fn stop_is_bounded_and_idempotent() {
        let feed = StreamingFeed::spawn(
            LineCodec,
            vec!["BTC/USDT".to_string()],
            ReconnectConfig::default(),
            Duration::from_secs(2),
        );

        let stopped = tokio::time::timeout(Duration::from_secs(3), feed.stop()).await;
        assert!(stopped.is_ok());

        // Second stop is a no-op
        let stopped = tokio::time::timeout(Duration::from_millis(100), feed.stop()).await;
        assert!(stopped.is_ok());
    }

    #[tokio::test]
    async fn drop_without_stop_ends_task() {
        let feed = StreamingFeed::spawn(
            LineCodec,
            Vec::new(),
            ReconnectConfig::default(),
            Duration::from_secs(2),
        );
        let cancel = feed.cancel.clone();
        let handle = feed.task.lock().await.take().unwrap();

        drop(feed);

        assert!(cancel.is_cancelled());
        let finished = tokio::time::timeout(Duration::from_secs(3), handle).await;
        assert!(matches!(finished, Ok(Ok(()))));
    }

    #[tokio::test]
    async fn failed_connects_count_reconnects() {
        let feed = StreamingFeed::spawn(
            LineCodec,
            Vec::new(),
            ReconnectConfig {
                initial_delay_ms: 1,
                max_delay_s: 1,
                backoff_multiplier: 1.0,
            },
            Duration::from_secs(2),
        );

        let counted = tokio::time::timeout(Duration::from_secs(5), async {
            while feed.reconnect_attempts() < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;

        assert!(counted.is_ok());
        feed.stop().await;
    }

    #[tokio::test]
    async fn missing_book_is_symbol_not_found() {
        let feed = StreamingFeed::spawn(
            LineCodec,
            Vec::new(),
            ReconnectConfig::default(),
            Duration::from_secs(2),
        );

        let result = feed.get_order_book("ETHUSDT", 5).await;
        assert!(matches!(
            result,
            Err(FeedError::SymbolNotFound { ref symbol, .. }) if symbol == "ETH/USDT"
        ));

        feed.stop().await;
    }
}
