//! REST-polled feed with TTL caches and optional streaming preference.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, instrument, warn};

use super::capability::CurrencyDetails;
use super::registry::FeedRegistry;
use super::symbol;
use super::types::{Ticker, Transport};
use super::ExchangeFeed;
use crate::config::Config;
use crate::error::FeedError;
use crate::metrics;
use crate::orderbook::OrderBook;
use crate::utils::secs_f64;

/// Raw venue REST endpoints wrapped by [`PolledFeed`].
#[async_trait]
pub trait VenueRestApi: Send + Sync + 'static {
    /// Venue name (lowercase).
    fn venue(&self) -> &str;

    /// All tickers keyed by normalized symbol.
    async fn fetch_tickers(&self) -> Result<HashMap<String, Ticker>, FeedError>;

    /// One book in venue spelling at one depth limit.
    async fn fetch_order_book(&self, venue_symbol: &str, limit: usize) -> Result<OrderBook, FeedError>;

    /// Spellings to try for a normalized symbol, in order.
    fn symbol_spellings(&self, symbol: &str) -> Vec<String> {
        symbol::spellings(symbol)
    }

    /// Depth limits the venue accepts, ascending.
    fn depth_limits(&self) -> &[usize] {
        &[5, 10, 20, 50, 100]
    }

    /// Currency metadata keyed by uppercase asset; `None` when unsupported.
    async fn fetch_currencies(&self) -> Result<Option<HashMap<String, CurrencyDetails>>, FeedError> {
        Ok(None)
    }
}

/// Cache and fallback settings for a polled feed.
#[derive(Debug, Clone)]
pub struct PolledFeedConfig {
    /// Ticker cache lifetime.
    pub ticker_ttl: Duration,
    /// Currency metadata cache lifetime.
    pub currency_ttl: Duration,
    /// Prefer a registered streaming feed for this venue.
    pub prefer_stream: bool,
    /// Never fall back to REST when streaming is preferred.
    pub strict: bool,
}

impl Default for PolledFeedConfig {
    fn default() -> Self {
        Self {
            ticker_ttl: Duration::from_secs(1),
            currency_ttl: Duration::from_secs(300),
            prefer_stream: false,
            strict: false,
        }
    }
}

impl PolledFeedConfig {
    /// Create from config values.
    pub fn from_config(config: &Config) -> Self {
        Self {
            ticker_ttl: secs_f64(config.ticker_cache_ttl_seconds),
            currency_ttl: secs_f64(config.currency_cache_ttl_seconds),
            prefer_stream: config.use_websocket_feed,
            strict: config.strict_feed_only,
        }
    }
}

#[derive(Debug, Clone)]
struct Cached<T> {
    value: T,
    fetched_at: tokio::time::Instant,
}

impl<T: Clone> Cached<T> {
    fn fresh(&self, ttl: Duration) -> Option<T> {
        (self.fetched_at.elapsed() < ttl).then(|| self.value.clone())
    }
}

type CurrencyMap = HashMap<String, CurrencyDetails>;

/// One currency fetch, awaited by every caller that missed the cache while it runs.
type CurrencyRefresh = Shared<BoxFuture<'static, Result<Option<CurrencyMap>, Arc<FeedError>>>>;

/// [`ExchangeFeed`] over a venue REST API.
pub struct PolledFeed<A: VenueRestApi> {
    api: Arc<A>,
    config: PolledFeedConfig,
    registry: Option<Arc<FeedRegistry>>,
    tickers: RwLock<Option<Cached<HashMap<String, Ticker>>>>,
    currencies: Arc<RwLock<Option<Cached<CurrencyMap>>>>,
    currency_refresh: Mutex<Option<CurrencyRefresh>>,
}

impl<A: VenueRestApi> PolledFeed<A> {
    /// Wrap a REST API.
    pub fn new(api: A, config: PolledFeedConfig, registry: Option<Arc<FeedRegistry>>) -> Self {
        Self {
            api: Arc::new(api),
            config,
            registry,
            tickers: RwLock::new(None),
            currencies: Arc::new(RwLock::new(None)),
            currency_refresh: Mutex::new(None),
        }
    }

    /// The registered streaming feed for this venue, if preference is on.
    fn streaming_peer(&self) -> Option<Arc<dyn ExchangeFeed>> {
        if !self.config.prefer_stream {
            return None;
        }
        self.registry
            .as_ref()?
            .get(self.api.venue())
            .filter(|feed| feed.transport() == Transport::Streaming)
    }

    /// Depth limits to try: smallest accepted limit covering `depth`, then smaller ones.
    fn limits_for(&self, depth: usize) -> Vec<usize> {
        let accepted = self.api.depth_limits();
        let start = accepted
            .iter()
            .position(|&limit| limit >= depth)
            .unwrap_or_else(|| accepted.len().saturating_sub(1));
        let mut limits: Vec<usize> = accepted.iter().take(start + 1).copied().collect();
        limits.reverse();
        if limits.is_empty() {
            limits.push(depth);
        }
        limits
    }

    async fn cached_currencies(&self) -> Result<Option<CurrencyMap>, FeedError> {
        if let Some(cached) = self.currencies.read().await.as_ref() {
            if let Some(value) = cached.fresh(self.config.currency_ttl) {
                return Ok(Some(value));
            }
        }

        match self.currency_refresh().await.await {
            Ok(currencies) => Ok(currencies),
            Err(e) => match self.currencies.read().await.as_ref() {
                Some(stale) => {
                    warn!(venue = self.api.venue(), error = %e, "Currency fetch failed, serving cache");
                    metrics::inc_rest_cache_fallbacks(self.api.venue());
                    Ok(Some(stale.value.clone()))
                }
                None => Err(FeedError::RequestFailed {
                    venue: self.api.venue().to_string(),
                    reason: e.to_string(),
                }),
            },
        }
    }

    /// The running currency fetch, or a newly started one.
    ///
    /// The fetch is its own task and fills the cache when it lands, so a caller
    /// dropped by a deadline neither cancels it nor causes a second request.
    async fn currency_refresh(&self) -> CurrencyRefresh {
        let mut inflight = self.currency_refresh.lock().await;
        if let Some(refresh) = inflight.as_ref() {
            if refresh.clone().now_or_never().is_none() {
                return refresh.clone();
            }
        }

        let api = self.api.clone();
        let cache = self.currencies.clone();
        let task = tokio::spawn(async move {
            let result = api.fetch_currencies().await;
            if let Ok(Some(currencies)) = &result {
                *cache.write().await = Some(Cached {
                    value: currencies.clone(),
                    fetched_at: tokio::time::Instant::now(),
                });
            }
            result.map_err(Arc::new)
        });

        let venue = self.api.venue().to_string();
        let refresh = async move {
            task.await.unwrap_or_else(|e| {
                Err(Arc::new(FeedError::RequestFailed {
                    venue,
                    reason: e.to_string(),
                }))
            })
        }
        .boxed()
        .shared();

        debug!(venue = self.api.venue(), "Refreshing currency metadata");
        *inflight = Some(refresh.clone());
        refresh
    }
}

#[async_trait]
impl<A: VenueRestApi> ExchangeFeed for PolledFeed<A> {
    fn venue(&self) -> &str {
        self.api.venue()
    }

    fn transport(&self) -> Transport {
        Transport::Polled
    }

    #[instrument(skip(self), fields(venue = self.api.venue()))]
    async fn get_tickers(&self) -> Result<HashMap<String, Ticker>, FeedError> {
        if self.config.prefer_stream {
            if let Some(peer) = self.streaming_peer() {
                match peer.get_tickers().await {
                    Ok(snapshot) if !snapshot.is_empty() => return Ok(snapshot),
                    Ok(_) => debug!("Streaming snapshot empty"),
                    Err(e) => debug!(error = %e, "Streaming snapshot unavailable"),
                }
            }
            if self.config.strict {
                return Ok(HashMap::new());
            }
        }

        if let Some(cached) = self.tickers.read().await.as_ref() {
            if let Some(value) = cached.fresh(self.config.ticker_ttl) {
                return Ok(value);
            }
        }

        match self.api.fetch_tickers().await {
            Ok(tickers) => {
                *self.tickers.write().await = Some(Cached {
                    value: tickers.clone(),
                    fetched_at: tokio::time::Instant::now(),
                });
                Ok(tickers)
            }
            Err(e) => match self.tickers.read().await.as_ref() {
                Some(stale) => {
                    warn!(error = %e, "Ticker fetch failed, serving cache");
                    metrics::inc_rest_cache_fallbacks(self.api.venue());
                    Ok(stale.value.clone())
                }
                None => Err(e),
            },
        }
    }

    #[instrument(skip(self), fields(venue = self.api.venue()))]
    async fn get_order_book(&self, symbol: &str, depth: usize) -> Result<OrderBook, FeedError> {
        let normalized = symbol::normalize(symbol).unwrap_or_else(|| symbol.to_uppercase());

        if self.config.prefer_stream {
            if let Some(peer) = self.streaming_peer() {
                match peer.get_order_book(&normalized, depth).await {
                    Ok(book) if !book.is_empty() => return Ok(book),
                    Ok(_) => debug!("Streaming book empty"),
                    Err(e) => debug!(error = %e, "Streaming book unavailable"),
                }
            }
            if self.config.strict {
                return Ok(OrderBook::empty(normalized));
            }
        }

        let start = Instant::now();
        let limits = self.limits_for(depth);
        let mut last_error = None;

        'spellings: for spelling in self.api.symbol_spellings(&normalized) {
            for &limit in &limits {
                match self.api.fetch_order_book(&spelling, limit).await {
                    Ok(mut book) => {
                        metrics::record_orderbook_fetch_latency(start, self.api.venue());
                        book.symbol = normalized;
                        return Ok(book.truncated(depth));
                    }
                    Err(e @ FeedError::DepthRejected { .. }) => {
                        debug!(spelling = %spelling, limit, "Depth rejected, retrying smaller");
                        last_error = Some(e);
                    }
                    Err(e @ FeedError::SymbolNotFound { .. }) => {
                        debug!(spelling = %spelling, "Spelling not listed");
                        last_error = Some(e);
                        continue 'spellings;
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        Err(last_error.unwrap_or(FeedError::SymbolNotFound {
            venue: self.api.venue().to_string(),
            symbol: normalized,
        }))
    }

    async fn get_currency_details(
        &self,
        base_asset: &str,
    ) -> Result<Option<CurrencyDetails>, FeedError> {
        let asset = base_asset.trim().to_uppercase();
        Ok(self
            .cached_currencies()
            .await?
            .and_then(|mut currencies| currencies.remove(&asset)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use rust_decimal_macros::dec;

    use crate::feed::mock::MockFeed;
    use crate::orderbook::PriceLevel;
    use crate::utils::call_with_deadline;

    /// Scripted REST API that records every call.
    #[derive(Default)]
    struct ScriptedApi {
        ticker_calls: AtomicUsize,
        currency_calls: AtomicUsize,
        currency_latency: Option<Duration>,
        fail_tickers: std::sync::atomic::AtomicBool,
        book_calls: Mutex<Vec<(String, usize)>>,
        listed_spelling: &'static str,
        max_limit: usize,
    }

    #[async_trait]
    impl VenueRestApi for ScriptedApi {
        fn venue(&self) -> &str {
            "scripted"
        }

        async fn fetch_tickers(&self) -> Result<HashMap<String, Ticker>, FeedError> {
            let n = self.ticker_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_tickers.load(Ordering::SeqCst) {
                return Err(FeedError::RequestFailed {
                    venue: "scripted".to_string(),
                    reason: "down".to_string(),
                });
            }
            let price = dec!(100) + rust_decimal::Decimal::from(n);
            Ok(HashMap::from([(
                "BTC/USDT".to_string(),
                Ticker::new("BTC/USDT", price),
            )]))
        }

        async fn fetch_order_book(&self, venue_symbol: &str, limit: usize) -> Result<OrderBook, FeedError> {
            self.book_calls
                .lock()
                .unwrap()
                .push((venue_symbol.to_string(), limit));
            if venue_symbol != self.listed_spelling {
                return Err(FeedError::SymbolNotFound {
                    venue: "scripted".to_string(),
                    symbol: venue_symbol.to_string(),
                });
            }
            if limit > self.max_limit {
                return Err(FeedError::DepthRejected {
                    venue: "scripted".to_string(),
                    limit,
                });
            }
            Ok(OrderBook::from_levels(
                venue_symbol,
                vec![PriceLevel::new(dec!(99), dec!(1))],
                vec![PriceLevel::new(dec!(101), dec!(1))],
            ))
        }

        async fn fetch_currencies(&self) -> Result<Option<HashMap<String, CurrencyDetails>>, FeedError> {
            let Some(latency) = self.currency_latency else {
                return Ok(None);
            };
            self.currency_calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(latency).await;
            Ok(Some(HashMap::from([(
                "BTC".to_string(),
                CurrencyDetails {
                    withdraw: Some(true),
                    deposit: Some(false),
                    ..Default::default()
                },
            )])))
        }
    }

    fn api(listed: &'static str, max_limit: usize) -> ScriptedApi {
        ScriptedApi {
            listed_spelling: listed,
            max_limit,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn tickers_are_cached_within_ttl() {
        let feed = PolledFeed::new(api("BTCUSDT", 100), PolledFeedConfig::default(), None);

        let first = feed.get_tickers().await.unwrap();
        let second = feed.get_tickers().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(feed.api.ticker_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failure_serves_last_cache() {
        let config = PolledFeedConfig {
            ticker_ttl: Duration::ZERO,
            ..Default::default()
        };
        let feed = PolledFeed::new(api("BTCUSDT", 100), config, None);

        let first = feed.get_tickers().await.unwrap();
        feed.api.fail_tickers.store(true, Ordering::SeqCst);
        let second = feed.get_tickers().await.unwrap();

        assert_eq!(first["BTC/USDT"].price, second["BTC/USDT"].price);
        assert_eq!(feed.api.ticker_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failure_without_cache_is_an_error() {
        let feed = PolledFeed::new(api("BTCUSDT", 100), PolledFeedConfig::default(), None);
        feed.api.fail_tickers.store(true, Ordering::SeqCst);

        assert!(feed.get_tickers().await.is_err());
    }

    #[tokio::test]
    async fn order_book_tries_spellings_then_smaller_limits() {
        let feed = PolledFeed::new(api("BTC_USDT", 10), PolledFeedConfig::default(), None);

        let book = feed.get_order_book("btc/usdt", 20).await.unwrap();
        assert_eq!(book.symbol, "BTC/USDT");
        assert_eq!(book.best_ask(), Some(dec!(101)));

        let calls = feed.api.book_calls.lock().unwrap().clone();
        assert_eq!(
            calls,
            vec![
                ("BTC/USDT".to_string(), 20),
                ("BTCUSDT".to_string(), 20),
                ("BTC-USDT".to_string(), 20),
                ("BTC_USDT".to_string(), 20),
                ("BTC_USDT".to_string(), 10),
            ]
        );
    }

    #[tokio::test]
    async fn order_book_unlisted_everywhere_fails() {
        let feed = PolledFeed::new(api("NOPE", 100), PolledFeedConfig::default(), None);
        let result = feed.get_order_book("BTC/USDT", 5).await;
        assert!(matches!(result, Err(FeedError::SymbolNotFound { .. })));
    }

    #[test]
    fn limits_cover_requested_depth() {
        let feed = PolledFeed::new(api("BTCUSDT", 100), PolledFeedConfig::default(), None);
        assert_eq!(feed.limits_for(20), vec![20, 10, 5]);
        assert_eq!(feed.limits_for(7), vec![10, 5]);
        assert_eq!(feed.limits_for(1000), vec![100, 50, 20, 10, 5]);
    }

    /// Registry holding a streaming-flavoured mock under the REST venue's name.
    fn registry_with_stream(ticker_price: Option<rust_decimal::Decimal>) -> Arc<FeedRegistry> {
        let stream = MockFeed::new("scripted").with_transport(Transport::Streaming);
        if let Some(price) = ticker_price {
            stream.set_ticker("BTC/USDT", price);
        }
        let registry = Arc::new(FeedRegistry::new());
        registry.register("scripted", Arc::new(stream));
        registry
    }

    #[tokio::test]
    async fn prefers_streaming_snapshot() {
        let config = PolledFeedConfig {
            prefer_stream: true,
            ..Default::default()
        };
        let feed = PolledFeed::new(
            api("BTCUSDT", 100),
            config,
            Some(registry_with_stream(Some(dec!(555)))),
        );

        let tickers = feed.get_tickers().await.unwrap();
        assert_eq!(tickers["BTC/USDT"].price, dec!(555));
        assert_eq!(feed.api.ticker_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_stream_falls_back_unless_strict() {
        let lenient = PolledFeed::new(
            api("BTCUSDT", 100),
            PolledFeedConfig {
                prefer_stream: true,
                ..Default::default()
            },
            Some(registry_with_stream(None)),
        );
        assert_eq!(lenient.get_tickers().await.unwrap()["BTC/USDT"].price, dec!(100));

        let strict = PolledFeed::new(
            api("BTCUSDT", 100),
            PolledFeedConfig {
                prefer_stream: true,
                strict: true,
                ..Default::default()
            },
            Some(registry_with_stream(None)),
        );
        assert!(strict.get_tickers().await.unwrap().is_empty());
        assert!(strict.get_order_book("BTC/USDT", 5).await.unwrap().is_empty());
        assert_eq!(strict.api.ticker_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn currency_details_unsupported_is_none() {
        let feed = PolledFeed::new(api("BTCUSDT", 100), PolledFeedConfig::default(), None);
        assert_eq!(feed.get_currency_details("btc").await.unwrap(), None);
        assert_eq!(feed.supports_withdraw("btc").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_currency_fetch_is_shared_and_outlives_deadlines() {
        let feed = PolledFeed::new(
            ScriptedApi {
                currency_latency: Some(Duration::from_millis(800)),
                ..api("BTCUSDT", 100)
            },
            PolledFeedConfig::default(),
            None,
        );
        let deadline = Duration::from_millis(500);

        let mut answers = Vec::new();
        for _ in 0..5 {
            let (withdraw, deposit) = tokio::join!(
                call_with_deadline("withdraw", deadline, feed.supports_withdraw("BTC")),
                call_with_deadline("deposit", deadline, feed.supports_deposit("BTC")),
            );
            answers.push((withdraw.flatten(), deposit.flatten()));
        }

        // First round gives up at 500ms; the fetch lands at 800ms during the second
        assert_eq!(answers[0], (None, None));
        for answer in &answers[1..] {
            assert_eq!(*answer, (Some(true), Some(false)));
        }
        assert_eq!(feed.api.currency_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_currency_cache_refetches_once() {
        let feed = PolledFeed::new(
            ScriptedApi {
                currency_latency: Some(Duration::from_millis(10)),
                ..api("BTCUSDT", 100)
            },
            PolledFeedConfig {
                currency_ttl: Duration::from_secs(60),
                ..Default::default()
            },
            None,
        );

        assert_eq!(feed.supports_withdraw("btc").await.unwrap(), Some(true));
        assert_eq!(feed.supports_deposit("btc").await.unwrap(), Some(false));
        assert_eq!(feed.api.currency_calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(feed.supports_withdraw("btc").await.unwrap(), Some(true));
        assert_eq!(feed.api.currency_calls.load(Ordering::SeqCst), 2);
    }
}
