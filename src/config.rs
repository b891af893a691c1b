//! Application configuration loaded from environment variables.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::Deserialize;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // === Feed Caching ===
    /// Ticker cache lifetime for polled venues.
    #[serde(default = "default_ticker_ttl")]
    pub ticker_cache_ttl_seconds: f64,

    /// Currency metadata cache lifetime for polled venues.
    #[serde(default = "default_currency_ttl")]
    pub currency_cache_ttl_seconds: f64,

    /// Prefer a registered streaming feed over REST for the same venue.
    #[serde(default)]
    pub use_websocket_feed: bool,

    /// Never fall back to REST when the streaming snapshot is empty.
    #[serde(default)]
    pub strict_feed_only: bool,

    // === Feeds ===
    /// Venues to stream over WebSocket (binance, mexc, htx).
    #[serde(default = "default_stream_venues")]
    pub stream_venues: Vec<String>,

    /// Symbols subscribed on streaming venues, e.g. "BTC/USDT,ETH/USDT".
    #[serde(default = "default_stream_symbols")]
    pub stream_symbols: Vec<String>,

    /// Venues polled over REST.
    #[serde(default)]
    pub rest_venues: Vec<String>,

    /// Binance API key (enables currency metadata).
    #[serde(default)]
    pub binance_api_key: Option<String>,

    /// Binance API secret.
    #[serde(default)]
    pub binance_api_secret: Option<String>,

    /// Initial reconnect backoff.
    #[serde(default = "default_reconnect_initial_ms")]
    pub ws_reconnect_initial_ms: u64,

    /// Reconnect backoff cap.
    #[serde(default = "default_reconnect_max_delay")]
    pub ws_reconnect_max_delay_s: u64,

    /// How long stop() waits for a feed task before aborting it.
    #[serde(default = "default_stop_timeout_ms")]
    pub ws_stop_timeout_ms: u64,

    /// REST request timeout.
    #[serde(default = "default_http_timeout_ms")]
    pub http_timeout_ms: u64,

    // === Scanner ===
    /// Treat undeterminable withdraw/deposit capability as allowed.
    #[serde(default = "default_true")]
    pub fail_open_on_unknown_capability: bool,

    /// Maximum age / skew between two quotes that may be paired.
    #[serde(default = "default_staleness")]
    pub max_quote_staleness_seconds: f64,

    /// Minimum size at the best level before a book counts as executable.
    #[serde(default = "default_min_top_of_book")]
    pub min_top_of_book_size: Decimal,

    /// Use ticker prices when the book cannot fill the scan amount.
    #[serde(default)]
    pub allow_ticker_fallback_on_thin_book: bool,

    /// Hard deadline for each capability probe.
    #[serde(default = "default_capability_timeout_ms")]
    pub capability_timeout_ms: u64,

    /// Budget for the order-book phase of one scan.
    #[serde(default = "default_scan_budget_ms")]
    pub scan_budget_ms: u64,

    /// Concurrent order-book fetches per scan.
    #[serde(default = "default_orderbook_concurrency")]
    pub orderbook_concurrency: usize,

    /// Depth requested per order-book fetch.
    #[serde(default = "default_orderbook_depth")]
    pub orderbook_depth: usize,

    /// Feeds listing more symbols than this get volume/market-cap prefiltered.
    #[serde(default = "default_many_symbols")]
    pub many_symbols_threshold: usize,

    /// Minimum 24h quote volume for prefiltered symbols.
    #[serde(default)]
    pub min_quote_volume: Option<Decimal>,

    /// Minimum market cap for prefiltered symbols.
    ///
    /// None of the bundled venue feeds report market cap, so against live
    /// venues this only filters tickers from feeds that set it; symbols
    /// without a known cap pass.
    #[serde(default)]
    pub min_market_cap: Option<Decimal>,

    /// Taker fee used for venues without an explicit entry.
    #[serde(default = "default_taker_fee")]
    pub default_taker_fee: Decimal,

    /// Per-venue taker fees as "venue:rate" entries.
    #[serde(default)]
    pub venue_taker_fees: Vec<String>,

    /// Flat withdrawal fees (quote currency) as "venue:ASSET:fee" entries.
    #[serde(default)]
    pub withdraw_fees: Vec<String>,

    /// Base-asset amount each scan prices against the books.
    #[serde(default = "default_scan_amount")]
    pub scan_amount: Decimal,

    /// Minimum fee-adjusted profit percentage.
    #[serde(default = "default_min_profit_pct")]
    pub min_profit_pct: Decimal,

    /// Minimum raw price difference percentage before fees.
    #[serde(default)]
    pub min_price_diff_pct: Decimal,

    /// Pause between scan cycles.
    #[serde(default = "default_scan_interval_ms")]
    pub scan_interval_ms: u64,

    // === Fill Simulation ===
    /// Adverse slippage applied to every simulated execution.
    #[serde(default = "default_slippage_bps")]
    pub slippage_bps: Decimal,

    /// Fee rate charged on each simulated leg.
    #[serde(default = "default_taker_fee")]
    pub fee_rate: Decimal,

    /// Requested notionals are rounded down to a multiple of this.
    #[serde(default = "default_notional_granularity")]
    pub notional_granularity: Decimal,

    /// Smallest notional an entry may open.
    #[serde(default = "default_min_notional")]
    pub min_notional: Decimal,

    /// Partial reduces allowed before the next reduce becomes an exit.
    #[serde(default = "default_max_partial_reduces")]
    pub max_partial_reduces: u32,

    /// Walk the live book to synthesize fills on entry.
    #[serde(default)]
    pub paper_mode: bool,

    // === Server Configuration ===
    /// Expose Prometheus metrics.
    #[serde(default)]
    pub metrics_enabled: bool,

    /// Prometheus exporter port.
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub rust_log: String,
}

fn default_ticker_ttl() -> f64 {
    1.0
}

fn default_currency_ttl() -> f64 {
    300.0
}

fn default_stream_venues() -> Vec<String> {
    vec!["binance".to_string()]
}

fn default_stream_symbols() -> Vec<String> {
    vec!["BTC/USDT".to_string(), "ETH/USDT".to_string()]
}

fn default_reconnect_initial_ms() -> u64 {
    1000
}

fn default_reconnect_max_delay() -> u64 {
    60
}

fn default_stop_timeout_ms() -> u64 {
    2000
}

fn default_http_timeout_ms() -> u64 {
    5000
}

fn default_true() -> bool {
    true
}

fn default_staleness() -> f64 {
    5.0
}

fn default_min_top_of_book() -> Decimal {
    Decimal::new(1, 4) // 0.0001
}

fn default_capability_timeout_ms() -> u64 {
    500
}

fn default_scan_budget_ms() -> u64 {
    10_000
}

fn default_orderbook_concurrency() -> usize {
    8
}

fn default_orderbook_depth() -> usize {
    20
}

fn default_many_symbols() -> usize {
    200
}

fn default_taker_fee() -> Decimal {
    Decimal::new(1, 3) // 0.1%
}

fn default_scan_amount() -> Decimal {
    Decimal::ONE
}

fn default_min_profit_pct() -> Decimal {
    Decimal::new(1, 1) // 0.1%
}

fn default_scan_interval_ms() -> u64 {
    2000
}

fn default_slippage_bps() -> Decimal {
    Decimal::new(5, 0)
}

fn default_notional_granularity() -> Decimal {
    Decimal::ONE
}

fn default_min_notional() -> Decimal {
    Decimal::new(10, 0)
}

fn default_max_partial_reduces() -> u32 {
    100
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ticker_cache_ttl_seconds: default_ticker_ttl(),
            currency_cache_ttl_seconds: default_currency_ttl(),
            use_websocket_feed: false,
            strict_feed_only: false,
            stream_venues: default_stream_venues(),
            stream_symbols: default_stream_symbols(),
            rest_venues: Vec::new(),
            binance_api_key: None,
            binance_api_secret: None,
            ws_reconnect_initial_ms: default_reconnect_initial_ms(),
            ws_reconnect_max_delay_s: default_reconnect_max_delay(),
            ws_stop_timeout_ms: default_stop_timeout_ms(),
            http_timeout_ms: default_http_timeout_ms(),
            fail_open_on_unknown_capability: true,
            max_quote_staleness_seconds: default_staleness(),
            min_top_of_book_size: default_min_top_of_book(),
            allow_ticker_fallback_on_thin_book: false,
            capability_timeout_ms: default_capability_timeout_ms(),
            scan_budget_ms: default_scan_budget_ms(),
            orderbook_concurrency: default_orderbook_concurrency(),
            orderbook_depth: default_orderbook_depth(),
            many_symbols_threshold: default_many_symbols(),
            min_quote_volume: None,
            min_market_cap: None,
            default_taker_fee: default_taker_fee(),
            venue_taker_fees: Vec::new(),
            withdraw_fees: Vec::new(),
            scan_amount: default_scan_amount(),
            min_profit_pct: default_min_profit_pct(),
            min_price_diff_pct: Decimal::ZERO,
            scan_interval_ms: default_scan_interval_ms(),
            slippage_bps: default_slippage_bps(),
            fee_rate: default_taker_fee(),
            notional_granularity: default_notional_granularity(),
            min_notional: default_min_notional(),
            max_partial_reduces: default_max_partial_reduces(),
            paper_mode: false,
            metrics_enabled: false,
            metrics_port: default_metrics_port(),
            rust_log: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from environment, reading .env file first.
    pub fn load() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    /// Check if the configuration is valid.
    pub fn validate(&self) -> Result<(), String> {
        if !(self.ticker_cache_ttl_seconds > 0.0) {
            return Err("TICKER_CACHE_TTL_SECONDS must be positive".to_string());
        }

        if !(self.currency_cache_ttl_seconds > 0.0) {
            return Err("CURRENCY_CACHE_TTL_SECONDS must be positive".to_string());
        }

        if !(self.max_quote_staleness_seconds > 0.0) {
            return Err("MAX_QUOTE_STALENESS_SECONDS must be positive".to_string());
        }

        if self.scan_amount <= Decimal::ZERO {
            return Err("SCAN_AMOUNT must be positive".to_string());
        }

        if self.orderbook_concurrency == 0 {
            return Err("ORDERBOOK_CONCURRENCY must be at least 1".to_string());
        }

        if self.notional_granularity <= Decimal::ZERO {
            return Err("NOTIONAL_GRANULARITY must be positive".to_string());
        }

        if self.fee_rate < Decimal::ZERO || self.fee_rate >= Decimal::ONE {
            return Err("FEE_RATE must be in [0, 1)".to_string());
        }

        if self.binance_api_key.is_some() != self.binance_api_secret.is_some() {
            return Err("BINANCE_API_KEY and BINANCE_API_SECRET must be set together".to_string());
        }

        self.parsed_taker_fees()?;
        self.parsed_withdraw_fees()?;

        Ok(())
    }

    /// Parse `VENUE_TAKER_FEES` entries ("venue:rate").
    pub fn parsed_taker_fees(&self) -> Result<HashMap<String, Decimal>, String> {
        let mut fees = HashMap::new();
        for entry in &self.venue_taker_fees {
            let (venue, rate) = entry
                .split_once(':')
                .ok_or_else(|| format!("VENUE_TAKER_FEES entry {entry:?} is not venue:rate"))?;
            let rate: Decimal = rate
                .trim()
                .parse()
                .map_err(|_| format!("VENUE_TAKER_FEES entry {entry:?} has invalid rate"))?;
            fees.insert(venue.trim().to_lowercase(), rate);
        }
        Ok(fees)
    }

    /// Parse `WITHDRAW_FEES` entries ("venue:ASSET:fee").
    pub fn parsed_withdraw_fees(&self) -> Result<HashMap<(String, String), Decimal>, String> {
        let mut fees = HashMap::new();
        for entry in &self.withdraw_fees {
            let parts: Vec<&str> = entry.split(':').map(str::trim).collect();
            let [venue, asset, fee] = parts.as_slice() else {
                return Err(format!("WITHDRAW_FEES entry {entry:?} is not venue:ASSET:fee"));
            };
            let fee: Decimal = fee
                .parse()
                .map_err(|_| format!("WITHDRAW_FEES entry {entry:?} has invalid fee"))?;
            fees.insert((venue.to_lowercase(), asset.to_uppercase()), fee);
        }
        Ok(fees)
    }
}
