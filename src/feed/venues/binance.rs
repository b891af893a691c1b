//! Binance spot: combined JSON stream and REST API.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use serde::Deserialize;
use sha2::Sha256;
use time::OffsetDateTime;
use tracing::{debug, instrument};

use crate::config::Config;
use crate::error::{FeedError, WsError};
use crate::feed::capability::{CurrencyDetails, NetworkInfo};
use crate::feed::rest::VenueRestApi;
use crate::feed::symbol;
use crate::feed::types::{FeedUpdate, Ticker};
use crate::feed::websocket::{Decoded, Frame, VenueCodec};
use crate::orderbook::{OrderBook, PriceLevel};

const VENUE: &str = "binance";
const STREAM_URL: &str = "wss://stream.binance.com:9443/stream";
const REST_URL: &str = "https://api.binance.com";

/// Depth limits accepted by `/api/v3/depth`.
const DEPTH_LIMITS: &[usize] = &[5, 10, 20, 50, 100, 500, 1000, 5000];

/// Binance error codes.
const ERR_ILLEGAL_CHARS: i64 = -1100;
const ERR_BAD_PARAM: i64 = -1102;
const ERR_INVALID_SYMBOL: i64 = -1121;

// === Streaming ===

/// Combined-stream codec: `bookTicker` for tickers, `depth20@100ms` for books.
#[derive(Debug, Clone, Default)]
pub struct BinanceCodec;

#[derive(Debug, Deserialize)]
struct Envelope {
    stream: String,
    data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct BookTicker {
    #[serde(rename = "s")]
    symbol: String,
    #[serde(rename = "b")]
    bid: Decimal,
    #[serde(rename = "a")]
    ask: Decimal,
}

#[derive(Debug, Deserialize)]
struct PartialDepth {
    bids: Vec<(Decimal, Decimal)>,
    asks: Vec<(Decimal, Decimal)>,
}

fn levels(raw: Vec<(Decimal, Decimal)>) -> impl Iterator<Item = PriceLevel> {
    raw.into_iter().map(|(price, size)| PriceLevel::new(price, size))
}

impl VenueCodec for BinanceCodec {
    fn venue(&self) -> &'static str {
        VENUE
    }

    fn url(&self, symbols: &[String]) -> String {
        let streams: Vec<String> = symbols
            .iter()
            .flat_map(|s| {
                let name = symbol::concatenated(s).to_lowercase();
                [format!("{name}@bookTicker"), format!("{name}@depth20@100ms")]
            })
            .collect();
        format!("{STREAM_URL}?streams={}", streams.join("/"))
    }

    fn subscriptions(&self, _symbols: &[String]) -> Vec<String> {
        // Streams are selected in the URL
        Vec::new()
    }

    fn decode(&self, frame: Frame<'_>) -> Result<Decoded, WsError> {
        let Frame::Text(text) = frame else {
            return Err(WsError::Decode("unexpected binary frame".to_string()));
        };

        let envelope: Envelope =
            serde_json::from_str(text).map_err(|e| WsError::Decode(e.to_string()))?;
        let (stream_symbol, channel) = envelope
            .stream
            .split_once('@')
            .ok_or_else(|| WsError::Decode(format!("bad stream name {}", envelope.stream)))?;
        let normalized = symbol::normalize(stream_symbol)
            .ok_or_else(|| WsError::Decode(format!("unknown symbol {stream_symbol}")))?;

        if channel == "bookTicker" {
            let msg: BookTicker = serde_json::from_value(envelope.data)
                .map_err(|e| WsError::Decode(e.to_string()))?;
            let symbol = symbol::normalize(&msg.symbol).unwrap_or(normalized);
            let ticker = Ticker {
                price: (msg.bid + msg.ask) / Decimal::TWO,
                bid: Some(msg.bid),
                ask: Some(msg.ask),
                ..Ticker::new(symbol, Decimal::ZERO).at(OffsetDateTime::now_utc())
            };
            return Ok(Decoded::updates(vec![FeedUpdate::Ticker(ticker)]));
        }

        if channel.starts_with("depth") {
            let msg: PartialDepth = serde_json::from_value(envelope.data)
                .map_err(|e| WsError::Decode(e.to_string()))?;
            let book = OrderBook::from_levels(normalized, levels(msg.bids), levels(msg.asks));
            return Ok(Decoded::updates(vec![FeedUpdate::Book(book)]));
        }

        Ok(Decoded::empty())
    }
}

// === REST ===

#[derive(Debug, Clone)]
struct Credentials {
    api_key: String,
    api_secret: String,
}

/// Binance spot REST API.
#[derive(Debug, Clone)]
pub struct BinanceRest {
    http: reqwest::Client,
    base_url: String,
    credentials: Option<Credentials>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Ticker24h {
    symbol: String,
    last_price: Decimal,
    #[serde(default)]
    quote_volume: Option<Decimal>,
    #[serde(default)]
    close_time: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct DepthResponse {
    bids: Vec<(Decimal, Decimal)>,
    asks: Vec<(Decimal, Decimal)>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: i64,
    msg: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CoinConfig {
    coin: String,
    deposit_all_enable: Option<bool>,
    withdraw_all_enable: Option<bool>,
    #[serde(default)]
    network_list: Vec<CoinNetwork>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CoinNetwork {
    network: String,
    deposit_enable: Option<bool>,
    withdraw_enable: Option<bool>,
    withdraw_fee: Option<Decimal>,
}

impl From<CoinConfig> for CurrencyDetails {
    fn from(coin: CoinConfig) -> Self {
        CurrencyDetails {
            withdraw: coin.withdraw_all_enable,
            deposit: coin.deposit_all_enable,
            info: None,
            networks: coin
                .network_list
                .into_iter()
                .map(|n| {
                    (
                        n.network,
                        NetworkInfo {
                            withdraw_enable: n.withdraw_enable,
                            deposit_enable: n.deposit_enable,
                            withdraw_fee: n.withdraw_fee,
                        },
                    )
                })
                .collect(),
        }
    }
}

impl BinanceRest {
    /// Create a client. Credentials are optional but must come as a pair.
    pub fn new(config: &Config) -> Result<Self, FeedError> {
        let credentials = match (&config.binance_api_key, &config.binance_api_secret) {
            (Some(api_key), Some(api_secret)) => Some(Credentials {
                api_key: api_key.clone(),
                api_secret: api_secret.clone(),
            }),
            (None, None) => None,
            (Some(_), None) => {
                return Err(FeedError::MissingCredentials {
                    venue: VENUE.to_string(),
                    field: "BINANCE_API_SECRET".to_string(),
                })
            }
            (None, Some(_)) => {
                return Err(FeedError::MissingCredentials {
                    venue: VENUE.to_string(),
                    field: "BINANCE_API_KEY".to_string(),
                })
            }
        };

        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.http_timeout_ms))
            .connect_timeout(Duration::from_millis(500))
            .tcp_nodelay(true)
            .tcp_keepalive(Duration::from_secs(30))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;

        Ok(Self {
            http,
            base_url: REST_URL.to_string(),
            credentials,
        })
    }

    /// Read a non-success response into a typed error.
    async fn error_from(response: reqwest::Response, symbol: &str, limit: usize) -> FeedError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        map_error(status.as_u16(), &body, symbol, limit)
    }
}

/// Map a Binance error response onto [`FeedError`].
fn map_error(status: u16, body: &str, symbol: &str, limit: usize) -> FeedError {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(err) if err.code == ERR_INVALID_SYMBOL => FeedError::SymbolNotFound {
            venue: VENUE.to_string(),
            symbol: symbol.to_string(),
        },
        Ok(err)
            if err.code == ERR_ILLEGAL_CHARS && err.msg.to_lowercase().contains("symbol") =>
        {
            FeedError::SymbolNotFound {
                venue: VENUE.to_string(),
                symbol: symbol.to_string(),
            }
        }
        Ok(err) if err.code == ERR_ILLEGAL_CHARS || err.code == ERR_BAD_PARAM => {
            FeedError::DepthRejected {
                venue: VENUE.to_string(),
                limit,
            }
        }
        Ok(err) => FeedError::RequestFailed {
            venue: VENUE.to_string(),
            reason: format!("HTTP {status} code {}: {}", err.code, err.msg),
        },
        Err(_) => FeedError::RequestFailed {
            venue: VENUE.to_string(),
            reason: format!("HTTP {status} - {body}"),
        },
    }
}

/// HMAC-SHA256 signature of a query string, hex encoded.
pub fn sign_query(secret: &str, query: &str) -> String {
    // HMAC accepts keys of any length
    let mut mac = match Hmac::<Sha256>::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(query.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

fn from_millis(ms: i64) -> Option<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(ms as i128 * 1_000_000).ok()
}

#[async_trait]
impl VenueRestApi for BinanceRest {
    fn venue(&self) -> &str {
        VENUE
    }

    #[instrument(skip(self))]
    async fn fetch_tickers(&self) -> Result<HashMap<String, Ticker>, FeedError> {
        let url = format!("{}/api/v3/ticker/24hr", self.base_url);
        let response = self.http.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(Self::error_from(response, "*", 0).await);
        }

        let raw: Vec<Ticker24h> = response
            .json()
            .await
            .map_err(|e| FeedError::ParseError(format!("Failed to parse tickers: {}", e)))?;

        let tickers: HashMap<String, Ticker> = raw
            .into_iter()
            .filter(|t| t.last_price > Decimal::ZERO)
            .filter_map(|t| {
                let symbol = symbol::normalize(&t.symbol)?;
                let mut ticker = Ticker::new(symbol.clone(), t.last_price);
                ticker.timestamp = t.close_time.and_then(from_millis);
                ticker.quote_volume = t.quote_volume;
                Some((symbol, ticker))
            })
            .collect();

        debug!(count = tickers.len(), "Fetched tickers");
        Ok(tickers)
    }

    #[instrument(skip(self))]
    async fn fetch_order_book(&self, venue_symbol: &str, limit: usize) -> Result<OrderBook, FeedError> {
        let url = format!("{}/api/v3/depth", self.base_url);
        let limit_param = limit.to_string();
        let response = self
            .http
            .get(&url)
            .query(&[("symbol", venue_symbol), ("limit", limit_param.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_from(response, venue_symbol, limit).await);
        }

        let depth: DepthResponse = response
            .json()
            .await
            .map_err(|e| FeedError::ParseError(format!("Failed to parse order book: {}", e)))?;

        let normalized = symbol::normalize(venue_symbol).unwrap_or_else(|| venue_symbol.to_string());
        Ok(OrderBook::from_levels(normalized, levels(depth.bids), levels(depth.asks)))
    }

    fn symbol_spellings(&self, symbol: &str) -> Vec<String> {
        vec![symbol::concatenated(symbol)]
    }

    fn depth_limits(&self) -> &[usize] {
        DEPTH_LIMITS
    }

    #[instrument(skip(self))]
    async fn fetch_currencies(&self) -> Result<Option<HashMap<String, CurrencyDetails>>, FeedError> {
        let Some(credentials) = &self.credentials else {
            return Ok(None);
        };

        let timestamp = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
        let query = format!("timestamp={timestamp}&recvWindow=5000");
        let signature = sign_query(&credentials.api_secret, &query);
        let url = format!(
            "{}/sapi/v1/capital/config/getall?{query}&signature={signature}",
            self.base_url
        );

        let response = self
            .http
            .get(&url)
            .header("X-MBX-APIKEY", &credentials.api_key)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_from(response, "*", 0).await);
        }

        let coins: Vec<CoinConfig> = response
            .json()
            .await
            .map_err(|e| FeedError::ParseError(format!("Failed to parse coin config: {}", e)))?;

        let currencies: HashMap<String, CurrencyDetails> = coins
            .into_iter()
            .map(|coin| (coin.coin.to_uppercase(), CurrencyDetails::from(coin)))
            .collect();

        debug!(count = currencies.len(), "Fetched currency metadata");
        Ok(Some(currencies))
    }
}
