//! MEXC spot: protobuf push frames over WebSocket.
//!
//! Market data arrives as binary `PushDataV3ApiWrapper` messages; control
//! frames (subscription acks, PONG) are JSON text.

use std::time::Duration;

use prost::Message as _;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::WsError;
use crate::feed::symbol;
use crate::feed::types::{FeedUpdate, Ticker};
use crate::feed::websocket::{Decoded, Frame, VenueCodec};
use crate::orderbook::{OrderBook, PriceLevel};

const VENUE: &str = "mexc";
const STREAM_URL: &str = "wss://wbs-api.mexc.com/ws";
const BOOK_DEPTH: usize = 20;

/// Envelope for every binary push.
#[derive(Clone, PartialEq, prost::Message)]
pub struct PushDataV3ApiWrapper {
    /// Channel the push belongs to.
    #[prost(string, tag = "1")]
    pub channel: String,
    /// Symbol in venue spelling (`BTCUSDT`).
    #[prost(string, optional, tag = "3")]
    pub symbol: Option<String>,
    /// Venue-side creation time in milliseconds.
    #[prost(int64, optional, tag = "5")]
    pub create_time: Option<i64>,
    /// Payload.
    #[prost(oneof = "PushBody", tags = "303, 315")]
    pub body: Option<PushBody>,
}

/// Payload variants this feed subscribes to.
#[derive(Clone, PartialEq, prost::Oneof)]
pub enum PushBody {
    /// Top-N book snapshot.
    #[prost(message, tag = "303")]
    LimitDepths(PublicLimitDepthsV3Api),
    /// Best bid/ask.
    #[prost(message, tag = "315")]
    BookTicker(PublicAggreBookTickerV3Api),
}

/// Top-N depth snapshot.
#[derive(Clone, PartialEq, prost::Message)]
pub struct PublicLimitDepthsV3Api {
    /// Ask levels.
    #[prost(message, repeated, tag = "1")]
    pub asks: Vec<DepthItem>,
    /// Bid levels.
    #[prost(message, repeated, tag = "2")]
    pub bids: Vec<DepthItem>,
    /// Event name.
    #[prost(string, tag = "3")]
    pub event_type: String,
    /// Book version.
    #[prost(string, tag = "4")]
    pub version: String,
}

/// One depth level, decimal strings.
#[derive(Clone, PartialEq, prost::Message)]
pub struct DepthItem {
    /// Price.
    #[prost(string, tag = "1")]
    pub price: String,
    /// Quantity.
    #[prost(string, tag = "2")]
    pub quantity: String,
}

/// Best bid/ask push.
#[derive(Clone, PartialEq, prost::Message)]
pub struct PublicAggreBookTickerV3Api {
    /// Best bid price.
    #[prost(string, tag = "1")]
    pub bid_price: String,
    /// Best bid size.
    #[prost(string, tag = "2")]
    pub bid_quantity: String,
    /// Best ask price.
    #[prost(string, tag = "3")]
    pub ask_price: String,
    /// Best ask size.
    #[prost(string, tag = "4")]
    pub ask_quantity: String,
}

#[derive(Debug, Serialize)]
struct Subscription<'a> {
    method: &'a str,
    params: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ControlFrame {
    #[serde(default)]
    msg: Option<String>,
}

/// Protobuf codec for MEXC spot streams.
#[derive(Debug, Clone, Default)]
pub struct MexcCodec;

fn parse_decimal(raw: &str) -> Result<Decimal, WsError> {
    raw.parse()
        .map_err(|_| WsError::Decode(format!("bad decimal {raw:?}")))
}

fn parse_levels(items: &[DepthItem]) -> Result<Vec<PriceLevel>, WsError> {
    items
        .iter()
        .map(|item| Ok(PriceLevel::new(parse_decimal(&item.price)?, parse_decimal(&item.quantity)?)))
        .collect()
}

impl MexcCodec {
    fn decode_push(&self, bytes: &[u8]) -> Result<Decoded, WsError> {
        let push =
            PushDataV3ApiWrapper::decode(bytes).map_err(|e| WsError::Decode(e.to_string()))?;

        let raw_symbol = push
            .symbol
            .as_deref()
            .or_else(|| push.channel.rsplit('@').find(|part| symbol::normalize(part).is_some()))
            .ok_or_else(|| WsError::Decode(format!("no symbol on {}", push.channel)))?;
        let normalized = symbol::normalize(raw_symbol)
            .ok_or_else(|| WsError::Decode(format!("unknown symbol {raw_symbol}")))?;

        let timestamp = push
            .create_time
            .and_then(|ms| OffsetDateTime::from_unix_timestamp_nanos(ms as i128 * 1_000_000).ok())
            .unwrap_or_else(OffsetDateTime::now_utc);

        let update = match push.body {
            Some(PushBody::LimitDepths(depth)) => {
                let mut book = OrderBook::from_levels(
                    normalized,
                    parse_levels(&depth.bids)?,
                    parse_levels(&depth.asks)?,
                );
                book.updated_at = timestamp;
                FeedUpdate::Book(book)
            }
            Some(PushBody::BookTicker(bt)) => {
                let bid = parse_decimal(&bt.bid_price)?;
                let ask = parse_decimal(&bt.ask_price)?;
                FeedUpdate::Ticker(Ticker {
                    bid: Some(bid),
                    ask: Some(ask),
                    ..Ticker::new(normalized, (bid + ask) / Decimal::TWO).at(timestamp)
                })
            }
            None => return Ok(Decoded::empty()),
        };

        Ok(Decoded::updates(vec![update]))
    }
}

impl VenueCodec for MexcCodec {
    fn venue(&self) -> &'static str {
        VENUE
    }

    fn url(&self, _symbols: &[String]) -> String {
        STREAM_URL.to_string()
    }

    fn subscriptions(&self, symbols: &[String]) -> Vec<String> {
        let params: Vec<String> = symbols
            .iter()
            .flat_map(|s| {
                let name = symbol::concatenated(s);
                [
                    format!("spot@public.limit.depth.v3.api.pb@{name}@{BOOK_DEPTH}"),
                    format!("spot@public.aggre.bookTicker.v3.api.pb@100ms@{name}"),
                ]
            })
            .collect();

        // One request per symbol keeps each under the venue's param limit
        params
            .chunks(2)
            .filter_map(|chunk| {
                serde_json::to_string(&Subscription {
                    method: "SUBSCRIPTION",
                    params: chunk.to_vec(),
                })
                .ok()
            })
            .collect()
    }

    fn heartbeat(&self) -> Option<(Duration, String)> {
        Some((Duration::from_secs(20), r#"{"method":"PING"}"#.to_string()))
    }

    fn decode(&self, frame: Frame<'_>) -> Result<Decoded, WsError> {
        match frame {
            Frame::Binary(bytes) => self.decode_push(bytes),
            Frame::Text(text) => {
                let control: ControlFrame =
                    serde_json::from_str(text).map_err(|e| WsError::Decode(e.to_string()))?;
                if control.msg.as_deref() == Some("PONG") {
                    tracing::trace!("MEXC pong");
                }
                Ok(Decoded::empty())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn item(price: &str, quantity: &str) -> DepthItem {
        DepthItem {
            price: price.to_string(),
            quantity: quantity.to_string(),
        }
    }

    #[test]
    fn decodes_limit_depth_push() {
        let push = PushDataV3ApiWrapper {
            channel: "spot@public.limit.depth.v3.api.pb@BTCUSDT@20".to_string(),
            symbol: Some("BTCUSDT".to_string()),
            create_time: Some(1_700_000_000_000),
            body: Some(PushBody::LimitDepths(PublicLimitDepthsV3Api {
                asks: vec![item("101.5", "2"), item("101", "1")],
                bids: vec![item("100", "3")],
                event_type: "spot@public.limit.depth.v3.api.pb".to_string(),
                version: "1".to_string(),
            })),
        };
        let bytes = push.encode_to_vec();

        let decoded = MexcCodec.decode(Frame::Binary(&bytes)).unwrap();
        let [FeedUpdate::Book(book)] = decoded.updates.as_slice() else {
            panic!("expected one book, got {:?}", decoded.updates);
        };
        assert_eq!(book.symbol, "BTC/USDT");
        assert_eq!(book.best_ask(), Some(dec!(101)));
        assert_eq!(book.best_bid(), Some(dec!(100)));
        assert_eq!(book.updated_at.unix_timestamp(), 1_700_000_000);
    }

    #[test]
    fn decodes_book_ticker_push() {
        let push = PushDataV3ApiWrapper {
            channel: "spot@public.aggre.bookTicker.v3.api.pb@100ms@ETHUSDT".to_string(),
            symbol: None,
            create_time: None,
            body: Some(PushBody::BookTicker(PublicAggreBookTickerV3Api {
                bid_price: "2000".to_string(),
                bid_quantity: "1".to_string(),
                ask_price: "2002".to_string(),
                ask_quantity: "1".to_string(),
            })),
        };
        let bytes = push.encode_to_vec();

        let decoded = MexcCodec.decode(Frame::Binary(&bytes)).unwrap();
        let [FeedUpdate::Ticker(ticker)] = decoded.updates.as_slice() else {
            panic!("expected one ticker, got {:?}", decoded.updates);
        };
        assert_eq!(ticker.symbol, "ETH/USDT");
        assert_eq!(ticker.price, dec!(2001));
    }

    #[test]
    fn truncated_frame_is_an_error() {
        let push = PushDataV3ApiWrapper {
            channel: "spot@public.limit.depth.v3.api.pb@BTCUSDT@20".to_string(),
            symbol: Some("BTCUSDT".to_string()),
            create_time: None,
            body: Some(PushBody::LimitDepths(PublicLimitDepthsV3Api {
                asks: vec![item("101", "1")],
                bids: Vec::new(),
                event_type: String::new(),
                version: String::new(),
            })),
        };
        let bytes = push.encode_to_vec();

        assert!(MexcCodec.decode(Frame::Binary(&bytes[..bytes.len() - 3])).is_err());
    }

    #[test]
    fn control_frames_carry_nothing() {
        let decoded = MexcCodec
            .decode(Frame::Text(r#"{"id":0,"code":0,"msg":"PONG"}"#))
            .unwrap();
        assert_eq!(decoded, Decoded::empty());
    }

    #[test]
    fn subscribes_per_symbol() {
        let subs = MexcCodec.subscriptions(&["BTC/USDT".to_string(), "ETH/USDT".to_string()]);
        assert_eq!(subs.len(), 2);
        assert!(subs[0].contains("spot@public.limit.depth.v3.api.pb@BTCUSDT@20"));
        assert!(subs[1].contains("spot@public.aggre.bookTicker.v3.api.pb@100ms@ETHUSDT"));
    }
}
