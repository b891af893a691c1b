//! HTX (Huobi) spot: gzip-compressed JSON over WebSocket.

use std::io::Read;

use flate2::read::GzDecoder;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::WsError;
use crate::feed::symbol;
use crate::feed::types::{FeedUpdate, Ticker};
use crate::feed::websocket::{Decoded, Frame, VenueCodec};
use crate::orderbook::{OrderBook, PriceLevel};

const VENUE: &str = "htx";
const STREAM_URL: &str = "wss://api.huobi.pro/ws";

#[derive(Debug, Serialize)]
struct Subscribe {
    sub: String,
    id: String,
}

#[derive(Debug, Serialize)]
struct Pong {
    pong: u64,
}

#[derive(Debug, Deserialize)]
struct Push {
    #[serde(default)]
    ping: Option<u64>,
    #[serde(default)]
    ch: Option<String>,
    #[serde(default)]
    ts: Option<i64>,
    #[serde(default)]
    tick: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct TickerTick {
    close: Decimal,
    #[serde(default)]
    bid: Option<Decimal>,
    #[serde(default)]
    ask: Option<Decimal>,
    #[serde(default)]
    vol: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
struct DepthTick {
    #[serde(default)]
    bids: Vec<(Decimal, Decimal)>,
    #[serde(default)]
    asks: Vec<(Decimal, Decimal)>,
}

/// Gzip JSON codec for HTX market channels.
#[derive(Debug, Clone, Default)]
pub struct HtxCodec;

fn gunzip(bytes: &[u8]) -> Result<String, WsError> {
    let mut decoder = GzDecoder::new(bytes);
    let mut text = String::new();
    decoder
        .read_to_string(&mut text)
        .map_err(|e| WsError::Decode(format!("gzip: {e}")))?;
    Ok(text)
}

fn levels(raw: Vec<(Decimal, Decimal)>) -> impl Iterator<Item = PriceLevel> {
    raw.into_iter().map(|(price, size)| PriceLevel::new(price, size))
}

impl HtxCodec {
    fn decode_json(&self, text: &str) -> Result<Decoded, WsError> {
        let push: Push = serde_json::from_str(text).map_err(|e| WsError::Decode(e.to_string()))?;

        if let Some(ping) = push.ping {
            let reply = serde_json::to_string(&Pong { pong: ping })
                .map_err(|e| WsError::Decode(e.to_string()))?;
            return Ok(Decoded::reply(reply));
        }

        let (Some(channel), Some(tick)) = (push.ch, push.tick) else {
            // Subscription acks: {"id":..,"status":"ok","subbed":..}
            return Ok(Decoded::empty());
        };

        // market.<symbol>.<topic>[.<param>]
        let mut parts = channel.splitn(3, '.');
        let (Some("market"), Some(raw_symbol), Some(topic)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(WsError::Decode(format!("unexpected channel {channel}")));
        };
        let normalized = symbol::normalize(raw_symbol)
            .ok_or_else(|| WsError::Decode(format!("unknown symbol {raw_symbol}")))?;

        let timestamp = push
            .ts
            .and_then(|ms| OffsetDateTime::from_unix_timestamp_nanos(ms as i128 * 1_000_000).ok())
            .unwrap_or_else(OffsetDateTime::now_utc);

        let update = if topic == "ticker" {
            let tick: TickerTick =
                serde_json::from_value(tick).map_err(|e| WsError::Decode(e.to_string()))?;
            FeedUpdate::Ticker(Ticker {
                bid: tick.bid,
                ask: tick.ask,
                quote_volume: tick.vol,
                ..Ticker::new(normalized, tick.close).at(timestamp)
            })
        } else if topic.starts_with("depth") {
            let tick: DepthTick =
                serde_json::from_value(tick).map_err(|e| WsError::Decode(e.to_string()))?;
            let mut book = OrderBook::from_levels(normalized, levels(tick.bids), levels(tick.asks));
            book.updated_at = timestamp;
            FeedUpdate::Book(book)
        } else {
            return Ok(Decoded::empty());
        };

        Ok(Decoded::updates(vec![update]))
    }
}

impl VenueCodec for HtxCodec {
    fn venue(&self) -> &'static str {
        VENUE
    }

    fn url(&self, _symbols: &[String]) -> String {
        STREAM_URL.to_string()
    }

    fn subscriptions(&self, symbols: &[String]) -> Vec<String> {
        symbols
            .iter()
            .flat_map(|s| {
                let name = symbol::concatenated(s).to_lowercase();
                [
                    format!("market.{name}.ticker"),
                    format!("market.{name}.depth.step0"),
                ]
            })
            .filter_map(|sub| {
                serde_json::to_string(&Subscribe {
                    id: sub.clone(),
                    sub,
                })
                .ok()
            })
            .collect()
    }

    fn decode(&self, frame: Frame<'_>) -> Result<Decoded, WsError> {
        match frame {
            Frame::Binary(bytes) => self.decode_json(&gunzip(bytes)?),
            Frame::Text(text) => self.decode_json(text),
        }
    }
}
