//! Tests against real venues.
//!
//! These tests require network access and are ignored by default.

use std::time::Duration;

use venue_arb::config::Config;
use venue_arb::feed::{venues, ExchangeFeed};

fn public_config() -> Config {
    Config {
        stream_symbols: vec!["BTC/USDT".to_string()],
        binance_api_key: None,
        binance_api_secret: None,
        ..Config::default()
    }
}

/// Test that we can fetch Binance tickers and a book over REST.
#[tokio::test]
#[ignore = "requires network access"]
async fn test_binance_rest_snapshot() {
    let feed = venues::polled_feed("binance", &public_config(), None).unwrap();

    let tickers = feed.get_tickers().await.unwrap();
    let btc = tickers.get("BTC/USDT").expect("BTC/USDT listed");
    println!("BTC/USDT last: {}", btc.price);

    let book = feed.get_order_book("BTC/USDT", 7).await.unwrap();
    assert!(!book.is_empty());
    assert!(book.best_bid() < book.best_ask());
}

/// Test that the Binance stream fills its cache and stops cleanly.
#[tokio::test]
#[ignore = "requires network access"]
async fn test_binance_stream_snapshot() {
    let feed = venues::streaming_feed("binance", &public_config()).unwrap();

    let mut book = None;
    for _ in 0..20 {
        tokio::time::sleep(Duration::from_millis(500)).await;
        if let Ok(b) = feed.get_order_book("BTC/USDT", 5).await {
            book = Some(b);
            break;
        }
    }
    let book = book.expect("book within 10s");
    println!("BTC/USDT best ask: {:?}", book.best_ask());
    assert!(book.asks.len() <= 5);

    feed.stop().await;
    feed.stop().await;
}
