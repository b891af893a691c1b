//! End-to-end scans over simulated venues.

use std::sync::Arc;

use pretty_assertions::assert_eq;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use time::OffsetDateTime;

use venue_arb::arbitrage::{OpportunityScanner, PriceSource};
use venue_arb::config::Config;
use venue_arb::feed::{CurrencyDetails, ExchangeFeed, FeedRegistry, MockConfig, MockFeed, NetworkInfo};
use venue_arb::orderbook::{OrderBook, PriceLevel};

/// A venue quoting `symbol` with one deep level on each side of `price`.
fn quote(feed: &MockFeed, symbol: &str, price: Decimal) {
    feed.set_ticker(symbol, price);
    feed.set_order_book(OrderBook::from_levels(
        symbol,
        vec![PriceLevel::new(price, dec!(50))],
        vec![PriceLevel::new(price, dec!(50))],
    ));
}

fn as_feeds(list: Vec<MockFeed>) -> Vec<Arc<dyn ExchangeFeed>> {
    list.into_iter()
        .map(|f| Arc::new(f) as Arc<dyn ExchangeFeed>)
        .collect()
}

fn config() -> Config {
    Config {
        default_taker_fee: dec!(0.001),
        ..Config::default()
    }
}

#[tokio::test]
async fn two_venue_spread_yields_one_opportunity() {
    let cheap = MockFeed::new("cheap");
    let rich = MockFeed::new("rich");
    quote(&cheap, "FOO/USDT", dec!(100));
    quote(&rich, "FOO/USDT", dec!(102));

    let scanner = OpportunityScanner::from_config(&config()).unwrap();
    let opportunities = scanner
        .scan(&as_feeds(vec![cheap, rich]), dec!(1), dec!(0.1), Decimal::ZERO)
        .await;

    assert_eq!(opportunities.len(), 1);
    let opp = &opportunities[0];
    assert_eq!(opp.symbol, "FOO/USDT");
    assert_eq!(opp.buy_venue, "cheap");
    assert_eq!(opp.sell_venue, "rich");
    assert_eq!(opp.net_profit, dec!(1.798));
    assert_eq!(opp.buy_source, PriceSource::OrderBook);
    assert!(opp.buy_withdraw_allowed && opp.sell_deposit_allowed);
}

#[tokio::test]
async fn scan_results_hold_ranking_and_profit_invariants() {
    let venues: Vec<MockFeed> = ["a", "b", "c", "d"].iter().map(|v| MockFeed::new(*v)).collect();
    let prices = [
        ("BTC/USDT", [dec!(50000), dec!(50400), dec!(49900), dec!(50100)]),
        ("ETH/USDT", [dec!(3000), dec!(3001), dec!(3090), dec!(2950)]),
        ("SOL/USDT", [dec!(100), dec!(100), dec!(100), dec!(100)]),
    ];
    for (symbol, quotes) in prices {
        for (feed, price) in venues.iter().zip(quotes) {
            quote(feed, symbol, price);
        }
    }

    let scanner = OpportunityScanner::from_config(&config()).unwrap();
    let (opportunities, report) = scanner
        .scan_with_report(&as_feeds(venues), dec!(1), dec!(0.1), Decimal::ZERO)
        .await;

    assert!(!opportunities.is_empty());
    assert_eq!(report.opportunities, opportunities.len());
    assert!(opportunities.iter().all(|o| o.symbol != "SOL/USDT"));
    assert!(opportunities.iter().all(|o| o.sell_price > o.buy_price));
    assert!(opportunities.iter().all(|o| o.net_profit > Decimal::ZERO));
    assert!(opportunities.iter().all(|o| o.profit_pct >= dec!(0.1)));
    assert!(opportunities
        .windows(2)
        .all(|w| w[0].profit_pct >= w[1].profit_pct));

    // Widest spread first: ETH bought at 2950 on d, sold at 3090 on c
    assert_eq!(opportunities[0].symbol, "ETH/USDT");
    assert_eq!(opportunities[0].buy_venue, "d");
    assert_eq!(opportunities[0].sell_venue, "c");
}

#[tokio::test]
async fn stale_quotes_never_pair() {
    let fresh = MockFeed::new("fresh");
    let stale = MockFeed::new("stale");
    quote(&fresh, "FOO/USDT", dec!(100));
    quote(&stale, "FOO/USDT", dec!(110));
    stale.set_ticker_at(
        "FOO/USDT",
        dec!(110),
        Some(OffsetDateTime::now_utc() - time::Duration::seconds(30)),
    );

    let scanner = OpportunityScanner::from_config(&config()).unwrap();
    let (opportunities, report) = scanner
        .scan_with_report(&as_feeds(vec![fresh, stale]), dec!(1), dec!(0.1), Decimal::ZERO)
        .await;

    assert!(opportunities.is_empty());
    assert_eq!(report.rejected_stale, 2);
}

#[tokio::test]
async fn withdraw_fee_can_erase_spread() {
    let cheap = MockFeed::new("cheap");
    let rich = MockFeed::new("rich");
    quote(&cheap, "FOO/USDT", dec!(100));
    quote(&rich, "FOO/USDT", dec!(102));

    let config = Config {
        withdraw_fees: vec!["rich:FOO:2".to_string()],
        ..config()
    };
    let scanner = OpportunityScanner::from_config(&config).unwrap();
    let (opportunities, report) = scanner
        .scan_with_report(&as_feeds(vec![cheap, rich]), dec!(1), dec!(0.1), Decimal::ZERO)
        .await;

    assert!(opportunities.is_empty());
    assert_eq!(report.rejected_unprofitable, 1);
}

#[tokio::test(start_paused = true)]
async fn capability_timeout_follows_policy() {
    let slow_meta = MockConfig {
        capability_latency_ms: 10_000,
        ..Default::default()
    };
    let cheap = MockFeed::with_config("cheap", slow_meta.clone());
    let rich = MockFeed::with_config("rich", slow_meta);
    quote(&cheap, "FOO/USDT", dec!(100));
    quote(&rich, "FOO/USDT", dec!(102));
    let feeds = as_feeds(vec![cheap, rich]);

    let open = OpportunityScanner::from_config(&config()).unwrap();
    assert_eq!(open.scan(&feeds, dec!(1), dec!(0.1), Decimal::ZERO).await.len(), 1);

    let closed = OpportunityScanner::from_config(&Config {
        fail_open_on_unknown_capability: false,
        ..config()
    })
    .unwrap();
    assert!(closed.scan(&feeds, dec!(1), dec!(0.1), Decimal::ZERO).await.is_empty());
}

fn network(withdraw: bool) -> NetworkInfo {
    NetworkInfo {
        withdraw_enable: Some(withdraw),
        ..Default::default()
    }
}

#[tokio::test]
async fn network_flags_decide_transferability() {
    let cheap = MockFeed::new("cheap");
    let rich = MockFeed::new("rich");
    quote(&cheap, "FOO/USDT", dec!(100));
    quote(&rich, "FOO/USDT", dec!(102));
    rich.set_currency(
        "FOO",
        CurrencyDetails {
            deposit: Some(true),
            ..Default::default()
        },
    );

    // Top-level flag says no, but one network still allows withdrawals
    cheap.set_currency(
        "FOO",
        CurrencyDetails {
            withdraw: Some(false),
            networks: [("ERC20".to_string(), network(false)), ("SOL".to_string(), network(true))]
                .into_iter()
                .collect(),
            ..Default::default()
        },
    );
    let cheap = Arc::new(cheap);
    let feeds: Vec<Arc<dyn ExchangeFeed>> = vec![cheap.clone() as Arc<dyn ExchangeFeed>, Arc::new(rich)];

    let scanner = OpportunityScanner::from_config(&config()).unwrap();
    let opportunities = scanner.scan(&feeds, dec!(1), dec!(0.1), Decimal::ZERO).await;
    assert_eq!(opportunities.len(), 1);
    assert!(opportunities[0].buy_withdraw_allowed);

    // Every network disabled
    cheap.set_currency(
        "FOO",
        CurrencyDetails {
            networks: [("ERC20".to_string(), network(false))].into_iter().collect(),
            ..Default::default()
        },
    );
    let (opportunities, report) = scanner
        .scan_with_report(&feeds, dec!(1), dec!(0.1), Decimal::ZERO)
        .await;
    assert!(opportunities.is_empty());
    assert_eq!(report.rejected_capability, 1);
}

#[tokio::test]
async fn failing_venue_does_not_abort_scan() {
    let cheap = MockFeed::new("cheap");
    let rich = MockFeed::new("rich");
    let broken = MockFeed::with_config(
        "broken",
        MockConfig {
            fail_tickers: true,
            ..Default::default()
        },
    );
    quote(&cheap, "FOO/USDT", dec!(100));
    quote(&rich, "FOO/USDT", dec!(102));

    let scanner = OpportunityScanner::from_config(&config()).unwrap();
    let (opportunities, report) = scanner
        .scan_with_report(&as_feeds(vec![cheap, broken, rich]), dec!(1), dec!(0.1), Decimal::ZERO)
        .await;

    assert_eq!(report.feed_errors, 1);
    assert_eq!(opportunities.len(), 1);
}

#[tokio::test]
async fn registry_feeds_scan_like_any_other() {
    let registry = FeedRegistry::new();
    let cheap = MockFeed::new("cheap");
    let rich = MockFeed::new("rich");
    quote(&cheap, "FOOUSDT", dec!(100));
    quote(&rich, "FOO-USDT", dec!(102));
    registry.register("cheap", Arc::new(cheap));
    registry.register("rich", Arc::new(rich));

    let feeds: Vec<Arc<dyn ExchangeFeed>> = registry
        .venues()
        .iter()
        .filter_map(|v| registry.get(v))
        .collect();
    assert_eq!(feeds.len(), 2);

    let scanner = OpportunityScanner::from_config(&config()).unwrap();
    let opportunities = scanner.scan(&feeds, dec!(1), dec!(0.1), Decimal::ZERO).await;
    assert_eq!(opportunities.len(), 1);
    assert_eq!(opportunities[0].symbol, "FOO/USDT");

    assert!(registry.unregister("cheap").is_some());
    assert!(registry.get("cheap").is_none());
}
