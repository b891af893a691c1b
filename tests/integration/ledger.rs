//! Ledger and paper trading driven by strategy decisions.

use std::collections::HashMap;
use std::sync::Arc;

use pretty_assertions::assert_eq;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use time::OffsetDateTime;
use tokio_test::{assert_err, assert_ok};

use venue_arb::config::Config;
use venue_arb::error::{AppError, LedgerError};
use venue_arb::feed::MockFeed;
use venue_arb::orderbook::{OrderBook, PriceLevel};
use venue_arb::trading::{
    Direction, LedgerConfig, LedgerEvent, PaperTrader, PositionLedger, TradeDecision,
};

fn frictionless_config() -> Config {
    Config {
        slippage_bps: Decimal::ZERO,
        fee_rate: Decimal::ZERO,
        min_notional: Decimal::ONE,
        max_partial_reduces: 2,
        ..Config::default()
    }
}

fn decisions(json: &str) -> Vec<TradeDecision> {
    serde_json::from_str(json).unwrap()
}

#[test]
fn decision_stream_round_trip_through_ledger() {
    let mut ledger = PositionLedger::new(LedgerConfig::from_config(&frictionless_config()));
    let now = OffsetDateTime::now_utc();

    let script = decisions(
        r#"[
            {"action": "enter", "direction": "long", "size": "100", "reason": "signal"},
            {"action": "reduce", "fraction": "0.5", "reason": "trim"},
            {"action": "exit", "reason": "target"}
        ]"#,
    );
    let prices = [dec!(100), dec!(110), dec!(120)];

    let events: Vec<LedgerEvent> = script
        .iter()
        .zip(prices)
        .map(|(decision, price)| ledger.apply("BTC/USDT", decision, price, now).unwrap())
        .collect();

    assert!(matches!(events[0], LedgerEvent::Opened { .. }));
    assert!(matches!(events[1], LedgerEvent::Reduced { .. }));
    // 0.5 * 10 + 0.5 * 20
    assert!(matches!(&events[2], LedgerEvent::Closed { realized_pnl, reason, .. }
        if *realized_pnl == dec!(15) && reason == "target"));

    let summary = ledger.summary();
    assert_eq!(summary.closed_trades, 1);
    assert_eq!(summary.wins, 1);
    assert_eq!(summary.total_realized_pnl, dec!(15));
}

#[test]
fn reduce_cap_from_config_flattens_symbol() {
    let mut ledger = PositionLedger::new(LedgerConfig::from_config(&frictionless_config()));
    let now = OffsetDateTime::now_utc();

    assert_ok!(ledger.enter("ETH/USDT", Direction::Short, dec!(300), dec!(3000), now));
    assert_ok!(ledger.reduce("ETH/USDT", dec!(0.1), dec!(2900), "trim", now));
    assert_ok!(ledger.reduce("ETH/USDT", dec!(0.1), dec!(2900), "trim", now));

    let event = assert_ok!(ledger.reduce("ETH/USDT", dec!(0.1), dec!(2900), "trim", now));
    assert!(matches!(event, LedgerEvent::Closed { .. }));
    assert!(ledger.position("ETH/USDT").is_none());
    assert_eq!(
        assert_err!(ledger.reduce("ETH/USDT", dec!(0.1), dec!(2900), "trim", now)),
        LedgerError::NoOpenPosition("ETH/USDT".to_string())
    );
}

#[test]
fn fees_and_slippage_turn_flat_trade_negative() {
    let mut ledger = PositionLedger::new(LedgerConfig::from_config(&Config::default()));
    let now = OffsetDateTime::now_utc();

    ledger.enter("SOL/USDT", Direction::Long, dec!(1000), dec!(100), now).unwrap();
    ledger.exit("SOL/USDT", dec!(100), "flat", now).unwrap();

    let trade = &ledger.closed_trades()[0];
    assert!(trade.realized_pnl < Decimal::ZERO);
    assert!(!trade.is_win());
    assert_eq!(trade.exit_price, Some(dec!(99.95)));
}

#[test]
fn liquidation_leaves_unpriced_symbols_open() {
    let mut ledger = PositionLedger::new(LedgerConfig::from_config(&frictionless_config()));
    let now = OffsetDateTime::now_utc();

    for symbol in ["A/USDT", "B/USDT", "C/USDT"] {
        ledger.enter(symbol, Direction::Long, dec!(10), dec!(1), now).unwrap();
    }

    let prices = HashMap::from([
        ("A/USDT".to_string(), dec!(2)),
        ("C/USDT".to_string(), dec!(0.5)),
    ]);
    let events = ledger.liquidate_all(&prices, now);

    assert_eq!(events.len(), 2);
    let open: Vec<&str> = ledger.open_positions().iter().map(|p| p.symbol.as_str()).collect();
    assert_eq!(open, vec!["B/USDT"]);

    let summary = ledger.summary();
    assert_eq!((summary.wins, summary.losses), (1, 1));
    assert_eq!(summary.total_realized_pnl, dec!(5));
}

#[tokio::test]
async fn paper_trader_walks_venue_book() {
    let feed = MockFeed::new("paper");
    feed.set_order_book(OrderBook::from_levels(
        "BTC/USDT",
        vec![PriceLevel::new(dec!(49990), dec!(0.2)), PriceLevel::new(dec!(49980), dec!(1))],
        vec![PriceLevel::new(dec!(50010), dec!(0.2)), PriceLevel::new(dec!(50020), dec!(1))],
    ));

    let config = Config {
        paper_mode: true,
        ..frictionless_config()
    };
    let mut trader = PaperTrader::from_config(Arc::new(feed), &config);

    let outcome = trader
        .execute(
            "BTC/USDT",
            &TradeDecision::enter(Direction::Short, dec!(25000), "signal"),
            dec!(50000),
        )
        .await
        .unwrap();

    let fills = outcome.fills.unwrap();
    assert_eq!(fills.requested, dec!(0.5));
    assert_eq!(fills.fills.len(), 2);
    assert_eq!(fills.fills[0].price, dec!(49990));
    assert_eq!(fills.filled() + fills.remaining, fills.requested);

    let again = trader
        .execute(
            "BTC/USDT",
            &TradeDecision::enter(Direction::Long, dec!(25000), "again"),
            dec!(50000),
        )
        .await;
    assert!(matches!(
        again,
        Err(AppError::Ledger(LedgerError::PositionAlreadyOpen(_)))
    ));
}
