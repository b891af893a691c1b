//! Cross-venue candidate generation from ticker snapshots.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use time::OffsetDateTime;
use tracing::trace;

use super::calculator::price_diff_pct;
use crate::feed::{ExchangeFeed, Ticker};

/// One venue's quote for a symbol.
#[derive(Clone)]
pub struct Quote {
    /// Feed that produced the quote.
    pub feed: Arc<dyn ExchangeFeed>,
    /// Venue name.
    pub venue: String,
    /// The ticker itself.
    pub ticker: Ticker,
}

impl std::fmt::Debug for Quote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Quote")
            .field("venue", &self.venue)
            .field("ticker", &self.ticker)
            .finish()
    }
}

impl Quote {
    /// Quoted price.
    pub fn price(&self) -> Decimal {
        self.ticker.price
    }
}

/// Ordered (buy, sell) pair for one symbol on two venues.
#[derive(Debug, Clone)]
pub struct Candidate {
    /// Normalized symbol.
    pub symbol: String,
    /// Base asset (uppercase).
    pub base_asset: String,
    /// Quote to buy at.
    pub buy: Quote,
    /// Quote to sell at.
    pub sell: Quote,
    /// `(sell - buy) / buy * 100` on ticker prices.
    pub raw_diff_pct: Decimal,
}

/// Why a pair was not turned into a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairRejection {
    /// Quotes too old or too far apart.
    Stale,
    /// Raw price difference below the prefilter.
    PriceDiff,
}

/// Whether two quotes are fresh enough to be paired.
///
/// A quote without a timestamp is not checked.
pub fn quotes_fresh(a: &Ticker, b: &Ticker, now: OffsetDateTime, window: Duration) -> bool {
    if a.age(now).is_some_and(|age| age > window) || b.age(now).is_some_and(|age| age > window) {
        return false;
    }

    match (a.timestamp, b.timestamp) {
        (Some(ta), Some(tb)) => {
            let skew = (ta - tb).abs();
            Duration::try_from(skew).map_or(false, |skew| skew <= window)
        }
        _ => true,
    }
}

/// Check one ordered pair.
pub fn check_pair(
    buy: &Quote,
    sell: &Quote,
    now: OffsetDateTime,
    max_staleness: Duration,
    min_price_diff_pct: Decimal,
) -> Result<Decimal, PairRejection> {
    if !quotes_fresh(&buy.ticker, &sell.ticker, now, max_staleness) {
        return Err(PairRejection::Stale);
    }

    let diff = price_diff_pct(buy.price(), sell.price());
    if diff < min_price_diff_pct {
        return Err(PairRejection::PriceDiff);
    }

    Ok(diff)
}

/// Counts from candidate generation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PairStats {
    /// Ordered pairs considered.
    pub pairs: usize,
    /// Rejected as stale.
    pub stale: usize,
    /// Rejected by the price-difference prefilter.
    pub price_diff: usize,
}

/// All ordered (buy, sell) pairs with distinct venues that pass the cheap checks.
pub fn build_candidates(
    market: &BTreeMap<String, Vec<Quote>>,
    now: OffsetDateTime,
    max_staleness: Duration,
    min_price_diff_pct: Decimal,
) -> (Vec<Candidate>, PairStats) {
    let mut candidates = Vec::new();
    let mut stats = PairStats::default();

    for (symbol, quotes) in market {
        if quotes.len() < 2 {
            continue;
        }
        let Some(base_asset) = crate::feed::symbol::base_asset(symbol) else {
            continue;
        };

        for buy in quotes {
            for sell in quotes {
                if buy.venue == sell.venue {
                    continue;
                }
                stats.pairs += 1;

                match check_pair(buy, sell, now, max_staleness, min_price_diff_pct) {
                    Ok(raw_diff_pct) => candidates.push(Candidate {
                        symbol: symbol.clone(),
                        base_asset: base_asset.clone(),
                        buy: buy.clone(),
                        sell: sell.clone(),
                        raw_diff_pct,
                    }),
                    Err(PairRejection::Stale) => {
                        trace!(symbol = %symbol, buy = %buy.venue, sell = %sell.venue, "Stale pair");
                        stats.stale += 1;
                    }
                    Err(PairRejection::PriceDiff) => stats.price_diff += 1,
                }
            }
        }
    }

    (candidates, stats)
}
