//! Volume and market-cap filters for venues listing many symbols.

use std::collections::HashMap;

use rust_decimal::Decimal;

use crate::config::Config;
use crate::feed::{Ticker, Transport};

use super::detector::Quote;

/// Thresholds applied to large listings before candidates are built.
#[derive(Debug, Clone, PartialEq)]
pub struct LiquidityFilter {
    /// Feeds listing more symbols than this are filtered.
    pub many_symbols_threshold: usize,
    /// Minimum 24h quote volume.
    pub min_quote_volume: Option<Decimal>,
    /// Minimum market capitalization. Only feeds that report a cap are affected.
    pub min_market_cap: Option<Decimal>,
}

impl Default for LiquidityFilter {
    fn default() -> Self {
        Self {
            many_symbols_threshold: 200,
            min_quote_volume: None,
            min_market_cap: None,
        }
    }
}

/// Liquidity metrics for one symbol collected across venues.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SymbolMetrics {
    /// Sum of known 24h quote volumes.
    pub quote_volume: Option<Decimal>,
    /// Largest known market cap.
    pub market_cap: Option<Decimal>,
}

impl LiquidityFilter {
    /// Create from config values.
    pub fn from_config(config: &Config) -> Self {
        Self {
            many_symbols_threshold: config.many_symbols_threshold,
            min_quote_volume: config.min_quote_volume,
            min_market_cap: config.min_market_cap,
        }
    }

    /// Whether any threshold is configured.
    pub fn is_active(&self) -> bool {
        self.min_quote_volume.is_some() || self.min_market_cap.is_some()
    }

    /// Whether a feed's listing should be prefiltered. Simulated feeds never are.
    pub fn applies_to(&self, transport: Transport, symbol_count: usize) -> bool {
        self.is_active()
            && transport != Transport::Simulated
            && symbol_count > self.many_symbols_threshold
    }

    /// Whether known metrics meet the thresholds. Unknown metrics pass.
    pub fn passes(&self, quote_volume: Option<Decimal>, market_cap: Option<Decimal>) -> bool {
        let volume_ok = match (self.min_quote_volume, quote_volume) {
            (Some(min), Some(volume)) => volume >= min,
            _ => true,
        };
        let cap_ok = match (self.min_market_cap, market_cap) {
            (Some(min), Some(cap)) => cap >= min,
            _ => true,
        };
        volume_ok && cap_ok
    }

    /// Check a single ticker.
    pub fn ticker_passes(&self, ticker: &Ticker) -> bool {
        self.passes(ticker.quote_volume, ticker.market_cap)
    }
}

/// Aggregate metrics per symbol from non-simulated quotes.
pub fn collect_metrics<'a>(
    quotes: impl IntoIterator<Item = (&'a String, &'a Vec<Quote>)>,
) -> HashMap<String, SymbolMetrics> {
    quotes
        .into_iter()
        .map(|(symbol, quotes)| {
            let mut metrics = SymbolMetrics::default();
            for quote in quotes {
                if quote.feed.transport() == Transport::Simulated {
                    continue;
                }
                if let Some(volume) = quote.ticker.quote_volume {
                    metrics.quote_volume = Some(metrics.quote_volume.unwrap_or(Decimal::ZERO) + volume);
                }
                if let Some(cap) = quote.ticker.market_cap {
                    metrics.market_cap = Some(metrics.market_cap.map_or(cap, |c| c.max(cap)));
                }
            }
            (symbol.clone(), metrics)
        })
        .collect()
}
