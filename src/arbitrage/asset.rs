//! Same-asset heuristic for cross-venue pairs.
//!
//! Two venues listing `FOO/USDT` may list different tokens (a bridged copy on
//! another chain). The check is deliberately crude and biased toward rejection.

use std::collections::BTreeSet;

use crate::feed::symbol;

/// Substrings that identify a chain when they appear in venue or symbol text.
pub const CHAIN_HINTS: &[&str] = &[
    "sol", "eth", "erc20", "bep20", "bsc", "trc20", "tron", "matic", "polygon", "avax",
];

/// Chain hints present in a piece of text.
pub fn chain_hints(text: &str) -> BTreeSet<&'static str> {
    let lower = text.to_lowercase();
    CHAIN_HINTS
        .iter()
        .copied()
        .filter(|hint| lower.contains(hint))
        .collect()
}

/// Whether two listings plausibly refer to the same asset.
///
/// Base tokens must match exactly. When both sides carry chain hints, the hint
/// sets must be identical.
pub fn is_same_asset(buy_venue: &str, buy_symbol: &str, sell_venue: &str, sell_symbol: &str) -> bool {
    let (Some(buy_base), Some(sell_base)) = (symbol::base_asset(buy_symbol), symbol::base_asset(sell_symbol))
    else {
        return false;
    };
    if buy_base != sell_base {
        return false;
    }

    let buy_hints = chain_hints(&format!("{buy_venue} {buy_symbol}"));
    let sell_hints = chain_hints(&format!("{sell_venue} {sell_symbol}"));

    buy_hints.is_empty() || sell_hints.is_empty() || buy_hints == sell_hints
}
