//! Symbol normalization across venue spellings.
//!
//! Venues disagree on separators (`BTCUSDT`, `BTC-USDT`, `BTC_USDT`, `btc/usdt`).
//! Everything inside the crate uses `BASE/QUOTE`.

/// Quote currencies recognized when a symbol has no separator.
pub const KNOWN_QUOTES: &[&str] = &[
    "USDT", "USDC", "BUSD", "FDUSD", "TUSD", "BTC", "ETH", "BNB", "EUR", "TRY", "USD",
];

const SEPARATORS: &[char] = &['/', '-', '_', ':'];

/// Normalize a venue symbol to `BASE/QUOTE`.
///
/// Separated symbols split on the first separator. Concatenated symbols match
/// the longest known quote suffix. Returns `None` when neither works.
pub fn normalize(raw: &str) -> Option<String> {
    let (base, quote) = split(raw)?;
    Some(format!("{base}/{quote}"))
}

/// Split a venue symbol into uppercase `(base, quote)`.
pub fn split(raw: &str) -> Option<(String, String)> {
    let upper = raw.trim().to_uppercase();
    if upper.is_empty() {
        return None;
    }

    if let Some((base, quote)) = upper.split_once(SEPARATORS) {
        if base.is_empty() || quote.is_empty() {
            return None;
        }
        return Some((base.to_string(), quote.to_string()));
    }

    KNOWN_QUOTES
        .iter()
        .filter(|quote| upper.len() > quote.len() && upper.ends_with(*quote))
        .max_by_key(|quote| quote.len())
        .map(|quote| {
            let base = &upper[..upper.len() - quote.len()];
            (base.to_string(), quote.to_string())
        })
}

/// Base asset of a symbol, uppercased.
pub fn base_asset(symbol: &str) -> Option<String> {
    split(symbol).map(|(base, _)| base)
}

/// Plausible venue spellings of a symbol, most common first.
pub fn spellings(symbol: &str) -> Vec<String> {
    match split(symbol) {
        Some((base, quote)) => vec![
            format!("{base}/{quote}"),
            format!("{base}{quote}"),
            format!("{base}-{quote}"),
            format!("{base}_{quote}"),
        ],
        None => vec![symbol.trim().to_uppercase()],
    }
}

/// Concatenated spelling (`BTCUSDT`), used by most venue wire protocols.
pub fn concatenated(symbol: &str) -> String {
    match split(symbol) {
        Some((base, quote)) => format!("{base}{quote}"),
        None => symbol.trim().to_uppercase(),
    }
}
