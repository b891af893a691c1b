//! Profit and cost calculations for cross-venue opportunities.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use time::OffsetDateTime;

use super::fees::FeeSchedule;

/// Where an opportunity's prices came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PriceSource {
    /// Volume-weighted average over book depth.
    OrderBook,
    /// Ticker price (thin book fallback).
    Ticker,
}

/// Detected cross-venue arbitrage opportunity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opportunity {
    /// Normalized symbol.
    pub symbol: String,
    /// Venue to buy on.
    pub buy_venue: String,
    /// Venue to sell on.
    pub sell_venue: String,
    /// Executable buy price (before fees).
    pub buy_price: Decimal,
    /// Executable sell price (before fees).
    pub sell_price: Decimal,
    /// Fee-adjusted net profit as a percentage of the fee-adjusted cost.
    pub profit_pct: Decimal,
    /// Fee-adjusted net profit in quote currency for `amount`.
    pub net_profit: Decimal,
    /// Base-asset amount the prices were computed for.
    pub amount: Decimal,
    /// Buy venue allows withdrawing the base asset.
    pub buy_withdraw_allowed: bool,
    /// Sell venue allows depositing the base asset.
    pub sell_deposit_allowed: bool,
    /// Buy-side price source.
    pub buy_source: PriceSource,
    /// Sell-side price source.
    pub sell_source: PriceSource,
    /// Timestamp when opportunity was detected.
    #[serde(with = "time::serde::rfc3339")]
    pub detected_at: OffsetDateTime,
}

impl Opportunity {
    /// Raw spread before fees, in percent of the buy price.
    pub fn raw_spread_pct(&self) -> Decimal {
        price_diff_pct(self.buy_price, self.sell_price)
    }

    /// Either side was priced from a ticker instead of book depth.
    pub fn used_ticker_fallback(&self) -> bool {
        self.buy_source == PriceSource::Ticker || self.sell_source == PriceSource::Ticker
    }
}

/// Fee-adjusted economics of buying on one venue and selling on another.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfitBreakdown {
    /// Buy price including taker fee.
    pub effective_buy: Decimal,
    /// Sell price net of taker fee.
    pub effective_sell: Decimal,
    /// Flat withdrawal fee charged.
    pub withdraw_fee: Decimal,
    /// `(effective_sell - effective_buy) * amount - withdraw_fee`.
    pub net_profit: Decimal,
    /// `net_profit / (effective_buy * amount) * 100`.
    pub profit_pct: Decimal,
}

impl ProfitBreakdown {
    /// Net profit is strictly positive and meets the threshold.
    pub fn is_profitable(&self, min_profit_pct: Decimal) -> bool {
        self.net_profit > Decimal::ZERO && self.profit_pct >= min_profit_pct
    }
}

/// Price difference in percent: `(sell - buy) / buy * 100`.
pub fn price_diff_pct(buy: Decimal, sell: Decimal) -> Decimal {
    if buy <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    (sell - buy) / buy * Decimal::ONE_HUNDRED
}

/// Evaluate a buy/sell pair for `amount` units of `base_asset`.
///
/// The withdrawal fee charged is the sell venue's flat fee for the asset.
pub fn evaluate(
    fees: &FeeSchedule,
    buy_venue: &str,
    sell_venue: &str,
    base_asset: &str,
    buy_price: Decimal,
    sell_price: Decimal,
    amount: Decimal,
) -> ProfitBreakdown {
    let effective_buy = fees.effective_buy(buy_venue, buy_price);
    let effective_sell = fees.effective_sell(sell_venue, sell_price);
    let withdraw_fee = fees.withdraw_fee(sell_venue, base_asset);

    let net_profit = (effective_sell - effective_buy) * amount - withdraw_fee;
    let cost = effective_buy * amount;
    let profit_pct = if cost > Decimal::ZERO {
        net_profit / cost * Decimal::ONE_HUNDRED
    } else {
        Decimal::ZERO
    };

    ProfitBreakdown {
        effective_buy,
        effective_sell,
        withdraw_fee,
        net_profit,
        profit_pct,
    }
}
