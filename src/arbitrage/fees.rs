//! Taker and withdrawal fee schedule.

use std::collections::HashMap;

use rust_decimal::Decimal;

use crate::config::Config;

/// Per-venue taker fees and per-(venue, asset) flat withdrawal fees.
#[derive(Debug, Clone)]
pub struct FeeSchedule {
    default_taker: Decimal,
    taker: HashMap<String, Decimal>,
    withdraw: HashMap<(String, String), Decimal>,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self::new(Decimal::new(1, 3)) // 0.1%
    }
}

impl FeeSchedule {
    /// Schedule charging `default_taker` everywhere and no withdrawal fees.
    pub fn new(default_taker: Decimal) -> Self {
        Self {
            default_taker,
            taker: HashMap::new(),
            withdraw: HashMap::new(),
        }
    }

    /// Build from `DEFAULT_TAKER_FEE`, `VENUE_TAKER_FEES` and `WITHDRAW_FEES`.
    pub fn from_config(config: &Config) -> Result<Self, String> {
        Ok(Self {
            default_taker: config.default_taker_fee,
            taker: config.parsed_taker_fees()?,
            withdraw: config.parsed_withdraw_fees()?,
        })
    }

    /// Override the taker fee for a venue.
    pub fn with_taker_fee(mut self, venue: &str, rate: Decimal) -> Self {
        self.taker.insert(venue.to_lowercase(), rate);
        self
    }

    /// Set a flat withdrawal fee (quote currency) for an asset on a venue.
    pub fn with_withdraw_fee(mut self, venue: &str, asset: &str, fee: Decimal) -> Self {
        self.withdraw
            .insert((venue.to_lowercase(), asset.to_uppercase()), fee);
        self
    }

    /// Taker fee rate for a venue.
    pub fn taker_fee(&self, venue: &str) -> Decimal {
        self.taker
            .get(&venue.to_lowercase())
            .copied()
            .unwrap_or(self.default_taker)
    }

    /// Flat withdrawal fee for an asset on a venue; zero when unknown.
    pub fn withdraw_fee(&self, venue: &str, asset: &str) -> Decimal {
        self.withdraw
            .get(&(venue.to_lowercase(), asset.to_uppercase()))
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    /// Buy price after the taker fee: `price * (1 + fee)`.
    pub fn effective_buy(&self, venue: &str, price: Decimal) -> Decimal {
        price * (Decimal::ONE + self.taker_fee(venue))
    }

    /// Sell price after the taker fee: `price * (1 - fee)`.
    pub fn effective_sell(&self, venue: &str, price: Decimal) -> Decimal {
        price * (Decimal::ONE - self.taker_fee(venue))
    }
}
