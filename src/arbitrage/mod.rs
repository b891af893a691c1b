//! Cross-venue opportunity scanning.
//!
//! This module handles:
//! - Fee schedules and profit calculations
//! - Candidate generation from ticker snapshots
//! - Same-asset and liquidity filtering
//! - The two-phase scan with order-book pricing

pub mod asset;
pub mod calculator;
pub mod detector;
pub mod fees;
pub mod liquidity;
pub mod scanner;

pub use asset::is_same_asset;
pub use calculator::{evaluate, price_diff_pct, Opportunity, PriceSource, ProfitBreakdown};
pub use detector::{build_candidates, Candidate, PairStats, Quote};
pub use fees::FeeSchedule;
pub use liquidity::LiquidityFilter;
pub use scanner::{OpportunityScanner, ScanOptions, ScanReport};
