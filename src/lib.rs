//! Cross-venue crypto arbitrage scanner and fill simulator.
//!
//! Prices for the same asset drift apart across exchanges. This library keeps
//! live or polled snapshots from several venues, finds pairs where buying on
//! one venue and selling on another is profitable after fees, and simulates
//! acting on those signals with a position ledger.
//!
//! ```text
//! FOO/USDT  venue A ask: 100.00   venue B bid: 102.00
//! buy  A:  100.00 * 1.001 = 100.100
//! sell B:  102.00 * 0.999 = 101.898
//! ────────────────────────────────
//! net per unit:             1.798  (1.80%)
//! ```
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from environment
//! - [`error`]: Unified error types
//! - [`feed`]: Exchange feeds (streaming, polled, simulated) and their registry
//! - [`orderbook`]: Order book types and depth calculations
//! - [`arbitrage`]: Opportunity scanning and profit calculations
//! - [`trading`]: Fill simulation and the position ledger
//! - [`metrics`]: Prometheus metrics
//! - [`utils`]: Utility functions

pub mod arbitrage;
pub mod config;
pub mod error;
pub mod feed;
pub mod metrics;
pub mod orderbook;
pub mod trading;
pub mod utils;

pub use config::Config;
pub use error::{AppError, Result};
