//! Order book module for venue depth snapshots.
//!
//! This module handles:
//! - Order book types and data structures
//! - Book walking: VWAP, fill price and partial-fill calculations

pub mod aggregator;
pub mod types;

pub use aggregator::{calculate_fill_price, mid_price, vwap, walk_levels};
pub use types::{BookWalk, FillInfo, LevelTake, OrderBook, PriceLevel};
