//! Integration tests for the cross-venue scanner and ledger.
//!
//! Everything runs against `MockFeed` except the `live` module, whose tests
//! hit real venues. Run those with: cargo test --test integration -- --ignored

mod ledger;
mod live;
mod scanner;
