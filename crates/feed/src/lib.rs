//! Market-data client for the price-alert bot.
//!
//! Fetches spot prices from the upstream API in batched calls, caches them
//! in memory with a bounded TTL, and falls back to stale cached quotes when
//! the upstream is unavailable so the evaluator can skip-and-retry instead
//! of failing a tick.

pub mod client;
pub mod error;
pub mod source;

pub use client::{FeedConfig, PriceFeed};
pub use error::FeedError;
pub use source::PriceSource;
