//! Price source seam consumed by the alert evaluator.

use async_trait::async_trait;
use pricewatch_core::PriceQuote;
use std::collections::HashMap;

/// Resolves current quotes for a set of assets.
///
/// Implementations never fail the whole call: assets whose price cannot be
/// resolved this round are simply absent from the result, and the caller
/// decides whether to skip or retry next tick.
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Fetch quotes for the given canonical asset ids, deduplicated.
    /// Quotes served past their TTL carry `stale: true`.
    async fn quotes(&self, assets: &[String]) -> HashMap<String, PriceQuote>;
}
