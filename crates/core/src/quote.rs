//! Price quote data.

use chrono::{DateTime, Duration, Utc};
use compact_str::CompactString;
use serde::{Deserialize, Serialize};

/// A point-in-time price observation for one asset.
///
/// Quotes live only in the feed client's in-memory cache; they are never
/// persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    /// Canonical upstream asset id (e.g., "bitcoin").
    pub asset: CompactString,
    /// Price in USD.
    pub price: f64,
    /// When the upstream fetch happened.
    pub fetched_at: DateTime<Utc>,
    /// Upstream source identifier.
    pub source: CompactString,
    /// Set when this quote is older than the cache TTL and was served as a
    /// fallback after a failed refresh.
    pub stale: bool,
}

impl PriceQuote {
    /// Create a fresh quote fetched right now.
    pub fn new(asset: impl Into<CompactString>, price: f64, source: &str) -> Self {
        Self {
            asset: asset.into(),
            price,
            fetched_at: Utc::now(),
            source: CompactString::new(source),
            stale: false,
        }
    }

    /// Age of this quote relative to `now`.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.fetched_at
    }

    /// Whether this quote is older than the given TTL.
    pub fn is_expired(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        self.age(now) >= ttl
    }

    /// Mark as stale (served past its TTL).
    pub fn into_stale(mut self) -> Self {
        self.stale = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_quote() {
        let q = PriceQuote::new("bitcoin", 50_000.0, "coingecko");
        assert!(!q.stale);
        assert_eq!(q.asset, "bitcoin");
        assert_eq!(q.source, "coingecko");
    }

    #[test]
    fn test_expiry() {
        let mut q = PriceQuote::new("bitcoin", 50_000.0, "coingecko");
        let now = q.fetched_at;

        assert!(!q.is_expired(Duration::seconds(60), now + Duration::seconds(59)));
        assert!(q.is_expired(Duration::seconds(60), now + Duration::seconds(60)));

        q = q.into_stale();
        assert!(q.stale);
    }
}
