//! Alert events emitted by the evaluator.

use crate::{Direction, PriceQuote, Subscription};
use chrono::{DateTime, Utc};
use compact_str::CompactString;
use serde::{Deserialize, Serialize};

/// A triggered alert, produced once per crossing (subject to cooldown) and
/// consumed by the notifier. Not persisted beyond the owning subscription's
/// `last_triggered_at` update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    /// Subscription that fired.
    pub subscription_id: i64,
    /// Chat to notify.
    pub chat_id: i64,
    /// Canonical upstream asset id.
    pub asset: CompactString,
    /// Price that satisfied the condition.
    pub triggered_price: f64,
    /// The subscription's threshold.
    pub threshold: f64,
    /// The subscription's direction.
    pub direction: Direction,
    /// Whether the triggering quote was a stale-cache fallback.
    pub stale_quote: bool,
    /// Evaluation time.
    pub timestamp: DateTime<Utc>,
}

impl AlertEvent {
    /// Build an event from a subscription and the quote that triggered it.
    pub fn from_trigger(sub: &Subscription, quote: &PriceQuote, now: DateTime<Utc>) -> Self {
        Self {
            subscription_id: sub.id,
            chat_id: sub.chat_id,
            asset: sub.asset.clone(),
            triggered_price: quote.price,
            threshold: sub.threshold,
            direction: sub.direction,
            stale_quote: quote.stale,
            timestamp: now,
        }
    }
}
