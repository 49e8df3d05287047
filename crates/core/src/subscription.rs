//! Subscription definitions and trigger semantics.

use chrono::{DateTime, Duration, Utc};
use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Default cooldown between repeated fires of the same subscription.
pub const DEFAULT_COOLDOWN_SECS: i64 = 3600;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown direction: {0} (expected 'above' or 'below')")]
pub struct ParseDirectionError(pub String);

/// Which way the price must cross the threshold to trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Trigger when price >= threshold.
    Above,
    /// Trigger when price <= threshold.
    Below,
}

impl Direction {
    /// Stable string form used in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Above => "above",
            Direction::Below => "below",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Direction {
    type Err = ParseDirectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "above" | "over" | ">=" => Ok(Direction::Above),
            "below" | "under" | "<=" => Ok(Direction::Below),
            other => Err(ParseDirectionError(other.to_string())),
        }
    }
}

/// A user's standing request to be alerted when an asset crosses a threshold.
///
/// Owned by the subscription store; the evaluator only ever sees per-tick
/// snapshots of these rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    /// Database row id.
    pub id: i64,
    /// Telegram chat that owns this subscription.
    pub chat_id: i64,
    /// Canonical upstream asset id (e.g., "bitcoin").
    pub asset: CompactString,
    /// Threshold price in USD.
    pub threshold: f64,
    /// Crossing direction.
    pub direction: Direction,
    /// Soft-deletion flag; inactive rows are never evaluated.
    pub active: bool,
    /// Minimum seconds between repeated fires.
    pub cooldown_secs: i64,
    /// When this subscription last fired, if ever.
    pub last_triggered_at: Option<DateTime<Utc>>,
    /// Row creation time.
    pub created_at: DateTime<Utc>,
}

impl Subscription {
    /// Check whether a price satisfies the trigger condition.
    /// Both directions are inclusive of the threshold itself.
    pub fn condition_met(&self, price: f64) -> bool {
        match self.direction {
            Direction::Above => price >= self.threshold,
            Direction::Below => price <= self.threshold,
        }
    }

    /// Check whether the subscription is still inside its cooldown window.
    pub fn in_cooldown(&self, now: DateTime<Utc>) -> bool {
        match self.last_triggered_at {
            Some(last) => now - last < Duration::seconds(self.cooldown_secs),
            None => false,
        }
    }

    /// Whether this subscription should fire right now at the given price.
    pub fn should_fire(&self, price: f64, now: DateTime<Utc>) -> bool {
        self.active && self.condition_met(price) && !self.in_cooldown(now)
    }
}
