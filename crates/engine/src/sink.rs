//! Delivery seam between the evaluator and the messaging transport.

use async_trait::async_trait;
use pricewatch_core::AlertEvent;
use thiserror::Error;

/// Delivery failure classification.
///
/// The evaluator reacts differently to each: unreachable recipients get
/// their subscription deactivated, transient failures are deferred to the
/// next tick (no `mark_triggered`, so the alert fires again).
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The recipient can never be reached again (blocked the bot, account
    /// deleted, chat gone). Retrying is pointless.
    #[error("Recipient unreachable: {0}")]
    Unreachable(String),

    /// Something went wrong this time; the next tick may succeed.
    #[error("Transient delivery failure: {0}")]
    Transient(String),
}

/// Delivers triggered alerts to the messaging transport.
///
/// Implementations perform their own bounded in-tick retries for transient
/// transport errors before returning [`DeliveryError::Transient`].
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn deliver(&self, event: &AlertEvent) -> Result<(), DeliveryError>;
}
