//! Alert evaluation engine.
//!
//! Drives one evaluation tick at a time: loads active subscriptions,
//! resolves prices through a [`pricewatch_feed::PriceSource`], fires
//! edge-triggered alerts under cooldown, and applies delivery outcomes back
//! to the store.

pub mod evaluator;
pub mod sink;

pub use evaluator::{EngineError, Evaluator, TickOutcome};
pub use sink::{AlertSink, DeliveryError};
