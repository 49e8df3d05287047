//! Per-tick alert evaluation.

use crate::sink::{AlertSink, DeliveryError};
use chrono::Utc;
use pricewatch_core::AlertEvent;
use pricewatch_feed::PriceSource;
use pricewatch_store::{StoreError, SubscriptionStore};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Summary of one evaluation tick, for logging and health reporting.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickOutcome {
    /// Active subscriptions loaded.
    pub subscriptions: usize,
    /// Distinct assets looked up.
    pub assets: usize,
    /// Assets with no resolvable price this tick.
    pub unresolved_assets: usize,
    /// Events that fired (condition met, outside cooldown).
    pub fired: usize,
    /// Events successfully delivered and marked triggered.
    pub delivered: usize,
    /// Subscriptions deactivated because the recipient is unreachable.
    pub deactivated: usize,
    /// Events deferred to the next tick after transient delivery failure.
    pub deferred: usize,
}

/// Evaluates all active subscriptions once per scheduler tick.
///
/// Holds read-only snapshots of subscriptions; every mutation goes back
/// through the store, which serializes writers.
pub struct Evaluator {
    store: SubscriptionStore,
    prices: Arc<dyn PriceSource>,
    sink: Arc<dyn AlertSink>,
}

impl Evaluator {
    pub fn new(
        store: SubscriptionStore,
        prices: Arc<dyn PriceSource>,
        sink: Arc<dyn AlertSink>,
    ) -> Self {
        Self {
            store,
            prices,
            sink,
        }
    }

    /// Run one evaluation tick.
    ///
    /// Errors from individual subscriptions or assets are isolated: a bad
    /// asset or a failed delivery never aborts the rest of the tick. Only a
    /// store failure at load time fails the tick as a whole.
    pub async fn run_tick(&self) -> Result<TickOutcome, EngineError> {
        let mut outcome = TickOutcome::default();

        let subscriptions = self.store.list_all_active().await?;
        outcome.subscriptions = subscriptions.len();
        if subscriptions.is_empty() {
            debug!("No active subscriptions, skipping tick");
            return Ok(outcome);
        }

        // One price lookup per distinct asset per tick.
        let mut assets: Vec<String> = Vec::new();
        for sub in &subscriptions {
            let asset = sub.asset.to_string();
            if !assets.contains(&asset) {
                assets.push(asset);
            }
        }
        outcome.assets = assets.len();

        let quotes = self.prices.quotes(&assets).await;
        outcome.unresolved_assets = assets
            .iter()
            .filter(|a| !quotes.contains_key(a.as_str()))
            .count();
        if outcome.unresolved_assets > 0 {
            warn!(
                unresolved = outcome.unresolved_assets,
                "Some assets had no resolvable price, retrying next tick"
            );
        }

        let now = Utc::now();
        for sub in &subscriptions {
            let quote = match quotes.get(sub.asset.as_str()) {
                Some(q) => q,
                // No price this tick: skip, do not fail. Retried next tick.
                None => continue,
            };

            if !sub.should_fire(quote.price, now) {
                continue;
            }

            let event = AlertEvent::from_trigger(sub, quote, now);
            outcome.fired += 1;
            debug!(
                subscription_id = event.subscription_id,
                asset = %event.asset,
                price = event.triggered_price,
                threshold = event.threshold,
                direction = %event.direction,
                "Alert fired"
            );

            match self.sink.deliver(&event).await {
                Ok(()) => {
                    // Only a delivered alert consumes the cooldown window.
                    if let Err(e) = self.store.mark_triggered(sub.id, now).await {
                        error!(subscription_id = sub.id, error = %e, "Failed to mark subscription triggered");
                    } else {
                        outcome.delivered += 1;
                    }
                }
                Err(DeliveryError::Unreachable(reason)) => {
                    warn!(
                        subscription_id = sub.id,
                        chat_id = sub.chat_id,
                        reason = %reason,
                        "Recipient unreachable, deactivating subscription"
                    );
                    match self.store.deactivate_unowned(sub.id).await {
                        Ok(()) => outcome.deactivated += 1,
                        // Already deactivated by a concurrent command; fine.
                        Err(StoreError::NotFound) => {}
                        Err(e) => {
                            error!(subscription_id = sub.id, error = %e, "Failed to deactivate subscription");
                        }
                    }
                }
                Err(DeliveryError::Transient(reason)) => {
                    warn!(
                        subscription_id = sub.id,
                        reason = %reason, "Delivery deferred to next tick"
                    );
                    outcome.deferred += 1;
                }
            }
        }

        info!(
            subscriptions = outcome.subscriptions,
            assets = outcome.assets,
            fired = outcome.fired,
            delivered = outcome.delivered,
            deferred = outcome.deferred,
            deactivated = outcome.deactivated,
            "Tick complete"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Duration;
    use pretty_assertions::assert_eq;
    use pricewatch_core::{Direction, PriceQuote};
    use pricewatch_store::StoreLimits;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Fixed price table; assets not listed resolve to nothing.
    struct FixedPrices {
        prices: Mutex<HashMap<String, PriceQuote>>,
    }

    impl FixedPrices {
        fn new(entries: &[(&str, f64)]) -> Arc<Self> {
            let mut prices = HashMap::new();
            for (asset, price) in entries {
                prices.insert(asset.to_string(), PriceQuote::new(*asset, *price, "test"));
            }
            Arc::new(Self {
                prices: Mutex::new(prices),
            })
        }

        fn set(&self, asset: &str, price: f64) {
            self.prices
                .lock()
                .unwrap()
                .insert(asset.to_string(), PriceQuote::new(asset, price, "test"));
        }
    }

    #[async_trait]
    impl PriceSource for FixedPrices {
        async fn quotes(&self, assets: &[String]) -> HashMap<String, PriceQuote> {
            let prices = self.prices.lock().unwrap();
            assets
                .iter()
                .filter_map(|a| prices.get(a).map(|q| (a.clone(), q.clone())))
                .collect()
        }
    }

    /// Records delivered events; can be told to fail.
    #[derive(Default)]
    struct RecordingSink {
        delivered: Mutex<Vec<AlertEvent>>,
        fail_with: Mutex<Option<&'static str>>,
    }

    impl RecordingSink {
        fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        fn delivered(&self) -> Vec<AlertEvent> {
            self.delivered.lock().unwrap().clone()
        }

        fn fail_unreachable(&self) {
            *self.fail_with.lock().unwrap() = Some("unreachable");
        }

        fn fail_transient(&self) {
            *self.fail_with.lock().unwrap() = Some("transient");
        }

        fn succeed(&self) {
            *self.fail_with.lock().unwrap() = None;
        }
    }

    #[async_trait]
    impl AlertSink for RecordingSink {
        async fn deliver(&self, event: &AlertEvent) -> Result<(), DeliveryError> {
            match *self.fail_with.lock().unwrap() {
                Some("unreachable") => Err(DeliveryError::Unreachable("blocked".to_string())),
                Some(_) => Err(DeliveryError::Transient("timeout".to_string())),
                None => {
                    self.delivered.lock().unwrap().push(event.clone());
                    Ok(())
                }
            }
        }
    }

    async fn memory_store() -> SubscriptionStore {
        SubscriptionStore::connect("sqlite::memory:", StoreLimits::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_fires_at_inclusive_boundary() {
        let store = memory_store().await;
        store
            .add(1, "bitcoin", 50_000.0, Direction::Above)
            .await
            .unwrap();
        store
            .add(2, "bitcoin", 50_000.0, Direction::Below)
            .await
            .unwrap();

        let prices = FixedPrices::new(&[("bitcoin", 50_000.0)]);
        let sink = RecordingSink::new();
        let evaluator = Evaluator::new(store, prices, sink.clone());

        let outcome = evaluator.run_tick().await.unwrap();
        // Price exactly at threshold fires in both directions.
        assert_eq!(outcome.fired, 2);
        assert_eq!(outcome.delivered, 2);
        assert_eq!(sink.delivered().len(), 2);
    }

    #[tokio::test]
    async fn test_cooldown_suppresses_refire() {
        let store = memory_store().await;
        store
            .add_with_cooldown(1, "bitcoin", 50_000.0, Direction::Above, 60)
            .await
            .unwrap();

        let prices = FixedPrices::new(&[("bitcoin", 51_000.0)]);
        let sink = RecordingSink::new();
        let evaluator = Evaluator::new(store, prices, sink.clone());

        // Condition holds on both ticks, run back to back (well inside the
        // 60s cooldown): exactly one event.
        let first = evaluator.run_tick().await.unwrap();
        let second = evaluator.run_tick().await.unwrap();
        assert_eq!(first.delivered, 1);
        assert_eq!(second.fired, 0);
        assert_eq!(sink.delivered().len(), 1);
    }

    #[tokio::test]
    async fn test_refires_after_cooldown_elapsed() {
        let store = memory_store().await;
        let sub = store
            .add_with_cooldown(1, "bitcoin", 50_000.0, Direction::Above, 60)
            .await
            .unwrap();

        // Simulate a fire 2 minutes ago.
        store
            .mark_triggered(sub.id, Utc::now() - Duration::seconds(120))
            .await
            .unwrap();

        let prices = FixedPrices::new(&[("bitcoin", 51_000.0)]);
        let sink = RecordingSink::new();
        let evaluator = Evaluator::new(store, prices, sink.clone());

        let outcome = evaluator.run_tick().await.unwrap();
        assert_eq!(outcome.fired, 1);
        assert_eq!(outcome.delivered, 1);
    }

    #[tokio::test]
    async fn test_tick_is_idempotent_once_marked() {
        let store = memory_store().await;
        store
            .add(1, "bitcoin", 50_000.0, Direction::Above)
            .await
            .unwrap();

        let prices = FixedPrices::new(&[("bitcoin", 51_000.0)]);
        let sink = RecordingSink::new();
        let evaluator = Evaluator::new(store, prices, sink.clone());

        evaluator.run_tick().await.unwrap();
        // Same prices, same store: replaying evaluation yields no new events.
        let replay = evaluator.run_tick().await.unwrap();
        assert_eq!(replay.fired, 0);
        assert_eq!(sink.delivered().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_asset_does_not_block_others() {
        let store = memory_store().await;
        store
            .add(1, "bitcoin", 50_000.0, Direction::Above)
            .await
            .unwrap();
        store
            .add(1, "ethereum", 3_000.0, Direction::Above)
            .await
            .unwrap();

        // Only ethereum resolves.
        let prices = FixedPrices::new(&[("ethereum", 3_500.0)]);
        let sink = RecordingSink::new();
        let evaluator = Evaluator::new(store, prices, sink.clone());

        let outcome = evaluator.run_tick().await.unwrap();
        assert_eq!(outcome.unresolved_assets, 1);
        assert_eq!(outcome.delivered, 1);
        assert_eq!(sink.delivered()[0].asset, "ethereum");
    }

    #[tokio::test]
    async fn test_unreachable_recipient_deactivates() {
        let store = memory_store().await;
        store
            .add(1, "bitcoin", 50_000.0, Direction::Above)
            .await
            .unwrap();

        let prices = FixedPrices::new(&[("bitcoin", 51_000.0)]);
        let sink = RecordingSink::new();
        sink.fail_unreachable();
        let evaluator = Evaluator::new(store.clone(), prices, sink.clone());

        let outcome = evaluator.run_tick().await.unwrap();
        assert_eq!(outcome.deactivated, 1);
        assert_eq!(outcome.delivered, 0);
        assert!(store.list_all_active().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_transient_failure_retries_next_tick() {
        let store = memory_store().await;
        store
            .add(1, "bitcoin", 50_000.0, Direction::Above)
            .await
            .unwrap();

        let prices = FixedPrices::new(&[("bitcoin", 51_000.0)]);
        let sink = RecordingSink::new();
        sink.fail_transient();
        let evaluator = Evaluator::new(store.clone(), prices, sink.clone());

        let outcome = evaluator.run_tick().await.unwrap();
        assert_eq!(outcome.deferred, 1);
        assert_eq!(outcome.delivered, 0);
        // mark_triggered was not called, so the subscription is untouched.
        let subs = store.list_all_active().await.unwrap();
        assert_eq!(subs[0].last_triggered_at, None);

        // Transport recovers: the same alert goes out on the next tick.
        sink.succeed();
        let retry = evaluator.run_tick().await.unwrap();
        assert_eq!(retry.delivered, 1);
    }

    #[tokio::test]
    async fn test_below_direction_fires_on_drop() {
        let store = memory_store().await;
        store
            .add(1, "ethereum", 3_000.0, Direction::Below)
            .await
            .unwrap();

        let prices = FixedPrices::new(&[("ethereum", 3_200.0)]);
        let sink = RecordingSink::new();
        let evaluator = Evaluator::new(store, prices.clone(), sink.clone());

        // Above threshold: nothing.
        let quiet = evaluator.run_tick().await.unwrap();
        assert_eq!(quiet.fired, 0);

        // Price drops through the threshold: fires.
        prices.set("ethereum", 2_900.0);
        let outcome = evaluator.run_tick().await.unwrap();
        assert_eq!(outcome.delivered, 1);
        assert_eq!(sink.delivered()[0].triggered_price, 2_900.0);
    }

    #[tokio::test]
    async fn test_stale_quote_still_evaluates() {
        let store = memory_store().await;
        store
            .add(1, "bitcoin", 50_000.0, Direction::Above)
            .await
            .unwrap();

        let prices = FixedPrices::new(&[]);
        {
            let mut table = prices.prices.lock().unwrap();
            let quote = PriceQuote::new("bitcoin", 51_000.0, "test").into_stale();
            table.insert("bitcoin".to_string(), quote);
        }
        let sink = RecordingSink::new();
        let evaluator = Evaluator::new(store, prices, sink.clone());

        let outcome = evaluator.run_tick().await.unwrap();
        assert_eq!(outcome.delivered, 1);
        assert!(sink.delivered()[0].stale_quote);
    }

    #[tokio::test]
    async fn test_empty_store_is_quiet() {
        let store = memory_store().await;
        let prices = FixedPrices::new(&[("bitcoin", 51_000.0)]);
        let sink = RecordingSink::new();
        let evaluator = Evaluator::new(store, prices, sink.clone());

        let outcome = evaluator.run_tick().await.unwrap();
        assert_eq!(outcome, TickOutcome::default());
    }
}
