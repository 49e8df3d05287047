//! Upstream REST price client with a TTL cache.

use crate::error::FeedError;
use crate::source::PriceSource;
use async_trait::async_trait;
use chrono::Utc;
use compact_str::CompactString;
use dashmap::DashMap;
use pricewatch_core::PriceQuote;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

const SOURCE_NAME: &str = "coingecko";

/// Feed client configuration.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Upstream API base URL.
    pub base_url: String,
    /// Quote currency requested from the upstream.
    pub vs_currency: String,
    /// How long a cached quote is considered fresh.
    pub cache_duration: Duration,
    /// Per-request HTTP timeout.
    pub api_timeout: Duration,
    /// Fetch attempts before giving up for this round.
    pub max_attempts: u32,
    /// Base delay between retries (multiplied by the attempt number).
    pub retry_backoff: Duration,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.coingecko.com/api/v3".to_string(),
            vs_currency: "usd".to_string(),
            cache_duration: Duration::from_secs(60),
            api_timeout: Duration::from_secs(10),
            max_attempts: 3,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

/// Batched price fetcher with an in-memory quote cache.
///
/// The cache is shared across ticks and across concurrent lookups within a
/// tick; eventual consistency is fine here, a slightly stale shared quote is
/// acceptable by design.
pub struct PriceFeed {
    client: reqwest::Client,
    cache: DashMap<CompactString, PriceQuote>,
    config: FeedConfig,
}

impl PriceFeed {
    /// Build a feed client. Fails only on an unusable HTTP configuration.
    pub fn new(config: FeedConfig) -> Result<Self, FeedError> {
        let client = reqwest::Client::builder()
            .timeout(config.api_timeout)
            .build()
            .map_err(|e| FeedError::InvalidConfig(e.to_string()))?;

        Ok(Self {
            client,
            cache: DashMap::new(),
            config,
        })
    }

    fn cache_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.config.cache_duration.as_secs() as i64)
    }

    fn cached_fresh(&self, asset: &str) -> Option<PriceQuote> {
        let entry = self.cache.get(asset)?;
        if entry.is_expired(self.cache_ttl(), Utc::now()) {
            return None;
        }
        Some(entry.clone())
    }

    fn cached_any(&self, asset: &str) -> Option<PriceQuote> {
        self.cache.get(asset).map(|e| e.clone())
    }

    fn cache_insert(&self, quote: PriceQuote) {
        self.cache.insert(quote.asset.clone(), quote);
    }

    /// One upstream call for a batch of assets.
    /// Response shape: `{"bitcoin":{"usd":117000.0}, ...}`
    async fn fetch_once(&self, assets: &[&str]) -> Result<HashMap<String, f64>, FeedError> {
        let url = format!(
            "{}/simple/price?ids={}&vs_currencies={}",
            self.config.base_url,
            assets.join(","),
            self.config.vs_currency
        );

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(FeedError::UpstreamUnavailable(format!(
                "HTTP {}",
                response.status()
            )));
        }

        let json: serde_json::Value = response.json().await?;
        let object = json
            .as_object()
            .ok_or_else(|| FeedError::ParseError("expected JSON object".to_string()))?;

        let mut prices = HashMap::new();
        for (asset, entry) in object {
            if let Some(price) = entry[self.config.vs_currency.as_str()].as_f64() {
                prices.insert(asset.clone(), price);
            }
        }
        Ok(prices)
    }

    /// Fetch a batch with bounded retries and fixed backoff.
    async fn fetch_batch(&self, assets: &[&str]) -> Result<HashMap<String, f64>, FeedError> {
        let mut last_err = FeedError::UpstreamUnavailable("no attempts made".to_string());

        for attempt in 1..=self.config.max_attempts {
            match self.fetch_once(assets).await {
                Ok(prices) => {
                    debug!(
                        assets = assets.len(),
                        resolved = prices.len(),
                        attempt,
                        "Fetched prices"
                    );
                    return Ok(prices);
                }
                Err(e) if e.is_transient() && attempt < self.config.max_attempts => {
                    warn!(attempt, error = %e, "Price fetch failed, retrying");
                    tokio::time::sleep(self.config.retry_backoff * attempt).await;
                    last_err = e;
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_err)
    }

    /// Resolve quotes for a set of assets, batching the upstream call.
    ///
    /// Fresh cached quotes are served without a network round trip. On
    /// upstream failure, expired cached quotes are returned flagged stale;
    /// assets with no cached quote at all are absent from the result.
    pub async fn get_prices(&self, assets: &[String]) -> HashMap<String, PriceQuote> {
        let mut result = HashMap::new();
        let mut to_fetch: Vec<&str> = Vec::new();

        for asset in assets {
            if result.contains_key(asset.as_str()) {
                continue;
            }
            match self.cached_fresh(asset) {
                Some(quote) => {
                    result.insert(asset.clone(), quote);
                }
                None => {
                    if !to_fetch.contains(&asset.as_str()) {
                        to_fetch.push(asset);
                    }
                }
            }
        }

        if to_fetch.is_empty() {
            return result;
        }

        match self.fetch_batch(&to_fetch).await {
            Ok(prices) => {
                for asset in &to_fetch {
                    match prices.get(*asset) {
                        Some(&price) => {
                            let quote = PriceQuote::new(*asset, price, SOURCE_NAME);
                            self.cache_insert(quote.clone());
                            result.insert((*asset).to_string(), quote);
                        }
                        None => {
                            warn!(asset = *asset, "Upstream returned no price for asset");
                        }
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, assets = to_fetch.len(), "Price fetch exhausted retries, falling back to cache");
                for asset in &to_fetch {
                    if let Some(quote) = self.cached_any(asset) {
                        result.insert((*asset).to_string(), quote.into_stale());
                    }
                }
            }
        }

        result
    }

    /// Resolve a single asset's quote.
    pub async fn get_price(&self, asset: &str) -> Result<PriceQuote, FeedError> {
        let quotes = self.get_prices(&[asset.to_string()]).await;
        quotes
            .into_values()
            .next()
            .ok_or_else(|| FeedError::UnknownAsset(asset.to_string()))
    }
}

#[async_trait]
impl PriceSource for PriceFeed {
    async fn quotes(&self, assets: &[String]) -> HashMap<String, PriceQuote> {
        self.get_prices(assets).await
    }
}
