//! CoinGecko simple-price client used as the market reference.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use alloy::primitives::Address;
use anyhow::{Context, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{debug, instrument};

use tranche_core::u256_math::f64_to_wad;
use tranche_core::{PriceFeed, PriceQuote, PriceSource};

/// `{"wrapped-avax": {"usd": 21.3}}`
type SimplePriceResponse = HashMap<String, HashMap<String, f64>>;

#[derive(Clone)]
struct CachedQuote {
    quote: PriceQuote,
    fetched_at: Instant,
}

#[derive(Clone)]
pub struct CoinGeckoClient {
    client: reqwest::Client,
    base_url: String,
    ids: Arc<HashMap<Address, String>>,
    cache: Arc<DashMap<Address, CachedQuote>>,
    cache_ttl: Duration,
}

impl std::fmt::Debug for CoinGeckoClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoinGeckoClient")
            .field("base_url", &self.base_url)
            .field("tokens", &self.ids.len())
            .field("cache_ttl", &self.cache_ttl)
            .finish()
    }
}

impl CoinGeckoClient {
    pub fn new(base_url: impl Into<String>, ids: HashMap<Address, String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            ids: Arc::new(ids),
            cache: Arc::new(DashMap::new()),
            cache_ttl: Duration::from_secs(20),
        })
    }

    pub fn with_cache_ttl(mut self, cache_ttl: Duration) -> Self {
        self.cache_ttl = cache_ttl;
        self
    }

    pub fn coingecko_id(&self, token: &Address) -> Option<&str> {
        self.ids.get(token).map(String::as_str)
    }

    fn cached(&self, token: &Address) -> Option<PriceQuote> {
        self.cache
            .get(token)
            .filter(|c| c.fetched_at.elapsed() < self.cache_ttl)
            .map(|c| c.quote.clone())
    }

    async fn fetch_usd(&self, id: &str) -> Result<f64> {
        let url = format!("{}/simple/price", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("ids", id), ("vs_currencies", "usd")])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("CoinGecko error: {} - {}", status, body);
        }

        let body: SimplePriceResponse = response.json().await?;
        usd_price(&body, id)
    }
}

fn usd_price(body: &SimplePriceResponse, id: &str) -> Result<f64> {
    let price = body
        .get(id)
        .and_then(|prices| prices.get("usd"))
        .copied()
        .ok_or_else(|| anyhow::anyhow!("No usd price for {}", id))?;
    if !price.is_finite() || price < 0.0 {
        anyhow::bail!("Invalid usd price for {}: {}", id, price);
    }
    Ok(price)
}

#[async_trait]
impl PriceFeed for CoinGeckoClient {
    fn source(&self) -> PriceSource {
        PriceSource::ExternalMarket
    }

    #[instrument(skip_all, fields(token = %token))]
    async fn get_price(&self, token: Address) -> Result<PriceQuote> {
        let Some(id) = self.coingecko_id(&token) else {
            return Ok(PriceQuote::unavailable(token, PriceSource::ExternalMarket));
        };
        if let Some(quote) = self.cached(&token) {
            return Ok(quote);
        }

        let usd = self.fetch_usd(id).await?;
        let quote = PriceQuote::new(token, PriceSource::ExternalMarket, f64_to_wad(usd));
        debug!(id, usd, "Market price");

        self.cache.insert(
            token,
            CachedQuote {
                quote: quote.clone(),
                fetched_at: Instant::now(),
            },
        );
        Ok(quote)
    }
}
