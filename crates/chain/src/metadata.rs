//! Token decimals and strategy valuation, cached per token.

use alloy::primitives::{Address, U256};
use alloy::providers::ProviderBuilder;
use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::join_all;
use tracing::{debug, warn};

use tranche_core::TokenMetadata;

use crate::contracts::{IStrategyViewer, IERC20};

/// Reads `decimals()` from token contracts and `valuePer1e18` from the
/// strategy viewer.
///
/// Decimals never change, so they are cached for the life of the process.
/// Strategy valuations are refreshed by [`refresh_strategies`].
///
/// [`refresh_strategies`]: TokenMetadataReader::refresh_strategies
pub struct TokenMetadataReader {
    rpc_url: String,
    strategy_viewer: Address,
    lending: Address,
    tokens: Vec<Address>,
    strategies: Vec<Address>,
    decimals: DashMap<Address, u8>,
    value_per_1e18: DashMap<Address, U256>,
}

impl TokenMetadataReader {
    /// `tokens` and `strategies` are parallel lists, one entry per pair.
    pub fn new(
        rpc_url: impl Into<String>,
        strategy_viewer: Address,
        lending: Address,
        tokens: Vec<Address>,
        strategies: Vec<Address>,
    ) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            strategy_viewer,
            lending,
            tokens,
            strategies,
            decimals: DashMap::new(),
            value_per_1e18: DashMap::new(),
        }
    }

    /// Fetch decimals of every configured token in parallel.
    pub async fn warm_up(&self) {
        let mut distinct = self.tokens.clone();
        distinct.sort();
        distinct.dedup();

        let results = join_all(distinct.iter().map(|t| self.decimals(*t))).await;
        for (token, result) in distinct.iter().zip(results) {
            if let Err(e) = result {
                warn!(token = %token, error = %e, "Failed to read token decimals");
            }
        }
    }

    /// Re-read `viewMetadata` for all configured pairs. The last strategy
    /// listed for a token determines its valuation.
    pub async fn refresh_strategies(&self) -> Result<usize> {
        if self.tokens.is_empty() {
            return Ok(0);
        }
        let provider = ProviderBuilder::new().on_http(self.rpc_url.parse()?);
        let viewer = IStrategyViewer::new(self.strategy_viewer, &provider);

        let rows = viewer
            .viewMetadata(self.lending, self.tokens.clone(), self.strategies.clone())
            .call()
            .await?
            ._0;

        for row in &rows {
            self.value_per_1e18.insert(row.token, row.valuePer1e18);
        }
        debug!(strategies = rows.len(), "Strategy metadata refreshed");
        Ok(rows.len())
    }

    fn cached_value(&self, token: &Address) -> Option<U256> {
        self.value_per_1e18.get(token).map(|v| *v)
    }
}

#[async_trait]
impl TokenMetadata for TokenMetadataReader {
    async fn decimals(&self, token: Address) -> Result<u8> {
        if let Some(cached) = self.decimals.get(&token) {
            return Ok(*cached);
        }
        let provider = ProviderBuilder::new().on_http(self.rpc_url.parse()?);
        let decimals = IERC20::new(token, &provider).decimals().call().await?._0;
        self.decimals.insert(token, decimals);
        Ok(decimals)
    }

    async fn value_per_1e18(&self, token: Address) -> Result<U256> {
        if let Some(value) = self.cached_value(&token) {
            return Ok(value);
        }
        self.refresh_strategies().await?;
        self.cached_value(&token)
            .ok_or_else(|| anyhow::anyhow!("No strategy metadata for token {}", token))
    }
}
