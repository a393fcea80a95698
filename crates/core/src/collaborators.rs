//! Boundary traits between the risk engine and the outside world.
//!
//! Implementations live in `tranche-chain` (contract reads and transactions)
//! and `tranche-api` (HTTP feeds). Errors cross the boundary as
//! `anyhow::Error` and are mapped to [`EngineError::Transport`] by the engine.
//!
//! [`EngineError::Transport`]: crate::EngineError::Transport

use std::sync::Arc;

use alloy::primitives::{Address, B256, U256};
use async_trait::async_trait;

use crate::position::{CachedPositionSet, PositionSnapshot, TrancheId};
use crate::price::{PriceQuote, PriceSource};

/// Current batch of positions, deduplicated by tranche id.
#[async_trait]
pub trait PositionSource: Send + Sync {
    async fn get_positions(&self) -> anyhow::Result<Vec<PositionSnapshot>>;
}

/// Cached position snapshot published off-chain.
#[async_trait]
pub trait SnapshotFeed: Send + Sync {
    async fn cached_positions(&self) -> anyhow::Result<CachedPositionSet>;
}

/// One price source. Unknown tokens yield an unavailable quote, not an error.
#[async_trait]
pub trait PriceFeed: Send + Sync {
    fn source(&self) -> PriceSource;

    async fn get_price(&self, token: Address) -> anyhow::Result<PriceQuote>;
}

/// Dispatches `GetPrice(token, source)` to the matching feed.
#[derive(Clone)]
pub struct PriceSources {
    pub on_chain: Arc<dyn PriceFeed>,
    pub market: Arc<dyn PriceFeed>,
}

impl PriceSources {
    pub fn new(on_chain: Arc<dyn PriceFeed>, market: Arc<dyn PriceFeed>) -> Self {
        Self { on_chain, market }
    }

    pub async fn get_price(&self, token: Address, source: PriceSource) -> anyhow::Result<PriceQuote> {
        match source {
            PriceSource::OnChainOracle => self.on_chain.get_price(token).await,
            PriceSource::ExternalMarket => self.market.get_price(token).await,
        }
    }
}

#[async_trait]
pub trait TokenMetadata: Send + Sync {
    async fn decimals(&self, token: Address) -> anyhow::Result<u8>;

    /// Protocol valuation multiplier of one token unit (WAD).
    async fn value_per_1e18(&self, token: Address) -> anyhow::Result<U256>;
}

/// Writes a fresh price into the protocol oracle.
#[async_trait]
pub trait OracleUpdater: Send + Sync {
    async fn request_update(&self, token: Address) -> anyhow::Result<B256>;
}

#[async_trait]
pub trait BidTargetQuoter: Send + Sync {
    async fn query_bid_target(&self, tranche_id: TrancheId, requested_collateral_value: U256)
        -> anyhow::Result<U256>;
}

/// Stable balance available to fund rebalancing bids (WAD).
#[async_trait]
pub trait FundingSource: Send + Sync {
    async fn available_funding(&self) -> anyhow::Result<U256>;
}

#[async_trait]
pub trait LiquidationSubmitter: Send + Sync {
    /// Account that receives liquidated collateral.
    fn settlement_account(&self) -> Address;

    async fn submit_liquidation(
        &self,
        tranche_id: TrancheId,
        collateral_requested: U256,
        rebalancing_bid: U256,
        recipient: Address,
    ) -> anyhow::Result<B256>;
}
