//! Liquidation contract access and the bot's stable balance.

use alloy::primitives::{Address, B256, U256};
use alloy::providers::ProviderBuilder;
use alloy::sol_types::SolCall;
use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use tranche_core::{BidTargetQuoter, FundingSource, LiquidationSubmitter, TrancheId};

use crate::context::ChainContext;
use crate::contracts::{IStableLending2Liquidation, IERC20};

pub struct LiquidationContract {
    ctx: ChainContext,
    address: Address,
}

impl LiquidationContract {
    pub fn new(ctx: ChainContext, address: Address) -> Self {
        Self { ctx, address }
    }
}

#[async_trait]
impl BidTargetQuoter for LiquidationContract {
    async fn query_bid_target(
        &self,
        tranche_id: TrancheId,
        requested_collateral_value: U256,
    ) -> Result<U256> {
        let provider = ProviderBuilder::new().on_http(self.ctx.rpc_url().parse()?);
        let liquidation = IStableLending2Liquidation::new(self.address, &provider);
        let target = liquidation
            .viewBidTarget(U256::from(tranche_id), requested_collateral_value)
            .call()
            .await?
            ._0;
        Ok(target)
    }
}

#[async_trait]
impl LiquidationSubmitter for LiquidationContract {
    fn settlement_account(&self) -> Address {
        self.ctx.signer_address()
    }

    async fn submit_liquidation(
        &self,
        tranche_id: TrancheId,
        collateral_requested: U256,
        rebalancing_bid: U256,
        recipient: Address,
    ) -> Result<B256> {
        let calldata = IStableLending2Liquidation::liquidateCall {
            trancheId: U256::from(tranche_id),
            collateralRequested: collateral_requested,
            rebalancingBid: rebalancing_bid,
            recipient,
        }
        .abi_encode();

        info!(
            tranche_id,
            collateral_requested = %collateral_requested,
            rebalancing_bid = %rebalancing_bid,
            recipient = %recipient,
            "Submitting liquidation"
        );
        self.ctx
            .sender()
            .send(self.address, calldata.into(), "liquidate")
            .await
    }
}

/// Balance of the stable token held by the bot account (18 decimals).
pub struct FundingReader {
    ctx: ChainContext,
    token: Address,
}

impl FundingReader {
    pub fn new(ctx: ChainContext, token: Address) -> Self {
        Self { ctx, token }
    }
}

#[async_trait]
impl FundingSource for FundingReader {
    async fn available_funding(&self) -> Result<U256> {
        let provider = ProviderBuilder::new().on_http(self.ctx.rpc_url().parse()?);
        let balance = IERC20::new(self.token, &provider)
            .balanceOf(self.ctx.signer_address())
            .call()
            .await?
            ._0;
        Ok(balance)
    }
}
