//! Protocol peg oracle: on-chain quotes and price refresh transactions.

use std::sync::Arc;

use alloy::primitives::{Address, B256, U256};
use alloy::providers::ProviderBuilder;
use alloy::sol_types::SolCall;
use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, info};

use tranche_core::u256_math::one_unit;
use tranche_core::{OracleUpdater, PriceFeed, PriceQuote, PriceSource, TokenMetadata};

use crate::context::ChainContext;
use crate::contracts::IPegOracle;

/// Quotes one whole token in the peg currency (18 decimals), which is read
/// directly as a WAD USD value.
pub struct PegOracle {
    ctx: ChainContext,
    oracle: Address,
    peg_token: Address,
    metadata: Arc<dyn TokenMetadata>,
}

impl PegOracle {
    pub fn new(
        ctx: ChainContext,
        oracle: Address,
        peg_token: Address,
        metadata: Arc<dyn TokenMetadata>,
    ) -> Self {
        Self {
            ctx,
            oracle,
            peg_token,
            metadata,
        }
    }

    async fn unit_amount(&self, token: Address) -> Result<U256> {
        let decimals = self
            .metadata
            .decimals(token)
            .await
            .with_context(|| format!("decimals of {}", token))?;
        Ok(one_unit(decimals))
    }
}

#[async_trait]
impl PriceFeed for PegOracle {
    fn source(&self) -> PriceSource {
        PriceSource::OnChainOracle
    }

    async fn get_price(&self, token: Address) -> Result<PriceQuote> {
        let amount = self.unit_amount(token).await?;
        let provider = ProviderBuilder::new().on_http(self.ctx.rpc_url().parse()?);
        let oracle = IPegOracle::new(self.oracle, &provider);

        let value = oracle
            .viewAmountInPeg(token, amount, self.peg_token)
            .call()
            .await?
            ._0;

        debug!(token = %token, value = %value, "Oracle quote");
        Ok(PriceQuote::new(token, PriceSource::OnChainOracle, value))
    }
}

#[async_trait]
impl OracleUpdater for PegOracle {
    async fn request_update(&self, token: Address) -> Result<B256> {
        let amount = self.unit_amount(token).await?;
        let calldata = IPegOracle::getAmountInPegCall {
            token,
            inAmount: amount,
            pegCurrency: self.peg_token,
        }
        .abi_encode();

        info!(token = %token, "Requesting oracle price update");
        self.ctx
            .sender()
            .send(self.oracle, calldata.into(), "oracle update")
            .await
    }
}
