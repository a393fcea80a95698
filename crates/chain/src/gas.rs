//! Gas pricing for oracle updates and liquidation transactions.
//!
//! Avalanche C-Chain accepts both legacy and EIP-1559 transactions; the
//! deployment file picks one through [`GasSettings::pricing`].

use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};

use alloy::eips::BlockNumberOrTag;
use alloy::network::TransactionBuilder;
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

use tranche_core::config::{GasPricing, GasSettings};

const GWEI: f64 = 1e9;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GasParams {
    Legacy {
        gas_price: u128,
    },
    Eip1559 {
        max_fee_per_gas: u128,
        max_priority_fee_per_gas: u128,
    },
}

impl GasParams {
    pub fn effective_gas_price(&self) -> u128 {
        match self {
            GasParams::Legacy { gas_price } => *gas_price,
            GasParams::Eip1559 { max_fee_per_gas, .. } => *max_fee_per_gas,
        }
    }
}

#[async_trait]
pub trait GasStrategy: Send + Sync + Debug {
    async fn fetch_params(&self, rpc_url: &str) -> Result<GasParams>;

    fn apply_gas(&self, tx: &mut TransactionRequest, params: &GasParams);

    fn strategy_name(&self) -> &'static str;
}

/// Node gas price, capped. Falls back to the last seen price on RPC errors.
#[derive(Debug)]
pub struct LegacyGasStrategy {
    max_gas_price: u128,
    last_gas_price: AtomicU64,
}

impl LegacyGasStrategy {
    pub fn new(default_gas_price: u128, max_gas_price: u128) -> Self {
        Self {
            max_gas_price,
            last_gas_price: AtomicU64::new(default_gas_price.min(u64::MAX as u128) as u64),
        }
    }

    fn capped(&self, price: u128) -> u128 {
        price.min(self.max_gas_price)
    }
}

#[async_trait]
impl GasStrategy for LegacyGasStrategy {
    async fn fetch_params(&self, rpc_url: &str) -> Result<GasParams> {
        let provider = ProviderBuilder::new().on_http(rpc_url.parse()?);
        let gas_price = match provider.get_gas_price().await {
            Ok(price) => {
                let price = self.capped(price);
                self.last_gas_price.store(price as u64, Ordering::Relaxed);
                price
            }
            Err(e) => {
                debug!(error = %e, "Gas price query failed, using last value");
                self.last_gas_price.load(Ordering::Relaxed) as u128
            }
        };
        Ok(GasParams::Legacy { gas_price })
    }

    fn apply_gas(&self, tx: &mut TransactionRequest, params: &GasParams) {
        tx.set_gas_price(self.capped(params.effective_gas_price()));
    }

    fn strategy_name(&self) -> &'static str {
        "legacy"
    }
}

/// `max_fee = 2 * base_fee + tip`, capped.
#[derive(Debug)]
pub struct Eip1559GasStrategy {
    priority_fee: u128,
    max_fee_cap: u128,
}

impl Eip1559GasStrategy {
    pub fn new(priority_fee: u128, max_fee_cap: u128) -> Self {
        Self {
            priority_fee,
            max_fee_cap,
        }
    }

    fn max_fee(&self, base_fee: u128, priority_fee: u128) -> u128 {
        (base_fee.saturating_mul(2) + priority_fee).min(self.max_fee_cap)
    }
}

#[async_trait]
impl GasStrategy for Eip1559GasStrategy {
    async fn fetch_params(&self, rpc_url: &str) -> Result<GasParams> {
        let provider = ProviderBuilder::new().on_http(rpc_url.parse()?);
        let block = provider
            .get_block_by_number(BlockNumberOrTag::Latest)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Latest block not available"))?;

        let base_fee = block
            .header
            .base_fee_per_gas
            .map(|b| b as u128)
            .ok_or_else(|| anyhow::anyhow!("Latest block has no base fee"))?;
        let priority_fee = self.priority_fee.min(self.max_fee_cap);

        Ok(GasParams::Eip1559 {
            max_fee_per_gas: self.max_fee(base_fee, priority_fee),
            max_priority_fee_per_gas: priority_fee,
        })
    }

    fn apply_gas(&self, tx: &mut TransactionRequest, params: &GasParams) {
        match params {
            GasParams::Eip1559 {
                max_fee_per_gas,
                max_priority_fee_per_gas,
            } => {
                tx.set_max_fee_per_gas(*max_fee_per_gas);
                tx.set_max_priority_fee_per_gas(*max_priority_fee_per_gas);
            }
            GasParams::Legacy { gas_price } => {
                tx.set_max_fee_per_gas(*gas_price);
                tx.set_max_priority_fee_per_gas(self.priority_fee.min(*gas_price));
            }
        }
    }

    fn strategy_name(&self) -> &'static str {
        "eip1559"
    }
}

pub fn create_gas_strategy(settings: &GasSettings) -> Box<dyn GasStrategy> {
    let max = (settings.max_gas_price_gwei * GWEI) as u128;
    match settings.pricing {
        GasPricing::Eip1559 => Box::new(Eip1559GasStrategy::new(
            (settings.priority_fee_gwei * GWEI) as u128,
            max,
        )),
        GasPricing::Legacy => Box::new(LegacyGasStrategy::new(
            (settings.default_gas_price_gwei * GWEI) as u128,
            max,
        )),
    }
}

/// Scale an estimate by the configured multiplier.
pub fn padded_gas_limit(estimate: u64, multiplier: f64) -> u64 {
    if multiplier <= 1.0 {
        return estimate;
    }
    let permille = (multiplier * 1000.0).round() as u64;
    estimate.saturating_mul(permille).div_ceil(1000)
}
