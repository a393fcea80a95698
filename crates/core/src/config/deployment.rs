//! Deployment file: chain, contracts, tracked tokens and exclusions.
//!
//! Values are kept as strings here; `${VAR}` references are expanded and
//! addresses parsed by the loader.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::position::TrancheId;

/// Full deployment configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentConfig {
    pub deployment: DeploymentDetails,
    pub contracts: DeploymentContracts,
    #[serde(default)]
    pub gas: GasSettings,
    #[serde(default)]
    pub exclusions: Exclusions,
    #[serde(default)]
    pub tokens: Vec<TokenEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentDetails {
    /// Deployment name (e.g., "moremoney-avalanche")
    pub name: String,
    pub chain_id: u64,
    pub rpc_url: String,
    /// Cached position snapshot (JSON)
    pub position_feed_url: String,
    #[serde(default = "default_coingecko_url")]
    pub coingecko_url: String,
}

fn default_coingecko_url() -> String {
    "https://api.coingecko.com/api/v3".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentContracts {
    /// StableLending2 ledger
    pub stable_lending: String,
    /// StableLending2Liquidation
    pub liquidation: String,
    pub strategy_viewer: String,
    pub oracle: String,
    /// Peg currency; also funds rebalancing bids
    pub money_token: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GasPricing {
    #[default]
    Legacy,
    Eip1559,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GasSettings {
    #[serde(default)]
    pub pricing: GasPricing,
    /// Applied to `eth_estimateGas`
    #[serde(default = "default_limit_multiplier")]
    pub limit_multiplier: f64,
    #[serde(default = "default_max_gas_price")]
    pub max_gas_price_gwei: f64,
    #[serde(default = "default_gas_price")]
    pub default_gas_price_gwei: f64,
    #[serde(default = "default_priority_fee")]
    pub priority_fee_gwei: f64,
    /// Used when estimation fails
    #[serde(default = "default_fallback_gas_limit")]
    pub fallback_gas_limit: u64,
}

fn default_limit_multiplier() -> f64 {
    1.3
}
fn default_max_gas_price() -> f64 {
    200.0
}
fn default_gas_price() -> f64 {
    25.0
}
fn default_priority_fee() -> f64 {
    1.5
}
fn default_fallback_gas_limit() -> u64 {
    2_000_000
}

impl Default for GasSettings {
    fn default() -> Self {
        Self {
            pricing: GasPricing::default(),
            limit_multiplier: default_limit_multiplier(),
            max_gas_price_gwei: default_max_gas_price(),
            default_gas_price_gwei: default_gas_price(),
            priority_fee_gwei: default_priority_fee(),
            fallback_gas_limit: default_fallback_gas_limit(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Exclusions {
    #[serde(default)]
    pub tranche_ids: Vec<TrancheId>,
}

/// Collateral token and the strategies holding it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenEntry {
    #[serde(default)]
    pub symbol: Option<String>,
    pub address: String,
    pub strategies: Vec<String>,
    /// CoinGecko id; tokens without one have no market quote
    #[serde(default)]
    pub coingecko_id: Option<String>,
}

impl DeploymentConfig {
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: DeploymentConfig = toml::from_str(&content)?;
        Ok(config)
    }
}
