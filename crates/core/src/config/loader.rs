//! Resolves a deployment file into typed addresses and URLs.

use std::collections::HashMap;
use std::path::Path;

use alloy::primitives::Address;
use anyhow::{Context, Result};
use regex_lite::{Captures, Regex};
use tracing::info;

use super::deployment::{DeploymentConfig, GasSettings, TokenEntry};
use crate::position::TrancheId;

/// Deployment with every reference expanded and every address parsed.
#[derive(Debug, Clone)]
pub struct ResolvedDeployment {
    pub name: String,
    pub chain_id: u64,
    pub rpc_url: String,
    pub position_feed_url: String,
    pub coingecko_url: String,
    pub contracts: ResolvedContracts,
    pub gas: GasSettings,
    pub tokens: Vec<ResolvedToken>,
    pub excluded_tranches: Vec<TrancheId>,
}

#[derive(Debug, Clone, Copy)]
pub struct ResolvedContracts {
    pub stable_lending: Address,
    pub liquidation: Address,
    pub strategy_viewer: Address,
    pub oracle: Address,
    pub money_token: Address,
}

#[derive(Debug, Clone)]
pub struct ResolvedToken {
    pub symbol: Option<String>,
    pub address: Address,
    pub strategies: Vec<Address>,
    pub coingecko_id: Option<String>,
}

impl ResolvedDeployment {
    /// Parallel token/strategy lists as `StrategyViewer.viewMetadata` expects.
    pub fn token_strategy_pairs(&self) -> (Vec<Address>, Vec<Address>) {
        self.tokens
            .iter()
            .flat_map(|t| t.strategies.iter().map(move |s| (t.address, *s)))
            .unzip()
    }

    pub fn coingecko_ids(&self) -> HashMap<Address, String> {
        self.tokens
            .iter()
            .filter_map(|t| t.coingecko_id.clone().map(|id| (t.address, id)))
            .collect()
    }
}

/// Load and resolve a deployment file.
pub fn load_deployment(path: impl AsRef<Path>) -> Result<ResolvedDeployment> {
    let path = path.as_ref();
    let raw = DeploymentConfig::from_file(path)
        .with_context(|| format!("Failed to load deployment from {:?}", path))?;
    let resolved = resolve(&raw)?;
    info!(
        deployment = %resolved.name,
        chain_id = resolved.chain_id,
        tokens = resolved.tokens.len(),
        "Deployment loaded"
    );
    Ok(resolved)
}

/// Load the file named by `DEPLOYMENT_FILE`, or `config/deployment.toml`.
pub fn load_deployment_from_env() -> Result<ResolvedDeployment> {
    let path = std::env::var("DEPLOYMENT_FILE").unwrap_or_else(|_| "config/deployment.toml".to_string());
    load_deployment(path)
}

pub fn resolve(raw: &DeploymentConfig) -> Result<ResolvedDeployment> {
    let details = &raw.deployment;
    let contracts = &raw.contracts;

    let contracts = ResolvedContracts {
        stable_lending: parse_addr(&contracts.stable_lending, "stable_lending")?,
        liquidation: parse_addr(&contracts.liquidation, "liquidation")?,
        strategy_viewer: parse_addr(&contracts.strategy_viewer, "strategy_viewer")?,
        oracle: parse_addr(&contracts.oracle, "oracle")?,
        money_token: parse_addr(&contracts.money_token, "money_token")?,
    };

    let tokens = raw
        .tokens
        .iter()
        .map(resolve_token)
        .collect::<Result<Vec<_>>>()?;

    Ok(ResolvedDeployment {
        name: details.name.clone(),
        chain_id: details.chain_id,
        rpc_url: expand_env(&details.rpc_url)?,
        position_feed_url: expand_env(&details.position_feed_url)?,
        coingecko_url: expand_env(&details.coingecko_url)?,
        contracts,
        gas: raw.gas.clone(),
        tokens,
        excluded_tranches: raw.exclusions.tranche_ids.clone(),
    })
}

fn resolve_token(entry: &TokenEntry) -> Result<ResolvedToken> {
    let address = parse_addr(&entry.address, "token")?;
    let strategies = entry
        .strategies
        .iter()
        .map(|s| parse_addr(s, "strategy"))
        .collect::<Result<Vec<_>>>()
        .with_context(|| format!("Strategies of token {}", address))?;

    Ok(ResolvedToken {
        symbol: entry.symbol.clone(),
        address,
        strategies,
        coingecko_id: entry.coingecko_id.clone(),
    })
}

fn parse_addr(value: &str, field: &str) -> Result<Address> {
    let expanded = expand_env(value)?;
    if expanded.contains("${") {
        anyhow::bail!("Missing env var for {}: {}", field, expanded);
    }
    expanded
        .trim()
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid {} address '{}': {}", field, expanded, e))
}

/// Expand `${VAR}` and `${VAR:-default}`. Unset variables without a default
/// are left in place.
pub fn expand_env(value: &str) -> Result<String> {
    let re = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")?;
    let expanded = re.replace_all(value, |caps: &Captures<'_>| {
        let name = &caps[1];
        match (std::env::var(name), caps.get(2)) {
            (Ok(v), _) => v,
            (Err(_), Some(default)) => default.as_str().to_string(),
            (Err(_), None) => caps[0].to_string(),
        }
    });
    Ok(expanded.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::deployment::{DeploymentContracts, DeploymentDetails, Exclusions};

    fn raw() -> DeploymentConfig {
        DeploymentConfig {
            deployment: DeploymentDetails {
                name: "test".into(),
                chain_id: 43114,
                rpc_url: "${LOADER_TEST_RPC:-https://api.avax.network/ext/bc/C/rpc}".into(),
                position_feed_url: "http://feed".into(),
                coingecko_url: "http://cg".into(),
            },
            contracts: DeploymentContracts {
                stable_lending: "0x0000000000000000000000000000000000000001".into(),
                liquidation: "0x0000000000000000000000000000000000000002".into(),
                strategy_viewer: "0x0000000000000000000000000000000000000003".into(),
                oracle: "0x567Cf1675F5cb3c0457B35753d76e83E37CDBe96".into(),
                money_token: "0x0000000000000000000000000000000000000005".into(),
            },
            gas: GasSettings::default(),
            exclusions: Exclusions {
                tranche_ids: vec![400000005],
            },
            tokens: vec![
                TokenEntry {
                    symbol: Some("WAVAX".into()),
                    address: "0xB31f66AA3C1e785363F0875A1B74E27b85FD66c7".into(),
                    strategies: vec![
                        "0x0000000000000000000000000000000000000010".into(),
                        "0x0000000000000000000000000000000000000011".into(),
                    ],
                    coingecko_id: Some("wrapped-avax".into()),
                },
                TokenEntry {
                    symbol: None,
                    address: "0xF7D9281e8e363584973F946201b82ba72C965D27".into(),
                    strategies: vec!["0x0000000000000000000000000000000000000012".into()],
                    coingecko_id: None,
                },
            ],
        }
    }

    #[test]
    fn test_expand_env() {
        // Unique var names to avoid conflicts with parallel tests
        std::env::set_var("LOADER_TEST_VAR", "test_value");
        assert_eq!(expand_env("${LOADER_TEST_VAR}").unwrap(), "test_value");
        assert_eq!(
            expand_env("prefix_${LOADER_TEST_VAR}_suffix").unwrap(),
            "prefix_test_value_suffix"
        );
        assert_eq!(expand_env("${LOADER_TEST_UNSET:-fallback}").unwrap(), "fallback");
        assert_eq!(expand_env("${LOADER_TEST_UNSET}").unwrap(), "${LOADER_TEST_UNSET}");
        assert_eq!(expand_env("no_vars").unwrap(), "no_vars");
        std::env::remove_var("LOADER_TEST_VAR");
    }

    #[test]
    fn test_resolve() {
        let resolved = resolve(&raw()).unwrap();

        assert_eq!(resolved.rpc_url, "https://api.avax.network/ext/bc/C/rpc");
        assert_eq!(resolved.excluded_tranches, vec![400000005]);

        let (tokens, strategies) = resolved.token_strategy_pairs();
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[0], tokens[1]);
        assert_eq!(strategies[2], Address::with_last_byte(0x12));

        let ids = resolved.coingecko_ids();
        assert_eq!(ids.len(), 1);
        assert_eq!(ids[&resolved.tokens[0].address], "wrapped-avax");
    }

    #[test]
    fn test_unresolved_address_is_error() {
        let mut raw = raw();
        raw.contracts.liquidation = "${LOADER_TEST_NEVER_SET}".into();
        let err = resolve(&raw).unwrap_err();
        assert!(err.to_string().contains("liquidation"));
    }
}
