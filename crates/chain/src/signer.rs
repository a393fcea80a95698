//! Bot wallet: key loading, nonce tracking and transaction submission.
//!
//! Every state-changing call the bot makes (oracle refreshes and
//! liquidations) goes through [`TransactionSender::send`], which waits for
//! the receipt and treats a revert as an error.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use tranche_core::config::GasSettings;

use crate::gas::{create_gas_strategy, padded_gas_limit, GasStrategy};

/// Key file read when `PRIVATE_KEY` is unset.
pub const KEY_FILE_NAME: &str = ".liquidation-bot";

/// Private key from `PRIVATE_KEY`, else from `$HOME/.liquidation-bot`.
pub fn load_private_key() -> Result<String> {
    if let Ok(key) = std::env::var("PRIVATE_KEY") {
        if !key.trim().is_empty() {
            return Ok(key.trim().to_string());
        }
    }
    let home = std::env::var("HOME").context("HOME is not set and PRIVATE_KEY is missing")?;
    read_key_file(PathBuf::from(home).join(KEY_FILE_NAME))
}

pub fn read_key_file(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    let key = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read key file {:?}", path))?;
    let key = key.trim();
    if key.is_empty() {
        anyhow::bail!("Key file {:?} is empty", path);
    }
    Ok(key.to_string())
}

/// Locally tracked nonce, resynced from the chain after failures.
pub struct NonceManager {
    next: AtomicU64,
}

impl NonceManager {
    pub fn new(initial_nonce: u64) -> Self {
        Self {
            next: AtomicU64::new(initial_nonce),
        }
    }

    #[inline]
    pub fn next(&self) -> u64 {
        self.next.fetch_add(1, Ordering::SeqCst)
    }

    #[inline]
    pub fn current(&self) -> u64 {
        self.next.load(Ordering::SeqCst)
    }

    /// Adopt the chain's pending count, even when it is lower.
    pub fn reset(&self, chain_nonce: u64) {
        self.next.store(chain_nonce, Ordering::SeqCst);
    }
}

/// Signs and submits transactions from the bot account.
pub struct TransactionSender {
    rpc_url: String,
    wallet: EthereumWallet,
    address: Address,
    chain_id: u64,
    nonce: NonceManager,
    gas_strategy: Box<dyn GasStrategy>,
    gas_limit_multiplier: f64,
    fallback_gas_limit: u64,
}

impl TransactionSender {
    pub async fn connect(
        private_key: &str,
        rpc_url: &str,
        chain_id: u64,
        gas: &GasSettings,
    ) -> Result<Self> {
        let signer: PrivateKeySigner = private_key
            .trim_start_matches("0x")
            .parse()
            .context("Invalid private key")?;
        let address = signer.address();

        let provider = ProviderBuilder::new().on_http(rpc_url.parse()?);
        let initial_nonce = provider
            .get_transaction_count(address)
            .await
            .context("Failed to fetch account nonce")?;

        let gas_strategy = create_gas_strategy(gas);

        info!(
            address = %address,
            chain_id,
            nonce = initial_nonce,
            gas_strategy = gas_strategy.strategy_name(),
            "Transaction sender ready"
        );

        Ok(Self {
            rpc_url: rpc_url.to_string(),
            wallet: EthereumWallet::from(signer),
            address,
            chain_id,
            nonce: NonceManager::new(initial_nonce),
            gas_strategy,
            gas_limit_multiplier: gas.limit_multiplier,
            fallback_gas_limit: gas.fallback_gas_limit,
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Submit a call and wait for it to be mined.
    pub async fn send(&self, to: Address, calldata: Bytes, label: &'static str) -> Result<B256> {
        let started = Instant::now();
        let gas_params = self.gas_strategy.fetch_params(&self.rpc_url).await?;

        let provider = ProviderBuilder::new()
            .wallet(self.wallet.clone())
            .on_http(self.rpc_url.parse()?);

        let base = TransactionRequest::default()
            .with_from(self.address)
            .with_to(to)
            .with_input(calldata)
            .with_value(U256::ZERO)
            .with_chain_id(self.chain_id);

        let gas_limit = match provider.estimate_gas(base.clone()).await {
            Ok(estimate) => padded_gas_limit(estimate, self.gas_limit_multiplier),
            Err(e) => {
                debug!(label, error = %e, "Gas estimation failed, using fallback limit");
                self.fallback_gas_limit
            }
        };

        let nonce = self.nonce.next();
        let mut tx = base.with_nonce(nonce).with_gas_limit(gas_limit);
        self.gas_strategy.apply_gas(&mut tx, &gas_params);

        info!(
            label,
            to = %to,
            nonce,
            gas_limit,
            gas_price_gwei = gas_params.effective_gas_price() / 1_000_000_000,
            "Sending transaction"
        );

        let pending = match provider.send_transaction(tx).await {
            Ok(pending) => pending,
            Err(e) => {
                self.resync_nonce().await;
                return Err(anyhow::Error::new(e).context(format!("{} submission failed", label)));
            }
        };
        let tx_hash = *pending.tx_hash();

        let receipt = match pending.get_receipt().await {
            Ok(receipt) => receipt,
            Err(e) => {
                self.resync_nonce().await;
                return Err(anyhow::Error::new(e).context(format!("{} receipt for {}", label, tx_hash)));
            }
        };

        if receipt.status() {
            info!(
                label,
                tx_hash = %tx_hash,
                block = receipt.block_number.unwrap_or(0),
                gas_used = receipt.gas_used,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Transaction confirmed"
            );
            Ok(tx_hash)
        } else {
            warn!(label, tx_hash = %tx_hash, "Transaction reverted, resyncing nonce");
            self.resync_nonce().await;
            anyhow::bail!("{} reverted: {}", label, tx_hash)
        }
    }

    pub async fn resync_nonce(&self) {
        let provider = match self.rpc_url.parse() {
            Ok(url) => ProviderBuilder::new().on_http(url),
            Err(e) => {
                warn!(error = %e, "Invalid RPC URL, nonce not resynced");
                return;
            }
        };
        match provider.get_transaction_count(self.address).await {
            Ok(chain_nonce) => {
                self.nonce.reset(chain_nonce);
                debug!(nonce = chain_nonce, "Nonce resynced");
            }
            Err(e) => warn!(error = %e, "Failed to resync nonce"),
        }
    }
}

impl std::fmt::Debug for TransactionSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionSender")
            .field("address", &self.address)
            .field("chain_id", &self.chain_id)
            .field("gas_strategy", &self.gas_strategy.strategy_name())
            .finish_non_exhaustive()
    }
}
