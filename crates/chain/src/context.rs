use std::sync::Arc;

use alloy::primitives::Address;
use anyhow::Result;

use tranche_core::ResolvedDeployment;

use crate::signer::TransactionSender;

/// Connection shared by every chain collaborator.
#[derive(Debug, Clone)]
pub struct ChainContext {
    rpc_url: String,
    chain_id: u64,
    sender: Arc<TransactionSender>,
}

impl ChainContext {
    pub async fn connect(deployment: &ResolvedDeployment, private_key: &str) -> Result<Self> {
        let sender = TransactionSender::connect(
            private_key,
            &deployment.rpc_url,
            deployment.chain_id,
            &deployment.gas,
        )
        .await?;

        Ok(Self {
            rpc_url: deployment.rpc_url.clone(),
            chain_id: deployment.chain_id,
            sender: Arc::new(sender),
        })
    }

    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Bot account; signs every transaction and holds the funding balance.
    pub fn signer_address(&self) -> Address {
        self.sender.address()
    }

    pub fn sender(&self) -> &Arc<TransactionSender> {
        &self.sender
    }
}
