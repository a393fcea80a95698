//! Funding gate in front of liquidation submission.

use std::sync::Arc;

use alloy::primitives::{B256, U256};
use serde::Serialize;
use tracing::{info, warn};

use crate::bid_sizer::BidPlan;
use crate::collaborators::LiquidationSubmitter;
use crate::error::EngineError;
use crate::position::TrancheId;
use crate::u256_math::wad_to_f64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ExecutionOutcome {
    Submitted,
    SkippedInsufficientFunds,
    Failed,
    /// Dry run: gate passed, nothing sent.
    Simulated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub tranche_id: TrancheId,
    pub outcome: ExecutionOutcome,
    pub reason: Option<String>,
    pub tx_hash: Option<B256>,
}

impl ExecutionResult {
    fn new(tranche_id: TrancheId, outcome: ExecutionOutcome) -> Self {
        Self {
            tranche_id,
            outcome,
            reason: None,
            tx_hash: None,
        }
    }

    fn with_reason(mut self, reason: impl ToString) -> Self {
        self.reason = Some(reason.to_string());
        self
    }
}

/// Checks funding against the bid and submits when it suffices.
pub struct ExecutionGate {
    submitter: Arc<dyn LiquidationSubmitter>,
    dry_run: bool,
}

impl ExecutionGate {
    pub fn new(submitter: Arc<dyn LiquidationSubmitter>, dry_run: bool) -> Self {
        Self { submitter, dry_run }
    }

    /// Never calls the submitter when `available_funding < rebalancing_bid`.
    pub async fn execute(&self, plan: &BidPlan, available_funding: U256) -> ExecutionResult {
        let tranche_id = plan.tranche_id;

        if available_funding < plan.rebalancing_bid {
            let err = EngineError::InsufficientFunding {
                tranche_id,
                required: format!("{:.4}", wad_to_f64(plan.rebalancing_bid)),
                available: format!("{:.4}", wad_to_f64(available_funding)),
            };
            info!(tranche_id, "{}", err);
            return ExecutionResult::new(tranche_id, ExecutionOutcome::SkippedInsufficientFunds).with_reason(err);
        }

        if self.dry_run {
            info!(
                tranche_id,
                mode = ?plan.mode,
                collateral = %plan.collateral_requested,
                bid = wad_to_f64(plan.rebalancing_bid),
                "Dry run, liquidation not submitted"
            );
            return ExecutionResult::new(tranche_id, ExecutionOutcome::Simulated);
        }

        match self
            .submitter
            .submit_liquidation(
                tranche_id,
                plan.collateral_requested,
                plan.rebalancing_bid,
                plan.recipient,
            )
            .await
        {
            Ok(tx_hash) => {
                info!(tranche_id, tx = %tx_hash, "Liquidation submitted");
                ExecutionResult {
                    tx_hash: Some(tx_hash),
                    ..ExecutionResult::new(tranche_id, ExecutionOutcome::Submitted)
                }
            }
            Err(e) => {
                let err = EngineError::transport("liquidate", e);
                warn!(tranche_id, error = %err, "Liquidation submission failed");
                ExecutionResult::new(tranche_id, ExecutionOutcome::Failed).with_reason(err)
            }
        }
    }
}
