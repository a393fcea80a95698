//! Error kinds raised while evaluating, sizing and executing a liquidation.

use alloy::primitives::Address;
use thiserror::Error;

use crate::position::TrancheId;

/// Errors produced by the risk engine.
///
/// Every variant is scoped to one position or one token; the orchestrator
/// records them in the cycle report and moves on to the next position.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Reference quote missing or zero. The position is skipped, not failed.
    #[error("price unavailable for token {token}")]
    PriceUnavailable { token: Address },

    /// Parameters that make the sizing math undefined (e.g. 100% borrowable).
    #[error("configuration error for tranche {tranche_id}: {reason}")]
    Configuration { tranche_id: TrancheId, reason: String },

    /// Funding below the rebalancing bid. Deferred to the next cycle.
    #[error("insufficient funding for tranche {tranche_id}: need {required}, have {available}")]
    InsufficientFunding {
        tranche_id: TrancheId,
        required: String,
        available: String,
    },

    /// A collaborator call failed.
    #[error("transport failure during {operation}: {message}")]
    Transport { operation: &'static str, message: String },

    /// Raw record could not be normalized into a position snapshot.
    #[error("invalid position record {tranche}: {reason}")]
    InvalidPosition { tranche: String, reason: String },

    /// Partial sizing produced nothing to request.
    #[error("sizing failed for tranche {tranche_id}: {reason}")]
    Sizing { tranche_id: TrancheId, reason: String },
}

impl EngineError {
    /// Wrap a collaborator error.
    pub fn transport(operation: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Transport {
            operation,
            message: format!("{:#}", err),
        }
    }

    pub fn invalid_position(tranche: impl ToString, reason: impl Into<String>) -> Self {
        Self::InvalidPosition {
            tranche: tranche.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether the position is expected to succeed on a later cycle without
    /// any operator action.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::PriceUnavailable { .. } | Self::InsufficientFunding { .. } | Self::Transport { .. }
        )
    }
}
