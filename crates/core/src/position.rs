//! Position snapshots and the adapters that normalize raw ledger records.
//!
//! Positions reach the engine in two shapes: rows decoded from the lending
//! ledger's view functions, and records from the cached snapshot feed (JSON,
//! with debt and collateral value as decimal numbers). Both are converted into
//! the single [`PositionSnapshot`] type here; nothing downstream inspects the
//! original shape.

use std::collections::HashMap;

use alloy::primitives::{Address, U256};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::EngineError;
use crate::u256_math::{self, f64_to_wad, parse_wad};

/// Tranche identifier assigned by the lending ledger.
pub type TrancheId = u64;

/// Basis-point scale of `borrowablePer10k`.
pub const MAX_BORROWABLE_PER_10K: u32 = 10_000;

/// One borrower's collateralized debt position, frozen for one cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub tranche_id: TrancheId,
    pub owner: Address,
    /// Collateral token
    pub token: Address,
    /// Raw collateral balance (token decimals)
    pub collateral_amount: U256,
    /// Decimals of the collateral token
    pub collateral_decimals: u8,
    /// Ledger-computed collateral value (WAD)
    pub collateral_value: U256,
    /// Gross debt (WAD)
    pub debt: U256,
    /// Accrued yield credited against the debt (WAD)
    pub accrued_yield: U256,
    /// Maximum LTV in basis points (8000 = 80%)
    pub borrowable_per_10k: u32,
    /// Ledger contract owning the tranche
    pub tranche_contract: Address,
    /// Yield strategy (opaque)
    pub strategy: Address,
}

impl PositionSnapshot {
    /// `max(debt - yield, 0)`.
    pub fn net_debt(&self) -> U256 {
        self.debt.saturating_sub(self.accrued_yield)
    }

    /// Maximum LTV on the 0-100 scale.
    pub fn borrowable_percent(&self) -> f64 {
        self.borrowable_per_10k as f64 / 100.0
    }

    /// Collateral balance in whole tokens, as a WAD.
    pub fn collateral_wad(&self) -> U256 {
        u256_math::to_wad(self.collateral_amount, self.collateral_decimals)
    }

    pub fn has_collateral(&self) -> bool {
        !self.collateral_amount.is_zero()
    }
}

/// Position row as returned by the ledger's `viewPositionMetadata` and
/// `viewPositionsByTrackingPeriod`.
#[derive(Debug, Clone)]
pub struct OnChainPositionRow {
    pub tranche_id: U256,
    pub strategy: Address,
    pub collateral: U256,
    pub debt: U256,
    pub token: Address,
    pub accrued_yield: U256,
    pub collateral_value: U256,
    pub borrowable_per_10k: U256,
    pub owner: Address,
    pub tranche_contract: Address,
}

impl OnChainPositionRow {
    /// Normalize into a snapshot. `collateral_decimals` comes from the
    /// token-metadata collaborator.
    pub fn into_snapshot(self, collateral_decimals: u8) -> Result<PositionSnapshot, EngineError> {
        let tranche_id = u64::try_from(self.tranche_id)
            .map_err(|_| EngineError::invalid_position(self.tranche_id, "tranche id exceeds u64"))?;
        let borrowable_per_10k = u32::try_from(self.borrowable_per_10k)
            .map_err(|_| EngineError::invalid_position(tranche_id, "borrowablePer10k out of range"))?;

        validated(PositionSnapshot {
            tranche_id,
            owner: self.owner,
            token: self.token,
            collateral_amount: self.collateral,
            collateral_decimals,
            collateral_value: self.collateral_value,
            debt: self.debt,
            accrued_yield: self.accrued_yield,
            borrowable_per_10k,
            tranche_contract: self.tranche_contract,
            strategy: self.strategy,
        })
    }
}

/// Record from the cached position snapshot feed.
///
/// `debt` and `collateralValue` are decimal numbers in whole dollars;
/// `collateral` is the raw token balance. Cached records carry no yield.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedPositionRecord {
    #[serde(deserialize_with = "de_number_text")]
    pub tranche_id: String,
    pub strategy: Address,
    #[serde(deserialize_with = "de_number_text")]
    pub collateral: String,
    #[serde(deserialize_with = "de_number_text")]
    pub debt: String,
    pub token: Address,
    #[serde(deserialize_with = "de_number_text")]
    pub collateral_value: String,
    #[serde(deserialize_with = "de_number_text")]
    pub borrowable_per10k: String,
    pub owner: Address,
    pub tranche_contract: Address,
}

impl CachedPositionRecord {
    pub fn into_snapshot(self, collateral_decimals: u8) -> Result<PositionSnapshot, EngineError> {
        let tranche_id: TrancheId = self
            .tranche_id
            .parse()
            .map_err(|_| EngineError::invalid_position(&self.tranche_id, "unparseable tranche id"))?;
        let collateral: U256 = self
            .collateral
            .parse()
            .map_err(|_| EngineError::invalid_position(tranche_id, "unparseable collateral"))?;
        let debt = decimal_to_wad(&self.debt)
            .ok_or_else(|| EngineError::invalid_position(tranche_id, "unparseable debt"))?;
        let collateral_value = decimal_to_wad(&self.collateral_value)
            .ok_or_else(|| EngineError::invalid_position(tranche_id, "unparseable collateral value"))?;
        let borrowable_per_10k: u32 = self
            .borrowable_per10k
            .parse()
            .map_err(|_| EngineError::invalid_position(tranche_id, "unparseable borrowablePer10k"))?;

        validated(PositionSnapshot {
            tranche_id,
            owner: self.owner,
            token: self.token,
            collateral_amount: collateral,
            collateral_decimals,
            collateral_value,
            debt,
            accrued_yield: U256::ZERO,
            borrowable_per_10k,
            tranche_contract: self.tranche_contract,
            strategy: self.strategy,
        })
    }
}

/// Cached snapshot: records plus the feed's timestamp (milliseconds).
#[derive(Debug, Clone, Default)]
pub struct CachedPositionSet {
    pub timestamp_ms: u64,
    pub records: Vec<CachedPositionRecord>,
}

fn validated(snapshot: PositionSnapshot) -> Result<PositionSnapshot, EngineError> {
    if snapshot.borrowable_per_10k == 0 || snapshot.borrowable_per_10k > MAX_BORROWABLE_PER_10K {
        return Err(EngineError::invalid_position(
            snapshot.tranche_id,
            format!("borrowablePer10k {} outside (0, 10000]", snapshot.borrowable_per_10k),
        ));
    }
    Ok(snapshot)
}

/// Exact decimal parse, falling back to f64 for exponent notation.
fn decimal_to_wad(text: &str) -> Option<U256> {
    parse_wad(text).or_else(|| {
        let value: f64 = text.parse().ok()?;
        (value >= 0.0).then(|| f64_to_wad(value))
    })
}

/// Accept either a JSON number or a string and keep its textual form.
fn de_number_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrText {
        Number(serde_json::Number),
        Text(String),
    }

    Ok(match NumberOrText::deserialize(deserializer)? {
        NumberOrText::Number(n) => n.to_string(),
        NumberOrText::Text(s) => s,
    })
}

/// Deduplicate snapshots by tranche id. Later entries replace earlier ones;
/// order of first appearance is kept.
pub fn merge_positions(positions: impl IntoIterator<Item = PositionSnapshot>) -> Vec<PositionSnapshot> {
    let mut index: HashMap<TrancheId, usize> = HashMap::new();
    let mut merged: Vec<PositionSnapshot> = Vec::new();

    for position in positions {
        match index.get(&position.tranche_id) {
            Some(&slot) => merged[slot] = position,
            None => {
                index.insert(position.tranche_id, merged.len());
                merged.push(position);
            }
        }
    }

    merged
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::u256_math::WAD;

    /// Position with 18-decimal collateral and whole-unit amounts.
    pub fn position(
        tranche_id: TrancheId,
        collateral: u64,
        collateral_value: u64,
        debt: u64,
        borrowable_per_10k: u32,
    ) -> PositionSnapshot {
        PositionSnapshot {
            tranche_id,
            owner: Address::repeat_byte(0x11),
            token: Address::repeat_byte(0xaa),
            collateral_amount: U256::from(collateral) * WAD,
            collateral_decimals: 18,
            collateral_value: U256::from(collateral_value) * WAD,
            debt: U256::from(debt) * WAD,
            accrued_yield: U256::ZERO,
            borrowable_per_10k,
            tranche_contract: Address::repeat_byte(0x22),
            strategy: Address::repeat_byte(0x33),
        }
    }
}
