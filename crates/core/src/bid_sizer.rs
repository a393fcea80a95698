//! Closed-form bid sizing.
//!
//! Deeply underwater positions (net debt above 87% of collateral value) are
//! taken whole. Otherwise the requested collateral value is the midpoint
//! between net debt and the value that would restore the borrow limit:
//!
//! ```text
//! requested = (netDebt + (netDebt·10000 − collateralValue·ltv) / (10000 − ltv)) / 2
//! ```
//!
//! and the rebalancing bid is the protocol's bid target marked up by 1000/984.

use std::sync::Arc;

use alloy::primitives::{Address, U256};
use serde::Serialize;
use tracing::{debug, warn};

use crate::collaborators::BidTargetQuoter;
use crate::config::SizingConfig;
use crate::error::EngineError;
use crate::position::{PositionSnapshot, TrancheId, MAX_BORROWABLE_PER_10K};
use crate::price::PriceQuote;
use crate::u256_math::{mul_div, percent_of, wad_to_f64, BPS_DENOMINATOR};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BidMode {
    Full,
    Partial,
}

/// Sized liquidation call for one tranche.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BidPlan {
    pub tranche_id: TrancheId,
    pub mode: BidMode,
    /// Raw collateral amount (token decimals)
    pub collateral_requested: U256,
    /// Stable amount offered (WAD)
    pub rebalancing_bid: U256,
    pub recipient: Address,
    pub net_debt: U256,
    /// Collateral value the bid targets (WAD); zero in full mode
    pub requested_collateral_value: U256,
}

/// Partial-sizing output before the bid target is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sizing {
    Full {
        collateral_requested: U256,
        net_debt: U256,
    },
    Partial {
        collateral_requested: U256,
        requested_collateral_value: U256,
        net_debt: U256,
    },
}

/// Tunables of the sizing formula.
#[derive(Debug, Clone, Copy)]
pub struct SizingParams {
    /// Net debt above this percent of collateral value triggers full mode.
    pub full_liquidation_pct: u32,
    pub bid_markup_numerator: U256,
    pub bid_markup_denominator: U256,
    /// Bid target used when the quoter fails.
    pub bid_target_fallback: U256,
}

impl Default for SizingParams {
    fn default() -> Self {
        Self {
            full_liquidation_pct: 87,
            bid_markup_numerator: U256::from(1000u64),
            bid_markup_denominator: U256::from(984u64),
            bid_target_fallback: U256::ZERO,
        }
    }
}

impl From<&SizingConfig> for SizingParams {
    fn from(config: &SizingConfig) -> Self {
        Self {
            full_liquidation_pct: config.full_liquidation_pct,
            bid_markup_numerator: U256::from(config.bid_markup_numerator),
            bid_markup_denominator: U256::from(config.bid_markup_denominator),
            bid_target_fallback: config.bid_target_fallback_wad(),
        }
    }
}

/// Mode selection and collateral amount. Pure; no collaborator calls.
pub fn plan_sizing(position: &PositionSnapshot, params: &SizingParams) -> Result<Sizing, EngineError> {
    let tranche_id = position.tranche_id;
    let ltv = position.borrowable_per_10k;
    if ltv >= MAX_BORROWABLE_PER_10K {
        return Err(EngineError::Configuration {
            tranche_id,
            reason: format!("borrowablePer10k {} leaves no rebalancing room", ltv),
        });
    }

    let net_debt = position.net_debt();
    let collateral_value = position.collateral_value;

    if net_debt > percent_of(collateral_value, params.full_liquidation_pct) {
        return Ok(Sizing::Full {
            collateral_requested: position.collateral_amount,
            net_debt,
        });
    }

    if collateral_value.is_zero() {
        return Err(EngineError::Sizing {
            tranche_id,
            reason: "collateral value is zero".into(),
        });
    }

    let headroom = BPS_DENOMINATOR - U256::from(ltv);
    let scaled_debt = net_debt.saturating_mul(BPS_DENOMINATOR);
    let scaled_limit = collateral_value.saturating_mul(U256::from(ltv));

    // Signed inner term; each branch truncates toward zero.
    let doubled = if scaled_debt >= scaled_limit {
        net_debt + (scaled_debt - scaled_limit) / headroom
    } else {
        let deficit = (scaled_limit - scaled_debt) / headroom;
        if deficit >= net_debt {
            return Err(EngineError::Sizing {
                tranche_id,
                reason: "requested collateral value is not positive".into(),
            });
        }
        net_debt - deficit
    };
    let requested_collateral_value = doubled / U256::from(2u64);
    if requested_collateral_value.is_zero() {
        return Err(EngineError::Sizing {
            tranche_id,
            reason: "requested collateral value is zero".into(),
        });
    }

    let collateral_requested = mul_div(
        position.collateral_amount,
        requested_collateral_value,
        collateral_value,
    )
    .unwrap_or(U256::ZERO);

    Ok(Sizing::Partial {
        collateral_requested,
        requested_collateral_value,
        net_debt,
    })
}

/// Sizes bids for liquidatable positions.
pub struct BidSizer {
    params: SizingParams,
    quoter: Arc<dyn BidTargetQuoter>,
    recipient: Address,
}

impl BidSizer {
    pub fn new(params: SizingParams, quoter: Arc<dyn BidTargetQuoter>, recipient: Address) -> Self {
        Self {
            params,
            quoter,
            recipient,
        }
    }

    /// `bidTarget × numerator / denominator`.
    pub fn mark_up(&self, bid_target: U256) -> U256 {
        mul_div(
            bid_target,
            self.params.bid_markup_numerator,
            self.params.bid_markup_denominator,
        )
        .unwrap_or(bid_target)
    }

    pub async fn size(&self, position: &PositionSnapshot, reference: &PriceQuote) -> Result<BidPlan, EngineError> {
        let plan = match plan_sizing(position, &self.params)? {
            Sizing::Full {
                collateral_requested,
                net_debt,
            } => BidPlan {
                tranche_id: position.tranche_id,
                mode: BidMode::Full,
                collateral_requested,
                rebalancing_bid: net_debt,
                recipient: self.recipient,
                net_debt,
                requested_collateral_value: U256::ZERO,
            },
            Sizing::Partial {
                collateral_requested,
                requested_collateral_value,
                net_debt,
            } => {
                let bid_target = match self
                    .quoter
                    .query_bid_target(position.tranche_id, requested_collateral_value)
                    .await
                {
                    Ok(target) => target,
                    Err(e) => {
                        warn!(
                            tranche_id = position.tranche_id,
                            error = %format!("{:#}", e),
                            "Bid target query failed, using fallback"
                        );
                        self.params.bid_target_fallback
                    }
                };

                BidPlan {
                    tranche_id: position.tranche_id,
                    mode: BidMode::Partial,
                    collateral_requested,
                    rebalancing_bid: self.mark_up(bid_target),
                    recipient: self.recipient,
                    net_debt,
                    requested_collateral_value,
                }
            }
        };

        debug!(
            tranche_id = plan.tranche_id,
            mode = ?plan.mode,
            price = reference.usd_f64(),
            net_debt = wad_to_f64(plan.net_debt),
            requested_value = wad_to_f64(plan.requested_collateral_value),
            bid = wad_to_f64(plan.rebalancing_bid),
            "Bid sized"
        );

        Ok(plan)
    }
}
