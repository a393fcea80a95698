//! Liquidation eligibility.
//!
//! A position is liquidatable when all four conditions hold:
//! - `1.25 × liquidationPrice > referencePrice` (safety margin configurable)
//! - gross debt ratio above the position's borrowable percent
//! - debt above the minimum (dust) threshold
//! - tranche not in the exclusion set
//!
//! Liquidation price uses net debt (debt minus yield) while the debt ratio
//! uses gross debt. Both are WAD values, so boundary comparisons are exact.

use std::collections::HashSet;

use alloy::primitives::U256;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::trace;

use crate::config::EligibilityConfig;
use crate::position::{PositionSnapshot, TrancheId};
use crate::price::PriceQuote;
use crate::u256_math::{mul_div, wad_to_f64, BPS_DENOMINATOR, PERCENT, WAD};

/// Why a position was classified as not liquidatable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Ineligibility {
    PriceUnavailable,
    Excluded,
    BelowMinimumDebt,
    /// Reference price above the safety-margined liquidation price.
    PriceAboveTrigger,
    /// Debt ratio at or below the borrowable percent.
    WithinBorrowLimit,
}

impl std::fmt::Display for Ineligibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Ineligibility::PriceUnavailable => "price unavailable",
            Ineligibility::Excluded => "excluded",
            Ineligibility::BelowMinimumDebt => "below minimum debt",
            Ineligibility::PriceAboveTrigger => "price above trigger",
            Ineligibility::WithinBorrowLimit => "within borrow limit",
        };
        f.write_str(text)
    }
}

/// Outcome of evaluating one position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiquidationDecision {
    pub tranche_id: TrancheId,
    pub is_liquidatable: bool,
    /// Reference price used (WAD, USD per token)
    pub reference_price: U256,
    /// Price at which net debt equals max borrowable value (WAD)
    pub liquidation_price: U256,
    /// `100 × debt / collateralValueUSD` (WAD, 0-100+ scale)
    pub debt_ratio_percent: U256,
    pub ineligibility: Option<Ineligibility>,
    pub evaluated_at: DateTime<Utc>,
}

impl LiquidationDecision {
    pub fn liquidation_price_f64(&self) -> f64 {
        wad_to_f64(self.liquidation_price)
    }

    pub fn debt_ratio_f64(&self) -> f64 {
        wad_to_f64(self.debt_ratio_percent)
    }
}

/// Classifies positions against a reference price.
#[derive(Debug, Clone)]
pub struct EligibilityEvaluator {
    /// `liquidationPrice × margin / 100` must exceed the reference price.
    safety_margin_pct: u32,
    /// Debt must be strictly above this (WAD).
    min_debt: U256,
    excluded: HashSet<TrancheId>,
}

impl Default for EligibilityEvaluator {
    fn default() -> Self {
        Self::new(125, WAD, HashSet::new())
    }
}

impl EligibilityEvaluator {
    pub fn new(safety_margin_pct: u32, min_debt: U256, excluded: HashSet<TrancheId>) -> Self {
        Self {
            safety_margin_pct,
            min_debt,
            excluded,
        }
    }

    pub fn from_config(config: &EligibilityConfig) -> Self {
        Self::new(
            config.safety_margin_pct,
            config.min_debt_wad(),
            config.excluded_tranches.iter().copied().collect(),
        )
    }

    pub fn is_excluded(&self, tranche_id: TrancheId) -> bool {
        self.excluded.contains(&tranche_id)
    }

    /// `100 × netDebt / (collateral × borrowablePercent)`, 0 without collateral.
    pub fn liquidation_price(position: &PositionSnapshot) -> U256 {
        let collateral = position.collateral_wad();
        if collateral.is_zero() {
            return U256::ZERO;
        }
        // borrowablePercent = per10k / 100, so 100 / borrowablePercent = 10000 / per10k
        let denominator = collateral.saturating_mul(U256::from(position.borrowable_per_10k));
        mul_div(
            position.net_debt().saturating_mul(BPS_DENOMINATOR),
            WAD,
            denominator,
        )
        .unwrap_or(U256::ZERO)
    }

    /// `100 × debt / (collateral × price)`. Gross debt.
    pub fn debt_ratio_percent(position: &PositionSnapshot, price: U256) -> U256 {
        let collateral = position.collateral_wad();
        if collateral.is_zero() || price.is_zero() {
            return U256::ZERO;
        }
        let collateral_usd = collateral.saturating_mul(price) / WAD;
        // Collateral rounds to zero USD: any debt is infinitely leveraged.
        mul_div(position.debt.saturating_mul(PERCENT), WAD, collateral_usd).unwrap_or(U256::MAX)
    }

    pub fn evaluate(
        &self,
        position: &PositionSnapshot,
        reference: &PriceQuote,
        now: DateTime<Utc>,
    ) -> LiquidationDecision {
        let price = reference.usd_value;
        let liquidation_price = Self::liquidation_price(position);
        let debt_ratio_percent = Self::debt_ratio_percent(position, price);

        let ineligibility = self.first_failed_check(position, price, liquidation_price, debt_ratio_percent);

        trace!(
            tranche_id = position.tranche_id,
            price = wad_to_f64(price),
            liquidation_price = wad_to_f64(liquidation_price),
            debt_ratio = wad_to_f64(debt_ratio_percent),
            ?ineligibility,
            "Position evaluated"
        );

        LiquidationDecision {
            tranche_id: position.tranche_id,
            is_liquidatable: ineligibility.is_none(),
            reference_price: price,
            liquidation_price,
            debt_ratio_percent,
            ineligibility,
            evaluated_at: now,
        }
    }

    fn first_failed_check(
        &self,
        position: &PositionSnapshot,
        price: U256,
        liquidation_price: U256,
        debt_ratio_percent: U256,
    ) -> Option<Ineligibility> {
        if price.is_zero() {
            return Some(Ineligibility::PriceUnavailable);
        }
        if self.is_excluded(position.tranche_id) {
            return Some(Ineligibility::Excluded);
        }
        if position.debt <= self.min_debt {
            return Some(Ineligibility::BelowMinimumDebt);
        }

        // margin × liq / 100 > price
        let margined = liquidation_price.saturating_mul(U256::from(self.safety_margin_pct));
        if margined <= price.saturating_mul(PERCENT) {
            return Some(Ineligibility::PriceAboveTrigger);
        }

        // ratio > per10k / 100
        let ratio_bps = debt_ratio_percent.saturating_mul(PERCENT);
        let limit_bps = U256::from(position.borrowable_per_10k).saturating_mul(WAD);
        if ratio_bps <= limit_bps {
            return Some(Ineligibility::WithinBorrowLimit);
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::fixtures::position;
    use crate::price::PriceSource;
    use alloy::primitives::Address;

    fn quote(usd_wad: U256) -> PriceQuote {
        PriceQuote::new(Address::repeat_byte(0xaa), PriceSource::ExternalMarket, usd_wad)
    }

    fn usd(n: u64) -> U256 {
        U256::from(n) * WAD
    }

    #[test]
    fn test_reference_example_is_liquidatable() {
        let evaluator = EligibilityEvaluator::default();
        let p = position(1, 1000, 1000, 900, 8000);
        let decision = evaluator.evaluate(&p, &quote(usd(1)), Utc::now());

        assert_eq!(decision.liquidation_price, U256::from(1_125_000_000_000_000_000u128));
        assert_eq!(decision.debt_ratio_percent, usd(90));
        assert!(decision.is_liquidatable);
        assert_eq!(decision.ineligibility, None);
    }

    #[test]
    fn test_zero_collateral_never_liquidatable() {
        let evaluator = EligibilityEvaluator::default();
        let p = position(1, 0, 0, 900, 8000);
        let decision = evaluator.evaluate(&p, &quote(usd(1)), Utc::now());

        assert_eq!(decision.liquidation_price, U256::ZERO);
        assert!(!decision.is_liquidatable);
    }

    #[test]
    fn test_unavailable_price() {
        let evaluator = EligibilityEvaluator::default();
        let p = position(1, 1000, 1000, 900, 8000);
        let decision = evaluator.evaluate(&p, &quote(U256::ZERO), Utc::now());

        assert!(!decision.is_liquidatable);
        assert_eq!(decision.ineligibility, Some(Ineligibility::PriceUnavailable));
    }

    #[test]
    fn test_excluded_tranche() {
        let evaluator = EligibilityEvaluator::new(125, WAD, HashSet::from([400000005]));
        let p = position(400000005, 1000, 1000, 900, 8000);
        let decision = evaluator.evaluate(&p, &quote(usd(1)), Utc::now());

        assert_eq!(decision.ineligibility, Some(Ineligibility::Excluded));
    }

    #[test]
    fn test_dust_debt() {
        let evaluator = EligibilityEvaluator::default();
        // exactly one unit of debt is not above the threshold
        let p = position(1, 1, 1, 1, 8000);
        let decision = evaluator.evaluate(&p, &quote(usd(1)), Utc::now());

        assert_eq!(decision.ineligibility, Some(Ineligibility::BelowMinimumDebt));
    }

    #[test]
    fn test_healthy_position() {
        let evaluator = EligibilityEvaluator::default();
        // liquidation price 0.625, price 1.0: 1.25 × 0.625 < 1
        let p = position(1, 1000, 1000, 500, 8000);
        let decision = evaluator.evaluate(&p, &quote(usd(1)), Utc::now());

        assert_eq!(decision.ineligibility, Some(Ineligibility::PriceAboveTrigger));
        assert_eq!(decision.debt_ratio_percent, usd(50));
    }

    #[test]
    fn test_inside_margin_but_within_borrow_limit() {
        let evaluator = EligibilityEvaluator::default();
        // liquidation price 0.875 → ×1.25 = 1.09 > 1, ratio 70 ≤ 80
        let p = position(1, 1000, 1000, 700, 8000);
        let decision = evaluator.evaluate(&p, &quote(usd(1)), Utc::now());

        assert_eq!(decision.ineligibility, Some(Ineligibility::WithinBorrowLimit));
    }

    #[test]
    fn test_yield_lowers_liquidation_price_not_ratio() {
        let evaluator = EligibilityEvaluator::default();
        let mut p = position(1, 1000, 1000, 900, 8000);
        p.accrued_yield = usd(100);
        let decision = evaluator.evaluate(&p, &quote(usd(1)), Utc::now());

        assert_eq!(decision.liquidation_price, usd(1));
        assert_eq!(decision.debt_ratio_percent, usd(90));
        assert!(decision.is_liquidatable);
    }

    #[test]
    fn test_low_decimal_collateral() {
        let evaluator = EligibilityEvaluator::default();
        let mut p = position(1, 0, 30_000, 27_000, 8000);
        // 1 BTC at 8 decimals, price 30k
        p.collateral_amount = U256::from(100_000_000u64);
        p.collateral_decimals = 8;
        let decision = evaluator.evaluate(&p, &quote(usd(30_000)), Utc::now());

        assert_eq!(decision.liquidation_price, usd(33_750));
        assert_eq!(decision.debt_ratio_percent, usd(90));
        assert!(decision.is_liquidatable);
    }
}
