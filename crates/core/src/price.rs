//! Price quotes and the on-chain/market reconciliation rule.

use alloy::primitives::{Address, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::u256_math::{apply_basis_points_up, wad_to_f64};

/// Where a quote came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PriceSource {
    OnChainOracle,
    ExternalMarket,
}

impl std::fmt::Display for PriceSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PriceSource::OnChainOracle => write!(f, "on-chain-oracle"),
            PriceSource::ExternalMarket => write!(f, "external-market"),
        }
    }
}

/// USD price of one whole token.
///
/// A zero `usd_value` means the quote is unavailable, never a true zero price.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceQuote {
    pub token: Address,
    pub source: PriceSource,
    /// USD per whole token (WAD)
    pub usd_value: U256,
    pub observed_at: DateTime<Utc>,
}

impl PriceQuote {
    pub fn new(token: Address, source: PriceSource, usd_value: U256) -> Self {
        Self {
            token,
            source,
            usd_value,
            observed_at: Utc::now(),
        }
    }

    pub fn unavailable(token: Address, source: PriceSource) -> Self {
        Self::new(token, source, U256::ZERO)
    }

    #[inline]
    pub fn is_available(&self) -> bool {
        !self.usd_value.is_zero()
    }

    /// For logging only.
    pub fn usd_f64(&self) -> f64 {
        wad_to_f64(self.usd_value)
    }
}

/// Which quote eligibility and sizing are evaluated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceSource {
    /// External market price, falling back to the on-chain quote when the
    /// market has none.
    #[default]
    Market,
    /// The protocol's oracle, re-read after a correction.
    OnChain,
}

/// `true` iff `on_chain * (1 + tolerance) < market`.
///
/// An unavailable quote (zero) on either side never triggers a correction.
pub fn should_correct_price(on_chain: U256, market: U256, tolerance_bps: u16) -> bool {
    if on_chain.is_zero() || market.is_zero() {
        return false;
    }
    apply_basis_points_up(on_chain, tolerance_bps) < market
}

/// Decides, once per token and cycle, whether the protocol oracle lags the
/// market by more than the tolerance band.
#[derive(Debug, Clone, Copy)]
pub struct PriceReconciler {
    tolerance_bps: u16,
}

impl PriceReconciler {
    pub fn new(tolerance_bps: u16) -> Self {
        Self { tolerance_bps }
    }

    pub fn tolerance_bps(&self) -> u16 {
        self.tolerance_bps
    }

    pub fn needs_correction(&self, on_chain: &PriceQuote, market: &PriceQuote) -> bool {
        should_correct_price(on_chain.usd_value, market.usd_value, self.tolerance_bps)
    }
}

/// Both quotes gathered for one token in a cycle.
#[derive(Debug, Clone)]
pub struct TokenPrices {
    pub on_chain: PriceQuote,
    pub market: PriceQuote,
}

impl TokenPrices {
    /// Quote to evaluate positions against.
    pub fn reference(&self, source: ReferenceSource) -> &PriceQuote {
        match source {
            ReferenceSource::Market if self.market.is_available() => &self.market,
            ReferenceSource::Market | ReferenceSource::OnChain => &self.on_chain,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::u256_math::WAD;

    fn usd(n: u64) -> U256 {
        U256::from(n) * WAD
    }

    #[test]
    fn test_equal_prices_not_corrected() {
        assert!(!should_correct_price(usd(100), usd(100), 500));
    }

    #[test]
    fn test_correction_threshold() {
        assert!(should_correct_price(usd(100), usd(106), 500));
        assert!(!should_correct_price(usd(100), usd(104), 500));
        // exactly at the band is not a correction
        assert!(!should_correct_price(usd(100), usd(105), 500));
    }

    #[test]
    fn test_unavailable_quote_never_corrects() {
        assert!(!should_correct_price(usd(100), U256::ZERO, 500));
        // a failed oracle read is not a zero price
        assert!(!should_correct_price(U256::ZERO, usd(1), 500));
    }

    #[test]
    fn test_reference_selection() {
        let token = Address::repeat_byte(7);
        let prices = TokenPrices {
            on_chain: PriceQuote::new(token, PriceSource::OnChainOracle, usd(10)),
            market: PriceQuote::new(token, PriceSource::ExternalMarket, usd(12)),
        };
        assert_eq!(prices.reference(ReferenceSource::Market).usd_value, usd(12));
        assert_eq!(prices.reference(ReferenceSource::OnChain).usd_value, usd(10));

        let no_market = TokenPrices {
            market: PriceQuote::unavailable(token, PriceSource::ExternalMarket),
            ..prices
        };
        assert_eq!(no_market.reference(ReferenceSource::Market).source, PriceSource::OnChainOracle);
    }
}
