//! Fixed-point U256 arithmetic for risk evaluation and bid sizing.
//!
//! Every USD amount the lending ledger reports (debt, yield, collateral value)
//! is an 18-decimal WAD. Collateral balances carry the token's own precision
//! and are lifted to WAD with [`to_wad`] before they meet a price.

use alloy::primitives::U256;

/// WAD constant: 1e18 for 18-decimal fixed-point arithmetic
pub const WAD: U256 = U256::from_limbs([1_000_000_000_000_000_000u64, 0, 0, 0]);

/// Basis points denominator (10000 = 100%)
pub const BPS_DENOMINATOR: U256 = U256::from_limbs([10000u64, 0, 0, 0]);

/// Percent denominator
pub const PERCENT: U256 = U256::from_limbs([100u64, 0, 0, 0]);

/// Decimals of the lending ledger's fixed-point values.
pub const WAD_DECIMALS: u8 = 18;

/// 10^exp as U256.
#[inline]
pub fn pow10(exp: u8) -> U256 {
    U256::from(10u64).pow(U256::from(exp))
}

/// Lift a raw token amount with `decimals` precision to an 18-decimal WAD.
///
/// Example: 1.5 USDC (`1_500_000`, 6 decimals) becomes `1.5e18`.
#[inline]
pub fn to_wad(amount: U256, decimals: u8) -> U256 {
    match decimals.cmp(&WAD_DECIMALS) {
        std::cmp::Ordering::Equal => amount,
        std::cmp::Ordering::Less => amount * pow10(WAD_DECIMALS - decimals),
        std::cmp::Ordering::Greater => amount / pow10(decimals - WAD_DECIMALS),
    }
}

/// One whole token in raw units (10^decimals).
#[inline]
pub fn one_unit(decimals: u8) -> U256 {
    pow10(decimals)
}

/// `a * b / denominator`, or `None` when the denominator is zero.
#[inline]
pub fn mul_div(a: U256, b: U256, denominator: U256) -> Option<U256> {
    if denominator.is_zero() {
        return None;
    }
    Some(a * b / denominator)
}

/// Multiply two WAD values: (a * b) / WAD
#[inline]
pub fn wad_mul(a: U256, b: U256) -> U256 {
    (a * b) / WAD
}

/// Apply basis points increase (e.g., for a price tolerance band).
/// Returns: value * (10000 + basis_points) / 10000
///
/// Example: apply_basis_points_up(100, 500) = 105
#[inline]
pub fn apply_basis_points_up(value: U256, basis_points: u16) -> U256 {
    let factor = U256::from(10000u32 + basis_points as u32);
    (value * factor) / BPS_DENOMINATOR
}

/// `value * percent / 100`.
#[inline]
pub fn percent_of(value: U256, percent: u32) -> U256 {
    value * U256::from(percent) / PERCENT
}

/// Convert WAD (18 decimals) to f64.
/// Use only for display/logging, not for computation.
pub fn wad_to_f64(wad: U256) -> f64 {
    if wad <= U256::from(u128::MAX) {
        let value: u128 = wad.to();
        value as f64 / 1e18
    } else {
        let limbs = wad.as_limbs();
        let mut acc = 0.0f64;
        for limb in limbs.iter().rev() {
            acc = acc * (u64::MAX as f64 + 1.0) + *limb as f64;
        }
        acc / 1e18
    }
}

/// Convert f64 to WAD (18 decimals).
/// Used for prices coming from HTTP feeds. Non-finite and non-positive inputs map to zero.
pub fn f64_to_wad(value: f64) -> U256 {
    if !value.is_finite() || value <= 0.0 {
        return U256::ZERO;
    }
    U256::from((value * 1e18) as u128)
}

/// Parse a decimal string ("123.45") into a WAD without going through f64.
///
/// Returns `None` for malformed input, negative numbers and exponent notation.
pub fn parse_wad(value: &str) -> Option<U256> {
    let value = value.trim();
    if value.is_empty() || value.starts_with('-') {
        return None;
    }
    let (whole, frac) = match value.split_once('.') {
        Some((w, f)) => (w, f),
        None => (value, ""),
    };
    if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let whole = if whole.is_empty() {
        U256::ZERO
    } else {
        whole.parse::<U256>().ok()?
    };
    // Digits past 18 decimals are truncated.
    let frac = &frac[..frac.len().min(WAD_DECIMALS as usize)];
    let frac_value = if frac.is_empty() {
        U256::ZERO
    } else {
        frac.parse::<U256>().ok()? * pow10(WAD_DECIMALS - frac.len() as u8)
    };
    whole.checked_mul(WAD)?.checked_add(frac_value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wad(n: u64) -> U256 {
        U256::from(n) * WAD
    }

    #[test]
    fn test_to_wad() {
        // 1000 USDC (6 decimals)
        assert_eq!(to_wad(U256::from(1_000_000_000u64), 6), wad(1000));
        // 18 decimals is identity
        assert_eq!(to_wad(wad(7), 18), wad(7));
        // 24 decimals truncates down
        assert_eq!(to_wad(U256::from(10u64).pow(U256::from(24u64)), 24), WAD);
        // 8 decimal BTC
        assert_eq!(to_wad(U256::from(150_000_000u64), 8), wad(3) / U256::from(2u64));
    }

    #[test]
    fn test_apply_basis_points_up() {
        assert_eq!(apply_basis_points_up(U256::from(100u64), 500), U256::from(105u64));
        assert_eq!(apply_basis_points_up(U256::from(1000u64), 0), U256::from(1000u64));
        assert_eq!(apply_basis_points_up(U256::from(1000u64), 2000), U256::from(1200u64));
    }

    #[test]
    fn test_mul_div_zero_denominator() {
        assert_eq!(mul_div(wad(1), wad(1), U256::ZERO), None);
        assert_eq!(mul_div(wad(3), U256::from(2u64), U256::from(3u64)), Some(wad(2)));
    }

    #[test]
    fn test_percent_of() {
        assert_eq!(percent_of(wad(1000), 87), wad(870));
        assert_eq!(percent_of(U256::from(99u64), 50), U256::from(49u64));
    }

    #[test]
    fn test_wad_f64_conversion() {
        assert!((wad_to_f64(wad(1000)) - 1000.0).abs() < 1e-9);
        assert_eq!(f64_to_wad(1.5), wad(3) / U256::from(2u64));
        assert_eq!(f64_to_wad(-2.0), U256::ZERO);
        assert_eq!(f64_to_wad(f64::NAN), U256::ZERO);
    }

    #[test]
    fn test_parse_wad() {
        assert_eq!(parse_wad("900"), Some(wad(900)));
        assert_eq!(parse_wad("1.125"), Some(U256::from(1_125_000_000_000_000_000u128)));
        assert_eq!(parse_wad(".5"), Some(WAD / U256::from(2u64)));
        assert_eq!(parse_wad("0.0000000000000000019"), Some(U256::from(1u64)));
        assert_eq!(parse_wad("-1"), None);
        assert_eq!(parse_wad("1e-7"), None);
        assert_eq!(parse_wad(""), None);
    }
}
