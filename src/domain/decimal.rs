//! Decimal helpers for raw on-chain amounts and percentage math.
//!
//! All money and quantity values are `rust_decimal::Decimal` to avoid
//! floating-point drift. Persisted as canonical strings (no exponent).

use rust_decimal::prelude::ToPrimitive;
pub use rust_decimal::Decimal;
use std::str::FromStr;

/// Convert a raw integer amount (e.g. lamports) into UI units.
pub fn from_raw(amount: u64, decimals: u32) -> Decimal {
    let mut value = Decimal::from(amount);
    // Decimal scale is capped at 28.
    match value.set_scale(decimals.min(28)) {
        Ok(()) => value.normalize(),
        Err(_) => Decimal::ZERO,
    }
}

/// Convert UI units into a raw integer amount, truncating any dust.
///
/// Returns `None` for negative values or values that overflow u64.
pub fn to_raw(amount: Decimal, decimals: u32) -> Option<u64> {
    if amount.is_sign_negative() {
        return None;
    }
    let factor = Decimal::from(10u64.checked_pow(decimals)?);
    amount.checked_mul(factor)?.trunc().to_u64()
}

/// Percentage change from `entry` to `current`. `None` if entry is zero.
pub fn pct_change(entry: Decimal, current: Decimal) -> Option<Decimal> {
    if entry.is_zero() {
        return None;
    }
    (current - entry)
        .checked_div(entry)
        .map(|ratio| ratio * Decimal::ONE_HUNDRED)
}

/// Format the Decimal as a canonical string (no exponent notation).
pub fn to_canonical_string(value: Decimal) -> String {
    value.normalize().to_string()
}

/// Parse a canonical decimal string, falling back to zero.
pub fn parse_or_zero(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_from_raw_lamports() {
        assert_eq!(from_raw(200_000_000, 9), d("0.2"));
        assert_eq!(from_raw(1_500_000, 6), d("1.5"));
        assert_eq!(from_raw(0, 9), Decimal::ZERO);
    }

    #[test]
    fn test_to_raw_truncates() {
        assert_eq!(to_raw(d("0.2"), 9), Some(200_000_000));
        assert_eq!(to_raw(d("1.0000000019"), 9), Some(1_000_000_001));
        assert_eq!(to_raw(d("-1"), 9), None);
    }

    #[test]
    fn test_pct_change() {
        assert_eq!(pct_change(d("1.00"), d("1.20")), Some(d("20")));
        assert_eq!(pct_change(d("2"), d("1")), Some(d("-50")));
        assert_eq!(pct_change(Decimal::ZERO, d("1")), None);
    }

    #[test]
    fn test_canonical_string() {
        assert_eq!(to_canonical_string(d("1.500000")), "1.5");
        assert_eq!(to_canonical_string(d("100")), "100");
        assert_eq!(parse_or_zero("garbage"), Decimal::ZERO);
    }
}
