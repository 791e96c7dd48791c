//! Fixed-point math utilities for deterministic decisions.
//!
//! Priorities, traffic scores, thresholds and idle ratios all use
//! fixed-point arithmetic so that two runs over the same snapshots make
//! the same choices bit for bit, whatever the host CPU.

use fixed::types::I32F32;

/// Fixed-point number type for all decision math.
///
/// Uses 32 bits for integer part and 32 bits for fractional part.
/// Range: approximately -2,147,483,648 to 2,147,483,647
/// Precision: approximately 0.00000000023
pub type Fixed = I32F32;

/// Serde support for fixed-point numbers.
///
/// Serializes fixed-point numbers as their raw bit representation (i64)
/// to preserve exact precision across the persistence boundary.
pub mod fixed_serde {
    use super::Fixed;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a fixed-point number as its raw bit representation.
    pub fn serialize<S>(value: &Fixed, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.to_bits().serialize(serializer)
    }

    /// Deserialize a fixed-point number from its raw bit representation.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Fixed, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bits = i64::deserialize(deserializer)?;
        Ok(Fixed::from_bits(bits))
    }
}

/// `num / den` as a fixed-point ratio. A zero denominator yields zero.
///
/// The division runs on the raw bits in 128-bit integers, so operands
/// beyond the `Fixed` integer range are fine; a quotient outside it
/// saturates.
#[must_use]
pub fn ratio(num: i64, den: i64) -> Fixed {
    if den == 0 {
        return Fixed::ZERO;
    }
    let bits = (i128::from(num) << Fixed::FRAC_NBITS) / i128::from(den);
    match i64::try_from(bits) {
        Ok(bits) => Fixed::from_bits(bits),
        Err(_) if bits < 0 => Fixed::MIN,
        Err(_) => Fixed::MAX,
    }
}

/// Convert an integer percentage (`75` = 0.75) to fixed-point.
#[must_use]
pub fn percent(value: u32) -> Fixed {
    ratio(i64::from(value), 100)
}

/// Convert an integer permille (`100` = 0.1) to fixed-point.
#[must_use]
pub fn permille(value: u32) -> Fixed {
    ratio(i64::from(value), 1000)
}

/// Absolute difference of two fixed-point values.
#[must_use]
pub fn abs_diff(a: Fixed, b: Fixed) -> Fixed {
    if a > b {
        a - b
    } else {
        b - a
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ratio_zero_denominator() {
        assert_eq!(ratio(5, 0), Fixed::ZERO);
        assert_eq!(ratio(1, 2), Fixed::from_num(0.5));
    }

    #[test]
    fn test_ratio_of_huge_operands() {
        assert_eq!(ratio(300_000_000, 3_000_000_000), Fixed::from_num(0.1));
        assert_eq!(ratio(i64::MAX, i64::MAX), Fixed::ONE);
        assert_eq!(ratio(i64::MAX, 1), Fixed::MAX);
        assert_eq!(ratio(i64::MIN, 1), Fixed::MIN);
        assert_eq!(ratio(-1, 4), Fixed::from_num(-0.25));
    }

    #[test]
    fn test_percent_and_permille() {
        assert_eq!(percent(50), Fixed::from_num(0.5));
        assert_eq!(permille(250), Fixed::from_num(0.25));
        assert_eq!(percent(100), Fixed::ONE);
    }

    #[test]
    fn test_fixed_determinism() {
        // Same operations must produce identical results
        let a = ratio(1, 3);
        let b = ratio(1, 3);
        assert_eq!(a, b);
        assert_eq!(a * Fixed::from_num(7), b * Fixed::from_num(7));
    }

    #[test]
    fn test_abs_diff_is_symmetric() {
        let a = Fixed::from_num(0.12);
        let b = Fixed::from_num(0.1);
        assert_eq!(abs_diff(a, b), abs_diff(b, a));
        assert!(abs_diff(a, b) > Fixed::ZERO);
    }
}
