//! Rounding strategies for scale and granularity changes.

use num_bigint::{BigInt, Sign};
use num_integer::Integer;
use std::cmp::Ordering;

/// Strategy applied when a division has to discard digits.
///
/// The quotient `q` and remainder `r` are taken so that
/// `n = q * d + r` with `0 <= r < d` for a positive divisor `d`.
/// If `2r > d` the quotient is bumped up, if `2r < d` it stays, and a
/// half-way tie is resolved by the mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RoundingMode {
    /// Round half to even (banker's rounding).
    #[default]
    HalfEven,
    /// Round half away from zero.
    HalfUp,
}

impl RoundingMode {
    /// Divides `value` by `divisor` and rounds the quotient per the mode.
    pub fn div_round(self, value: &BigInt, divisor: &BigInt) -> BigInt {
        let (value, divisor) = if divisor.sign() == Sign::Minus {
            (-value, -divisor)
        } else {
            (value.clone(), divisor.clone())
        };
        let (quotient, remainder) = value.div_mod_floor(&divisor);
        let doubled = &remainder * 2i32;
        match doubled.cmp(&divisor) {
            Ordering::Greater => quotient + 1,
            Ordering::Less => quotient,
            Ordering::Equal => match self {
                // Exactly one of q and q + 1 is even.
                RoundingMode::HalfEven => {
                    if quotient.is_even() {
                        quotient
                    } else {
                        quotient + 1
                    }
                }
                RoundingMode::HalfUp => {
                    if value.sign() == Sign::Minus {
                        quotient
                    } else {
                        quotient + 1
                    }
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round(mode: RoundingMode, value: i64, divisor: i64) -> i64 {
        let result = mode.div_round(&BigInt::from(value), &BigInt::from(divisor));
        i64::try_from(result).unwrap()
    }

    #[test]
    fn test_half_even_ties() {
        assert_eq!(round(RoundingMode::HalfEven, 5, 10), 0);
        assert_eq!(round(RoundingMode::HalfEven, 15, 10), 2);
        assert_eq!(round(RoundingMode::HalfEven, 25, 10), 2);
        assert_eq!(round(RoundingMode::HalfEven, 35, 10), 4);
        assert_eq!(round(RoundingMode::HalfEven, -5, 10), 0);
        assert_eq!(round(RoundingMode::HalfEven, -15, 10), -2);
        assert_eq!(round(RoundingMode::HalfEven, -25, 10), -2);
    }

    #[test]
    fn test_half_even_non_ties() {
        assert_eq!(round(RoundingMode::HalfEven, 14, 10), 1);
        assert_eq!(round(RoundingMode::HalfEven, 16, 10), 2);
        assert_eq!(round(RoundingMode::HalfEven, -14, 10), -1);
        assert_eq!(round(RoundingMode::HalfEven, -16, 10), -2);
        assert_eq!(round(RoundingMode::HalfEven, 20, 10), 2);
    }

    #[test]
    fn test_half_up_ties() {
        assert_eq!(round(RoundingMode::HalfUp, 5, 10), 1);
        assert_eq!(round(RoundingMode::HalfUp, 15, 10), 2);
        assert_eq!(round(RoundingMode::HalfUp, 25, 10), 3);
        assert_eq!(round(RoundingMode::HalfUp, -15, 10), -2);
    }

    #[test]
    fn test_negative_divisor_normalised() {
        assert_eq!(round(RoundingMode::HalfEven, 15, -10), -2);
        assert_eq!(round(RoundingMode::HalfEven, -14, -10), 1);
    }
}
