//! Fixed-point token amounts.
//!
//! An [`Amount`] is an integer count of base units (wei for ETH, 10^-6 for
//! USDC, ...) together with the asset's decimal scale. Parsing and formatting
//! are exact, so ledger arithmetic never goes through floating point.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Largest supported decimal scale (10^38 still fits in a `u128`).
pub const MAX_DECIMALS: u8 = 38;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Amount {
    units: u128,
    decimals: u8,
}

impl Amount {
    pub const fn new(units: u128, decimals: u8) -> Self {
        Self { units, decimals }
    }

    pub const fn zero(decimals: u8) -> Self {
        Self { units: 0, decimals }
    }

    /// Parse a decimal string such as `"0.0005"` into base units.
    ///
    /// Rejects signs, exponents, empty input and more fractional digits than
    /// `decimals` allows.
    pub fn parse(s: &str, decimals: u8) -> Result<Self, ValidationError> {
        if decimals > MAX_DECIMALS {
            return Err(ValidationError::InvalidAmount(format!("unsupported scale {decimals}")));
        }
        let s = s.trim();
        if s.is_empty() {
            return Err(ValidationError::InvalidAmount("empty".into()));
        }

        let (int_part, frac_part) = match s.split_once('.') {
            Some((i, f)) => (i, f),
            None => (s, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(ValidationError::InvalidAmount(s.to_string()));
        }
        let all_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
        if !all_digits(int_part) || !all_digits(frac_part) {
            return Err(ValidationError::InvalidAmount(s.to_string()));
        }

        let frac_trimmed = frac_part.trim_end_matches('0');
        if frac_trimmed.len() > decimals as usize {
            return Err(ValidationError::TooManyDecimals {
                got: frac_trimmed.len(),
                max: decimals,
            });
        }

        let scale = 10u128.pow(decimals as u32);
        let mut units: u128 = 0;
        for b in int_part.bytes() {
            units = units
                .checked_mul(10)
                .and_then(|u| u.checked_add((b - b'0') as u128))
                .ok_or(ValidationError::AmountOverflow)?;
        }
        units = units.checked_mul(scale).ok_or(ValidationError::AmountOverflow)?;

        let mut frac_units: u128 = 0;
        for b in frac_trimmed.bytes() {
            frac_units = frac_units * 10 + (b - b'0') as u128;
        }
        frac_units *= 10u128.pow((decimals as usize - frac_trimmed.len()) as u32);

        units = units
            .checked_add(frac_units)
            .ok_or(ValidationError::AmountOverflow)?;
        Ok(Self { units, decimals })
    }

    pub fn units(&self) -> u128 {
        self.units
    }

    pub fn decimals(&self) -> u8 {
        self.decimals
    }

    pub fn is_zero(&self) -> bool {
        self.units == 0
    }

    /// Sum of two amounts of the same scale. `None` on overflow or scale mismatch.
    pub fn checked_add(&self, other: Amount) -> Option<Amount> {
        if self.decimals != other.decimals {
            return None;
        }
        self.units
            .checked_add(other.units)
            .map(|units| Amount::new(units, self.decimals))
    }

    /// Difference of two amounts of the same scale. `None` on underflow or scale mismatch.
    pub fn checked_sub(&self, other: Amount) -> Option<Amount> {
        if self.decimals != other.decimals {
            return None;
        }
        self.units
            .checked_sub(other.units)
            .map(|units| Amount::new(units, self.decimals))
    }

    /// Lossy conversion for display-only math (USD valuation).
    pub fn to_f64(&self) -> f64 {
        self.units as f64 / 10f64.powi(self.decimals as i32)
    }
}

impl PartialOrd for Amount {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self.decimals == other.decimals {
            Some(self.units.cmp(&other.units))
        } else {
            None
        }
    }
}

/// Formats like `ethers.utils.formatUnits`: at least one fractional digit,
/// trailing zeros trimmed (`"1.0"`, `"0.0005"`).
impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.decimals == 0 {
            return write!(f, "{}.0", self.units);
        }
        // Past 10^38 every u128 is a pure fraction.
        let (int_part, frac_part) = match 10u128.checked_pow(self.decimals as u32) {
            Some(scale) => (self.units / scale, self.units % scale),
            None => (0, self.units),
        };
        let frac = format!("{:0width$}", frac_part, width = self.decimals as usize);
        let frac = frac.trim_end_matches('0');
        if frac.is_empty() {
            write!(f, "{int_part}.0")
        } else {
            write!(f, "{int_part}.{frac}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parse_gas_claim_amount() {
        let a = Amount::parse("0.0005", 18).unwrap();
        assert_eq!(a.units(), 500_000_000_000_000);
    }

    #[test]
    fn parse_integer() {
        assert_eq!(Amount::parse("10", 18).unwrap().units(), 10 * 10u128.pow(18));
    }

    #[test]
    fn parse_leading_dot_and_trailing_dot() {
        assert_eq!(Amount::parse(".5", 1).unwrap().units(), 5);
        assert_eq!(Amount::parse("5.", 1).unwrap().units(), 50);
    }

    #[test]
    fn parse_trailing_zeros_beyond_scale_ok() {
        assert_eq!(Amount::parse("1.500000", 2).unwrap().units(), 150);
    }

    #[test]
    fn parse_rejects_excess_precision() {
        let err = Amount::parse("0.0000001", 6).unwrap_err();
        assert_eq!(err, ValidationError::TooManyDecimals { got: 7, max: 6 });
    }

    #[test]
    fn parse_rejects_garbage() {
        for bad in ["", ".", "abc", "-1", "1e5", "1.2.3", " "] {
            assert!(Amount::parse(bad, 18).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn parse_overflow() {
        let huge = "9".repeat(40);
        assert_eq!(Amount::parse(&huge, 18).unwrap_err(), ValidationError::AmountOverflow);
    }

    #[test]
    fn display_matches_format_units() {
        assert_eq!(Amount::new(0, 18).to_string(), "0.0");
        assert_eq!(Amount::new(500_000_000_000_000, 18).to_string(), "0.0005");
        assert_eq!(Amount::new(1_500_000, 6).to_string(), "1.5");
        assert_eq!(Amount::new(7, 0).to_string(), "7.0");
    }

    #[test]
    fn display_beyond_max_scale() {
        assert_eq!(Amount::new(1, 50).to_string(), format!("0.{}1", "0".repeat(49)));
        assert_eq!(Amount::new(0, 255).to_string(), "0.0");
        assert_eq!(Amount::new(u128::MAX, 39).to_string(), format!("0.{}", u128::MAX));
    }

    #[test]
    fn add_requires_same_scale() {
        let a = Amount::new(1, 6);
        assert_eq!(a.checked_add(Amount::new(2, 6)), Some(Amount::new(3, 6)));
        assert_eq!(a.checked_add(Amount::new(2, 18)), None);
    }

    #[test]
    fn sub_underflow() {
        assert_eq!(Amount::new(1, 6).checked_sub(Amount::new(2, 6)), None);
    }

    #[test]
    fn ordering_only_within_scale() {
        assert!(Amount::new(1, 6) < Amount::new(2, 6));
        assert_eq!(Amount::new(1, 6).partial_cmp(&Amount::new(1, 18)), None);
    }

    proptest! {
        #[test]
        fn display_then_parse_is_identity(units in any::<u64>(), decimals in 0u8..=18) {
            let a = Amount::new(units as u128, decimals);
            prop_assert_eq!(Amount::parse(&a.to_string(), decimals).unwrap(), a);
        }
    }
}
