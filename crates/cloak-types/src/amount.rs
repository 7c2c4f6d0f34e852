//! Decimal payment amounts.
//!
//! Amounts arrive as user-entered decimal strings and are normalized to an
//! integer count of minor units (10^-18) before they take part in any hash.
//! `"0.05"`, `"0.050"` and `".05"` all denote the same [`Amount`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{Result, TypesError, MINOR_UNIT_DECIMALS};

/// A non-negative amount in minor units.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Amount {
    minor: u128,
}

impl Amount {
    /// The zero amount.
    pub const ZERO: Amount = Amount { minor: 0 };

    /// Construct from a minor-unit count.
    pub fn from_minor(minor: u128) -> Self {
        Self { minor }
    }

    /// Minor-unit count.
    pub fn minor(&self) -> u128 {
        self.minor
    }

    pub fn is_zero(&self) -> bool {
        self.minor == 0
    }

    /// Parse a decimal string.
    ///
    /// Accepted: ASCII digits with at most one `.`, at least one digit on
    /// either side of it. Trailing fractional zeros do not count toward the
    /// 18-digit precision limit.
    ///
    /// # Errors
    ///
    /// - [`TypesError::InvalidAmount`] for signs, exponents, whitespace,
    ///   excess precision, or values beyond `u128` minor units
    pub fn parse(input: &str) -> Result<Self> {
        let invalid = |reason: &str| TypesError::InvalidAmount {
            input: input.to_string(),
            reason: reason.to_string(),
        };

        if input.is_empty() {
            return Err(invalid("empty"));
        }
        if let Some(c) = input.chars().find(|c| !c.is_ascii_digit() && *c != '.') {
            return Err(invalid(&format!("unexpected character {c:?}")));
        }

        let (int_part, frac_part) = match input.split_once('.') {
            Some((i, f)) => {
                if f.contains('.') {
                    return Err(invalid("more than one decimal point"));
                }
                (i, f)
            }
            None => (input, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(invalid("no digits"));
        }

        let frac_part = frac_part.trim_end_matches('0');
        if frac_part.len() > MINOR_UNIT_DECIMALS {
            return Err(invalid(&format!(
                "more than {MINOR_UNIT_DECIMALS} fractional digits"
            )));
        }

        let overflow = || invalid("exceeds representable range");
        let mut minor: u128 = 0;
        for digit in int_part.bytes().chain(frac_part.bytes()) {
            minor = minor
                .checked_mul(10)
                .and_then(|m| m.checked_add(u128::from(digit - b'0')))
                .ok_or_else(overflow)?;
        }
        let scale = 10u128.pow((MINOR_UNIT_DECIMALS - frac_part.len()) as u32);
        let minor = minor.checked_mul(scale).ok_or_else(overflow)?;

        Ok(Self { minor })
    }

    /// The canonical hashing form: minor units in base 10, no leading zeros.
    pub fn canonical(&self) -> String {
        self.minor.to_string()
    }

    /// Human-readable decimal with trailing fractional zeros removed.
    pub fn to_decimal(&self) -> String {
        let unit = 10u128.pow(MINOR_UNIT_DECIMALS as u32);
        let whole = self.minor / unit;
        let frac = self.minor % unit;
        if frac == 0 {
            return whole.to_string();
        }
        let frac = format!("{frac:0width$}", width = MINOR_UNIT_DECIMALS);
        format!("{whole}.{}", frac.trim_end_matches('0'))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_decimal())
    }
}

impl FromStr for Amount {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_decimal())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equivalent_representations() {
        let a = Amount::parse("0.05").expect("parse");
        assert_eq!(a, Amount::parse("0.050").expect("parse"));
        assert_eq!(a, Amount::parse(".05").expect("parse"));
        assert_eq!(a, Amount::parse("000.05").expect("parse"));
        assert_eq!(a.canonical(), "50000000000000000");
    }

    #[test]
    fn test_integer_amounts() {
        assert_eq!(Amount::parse("1").expect("parse").canonical(), "1000000000000000000");
        assert_eq!(Amount::parse("1.").expect("parse"), Amount::parse("1.0").expect("parse"));
        assert_eq!(Amount::parse("0").expect("parse"), Amount::ZERO);
        assert_eq!(Amount::ZERO.canonical(), "0");
    }

    #[test]
    fn test_smallest_unit() {
        let a = Amount::parse("0.000000000000000001").expect("parse");
        assert_eq!(a.minor(), 1);
        assert_eq!(a.to_decimal(), "0.000000000000000001");
    }

    #[test]
    fn test_excess_precision_rejected() {
        assert!(Amount::parse("0.0000000000000000001").is_err());
        // Trailing zeros past the limit carry no precision.
        assert!(Amount::parse("0.1000000000000000000").is_ok());
    }

    #[test]
    fn test_rejects_malformed() {
        for input in ["", ".", "-1", "+1", "1e5", " 1", "1 ", "1.2.3", "0x10", "1,5"] {
            let err = Amount::parse(input).expect_err(input);
            assert!(matches!(err, TypesError::InvalidAmount { .. }), "{input}");
        }
    }

    #[test]
    fn test_overflow_rejected() {
        assert!(Amount::parse(&"9".repeat(40)).is_err());
        assert!(Amount::parse("340282366920938463464").is_err());
    }

    #[test]
    fn test_to_decimal() {
        assert_eq!(Amount::parse("12.3400").expect("parse").to_decimal(), "12.34");
        assert_eq!(Amount::parse("7.0").expect("parse").to_string(), "7");
    }

    #[test]
    fn test_serde_as_decimal_string() {
        let a = Amount::parse("0.050").expect("parse");
        let json = serde_json::to_string(&a).expect("serialize");
        assert_eq!(json, "\"0.05\"");
        let back: Amount = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, a);
    }
}
