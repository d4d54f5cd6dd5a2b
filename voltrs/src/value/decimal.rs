//! Fixed-point `DECIMAL`: a 128-bit signed integer scaled by `10^12`.

use std::fmt;
use std::str::FromStr;

use crate::error::{ClientError, Result};

const SCALE: u32 = 12;
const SCALE_FACTOR: i128 = 1_000_000_000_000;

/// `NULL` is represented by the minimum representable unscaled value,
/// matching the sentinel convention used for every other fixed-width
/// scalar in this protocol.
const NULL_UNSCALED: i128 = i128::MIN;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Decimal(i128);

impl Decimal {
    pub fn null() -> Self {
        Decimal(NULL_UNSCALED)
    }

    pub fn is_null(&self) -> bool {
        self.0 == NULL_UNSCALED
    }

    pub fn from_unscaled(unscaled: i128) -> Self {
        Decimal(unscaled)
    }

    pub fn unscaled(&self) -> i128 {
        self.0
    }

    pub fn scale() -> u32 {
        SCALE
    }
}

impl FromStr for Decimal {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ClientError::StringToDecimal(s.to_string()));
        }
        let (negative, rest) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s.strip_prefix('+').unwrap_or(s)),
        };
        let mut parts = rest.splitn(2, '.');
        let int_part = parts.next().unwrap_or("");
        let frac_part = parts.next().unwrap_or("");
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(ClientError::StringToDecimal(s.to_string()));
        }
        if !int_part.chars().all(|c| c.is_ascii_digit())
            || !frac_part.chars().all(|c| c.is_ascii_digit())
        {
            return Err(ClientError::StringToDecimal(s.to_string()));
        }
        if frac_part.len() > SCALE as usize {
            return Err(ClientError::StringToDecimal(s.to_string()));
        }
        let int_value: i128 = if int_part.is_empty() {
            0
        } else {
            int_part
                .parse()
                .map_err(|_| ClientError::StringToDecimal(s.to_string()))?
        };
        let mut frac_value: i128 = if frac_part.is_empty() {
            0
        } else {
            frac_part
                .parse()
                .map_err(|_| ClientError::StringToDecimal(s.to_string()))?
        };
        let padding = SCALE as usize - frac_part.len();
        for _ in 0..padding {
            frac_value *= 10;
        }
        let mut unscaled = int_value
            .checked_mul(SCALE_FACTOR)
            .and_then(|v| v.checked_add(frac_value))
            .ok_or_else(|| ClientError::StringToDecimal(s.to_string()))?;
        if negative {
            unscaled = -unscaled;
        }
        Ok(Decimal(unscaled))
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            return write!(f, "NULL");
        }
        let negative = self.0 < 0;
        let magnitude = self.0.unsigned_abs();
        let int_part = magnitude / SCALE_FACTOR as u128;
        let frac_part = magnitude % SCALE_FACTOR as u128;
        if negative {
            write!(f, "-")?;
        }
        write!(f, "{int_part}.{frac_part:0width$}", width = SCALE as usize)
    }
}

#[cfg(feature = "rust_decimal")]
mod rust_decimal_interop {
    use super::Decimal;
    use crate::error::{ClientError, Result};
    use std::str::FromStr;

    impl TryFrom<rust_decimal::Decimal> for Decimal {
        type Error = ClientError;

        fn try_from(value: rust_decimal::Decimal) -> Result<Self> {
            Decimal::from_str(&value.to_string())
        }
    }

    impl TryFrom<Decimal> for rust_decimal::Decimal {
        type Error = ClientError;

        fn try_from(value: Decimal) -> Result<Self> {
            if value.is_null() {
                return Err(ClientError::StringToDecimal(
                    "cannot convert a NULL decimal to rust_decimal::Decimal".to_string(),
                ));
            }
            rust_decimal::Decimal::from_str(&value.to_string())
                .map_err(|e| ClientError::StringToDecimal(e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_pads_fraction() {
        let d: Decimal = "3.1459".parse().unwrap();
        assert_eq!(d.to_string(), "3.145900000000");
    }

    #[test]
    fn negative_round_trips() {
        let d: Decimal = "-12.5".parse().unwrap();
        assert_eq!(d.to_string(), "-12.500000000000");
    }

    #[test]
    fn integer_only_round_trips() {
        let d: Decimal = "42".parse().unwrap();
        assert_eq!(d.to_string(), "42.000000000000");
    }

    #[test]
    fn too_many_fraction_digits_rejected() {
        assert!("1.1234567890123".parse::<Decimal>().is_err());
    }

    #[test]
    fn garbage_rejected() {
        assert!("not-a-number".parse::<Decimal>().is_err());
    }

    #[test]
    fn null_displays_as_null() {
        assert_eq!(Decimal::null().to_string(), "NULL");
        assert!(Decimal::null().is_null());
    }
}
