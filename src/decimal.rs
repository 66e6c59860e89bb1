// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use core::cmp::Ordering;
use core::fmt;
use core::str::FromStr;

use anyhow::{bail, Result};
use num_bigint::{BigInt, Sign};
use num_traits::{One, Signed, ToPrimitive, Zero};

/// Exact fixed-point decimal: `unscaled * 10^-scale`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Decimal {
    unscaled: BigInt,
    scale: u32,
}

fn pow10(n: u32) -> BigInt {
    num_traits::pow(BigInt::from(10), n as usize)
}

impl Decimal {
    pub fn new(unscaled: BigInt, scale: u32) -> Self {
        Self { unscaled, scale }
    }

    pub fn zero() -> Self {
        Self::new(BigInt::zero(), 0)
    }

    pub fn from_i64(v: i64) -> Self {
        Self::new(BigInt::from(v), 0)
    }

    pub fn from_u64(v: u64) -> Self {
        Self::new(BigInt::from(v), 0)
    }

    pub fn from_f64(v: f64) -> Result<Self> {
        if !v.is_finite() {
            bail!("cannot convert {v} to decimal");
        }
        // Display of f64 yields the shortest representation that round-trips.
        format!("{v}").parse()
    }

    pub fn scale(&self) -> u32 {
        self.scale
    }

    pub fn is_negative(&self) -> bool {
        self.unscaled.sign() == Sign::Minus
    }

    pub fn abs(&self) -> Self {
        Self::new(self.unscaled.abs(), self.scale)
    }

    /// Number of digits left of the decimal point. `0.5` has one.
    pub fn int_digits(&self) -> u32 {
        let digits = self.unscaled.abs().to_string().len() as u32;
        if digits > self.scale {
            digits - self.scale
        } else {
            1
        }
    }

    /// True when the integer part is zero, as in `0.45`.
    pub fn is_fraction(&self) -> bool {
        self.unscaled.abs() < pow10(self.scale)
    }

    /// Total digit count, in the sense of a `DECIMAL(precision, scale)` column.
    pub fn precision(&self) -> u32 {
        self.int_digits() + self.scale
    }

    /// Rescale, rounding half away from zero when digits are dropped.
    pub fn round(&self, scale: u32) -> Self {
        match scale.cmp(&self.scale) {
            Ordering::Equal => self.clone(),
            Ordering::Greater => {
                Self::new(&self.unscaled * pow10(scale - self.scale), scale)
            }
            Ordering::Less => {
                let divisor = pow10(self.scale - scale);
                let abs = self.unscaled.abs();
                let mut q = &abs / &divisor;
                let r = &abs % &divisor;
                if r * 2 >= divisor {
                    q += BigInt::one();
                }
                if self.is_negative() {
                    q = -q;
                }
                Self::new(q, scale)
            }
        }
    }

    /// Round to an integer and convert, if it fits.
    pub fn to_i64(&self) -> Option<i64> {
        self.round(0).unscaled.to_i64()
    }

    pub fn to_u64(&self) -> Option<u64> {
        self.round(0).unscaled.to_u64()
    }

    pub fn to_f64(&self) -> f64 {
        self.to_string().parse::<f64>().unwrap_or(f64::NAN)
    }
}

impl FromStr for Decimal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (negative, body) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s.strip_prefix('+').unwrap_or(s)),
        };
        let (mantissa, exp) = match body.find(['e', 'E']) {
            Some(idx) => {
                let exp: i64 = match body[idx + 1..].parse() {
                    Ok(e) => e,
                    Err(_) => bail!("invalid decimal `{s}`"),
                };
                (&body[..idx], exp)
            }
            None => (body, 0),
        };
        let (int_part, frac_part) = match mantissa.split_once('.') {
            Some((i, f)) => (i, f),
            None => (mantissa, ""),
        };
        if int_part.is_empty() && frac_part.is_empty()
            || !int_part.chars().all(|c| c.is_ascii_digit())
            || !frac_part.chars().all(|c| c.is_ascii_digit())
        {
            bail!("invalid decimal `{s}`");
        }

        let digits = format!("{int_part}{frac_part}");
        let mut unscaled = match BigInt::parse_bytes(digits.as_bytes(), 10) {
            Some(v) => v,
            None => bail!("invalid decimal `{s}`"),
        };
        let mut scale = frac_part.len() as i64 - exp;
        if scale < 0 {
            unscaled *= pow10((-scale) as u32);
            scale = 0;
        }
        if scale > u32::MAX as i64 {
            bail!("decimal `{s}` is out of range");
        }
        if negative {
            unscaled = -unscaled;
        }
        Ok(Self::new(unscaled, scale as u32))
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut digits = self.unscaled.abs().to_string();
        let scale = self.scale as usize;
        if scale > 0 {
            if digits.len() <= scale {
                digits = format!("{}{}", "0".repeat(scale + 1 - digits.len()), digits);
            }
            digits.insert(digits.len() - scale, '.');
        }
        if self.is_negative() {
            f.write_str("-")?;
        }
        f.write_str(&digits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_display() -> Result<()> {
        assert_eq!("12.340".parse::<Decimal>()?.to_string(), "12.340");
        assert_eq!("-0.05".parse::<Decimal>()?.to_string(), "-0.05");
        assert_eq!(".5".parse::<Decimal>()?.to_string(), "0.5");
        assert_eq!("1.5e2".parse::<Decimal>()?.to_string(), "150");
        assert_eq!("15e-1".parse::<Decimal>()?.to_string(), "1.5");
        assert!("abc".parse::<Decimal>().is_err());
        Ok(())
    }

    #[test]
    fn digits() -> Result<()> {
        let d: Decimal = "123.45".parse()?;
        assert_eq!(d.int_digits(), 3);
        assert_eq!(d.scale(), 2);
        assert_eq!(d.precision(), 5);
        let d: Decimal = "0.05".parse()?;
        assert_eq!(d.int_digits(), 1);
        assert!(d.is_fraction());
        assert!("-0.99".parse::<Decimal>()?.is_fraction());
        assert!(!"1.00".parse::<Decimal>()?.is_fraction());
        Ok(())
    }

    #[test]
    fn rounding() -> Result<()> {
        let d: Decimal = "2.345".parse()?;
        assert_eq!(d.round(2).to_string(), "2.35");
        let d: Decimal = "-2.345".parse()?;
        assert_eq!(d.round(2).to_string(), "-2.35");
        assert_eq!(d.round(4).to_string(), "-2.3450");
        assert_eq!(d.to_i64(), Some(-2));
        Ok(())
    }
}
