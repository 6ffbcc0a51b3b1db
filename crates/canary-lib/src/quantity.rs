//! Kubernetes resource quantity parsing
//!
//! Quantities such as `250m`, `1.5`, `128Mi` or `1e3` are parsed into an
//! exact fraction so truncation and rounding never go through floating point.

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use std::str::FromStr;
use thiserror::Error;

const MEBIBYTE: i64 = 1024 * 1024;

/// Errors from parsing a quantity string
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuantityError {
    #[error("empty quantity")]
    Empty,

    #[error("invalid number in quantity {0:?}")]
    InvalidNumber(String),

    #[error("unknown suffix {suffix:?} in quantity {input:?}")]
    UnknownSuffix { input: String, suffix: String },

    #[error("quantity {0:?} is out of range")]
    OutOfRange(String),
}

/// Multiplier named by a quantity suffix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Multiplier {
    /// Power of ten
    Decimal(i32),
    /// Power of two
    Binary(u32),
}

impl Multiplier {
    fn from_suffix(suffix: &str) -> Option<Self> {
        let multiplier = match suffix {
            "" => Self::Decimal(0),
            "n" => Self::Decimal(-9),
            "u" => Self::Decimal(-6),
            "m" => Self::Decimal(-3),
            "k" => Self::Decimal(3),
            "M" => Self::Decimal(6),
            "G" => Self::Decimal(9),
            "T" => Self::Decimal(12),
            "P" => Self::Decimal(15),
            "E" => Self::Decimal(18),
            "Ki" => Self::Binary(10),
            "Mi" => Self::Binary(20),
            "Gi" => Self::Binary(30),
            "Ti" => Self::Binary(40),
            "Pi" => Self::Binary(50),
            "Ei" => Self::Binary(60),
            other => {
                let exponent = other.strip_prefix(&['e', 'E'][..])?;
                Self::Decimal(exponent.parse().ok()?)
            }
        };
        Some(multiplier)
    }
}

/// Exact value of a quantity: `numerator / denominator`, denominator > 0
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedQuantity {
    numerator: i128,
    denominator: i128,
}

impl ParsedQuantity {
    pub const ZERO: Self = Self {
        numerator: 0,
        denominator: 1,
    };

    /// Whole units, truncated toward zero
    pub fn truncated(&self) -> i64 {
        saturate(self.numerator / self.denominator)
    }

    /// Whole units, rounded toward positive infinity
    pub fn ceil(&self) -> i64 {
        let quotient = self.numerator / self.denominator;
        if self.numerator % self.denominator > 0 {
            saturate(quotient + 1)
        } else {
            saturate(quotient)
        }
    }

    /// Value in thousandths, rounded away from zero
    pub fn milli_value(&self) -> i64 {
        let Some(scaled) = self.numerator.checked_mul(1000) else {
            return if self.numerator.is_negative() {
                i64::MIN
            } else {
                i64::MAX
            };
        };

        let quotient = scaled / self.denominator;
        if scaled % self.denominator == 0 {
            saturate(quotient)
        } else {
            saturate(quotient + scaled.signum())
        }
    }
}

impl FromStr for ParsedQuantity {
    type Err = QuantityError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(QuantityError::Empty);
        }

        let (negative, unsigned) = match trimmed.as_bytes()[0] {
            b'-' => (true, &trimmed[1..]),
            b'+' => (false, &trimmed[1..]),
            _ => (false, trimmed),
        };

        let number_len = unsigned
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(unsigned.len());
        let (number, suffix) = unsigned.split_at(number_len);

        let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
        if (whole.is_empty() && fraction.is_empty()) || fraction.contains('.') {
            return Err(QuantityError::InvalidNumber(input.to_string()));
        }

        let multiplier =
            Multiplier::from_suffix(suffix).ok_or_else(|| QuantityError::UnknownSuffix {
                input: input.to_string(),
                suffix: suffix.to_string(),
            })?;

        let out_of_range = || QuantityError::OutOfRange(input.to_string());

        let mut mantissa: i128 = 0;
        for digit in whole.bytes().chain(fraction.bytes()) {
            mantissa = mantissa
                .checked_mul(10)
                .and_then(|m| m.checked_add(i128::from(digit - b'0')))
                .ok_or_else(out_of_range)?;
        }

        if mantissa == 0 {
            return Ok(Self::ZERO);
        }

        let scale = i32::try_from(fraction.len()).map_err(|_| out_of_range())?;
        let (mut numerator, exponent) = match multiplier {
            Multiplier::Decimal(exp) => (mantissa, exp.checked_sub(scale).ok_or_else(out_of_range)?),
            Multiplier::Binary(bits) => (
                mantissa.checked_mul(1i128 << bits).ok_or_else(out_of_range)?,
                -scale,
            ),
        };

        let mut denominator = 1;
        if exponent >= 0 {
            numerator = pow10(exponent)
                .and_then(|p| numerator.checked_mul(p))
                .ok_or_else(out_of_range)?;
        } else {
            denominator = pow10(-exponent).ok_or_else(out_of_range)?;
        }

        if negative {
            numerator = -numerator;
        }

        Ok(Self {
            numerator,
            denominator,
        })
    }
}

impl TryFrom<&Quantity> for ParsedQuantity {
    type Error = QuantityError;

    fn try_from(quantity: &Quantity) -> Result<Self, Self::Error> {
        quantity.0.parse()
    }
}

/// Convert bytes to mebibytes, rounding up
pub fn bytes_to_mebibytes_ceil(bytes: i64) -> i64 {
    if bytes > 0 {
        (bytes - 1) / MEBIBYTE + 1
    } else {
        bytes / MEBIBYTE
    }
}

fn pow10(exponent: i32) -> Option<i128> {
    10i128.checked_pow(u32::try_from(exponent).ok()?)
}

fn saturate(value: i128) -> i64 {
    i64::try_from(value).unwrap_or(if value.is_negative() {
        i64::MIN
    } else {
        i64::MAX
    })
}
