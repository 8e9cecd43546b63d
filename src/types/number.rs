//! Scalar numbers and ratios used by data rules and domain descriptors

use serde::{Deserialize, Serialize};
use std::fmt;

/// A rule parameter or packet offset.
///
/// Integer arithmetic stays integral (wrapping on overflow, matching tick
/// counters); any operation involving a float promotes to `Float`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    /// Zero as an integer.
    pub const ZERO: Number = Number::Int(0);

    /// Value as `f64`.
    pub fn as_f64(self) -> f64 {
        match self {
            Number::Int(v) => v as f64,
            Number::Float(v) => v,
        }
    }

    /// Value as `i64`; floats are rounded to nearest, saturating.
    pub fn as_i64(self) -> i64 {
        match self {
            Number::Int(v) => v,
            Number::Float(v) => v.round() as i64,
        }
    }

    pub fn is_integer(self) -> bool {
        matches!(self, Number::Int(_))
    }

    pub fn add(self, other: Number) -> Number {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => Number::Int(a.wrapping_add(b)),
            (a, b) => Number::Float(a.as_f64() + b.as_f64()),
        }
    }

    pub fn mul(self, other: Number) -> Number {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => Number::Int(a.wrapping_mul(b)),
            (a, b) => Number::Float(a.as_f64() * b.as_f64()),
        }
    }

    /// Multiply by a sample index.
    pub fn scale(self, index: usize) -> Number {
        self.mul(Number::Int(index as i64))
    }
}

impl Default for Number {
    fn default() -> Self {
        Number::ZERO
    }
}

impl From<i64> for Number {
    fn from(v: i64) -> Self {
        Number::Int(v)
    }
}

impl From<i32> for Number {
    fn from(v: i32) -> Self {
        Number::Int(v as i64)
    }
}

impl From<f64> for Number {
    fn from(v: f64) -> Self {
        Number::Float(v)
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Number::Int(v) => write!(f, "{}", v),
            Number::Float(v) => write!(f, "{}", v),
        }
    }
}

/// A rational number, used for tick resolutions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ratio {
    pub numerator: i64,
    pub denominator: i64,
}

impl Ratio {
    /// Create a ratio; the denominator must not be zero.
    pub fn new(numerator: i64, denominator: i64) -> crate::Result<Self> {
        if denominator == 0 {
            return Err(crate::DaqError::configuration("ratio denominator must not be zero"));
        }
        Ok(Self { numerator, denominator })
    }

    /// Reduce to lowest terms with a positive denominator.
    pub fn simplified(self) -> Self {
        let divisor = gcd(self.numerator.unsigned_abs(), self.denominator.unsigned_abs()).max(1);
        let sign = if self.denominator < 0 { -1 } else { 1 };
        Self {
            numerator: sign * self.numerator / divisor as i64,
            denominator: sign * self.denominator / divisor as i64,
        }
    }

    pub fn as_f64(self) -> f64 {
        self.numerator as f64 / self.denominator as f64
    }
}

impl fmt::Display for Ratio {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}
