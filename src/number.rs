use crate::error::NumError;
use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Rem, Sub};

/// Largest magnitude that still converts to `i64` without loss for the
/// bitwise operators.
const MAX_BITWISE: f64 = 9_007_199_254_740_992.0;

/// Largest `n` for which `n!` is finite in an `f64`.
const MAX_FACTORIAL: f64 = 170.0;

/// Numeric value with an error tag.
///
/// Errors never unwind: an operation on an error-tagged operand returns that
/// operand's error unchanged, so only values that depend on a failure are
/// poisoned by it.
#[derive(Debug, Clone, PartialEq)]
pub struct Number {
    value: f64,
    error: Option<NumError>,
}

impl Number {
    pub fn new(value: f64) -> Self {
        Self { value, error: None }
    }

    pub fn zero() -> Self {
        Self::new(0.0)
    }

    pub fn from_error(error: NumError) -> Self {
        Self {
            value: f64::NAN,
            error: Some(error),
        }
    }

    /// Parses a literal produced by the scanner. `radix` is the decimal
    /// separator the text was written with.
    pub fn parse_literal(text: &str, radix: char) -> Option<Self> {
        let lower = text.to_ascii_lowercase();
        let prefixed = [("0x", 16), ("#", 16), ("0b", 2), ("0o", 8)]
            .into_iter()
            .find(|(prefix, _)| lower.starts_with(prefix));

        if let Some((prefix, base)) = prefixed {
            let digits = &lower[prefix.len()..];
            return u64::from_str_radix(digits, base)
                .ok()
                .map(|n| Self::new(n as f64));
        }

        let normalized: String = text
            .chars()
            .map(|c| if c == radix { '.' } else { c })
            .collect();
        let normalized = if normalized.starts_with('.') {
            format!("0{}", normalized)
        } else {
            normalized
        };

        normalized
            .parse::<f64>()
            .ok()
            .map(Self::checked)
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn error(&self) -> Option<&NumError> {
        self.error.as_ref()
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn is_integer(&self) -> bool {
        !self.is_error() && self.value.is_finite() && self.value.fract() == 0.0
    }

    pub fn is_zero(&self) -> bool {
        !self.is_error() && self.value == 0.0
    }

    /// Wraps a raw result, tagging NaN and infinities.
    pub fn checked(value: f64) -> Self {
        if value.is_nan() {
            Self::from_error(NumError::Undefined)
        } else if value.is_infinite() {
            Self::from_error(NumError::Overflow)
        } else {
            Self::new(value)
        }
    }

    fn combine(self, other: Number, op: impl FnOnce(f64, f64) -> Number) -> Number {
        if self.is_error() {
            return self;
        }
        if other.is_error() {
            return other;
        }
        op(self.value, other.value)
    }

    fn as_bitwise(&self, operation: &'static str) -> Result<i64, NumError> {
        if !self.is_integer() {
            return Err(NumError::IntegerRequired { operation });
        }
        if self.value.abs() > MAX_BITWISE {
            return Err(NumError::Overflow);
        }
        Ok(self.value as i64)
    }

    /// Integer division, truncating toward zero.
    pub fn int_div(self, other: Number) -> Number {
        self.combine(other, |a, b| {
            if b == 0.0 {
                Number::from_error(NumError::DivisionByZero)
            } else {
                Number::checked((a / b).trunc())
            }
        })
    }

    pub fn pow(self, exponent: Number) -> Number {
        self.combine(exponent, |base, exp| {
            if base == 0.0 && exp < 0.0 {
                return Number::from_error(NumError::DivisionByZero);
            }
            if base < 0.0 && exp.fract() != 0.0 {
                return Number::from_error(NumError::OutOfDomain {
                    function: "power".to_string(),
                });
            }
            Number::checked(base.powf(exp))
        })
    }

    pub fn factorial(self) -> Number {
        if self.is_error() {
            return self;
        }
        if !self.is_integer() || self.value < 0.0 {
            return Number::from_error(NumError::OutOfDomain {
                function: "factorial".to_string(),
            });
        }
        if self.value > MAX_FACTORIAL {
            return Number::from_error(NumError::Overflow);
        }
        let n = self.value as u32;
        Number::new((2..=n).map(f64::from).product())
    }

    pub fn shl(self, bits: Number) -> Number {
        self.shift(bits, "<<", 1)
    }

    pub fn shr(self, bits: Number) -> Number {
        self.shift(bits, ">>", -1)
    }

    fn shift(self, bits: Number, operation: &'static str, direction: i64) -> Number {
        if self.is_error() {
            return self;
        }
        if bits.is_error() {
            return bits;
        }
        let (value, bits) = match (self.as_bitwise(operation), bits.as_bitwise(operation)) {
            (Ok(v), Ok(b)) => (v, b * direction),
            (Err(e), _) | (_, Err(e)) => return Number::from_error(e),
        };
        if bits >= 0 {
            if bits > 63 {
                return Number::from_error(NumError::Overflow);
            }
            match (value as i128).checked_shl(bits as u32) {
                Some(shifted) if shifted.unsigned_abs() <= MAX_BITWISE as u128 => {
                    Number::new(shifted as f64)
                }
                _ => Number::from_error(NumError::Overflow),
            }
        } else {
            let bits = (-bits).min(63) as u32;
            Number::new((value >> bits) as f64)
        }
    }

    pub fn bit_and(self, other: Number) -> Number {
        self.bitwise(other, "&", |a, b| a & b)
    }

    pub fn bit_or(self, other: Number) -> Number {
        self.bitwise(other, "|", |a, b| a | b)
    }

    fn bitwise(self, other: Number, operation: &'static str, op: fn(i64, i64) -> i64) -> Number {
        if self.is_error() {
            return self;
        }
        if other.is_error() {
            return other;
        }
        match (self.as_bitwise(operation), other.as_bitwise(operation)) {
            (Ok(a), Ok(b)) => Number::new(op(a, b) as f64),
            (Err(e), _) | (_, Err(e)) => Number::from_error(e),
        }
    }
}

impl Default for Number {
    fn default() -> Self {
        Self::zero()
    }
}

impl From<f64> for Number {
    fn from(value: f64) -> Self {
        Self::checked(value)
    }
}

impl Add for Number {
    type Output = Number;

    fn add(self, other: Number) -> Number {
        self.combine(other, |a, b| Number::checked(a + b))
    }
}

impl Sub for Number {
    type Output = Number;

    fn sub(self, other: Number) -> Number {
        self.combine(other, |a, b| Number::checked(a - b))
    }
}

impl Mul for Number {
    type Output = Number;

    fn mul(self, other: Number) -> Number {
        self.combine(other, |a, b| Number::checked(a * b))
    }
}

impl Div for Number {
    type Output = Number;

    fn div(self, other: Number) -> Number {
        self.combine(other, |a, b| {
            if b == 0.0 {
                Number::from_error(NumError::DivisionByZero)
            } else {
                Number::checked(a / b)
            }
        })
    }
}

impl Rem for Number {
    type Output = Number;

    /// Remainder with the sign of the dividend.
    fn rem(self, other: Number) -> Number {
        self.combine(other, |a, b| {
            if b == 0.0 {
                Number::from_error(NumError::DivisionByZero)
            } else {
                Number::checked(a % b)
            }
        })
    }
}

impl Neg for Number {
    type Output = Number;

    fn neg(self) -> Number {
        if self.is_error() {
            self
        } else {
            Number::new(-self.value)
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.error {
            Some(error) => write!(f, "{}", error),
            None => write!(f, "{}", self.value),
        }
    }
}
