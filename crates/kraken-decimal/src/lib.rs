//! Fixed-point decimal arithmetic for exchange price handling.
//!
//! [`Decimal`] pairs an unbounded unscaled integer with a `scale`
//! (digits after the decimal point) and an `increment` (the unscaled
//! value is kept a multiple of it, giving tick-size granularity).
//! Values are immutable: every operation returns a new value carrying
//! the left operand's scale, increment, and rounding mode, with right
//! operands rescaled to match before the integer arithmetic runs.
//!
//! The canonical string form — exactly `scale` digits after the
//! point, trailing zeros preserved — feeds order-book level keys and
//! checksum input, so it has to be byte-stable across platforms. See
//! [`Decimal::canonical`].
//!
//! # Example
//!
//! ```
//! use kraken_decimal::Decimal;
//!
//! let price: Decimal = "1.015".parse().unwrap();
//! assert_eq!(price.scale(), 3);
//! assert_eq!(price.add(&Decimal::from_i64(1)).canonical(), "2.015");
//! ```

mod rounding;

pub use rounding::RoundingMode;

use num_bigint::{BigInt, Sign};
use num_traits::{Signed, ToPrimitive, Zero};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Number of decimal places assigned by the integer constructors.
pub const DEFAULT_SCALE: i64 = 12;

/// Granularity assigned by constructors (multiples of one unscaled unit).
pub const DEFAULT_INCREMENT: i64 = 1;

/// Errors produced by [`Decimal`] constructors and division.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecimalError {
    /// The input string is not a decimal number.
    #[error("invalid number \"{0}\"")]
    Parse(String),
    /// Division by a zero-valued operand.
    #[error("division by zero")]
    DivideByZero,
}

/// Arbitrary-precision fixed-point number.
#[derive(Debug, Clone)]
pub struct Decimal {
    /// Unscaled integer representation.
    integer: BigInt,
    /// Digits to the right of the decimal point.
    scale: i64,
    /// Smallest allowable unit, in unscaled-integer terms.
    increment: i64,
    /// Rounding applied whenever digits are discarded.
    rounding: RoundingMode,
}

impl Default for Decimal {
    fn default() -> Self {
        Self {
            integer: BigInt::zero(),
            scale: 0,
            increment: DEFAULT_INCREMENT,
            rounding: RoundingMode::default(),
        }
    }
}

impl FromStr for Decimal {
    type Err = DecimalError;

    /// Parses a literal decimal.
    ///
    /// The scale is the number of fractional digits present. Inputs
    /// with characters outside sign/digits/point (exponent notation in
    /// practice) take an exponent-aware fallback that picks a scale
    /// representing the value losslessly.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Ok(Self::default());
        }
        let body = trimmed
            .strip_prefix(['+', '-'])
            .unwrap_or(trimmed);
        let plain = !body.is_empty()
            && body.chars().all(|c| c.is_ascii_digit() || c == '.')
            && body.chars().filter(|c| *c == '.').count() <= 1
            && body.chars().any(|c| c.is_ascii_digit());
        if !plain {
            return Self::parse_scientific(trimmed);
        }
        let (int_part, frac_part) = match body.split_once('.') {
            Some((i, f)) => (i, f),
            None => (body, ""),
        };
        let digits = format!("{int_part}{frac_part}");
        let magnitude =
            BigInt::from_str(&digits).map_err(|_| DecimalError::Parse(trimmed.to_string()))?;
        let integer = if trimmed.starts_with('-') {
            -magnitude
        } else {
            magnitude
        };
        Ok(Self {
            integer,
            scale: frac_part.len() as i64,
            increment: DEFAULT_INCREMENT,
            rounding: RoundingMode::default(),
        })
    }
}

impl Decimal {
    /// Creates a value from an integer at [`DEFAULT_SCALE`].
    pub fn from_i64(i: i64) -> Self {
        Self::from_bigint(BigInt::from(i))
    }

    /// Creates a value from an unscaled integer at [`DEFAULT_SCALE`].
    pub fn from_bigint(integer: BigInt) -> Self {
        Self {
            integer,
            scale: 0,
            increment: DEFAULT_INCREMENT,
            rounding: RoundingMode::default(),
        }
        .set_scale(DEFAULT_SCALE)
    }

    /// Creates a value from a float, deriving the scale from the
    /// float's shortest decimal text. Returns `None` for non-finite
    /// inputs.
    pub fn from_f64(f: f64) -> Option<Self> {
        if !f.is_finite() {
            return None;
        }
        format!("{f}").parse().ok()
    }

    /// Exponent-notation fallback for [`FromStr`].
    fn parse_scientific(s: &str) -> Result<Self, DecimalError> {
        let (mantissa, exponent) = s
            .split_once(['e', 'E'])
            .ok_or_else(|| DecimalError::Parse(s.to_string()))?;
        if mantissa.is_empty() {
            return Err(DecimalError::Parse(s.to_string()));
        }
        let exponent: i64 = exponent
            .parse()
            .map_err(|_| DecimalError::Parse(s.to_string()))?;
        let base: Decimal = mantissa.parse()?;
        let scale = base.scale - exponent;
        let mut integer = base.integer;
        let scale = if scale < 0 {
            integer *= pow10(-scale);
            0
        } else {
            scale
        };
        Ok(Self {
            integer,
            scale,
            increment: DEFAULT_INCREMENT,
            rounding: RoundingMode::default(),
        })
    }

    /// Returns the value with `scale` decimal places.
    ///
    /// Growing the scale is exact; shrinking it discards digits
    /// through the rounding mode.
    pub fn set_scale(&self, scale: i64) -> Self {
        let mut result = self.clone();
        if scale == self.scale {
            return result;
        }
        let diff = scale - self.scale;
        result.scale = scale;
        if result.integer.is_zero() {
            return result;
        }
        let factor = pow10(diff.abs());
        if diff > 0 {
            result.integer = &self.integer * factor;
        } else {
            result.integer = self.rounding.div_round(&self.integer, &factor);
        }
        result.round_to_increment();
        result
    }

    /// Number of digits to the right of the decimal point.
    pub fn scale(&self) -> i64 {
        self.scale
    }

    /// Returns the value constrained to multiples of `increment`
    /// unscaled units, re-rounding immediately.
    pub fn set_increment(&self, increment: i64) -> Self {
        let mut result = self.clone();
        result.increment = increment.max(1);
        result.round_to_increment();
        result
    }

    /// Smallest allowable unit, in unscaled-integer terms.
    pub fn increment(&self) -> i64 {
        self.increment
    }

    /// Copies the scale and granularity of `size` onto the value.
    pub fn set_size(&self, size: &Decimal) -> Self {
        self.set_scale(size.scale)
            .set_increment(size.integer.to_i64().unwrap_or(DEFAULT_INCREMENT))
    }

    /// Returns the value with a different rounding mode.
    pub fn set_rounding(&self, rounding: RoundingMode) -> Self {
        let mut result = self.clone();
        result.rounding = rounding;
        result
    }

    /// Rounding mode applied when digits are discarded.
    pub fn rounding(&self) -> RoundingMode {
        self.rounding
    }

    /// One tick: the increment expressed at this value's scale.
    pub fn smallest_increment(&self) -> Self {
        Self {
            integer: BigInt::from(self.increment),
            scale: self.scale,
            increment: self.increment,
            rounding: self.rounding,
        }
    }

    /// Returns `self + other`.
    pub fn add(&self, other: &Decimal) -> Self {
        let mut result = self.clone();
        if other.is_zero() {
            return result;
        }
        result.integer = &self.integer + other.set_scale(self.scale).integer;
        result.round_to_increment();
        result
    }

    /// Returns `self - other`.
    pub fn sub(&self, other: &Decimal) -> Self {
        let mut result = self.clone();
        if other.is_zero() {
            return result;
        }
        result.integer = &self.integer - other.set_scale(self.scale).integer;
        result.round_to_increment();
        result
    }

    /// Returns `self * other` at this value's scale.
    pub fn mul(&self, other: &Decimal) -> Self {
        let mut result = self.clone();
        result.integer = &self.integer * other.set_scale(self.scale).integer;
        result.integer = self
            .rounding
            .div_round(&result.integer, &self.scaling_factor());
        result.round_to_increment();
        result
    }

    /// Returns `self / other` at this value's scale.
    ///
    /// A zero divisor — including one that collapses to zero once
    /// rescaled to this value's scale — is a domain error.
    pub fn div(&self, other: &Decimal) -> Result<Self, DecimalError> {
        if other.sign() == 0 {
            return Err(DecimalError::DivideByZero);
        }
        let divisor = other.set_scale(self.scale).integer;
        if divisor.is_zero() {
            return Err(DecimalError::DivideByZero);
        }
        let mut result = self.clone();
        let numerator = &self.integer * self.scaling_factor();
        result.integer = self.rounding.div_round(&numerator, &divisor);
        result.round_to_increment();
        Ok(result)
    }

    /// Returns `self ** exponent`, computed through floating point.
    ///
    /// Precision beyond this value's scale is not contractual.
    pub fn pow(&self, exponent: &Decimal) -> Self {
        Self::from_f64(self.to_f64().powf(exponent.to_f64()))
            .unwrap_or_default()
            .set_scale(self.scale)
    }

    /// Returns `e ** self`, computed through floating point.
    pub fn exp(&self) -> Self {
        Self::from_f64(self.to_f64().exp())
            .unwrap_or_default()
            .set_scale(self.scale)
    }

    /// Returns the absolute value.
    pub fn abs(&self) -> Self {
        let mut result = self.clone();
        result.integer = self.integer.abs();
        result
    }

    /// Returns -1, 0, or +1.
    pub fn sign(&self) -> i32 {
        match self.integer.sign() {
            Sign::Minus => -1,
            Sign::NoSign => 0,
            Sign::Plus => 1,
        }
    }

    /// Whether the value is exactly zero.
    pub fn is_zero(&self) -> bool {
        self.integer.is_zero()
    }

    /// Nudges the value by `ticks` multiples of the smallest increment.
    pub fn offset_ticks(&self, ticks: &Decimal) -> Self {
        self.add(&self.smallest_increment().mul(ticks))
    }

    /// Adjusts the value by a fraction: `self * (1 + percent)`.
    ///
    /// The multiplicand is promoted to the larger of the two scales
    /// before multiplying, and the result restored to this value's
    /// scale.
    pub fn offset_percent(&self, percent: &Decimal) -> Self {
        let multiplicand = Self::from_i64(1).add(percent);
        let original = self.scale;
        self.set_scale(multiplicand.scale.max(original))
            .mul(&multiplicand)
            .set_scale(original)
    }

    /// `10 ^ scale` as a big integer.
    pub fn scaling_factor(&self) -> BigInt {
        pow10(self.scale)
    }

    /// The raw unscaled integer.
    pub fn unscaled(&self) -> &BigInt {
        &self.integer
    }

    /// Lossy conversion through the canonical text.
    pub fn to_f64(&self) -> f64 {
        self.canonical().parse::<f64>().unwrap_or(0.0)
    }

    /// The integer part, fractional digits truncated.
    pub fn to_i64(&self) -> i64 {
        if self.integer.is_zero() {
            return 0;
        }
        if self.scale <= 0 {
            return self.integer.to_i64().unwrap_or(0);
        }
        (&self.integer / pow10(self.scale)).to_i64().unwrap_or(0)
    }

    /// Canonical serialisation: optional sign, integer digits, then
    /// exactly `scale` fractional digits. This exact byte sequence is
    /// what book keys and checksum input are built from; [`fmt::Display`]
    /// happens to render the same digits but is a separate, user-facing
    /// operation.
    pub fn canonical(&self) -> String {
        let digits = self.integer.magnitude().to_str_radix(10);
        let sign = if self.integer.sign() == Sign::Minus {
            "-"
        } else {
            ""
        };
        if self.scale <= 0 {
            return format!("{sign}{digits}");
        }
        let scale = self.scale as usize;
        let padded = if digits.len() <= scale {
            format!("{}{digits}", "0".repeat(scale + 1 - digits.len()))
        } else {
            digits
        };
        let (int_part, frac_part) = padded.split_at(padded.len() - scale);
        format!("{sign}{int_part}.{frac_part}")
    }

    /// Re-rounds the unscaled integer to the nearest multiple of the
    /// increment; half-way ties follow the rounding mode.
    fn round_to_increment(&mut self) {
        if self.increment <= 1 {
            return;
        }
        let tick = BigInt::from(self.increment);
        self.integer = self.rounding.div_round(&self.integer, &tick) * tick;
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

impl PartialEq for Decimal {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Decimal {}

impl PartialOrd for Decimal {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Decimal {
    /// Compares as rational values; representation does not matter.
    fn cmp(&self, other: &Self) -> Ordering {
        if self.scale == other.scale {
            return self.integer.cmp(&other.integer);
        }
        let lhs = &self.integer * pow10(other.scale.max(0));
        let rhs = &other.integer * pow10(self.scale.max(0));
        lhs.cmp(&rhs)
    }
}

impl Serialize for Decimal {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.canonical())
    }
}

impl<'de> Deserialize<'de> for Decimal {
    /// Accepts JSON strings and numbers. Numbers are recovered through
    /// their shortest decimal text so the wire literal's precision is
    /// preserved; exponent forms route through the scientific parse
    /// path.
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        use serde::de::Error;

        #[derive(Deserialize)]
        #[serde(untagged)]
        enum StringOrNumber {
            String(String),
            Number(serde_json::Number),
        }

        match StringOrNumber::deserialize(deserializer)? {
            StringOrNumber::String(s) => s.parse().map_err(D::Error::custom),
            StringOrNumber::Number(n) => n.to_string().parse().map_err(D::Error::custom),
        }
    }
}

fn pow10(exp: i64) -> BigInt {
    num_traits::pow(BigInt::from(10), exp.max(0) as usize)
}
