//! Utility functions and types useful throughout the codebase.

use std::{
    cmp::Ordering,
    fmt::{Debug, Display, Formatter},
};

use ethnum::U256;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A type alias to make [`U256Wrapper`] easier to type internally.
pub type U256W = U256Wrapper;

/// The `U256Wrapper` is responsible for allowing the serialisation of the
/// [`U256`] type to JSON.
///
/// It serializes as a `0x`-prefixed, zero-padded, 64-digit hexadecimal string
/// and deserializes from either hexadecimal (with the prefix) or decimal
/// strings, matching the formats found in state snapshots.
#[derive(Clone, Copy, Default, Eq, Hash, PartialEq)]
#[repr(transparent)]
pub struct U256Wrapper(pub U256);

impl U256Wrapper {
    /// Gets the wrapped value.
    #[must_use]
    pub fn value(&self) -> U256 {
        self.0
    }

    /// Gets the wrapped value as a `u64` if it fits.
    #[must_use]
    pub fn as_small(&self) -> Option<u64> {
        u64::try_from(self.0).ok()
    }
}

impl Debug for U256Wrapper {
    /// The wrapper has absolutely no semantic meaning, so we print the
    /// underlying value for the debug representation.
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Display for U256Wrapper {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl PartialOrd for U256Wrapper {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for U256Wrapper {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl From<U256> for U256Wrapper {
    fn from(value: U256) -> Self {
        Self(value)
    }
}

impl From<U256Wrapper> for U256 {
    fn from(U256Wrapper(value): U256Wrapper) -> Self {
        value
    }
}

impl From<usize> for U256Wrapper {
    fn from(value: usize) -> Self {
        Self(U256::from(value as u128))
    }
}

impl From<u64> for U256Wrapper {
    fn from(value: u64) -> Self {
        Self(U256::from(value))
    }
}

impl From<u128> for U256Wrapper {
    fn from(value: u128) -> Self {
        Self(U256::new(value))
    }
}

impl Serialize for U256Wrapper {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&to_hex_word(self.0))
    }
}

impl<'de> Deserialize<'de> for U256Wrapper {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s: String = Deserialize::deserialize(deserializer)?;
        let u256 = parse_word(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid 256-bit word {s:?}")))?;
        Ok(U256Wrapper(u256))
    }
}

/// Renders `value` as a `0x`-prefixed, zero-padded, 64-digit hex string.
#[must_use]
pub fn to_hex_word(value: U256) -> String {
    let mut out = String::from("0x");
    out.push_str(&hex::encode(value.to_be_bytes()));
    out
}

/// Parses a 256-bit word from either a `0x`-prefixed hexadecimal string or a
/// decimal string, returning [`None`] if the input is neither.
///
/// A bare `0x` is read as zero, as some node implementations emit it for
/// empty storage.
#[must_use]
pub fn parse_word(text: &str) -> Option<U256> {
    let text = text.trim();
    if let Some(digits) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        if digits.is_empty() {
            return Some(U256::ZERO);
        }
        U256::from_str_radix(digits, 16).ok()
    } else if text.is_empty() {
        None
    } else {
        U256::from_str_radix(text, 10).ok()
    }
}

/// A signed difference between two 256-bit words.
///
/// The difference of two [`U256`] values does not fit in a two's complement
/// 256-bit integer, so the sign is carried separately from the magnitude. A
/// zero delta is never negative.
#[derive(Clone, Copy, Default, Eq, Hash, PartialEq)]
pub struct Delta {
    negative:  bool,
    magnitude: U256,
}

impl Delta {
    /// The delta of no change.
    pub const ZERO: Self = Self {
        negative:  false,
        magnitude: U256::ZERO,
    };

    /// Computes `after - before` without overflow.
    #[must_use]
    pub fn between(before: U256, after: U256) -> Self {
        if after >= before {
            Self::positive(after - before)
        } else {
            Self::negative(before - after)
        }
    }

    /// Constructs a non-negative delta of `magnitude`.
    #[must_use]
    pub fn positive(magnitude: U256) -> Self {
        Self {
            negative: false,
            magnitude,
        }
    }

    /// Constructs a non-positive delta of `magnitude`.
    #[must_use]
    pub fn negative(magnitude: U256) -> Self {
        Self {
            negative: magnitude != U256::ZERO,
            magnitude,
        }
    }

    /// Checks whether the delta is strictly below zero.
    #[must_use]
    pub fn is_negative(&self) -> bool {
        self.negative
    }

    /// Checks whether the delta is strictly above zero.
    #[must_use]
    pub fn is_positive(&self) -> bool {
        !self.negative && self.magnitude != U256::ZERO
    }

    /// Checks whether the delta is zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.magnitude == U256::ZERO
    }

    /// Gets the absolute value of the delta.
    #[must_use]
    pub fn magnitude(&self) -> U256 {
        self.magnitude
    }

    /// Gets the delta as a (lossy) signed float.
    #[must_use]
    pub fn as_f64(&self) -> f64 {
        let magnitude = self.magnitude.as_f64();
        if self.negative {
            -magnitude
        } else {
            magnitude
        }
    }
}

impl From<i128> for Delta {
    fn from(value: i128) -> Self {
        let magnitude = U256::new(value.unsigned_abs());
        if value < 0 {
            Self::negative(magnitude)
        } else {
            Self::positive(magnitude)
        }
    }
}

impl Debug for Delta {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self}")
    }
}

impl Display for Delta {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.negative {
            write!(f, "-{}", self.magnitude)
        } else {
            write!(f, "{}", self.magnitude)
        }
    }
}

impl Serialize for Delta {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Delta {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s: String = Deserialize::deserialize(deserializer)?;
        let (negative, digits) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s.as_str()),
        };
        let magnitude = U256::from_str_radix(digits, 10).map_err(serde::de::Error::custom)?;
        Ok(if negative {
            Self::negative(magnitude)
        } else {
            Self::positive(magnitude)
        })
    }
}

/// Rounds `value` to two decimal places.
#[must_use]
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Clips `value` into the inclusive range described by `bounds`.
#[must_use]
pub fn clip(value: f64, bounds: (f64, f64)) -> f64 {
    value.clamp(bounds.0, bounds.1)
}

/// Serialization for relative change rates, which may be infinite.
///
/// JSON has no representation for infinity, so infinite rates are written as
/// the strings `"Infinity"` and `"-Infinity"`.
pub mod serde_rate {
    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::trivially_copy_pass_by_ref)] // Signature required by serde
    pub fn serialize<S: Serializer>(rate: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if rate.is_infinite() {
            let text = if rate.is_sign_positive() {
                "Infinity"
            } else {
                "-Infinity"
            };
            serializer.serialize_str(text)
        } else {
            serializer.serialize_f64(*rate)
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<f64, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(f64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(number) => Ok(number),
            Raw::Text(text) => match text.as_str() {
                "Infinity" => Ok(f64::INFINITY),
                "-Infinity" => Ok(f64::NEG_INFINITY),
                other => Err(serde::de::Error::custom(format!("invalid rate {other:?}"))),
            },
        }
    }
}

#[cfg(test)]
mod test {
    use ethnum::U256;

    use crate::utility::{parse_word, round2, to_hex_word, Delta, U256Wrapper};

    #[test]
    fn parses_hex_and_decimal_words() {
        assert_eq!(parse_word("0x0de0b6b3a7640000"), Some(U256::new(1_000_000_000_000_000_000)));
        assert_eq!(parse_word("1000000000000000000"), Some(U256::new(1_000_000_000_000_000_000)));
        assert_eq!(parse_word("0x"), Some(U256::ZERO));
        assert_eq!(parse_word("not a number"), None);
        assert_eq!(parse_word(""), None);
    }

    #[test]
    fn delta_never_overflows() {
        let delta = Delta::between(U256::MAX, U256::ZERO);
        assert!(delta.is_negative());
        assert_eq!(delta.magnitude(), U256::MAX);

        let delta = Delta::between(U256::ZERO, U256::MAX);
        assert!(delta.is_positive());
        assert_eq!(delta.to_string(), U256::MAX.to_string());
    }

    #[test]
    fn zero_delta_is_not_negative() {
        let delta = Delta::negative(U256::ZERO);
        assert!(delta.is_zero());
        assert!(!delta.is_negative());
        assert_eq!(delta, Delta::ZERO);
    }

    #[test]
    fn words_serialize_as_padded_hex() -> anyhow::Result<()> {
        let word = U256Wrapper(U256::new(8));
        let json = serde_json::to_string(&word)?;
        assert_eq!(json, format!("\"{}\"", to_hex_word(U256::new(8))));
        assert_eq!(json.len(), 2 + 2 + 64);

        let back: U256Wrapper = serde_json::from_str(&json)?;
        assert_eq!(back, word);
        Ok(())
    }

    #[test]
    fn deltas_round_trip_through_json() -> anyhow::Result<()> {
        let delta = Delta::from(-42_i128);
        let json = serde_json::to_string(&delta)?;
        assert_eq!(json, "\"-42\"");
        assert_eq!(serde_json::from_str::<Delta>(&json)?, delta);
        Ok(())
    }

    #[test]
    fn rounds_to_two_places() {
        assert!((round2(0.123_456) - 0.12).abs() < f64::EPSILON);
        assert!((round2(1.005_1) - 1.01).abs() < f64::EPSILON);
    }
}
