//! Fixed-point commodity quantities.
//!
//! All quantities are decimal grams with milligram resolution, stored as
//! integer milligrams so that conservation arithmetic is exact.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

const MG_PER_GRAM: u64 = 1_000;
const FRACTION_DIGITS: usize = 3;

/// A non-negative quantity in grams, held as integer milligrams.
///
/// The upper bound is `i64::MAX` milligrams so every quantity converts to a
/// signed [`GramsDelta`] without overflow.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct Grams(u64);

impl Grams {
    pub const ZERO: Self = Self(0);
    pub const MAX: Self = Self(i64::MAX as u64);

    /// Build from integer milligrams. Fails above [`Grams::MAX`].
    pub fn from_milligrams(mg: u64) -> Result<Self, TypeError> {
        if mg > Self::MAX.0 {
            return Err(TypeError::InvalidQuantity(format!(
                "{mg}mg exceeds the maximum representable quantity"
            )));
        }
        Ok(Self(mg))
    }

    /// Build from whole grams. Fails above [`Grams::MAX`].
    pub fn from_grams(grams: u64) -> Result<Self, TypeError> {
        grams
            .checked_mul(MG_PER_GRAM)
            .ok_or_else(|| TypeError::InvalidQuantity(format!("{grams}g overflows")))
            .and_then(Self::from_milligrams)
    }

    pub fn milligrams(self) -> u64 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0
            .checked_add(other.0)
            .filter(|mg| *mg <= Self::MAX.0)
            .map(Self)
    }

    pub fn checked_sub(self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    /// Sum an iterator of quantities, returning `None` on overflow.
    pub fn checked_sum<I: IntoIterator<Item = Self>>(iter: I) -> Option<Self> {
        iter.into_iter()
            .try_fold(Self::ZERO, |acc, q| acc.checked_add(q))
    }
}

impl fmt::Debug for Grams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Grams({self})")
    }
}

impl fmt::Display for Grams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_grams(f, self.0)
    }
}

impl FromStr for Grams {
    type Err = TypeError;

    /// Parse `"400"`, `"400g"`, or `"12.5"`; at most three fractional digits.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || TypeError::InvalidQuantity(s.to_string());
        let trimmed = s.trim();
        let number = trimmed.strip_suffix('g').unwrap_or(trimmed);
        let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));

        if whole.is_empty() || !whole.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        if fraction.len() > FRACTION_DIGITS || !fraction.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        if number.ends_with('.') {
            return Err(invalid());
        }

        let whole: u64 = whole.parse().map_err(|_| invalid())?;
        let mut fraction_mg: u64 = 0;
        for (i, digit) in fraction.bytes().enumerate() {
            fraction_mg += u64::from(digit - b'0') * 10u64.pow((FRACTION_DIGITS - 1 - i) as u32);
        }

        whole
            .checked_mul(MG_PER_GRAM)
            .and_then(|mg| mg.checked_add(fraction_mg))
            .ok_or_else(invalid)
            .and_then(Self::from_milligrams)
    }
}

impl TryFrom<u64> for Grams {
    type Error = TypeError;

    fn try_from(mg: u64) -> Result<Self, Self::Error> {
        Self::from_milligrams(mg)
    }
}

impl From<Grams> for u64 {
    fn from(q: Grams) -> Self {
        q.0
    }
}

/// A signed quantity change recorded on an event (milligrams).
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GramsDelta(i64);

impl GramsDelta {
    pub const ZERO: Self = Self(0);

    /// A decrease of `q`.
    pub fn debit(q: Grams) -> Self {
        // Grams never exceeds i64::MAX milligrams.
        Self(-(q.0 as i64))
    }

    /// An increase of `q`.
    pub fn credit(q: Grams) -> Self {
        Self(q.0 as i64)
    }

    pub fn milligrams(self) -> i64 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for GramsDelta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GramsDelta({self})")
    }
}

impl fmt::Display for GramsDelta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 < 0 {
            f.write_str("-")?;
        } else if self.0 > 0 {
            f.write_str("+")?;
        }
        write_grams(f, self.0.unsigned_abs())
    }
}

fn write_grams(f: &mut fmt::Formatter<'_>, mg: u64) -> fmt::Result {
    let whole = mg / MG_PER_GRAM;
    let fraction = mg % MG_PER_GRAM;
    if fraction == 0 {
        write!(f, "{whole}g")
    } else {
        let digits = format!("{fraction:03}");
        write!(f, "{whole}.{}g", digits.trim_end_matches('0'))
    }
}
