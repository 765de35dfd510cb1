//! 18-decimal fixed-point token amounts.
//!
//! Collateral, debt and share balances are held as raw integers scaled by
//! 1e18, the way ERC-20 balances are stored on-chain. Every multiply rounds
//! toward zero. Floating point is only used at the boundary, for prices and
//! ratios.

use std::fmt;

use ethnum::U256;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Raw value of one whole unit.
pub const WAD_RAW: u128 = 1_000_000_000_000_000_000;

/// Non-negative token amount with 18 decimals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Wad(u128);

impl Wad {
    /// Zero amount.
    pub const ZERO: Wad = Wad(0);

    /// One whole unit.
    pub const ONE: Wad = Wad(WAD_RAW);

    /// Wrap a raw scaled integer.
    #[inline]
    pub const fn from_raw(raw: u128) -> Self {
        Wad(raw)
    }

    /// Raw scaled integer.
    #[inline]
    pub const fn raw(self) -> u128 {
        self.0
    }

    /// Convert a decimal amount, flooring to the nearest raw unit.
    ///
    /// Negative and NaN inputs clamp to zero, values beyond the range clamp to the maximum.
    pub fn from_f64(value: f64) -> Self {
        if !(value > 0.0) {
            return Wad::ZERO;
        }
        // `as` saturates and truncates toward zero, which is floor for positive values
        Wad((value * WAD_RAW as f64).floor() as u128)
    }

    /// Lossy conversion to a decimal amount.
    #[inline]
    pub fn to_f64(self) -> f64 {
        self.0 as f64 / WAD_RAW as f64
    }

    #[inline]
    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// `floor(self * other / 1e18)`, saturating at the maximum representable amount.
    pub fn mul_floor(self, other: Wad) -> Wad {
        self.mul_div_floor(other, Wad::ONE)
    }

    /// `floor(self * mul / div)` with a 256-bit intermediate.
    ///
    /// Saturates at the maximum representable amount, including when `div` is zero.
    pub fn mul_div_floor(self, mul: Wad, div: Wad) -> Wad {
        if div.is_zero() {
            return if self.is_zero() || mul.is_zero() {
                Wad::ZERO
            } else {
                Wad(u128::MAX)
            };
        }
        let quotient = U256::from(self.0) * U256::from(mul.0) / U256::from(div.0);
        if quotient > U256::from(u128::MAX) {
            Wad(u128::MAX)
        } else {
            Wad(quotient.as_u128())
        }
    }

    pub fn saturating_add(self, other: Wad) -> Wad {
        Wad(self.0.saturating_add(other.0))
    }

    pub fn saturating_sub(self, other: Wad) -> Wad {
        Wad(self.0.saturating_sub(other.0))
    }
}

impl fmt::Display for Wad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:018}", self.0 / WAD_RAW, self.0 % WAD_RAW)
    }
}

impl Serialize for Wad {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

struct WadVisitor;

impl<'de> Visitor<'de> for WadVisitor {
    type Value = Wad;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a raw 18-decimal amount as an integer string")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Wad, E> {
        v.parse::<u128>()
            .map(Wad)
            .map_err(|e| E::custom(format!("invalid amount {v:?}: {e}")))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<Wad, E> {
        Ok(Wad(v as u128))
    }

    fn visit_u128<E: de::Error>(self, v: u128) -> std::result::Result<Wad, E> {
        Ok(Wad(v))
    }
}

impl<'de> Deserialize<'de> for Wad {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Wad, D::Error> {
        deserializer.deserialize_any(WadVisitor)
    }
}
