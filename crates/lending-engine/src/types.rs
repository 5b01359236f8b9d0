//! core value types shared by the ledger
//!
//! monetary amounts use a 7-decimal fixed point so they map one-to-one onto
//! `decimal(20,7)` columns. rates, indices and prices use an 18-decimal
//! ("wad") fixed point. no floating point is used anywhere.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::math::mul_div;

/// decimal places carried by [`Amount`]
pub const AMOUNT_DECIMALS: u32 = 7;

/// one whole unit of an asset in [`Amount`] precision
pub const AMOUNT_SCALE: u128 = 10_000_000;

/// one in [`Wad`] precision
pub const WAD: u128 = 1_000_000_000_000_000_000;

/// basis points denominator
pub const BPS_DENOMINATOR: u128 = 10_000;

pub const SECONDS_PER_YEAR: u64 = 365 * 24 * 3600;

/// Unix timestamp in seconds
pub type Timestamp = u64;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(
    /// lending pool identifier
    PoolId
);
string_id!(
    /// asset identifier (symbol or contract address)
    AssetId
);
string_id!(
    /// depositor, borrower or liquidator identity
    AccountId
);

/// parses a non-negative decimal such as `"1000"` or `"0.75"` into a
/// fixed-point integer with `decimals` places
fn parse_decimal(input: &str, decimals: u32, field: &'static str) -> Result<u128> {
    let invalid = || Error::invalid_param(field, format!("`{input}` is not a decimal number"));
    let (whole, frac) = match input.trim().split_once('.') {
        Some((whole, frac)) => (whole, frac),
        None => (input.trim(), ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return Err(invalid());
    }
    if frac.len() > decimals as usize {
        return Err(Error::invalid_param(
            field,
            format!("`{input}` has more than {decimals} decimal places"),
        ));
    }
    let digits = |s: &str| s.chars().all(|c| c.is_ascii_digit());
    if !digits(whole) || !digits(frac) {
        return Err(invalid());
    }

    let scale = 10u128.pow(decimals);
    let whole: u128 = if whole.is_empty() { 0 } else { whole.parse().map_err(|_| invalid())? };
    let frac: u128 = if frac.is_empty() {
        0
    } else {
        frac.parse::<u128>().map_err(|_| invalid())? * 10u128.pow(decimals - frac.len() as u32)
    };
    whole
        .checked_mul(scale)
        .and_then(|w| w.checked_add(frac))
        .ok_or(Error::MathOverflow)
}

/// amount of an asset, 7-decimal fixed point
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount(pub u128);

impl Amount {
    pub const ZERO: Self = Amount(0);

    /// whole units, e.g. `Amount::from_units(1000)` is 1000.0000000
    pub const fn from_units(units: u64) -> Self {
        Amount(units as u128 * AMOUNT_SCALE)
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Amount) -> Result<Amount> {
        self.0.checked_add(other.0).map(Amount).ok_or(Error::MathOverflow)
    }

    pub fn checked_sub(self, other: Amount) -> Result<Amount> {
        self.0.checked_sub(other.0).map(Amount).ok_or(Error::MathOverflow)
    }

    pub fn saturating_sub(self, other: Amount) -> Amount {
        Amount(self.0.saturating_sub(other.0))
    }

    /// `self * factor`, rounded down
    pub fn mul_wad(self, factor: Wad) -> Result<Amount> {
        mul_div(self.0, factor.0, WAD).map(Amount)
    }

    /// `self * bps / 10_000`, rounded down
    pub fn mul_bps(self, bps: u32) -> Result<Amount> {
        mul_div(self.0, bps as u128, BPS_DENOMINATOR).map(Amount)
    }

    /// `self / other` as a wad ratio; zero when `other` is zero
    pub fn ratio(self, other: Amount) -> Result<Wad> {
        if other.is_zero() {
            return Ok(Wad::ZERO);
        }
        mul_div(self.0, WAD, other.0).map(Wad)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{:07}",
            self.0 / AMOUNT_SCALE,
            self.0 % AMOUNT_SCALE
        )
    }
}

impl FromStr for Amount {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        parse_decimal(s, AMOUNT_DECIMALS, "amount").map(Amount)
    }
}

/// 18-decimal fixed point used for rates, indices, prices and ratios
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Wad(pub u128);

impl Wad {
    pub const ZERO: Self = Wad(0);
    pub const ONE: Self = Wad(WAD);

    pub const fn from_bps(bps: u32) -> Self {
        Wad(bps as u128 * (WAD / BPS_DENOMINATOR))
    }

    /// `numerator / denominator` in wad precision
    pub fn from_ratio(numerator: u128, denominator: u128) -> Result<Self> {
        if denominator == 0 {
            return Err(Error::MathOverflow);
        }
        mul_div(numerator, WAD, denominator).map(Wad)
    }

    pub fn checked_add(self, other: Wad) -> Result<Wad> {
        self.0.checked_add(other.0).map(Wad).ok_or(Error::MathOverflow)
    }

    pub fn checked_sub(self, other: Wad) -> Result<Wad> {
        self.0.checked_sub(other.0).map(Wad).ok_or(Error::MathOverflow)
    }

    pub fn checked_mul(self, other: Wad) -> Result<Wad> {
        mul_div(self.0, other.0, WAD).map(Wad)
    }

    pub fn checked_div(self, other: Wad) -> Result<Wad> {
        if other.0 == 0 {
            return Err(Error::MathOverflow);
        }
        mul_div(self.0, WAD, other.0).map(Wad)
    }

    /// rounded down to basis points
    pub fn to_bps(self) -> u128 {
        self.0 / (WAD / BPS_DENOMINATOR)
    }
}

impl fmt::Display for Wad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:018}", self.0 / WAD, self.0 % WAD)
    }
}

impl FromStr for Wad {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        parse_decimal(s, 18, "wad").map(Wad)
    }
}

/// collateral supplied alongside a borrow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collateral {
    pub asset: AssetId,
    pub amount: Amount,
}

impl Collateral {
    pub fn new(asset: impl Into<AssetId>, amount: Amount) -> Self {
        Self {
            asset: asset.into(),
            amount,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_amount_display() {
        assert_eq!(Amount::from_units(1000).to_string(), "1000.0000000");
        assert_eq!(Amount(12_345).to_string(), "0.0012345");
    }

    #[test]
    fn test_amount_bps() {
        let amount = Amount::from_units(1000);
        assert_eq!(amount.mul_bps(8000).unwrap(), Amount::from_units(800));
        assert_eq!(amount.mul_bps(0).unwrap(), Amount::ZERO);
    }

    #[test]
    fn test_ratio_zero_denominator() {
        assert_eq!(Amount::from_units(5).ratio(Amount::ZERO).unwrap(), Wad::ZERO);
        assert_eq!(
            Amount::from_units(900).ratio(Amount::from_units(1000)).unwrap(),
            Wad::from_bps(9000)
        );
    }

    #[test]
    fn test_wad_bps_roundtrip() {
        assert_eq!(Wad::from_bps(500).to_bps(), 500);
        assert_eq!(Wad::from_bps(10_000), Wad::ONE);
    }

    #[test]
    fn test_parse_decimals() {
        assert_eq!("1000".parse::<Amount>().unwrap(), Amount::from_units(1000));
        assert_eq!("0.0012345".parse::<Amount>().unwrap(), Amount(12_345));
        assert_eq!(".5".parse::<Amount>().unwrap(), Amount(5_000_000));
        assert_eq!("0.7".parse::<Wad>().unwrap(), Wad::from_bps(7000));
        assert!("1.00000001".parse::<Amount>().is_err());
        assert!("-1".parse::<Amount>().is_err());
        assert!("abc".parse::<Wad>().is_err());
        assert!(".".parse::<Amount>().is_err());
    }
}
