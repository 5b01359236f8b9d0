//! health factor evaluator
//!
//! ```text
//! health_factor = collateral_amount * price * liquidation_threshold / debt
//! ```
//!
//! below 1.0 a position is liquidatable. a position without debt is
//! infinitely healthy; one without collateral but with debt scores zero.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};
use crate::math::mul_div;
use crate::position::BorrowPosition;
use crate::types::{Amount, Wad, WAD};

/// health factor in wad precision, `u128::MAX` standing in for infinity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HealthFactor(pub u128);

impl HealthFactor {
    pub const ZERO: Self = HealthFactor(0);
    pub const ONE: Self = HealthFactor(WAD);
    pub const INFINITE: Self = HealthFactor(u128::MAX);

    pub fn is_infinite(self) -> bool {
        self == Self::INFINITE
    }

    pub fn is_healthy(self) -> bool {
        self >= Self::ONE
    }

    pub fn as_wad(self) -> Wad {
        Wad(self.0)
    }

    /// rejects factors below 1.0
    pub fn ensure_healthy(self) -> Result<()> {
        if self.is_healthy() {
            Ok(())
        } else {
            Err(Error::HealthFactorTooLow {
                health_factor: self.to_string(),
            })
        }
    }
}

impl fmt::Display for HealthFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_infinite() {
            f.write_str("inf")
        } else {
            write!(f, "{}.{:04}", self.0 / WAD, (self.0 % WAD) / (WAD / 10_000))
        }
    }
}

/// collateral value in units of the pool asset
pub fn collateral_value(collateral_amount: Amount, price: Wad) -> Result<Amount> {
    collateral_amount.mul_wad(price)
}

/// health factor for raw figures
pub fn health_factor(
    collateral_amount: Amount,
    debt: Amount,
    price: Wad,
    liquidation_threshold_bps: u32,
) -> Result<HealthFactor> {
    if debt.is_zero() {
        return Ok(HealthFactor::INFINITE);
    }
    let adjusted = collateral_value(collateral_amount, price)?.mul_bps(liquidation_threshold_bps)?;
    let factor = mul_div(adjusted.0, WAD, debt.0)?;
    // finite debt never reports infinity
    Ok(HealthFactor(factor.min(u128::MAX - 1)))
}

/// health factor of an already-accrued position at `price`
pub fn evaluate(
    position: &BorrowPosition,
    price: Wad,
    liquidation_threshold_bps: u32,
) -> Result<HealthFactor> {
    health_factor(
        position.collateral_amount,
        position.debt()?,
        price,
        liquidation_threshold_bps,
    )
}

/// largest debt the collateral supports under the collateral factor
pub fn max_borrow(collateral_amount: Amount, price: Wad, collateral_factor_bps: u32) -> Result<Amount> {
    collateral_value(collateral_amount, price)?.mul_bps(collateral_factor_bps)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_healthy_borrow() {
        // (1000 * 0.8) / 600 = 1.3333
        let hf = health_factor(
            Amount::from_units(1000),
            Amount::from_units(600),
            Wad::ONE,
            8000,
        )
        .unwrap();
        assert_eq!(hf, HealthFactor(1_333_333_333_333_333_333));
        assert!(hf.is_healthy());
        assert_eq!(hf.to_string(), "1.3333");
    }

    #[test]
    fn test_price_drop_makes_unhealthy() {
        // (1000 * 0.7 * 0.8) / 600 = 0.9333
        let hf = health_factor(
            Amount::from_units(1000),
            Amount::from_units(600),
            Wad::from_bps(7000),
            8000,
        )
        .unwrap();
        assert_eq!(hf, HealthFactor(933_333_333_333_333_333));
        assert!(hf.ensure_healthy().is_err());
    }

    #[test]
    fn test_no_debt_is_infinite() {
        let hf = health_factor(Amount::ZERO, Amount::ZERO, Wad::ONE, 8000).unwrap();
        assert!(hf.is_infinite());
        assert_eq!(hf.to_string(), "inf");
    }

    #[test]
    fn test_zero_collateral_is_zero() {
        let hf = health_factor(Amount::ZERO, Amount::from_units(1), Wad::ONE, 8000).unwrap();
        assert_eq!(hf, HealthFactor::ZERO);
    }

    #[test]
    fn test_max_borrow() {
        assert_eq!(
            max_borrow(Amount::from_units(1000), Wad::ONE, 7500).unwrap(),
            Amount::from_units(750)
        );
    }
}
