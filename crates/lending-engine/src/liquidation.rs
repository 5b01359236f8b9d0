//! liquidation policy
//!
//! A position whose health factor has fallen below 1.0 may be partly repaid
//! by a third party in exchange for collateral at a discount:
//!
//! ```text
//! repaid          <= debt * close_factor
//! seized_value     = repaid * (1 + penalty)
//! seized           = seized_value / price          (collateral units)
//! ```
//!
//! when the position holds too little collateral to cover `seized`, all of it
//! is taken and only the debt it pays for is cleared. any debt left over on a
//! position with no collateral is reported as bad debt.

use serde::{Deserialize, Serialize};

use crate::config::PoolParams;
use crate::error::{Error, Result};
use crate::health::{collateral_value, evaluate, health_factor, HealthFactor};
use crate::math::mul_div;
use crate::position::BorrowPosition;
use crate::types::{AccountId, Amount, AssetId, PoolId, Wad, BPS_DENOMINATOR, WAD};

pub fn is_liquidatable(
    position: &BorrowPosition,
    price: Wad,
    liquidation_threshold_bps: u32,
) -> Result<bool> {
    Ok(!evaluate(position, price, liquidation_threshold_bps)?.is_healthy())
}

/// debt remains but no collateral backs it
pub fn is_bad_debt(position: &BorrowPosition) -> Result<bool> {
    Ok(position.collateral_amount.is_zero() && !position.debt()?.is_zero())
}

/// most a single liquidation may repay. positions too small for the close
/// factor to bite can be cleared in full.
pub fn max_repayable(debt: Amount, close_factor_bps: u32) -> Result<Amount> {
    let capped = debt.mul_bps(close_factor_bps)?;
    Ok(if capped.is_zero() { debt } else { capped })
}

/// computed effect of a liquidation, before anything is applied
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationPlan {
    pub health_factor_before: HealthFactor,
    pub repaid: Amount,
    /// collateral units handed to the liquidator
    pub seized_collateral: Amount,
    /// value of the seized collateral in pool-asset units
    pub seized_value: Amount,
    pub remaining_debt: Amount,
    pub remaining_collateral: Amount,
    pub health_factor_after: HealthFactor,
    /// collateral ran out while debt remains
    pub bad_debt: bool,
}

/// plans a liquidation of an already-accrued position.
///
/// `requested` is what the liquidator offers to repay; it is capped at the
/// close factor and, when collateral runs short, at what the collateral
/// covers.
pub fn plan(
    position: &BorrowPosition,
    requested: Amount,
    price: Wad,
    params: &PoolParams,
) -> Result<LiquidationPlan> {
    if requested.is_zero() {
        return Err(Error::InvalidAmount { field: "repay_amount" });
    }
    if price == Wad::ZERO {
        return Err(Error::InvalidPrice(position.collateral_asset.clone()));
    }

    let before = evaluate(position, price, params.liquidation_threshold_bps)?;
    if before.is_healthy() {
        return Err(Error::NotLiquidatable(position.borrower.clone()));
    }

    let debt = position.debt()?;
    let bonus_bps = BPS_DENOMINATOR + params.liquidation_penalty_bps as u128;

    let mut repaid = requested.min(max_repayable(debt, params.close_factor_bps)?);
    let mut seized_value = Amount(mul_div(repaid.0, bonus_bps, BPS_DENOMINATOR)?);
    let mut seized = Amount(mul_div(seized_value.0, WAD, price.0)?);

    if seized > position.collateral_amount {
        seized = position.collateral_amount;
        seized_value = collateral_value(seized, price)?;
        repaid = Amount(mul_div(seized_value.0, BPS_DENOMINATOR, bonus_bps)?).min(repaid);
    }

    // an exhausted position, or one where rounding leaves nothing to trade
    if seized.is_zero() || repaid.is_zero() {
        return Err(Error::NothingToSeize(position.borrower.clone()));
    }

    let remaining_debt = debt.checked_sub(repaid)?;
    let remaining_collateral = position.collateral_amount.checked_sub(seized)?;
    let after = health_factor(
        remaining_collateral,
        remaining_debt,
        price,
        params.liquidation_threshold_bps,
    )?;

    Ok(LiquidationPlan {
        health_factor_before: before,
        repaid,
        seized_collateral: seized,
        seized_value,
        remaining_debt,
        remaining_collateral,
        health_factor_after: after,
        bad_debt: remaining_collateral.is_zero() && !remaining_debt.is_zero(),
    })
}

/// what a committed liquidation did
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationReport {
    pub pool: PoolId,
    pub borrower: AccountId,
    pub liquidator: AccountId,
    pub repaid: Amount,
    pub interest_repaid: Amount,
    pub principal_repaid: Amount,
    pub collateral_asset: AssetId,
    pub seized_collateral: Amount,
    pub seized_value: Amount,
    pub remaining_debt: Amount,
    pub remaining_collateral: Amount,
    pub health_factor_before: HealthFactor,
    pub health_factor_after: HealthFactor,
    pub position_closed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LiquidationOutcome {
    Liquidated(LiquidationReport),
    /// all collateral was seized and debt remains; needs covering from
    /// reserves or an insurance fund
    PartialLiquidationBadDebt(LiquidationReport),
}

impl LiquidationOutcome {
    pub fn report(&self) -> &LiquidationReport {
        match self {
            LiquidationOutcome::Liquidated(report) => report,
            LiquidationOutcome::PartialLiquidationBadDebt(report) => report,
        }
    }

    pub fn is_bad_debt(&self) -> bool {
        matches!(self, LiquidationOutcome::PartialLiquidationBadDebt(_))
    }
}

/// an at-risk position found by a scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationCandidate {
    pub pool: PoolId,
    pub borrower: AccountId,
    pub health_factor: HealthFactor,
    pub debt: Amount,
    pub collateral_asset: AssetId,
    pub collateral_amount: Amount,
    pub max_repayable: Amount,
}

/// `Some` when the accrued position is liquidatable at `price`. positions
/// with no collateral left are bad debt, not candidates.
pub fn candidate(
    position: &BorrowPosition,
    price: Wad,
    params: &PoolParams,
) -> Result<Option<LiquidationCandidate>> {
    if is_bad_debt(position)? {
        return Ok(None);
    }
    let hf = evaluate(position, price, params.liquidation_threshold_bps)?;
    if hf.is_healthy() {
        return Ok(None);
    }
    let debt = position.debt()?;
    Ok(Some(LiquidationCandidate {
        pool: position.pool.clone(),
        borrower: position.borrower.clone(),
        health_factor: hf,
        debt,
        collateral_asset: position.collateral_asset.clone(),
        collateral_amount: position.collateral_amount,
        max_repayable: max_repayable(debt, params.close_factor_bps)?,
    }))
}
