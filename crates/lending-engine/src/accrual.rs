//! position accrual engine
//!
//! converts elapsed time into interest using a two-slope, utilization
//! driven rate curve. pool aggregates accrue on every pool-touching
//! operation; positions accrue lazily whenever they are read or mutated.
//!
//! ```text
//! borrow_apy  = base + u * slope                       (u <= kink)
//!             = base + kink * slope + (u - kink) * slope * jump
//! supply_apy  = borrow_apy * u * (1 - reserve_factor)
//! factor(n)   = (1 + apy / SECONDS_PER_YEAR)^n - 1
//! ```

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::RateModel;
use crate::error::Result;
use crate::math::{mul_div, wad_pow};
use crate::pool::Pool;
use crate::position::{BorrowPosition, DepositPosition};
use crate::types::{Amount, Timestamp, Wad, SECONDS_PER_YEAR};

/// annual borrow rate for a utilization
pub fn borrow_rate(model: &RateModel, utilization: Wad) -> Result<Wad> {
    let utilization = utilization.min(Wad::ONE);
    let base = Wad::from_bps(model.base_rate_bps);
    let slope = Wad::from_bps(model.slope_bps);

    match model.kink_utilization_bps.map(Wad::from_bps) {
        Some(kink) if utilization > kink => {
            let steep = Wad(slope.0.saturating_mul(model.jump_multiplier as u128));
            let below = kink.checked_mul(slope)?;
            let above = utilization.checked_sub(kink)?.checked_mul(steep)?;
            base.checked_add(below)?.checked_add(above)
        }
        _ => base.checked_add(utilization.checked_mul(slope)?),
    }
}

/// annual rate earned by depositors
pub fn supply_rate(borrow_rate: Wad, utilization: Wad, reserve_factor_bps: u32) -> Result<Wad> {
    let retained = Wad::ONE.checked_sub(Wad::from_bps(reserve_factor_bps))?;
    borrow_rate
        .checked_mul(utilization.min(Wad::ONE))?
        .checked_mul(retained)
}

/// compounded growth `(1 + r/yr)^elapsed - 1` for an annual rate
pub fn interest_factor(annual_rate: Wad, elapsed_secs: u64) -> Result<Wad> {
    if elapsed_secs == 0 || annual_rate == Wad::ZERO {
        return Ok(Wad::ZERO);
    }
    let per_second = Wad(annual_rate.0 / SECONDS_PER_YEAR as u128);
    let growth = wad_pow(Wad::ONE.checked_add(per_second)?, elapsed_secs)?;
    growth.checked_sub(Wad::ONE)
}

/// what a single pool accrual did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccrualReport {
    pub elapsed_secs: u64,
    pub utilization: Wad,
    pub borrow_apy: Wad,
    pub supply_apy: Wad,
    pub borrow_interest: Amount,
    pub depositor_interest: Amount,
    pub reserve_interest: Amount,
}

/// brings pool aggregates up to `now`. a no-op when no time has passed.
///
/// borrower interest is split between depositors (at the supply rate) and
/// reserves (the remainder), so every unit charged to borrowers is owned by
/// someone and `total_borrows <= total_liquidity` survives accrual.
pub fn accrue_pool(pool: &mut Pool, now: Timestamp) -> Result<AccrualReport> {
    if now <= pool.last_accrual_at {
        return Ok(AccrualReport::default());
    }
    let elapsed = now - pool.last_accrual_at;

    let utilization = pool.utilization()?;
    let borrow_apy = borrow_rate(&pool.params.rate_model, utilization)?;
    let supply_apy = supply_rate(borrow_apy, utilization, pool.params.reserve_factor_bps)?;

    let borrow_factor = interest_factor(borrow_apy, elapsed)?;
    let supply_factor = interest_factor(supply_apy, elapsed)?;

    let borrow_interest = pool.total_borrows.mul_wad(borrow_factor)?;
    let depositor_interest = pool
        .depositor_assets()?
        .mul_wad(supply_factor)?
        .min(borrow_interest);
    let reserve_interest = borrow_interest.checked_sub(depositor_interest)?;

    pool.total_borrows = pool.total_borrows.checked_add(borrow_interest)?;
    pool.depositor_interest = pool.depositor_interest.checked_add(depositor_interest)?;
    pool.total_reserves = pool.total_reserves.checked_add(reserve_interest)?;
    pool.borrow_index = pool
        .borrow_index
        .checked_mul(Wad::ONE.checked_add(borrow_factor)?)?;
    pool.last_accrual_at = now;

    debug!(
        pool = %pool.id,
        elapsed,
        utilization = %utilization,
        borrow_interest = %borrow_interest,
        depositor_interest = %depositor_interest,
        "accrued pool interest"
    );

    Ok(AccrualReport {
        elapsed_secs: elapsed,
        utilization,
        borrow_apy,
        supply_apy,
        borrow_interest,
        depositor_interest,
        reserve_interest,
    })
}

/// grows a borrow position's debt by the pool's index movement since its
/// last accrual. the pool must already be accrued to `now`.
/// returns the interest added.
pub fn accrue_borrow_position(
    position: &mut BorrowPosition,
    pool: &Pool,
    now: Timestamp,
) -> Result<Amount> {
    let mut added = Amount::ZERO;
    if pool.borrow_index > position.borrow_index && position.borrow_index > Wad::ZERO {
        let debt = position.debt()?;
        let grown = Amount(mul_div(debt.0, pool.borrow_index.0, position.borrow_index.0)?);
        added = grown.checked_sub(debt)?;
        position.accrued_interest = position.accrued_interest.checked_add(added)?;
    }
    position.borrow_index = pool.borrow_index;
    position.last_accrual_at = position.last_accrual_at.max(now);
    Ok(added)
}

/// recomputes a deposit position's interest from the pool exchange rate
pub fn accrue_deposit_position(
    position: &mut DepositPosition,
    pool: &Pool,
    now: Timestamp,
) -> Result<()> {
    let value = position.shares.mul_wad(pool.exchange_rate()?)?;
    // rounding on redemption can leave value a hair under principal
    position.accrued_interest = position.accrued_interest.max(value.saturating_sub(position.principal));
    position.last_accrual_at = position.last_accrual_at.max(now);
    Ok(())
}
