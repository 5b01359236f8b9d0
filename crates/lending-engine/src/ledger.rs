//! pool ledger operations
//!
//! each `execute_*` function applies one balance-changing operation to
//! working copies of a pool and the position it touches. every function
//! accrues the pool (and the position) to `now` first and validates before
//! writing any field it returns, so on `Err` the caller simply drops its
//! copies. locking, price lookup and persistence are the engine's job.

use serde::{Deserialize, Serialize};

use crate::accrual::{accrue_borrow_position, accrue_deposit_position, accrue_pool};
use crate::error::{Error, Result};
use crate::health::{health_factor, max_borrow, HealthFactor};
use crate::liquidation::{self, LiquidationOutcome, LiquidationReport};
use crate::math::mul_div;
use crate::pool::Pool;
use crate::position::{BorrowPosition, DepositPosition};
use crate::types::{AccountId, Amount, Collateral, Timestamp, Wad};

fn require_positive(amount: Amount, field: &'static str) -> Result<()> {
    if amount.is_zero() {
        return Err(Error::InvalidAmount { field });
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositOutcome {
    pub position: DepositPosition,
    pub shares_minted: Amount,
    /// rate the shares were minted at
    pub exchange_rate: Wad,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawOutcome {
    /// `None` once every share is redeemed
    pub position: Option<DepositPosition>,
    pub amount: Amount,
    pub shares_burned: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BorrowOutcome {
    pub position: BorrowPosition,
    pub health_factor: HealthFactor,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepayOutcome {
    /// `None` once the debt is cleared
    pub position: Option<BorrowPosition>,
    pub interest_repaid: Amount,
    pub principal_repaid: Amount,
    /// part of the payment above outstanding debt, returned to the payer
    pub refunded: Amount,
    /// collateral handed back when the position closes
    pub collateral_released: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollateralOutcome {
    /// `None` when a debt-free position gives back all its collateral
    pub position: Option<BorrowPosition>,
    pub health_factor: HealthFactor,
}

pub fn execute_deposit(
    pool: &mut Pool,
    position: Option<DepositPosition>,
    depositor: &AccountId,
    amount: Amount,
    now: Timestamp,
) -> Result<DepositOutcome> {
    require_positive(amount, "amount")?;
    let minimum = pool.params.min_deposit;
    if amount < minimum {
        return Err(Error::BelowMinimumDeposit { amount, minimum });
    }

    accrue_pool(pool, now)?;
    let mut position =
        position.unwrap_or_else(|| DepositPosition::new(pool.id.clone(), depositor.clone(), now));
    accrue_deposit_position(&mut position, pool, now)?;

    let exchange_rate = pool.exchange_rate()?;
    let shares = pool.shares_for(amount)?;
    // too small to buy a single share unit
    require_positive(shares, "amount")?;

    let total_deposits = pool.total_deposits.checked_add(amount)?;
    let total_shares = pool.total_shares.checked_add(shares)?;
    let principal = position.principal.checked_add(amount)?;
    let held = position.shares.checked_add(shares)?;

    pool.total_deposits = total_deposits;
    pool.total_shares = total_shares;
    position.principal = principal;
    position.shares = held;

    Ok(DepositOutcome {
        position,
        shares_minted: shares,
        exchange_rate,
    })
}

pub fn execute_withdraw(
    pool: &mut Pool,
    mut position: DepositPosition,
    shares: Amount,
    now: Timestamp,
) -> Result<WithdrawOutcome> {
    require_positive(shares, "shares")?;
    if shares > position.shares {
        return Err(Error::InsufficientShares {
            requested: shares,
            available: position.shares,
        });
    }

    accrue_pool(pool, now)?;
    accrue_deposit_position(&mut position, pool, now)?;

    let amount = pool.assets_for(shares)?;
    let liquidity_after = pool.total_liquidity()?.saturating_sub(amount);
    if pool.total_borrows > liquidity_after {
        return Err(Error::InsufficientLiquidity {
            requested: amount,
            available: pool.available_liquidity()?,
        });
    }

    // the pool's interest and principal shrink in proportion to what leaves
    let depositor_assets = pool.depositor_assets()?;
    let interest_part = if depositor_assets.is_zero() {
        Amount::ZERO
    } else {
        Amount(mul_div(amount.0, pool.depositor_interest.0, depositor_assets.0)?)
    };
    let principal_part = amount.checked_sub(interest_part)?;

    let principal_burned = Amount(mul_div(position.principal.0, shares.0, position.shares.0)?);

    pool.depositor_interest = pool.depositor_interest.checked_sub(interest_part)?;
    pool.total_deposits = pool.total_deposits.saturating_sub(principal_part);
    pool.total_shares = pool.total_shares.checked_sub(shares)?;

    position.shares = position.shares.checked_sub(shares)?;
    position.principal = position.principal.saturating_sub(principal_burned);
    position.accrued_interest = Amount::ZERO;

    let position = if position.shares.is_zero() {
        None
    } else {
        accrue_deposit_position(&mut position, pool, now)?;
        Some(position)
    };

    Ok(WithdrawOutcome {
        position,
        amount,
        shares_burned: shares,
    })
}

/// collateral checks that need no price: the pool accepts the asset and it
/// matches what an existing position already holds
pub fn check_borrow_collateral(
    pool: &Pool,
    position: Option<&BorrowPosition>,
    collateral: &Collateral,
) -> Result<()> {
    if !pool.params.accepts(&collateral.asset) {
        return Err(Error::CollateralNotAccepted {
            pool: pool.id.clone(),
            asset: collateral.asset.clone(),
        });
    }
    if let Some(existing) = position {
        if existing.collateral_asset != collateral.asset {
            return Err(Error::CollateralMismatch {
                existing: existing.collateral_asset.clone(),
                requested: collateral.asset.clone(),
            });
        }
    }
    Ok(())
}

/// borrows `amount` against `collateral` (added to whatever the position
/// already holds) at a validated collateral `price`.
pub fn execute_borrow(
    pool: &mut Pool,
    position: Option<BorrowPosition>,
    borrower: &AccountId,
    amount: Amount,
    collateral: &Collateral,
    price: Wad,
    now: Timestamp,
) -> Result<BorrowOutcome> {
    require_positive(amount, "amount")?;
    check_borrow_collateral(pool, position.as_ref(), collateral)?;

    accrue_pool(pool, now)?;
    let mut position = position.unwrap_or_else(|| {
        BorrowPosition::new(
            pool.id.clone(),
            borrower.clone(),
            collateral.asset.clone(),
            pool.borrow_index,
            now,
        )
    });
    accrue_borrow_position(&mut position, pool, now)?;

    let total_borrows = pool.total_borrows.checked_add(amount)?;
    if total_borrows > pool.total_liquidity()? {
        return Err(Error::InsufficientLiquidity {
            requested: amount,
            available: pool.available_liquidity()?,
        });
    }

    let collateral_amount = position.collateral_amount.checked_add(collateral.amount)?;
    let debt = position.debt()?.checked_add(amount)?;

    let max = max_borrow(collateral_amount, price, pool.params.collateral_factor_bps)?;
    if debt > max {
        return Err(Error::InsufficientCollateral {
            max_borrow: max,
            requested: debt,
        });
    }
    let hf = health_factor(
        collateral_amount,
        debt,
        price,
        pool.params.liquidation_threshold_bps,
    )?;
    hf.ensure_healthy()?;

    position.principal = position.principal.checked_add(amount)?;
    position.collateral_amount = collateral_amount;
    position.health_factor = hf;
    pool.total_borrows = total_borrows;

    Ok(BorrowOutcome {
        position,
        health_factor: hf,
    })
}

/// repays interest first, then principal. anything above the outstanding
/// debt is reported as `refunded` rather than applied.
pub fn execute_repay(
    pool: &mut Pool,
    mut position: BorrowPosition,
    amount: Amount,
    now: Timestamp,
) -> Result<RepayOutcome> {
    require_positive(amount, "amount")?;

    accrue_pool(pool, now)?;
    accrue_borrow_position(&mut position, pool, now)?;

    let applied = amount.min(position.debt()?);
    let refunded = amount.checked_sub(applied)?;
    let (interest_repaid, principal_repaid) = position.apply_payment(applied)?;
    pool.total_borrows = pool.total_borrows.saturating_sub(applied);

    let (position, collateral_released) = if position.debt()?.is_zero() {
        (None, position.collateral_amount)
    } else {
        (Some(position), Amount::ZERO)
    };

    Ok(RepayOutcome {
        position,
        interest_repaid,
        principal_repaid,
        refunded,
        collateral_released,
    })
}

pub fn execute_add_collateral(
    pool: &mut Pool,
    mut position: BorrowPosition,
    collateral: &Collateral,
    now: Timestamp,
) -> Result<BorrowPosition> {
    require_positive(collateral.amount, "collateral_amount")?;
    if position.collateral_asset != collateral.asset {
        return Err(Error::CollateralMismatch {
            existing: position.collateral_asset.clone(),
            requested: collateral.asset.clone(),
        });
    }

    accrue_pool(pool, now)?;
    accrue_borrow_position(&mut position, pool, now)?;
    position.collateral_amount = position.collateral_amount.checked_add(collateral.amount)?;
    Ok(position)
}

/// releases collateral. `price` is required while the position carries debt;
/// the health factor after the withdrawal must stay at or above 1.0.
pub fn execute_withdraw_collateral(
    pool: &mut Pool,
    mut position: BorrowPosition,
    amount: Amount,
    price: Option<Wad>,
    now: Timestamp,
) -> Result<CollateralOutcome> {
    require_positive(amount, "collateral_amount")?;
    if amount > position.collateral_amount {
        return Err(Error::CollateralExceeded {
            requested: amount,
            available: position.collateral_amount,
        });
    }

    accrue_pool(pool, now)?;
    accrue_borrow_position(&mut position, pool, now)?;

    let remaining = position.collateral_amount.checked_sub(amount)?;
    let debt = position.debt()?;
    let hf = if debt.is_zero() {
        HealthFactor::INFINITE
    } else {
        let price = price.ok_or_else(|| Error::InvalidPrice(position.collateral_asset.clone()))?;
        let hf = health_factor(remaining, debt, price, pool.params.liquidation_threshold_bps)?;
        hf.ensure_healthy()?;
        hf
    };

    position.collateral_amount = remaining;
    position.health_factor = hf;
    let position = if position.is_closed() { None } else { Some(position) };

    Ok(CollateralOutcome {
        position,
        health_factor: hf,
    })
}

/// liquidates part of an unhealthy position. debt reduction and collateral
/// seizure are applied together; the returned position is `None` when
/// nothing is left on it.
pub fn execute_liquidation(
    pool: &mut Pool,
    mut position: BorrowPosition,
    liquidator: &AccountId,
    requested: Amount,
    price: Wad,
    now: Timestamp,
) -> Result<(Option<BorrowPosition>, LiquidationOutcome)> {
    require_positive(requested, "repay_amount")?;
    if *liquidator == position.borrower {
        return Err(Error::invalid_param("liquidator", "cannot liquidate own position"));
    }

    accrue_pool(pool, now)?;
    accrue_borrow_position(&mut position, pool, now)?;

    let plan = liquidation::plan(&position, requested, price, &pool.params)?;
    let (interest_repaid, principal_repaid) = position.apply_payment(plan.repaid)?;
    position.collateral_amount = plan.remaining_collateral;
    position.health_factor = plan.health_factor_after;
    pool.total_borrows = pool.total_borrows.saturating_sub(plan.repaid);

    let position_closed = position.is_closed();
    let report = LiquidationReport {
        pool: pool.id.clone(),
        borrower: position.borrower.clone(),
        liquidator: liquidator.clone(),
        repaid: plan.repaid,
        interest_repaid,
        principal_repaid,
        collateral_asset: position.collateral_asset.clone(),
        seized_collateral: plan.seized_collateral,
        seized_value: plan.seized_value,
        remaining_debt: plan.remaining_debt,
        remaining_collateral: plan.remaining_collateral,
        health_factor_before: plan.health_factor_before,
        health_factor_after: plan.health_factor_after,
        position_closed,
    };

    let outcome = if plan.bad_debt {
        LiquidationOutcome::PartialLiquidationBadDebt(report)
    } else {
        LiquidationOutcome::Liquidated(report)
    };
    let position = if position_closed { None } else { Some(position) };
    Ok((position, outcome))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolParams;

    const DAY: u64 = 24 * 3600;

    fn pool() -> Pool {
        let params = PoolParams {
            accepted_collateral: vec!["PROP".into()],
            ..Default::default()
        };
        Pool::new("p".into(), "USDC".into(), params, 0)
    }

    fn funded_pool() -> (Pool, DepositPosition) {
        let mut pool = pool();
        let outcome =
            execute_deposit(&mut pool, None, &"alice".into(), Amount::from_units(1000), 0).unwrap();
        (pool, outcome.position)
    }

    fn collateral(units: u64) -> Collateral {
        Collateral::new("PROP", Amount::from_units(units))
    }

    #[test]
    fn test_first_deposit_mints_one_to_one() {
        let (pool, position) = funded_pool();
        assert_eq!(position.shares, Amount::from_units(1000));
        assert_eq!(position.principal, Amount::from_units(1000));
        assert_eq!(pool.total_deposits, Amount::from_units(1000));
        assert_eq!(pool.total_shares, Amount::from_units(1000));
    }

    #[test]
    fn test_zero_deposit_rejected() {
        let mut pool = pool();
        let before = pool.clone();
        assert_eq!(
            execute_deposit(&mut pool, None, &"alice".into(), Amount::ZERO, 0),
            Err(Error::InvalidAmount { field: "amount" })
        );
        assert_eq!(pool, before);
    }

    #[test]
    fn test_minimum_deposit() {
        let mut pool = pool();
        pool.params.min_deposit = Amount::from_units(10);
        assert!(matches!(
            execute_deposit(&mut pool, None, &"alice".into(), Amount::from_units(5), 0),
            Err(Error::BelowMinimumDeposit { .. })
        ));
    }

    #[test]
    fn test_borrow_within_collateral_factor() {
        let (mut pool, _) = funded_pool();
        let outcome = execute_borrow(
            &mut pool,
            None,
            &"bob".into(),
            Amount::from_units(600),
            &collateral(1000),
            Wad::ONE,
            0,
        )
        .unwrap();
        assert_eq!(outcome.health_factor, HealthFactor(1_333_333_333_333_333_333));
        assert_eq!(pool.total_borrows, Amount::from_units(600));
        assert_eq!(outcome.position.collateral_amount, Amount::from_units(1000));
    }

    #[test]
    fn test_borrow_beyond_collateral_factor_rejected() {
        let (mut pool, _) = funded_pool();
        assert_eq!(
            execute_borrow(
                &mut pool,
                None,
                &"bob".into(),
                Amount::from_units(800),
                &collateral(1000),
                Wad::ONE,
                0,
            ),
            Err(Error::InsufficientCollateral {
                max_borrow: Amount::from_units(750),
                requested: Amount::from_units(800),
            })
        );
        assert_eq!(pool.total_borrows, Amount::ZERO);
    }

    #[test]
    fn test_borrow_rejects_unaccepted_collateral() {
        let (mut pool, _) = funded_pool();
        let result = execute_borrow(
            &mut pool,
            None,
            &"bob".into(),
            Amount::from_units(1),
            &Collateral::new("DOGE", Amount::from_units(10)),
            Wad::ONE,
            0,
        );
        assert!(matches!(result, Err(Error::CollateralNotAccepted { .. })));
    }

    #[test]
    fn test_borrow_beyond_liquidity_rejected() {
        let (mut pool, _) = funded_pool();
        let result = execute_borrow(
            &mut pool,
            None,
            &"bob".into(),
            Amount::from_units(1001),
            &collateral(10_000),
            Wad::ONE,
            0,
        );
        assert!(matches!(result, Err(Error::InsufficientLiquidity { .. })));
    }

    #[test]
    fn test_withdraw_blocked_by_utilization() {
        let (mut pool, deposit) = funded_pool();
        execute_borrow(
            &mut pool,
            None,
            &"bob".into(),
            Amount::from_units(700),
            &collateral(1000),
            Wad::ONE,
            0,
        )
        .unwrap();

        let result = execute_withdraw(&mut pool, deposit.clone(), Amount::from_units(400), 0);
        assert!(matches!(result, Err(Error::InsufficientLiquidity { .. })));

        let outcome = execute_withdraw(&mut pool, deposit, Amount::from_units(300), 0).unwrap();
        assert_eq!(outcome.amount, Amount::from_units(300));
        assert_eq!(pool.total_deposits, Amount::from_units(700));
    }

    #[test]
    fn test_withdraw_more_shares_than_held() {
        let (mut pool, deposit) = funded_pool();
        assert_eq!(
            execute_withdraw(&mut pool, deposit, Amount::from_units(1001), 0),
            Err(Error::InsufficientShares {
                requested: Amount::from_units(1001),
                available: Amount::from_units(1000),
            })
        );
    }

    #[test]
    fn test_full_withdraw_includes_interest() {
        let (mut pool, deposit) = funded_pool();
        let borrow = execute_borrow(
            &mut pool,
            None,
            &"bob".into(),
            Amount::from_units(500),
            &collateral(1000),
            Wad::ONE,
            0,
        )
        .unwrap();

        let repay = execute_repay(&mut pool, borrow.position, Amount::from_units(600), 30 * DAY).unwrap();
        assert!(repay.position.is_none());
        assert!(repay.interest_repaid > Amount::ZERO);
        assert!(repay.refunded > Amount::ZERO);
        assert_eq!(repay.collateral_released, Amount::from_units(1000));

        let withdraw = execute_withdraw(&mut pool, deposit, Amount::from_units(1000), 30 * DAY).unwrap();
        assert!(withdraw.position.is_none());
        assert!(withdraw.amount > Amount::from_units(1000));
        assert_eq!(pool.total_shares, Amount::ZERO);
        assert_eq!(pool.depositor_interest, Amount::ZERO);
        // what stays behind is the protocol's cut
        assert_eq!(pool.total_liquidity().unwrap(), pool.total_reserves);
    }

    #[test]
    fn test_partial_repay_hits_interest_first() {
        let (mut pool, _) = funded_pool();
        let borrow = execute_borrow(
            &mut pool,
            None,
            &"bob".into(),
            Amount::from_units(500),
            &collateral(1000),
            Wad::ONE,
            0,
        )
        .unwrap();

        let outcome = execute_repay(&mut pool, borrow.position, Amount::from_units(100), 30 * DAY).unwrap();
        let position = outcome.position.unwrap();
        assert!(outcome.interest_repaid > Amount::ZERO);
        assert_eq!(position.accrued_interest, Amount::ZERO);
        assert_eq!(
            position.principal,
            Amount::from_units(500)
                .checked_sub(outcome.principal_repaid)
                .unwrap()
        );
        assert_eq!(outcome.refunded, Amount::ZERO);
    }

    #[test]
    fn test_withdraw_collateral_checks_health() {
        let (mut pool, _) = funded_pool();
        let borrow = execute_borrow(
            &mut pool,
            None,
            &"bob".into(),
            Amount::from_units(600),
            &collateral(1000),
            Wad::ONE,
            0,
        )
        .unwrap();

        // 800 * 0.8 / 600 = 1.0667 still healthy
        let outcome = execute_withdraw_collateral(
            &mut pool,
            borrow.position.clone(),
            Amount::from_units(200),
            Some(Wad::ONE),
            0,
        )
        .unwrap();
        assert!(outcome.health_factor.is_healthy());

        // 700 * 0.8 / 600 = 0.9333
        assert!(matches!(
            execute_withdraw_collateral(
                &mut pool,
                borrow.position.clone(),
                Amount::from_units(300),
                Some(Wad::ONE),
                0,
            ),
            Err(Error::HealthFactorTooLow { .. })
        ));
        assert!(matches!(
            execute_withdraw_collateral(&mut pool, borrow.position, Amount::from_units(2000), None, 0),
            Err(Error::CollateralExceeded { .. })
        ));
    }

    #[test]
    fn test_liquidation_reduces_debt_and_collateral_together() {
        let (mut pool, _) = funded_pool();
        let borrow = execute_borrow(
            &mut pool,
            None,
            &"bob".into(),
            Amount::from_units(600),
            &collateral(1000),
            Wad::ONE,
            0,
        )
        .unwrap();

        let (position, outcome) = execute_liquidation(
            &mut pool,
            borrow.position,
            &"carol".into(),
            Amount::from_units(300),
            Wad::from_bps(7000),
            0,
        )
        .unwrap();
        let position = position.unwrap();
        let report = outcome.report();

        assert!(!outcome.is_bad_debt());
        assert_eq!(report.seized_collateral, Amount::from_units(450));
        assert_eq!(position.collateral_amount, Amount::from_units(550));
        assert_eq!(position.debt().unwrap(), Amount::from_units(300));
        assert_eq!(pool.total_borrows, Amount::from_units(300));
    }

    #[test]
    fn test_self_liquidation_rejected() {
        let (mut pool, _) = funded_pool();
        let borrow = execute_borrow(
            &mut pool,
            None,
            &"bob".into(),
            Amount::from_units(600),
            &collateral(1000),
            Wad::ONE,
            0,
        )
        .unwrap();
        assert!(matches!(
            execute_liquidation(
                &mut pool,
                borrow.position,
                &"bob".into(),
                Amount::from_units(300),
                Wad::from_bps(7000),
                0,
            ),
            Err(Error::InvalidParameter { field: "liquidator", .. })
        ));
    }
}
