//! deposit and borrow position records

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::health::HealthFactor;
use crate::types::{AccountId, Amount, AssetId, PoolId, Timestamp, Wad};

/// A depositor's claim on a pool, held as shares
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositPosition {
    pub pool: PoolId,
    pub depositor: AccountId,
    /// underlying deposited, net of the principal share of withdrawals
    pub principal: Amount,
    pub shares: Amount,
    /// value of the shares above principal as of `last_accrual_at`
    pub accrued_interest: Amount,
    pub deposited_at: Timestamp,
    pub last_accrual_at: Timestamp,
}

impl DepositPosition {
    pub fn new(pool: PoolId, depositor: AccountId, now: Timestamp) -> Self {
        Self {
            pool,
            depositor,
            principal: Amount::ZERO,
            shares: Amount::ZERO,
            accrued_interest: Amount::ZERO,
            deposited_at: now,
            last_accrual_at: now,
        }
    }
}

/// A borrower's debt and the collateral backing it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BorrowPosition {
    pub pool: PoolId,
    pub borrower: AccountId,
    pub principal: Amount,
    pub accrued_interest: Amount,
    pub collateral_amount: Amount,
    pub collateral_asset: AssetId,
    /// pool borrow index at the last accrual of this position
    pub borrow_index: Wad,
    /// as of the last operation that priced the collateral
    pub health_factor: HealthFactor,
    pub borrowed_at: Timestamp,
    pub last_accrual_at: Timestamp,
}

impl BorrowPosition {
    pub fn new(
        pool: PoolId,
        borrower: AccountId,
        collateral_asset: AssetId,
        borrow_index: Wad,
        now: Timestamp,
    ) -> Self {
        Self {
            pool,
            borrower,
            principal: Amount::ZERO,
            accrued_interest: Amount::ZERO,
            collateral_amount: Amount::ZERO,
            collateral_asset,
            borrow_index,
            health_factor: HealthFactor::INFINITE,
            borrowed_at: now,
            last_accrual_at: now,
        }
    }

    /// principal plus accrued interest
    pub fn debt(&self) -> Result<Amount> {
        self.principal.checked_add(self.accrued_interest)
    }

    /// applies a payment to accrued interest first, then principal.
    /// returns `(interest_paid, principal_paid)`; `amount` must not exceed debt.
    pub(crate) fn apply_payment(&mut self, amount: Amount) -> Result<(Amount, Amount)> {
        let interest_paid = amount.min(self.accrued_interest);
        let principal_paid = amount.checked_sub(interest_paid)?;
        self.principal = self.principal.checked_sub(principal_paid)?;
        self.accrued_interest = self.accrued_interest.checked_sub(interest_paid)?;
        Ok((interest_paid, principal_paid))
    }

    pub fn is_closed(&self) -> bool {
        self.principal.is_zero() && self.accrued_interest.is_zero() && self.collateral_amount.is_zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payment_hits_interest_first() {
        let mut position = BorrowPosition::new("p".into(), "bob".into(), "PROP".into(), Wad::ONE, 0);
        position.principal = Amount::from_units(100);
        position.accrued_interest = Amount::from_units(5);

        let (interest, principal) = position.apply_payment(Amount::from_units(3)).unwrap();
        assert_eq!(interest, Amount::from_units(3));
        assert_eq!(principal, Amount::ZERO);

        let (interest, principal) = position.apply_payment(Amount::from_units(52)).unwrap();
        assert_eq!(interest, Amount::from_units(2));
        assert_eq!(principal, Amount::from_units(50));
        assert_eq!(position.debt().unwrap(), Amount::from_units(50));
    }

    #[test]
    fn test_overpayment_is_an_error() {
        let mut position = BorrowPosition::new("p".into(), "bob".into(), "PROP".into(), Wad::ONE, 0);
        position.principal = Amount::from_units(1);
        assert!(position.apply_payment(Amount::from_units(2)).is_err());
    }
}
