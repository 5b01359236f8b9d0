//! pool record and its derived figures
//!
//! A pool's supplied assets are split three ways:
//!
//! ```text
//! total_liquidity = total_deposits      (depositor principal)
//!                 + depositor_interest  (interest credited to share holders)
//!                 + total_reserves      (protocol cut of borrower interest)
//! ```
//!
//! `total_borrows` carries principal plus accrued borrower interest and is
//! never allowed to exceed `total_liquidity`.

use serde::{Deserialize, Serialize};

use crate::accrual::{borrow_rate, supply_rate};
use crate::config::PoolParams;
use crate::error::{Error, Result};
use crate::math::mul_div;
use crate::types::{Amount, AssetId, PoolId, Timestamp, Wad};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pool {
    pub id: PoolId,
    /// display name, defaults to the id
    pub name: String,
    pub asset: AssetId,
    /// on-chain address of the pool asset, when it has one
    pub asset_address: Option<String>,
    pub params: PoolParams,

    /// principal deposited and not yet withdrawn
    pub total_deposits: Amount,
    /// interest credited to depositors and not yet withdrawn
    pub depositor_interest: Amount,
    /// protocol share of borrower interest
    pub total_reserves: Amount,
    /// outstanding debt including accrued interest
    pub total_borrows: Amount,
    /// deposit shares in circulation
    pub total_shares: Amount,

    /// cumulative borrow growth since creation, starts at 1.0
    pub borrow_index: Wad,
    pub last_accrual_at: Timestamp,
    pub created_at: Timestamp,

    pub is_active: bool,
    pub is_paused: bool,

    /// row version for optimistic concurrency
    pub version: u64,
}

impl Pool {
    pub fn new(id: PoolId, asset: AssetId, params: PoolParams, now: Timestamp) -> Self {
        Self {
            name: id.to_string(),
            id,
            asset,
            asset_address: None,
            params,
            total_deposits: Amount::ZERO,
            depositor_interest: Amount::ZERO,
            total_reserves: Amount::ZERO,
            total_borrows: Amount::ZERO,
            total_shares: Amount::ZERO,
            borrow_index: Wad::ONE,
            last_accrual_at: now,
            created_at: now,
            is_active: true,
            is_paused: false,
            version: 0,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_asset_address(mut self, address: Option<String>) -> Self {
        self.asset_address = address;
        self
    }

    /// rejects every mutation on a paused pool
    pub fn ensure_open(&self) -> Result<()> {
        if self.is_paused {
            return Err(Error::PoolPaused(self.id.clone()));
        }
        Ok(())
    }

    /// rejects new deposits and borrows on a paused or retired pool. a
    /// retired pool still lets existing positions unwind.
    pub fn ensure_accepting(&self) -> Result<()> {
        self.ensure_open()?;
        if !self.is_active {
            return Err(Error::PoolInactive(self.id.clone()));
        }
        Ok(())
    }

    /// assets owed to share holders
    pub fn depositor_assets(&self) -> Result<Amount> {
        self.total_deposits.checked_add(self.depositor_interest)
    }

    /// all assets supplied to the pool, lent out or not
    pub fn total_liquidity(&self) -> Result<Amount> {
        self.depositor_assets()?.checked_add(self.total_reserves)
    }

    pub fn available_liquidity(&self) -> Result<Amount> {
        Ok(self.total_liquidity()?.saturating_sub(self.total_borrows))
    }

    /// `total_borrows / total_liquidity`, zero for an empty pool
    pub fn utilization(&self) -> Result<Wad> {
        self.total_borrows.ratio(self.total_liquidity()?)
    }

    /// underlying assets per share, 1.0 before the first deposit
    pub fn exchange_rate(&self) -> Result<Wad> {
        if self.total_shares.is_zero() {
            return Ok(Wad::ONE);
        }
        self.depositor_assets()?.ratio(self.total_shares)
    }

    /// shares minted for `amount`, rounded down.
    ///
    /// taken from the share ratio directly, not the floored exchange rate,
    /// so rounding never mints more than `amount` is worth.
    pub fn shares_for(&self, amount: Amount) -> Result<Amount> {
        if self.total_shares.is_zero() {
            return Ok(amount);
        }
        let assets = self.depositor_assets()?;
        if assets.is_zero() {
            return Err(Error::MathOverflow);
        }
        Ok(Amount(mul_div(amount.0, self.total_shares.0, assets.0)?))
    }

    /// underlying redeemed for `shares`, rounded down
    pub fn assets_for(&self, shares: Amount) -> Result<Amount> {
        if shares == self.total_shares {
            return self.depositor_assets();
        }
        shares.mul_wad(self.exchange_rate()?)
    }

    pub fn borrow_apy(&self) -> Result<Wad> {
        borrow_rate(&self.params.rate_model, self.utilization()?)
    }

    pub fn supply_apy(&self) -> Result<Wad> {
        let utilization = self.utilization()?;
        let borrow = borrow_rate(&self.params.rate_model, utilization)?;
        supply_rate(borrow, utilization, self.params.reserve_factor_bps)
    }

    pub fn snapshot(&self) -> Result<PoolSnapshot> {
        Ok(PoolSnapshot {
            id: self.id.clone(),
            name: self.name.clone(),
            asset: self.asset.clone(),
            asset_address: self.asset_address.clone(),
            total_deposits: self.total_deposits,
            total_borrows: self.total_borrows,
            total_reserves: self.total_reserves,
            available_liquidity: self.available_liquidity()?,
            utilization_rate: self.utilization()?,
            borrow_apy: self.borrow_apy()?,
            supply_apy: self.supply_apy()?,
            exchange_rate: self.exchange_rate()?,
            collateral_factor_bps: self.params.collateral_factor_bps,
            liquidation_threshold_bps: self.params.liquidation_threshold_bps,
            liquidation_penalty_bps: self.params.liquidation_penalty_bps,
            reserve_factor_bps: self.params.reserve_factor_bps,
            is_active: self.is_active,
            is_paused: self.is_paused,
            last_accrual_at: self.last_accrual_at,
        })
    }
}

/// read model of a pool, as listed to API consumers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSnapshot {
    pub id: PoolId,
    pub name: String,
    pub asset: AssetId,
    pub asset_address: Option<String>,
    pub total_deposits: Amount,
    pub total_borrows: Amount,
    pub total_reserves: Amount,
    pub available_liquidity: Amount,
    pub utilization_rate: Wad,
    pub borrow_apy: Wad,
    pub supply_apy: Wad,
    pub exchange_rate: Wad,
    pub collateral_factor_bps: u32,
    pub liquidation_threshold_bps: u32,
    pub liquidation_penalty_bps: u32,
    pub reserve_factor_bps: u32,
    pub is_active: bool,
    pub is_paused: bool,
    pub last_accrual_at: Timestamp,
}
