//! lending engine
//!
//! ties the ledger, the store and the price oracle together. every
//! pool-mutating call runs under that pool's lock:
//!
//! ```text
//! validate input -> lock pool -> load -> ensure open -> price (if needed)
//!               -> execute on working copies -> commit changeset -> unlock
//! ```
//!
//! calls on different pools take different locks and never block each
//! other. the store's version check catches writers that bypass the engine.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::accrual::{accrue_borrow_position, accrue_deposit_position, accrue_pool};
use crate::config::{EngineConfig, OracleConfig, PoolParams};
use crate::error::{Error, Result};
use crate::health::{evaluate, HealthFactor};
use crate::ledger::{
    self, BorrowOutcome, CollateralOutcome, DepositOutcome, RepayOutcome, WithdrawOutcome,
};
use crate::liquidation::{self, LiquidationCandidate, LiquidationOutcome};
use crate::oracle::{fetch_price, PriceOracle};
use crate::pool::{Pool, PoolSnapshot};
use crate::position::{BorrowPosition, DepositPosition};
use crate::store::{Changeset, LedgerStore};
use crate::types::{AccountId, Amount, AssetId, Collateral, PoolId, Timestamp, Wad};

pub struct LendingEngine<S, O> {
    store: S,
    oracle: O,
    oracle_config: OracleConfig,
    locks: Mutex<HashMap<PoolId, Arc<Mutex<()>>>>,
}

impl<S: LedgerStore, O: PriceOracle> LendingEngine<S, O> {
    pub fn new(store: S, oracle: O, oracle_config: OracleConfig) -> Self {
        Self {
            store,
            oracle,
            oracle_config,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// builds an engine and creates every configured pool not already stored
    pub fn from_config(store: S, oracle: O, config: &EngineConfig, now: Timestamp) -> Result<Self> {
        config.validate()?;
        let engine = Self::new(store, oracle, config.oracle.clone());
        for pool in &config.pools {
            if engine.store.load_pool(&pool.id)?.is_some() {
                debug!(pool = %pool.id, "pool already stored, keeping it");
                continue;
            }
            let mut record = Pool::new(pool.id.clone(), pool.asset.clone(), pool.params.clone(), now)
                .with_asset_address(pool.asset_address.clone());
            if let Some(name) = &pool.name {
                record = record.with_name(name.clone());
            }
            engine.register_pool(record)?;
        }
        Ok(engine)
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    pub fn oracle_config(&self) -> &OracleConfig {
        &self.oracle_config
    }

    /// lock for an existing pool. entries are only made for stored pools,
    /// and pools are never deleted, so the map is bounded by the pool count.
    fn pool_lock(&self, id: &PoolId) -> Result<Arc<Mutex<()>>> {
        if let Some(lock) = self.locks.lock().get(id) {
            return Ok(lock.clone());
        }
        if self.store.load_pool(id)?.is_none() {
            return Err(Error::PoolNotFound(id.clone()));
        }
        Ok(self.locks.lock().entry(id.clone()).or_default().clone())
    }

    fn load_pool(&self, id: &PoolId) -> Result<Pool> {
        self.store
            .load_pool(id)?
            .ok_or_else(|| Error::PoolNotFound(id.clone()))
    }

    fn load_open_pool(&self, id: &PoolId) -> Result<Pool> {
        let pool = self.load_pool(id)?;
        pool.ensure_open()?;
        Ok(pool)
    }

    fn load_accepting_pool(&self, id: &PoolId) -> Result<Pool> {
        let pool = self.load_pool(id)?;
        pool.ensure_accepting()?;
        Ok(pool)
    }

    fn load_deposit(&self, pool: &PoolId, depositor: &AccountId) -> Result<DepositPosition> {
        self.store
            .load_deposit(pool, depositor)?
            .ok_or_else(|| Error::PositionNotFound {
                pool: pool.clone(),
                holder: depositor.clone(),
            })
    }

    fn load_borrow(&self, pool: &PoolId, borrower: &AccountId) -> Result<BorrowPosition> {
        self.store
            .load_borrow(pool, borrower)?
            .ok_or_else(|| Error::PositionNotFound {
                pool: pool.clone(),
                holder: borrower.clone(),
            })
    }

    fn price(&self, asset: &AssetId, now: Timestamp) -> Result<Wad> {
        fetch_price(&self.oracle, asset, now, &self.oracle_config)
    }

    // === administration ===

    pub fn create_pool(
        &self,
        id: PoolId,
        asset: AssetId,
        params: PoolParams,
        now: Timestamp,
    ) -> Result<PoolSnapshot> {
        self.register_pool(Pool::new(id, asset, params, now))
    }

    fn register_pool(&self, pool: Pool) -> Result<PoolSnapshot> {
        pool.params.validate()?;
        let snapshot = pool.snapshot()?;
        self.store.insert_pool(pool)?;
        info!(pool = %snapshot.id, name = %snapshot.name, asset = %snapshot.asset, "pool created");
        Ok(snapshot)
    }

    /// pausing blocks every mutation on the pool, liquidations included
    pub fn set_paused(&self, id: &PoolId, paused: bool, now: Timestamp) -> Result<PoolSnapshot> {
        let lock = self.pool_lock(id)?;
        let _guard = lock.lock();

        let mut pool = self.load_pool(id)?;
        accrue_pool(&mut pool, now)?;
        pool.is_paused = paused;
        let pool = self.store.commit(Changeset::new(pool))?;
        info!(pool = %id, paused, "pool pause state changed");
        pool.snapshot()
    }

    /// retiring a pool stops new deposits and borrows. withdrawals,
    /// repayments, collateral moves and liquidations still go through.
    pub fn set_active(&self, id: &PoolId, active: bool, now: Timestamp) -> Result<PoolSnapshot> {
        let lock = self.pool_lock(id)?;
        let _guard = lock.lock();

        let mut pool = self.load_pool(id)?;
        accrue_pool(&mut pool, now)?;
        pool.is_active = active;
        let pool = self.store.commit(Changeset::new(pool))?;
        info!(pool = %id, active, "pool activity changed");
        pool.snapshot()
    }

    // === queries ===

    pub fn get_pool(&self, id: &PoolId) -> Result<Pool> {
        self.load_pool(id)
    }

    pub fn list_pools(&self) -> Result<Vec<PoolSnapshot>> {
        self.store.list_pools()?.iter().map(Pool::snapshot).collect()
    }

    /// pool figures accrued to `now`, without persisting the accrual
    pub fn snapshot(&self, id: &PoolId, now: Timestamp) -> Result<PoolSnapshot> {
        let mut pool = self.load_pool(id)?;
        accrue_pool(&mut pool, now)?;
        pool.snapshot()
    }

    pub fn deposit_position(
        &self,
        pool_id: &PoolId,
        depositor: &AccountId,
        now: Timestamp,
    ) -> Result<DepositPosition> {
        let mut pool = self.load_pool(pool_id)?;
        let mut position = self.load_deposit(pool_id, depositor)?;
        accrue_pool(&mut pool, now)?;
        accrue_deposit_position(&mut position, &pool, now)?;
        Ok(position)
    }

    pub fn borrow_position(
        &self,
        pool_id: &PoolId,
        borrower: &AccountId,
        now: Timestamp,
    ) -> Result<BorrowPosition> {
        let mut pool = self.load_pool(pool_id)?;
        let mut position = self.load_borrow(pool_id, borrower)?;
        accrue_pool(&mut pool, now)?;
        accrue_borrow_position(&mut position, &pool, now)?;
        Ok(position)
    }

    /// current health factor of a borrow position at a fresh oracle price
    pub fn health_factor(
        &self,
        pool_id: &PoolId,
        borrower: &AccountId,
        now: Timestamp,
    ) -> Result<HealthFactor> {
        let pool = self.load_pool(pool_id)?;
        let position = self.borrow_position(pool_id, borrower, now)?;
        let price = self.price(&position.collateral_asset, now)?;
        evaluate(&position, price, pool.params.liquidation_threshold_bps)
    }

    /// liquidatable positions in a pool, least healthy first.
    ///
    /// a price that cannot be validated for some collateral asset fails the
    /// whole scan rather than hiding positions.
    pub fn list_liquidatable(
        &self,
        pool_id: &PoolId,
        now: Timestamp,
    ) -> Result<Vec<LiquidationCandidate>> {
        let mut pool = self.load_pool(pool_id)?;
        accrue_pool(&mut pool, now)?;

        let mut prices: HashMap<AssetId, Wad> = HashMap::new();
        let mut found = Vec::new();
        for mut position in self.store.list_borrows(pool_id)? {
            accrue_borrow_position(&mut position, &pool, now)?;
            if position.debt()?.is_zero() {
                continue;
            }
            let price = match prices.get(&position.collateral_asset) {
                Some(price) => *price,
                None => {
                    let price = self.price(&position.collateral_asset, now)?;
                    prices.insert(position.collateral_asset.clone(), price);
                    price
                }
            };
            if let Some(candidate) = liquidation::candidate(&position, price, &pool.params)? {
                found.push(candidate);
            }
        }
        found.sort_by(|a, b| a.health_factor.cmp(&b.health_factor));

        if !found.is_empty() {
            info!(pool = %pool_id, count = found.len(), "liquidatable positions found");
        }
        Ok(found)
    }

    /// positions whose collateral is gone while debt remains, for
    /// coverage from reserves or an insurance fund. needs no price.
    pub fn list_bad_debt(&self, pool_id: &PoolId, now: Timestamp) -> Result<Vec<BorrowPosition>> {
        let mut pool = self.load_pool(pool_id)?;
        accrue_pool(&mut pool, now)?;

        let mut found = Vec::new();
        for mut position in self.store.list_borrows(pool_id)? {
            accrue_borrow_position(&mut position, &pool, now)?;
            if liquidation::is_bad_debt(&position)? {
                found.push(position);
            }
        }
        Ok(found)
    }

    // === ledger mutations ===

    pub fn deposit(
        &self,
        pool_id: &PoolId,
        depositor: &AccountId,
        amount: Amount,
        now: Timestamp,
    ) -> Result<DepositOutcome> {
        if amount.is_zero() {
            return Err(Error::InvalidAmount { field: "amount" });
        }
        let lock = self.pool_lock(pool_id)?;
        let _guard = lock.lock();

        let mut pool = self.load_accepting_pool(pool_id)?;
        let existing = self.store.load_deposit(pool_id, depositor)?;
        let outcome = ledger::execute_deposit(&mut pool, existing, depositor, amount, now)?;

        self.store.commit(
            Changeset::new(pool).with_deposit(depositor.clone(), Some(outcome.position.clone())),
        )?;
        info!(
            pool = %pool_id,
            depositor = %depositor,
            amount = %amount,
            shares = %outcome.shares_minted,
            "deposit"
        );
        Ok(outcome)
    }

    pub fn withdraw(
        &self,
        pool_id: &PoolId,
        depositor: &AccountId,
        shares: Amount,
        now: Timestamp,
    ) -> Result<WithdrawOutcome> {
        if shares.is_zero() {
            return Err(Error::InvalidAmount { field: "shares" });
        }
        let lock = self.pool_lock(pool_id)?;
        let _guard = lock.lock();

        let mut pool = self.load_open_pool(pool_id)?;
        let position = self.load_deposit(pool_id, depositor)?;
        let outcome = ledger::execute_withdraw(&mut pool, position, shares, now)?;

        self.store.commit(
            Changeset::new(pool).with_deposit(depositor.clone(), outcome.position.clone()),
        )?;
        info!(
            pool = %pool_id,
            depositor = %depositor,
            amount = %outcome.amount,
            shares = %shares,
            "withdraw"
        );
        Ok(outcome)
    }

    pub fn borrow(
        &self,
        pool_id: &PoolId,
        borrower: &AccountId,
        collateral: Collateral,
        amount: Amount,
        now: Timestamp,
    ) -> Result<BorrowOutcome> {
        if amount.is_zero() {
            return Err(Error::InvalidAmount { field: "amount" });
        }
        let lock = self.pool_lock(pool_id)?;
        let _guard = lock.lock();

        let mut pool = self.load_accepting_pool(pool_id)?;
        let existing = self.store.load_borrow(pool_id, borrower)?;
        ledger::check_borrow_collateral(&pool, existing.as_ref(), &collateral)?;
        let price = self.price(&collateral.asset, now)?;
        let outcome =
            ledger::execute_borrow(&mut pool, existing, borrower, amount, &collateral, price, now)?;

        self.store.commit(
            Changeset::new(pool).with_borrow(borrower.clone(), Some(outcome.position.clone())),
        )?;
        info!(
            pool = %pool_id,
            borrower = %borrower,
            amount = %amount,
            collateral = %collateral.amount,
            health_factor = %outcome.health_factor,
            "borrow"
        );
        Ok(outcome)
    }

    pub fn repay(
        &self,
        pool_id: &PoolId,
        borrower: &AccountId,
        amount: Amount,
        now: Timestamp,
    ) -> Result<RepayOutcome> {
        if amount.is_zero() {
            return Err(Error::InvalidAmount { field: "amount" });
        }
        let lock = self.pool_lock(pool_id)?;
        let _guard = lock.lock();

        let mut pool = self.load_open_pool(pool_id)?;
        let position = self.load_borrow(pool_id, borrower)?;
        let outcome = ledger::execute_repay(&mut pool, position, amount, now)?;

        self.store.commit(
            Changeset::new(pool).with_borrow(borrower.clone(), outcome.position.clone()),
        )?;
        info!(
            pool = %pool_id,
            borrower = %borrower,
            interest = %outcome.interest_repaid,
            principal = %outcome.principal_repaid,
            refunded = %outcome.refunded,
            "repay"
        );
        Ok(outcome)
    }

    pub fn add_collateral(
        &self,
        pool_id: &PoolId,
        borrower: &AccountId,
        collateral: Collateral,
        now: Timestamp,
    ) -> Result<BorrowPosition> {
        if collateral.amount.is_zero() {
            return Err(Error::InvalidAmount { field: "collateral_amount" });
        }
        let lock = self.pool_lock(pool_id)?;
        let _guard = lock.lock();

        let mut pool = self.load_open_pool(pool_id)?;
        let position = self.load_borrow(pool_id, borrower)?;
        let position = ledger::execute_add_collateral(&mut pool, position, &collateral, now)?;

        self.store
            .commit(Changeset::new(pool).with_borrow(borrower.clone(), Some(position.clone())))?;
        info!(pool = %pool_id, borrower = %borrower, amount = %collateral.amount, "collateral added");
        Ok(position)
    }

    pub fn withdraw_collateral(
        &self,
        pool_id: &PoolId,
        borrower: &AccountId,
        amount: Amount,
        now: Timestamp,
    ) -> Result<CollateralOutcome> {
        if amount.is_zero() {
            return Err(Error::InvalidAmount { field: "collateral_amount" });
        }
        let lock = self.pool_lock(pool_id)?;
        let _guard = lock.lock();

        let mut pool = self.load_open_pool(pool_id)?;
        let position = self.load_borrow(pool_id, borrower)?;
        let price = if position.debt()?.is_zero() {
            None
        } else {
            Some(self.price(&position.collateral_asset, now)?)
        };
        let outcome = ledger::execute_withdraw_collateral(&mut pool, position, amount, price, now)?;

        self.store.commit(
            Changeset::new(pool).with_borrow(borrower.clone(), outcome.position.clone()),
        )?;
        info!(
            pool = %pool_id,
            borrower = %borrower,
            amount = %amount,
            health_factor = %outcome.health_factor,
            "collateral withdrawn"
        );
        Ok(outcome)
    }

    /// repays up to `repay_amount` of an unhealthy position's debt on
    /// behalf of `liquidator` and seizes collateral at the penalty discount
    pub fn liquidate(
        &self,
        pool_id: &PoolId,
        borrower: &AccountId,
        liquidator: &AccountId,
        repay_amount: Amount,
        now: Timestamp,
    ) -> Result<LiquidationOutcome> {
        if repay_amount.is_zero() {
            return Err(Error::InvalidAmount { field: "repay_amount" });
        }
        let lock = self.pool_lock(pool_id)?;
        let _guard = lock.lock();

        let mut pool = self.load_open_pool(pool_id)?;
        let position = self.load_borrow(pool_id, borrower)?;
        let price = self.price(&position.collateral_asset, now)?;
        let (position, outcome) =
            ledger::execute_liquidation(&mut pool, position, liquidator, repay_amount, price, now)?;

        self.store
            .commit(Changeset::new(pool).with_borrow(borrower.clone(), position))?;

        let report = outcome.report();
        if outcome.is_bad_debt() {
            warn!(
                pool = %pool_id,
                borrower = %borrower,
                liquidator = %liquidator,
                remaining_debt = %report.remaining_debt,
                "liquidation exhausted collateral, bad debt remains"
            );
        } else {
            info!(
                pool = %pool_id,
                borrower = %borrower,
                liquidator = %liquidator,
                repaid = %report.repaid,
                seized = %report.seized_collateral,
                health_factor = %report.health_factor_after,
                "liquidation"
            );
        }
        Ok(outcome)
    }
}
