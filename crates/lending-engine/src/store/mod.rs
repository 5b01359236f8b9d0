//! ledger persistence
//!
//! the engine reads pools and positions through [`LedgerStore`] and writes
//! every mutation back as a single [`Changeset`], so a pool and the
//! positions an operation touched land together or not at all.
//!
//! ```text
//! Changeset
//! ├── pool: updated pool row (version checked on commit)
//! ├── deposits: (depositor, Some(position) | None = delete)
//! └── borrows:  (borrower,  Some(position) | None = delete)
//! ```

mod memory;

pub use memory::MemoryStore;

use crate::error::Result;
use crate::pool::Pool;
use crate::position::{BorrowPosition, DepositPosition};
use crate::types::{AccountId, PoolId};

/// writes produced by one operation
#[derive(Debug, Clone)]
pub struct Changeset {
    pub pool: Pool,
    pub deposits: Vec<(AccountId, Option<DepositPosition>)>,
    pub borrows: Vec<(AccountId, Option<BorrowPosition>)>,
}

impl Changeset {
    pub fn new(pool: Pool) -> Self {
        Self {
            pool,
            deposits: Vec::new(),
            borrows: Vec::new(),
        }
    }

    pub fn with_deposit(mut self, depositor: AccountId, position: Option<DepositPosition>) -> Self {
        self.deposits.push((depositor, position));
        self
    }

    pub fn with_borrow(mut self, borrower: AccountId, position: Option<BorrowPosition>) -> Self {
        self.borrows.push((borrower, position));
        self
    }
}

/// storage backend trait
pub trait LedgerStore: Send + Sync {
    fn load_pool(&self, id: &PoolId) -> Result<Option<Pool>>;

    fn list_pools(&self) -> Result<Vec<Pool>>;

    /// fails with `PoolExists` if the id is taken
    fn insert_pool(&self, pool: Pool) -> Result<()>;

    fn load_deposit(&self, pool: &PoolId, depositor: &AccountId) -> Result<Option<DepositPosition>>;

    fn load_borrow(&self, pool: &PoolId, borrower: &AccountId) -> Result<Option<BorrowPosition>>;

    fn list_deposits(&self, pool: &PoolId) -> Result<Vec<DepositPosition>>;

    fn list_borrows(&self, pool: &PoolId) -> Result<Vec<BorrowPosition>>;

    /// applies a changeset atomically.
    ///
    /// the stored pool must still be at `changeset.pool.version`, otherwise
    /// nothing is written and `Conflict` is returned. returns the pool as
    /// stored, with its version bumped.
    fn commit(&self, changeset: Changeset) -> Result<Pool>;
}

impl<T: LedgerStore + ?Sized> LedgerStore for std::sync::Arc<T> {
    fn load_pool(&self, id: &PoolId) -> Result<Option<Pool>> {
        (**self).load_pool(id)
    }

    fn list_pools(&self) -> Result<Vec<Pool>> {
        (**self).list_pools()
    }

    fn insert_pool(&self, pool: Pool) -> Result<()> {
        (**self).insert_pool(pool)
    }

    fn load_deposit(&self, pool: &PoolId, depositor: &AccountId) -> Result<Option<DepositPosition>> {
        (**self).load_deposit(pool, depositor)
    }

    fn load_borrow(&self, pool: &PoolId, borrower: &AccountId) -> Result<Option<BorrowPosition>> {
        (**self).load_borrow(pool, borrower)
    }

    fn list_deposits(&self, pool: &PoolId) -> Result<Vec<DepositPosition>> {
        (**self).list_deposits(pool)
    }

    fn list_borrows(&self, pool: &PoolId) -> Result<Vec<BorrowPosition>> {
        (**self).list_borrows(pool)
    }

    fn commit(&self, changeset: Changeset) -> Result<Pool> {
        (**self).commit(changeset)
    }
}
