//! in-memory ledger store

use parking_lot::RwLock;
use std::collections::BTreeMap;

use super::{Changeset, LedgerStore};
use crate::error::{Error, Result};
use crate::pool::Pool;
use crate::position::{BorrowPosition, DepositPosition};
use crate::types::{AccountId, PoolId};

type PositionKey = (PoolId, AccountId);

#[derive(Debug, Default)]
struct Tables {
    pools: BTreeMap<PoolId, Pool>,
    deposits: BTreeMap<PositionKey, DepositPosition>,
    borrows: BTreeMap<PositionKey, BorrowPosition>,
}

/// ledger held behind one lock; commits are serialized
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LedgerStore for MemoryStore {
    fn load_pool(&self, id: &PoolId) -> Result<Option<Pool>> {
        Ok(self.tables.read().pools.get(id).cloned())
    }

    fn list_pools(&self) -> Result<Vec<Pool>> {
        Ok(self.tables.read().pools.values().cloned().collect())
    }

    fn insert_pool(&self, pool: Pool) -> Result<()> {
        let mut tables = self.tables.write();
        if tables.pools.contains_key(&pool.id) {
            return Err(Error::PoolExists(pool.id));
        }
        tables.pools.insert(pool.id.clone(), pool);
        Ok(())
    }

    fn load_deposit(&self, pool: &PoolId, depositor: &AccountId) -> Result<Option<DepositPosition>> {
        let key = (pool.clone(), depositor.clone());
        Ok(self.tables.read().deposits.get(&key).cloned())
    }

    fn load_borrow(&self, pool: &PoolId, borrower: &AccountId) -> Result<Option<BorrowPosition>> {
        let key = (pool.clone(), borrower.clone());
        Ok(self.tables.read().borrows.get(&key).cloned())
    }

    fn list_deposits(&self, pool: &PoolId) -> Result<Vec<DepositPosition>> {
        Ok(self
            .tables
            .read()
            .deposits
            .iter()
            .filter(|((p, _), _)| p == pool)
            .map(|(_, position)| position.clone())
            .collect())
    }

    fn list_borrows(&self, pool: &PoolId) -> Result<Vec<BorrowPosition>> {
        Ok(self
            .tables
            .read()
            .borrows
            .iter()
            .filter(|((p, _), _)| p == pool)
            .map(|(_, position)| position.clone())
            .collect())
    }

    fn commit(&self, changeset: Changeset) -> Result<Pool> {
        let mut tables = self.tables.write();
        let Changeset {
            mut pool,
            deposits,
            borrows,
        } = changeset;

        let stored = tables
            .pools
            .get(&pool.id)
            .ok_or_else(|| Error::PoolNotFound(pool.id.clone()))?;
        if stored.version != pool.version {
            return Err(Error::Conflict {
                pool: pool.id.clone(),
                expected: pool.version,
                found: stored.version,
            });
        }

        for (depositor, position) in &deposits {
            if let Some(position) = position {
                check_row(&pool.id, depositor, &position.pool, &position.depositor)?;
            }
        }
        for (borrower, position) in &borrows {
            if let Some(position) = position {
                check_row(&pool.id, borrower, &position.pool, &position.borrower)?;
            }
        }

        pool.version += 1;
        for (depositor, position) in deposits {
            let key = (pool.id.clone(), depositor);
            match position {
                Some(position) => tables.deposits.insert(key, position),
                None => tables.deposits.remove(&key),
            };
        }
        for (borrower, position) in borrows {
            let key = (pool.id.clone(), borrower);
            match position {
                Some(position) => tables.borrows.insert(key, position),
                None => tables.borrows.remove(&key),
            };
        }
        tables.pools.insert(pool.id.clone(), pool.clone());
        Ok(pool)
    }
}

/// a position row must sit under its own pool and holder key
fn check_row(pool: &PoolId, key: &AccountId, row_pool: &PoolId, row_holder: &AccountId) -> Result<()> {
    if row_pool != pool || row_holder != key {
        return Err(Error::Storage(format!(
            "position {row_pool}/{row_holder} written under {pool}/{key}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolParams;
    use crate::types::Amount;

    fn pool() -> Pool {
        Pool::new("p".into(), "USDC".into(), PoolParams::default(), 0)
    }

    #[test]
    fn test_insert_twice_fails() {
        let store = MemoryStore::new();
        store.insert_pool(pool()).unwrap();
        assert_eq!(store.insert_pool(pool()), Err(Error::PoolExists("p".into())));
    }

    #[test]
    fn test_commit_bumps_version_and_writes_positions() {
        let store = MemoryStore::new();
        store.insert_pool(pool()).unwrap();

        let mut updated = store.load_pool(&"p".into()).unwrap().unwrap();
        updated.total_deposits = Amount::from_units(10);
        let mut position = DepositPosition::new("p".into(), "alice".into(), 0);
        position.shares = Amount::from_units(10);

        let committed = store
            .commit(Changeset::new(updated).with_deposit("alice".into(), Some(position.clone())))
            .unwrap();
        assert_eq!(committed.version, 1);
        assert_eq!(
            store.load_deposit(&"p".into(), &"alice".into()).unwrap(),
            Some(position)
        );
        assert_eq!(store.list_deposits(&"p".into()).unwrap().len(), 1);

        store
            .commit(Changeset::new(committed).with_deposit("alice".into(), None))
            .unwrap();
        assert!(store.load_deposit(&"p".into(), &"alice".into()).unwrap().is_none());
    }

    #[test]
    fn test_misfiled_position_rejected() {
        let store = MemoryStore::new();
        store.insert_pool(pool()).unwrap();
        let current = store.load_pool(&"p".into()).unwrap().unwrap();

        let position = DepositPosition::new("other".into(), "alice".into(), 0);
        let result = store.commit(
            Changeset::new(current.clone()).with_deposit("alice".into(), Some(position)),
        );
        assert!(matches!(result, Err(Error::Storage(_))));

        let position = DepositPosition::new("p".into(), "bob".into(), 0);
        let result =
            store.commit(Changeset::new(current).with_deposit("alice".into(), Some(position)));
        assert!(matches!(result, Err(Error::Storage(_))));

        // nothing landed
        assert_eq!(store.load_pool(&"p".into()).unwrap().unwrap().version, 0);
        assert!(store.list_deposits(&"p".into()).unwrap().is_empty());
    }

    #[test]
    fn test_stale_version_conflicts() {
        let store = MemoryStore::new();
        store.insert_pool(pool()).unwrap();

        let stale = store.load_pool(&"p".into()).unwrap().unwrap();
        store.commit(Changeset::new(stale.clone())).unwrap();

        let mut write = stale;
        write.total_deposits = Amount::from_units(1);
        assert_eq!(
            store.commit(Changeset::new(write)),
            Err(Error::Conflict {
                pool: "p".into(),
                expected: 0,
                found: 1,
            })
        );
        assert_eq!(
            store.load_pool(&"p".into()).unwrap().unwrap().total_deposits,
            Amount::ZERO
        );
    }
}
