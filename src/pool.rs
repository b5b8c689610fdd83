use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::chain::Address;

pub(crate) fn log_target() -> String {
    "registry:pool".to_owned()
}

/// Maps a sortition pool member ID to the operator registered under it.
pub trait MembershipResolver {
    fn resolve_operator(&self, member_id: u32) -> Option<Address>;
}

/// Lockable membership pool. Only the recorded owner may lock or unlock it.
pub trait SortitionPool: MembershipResolver {
    fn owner(&self) -> Address;
    fn is_locked(&self) -> bool;
    fn lock(&mut self, caller: Address) -> Result<(), PoolError>;
    fn unlock(&mut self, caller: Address) -> Result<(), PoolError>;
}

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PoolError {
    #[error("caller {caller} is not the pool owner {owner}")]
    NotOwner { caller: Address, owner: Address },
    #[error("pool is already locked")]
    AlreadyLocked,
    #[error("pool is not locked")]
    NotLocked,
}

/// In-process pool: operators are registered under increasing member IDs
/// starting at 1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalSortitionPool {
    owner: Address,
    locked: bool,
    operators: BTreeMap<u32, Address>,
}

impl LocalSortitionPool {
    pub fn new(owner: Address) -> Self {
        Self {
            owner,
            locked: false,
            operators: BTreeMap::new(),
        }
    }

    /// Register an operator, returning its member ID. An operator that is
    /// already in the pool keeps its ID.
    pub fn insert_operator(&mut self, operator: Address) -> u32 {
        if let Some((&id, _)) = self.operators.iter().find(|(_, &op)| op == operator) {
            return id;
        }
        let id = self.operators.keys().next_back().map_or(1, |last| last + 1);
        self.operators.insert(id, operator);
        log::trace!(target: &log_target(), "operator {} joined as member {}", operator, id);
        id
    }

    pub fn member_ids(&self) -> Vec<u32> {
        self.operators.keys().copied().collect()
    }

    pub fn operators(&self) -> impl Iterator<Item = (u32, Address)> + '_ {
        self.operators.iter().map(|(&id, &op)| (id, op))
    }

    pub fn transfer_ownership(&mut self, caller: Address, new_owner: Address) -> Result<(), PoolError> {
        self.check_owner(caller)?;
        log::info!(target: &log_target(), "pool ownership {} => {}", self.owner, new_owner);
        self.owner = new_owner;
        Ok(())
    }

    fn check_owner(&self, caller: Address) -> Result<(), PoolError> {
        if caller != self.owner {
            return Err(PoolError::NotOwner {
                caller,
                owner: self.owner,
            });
        }
        Ok(())
    }
}

impl MembershipResolver for LocalSortitionPool {
    fn resolve_operator(&self, member_id: u32) -> Option<Address> {
        self.operators.get(&member_id).copied()
    }
}

impl SortitionPool for LocalSortitionPool {
    fn owner(&self) -> Address {
        self.owner
    }

    fn is_locked(&self) -> bool {
        self.locked
    }

    fn lock(&mut self, caller: Address) -> Result<(), PoolError> {
        self.check_owner(caller)?;
        if self.locked {
            return Err(PoolError::AlreadyLocked);
        }
        self.locked = true;
        log::debug!(target: &log_target(), "pool locked");
        Ok(())
    }

    fn unlock(&mut self, caller: Address) -> Result<(), PoolError> {
        self.check_owner(caller)?;
        if !self.locked {
            return Err(PoolError::NotLocked);
        }
        self.locked = false;
        log::debug!(target: &log_target(), "pool unlocked");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn member_ids_are_sequential() {
        let mut pool = LocalSortitionPool::new(Address::from_low_u64(1));
        let a = pool.insert_operator(Address::from_low_u64(10));
        let b = pool.insert_operator(Address::from_low_u64(11));
        assert_eq!((a, b), (1, 2));
        assert_eq!(pool.insert_operator(Address::from_low_u64(10)), 1);
        assert_eq!(pool.resolve_operator(2), Some(Address::from_low_u64(11)));
        assert_eq!(pool.resolve_operator(3), None);
        assert_eq!(pool.member_ids(), vec![1, 2]);
    }

    #[test]
    fn only_owner_locks_and_unlocks() {
        let owner = Address::from_low_u64(1);
        let stranger = Address::from_low_u64(2);
        let mut pool = LocalSortitionPool::new(owner);

        assert_eq!(
            pool.lock(stranger),
            Err(PoolError::NotOwner {
                caller: stranger,
                owner
            })
        );
        pool.lock(owner).unwrap();
        assert!(pool.is_locked());
        assert_eq!(pool.lock(owner), Err(PoolError::AlreadyLocked));

        pool.transfer_ownership(owner, stranger).unwrap();
        assert!(matches!(pool.unlock(owner), Err(PoolError::NotOwner { .. })));
        pool.unlock(stranger).unwrap();
        assert_eq!(pool.unlock(stranger), Err(PoolError::NotLocked));
    }
}
