// tally/core/ledger/src/balances.rs

// Per-account unlocked/locked balances, lock sessions, fee pool and total supply
use primitive_types::U256;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tally_primitives::{Address, Hash};

use crate::error::{LedgerError, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountBalance {
    pub unlocked: U256,
    pub locked: U256,
}

impl AccountBalance {
    pub fn total(&self) -> U256 {
        self.unlocked.saturating_add(self.locked)
    }

    fn is_empty(&self) -> bool {
        self.unlocked.is_zero() && self.locked.is_zero()
    }
}

/// Identifier of an escrow session (a match, a round, ...)
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct SessionId(pub Hash);

impl SessionId {
    /// Session used by callers that lock without naming one
    pub const DEFAULT: SessionId = SessionId(Hash([0u8; 32]));

    pub fn new(bytes: [u8; 32]) -> Self {
        SessionId(Hash(bytes))
    }

    pub fn from_u64(id: u64) -> Self {
        let mut bytes = [0u8; 32];
        bytes[24..].copy_from_slice(&id.to_be_bytes());
        SessionId(Hash(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session:{}", self.0)
    }
}

/// Where released locked units go
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
    /// Back to the account's unlocked balance
    CreditBack,
    /// Destroyed, reducing total supply
    Burn,
}

/// Source of truth for conservation.
///
/// `total_supply == Σ(unlocked + locked) + collected_fees` and
/// `locked(account) == Σ sessions(account)` hold after every operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceStore {
    accounts: BTreeMap<Address, AccountBalance>,
    sessions: BTreeMap<(Address, SessionId), U256>,
    collected_fees: U256,
    total_supply: U256,
}

impl BalanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a store from persisted parts, verifying the invariants
    pub fn from_parts(
        accounts: BTreeMap<Address, AccountBalance>,
        sessions: BTreeMap<(Address, SessionId), U256>,
        collected_fees: U256,
        total_supply: U256,
    ) -> Result<Self> {
        let store = Self {
            accounts,
            sessions,
            collected_fees,
            total_supply,
        };
        store.check_invariants()?;
        Ok(store)
    }

    pub fn balance(&self, account: &Address) -> AccountBalance {
        self.accounts.get(account).copied().unwrap_or_default()
    }

    pub fn session_lock(&self, account: &Address, session: &SessionId) -> U256 {
        self.sessions
            .get(&(*account, *session))
            .copied()
            .unwrap_or_default()
    }

    pub fn total_supply(&self) -> U256 {
        self.total_supply
    }

    pub fn collected_fees(&self) -> U256 {
        self.collected_fees
    }

    pub fn accounts(&self) -> impl Iterator<Item = (&Address, &AccountBalance)> {
        self.accounts.iter()
    }

    pub fn sessions(&self) -> impl Iterator<Item = (&(Address, SessionId), &U256)> {
        self.sessions.iter()
    }

    /// unlocked += amount, total supply += amount
    pub fn credit(&mut self, account: &Address, amount: U256) -> Result<()> {
        let supply = checked_add(self.total_supply, amount)?;
        let unlocked = checked_add(self.balance(account).unlocked, amount)?;
        if amount.is_zero() {
            return Ok(());
        }
        self.accounts.entry(*account).or_default().unlocked = unlocked;
        self.total_supply = supply;
        Ok(())
    }

    /// unlocked -= amount, total supply -= amount
    pub fn debit(&mut self, account: &Address, amount: U256) -> Result<()> {
        let balance = self.balance(account);
        if balance.unlocked < amount {
            return Err(LedgerError::InsufficientBalance {
                account: *account,
                need: amount,
                have: balance.unlocked,
            });
        }
        if let Some(entry) = self.accounts.get_mut(account) {
            entry.unlocked -= amount;
        }
        self.total_supply -= amount;
        self.prune(account);
        Ok(())
    }

    /// Move units from unlocked into a session-keyed escrow
    pub fn lock(&mut self, account: &Address, session: &SessionId, amount: U256) -> Result<()> {
        let balance = self.balance(account);
        if balance.unlocked < amount {
            return Err(LedgerError::InsufficientBalance {
                account: *account,
                need: amount,
                have: balance.unlocked,
            });
        }
        if amount.is_zero() {
            return Ok(());
        }
        let key = (*account, *session);
        let session_amount = checked_add(self.session_lock(account, session), amount)?;
        let locked = checked_add(balance.locked, amount)?;

        let entry = self.accounts.entry(*account).or_default();
        entry.unlocked -= amount;
        entry.locked = locked;
        self.sessions.insert(key, session_amount);
        Ok(())
    }

    /// Release part of a session lock, crediting it back or burning it
    pub fn release(
        &mut self,
        account: &Address,
        session: &SessionId,
        amount: U256,
        destination: Release,
    ) -> Result<()> {
        let key = (*account, *session);
        let held = self.session_lock(account, session);
        if held < amount {
            return Err(LedgerError::InsufficientLockedBalance {
                account: *account,
                need: amount,
                have: held,
            });
        }
        if amount.is_zero() {
            return Ok(());
        }

        let balance = self.balance(account);
        let locked = balance.locked.checked_sub(amount).ok_or_else(|| {
            LedgerError::Inconsistent(format!("locked underflow for {}", account))
        })?;
        let unlocked = match destination {
            Release::CreditBack => checked_add(balance.unlocked, amount)?,
            Release::Burn => balance.unlocked,
        };

        let remaining = held - amount;
        if remaining.is_zero() {
            self.sessions.remove(&key);
        } else {
            self.sessions.insert(key, remaining);
        }
        let entry = self.accounts.entry(*account).or_default();
        entry.locked = locked;
        entry.unlocked = unlocked;
        if destination == Release::Burn {
            self.total_supply -= amount;
        }
        self.prune(account);
        Ok(())
    }

    /// Release whatever remains in a session; returns the amount moved
    pub fn release_all(
        &mut self,
        account: &Address,
        session: &SessionId,
        destination: Release,
    ) -> Result<U256> {
        let held = self.session_lock(account, session);
        self.release(account, session, held, destination)?;
        Ok(held)
    }

    /// Mint units into the fee pool
    pub fn mint_fees(&mut self, amount: U256) -> Result<()> {
        let supply = checked_add(self.total_supply, amount)?;
        self.collected_fees = checked_add(self.collected_fees, amount)?;
        self.total_supply = supply;
        Ok(())
    }

    /// Remove units from the fee pool (they leave the ledger)
    pub fn burn_fees(&mut self, amount: U256) -> Result<()> {
        if self.collected_fees < amount {
            return Err(LedgerError::InsufficientFees {
                need: amount,
                have: self.collected_fees,
            });
        }
        self.collected_fees -= amount;
        self.total_supply -= amount;
        Ok(())
    }

    pub fn check_invariants(&self) -> Result<()> {
        let mut sum = self.collected_fees;
        for (account, balance) in &self.accounts {
            sum = checked_add(sum, balance.total())?;

            let first = (*account, SessionId(Hash([0u8; 32])));
            let last = (*account, SessionId(Hash([0xFF; 32])));
            let session_sum = self
                .sessions
                .range(first..=last)
                .try_fold(U256::zero(), |acc, (_, amount)| checked_add(acc, *amount))?;
            if session_sum != balance.locked {
                return Err(LedgerError::Inconsistent(format!(
                    "{} locked {} but sessions hold {}",
                    account, balance.locked, session_sum
                )));
            }
        }
        for (account, _) in self.sessions.keys() {
            if !self.accounts.contains_key(account) {
                return Err(LedgerError::Inconsistent(format!(
                    "session held by unknown account {}",
                    account
                )));
            }
        }
        if sum != self.total_supply {
            return Err(LedgerError::Inconsistent(format!(
                "total supply {} but balances and fees sum to {}",
                self.total_supply, sum
            )));
        }
        Ok(())
    }

    fn prune(&mut self, account: &Address) {
        if self
            .accounts
            .get(account)
            .map(AccountBalance::is_empty)
            .unwrap_or(false)
        {
            self.accounts.remove(account);
        }
    }
}

fn checked_add(a: U256, b: U256) -> Result<U256> {
    a.checked_add(b).ok_or(LedgerError::ArithmeticOverflow)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> Address {
        Address::repeat_byte(0xA1)
    }

    #[test]
    fn test_credit_and_debit() {
        let mut store = BalanceStore::new();
        store.credit(&alice(), U256::from(100)).unwrap();
        store.debit(&alice(), U256::from(30)).unwrap();

        assert_eq!(store.balance(&alice()).unlocked, U256::from(70));
        assert_eq!(store.total_supply(), U256::from(70));
        store.check_invariants().unwrap();
    }

    #[test]
    fn test_debit_more_than_unlocked_fails() {
        let mut store = BalanceStore::new();
        store.credit(&alice(), U256::from(10)).unwrap();
        let err = store.debit(&alice(), U256::from(11)).unwrap_err();
        assert_eq!(
            err,
            LedgerError::InsufficientBalance {
                account: alice(),
                need: U256::from(11),
                have: U256::from(10),
            }
        );
        assert_eq!(store.total_supply(), U256::from(10));
    }

    #[test]
    fn test_lock_moves_to_session() {
        let mut store = BalanceStore::new();
        let session = SessionId::from_u64(7);
        store.credit(&alice(), U256::from(100)).unwrap();
        store.lock(&alice(), &session, U256::from(40)).unwrap();
        store.lock(&alice(), &session, U256::from(10)).unwrap();

        let balance = store.balance(&alice());
        assert_eq!(balance.unlocked, U256::from(50));
        assert_eq!(balance.locked, U256::from(50));
        assert_eq!(store.session_lock(&alice(), &session), U256::from(50));
        assert_eq!(store.total_supply(), U256::from(100));
        store.check_invariants().unwrap();
    }

    #[test]
    fn test_locked_units_cannot_be_debited() {
        let mut store = BalanceStore::new();
        store.credit(&alice(), U256::from(100)).unwrap();
        store
            .lock(&alice(), &SessionId::DEFAULT, U256::from(100))
            .unwrap();
        assert!(matches!(
            store.debit(&alice(), U256::one()),
            Err(LedgerError::InsufficientBalance { .. })
        ));
    }

    #[test]
    fn test_release_credit_back_and_burn() {
        let mut store = BalanceStore::new();
        let session = SessionId::from_u64(1);
        store.credit(&alice(), U256::from(100)).unwrap();
        store.lock(&alice(), &session, U256::from(60)).unwrap();

        store
            .release(&alice(), &session, U256::from(20), Release::CreditBack)
            .unwrap();
        assert_eq!(store.balance(&alice()).unlocked, U256::from(60));
        assert_eq!(store.total_supply(), U256::from(100));

        store
            .release(&alice(), &session, U256::from(40), Release::Burn)
            .unwrap();
        assert_eq!(store.balance(&alice()).locked, U256::zero());
        assert_eq!(store.session_lock(&alice(), &session), U256::zero());
        assert_eq!(store.total_supply(), U256::from(60));
        store.check_invariants().unwrap();
    }

    #[test]
    fn test_release_more_than_session_fails() {
        let mut store = BalanceStore::new();
        let session = SessionId::from_u64(1);
        store.credit(&alice(), U256::from(10)).unwrap();
        store.lock(&alice(), &session, U256::from(10)).unwrap();

        let err = store
            .release(&alice(), &SessionId::from_u64(2), U256::one(), Release::Burn)
            .unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientLockedBalance { .. }));
    }

    #[test]
    fn test_fees_count_toward_supply() {
        let mut store = BalanceStore::new();
        store.mint_fees(U256::from(5)).unwrap();
        assert_eq!(store.total_supply(), U256::from(5));
        store.check_invariants().unwrap();

        assert!(matches!(
            store.burn_fees(U256::from(6)),
            Err(LedgerError::InsufficientFees { .. })
        ));
        store.burn_fees(U256::from(5)).unwrap();
        assert_eq!(store.total_supply(), U256::zero());
    }

    #[test]
    fn test_from_parts_detects_corruption() {
        let mut accounts = BTreeMap::new();
        accounts.insert(
            alice(),
            AccountBalance {
                unlocked: U256::from(10),
                locked: U256::zero(),
            },
        );
        let err =
            BalanceStore::from_parts(accounts, BTreeMap::new(), U256::zero(), U256::from(11))
                .unwrap_err();
        assert!(matches!(err, LedgerError::Inconsistent(_)));
    }

    #[test]
    fn test_credit_overflow_is_rejected() {
        let mut store = BalanceStore::new();
        store.credit(&alice(), U256::MAX).unwrap();
        assert_eq!(
            store.credit(&Address::repeat_byte(2), U256::one()),
            Err(LedgerError::ArithmeticOverflow)
        );
        assert_eq!(store.total_supply(), U256::MAX);
    }
}
