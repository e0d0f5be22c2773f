// tally/core/ledger/src/token.rs

// Custodied token interface plus an in-memory standard fungible token
use parking_lot::RwLock;
use primitive_types::U256;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tally_primitives::Address;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("Insufficient balance: need {need}, have {have}")]
    InsufficientBalance { need: U256, have: U256 },

    #[error("Insufficient allowance: need {need}, have {have}")]
    InsufficientAllowance { need: U256, have: U256 },

    #[error("Transfer to the zero address")]
    ZeroRecipient,

    #[error("Balance overflow")]
    Overflow,
}

/// The subset of a standard fungible-token contract the ledger calls.
///
/// Calls take `&self`: the token is an external contract reached through a
/// handle, and `from`/`spender` play the role of the calling contract.
pub trait FungibleToken: Send + Sync + fmt::Debug {
    fn address(&self) -> Address;

    fn decimals(&self) -> u8;

    fn balance_of(&self, owner: &Address) -> U256;

    fn allowance(&self, owner: &Address, spender: &Address) -> U256;

    /// Move `amount` from `from` (the caller) to `to`
    fn transfer(&self, from: &Address, to: &Address, amount: U256) -> Result<(), TokenError>;

    /// Move `amount` from `from` to `to`, spending `spender`'s allowance
    fn transfer_from(
        &self,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: U256,
    ) -> Result<(), TokenError>;
}

/// Reference to the backing token as persisted in ledger state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackingToken {
    pub address: Address,
    pub decimals: u8,
}

impl BackingToken {
    pub fn of(token: &dyn FungibleToken) -> Self {
        Self {
            address: token.address(),
            decimals: token.decimals(),
        }
    }
}

#[derive(Debug, Default)]
struct TokenState {
    balances: HashMap<Address, U256>,
    allowances: HashMap<(Address, Address), U256>,
    total_supply: U256,
}

/// Shared-handle token; clones observe the same balances
#[derive(Debug, Clone)]
pub struct InMemoryToken {
    address: Address,
    decimals: u8,
    state: Arc<RwLock<TokenState>>,
}

impl InMemoryToken {
    pub fn new(address: Address, decimals: u8) -> Self {
        Self {
            address,
            decimals,
            state: Arc::new(RwLock::new(TokenState::default())),
        }
    }

    /// Create tokens out of thin air (test and devnet funding)
    pub fn mint(&self, to: &Address, amount: U256) -> Result<(), TokenError> {
        let mut state = self.state.write();
        let balance = state.balances.get(to).copied().unwrap_or_default();
        let new_balance = balance.checked_add(amount).ok_or(TokenError::Overflow)?;
        let new_supply = state
            .total_supply
            .checked_add(amount)
            .ok_or(TokenError::Overflow)?;
        state.balances.insert(*to, new_balance);
        state.total_supply = new_supply;
        Ok(())
    }

    pub fn approve(&self, owner: &Address, spender: &Address, amount: U256) {
        self.state
            .write()
            .allowances
            .insert((*owner, *spender), amount);
    }

    pub fn total_supply(&self) -> U256 {
        self.state.read().total_supply
    }

    fn move_balance(
        state: &mut TokenState,
        from: &Address,
        to: &Address,
        amount: U256,
    ) -> Result<(), TokenError> {
        if to.is_zero() {
            return Err(TokenError::ZeroRecipient);
        }
        let from_balance = state.balances.get(from).copied().unwrap_or_default();
        if from_balance < amount {
            return Err(TokenError::InsufficientBalance {
                need: amount,
                have: from_balance,
            });
        }
        state.balances.insert(*from, from_balance - amount);
        let to_balance = state.balances.get(to).copied().unwrap_or_default();
        // Cannot overflow: total supply bounds every balance
        state.balances.insert(*to, to_balance + amount);
        Ok(())
    }
}

impl FungibleToken for InMemoryToken {
    fn address(&self) -> Address {
        self.address
    }

    fn decimals(&self) -> u8 {
        self.decimals
    }

    fn balance_of(&self, owner: &Address) -> U256 {
        self.state
            .read()
            .balances
            .get(owner)
            .copied()
            .unwrap_or_default()
    }

    fn allowance(&self, owner: &Address, spender: &Address) -> U256 {
        self.state
            .read()
            .allowances
            .get(&(*owner, *spender))
            .copied()
            .unwrap_or_default()
    }

    fn transfer(&self, from: &Address, to: &Address, amount: U256) -> Result<(), TokenError> {
        let mut state = self.state.write();
        Self::move_balance(&mut state, from, to, amount)
    }

    fn transfer_from(
        &self,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: U256,
    ) -> Result<(), TokenError> {
        let mut state = self.state.write();
        let allowance = state
            .allowances
            .get(&(*from, *spender))
            .copied()
            .unwrap_or_default();
        if allowance < amount {
            return Err(TokenError::InsufficientAllowance {
                need: amount,
                have: allowance,
            });
        }
        Self::move_balance(&mut state, from, to, amount)?;
        if allowance != U256::MAX {
            state
                .allowances
                .insert((*from, *spender), allowance - amount);
        }
        Ok(())
    }
}
