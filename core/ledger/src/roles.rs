// tally/core/ledger/src/roles.rs

// Capability table: role -> set of accounts, checked at the top of each entry point
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tally_primitives::Address;

use crate::error::{LedgerError, Result};

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Configuration, pause, migration and role management
    Admin,
    /// Exchange rate and fee sweeps
    Manager,
    /// Session locks and payouts
    GameServer,
    /// Administrative batch deposits and sweeps
    LiveOps,
    /// Reads other accounts' balances
    BalanceReader,
    /// Issues deposit and withdrawal vouchers
    Signer,
}

impl Role {
    pub const ALL: [Role; 6] = [
        Role::Admin,
        Role::Manager,
        Role::GameServer,
        Role::LiveOps,
        Role::BalanceReader,
        Role::Signer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Manager => "manager",
            Role::GameServer => "game_server",
            Role::LiveOps => "live_ops",
            Role::BalanceReader => "balance_reader",
            Role::Signer => "signer",
        }
    }

    /// Stable byte tag used by the storage layer
    pub fn tag(&self) -> u8 {
        match self {
            Role::Admin => 0,
            Role::Manager => 1,
            Role::GameServer => 2,
            Role::LiveOps => 3,
            Role::BalanceReader => 4,
            Role::Signer => 5,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        Role::ALL.into_iter().find(|role| role.tag() == tag)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessControl {
    members: BTreeMap<Role, BTreeSet<Address>>,
}

impl AccessControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the account did not already hold the role
    pub fn grant(&mut self, role: Role, account: Address) -> Result<bool> {
        if account.is_zero() {
            return Err(LedgerError::ZeroAddress);
        }
        Ok(self.members.entry(role).or_default().insert(account))
    }

    /// Returns true if the account held the role
    pub fn revoke(&mut self, role: Role, account: &Address) -> bool {
        match self.members.get_mut(&role) {
            Some(set) => {
                let removed = set.remove(account);
                if set.is_empty() {
                    self.members.remove(&role);
                }
                removed
            }
            None => false,
        }
    }

    pub fn has_role(&self, role: Role, account: &Address) -> bool {
        self.members
            .get(&role)
            .map(|set| set.contains(account))
            .unwrap_or(false)
    }

    /// Passes if the account holds at least one of the listed roles
    pub fn ensure_any(&self, account: &Address, roles: &[Role]) -> Result<()> {
        if roles.iter().any(|role| self.has_role(*role, account)) {
            return Ok(());
        }
        Err(LedgerError::MissingRole {
            account: *account,
            required: roles.to_vec(),
        })
    }

    pub fn members(&self, role: Role) -> impl Iterator<Item = &Address> {
        self.members.get(&role).into_iter().flatten()
    }

    /// Flattened (role, account) pairs, for persistence
    pub fn entries(&self) -> Vec<(Role, Address)> {
        self.members
            .iter()
            .flat_map(|(role, set)| set.iter().map(move |account| (*role, *account)))
            .collect()
    }
}
