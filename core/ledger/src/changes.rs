// tally/core/ledger/src/changes.rs

// Keys of the durable state touched by a run of events, for incremental persistence
use std::collections::BTreeSet;
use tally_primitives::{Address, Hash};

use crate::balances::SessionId;
use crate::events::LedgerEvent;
use crate::roles::Role;

/// Table rows an operation may have written.
///
/// Every balance, session, voucher or role mutation is reported by an event
/// naming the row, so the events of a committed call are enough to rebuild
/// its write set. Singletons (rate, backing token, pause flag, fee pool,
/// supply) are not tracked and are always rewritten.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateChanges {
    pub accounts: BTreeSet<Address>,
    pub sessions: BTreeSet<(Address, SessionId)>,
    pub vouchers: BTreeSet<Hash>,
    pub roles: BTreeSet<(Role, Address)>,
}

impl StateChanges {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_events<'a>(events: impl IntoIterator<Item = &'a LedgerEvent>) -> Self {
        let mut changes = Self::new();
        for event in events {
            changes.record(event);
        }
        changes
    }

    pub fn record(&mut self, event: &LedgerEvent) {
        match event {
            LedgerEvent::Deposited {
                account, voucher, ..
            }
            | LedgerEvent::Withdrawn {
                account, voucher, ..
            } => {
                self.accounts.insert(*account);
                self.vouchers.insert(*voucher);
            }
            LedgerEvent::AdminDeposited { accounts, .. }
            | LedgerEvent::AdminWithdrawn { accounts, .. } => {
                self.accounts.extend(accounts.iter().copied());
            }
            LedgerEvent::Locked {
                account, session, ..
            }
            | LedgerEvent::Unlocked {
                account, session, ..
            } => {
                self.accounts.insert(*account);
                self.sessions.insert((*account, *session));
            }
            LedgerEvent::PayoutProcessed {
                session, entries, ..
            } => {
                for entry in entries {
                    self.accounts.insert(entry.account);
                    self.sessions.insert((entry.account, *session));
                }
            }
            LedgerEvent::RoleGranted { role, account, .. }
            | LedgerEvent::RoleRevoked { role, account, .. } => {
                self.roles.insert((*role, *account));
            }
            LedgerEvent::FeesWithdrawn { .. }
            | LedgerEvent::RateChanged { .. }
            | LedgerEvent::TokenMigrated { .. }
            | LedgerEvent::Paused { .. }
            | LedgerEvent::Unpaused { .. } => {}
        }
    }

    pub fn len(&self) -> usize {
        self.accounts.len() + self.sessions.len() + self.vouchers.len() + self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
