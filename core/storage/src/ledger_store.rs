// tally/core/storage/src/ledger_store.rs

use crate::db::{column_families::*, RocksDB};
use anyhow::Result;
use primitive_types::U256;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tally_ledger::{
    AccessControl, AccountBalance, BackingToken, BalanceStore, ExchangeRate, LedgerState, Role,
    SessionId, StateChanges, VoucherAuthenticator,
};
use tally_primitives::{Address, ChainId, Hash};
use tracing::{debug, info};

const META_KEY: &[u8] = b"ledger";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("corrupted {cf} record: {reason}")]
    Corrupted { cf: &'static str, reason: String },

    #[error("unknown role tag {0}")]
    UnknownRole(u8),
}

/// Singleton record for everything that is not a table
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LedgerMeta {
    address: Address,
    chain_id: ChainId,
    rate: ExchangeRate,
    backing: BackingToken,
    paused: bool,
    collected_fees: U256,
    total_supply: U256,
}

/// Durable ledger state, one column family per table
pub struct LedgerStore {
    db: Arc<RocksDB>,
}

impl LedgerStore {
    pub fn new(db: Arc<RocksDB>) -> Self {
        Self { db }
    }

    /// Write the whole state in a single batch, removing keys that no longer exist.
    /// Scans every table; use [`apply`](Self::apply) for per-operation writes.
    pub fn save(&self, state: &LedgerState) -> Result<()> {
        let mut batch = self.db.batch();

        let accounts: BTreeMap<Vec<u8>, Vec<u8>> = state
            .balances
            .accounts()
            .map(|(address, balance)| Ok((address.0.to_vec(), bincode::serialize(balance)?)))
            .collect::<Result<_>>()?;
        self.replace_cf(&mut batch, CF_ACCOUNTS, &accounts)?;

        let sessions: BTreeMap<Vec<u8>, Vec<u8>> = state
            .balances
            .sessions()
            .map(|((address, session), amount)| {
                Ok((session_key(address, session), bincode::serialize(amount)?))
            })
            .collect::<Result<_>>()?;
        self.replace_cf(&mut batch, CF_SESSIONS, &sessions)?;

        let vouchers: BTreeMap<Vec<u8>, Vec<u8>> = state
            .vouchers
            .used()
            .map(|digest| (digest.0.to_vec(), Vec::new()))
            .collect();
        self.replace_cf(&mut batch, CF_VOUCHERS, &vouchers)?;

        let roles: BTreeMap<Vec<u8>, Vec<u8>> = state
            .roles
            .entries()
            .into_iter()
            .map(|(role, address)| (role_key(role, &address), Vec::new()))
            .collect();
        self.replace_cf(&mut batch, CF_ROLES, &roles)?;

        self.put_meta(&mut batch, state)?;

        self.db.write_batch(batch)?;
        debug!(
            "Saved ledger state: {} accounts, {} sessions, {} vouchers",
            accounts.len(),
            sessions.len(),
            vouchers.len()
        );
        Ok(())
    }

    /// Write only the rows named in `changes`, plus the singleton record.
    ///
    /// `state` must be the state right after the changes were made, on top of
    /// a store that held the state right before them. Returns the number of
    /// records put or deleted.
    pub fn apply(&self, state: &LedgerState, changes: &StateChanges) -> Result<usize> {
        let mut batch = self.db.batch();
        let mut writes = 0;

        for address in &changes.accounts {
            let balance = state.balances.balance(address);
            if balance == AccountBalance::default() {
                self.db.batch_delete_cf(&mut batch, CF_ACCOUNTS, &address.0)?;
            } else {
                self.db.batch_put_cf(
                    &mut batch,
                    CF_ACCOUNTS,
                    &address.0,
                    &bincode::serialize(&balance)?,
                )?;
            }
            writes += 1;
        }

        for (address, session) in &changes.sessions {
            let key = session_key(address, session);
            let amount = state.balances.session_lock(address, session);
            if amount.is_zero() {
                self.db.batch_delete_cf(&mut batch, CF_SESSIONS, &key)?;
            } else {
                self.db
                    .batch_put_cf(&mut batch, CF_SESSIONS, &key, &bincode::serialize(&amount)?)?;
            }
            writes += 1;
        }

        for digest in &changes.vouchers {
            // Vouchers are never forgotten once committed
            if state.vouchers.is_used(digest) {
                self.db.batch_put_cf(&mut batch, CF_VOUCHERS, &digest.0, &[])?;
                writes += 1;
            }
        }

        for (role, address) in &changes.roles {
            let key = role_key(*role, address);
            if state.roles.has_role(*role, address) {
                self.db.batch_put_cf(&mut batch, CF_ROLES, &key, &[])?;
            } else {
                self.db.batch_delete_cf(&mut batch, CF_ROLES, &key)?;
            }
            writes += 1;
        }

        self.put_meta(&mut batch, state)?;
        writes += 1;

        self.db.write_batch(batch)?;
        debug!("Applied {} ledger records", writes);
        Ok(writes)
    }

    /// Rebuild the ledger state; `None` if nothing was ever saved
    pub fn load(&self) -> Result<Option<LedgerState>> {
        let meta: LedgerMeta = match self.db.get_cf(CF_METADATA, META_KEY)? {
            Some(bytes) => bincode::deserialize(&bytes)?,
            None => return Ok(None),
        };

        let mut accounts = BTreeMap::new();
        for (key, value) in self.db.entries_cf(CF_ACCOUNTS)? {
            let address = address_from(CF_ACCOUNTS, &key)?;
            let balance: AccountBalance = bincode::deserialize(&value)?;
            accounts.insert(address, balance);
        }

        let mut sessions = BTreeMap::new();
        for (key, value) in self.db.entries_cf(CF_SESSIONS)? {
            if key.len() != 52 {
                return Err(corrupted(CF_SESSIONS, format!("key length {}", key.len())));
            }
            let address = address_from(CF_SESSIONS, &key[..20])?;
            let mut session = [0u8; 32];
            session.copy_from_slice(&key[20..]);
            let amount: U256 = bincode::deserialize(&value)?;
            sessions.insert((address, SessionId::new(session)), amount);
        }

        let balances = BalanceStore::from_parts(
            accounts,
            sessions,
            meta.collected_fees,
            meta.total_supply,
        )
        .map_err(|e| corrupted(CF_ACCOUNTS, e.to_string()))?;

        let mut used = BTreeSet::new();
        for key in self.db.keys_cf(CF_VOUCHERS)? {
            if key.len() != 32 {
                return Err(corrupted(CF_VOUCHERS, format!("key length {}", key.len())));
            }
            let mut digest = [0u8; 32];
            digest.copy_from_slice(&key);
            used.insert(Hash::new(digest));
        }

        let mut roles = AccessControl::new();
        for key in self.db.keys_cf(CF_ROLES)? {
            if key.len() != 21 {
                return Err(corrupted(CF_ROLES, format!("key length {}", key.len())));
            }
            let role = Role::from_tag(key[0]).ok_or(StoreError::UnknownRole(key[0]))?;
            let address = address_from(CF_ROLES, &key[1..])?;
            roles
                .grant(role, address)
                .map_err(|e| corrupted(CF_ROLES, e.to_string()))?;
        }

        info!(
            "Loaded ledger state for {} (supply {}, {} vouchers used)",
            meta.address,
            meta.total_supply,
            used.len()
        );
        Ok(Some(LedgerState {
            address: meta.address,
            chain_id: meta.chain_id,
            roles,
            balances,
            vouchers: VoucherAuthenticator::from_used(used),
            rate: meta.rate,
            backing: meta.backing,
            paused: meta.paused,
        }))
    }

    pub fn flush(&self) -> Result<()> {
        self.db.flush()
    }

    fn put_meta(&self, batch: &mut rocksdb::WriteBatch, state: &LedgerState) -> Result<()> {
        let meta = LedgerMeta {
            address: state.address,
            chain_id: state.chain_id,
            rate: state.rate,
            backing: state.backing,
            paused: state.paused,
            collected_fees: state.balances.collected_fees(),
            total_supply: state.balances.total_supply(),
        };
        self.db
            .batch_put_cf(batch, CF_METADATA, META_KEY, &bincode::serialize(&meta)?)
    }

    fn replace_cf(
        &self,
        batch: &mut rocksdb::WriteBatch,
        cf: &str,
        entries: &BTreeMap<Vec<u8>, Vec<u8>>,
    ) -> Result<()> {
        for key in self.db.keys_cf(cf)? {
            if !entries.contains_key(key.as_ref()) {
                self.db.batch_delete_cf(batch, cf, &key)?;
            }
        }
        for (key, value) in entries {
            self.db.batch_put_cf(batch, cf, key, value)?;
        }
        Ok(())
    }
}

fn session_key(address: &Address, session: &SessionId) -> Vec<u8> {
    let mut key = Vec::with_capacity(52);
    key.extend_from_slice(&address.0);
    key.extend_from_slice(session.as_bytes());
    key
}

fn role_key(role: Role, address: &Address) -> Vec<u8> {
    let mut key = Vec::with_capacity(21);
    key.push(role.tag());
    key.extend_from_slice(&address.0);
    key
}

fn address_from(cf: &'static str, bytes: &[u8]) -> Result<Address> {
    if bytes.len() != 20 {
        return Err(corrupted(cf, format!("address length {}", bytes.len())));
    }
    let mut address = [0u8; 20];
    address.copy_from_slice(bytes);
    Ok(Address(address))
}

fn corrupted(cf: &'static str, reason: String) -> anyhow::Error {
    StoreError::Corrupted { cf, reason }.into()
}
