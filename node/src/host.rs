// tally/node/src/host.rs

use crate::config::NodeConfig;
use crate::traced_span;
use anyhow::{Context, Result};
use parking_lot::Mutex;
use std::sync::Arc;
use tally_ledger::{FungibleToken, Ledger, LedgerEvent, LedgerParams, LedgerState, StateChanges};
use tally_storage::StorageManager;
use tracing::{debug, error, info, warn};

/// Runs ledger operations one at a time and persists each successful commit.
///
/// The mutex gives every call exclusive access to the engine, which is the
/// total ordering the ledger assumes from its execution environment.
pub struct LedgerHost {
    ledger: Mutex<Ledger>,
    storage: Option<StorageManager>,
}

impl LedgerHost {
    /// Restore the ledger from `storage.data_dir`, or initialize it from the
    /// `[ledger]` section when nothing has been saved yet. A stored ledger must
    /// match the configured address and chain; other settings are superseded
    /// by what was persisted.
    pub fn open(config: &NodeConfig, token: Arc<dyn FungibleToken>) -> Result<Self> {
        let params = config.validate()?;
        if !config.storage.persist {
            return Self::in_memory(params, token);
        }

        let storage = StorageManager::new(&config.storage.data_dir).with_context(|| {
            format!("opening storage at {}", config.storage.data_dir.display())
        })?;
        let ledger = match storage.ledger.load()? {
            Some(state) => {
                if state.address != params.address || state.chain_id != params.chain_id {
                    anyhow::bail!(
                        "stored ledger {} on chain {} does not match configured {} on chain {}",
                        state.address,
                        state.chain_id,
                        params.address,
                        params.chain_id
                    );
                }
                if state.rate != params.rate {
                    warn!(
                        "Configured rate {} ignored, stored ledger uses {}",
                        params.rate, state.rate
                    );
                }
                info!(
                    "Restored ledger {} (supply {})",
                    state.address,
                    state.balances.total_supply()
                );
                Ledger::from_state(state, token)?
            }
            None => {
                let ledger = Ledger::new(params, token)?;
                storage.ledger.save(ledger.state())?;
                info!(
                    "Initialized ledger {} in {}",
                    ledger.address(),
                    config.storage.data_dir.display()
                );
                ledger
            }
        };

        Ok(Self {
            ledger: Mutex::new(ledger),
            storage: Some(storage),
        })
    }

    /// A host without persistence
    pub fn in_memory(params: LedgerParams, token: Arc<dyn FungibleToken>) -> Result<Self> {
        let ledger = Ledger::new(params, token)?;
        Ok(Self {
            ledger: Mutex::new(ledger),
            storage: None,
        })
    }

    /// Run one ledger operation. On success the new state is written before the
    /// lock is released; a failed operation has already rolled itself back.
    pub fn execute<T, F>(&self, operation: &str, f: F) -> Result<T>
    where
        F: FnOnce(&mut Ledger) -> tally_ledger::Result<T>,
    {
        let span = traced_span!(INFO, "ledger_call", operation = operation);
        let _enter = span.enter();

        let mut ledger = self.ledger.lock();
        let events_before = ledger.events().len();
        let value = f(&mut ledger)?;

        if let Some(storage) = &self.storage {
            let changes = StateChanges::from_events(&ledger.events()[events_before..]);
            // The engine has committed and token transfers have happened, so the
            // in-memory state stays authoritative even if the write fails
            match storage.ledger.apply(ledger.state(), &changes) {
                Ok(writes) => debug!("Persisted {} records after {}", writes, operation),
                Err(e) => {
                    error!("Failed to persist ledger after {}: {}", operation, e);
                    return Err(e.context(format!("persisting after {}", operation)));
                }
            }
        }
        Ok(value)
    }

    /// Read-only access under the same lock
    pub fn read<T>(&self, f: impl FnOnce(&Ledger) -> T) -> T {
        f(&self.ledger.lock())
    }

    pub fn state(&self) -> LedgerState {
        self.ledger.lock().state().clone()
    }

    pub fn drain_events(&self) -> Vec<LedgerEvent> {
        self.ledger.lock().drain_events()
    }

    pub fn is_persistent(&self) -> bool {
        self.storage.is_some()
    }

    /// Flush storage to disk
    pub fn flush(&self) -> Result<()> {
        match &self.storage {
            Some(storage) => storage.flush(),
            None => Ok(()),
        }
    }
}
