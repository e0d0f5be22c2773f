// tally/core/storage/src/lib.rs

pub mod db;
pub mod ledger_store;

use anyhow::Result;
use db::RocksDB;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

pub use ledger_store::{LedgerStore, StoreError};

/// Main storage manager
pub struct StorageManager {
    pub db: Arc<RocksDB>,
    pub ledger: Arc<LedgerStore>,
}

impl StorageManager {
    /// Open (or create) the database under `path`
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let db = Arc::new(RocksDB::open(path)?);
        let ledger = Arc::new(LedgerStore::new(db.clone()));

        info!("Storage manager initialized");
        Ok(Self { db, ledger })
    }

    pub fn flush(&self) -> Result<()> {
        self.db.flush()
    }
}
