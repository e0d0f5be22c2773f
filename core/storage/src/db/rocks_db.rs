// tally/core/storage/src/db/rocks_db.rs

use super::column_families::all_column_families;
use anyhow::Result;
use rocksdb::{ColumnFamilyDescriptor, IteratorMode, Options, WriteBatch, DB};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

type KvItem = (Box<[u8]>, Box<[u8]>);

/// RocksDB wrapper for ledger storage
pub struct RocksDB {
    db: Arc<DB>,
}

impl RocksDB {
    /// Open database with default options
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        // Compression in prod; disabled in tests or with `no-compression`
        let compression = if cfg!(any(test, feature = "no-compression")) {
            rocksdb::DBCompressionType::None
        } else {
            rocksdb::DBCompressionType::Lz4
        };
        db_opts.set_compression_type(compression);

        // Ledger writes are small and frequent
        db_opts.set_write_buffer_size(16 * 1024 * 1024); // 16MB
        db_opts.set_max_write_buffer_number(3);
        db_opts.increase_parallelism(num_cpus::get() as i32);

        let cfs: Vec<ColumnFamilyDescriptor> = all_column_families()
            .into_iter()
            .map(|name| {
                let mut cf_opts = Options::default();
                cf_opts.set_compression_type(compression);
                ColumnFamilyDescriptor::new(name, cf_opts)
            })
            .collect();

        let db = DB::open_cf_descriptors(&db_opts, path, cfs)?;

        info!("RocksDB opened successfully");
        Ok(Self { db: Arc::new(db) })
    }

    /// Get a value from a column family
    pub fn get_cf(&self, cf: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let cf_handle = self.cf_handle(cf)?;
        Ok(self.db.get_cf(&cf_handle, key)?)
    }

    /// Put a value in a column family
    pub fn put_cf(&self, cf: &str, key: &[u8], value: &[u8]) -> Result<()> {
        let cf_handle = self.cf_handle(cf)?;
        self.db.put_cf(&cf_handle, key, value)?;
        Ok(())
    }

    /// Check if a key exists in a column family
    pub fn exists_cf(&self, cf: &str, key: &[u8]) -> Result<bool> {
        Ok(self.get_cf(cf, key)?.is_some())
    }

    /// Write a batch of operations atomically
    pub fn write_batch(&self, batch: WriteBatch) -> Result<()> {
        self.db.write(batch)?;
        Ok(())
    }

    /// Create a new write batch
    pub fn batch(&self) -> WriteBatch {
        WriteBatch::default()
    }

    /// Add put operation to batch
    pub fn batch_put_cf(
        &self,
        batch: &mut WriteBatch,
        cf: &str,
        key: &[u8],
        value: &[u8],
    ) -> Result<()> {
        let cf_handle = self.cf_handle(cf)?;
        batch.put_cf(&cf_handle, key, value);
        Ok(())
    }

    /// Add delete operation to batch
    pub fn batch_delete_cf(&self, batch: &mut WriteBatch, cf: &str, key: &[u8]) -> Result<()> {
        let cf_handle = self.cf_handle(cf)?;
        batch.delete_cf(&cf_handle, key);
        Ok(())
    }

    /// Read every entry of a column family in key order
    pub fn entries_cf(&self, cf: &str) -> Result<Vec<KvItem>> {
        let cf_handle = self.cf_handle(cf)?;
        let mut entries = Vec::new();
        for item in self.db.iterator_cf(&cf_handle, IteratorMode::Start) {
            entries.push(item?);
        }
        Ok(entries)
    }

    /// Read every key of a column family in key order
    pub fn keys_cf(&self, cf: &str) -> Result<Vec<Box<[u8]>>> {
        Ok(self
            .entries_cf(cf)?
            .into_iter()
            .map(|(key, _)| key)
            .collect())
    }

    /// Get column family handle
    fn cf_handle(&self, name: &str) -> Result<&rocksdb::ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| anyhow::anyhow!("Column family {} not found", name))
    }

    /// Flush all column families
    pub fn flush(&self) -> Result<()> {
        for cf_name in all_column_families() {
            if let Ok(cf) = self.cf_handle(cf_name) {
                self.db.flush_cf(&cf)?;
            }
        }
        debug!("Flushed all column families");
        Ok(())
    }
}

impl Clone for RocksDB {
    fn clone(&self) -> Self {
        Self {
            db: Arc::clone(&self.db),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::column_families::{CF_ACCOUNTS, CF_VOUCHERS};
    use tempfile::TempDir;

    #[test]
    fn test_basic_operations() {
        let temp_dir = TempDir::new().unwrap();
        let db = RocksDB::open(temp_dir.path()).unwrap();

        db.put_cf(CF_ACCOUNTS, b"key1", b"value1").unwrap();
        assert_eq!(
            db.get_cf(CF_ACCOUNTS, b"key1").unwrap(),
            Some(b"value1".to_vec())
        );
        assert!(db.exists_cf(CF_ACCOUNTS, b"key1").unwrap());
        assert!(!db.exists_cf(CF_ACCOUNTS, b"key2").unwrap());
        assert!(db.get_cf("missing", b"key1").is_err());
    }

    #[test]
    fn test_batch_operations() {
        let temp_dir = TempDir::new().unwrap();
        let db = RocksDB::open(temp_dir.path()).unwrap();
        db.put_cf(CF_VOUCHERS, b"stale", b"").unwrap();

        let mut batch = db.batch();
        db.batch_put_cf(&mut batch, CF_VOUCHERS, b"b", b"").unwrap();
        db.batch_put_cf(&mut batch, CF_VOUCHERS, b"a", b"").unwrap();
        db.batch_delete_cf(&mut batch, CF_VOUCHERS, b"stale").unwrap();
        db.write_batch(batch).unwrap();

        let keys: Vec<Vec<u8>> = db
            .keys_cf(CF_VOUCHERS)
            .unwrap()
            .into_iter()
            .map(|key| key.to_vec())
            .collect();
        assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec()]);
    }
}
