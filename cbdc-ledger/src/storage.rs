//! World state backed by RocksDB
//!
//! # Column Families
//!
//! - `world_state` - Documents (key: state key, value: bincode `VersionedValue`)
//! - `meta` - Commit height (key: `height`)
//!
//! A commit validates the read-set and writes every document plus the new
//! height in one `WriteBatch`, so a crash never leaves half a transaction.

use crate::{
    error::{Error, Result},
    state::{ReadWriteSet, Version, VersionedValue, WorldState},
    stub::Selector,
    Config,
};
use parking_lot::Mutex;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, IteratorMode, Options, WriteBatch, DB};

/// Column family names
const CF_WORLD_STATE: &str = "world_state";
const CF_META: &str = "meta";

/// Key of the commit height in `meta`
const HEIGHT_KEY: &[u8] = b"height";

/// RocksDB world state
pub struct RocksWorldState {
    db: DB,
    /// Serializes validate-then-write; the last committed height lives here
    commit_lock: Mutex<Version>,
}

impl std::fmt::Debug for RocksWorldState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RocksWorldState")
            .field("path", &self.db.path())
            .finish_non_exhaustive()
    }
}

impl RocksWorldState {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        // Create directory if not exists
        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        // Tuning from config
        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);

        if config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_WORLD_STATE, Self::cf_options_world_state()),
            ColumnFamilyDescriptor::new(CF_META, Options::default()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        let height = match db.cf_handle(CF_META) {
            Some(cf) => match db.get_cf(cf, HEIGHT_KEY)? {
                Some(bytes) => Version(bincode::deserialize(&bytes)?),
                None => Version::default(),
            },
            None => return Err(Error::StateStore(format!("Column family {} not found", CF_META))),
        };

        tracing::info!(path = ?path, height = height.0, "Opened RocksDB world state");

        Ok(Self {
            db,
            commit_lock: Mutex::new(height),
        })
    }

    fn cf_options_world_state() -> Options {
        let mut opts = Options::default();
        // Balances are read on every invocation, use LZ4 for speed
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        opts.set_block_based_table_factory(&block_opts);
        opts
    }

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::StateStore(format!("Column family {} not found", name)))
    }

    fn read_versioned(&self, key: &str) -> Result<Option<VersionedValue>> {
        let cf = self.cf_handle(CF_WORLD_STATE)?;
        match self.db.get_cf(cf, key.as_bytes())? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Close database (graceful shutdown)
    pub fn close(self) -> Result<()> {
        drop(self.db);
        tracing::info!("RocksDB closed gracefully");
        Ok(())
    }
}

impl WorldState for RocksWorldState {
    fn get(&self, key: &str) -> Result<Option<VersionedValue>> {
        self.read_versioned(key)
    }

    fn query(&self, selector: &Selector) -> Result<Vec<(String, Vec<u8>)>> {
        let cf = self.cf_handle(CF_WORLD_STATE)?;

        let mut results = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (key, value) = item?;
            let versioned: VersionedValue = bincode::deserialize(&value)?;
            if selector.matches_bytes(&versioned.value) {
                let key = String::from_utf8(key.into_vec())
                    .map_err(|e| Error::StateStore(format!("non UTF-8 state key: {}", e)))?;
                results.push((key, versioned.value));
            }
        }

        Ok(results)
    }

    fn commit(&self, rwset: &ReadWriteSet) -> Result<Version> {
        let mut height = self.commit_lock.lock();

        rwset.validate_reads(|key| Ok(self.read_versioned(key)?.map(|v| v.version)))?;

        let version = height.next();
        let cf_state = self.cf_handle(CF_WORLD_STATE)?;
        let cf_meta = self.cf_handle(CF_META)?;

        let mut batch = WriteBatch::default();
        for (key, value) in &rwset.writes {
            let encoded = bincode::serialize(&VersionedValue {
                version,
                value: value.clone(),
            })?;
            batch.put_cf(cf_state, key.as_bytes(), encoded);
        }
        batch.put_cf(cf_meta, HEIGHT_KEY, bincode::serialize(&version.0)?);

        // Atomic commit
        self.db.write(batch)?;
        *height = version;

        tracing::debug!(
            tx_id = %rwset.tx_id,
            version = version.0,
            writes = rwset.writes.len(),
            "Read/write set committed"
        );

        Ok(version)
    }

    fn height(&self) -> Version {
        *self.commit_lock.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DocType;
    use tempfile::TempDir;

    fn test_config() -> (Config, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        (config, temp_dir)
    }

    fn write_set(tx_id: &str, key: &str, value: &str) -> ReadWriteSet {
        let mut rwset = ReadWriteSet::new(tx_id);
        rwset.writes.insert(key.to_string(), value.as_bytes().to_vec());
        rwset
    }

    #[test]
    fn test_storage_open() {
        let (config, _temp) = test_config();
        let world = RocksWorldState::open(&config).unwrap();
        assert_eq!(world.height(), Version(0));
        assert!(world.get("missing").unwrap().is_none());
    }

    #[test]
    fn test_commit_and_get() {
        let (config, _temp) = test_config();
        let world = RocksWorldState::open(&config).unwrap();

        let version = world
            .commit(&write_set("t1", "balance_alice", r#"{"docType":"balance"}"#))
            .unwrap();
        assert_eq!(version, Version(1));

        let stored = world.get("balance_alice").unwrap().unwrap();
        assert_eq!(stored.version, Version(1));
        assert_eq!(stored.value, br#"{"docType":"balance"}"#.to_vec());
    }

    #[test]
    fn test_conflicting_commit_rejected() {
        let (config, _temp) = test_config();
        let world = RocksWorldState::open(&config).unwrap();
        world.commit(&write_set("t1", "k", "1")).unwrap();

        let mut stale = write_set("t2", "k", "2");
        stale.reads.insert("k".to_string(), None);
        assert!(matches!(
            world.commit(&stale),
            Err(Error::ReadConflict { .. })
        ));
        assert_eq!(world.get("k").unwrap().unwrap().value, b"1".to_vec());
    }

    #[test]
    fn test_query_filters_by_doc_type() {
        let (config, _temp) = test_config();
        let world = RocksWorldState::open(&config).unwrap();

        let mut rwset = ReadWriteSet::new("t1");
        rwset.writes.insert(
            "tx_t1".to_string(),
            br#"{"docType":"transaction","fromId":"","toId":"central-bank"}"#.to_vec(),
        );
        rwset.writes.insert(
            "balance_central-bank".to_string(),
            br#"{"docType":"balance","accountId":"central-bank"}"#.to_vec(),
        );
        world.commit(&rwset).unwrap();

        let hits = world
            .query(&Selector::doc_type(DocType::Transaction).or_field("toId", "central-bank"))
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, "tx_t1");
    }

    #[test]
    fn test_height_survives_reopen() {
        let (config, _temp) = test_config();
        {
            let world = RocksWorldState::open(&config).unwrap();
            world.commit(&write_set("t1", "a", "1")).unwrap();
            world.commit(&write_set("t2", "b", "2")).unwrap();
            world.close().unwrap();
        }

        let world = RocksWorldState::open(&config).unwrap();
        assert_eq!(world.height(), Version(2));
        assert_eq!(world.get("b").unwrap().unwrap().version, Version(2));
    }
}
