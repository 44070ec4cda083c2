//! Test helpers for storage-backed tests.

use crate::rocksdb_impl::RocksDBBackend;
use crate::suite_store::{AGG_PARTITION, START_INDEX_PARTITION, SUITES_PARTITION};
use std::sync::Arc;
use tempfile::TempDir;

/// Temporary RocksDB database with the suite partitions created.
///
/// The database lives as long as the `TestDb`; the tempdir is removed on
/// drop.
pub struct TestDb {
    backend: Arc<RocksDBBackend>,
    _temp_dir: TempDir,
}

impl TestDb {
    pub fn new() -> anyhow::Result<Self> {
        let temp_dir = TempDir::new()?;
        let backend = RocksDBBackend::open(
            temp_dir.path(),
            &[SUITES_PARTITION, START_INDEX_PARTITION, AGG_PARTITION],
        )?;
        Ok(Self {
            backend: Arc::new(backend),
            _temp_dir: temp_dir,
        })
    }

    pub fn backend(&self) -> Arc<RocksDBBackend> {
        self.backend.clone()
    }
}
