//! RocksDB implementation of the StorageBackend trait.
//!
//! Partitions map to RocksDB column families. Read views bind a RocksDB
//! snapshot into `ReadOptions` so every get and scan through the view
//! observes the same state.

use crate::storage_trait::{
    KvIter, Operation, Partition, ReadView, Result, ScanDirection, StorageBackend, StorageError,
};
use rocksdb::{
    ColumnFamily, DBAccess, DBIteratorWithThreadMode, Direction, IteratorMode, Options,
    ReadOptions, SnapshotWithThreadMode, WriteBatch, DB,
};
use std::path::Path;
use std::sync::Arc;

/// RocksDB storage backend.
pub struct RocksDBBackend {
    db: Arc<DB>,
}

impl RocksDBBackend {
    /// Creates a backend over an already-open database handle.
    pub fn new(db: Arc<DB>) -> Self {
        Self { db }
    }

    /// Opens (or creates) a database at `path` with the given partitions.
    pub fn open(path: &Path, partitions: &[&str]) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        // Existing CFs must all be listed at open time or RocksDB refuses
        // to start, so merge the requested set with whatever is on disk.
        let mut cf_names: Vec<String> =
            DB::list_cf(&Options::default(), path).unwrap_or_else(|_| vec!["default".to_string()]);
        for name in partitions {
            if !cf_names.iter().any(|existing| existing == name) {
                cf_names.push((*name).to_string());
            }
        }

        let db = DB::open_cf(&opts, path, cf_names)
            .map_err(|e| StorageError::IoError(e.to_string()))?;
        log::info!("RocksDB opened at {}", path.display());
        Ok(Self { db: Arc::new(db) })
    }

    /// Returns a reference to the underlying database.
    pub fn db(&self) -> &Arc<DB> {
        &self.db
    }

    fn get_cf(&self, partition: &Partition) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(partition.name())
            .ok_or_else(|| StorageError::PartitionNotFound(partition.name().to_string()))
    }
}

fn iter_mode<'a>(start_key: Option<&'a [u8]>, direction: ScanDirection) -> IteratorMode<'a> {
    match (start_key, direction) {
        (Some(start), ScanDirection::Ascending) => IteratorMode::From(start, Direction::Forward),
        (Some(start), ScanDirection::Descending) => IteratorMode::From(start, Direction::Reverse),
        (None, ScanDirection::Ascending) => IteratorMode::Start,
        (None, ScanDirection::Descending) => IteratorMode::End,
    }
}

struct LimitedIter<'a, D: DBAccess> {
    inner: DBIteratorWithThreadMode<'a, D>,
    remaining: Option<usize>,
}

impl<'a, D: DBAccess> Iterator for LimitedIter<'a, D> {
    type Item = (Vec<u8>, Vec<u8>);

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(0) = self.remaining {
            return None;
        }
        match self.inner.next()? {
            Ok((k, v)) => {
                if let Some(ref mut left) = self.remaining {
                    *left -= 1;
                }
                Some((k.to_vec(), v.to_vec()))
            }
            Err(_) => None,
        }
    }
}

impl StorageBackend for RocksDBBackend {
    fn get(&self, partition: &Partition, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let cf = self.get_cf(partition)?;
        self.db
            .get_cf(cf, key)
            .map_err(|e| StorageError::IoError(e.to_string()))
    }

    fn put(&self, partition: &Partition, key: &[u8], value: &[u8]) -> Result<()> {
        let cf = self.get_cf(partition)?;
        self.db
            .put_cf(cf, key, value)
            .map_err(|e| StorageError::IoError(e.to_string()))
    }

    fn delete(&self, partition: &Partition, key: &[u8]) -> Result<()> {
        let cf = self.get_cf(partition)?;
        self.db
            .delete_cf(cf, key)
            .map_err(|e| StorageError::IoError(e.to_string()))
    }

    fn batch(&self, operations: Vec<Operation>) -> Result<()> {
        let mut batch = WriteBatch::default();
        for op in operations {
            match op {
                Operation::Put {
                    partition,
                    key,
                    value,
                } => {
                    let cf = self.get_cf(&partition)?;
                    batch.put_cf(cf, key, value);
                }
                Operation::Delete { partition, key } => {
                    let cf = self.get_cf(&partition)?;
                    batch.delete_cf(cf, key);
                }
            }
        }
        self.db
            .write(batch)
            .map_err(|e| StorageError::IoError(e.to_string()))
    }

    fn scan(
        &self,
        partition: &Partition,
        start_key: Option<&[u8]>,
        direction: ScanDirection,
        limit: Option<usize>,
    ) -> Result<KvIter<'_>> {
        let cf = self.get_cf(partition)?;

        // Pin a snapshot for the duration of the iterator so the scan is
        // not perturbed by concurrent writes.
        let snapshot = self.db.snapshot();
        let mut readopts = ReadOptions::default();
        readopts.set_snapshot(&snapshot);
        let inner = self
            .db
            .iterator_cf_opt(cf, readopts, iter_mode(start_key, direction));

        struct SnapshotScanIter<'a, D: DBAccess> {
            // Hold the snapshot to keep it alive for 'a
            _snapshot: SnapshotWithThreadMode<'a, D>,
            inner: LimitedIter<'a, D>,
        }

        impl<'a, D: DBAccess> Iterator for SnapshotScanIter<'a, D> {
            type Item = (Vec<u8>, Vec<u8>);
            fn next(&mut self) -> Option<Self::Item> {
                self.inner.next()
            }
        }

        Ok(Box::new(SnapshotScanIter::<DB> {
            _snapshot: snapshot,
            inner: LimitedIter {
                inner,
                remaining: limit,
            },
        }))
    }

    fn read_view(&self) -> Result<Box<dyn ReadView + '_>> {
        Ok(Box::new(RocksDbReadView {
            db: &self.db,
            snapshot: self.db.snapshot(),
        }))
    }

    fn partition_exists(&self, partition: &Partition) -> bool {
        self.db.cf_handle(partition.name()).is_some()
    }

    fn create_partition(&self, partition: &Partition) -> Result<()> {
        if self.partition_exists(partition) {
            return Ok(());
        }

        let opts = Options::default();
        unsafe {
            // SAFETY: create_cf is internally synchronized and no column
            // family handles are dereferenced during creation; the Arc
            // keeps the DB alive for the duration of the call.
            let db_ptr = Arc::as_ptr(&self.db) as *mut DB;
            match (*db_ptr).create_cf(partition.name(), &opts) {
                Ok(()) => {}
                Err(e) => {
                    let msg = e.to_string();
                    // Benign race: another thread created the CF between
                    // the exists check and create.
                    if msg.to_lowercase().contains("column family already exists") {
                        return Ok(());
                    }
                    return Err(StorageError::IoError(msg));
                }
            }
        }
        Ok(())
    }
}

/// Read view pinned to one RocksDB snapshot.
struct RocksDbReadView<'a> {
    db: &'a DB,
    snapshot: SnapshotWithThreadMode<'a, DB>,
}

impl<'a> RocksDbReadView<'a> {
    fn get_cf(&self, partition: &Partition) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(partition.name())
            .ok_or_else(|| StorageError::PartitionNotFound(partition.name().to_string()))
    }

    fn read_opts(&self) -> ReadOptions {
        let mut opts = ReadOptions::default();
        opts.set_snapshot(&self.snapshot);
        opts
    }
}

impl<'a> ReadView for RocksDbReadView<'a> {
    fn get(&self, partition: &Partition, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let cf = self.get_cf(partition)?;
        self.db
            .get_cf_opt(cf, key, &self.read_opts())
            .map_err(|e| StorageError::IoError(e.to_string()))
    }

    fn scan(
        &self,
        partition: &Partition,
        start_key: Option<&[u8]>,
        direction: ScanDirection,
        limit: Option<usize>,
    ) -> Result<KvIter<'_>> {
        let cf = self.get_cf(partition)?;
        let inner =
            self.db
                .iterator_cf_opt(cf, self.read_opts(), iter_mode(start_key, direction));
        Ok(Box::new(LimitedIter {
            inner,
            remaining: limit,
        }))
    }
}
