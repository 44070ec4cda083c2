//! Storage abstraction and backends for testdeck.
//!
//! The change-feed core consumes storage only through the traits in
//! [`storage_trait`]: point lookups, atomic batches, ordered scans in both
//! directions, and snapshot-isolated read views. Two backends are
//! provided: RocksDB for the server and an in-memory tree for tests and
//! ephemeral deployments.

pub mod key_encoding;
pub mod memory;
pub mod rocksdb_impl;
pub mod storage_trait;
pub mod suite_store;
pub mod test_utils;

pub use memory::MemoryBackend;
pub use rocksdb_impl::RocksDBBackend;
pub use storage_trait::{
    Operation, Partition, ReadView, Result, ScanDirection, StorageBackend, StorageError,
};
pub use suite_store::SuiteStore;
