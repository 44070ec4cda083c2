//! Storage backend abstraction.
//!
//! Defines the generic key-value interface the rest of the workspace is
//! written against: named partitions, atomic write batches, ordered scans
//! in both directions, and snapshot-isolated read views.

use std::fmt;

/// Errors from storage operations.
#[derive(Debug, Clone)]
pub enum StorageError {
    /// Partition does not exist
    PartitionNotFound(String),
    /// Underlying engine I/O failure
    IoError(String),
    /// Stored bytes could not be decoded
    SerializationError(String),
    /// Malformed key encountered during a scan
    InvalidKey(String),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::PartitionNotFound(name) => write!(f, "Partition not found: {}", name),
            StorageError::IoError(msg) => write!(f, "Storage I/O error: {}", msg),
            StorageError::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            StorageError::InvalidKey(msg) => write!(f, "Invalid key: {}", msg),
        }
    }
}

impl std::error::Error for StorageError {}

/// Result alias for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// A named keyspace within the storage backend.
///
/// Maps to a column family in RocksDB and to a separate tree in the
/// in-memory backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Partition {
    name: String,
}

impl Partition {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// A single mutation within an atomic batch.
#[derive(Debug, Clone)]
pub enum Operation {
    Put {
        partition: Partition,
        key: Vec<u8>,
        value: Vec<u8>,
    },
    Delete {
        partition: Partition,
        key: Vec<u8>,
    },
}

/// Direction of an ordered scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanDirection {
    /// Lowest key first
    Ascending,
    /// Highest key first
    Descending,
}

/// Boxed key-value iterator returned by scans.
pub type KvIter<'a> = Box<dyn Iterator<Item = (Vec<u8>, Vec<u8>)> + 'a>;

/// Snapshot-isolated read interface.
///
/// A read view observes the state of the store at the moment it was
/// created; writes committed afterwards are invisible to it. Views are
/// short-lived, held only for the duration of one logical read.
pub trait ReadView {
    /// Point lookup within the view.
    fn get(&self, partition: &Partition, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Ordered scan within the view.
    ///
    /// Starts at `start_key` (inclusive, when a key equal to it exists)
    /// or at the corresponding end of the partition when `start_key` is
    /// `None`. `limit` caps the number of yielded pairs.
    fn scan(
        &self,
        partition: &Partition,
        start_key: Option<&[u8]>,
        direction: ScanDirection,
        limit: Option<usize>,
    ) -> Result<KvIter<'_>>;
}

/// Generic storage backend interface.
///
/// Implementations must be safe to share across threads; all methods take
/// `&self` and callers wrap backends in `Arc`.
pub trait StorageBackend: Send + Sync {
    fn get(&self, partition: &Partition, key: &[u8]) -> Result<Option<Vec<u8>>>;

    fn put(&self, partition: &Partition, key: &[u8], value: &[u8]) -> Result<()>;

    fn delete(&self, partition: &Partition, key: &[u8]) -> Result<()>;

    /// Applies all operations atomically; either all are visible or none.
    fn batch(&self, operations: Vec<Operation>) -> Result<()>;

    /// Ordered scan over live data. Same contract as [`ReadView::scan`],
    /// but against the current state rather than a snapshot.
    fn scan(
        &self,
        partition: &Partition,
        start_key: Option<&[u8]>,
        direction: ScanDirection,
        limit: Option<usize>,
    ) -> Result<KvIter<'_>>;

    /// Opens a snapshot-isolated read view of the current state.
    fn read_view(&self) -> Result<Box<dyn ReadView + '_>>;

    fn partition_exists(&self, partition: &Partition) -> bool;

    fn create_partition(&self, partition: &Partition) -> Result<()>;
}
