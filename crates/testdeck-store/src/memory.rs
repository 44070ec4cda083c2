//! In-memory implementation of the StorageBackend trait.
//!
//! One `BTreeMap` per partition behind a single `RwLock`. Scans collect
//! their result under the read lock, so iterators observe a consistent
//! state without holding the lock while the caller consumes them. Read
//! views clone the trees wholesale, which is cheap at the scales this
//! backend is used for (tests and ephemeral deployments).

use crate::storage_trait::{
    KvIter, Operation, Partition, ReadView, Result, ScanDirection, StorageBackend, StorageError,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

type Tree = BTreeMap<Vec<u8>, Vec<u8>>;

/// In-memory storage backend.
#[derive(Default)]
pub struct MemoryBackend {
    partitions: RwLock<HashMap<String, Tree>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_tree<T>(&self, partition: &Partition, f: impl FnOnce(&Tree) -> T) -> Result<T> {
        let guard = self
            .partitions
            .read()
            .map_err(|e| StorageError::IoError(format!("lock poisoned: {}", e)))?;
        let tree = guard
            .get(partition.name())
            .ok_or_else(|| StorageError::PartitionNotFound(partition.name().to_string()))?;
        Ok(f(tree))
    }

    fn with_tree_mut<T>(
        &self,
        partition: &Partition,
        f: impl FnOnce(&mut Tree) -> T,
    ) -> Result<T> {
        let mut guard = self
            .partitions
            .write()
            .map_err(|e| StorageError::IoError(format!("lock poisoned: {}", e)))?;
        let tree = guard
            .get_mut(partition.name())
            .ok_or_else(|| StorageError::PartitionNotFound(partition.name().to_string()))?;
        Ok(f(tree))
    }
}

fn scan_tree(
    tree: &Tree,
    start_key: Option<&[u8]>,
    direction: ScanDirection,
    limit: Option<usize>,
) -> Vec<(Vec<u8>, Vec<u8>)> {
    let limit = limit.unwrap_or(usize::MAX);
    let pairs: Box<dyn Iterator<Item = (&Vec<u8>, &Vec<u8>)>> = match (direction, start_key) {
        (ScanDirection::Ascending, None) => Box::new(tree.iter()),
        (ScanDirection::Ascending, Some(start)) => Box::new(tree.range(start.to_vec()..)),
        (ScanDirection::Descending, None) => Box::new(tree.iter().rev()),
        (ScanDirection::Descending, Some(start)) => Box::new(tree.range(..=start.to_vec()).rev()),
    };
    pairs
        .take(limit)
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

impl StorageBackend for MemoryBackend {
    fn get(&self, partition: &Partition, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.with_tree(partition, |tree| tree.get(key).cloned())
    }

    fn put(&self, partition: &Partition, key: &[u8], value: &[u8]) -> Result<()> {
        self.with_tree_mut(partition, |tree| {
            tree.insert(key.to_vec(), value.to_vec());
        })
    }

    fn delete(&self, partition: &Partition, key: &[u8]) -> Result<()> {
        self.with_tree_mut(partition, |tree| {
            tree.remove(key);
        })
    }

    fn batch(&self, operations: Vec<Operation>) -> Result<()> {
        // One write guard for the whole batch keeps it atomic.
        let mut guard = self
            .partitions
            .write()
            .map_err(|e| StorageError::IoError(format!("lock poisoned: {}", e)))?;
        for op in &operations {
            let name = match op {
                Operation::Put { partition, .. } => partition.name(),
                Operation::Delete { partition, .. } => partition.name(),
            };
            if !guard.contains_key(name) {
                return Err(StorageError::PartitionNotFound(name.to_string()));
            }
        }
        for op in operations {
            match op {
                Operation::Put {
                    partition,
                    key,
                    value,
                } => {
                    if let Some(tree) = guard.get_mut(partition.name()) {
                        tree.insert(key, value);
                    }
                }
                Operation::Delete { partition, key } => {
                    if let Some(tree) = guard.get_mut(partition.name()) {
                        tree.remove(&key);
                    }
                }
            }
        }
        Ok(())
    }

    fn scan(
        &self,
        partition: &Partition,
        start_key: Option<&[u8]>,
        direction: ScanDirection,
        limit: Option<usize>,
    ) -> Result<KvIter<'_>> {
        let pairs = self.with_tree(partition, |tree| {
            scan_tree(tree, start_key, direction, limit)
        })?;
        Ok(Box::new(pairs.into_iter()))
    }

    fn read_view(&self) -> Result<Box<dyn ReadView + '_>> {
        let guard = self
            .partitions
            .read()
            .map_err(|e| StorageError::IoError(format!("lock poisoned: {}", e)))?;
        Ok(Box::new(MemoryReadView {
            partitions: guard.clone(),
        }))
    }

    fn partition_exists(&self, partition: &Partition) -> bool {
        self.partitions
            .read()
            .map(|guard| guard.contains_key(partition.name()))
            .unwrap_or(false)
    }

    fn create_partition(&self, partition: &Partition) -> Result<()> {
        let mut guard = self
            .partitions
            .write()
            .map_err(|e| StorageError::IoError(format!("lock poisoned: {}", e)))?;
        guard.entry(partition.name().to_string()).or_default();
        Ok(())
    }
}

/// Read view over a full clone of the trees at creation time.
struct MemoryReadView {
    partitions: HashMap<String, Tree>,
}

impl ReadView for MemoryReadView {
    fn get(&self, partition: &Partition, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let tree = self
            .partitions
            .get(partition.name())
            .ok_or_else(|| StorageError::PartitionNotFound(partition.name().to_string()))?;
        Ok(tree.get(key).cloned())
    }

    fn scan(
        &self,
        partition: &Partition,
        start_key: Option<&[u8]>,
        direction: ScanDirection,
        limit: Option<usize>,
    ) -> Result<KvIter<'_>> {
        let tree = self
            .partitions
            .get(partition.name())
            .ok_or_else(|| StorageError::PartitionNotFound(partition.name().to_string()))?;
        Ok(Box::new(
            scan_tree(tree, start_key, direction, limit).into_iter(),
        ))
    }
}
