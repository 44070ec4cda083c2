//! Typed storage accessor for suites and the aggregate row.
//!
//! Three partitions:
//! - `suites`: suite rows keyed by id, JSON-encoded.
//! - `suites_by_start`: the start-time index, keyed by the
//!   order-preserving `(started_at, id)` composite, value is the suite id.
//! - `suite_agg`: the single aggregate row under a fixed key.

use crate::key_encoding::{start_index_key, suite_key};
use crate::storage_trait::{
    Operation, Partition, ReadView, Result, StorageBackend, StorageError,
};
use std::sync::Arc;
use testdeck_commons::{Suite, SuiteAgg, SuiteId};

pub const SUITES_PARTITION: &str = "suites";
pub const START_INDEX_PARTITION: &str = "suites_by_start";
pub const AGG_PARTITION: &str = "suite_agg";

const AGG_KEY: &[u8] = b"current";

/// Typed accessor over the suite partitions.
pub struct SuiteStore {
    backend: Arc<dyn StorageBackend>,
}

impl SuiteStore {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    /// Creates the suite partitions if they do not exist yet.
    pub fn init(&self) -> Result<()> {
        for name in [SUITES_PARTITION, START_INDEX_PARTITION, AGG_PARTITION] {
            self.backend.create_partition(&Partition::new(name))?;
        }
        log::debug!("Suite partitions ready");
        Ok(())
    }

    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }

    pub fn suites_partition() -> Partition {
        Partition::new(SUITES_PARTITION)
    }

    pub fn start_index_partition() -> Partition {
        Partition::new(START_INDEX_PARTITION)
    }

    pub fn agg_partition() -> Partition {
        Partition::new(AGG_PARTITION)
    }

    pub fn get_suite(&self, id: &SuiteId) -> Result<Option<Suite>> {
        match self.backend.get(&Self::suites_partition(), &suite_key(id))? {
            Some(bytes) => Ok(Some(decode_suite(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Reads the aggregate row, falling back to the empty aggregate when
    /// none was written yet.
    pub fn get_agg(&self) -> Result<SuiteAgg> {
        match self.backend.get(&Self::agg_partition(), AGG_KEY)? {
            Some(bytes) => decode_agg(&bytes),
            None => Ok(SuiteAgg::default()),
        }
    }

    /// Point lookup of a suite within a read view.
    pub fn suite_at(view: &dyn ReadView, id: &SuiteId) -> Result<Option<Suite>> {
        match view.get(&Self::suites_partition(), &suite_key(id))? {
            Some(bytes) => Ok(Some(decode_suite(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Aggregate row within a read view, defaulted when absent.
    pub fn agg_at(view: &dyn ReadView) -> Result<SuiteAgg> {
        match view.get(&Self::agg_partition(), AGG_KEY)? {
            Some(bytes) => decode_agg(&bytes),
            None => Ok(SuiteAgg::default()),
        }
    }

    /// Batch operations writing a suite row and maintaining its index
    /// entry. `previous` is the row being replaced, used to drop a stale
    /// index entry when the sort position changed.
    pub fn upsert_ops(suite: &Suite, previous: Option<&Suite>) -> Result<Vec<Operation>> {
        let row = encode_suite(suite)?;
        let mut ops = vec![
            Operation::Put {
                partition: Self::suites_partition(),
                key: suite_key(&suite.id),
                value: row,
            },
            Operation::Put {
                partition: Self::start_index_partition(),
                key: start_index_key(suite.started_at, &suite.id),
                value: suite.id.as_str().as_bytes().to_vec(),
            },
        ];
        if let Some(old) = previous {
            if old.started_at != suite.started_at {
                ops.push(Operation::Delete {
                    partition: Self::start_index_partition(),
                    key: start_index_key(old.started_at, &old.id),
                });
            }
        }
        Ok(ops)
    }

    /// Batch operation rewriting the aggregate row.
    pub fn agg_ops(agg: &SuiteAgg) -> Result<Vec<Operation>> {
        let value = serde_json::to_vec(agg)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;
        Ok(vec![Operation::Put {
            partition: Self::agg_partition(),
            key: AGG_KEY.to_vec(),
            value,
        }])
    }

    pub fn commit(&self, operations: Vec<Operation>) -> Result<()> {
        self.backend.batch(operations)
    }
}

pub fn encode_suite(suite: &Suite) -> Result<Vec<u8>> {
    serde_json::to_vec(suite).map_err(|e| StorageError::SerializationError(e.to_string()))
}

pub fn decode_suite(bytes: &[u8]) -> Result<Suite> {
    serde_json::from_slice(bytes).map_err(|e| StorageError::SerializationError(e.to_string()))
}

pub fn decode_agg(bytes: &[u8]) -> Result<SuiteAgg> {
    serde_json::from_slice(bytes).map_err(|e| StorageError::SerializationError(e.to_string()))
}
