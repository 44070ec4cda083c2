//! Suite repository: the write path feeding the change feed.
//!
//! Every mutation runs under one write mutex: read current state, build
//! the batch (suite row, index entry, aggregate), commit, dispatch the
//! resulting changes to the registry. Dispatching inside the mutex keeps
//! per-watcher batch order equal to commit order; the dispatch itself is
//! a non-blocking append, so holding the lock across it is cheap.

use crate::live::change::{Change, Mask};
use crate::live::error::{FeedError, Result};
use crate::live::registry::WatcherRegistry;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use testdeck_commons::time::now_millis;
use testdeck_commons::{Suite, SuiteAgg, SuiteId, SuiteResult, SuiteStatus};
use testdeck_store::{StorageBackend, SuiteStore};
use uuid::Uuid;

/// Caller-supplied fields for a new suite run.
#[derive(Debug, Clone, Default)]
pub struct NewSuite {
    pub name: Option<String>,
    pub tags: Vec<String>,
    pub planned_cases: Option<i64>,
    /// Start time override; defaults to now.
    pub started_at: Option<i64>,
}

/// Repository over the suite partitions, announcing every commit to the
/// watcher registry.
pub struct SuiteRepo {
    store: SuiteStore,
    registry: Arc<WatcherRegistry>,
    write_lock: Mutex<()>,
}

impl SuiteRepo {
    /// Builds the repository and creates the suite partitions.
    pub fn new(backend: Arc<dyn StorageBackend>, registry: Arc<WatcherRegistry>) -> Result<Self> {
        let store = SuiteStore::new(backend);
        store.init()?;
        Ok(Self {
            store,
            registry,
            write_lock: Mutex::new(()),
        })
    }

    pub fn registry(&self) -> &Arc<WatcherRegistry> {
        &self.registry
    }

    fn lock_writes(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Creates a started suite and announces it.
    pub fn create_suite(&self, new: NewSuite) -> Result<Suite> {
        let _guard = self.lock_writes();
        let span = tracing::debug_span!("create_suite");
        let _enter = span.enter();

        let id = SuiteId::new(Uuid::new_v4().to_string());
        let mut suite = Suite::started(id, new.started_at.unwrap_or_else(now_millis));
        let mut mask: Mask = ["id", "version", "status", "started_at"]
            .iter()
            .map(|f| f.to_string())
            .collect();
        if let Some(name) = new.name {
            suite.name = Some(name);
            mask.push("name".to_string());
        }
        if !new.tags.is_empty() {
            suite.tags = new.tags;
            mask.push("tags".to_string());
        }
        if let Some(planned) = new.planned_cases {
            suite.planned_cases = Some(planned);
            mask.push("planned_cases".to_string());
        }
        suite.validate()?;

        let mut agg = self.store.get_agg()?;
        agg.version += 1;
        agg.running += 1;

        let mut ops = SuiteStore::upsert_ops(&suite, None)?;
        ops.extend(SuiteStore::agg_ops(&agg)?);
        self.store.commit(ops)?;

        log::info!("Suite {} started", suite.id);
        self.registry.dispatch(vec![
            Change::suite_upsert(suite.clone(), mask),
            Change::agg_update(agg),
        ]);
        Ok(suite)
    }

    /// Marks a started suite as finished with its result.
    pub fn finish_suite(
        &self,
        id: &SuiteId,
        result: SuiteResult,
        finished_at: Option<i64>,
    ) -> Result<Suite> {
        let _guard = self.lock_writes();
        let span = tracing::debug_span!("finish_suite", suite_id = %id);
        let _enter = span.enter();

        let old = self.require_suite(id)?;
        if old.status != SuiteStatus::Started {
            return Err(FeedError::InvalidTransition(format!(
                "suite {} is {:?}, expected started",
                id, old.status
            )));
        }

        let mut suite = old.clone();
        suite.version += 1;
        suite.status = SuiteStatus::Finished;
        suite.result = Some(result);
        suite.finished_at = Some(finished_at.unwrap_or_else(now_millis));

        let mut agg = self.store.get_agg()?;
        agg.version += 1;
        agg.running -= 1;
        agg.finished += 1;
        match result {
            SuiteResult::Passed => agg.passed += 1,
            SuiteResult::Failed => agg.failed += 1,
        }

        self.commit_and_dispatch(
            &suite,
            &old,
            agg,
            &["version", "status", "result", "finished_at"],
        )?;
        log::info!("Suite {} finished: {:?}", id, result);
        Ok(suite)
    }

    /// Marks a started suite as disconnected (stopped reporting without
    /// finishing).
    pub fn disconnect_suite(&self, id: &SuiteId, disconnected_at: Option<i64>) -> Result<Suite> {
        let _guard = self.lock_writes();
        let span = tracing::debug_span!("disconnect_suite", suite_id = %id);
        let _enter = span.enter();

        let old = self.require_suite(id)?;
        if old.status != SuiteStatus::Started {
            return Err(FeedError::InvalidTransition(format!(
                "suite {} is {:?}, expected started",
                id, old.status
            )));
        }

        let mut suite = old.clone();
        suite.version += 1;
        suite.status = SuiteStatus::Disconnected;
        suite.disconnected_at = Some(disconnected_at.unwrap_or_else(now_millis));

        let mut agg = self.store.get_agg()?;
        agg.version += 1;
        agg.running -= 1;
        agg.disconnected += 1;

        self.commit_and_dispatch(&suite, &old, agg, &["version", "status", "disconnected_at"])?;
        log::warn!("Suite {} disconnected", id);
        Ok(suite)
    }

    /// Updates suite metadata without touching the aggregate.
    pub fn rename_suite(&self, id: &SuiteId, name: String) -> Result<Suite> {
        let _guard = self.lock_writes();

        let old = self.require_suite(id)?;
        let mut suite = old.clone();
        suite.version += 1;
        suite.name = Some(name);

        let ops = SuiteStore::upsert_ops(&suite, Some(&old))?;
        self.store.commit(ops)?;
        self.registry.dispatch(vec![Change::suite_upsert(
            suite.clone(),
            vec!["version".to_string(), "name".to_string()],
        )]);
        Ok(suite)
    }

    /// Replaces the suite's tags without touching the aggregate.
    pub fn tag_suite(&self, id: &SuiteId, tags: Vec<String>) -> Result<Suite> {
        let _guard = self.lock_writes();

        let old = self.require_suite(id)?;
        let mut suite = old.clone();
        suite.version += 1;
        suite.tags = tags;

        let ops = SuiteStore::upsert_ops(&suite, Some(&old))?;
        self.store.commit(ops)?;
        self.registry.dispatch(vec![Change::suite_upsert(
            suite.clone(),
            vec!["version".to_string(), "tags".to_string()],
        )]);
        Ok(suite)
    }

    pub fn get_suite(&self, id: &SuiteId) -> Result<Option<Suite>> {
        Ok(self.store.get_suite(id)?)
    }

    pub fn get_agg(&self) -> Result<SuiteAgg> {
        Ok(self.store.get_agg()?)
    }

    fn require_suite(&self, id: &SuiteId) -> Result<Suite> {
        self.store
            .get_suite(id)?
            .filter(|suite| !suite.deleted)
            .ok_or_else(|| FeedError::NotFound(format!("suite {}", id)))
    }

    fn commit_and_dispatch(
        &self,
        suite: &Suite,
        old: &Suite,
        agg: SuiteAgg,
        mask: &[&str],
    ) -> Result<()> {
        let mut ops = SuiteStore::upsert_ops(suite, Some(old))?;
        ops.extend(SuiteStore::agg_ops(&agg)?);
        self.store.commit(ops)?;

        self.registry.dispatch(vec![
            Change::suite_upsert(suite.clone(), mask.iter().map(|f| f.to_string()).collect()),
            Change::agg_update(agg),
        ]);
        Ok(())
    }
}
