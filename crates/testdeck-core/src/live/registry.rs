//! Watcher registry: subscription lifecycle and write fan-out.

use crate::live::change::Change;
use crate::live::error::Result;
use crate::live::queue::DeliveryQueue;
use crate::live::watcher::{SuiteWatcher, WindowFilter};
use crate::live::window;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use testdeck_commons::{SuiteId, WatcherId};
use testdeck_store::{StorageBackend, SuiteStore};

/// Registry of live watchers.
///
/// `open` holds the registry lock across taking the read view, resolving
/// the window and registering the queue. `dispatch` takes the same lock,
/// so a write committing while an `open` is in flight is either visible
/// in the snapshot or delivered through the queue afterwards; a watcher
/// can see a change twice across that boundary but never misses one.
pub struct WatcherRegistry {
    backend: Arc<dyn StorageBackend>,
    watchers: Mutex<HashMap<WatcherId, DeliveryQueue<Vec<Change>>>>,
    next_id: AtomicU64,
}

impl WatcherRegistry {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Arc<Self> {
        Arc::new(Self {
            backend,
            watchers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        })
    }

    fn lock_watchers(&self) -> MutexGuard<'_, HashMap<WatcherId, DeliveryQueue<Vec<Change>>>> {
        self.watchers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Opens a window around `pivot` and registers a watcher for it.
    ///
    /// The initial change batch (window snapshots, then the aggregate) is
    /// the first thing the watcher receives; every batch dispatched after
    /// `open` returns follows in commit order, filtered to the window.
    pub fn open(
        self: &Arc<Self>,
        pivot: Option<&SuiteId>,
        pad_lt: usize,
        pad_gt: usize,
    ) -> Result<SuiteWatcher> {
        let mut watchers = self.lock_watchers();

        let view = self.backend.read_view()?;
        let resolved = window::resolve(view.as_ref(), pivot, pad_lt, pad_gt)?;
        let agg = SuiteStore::agg_at(view.as_ref())?;

        let mut filter = WindowFilter::new(
            pad_lt.saturating_add(pad_gt),
            resolved.anchor.clone(),
            resolved
                .entries
                .iter()
                .map(|(key, suite)| (key.clone(), suite.id.clone())),
        );
        let (queue, rx) = DeliveryQueue::with_sieve(move |batch| filter.apply(batch));
        queue.push(resolved.initial_changes(agg));

        let id = WatcherId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        watchers.insert(id, queue);

        log::debug!(
            "Watcher {} opened: pivot={:?}, pad_lt={}, pad_gt={}, window={}",
            id,
            pivot.map(|p| p.as_str()),
            pad_lt,
            pad_gt,
            resolved.len()
        );

        Ok(SuiteWatcher::new(id, Arc::clone(self), rx))
    }

    /// Fans a committed change batch out to every registered watcher.
    ///
    /// Pushes are unbounded appends; a stalled consumer grows only its
    /// own queue and never delays the writer or other watchers.
    pub fn dispatch(&self, batch: Vec<Change>) {
        let watchers = self.lock_watchers();
        if watchers.is_empty() {
            return;
        }
        let span = tracing::debug_span!(
            "dispatch",
            changes = batch.len(),
            watchers = watchers.len()
        );
        let _enter = span.enter();
        for queue in watchers.values() {
            queue.push(batch.clone());
        }
    }

    /// Deregisters a watcher and closes its queue. Called through
    /// [`SuiteWatcher::close`].
    pub(crate) fn remove(&self, id: WatcherId) {
        if self.lock_watchers().remove(&id).is_some() {
            log::debug!("Watcher {} closed", id);
        }
    }

    /// Closes all watchers. Their streams end once their backlogs drain.
    pub fn shutdown(&self) {
        let mut watchers = self.lock_watchers();
        let count = watchers.len();
        watchers.clear();
        if count > 0 {
            log::info!("Closed {} watcher(s) on shutdown", count);
        }
    }

    pub fn watcher_count(&self) -> usize {
        self.lock_watchers().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::live::error::FeedError;
    use testdeck_commons::{Suite, SuiteAgg};
    use testdeck_store::MemoryBackend;

    fn seeded_registry(count: i64) -> (Arc<WatcherRegistry>, SuiteStore) {
        let backend = Arc::new(MemoryBackend::new());
        let store = SuiteStore::new(backend.clone());
        store.init().unwrap();
        for n in 1..=count {
            let suite = Suite::started(SuiteId::new(format!("S{}", n)), n * 1000);
            store
                .commit(SuiteStore::upsert_ops(&suite, None).unwrap())
                .unwrap();
        }
        (WatcherRegistry::new(backend), store)
    }

    fn upsert_ids(batch: &[Change]) -> Vec<String> {
        batch
            .iter()
            .filter_map(|change| match change {
                Change::SuiteUpsert { suite, .. } => Some(suite.id.as_str().to_string()),
                Change::AggUpdate { .. } => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_open_delivers_initial_window_first() {
        let (registry, _store) = seeded_registry(5);
        let mut watcher = registry.open(Some(&SuiteId::new("S3")), 1, 2).unwrap();

        let initial = watcher.recv().await.unwrap();
        assert_eq!(upsert_ids(&initial), vec!["S3", "S4", "S2"]);
        assert!(matches!(initial.last(), Some(Change::AggUpdate { .. })));
        assert_eq!(registry.watcher_count(), 1);
    }

    #[tokio::test]
    async fn test_open_unknown_pivot_registers_nothing() {
        let (registry, _store) = seeded_registry(3);
        let err = registry
            .open(Some(&SuiteId::new("missing")), 1, 1)
            .unwrap_err();
        assert!(matches!(err, FeedError::NotFound(_)));
        assert_eq!(registry.watcher_count(), 0);
    }

    #[tokio::test]
    async fn test_dispatch_reaches_all_watchers() {
        let (registry, _store) = seeded_registry(3);
        let mut first = registry.open(None, 0, 3).unwrap();
        let mut second = registry.open(None, 0, 3).unwrap();

        registry.dispatch(vec![Change::agg_update(SuiteAgg::default())]);

        for watcher in [&mut first, &mut second] {
            let initial = watcher.recv().await.unwrap();
            assert_eq!(upsert_ids(&initial).len(), 3);
            let next = watcher.recv().await.unwrap();
            assert!(matches!(next[0], Change::AggUpdate { .. }));
        }
    }

    #[tokio::test]
    async fn test_out_of_window_upsert_not_delivered() {
        let (registry, store) = seeded_registry(5);
        let mut watcher = registry.open(Some(&SuiteId::new("S3")), 1, 2).unwrap();
        watcher.recv().await.unwrap();

        // S6 sorts newer than the S4 boundary; its upsert is dropped and
        // only the aggregate half of the batch comes through.
        let s6 = Suite::started(SuiteId::new("S6"), 6000);
        store
            .commit(SuiteStore::upsert_ops(&s6, None).unwrap())
            .unwrap();
        registry.dispatch(vec![
            Change::suite_snapshot(s6),
            Change::agg_update(SuiteAgg::default()),
        ]);

        let batch = watcher.recv().await.unwrap();
        assert_eq!(batch.len(), 1);
        assert!(matches!(batch[0], Change::AggUpdate { .. }));
    }

    #[tokio::test]
    async fn test_close_ends_stream_after_backlog() {
        let (registry, _store) = seeded_registry(3);
        let mut watcher = registry.open(None, 0, 3).unwrap();

        registry.dispatch(vec![Change::agg_update(SuiteAgg::default())]);
        watcher.close();
        registry.dispatch(vec![Change::agg_update(SuiteAgg::default())]);

        assert!(watcher.recv().await.is_some()); // initial window
        assert!(watcher.recv().await.is_some()); // batch before close
        assert!(watcher.recv().await.is_none()); // nothing after close
        assert_eq!(registry.watcher_count(), 0);
    }

    #[tokio::test]
    async fn test_dropping_watcher_deregisters() {
        let (registry, _store) = seeded_registry(1);
        let watcher = registry.open(None, 0, 1).unwrap();
        assert_eq!(registry.watcher_count(), 1);
        drop(watcher);
        assert_eq!(registry.watcher_count(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_closes_all() {
        let (registry, _store) = seeded_registry(2);
        let mut first = registry.open(None, 0, 2).unwrap();
        let mut second = registry.open(None, 0, 2).unwrap();

        registry.shutdown();
        assert_eq!(registry.watcher_count(), 0);

        // Initial batches were pushed before shutdown and still drain.
        assert!(first.recv().await.is_some());
        assert!(first.recv().await.is_none());
        assert!(second.recv().await.is_some());
        assert!(second.recv().await.is_none());
    }
}
