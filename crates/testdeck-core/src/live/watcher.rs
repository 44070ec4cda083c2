//! Watcher handle and per-watcher window filtering.

use crate::live::change::Change;
use crate::live::registry::WatcherRegistry;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use testdeck_commons::{SuiteId, WatcherId};
use testdeck_store::key_encoding::start_index_key;
use tokio::sync::mpsc;

/// Consumer handle for one subscription.
///
/// The registry back-reference is non-owning in spirit: the registry maps
/// watcher ids to queues, and dropping or closing the handle removes that
/// entry. `close` is guarded by a one-shot flag, so dropping after an
/// explicit close does not deregister twice.
pub struct SuiteWatcher {
    id: WatcherId,
    registry: Arc<WatcherRegistry>,
    rx: mpsc::Receiver<Vec<Change>>,
    closed: bool,
}

impl SuiteWatcher {
    pub(crate) fn new(
        id: WatcherId,
        registry: Arc<WatcherRegistry>,
        rx: mpsc::Receiver<Vec<Change>>,
    ) -> Self {
        Self {
            id,
            registry,
            rx,
            closed: false,
        }
    }

    pub fn id(&self) -> WatcherId {
        self.id
    }

    /// Receives the next change batch. Returns `None` once the watcher
    /// was closed and the backlog drained.
    pub async fn recv(&mut self) -> Option<Vec<Change>> {
        self.rx.recv().await
    }

    /// Deregisters the watcher. Batches dispatched before the close are
    /// still delivered through [`recv`](Self::recv); afterwards the
    /// stream ends.
    pub fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.registry.remove(self.id);
        }
    }
}

impl std::fmt::Debug for SuiteWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SuiteWatcher")
            .field("id", &self.id)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl Drop for SuiteWatcher {
    fn drop(&mut self) {
        self.close();
    }
}

/// Sliding window membership filter, run by the watcher's drain task.
///
/// Tracks the index keys currently inside the window. An upsert for a
/// member passes through; a non-member is admitted while the window is
/// below its requested size, or when it lands strictly between the
/// current boundaries, in which case the edge on the newcomer's side of
/// the anchor is evicted. Anything outside the boundaries is dropped.
/// Aggregate updates are global and always pass.
pub struct WindowFilter {
    /// Member index keys mapped to suite ids, boundary keys at the ends.
    members: BTreeMap<Vec<u8>, SuiteId>,
    /// Reverse lookup for re-keying members whose start time changed.
    by_id: HashMap<SuiteId, Vec<u8>>,
    capacity: usize,
    /// Pivot index key; `None` anchors the window at the newest end.
    anchor: Option<Vec<u8>>,
}

impl WindowFilter {
    pub fn new(
        capacity: usize,
        anchor: Option<Vec<u8>>,
        members: impl IntoIterator<Item = (Vec<u8>, SuiteId)>,
    ) -> Self {
        let members: BTreeMap<Vec<u8>, SuiteId> = members.into_iter().collect();
        let by_id = members
            .iter()
            .map(|(key, id)| (id.clone(), key.clone()))
            .collect();
        Self {
            members,
            by_id,
            capacity,
            anchor,
        }
    }

    /// Filters one batch. Returns `None` when every change was dropped,
    /// so empty batches are never delivered.
    pub fn apply(&mut self, batch: Vec<Change>) -> Option<Vec<Change>> {
        let mut kept = Vec::with_capacity(batch.len());
        for change in batch {
            match change {
                Change::AggUpdate { .. } => kept.push(change),
                Change::SuiteUpsert { suite, mask } => {
                    let key = start_index_key(suite.started_at, &suite.id);
                    if self.admit(&suite.id, key) {
                        kept.push(Change::SuiteUpsert { suite, mask });
                    }
                }
            }
        }
        if kept.is_empty() {
            None
        } else {
            Some(kept)
        }
    }

    fn admit(&mut self, id: &SuiteId, key: Vec<u8>) -> bool {
        if let Some(existing) = self.by_id.get(id) {
            if *existing != key {
                // Member changed its sort position; re-key in place.
                self.members.remove(existing);
                self.members.insert(key.clone(), id.clone());
                self.by_id.insert(id.clone(), key);
            }
            return true;
        }

        if self.capacity == 0 {
            return false;
        }

        if self.members.len() < self.capacity {
            self.insert(id, key);
            return true;
        }

        // Full window: admit only strictly inside the boundaries.
        let inside = match (self.members.keys().next(), self.members.keys().next_back()) {
            (Some(min), Some(max)) => key > *min && key < *max,
            _ => false,
        };
        if !inside {
            return false;
        }

        // Evict the edge on the newcomer's side of the anchor; without a
        // pivot the anchor is the newest end, so the oldest member slides
        // out.
        let evict_oldest = match &self.anchor {
            Some(anchor) => key < *anchor,
            None => true,
        };
        let victim = if evict_oldest {
            self.members.keys().next().cloned()
        } else {
            self.members.keys().next_back().cloned()
        };
        if let Some(victim) = victim {
            if let Some(victim_id) = self.members.remove(&victim) {
                self.by_id.remove(&victim_id);
            }
        }
        self.insert(id, key);
        true
    }

    fn insert(&mut self, id: &SuiteId, key: Vec<u8>) {
        self.members.insert(key.clone(), id.clone());
        self.by_id.insert(id.clone(), key);
    }

    #[cfg(test)]
    fn member_ids(&self) -> Vec<&str> {
        self.members.values().map(|id| id.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use testdeck_commons::{Suite, SuiteAgg};

    fn key(n: i64, id: &str) -> Vec<u8> {
        start_index_key(n * 1000, &SuiteId::new(id))
    }

    fn upsert(n: i64, id: &str) -> Change {
        Change::suite_snapshot(Suite::started(SuiteId::new(id), n * 1000))
    }

    /// Filter over the window {S2, S3, S4} anchored at S3, as produced by
    /// open(pivot=S3, pad_lt=1, pad_gt=2).
    fn anchored_filter() -> WindowFilter {
        WindowFilter::new(
            3,
            Some(key(3, "S3")),
            vec![
                (key(2, "S2"), SuiteId::new("S2")),
                (key(3, "S3"), SuiteId::new("S3")),
                (key(4, "S4"), SuiteId::new("S4")),
            ],
        )
    }

    #[test]
    fn test_newer_than_max_is_dropped() {
        let mut filter = anchored_filter();
        assert_eq!(filter.apply(vec![upsert(6, "S6")]), None);
        assert_eq!(filter.member_ids(), vec!["S2", "S3", "S4"]);
    }

    #[test]
    fn test_older_than_min_is_dropped() {
        let mut filter = anchored_filter();
        assert_eq!(filter.apply(vec![upsert(1, "S1")]), None);
    }

    #[test]
    fn test_member_update_passes() {
        let mut filter = anchored_filter();
        let kept = filter.apply(vec![upsert(3, "S3")]).unwrap();
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn test_agg_update_always_passes() {
        let mut filter = anchored_filter();
        let kept = filter
            .apply(vec![upsert(9, "S9"), Change::agg_update(SuiteAgg::default())])
            .unwrap();
        assert_eq!(kept.len(), 1);
        assert!(matches!(kept[0], Change::AggUpdate { .. }));
    }

    #[test]
    fn test_inside_boundaries_evicts_same_side_edge() {
        let mut filter = anchored_filter();
        // Between S2 and the S3 anchor: older side, S2 slides out.
        let kept = filter.apply(vec![upsert(2, "S2b")]);
        assert!(kept.is_some());
        assert_eq!(filter.member_ids(), vec!["S2b", "S3", "S4"]);

        // Between the anchor and S4: newer side, S4 slides out.
        let kept = filter.apply(vec![upsert(3, "S3b")]);
        assert!(kept.is_some());
        assert_eq!(filter.member_ids(), vec!["S2b", "S3", "S3b"]);
    }

    #[test]
    fn test_grows_until_requested_size() {
        let mut filter = WindowFilter::new(2, None, vec![]);
        assert!(filter.apply(vec![upsert(1, "a")]).is_some());
        assert!(filter.apply(vec![upsert(2, "b")]).is_some());
        // Window full and "c" is outside [a, b]; dropped.
        assert_eq!(filter.apply(vec![upsert(3, "c")]), None);
        assert_eq!(filter.member_ids(), vec!["a", "b"]);
    }

    #[test]
    fn test_unanchored_eviction_drops_oldest() {
        let mut filter = WindowFilter::new(
            2,
            None,
            vec![
                (key(1, "a"), SuiteId::new("a")),
                (key(4, "d"), SuiteId::new("d")),
            ],
        );
        assert!(filter.apply(vec![upsert(2, "b")]).is_some());
        assert_eq!(filter.member_ids(), vec!["b", "d"]);
    }

    #[test]
    fn test_member_rekeys_when_start_time_changes() {
        let mut filter = anchored_filter();
        // S4 moves between S2 and S3; still a member, boundary follows.
        let kept = filter.apply(vec![upsert(2, "S4")]);
        assert!(kept.is_some());
        assert_eq!(filter.member_ids(), vec!["S2", "S4", "S3"]);
    }

    #[test]
    fn test_zero_capacity_drops_all_upserts() {
        let mut filter = WindowFilter::new(0, None, vec![]);
        assert_eq!(filter.apply(vec![upsert(1, "a")]), None);
        let kept = filter
            .apply(vec![Change::agg_update(SuiteAgg::default())])
            .unwrap();
        assert_eq!(kept.len(), 1);
    }
}
