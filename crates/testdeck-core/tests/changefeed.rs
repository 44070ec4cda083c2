//! End-to-end change-feed tests: repository writes flowing through the
//! registry to watchers.

use std::sync::Arc;
use testdeck_commons::{Suite, SuiteId, SuiteResult, SuiteStatus};
use testdeck_core::live::registry::WatcherRegistry;
use testdeck_core::{Change, FeedError, NewSuite, SuiteRepo};
use testdeck_store::test_utils::TestDb;
use testdeck_store::{MemoryBackend, StorageBackend};

fn setup() -> (Arc<WatcherRegistry>, SuiteRepo) {
    let backend: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
    let registry = WatcherRegistry::new(backend.clone());
    let repo = SuiteRepo::new(backend, registry.clone()).unwrap();
    (registry, repo)
}

/// Creates `count` suites with ascending start times, returning their ids
/// oldest first.
fn seed(repo: &SuiteRepo, count: i64) -> Vec<SuiteId> {
    (1..=count)
        .map(|n| {
            repo.create_suite(NewSuite {
                name: Some(format!("suite-{}", n)),
                started_at: Some(n * 1000),
                ..NewSuite::default()
            })
            .unwrap()
            .id
        })
        .collect()
}

fn upsert_suites(batch: &[Change]) -> Vec<&Suite> {
    batch
        .iter()
        .filter_map(|change| match change {
            Change::SuiteUpsert { suite, .. } => Some(suite),
            Change::AggUpdate { .. } => None,
        })
        .collect()
}

#[tokio::test]
async fn test_anchored_open_returns_pivot_window() {
    let (registry, repo) = setup();
    let ids = seed(&repo, 5);

    // Pivot on the third-newest suite: two at-or-newer, one older.
    let mut watcher = registry.open(Some(&ids[2]), 1, 2).unwrap();
    let initial = watcher.recv().await.unwrap();

    let suites = upsert_suites(&initial);
    let got: Vec<_> = suites.iter().map(|s| s.started_at).collect();
    assert_eq!(got, vec![3000, 4000, 2000]);
    assert!(suites.len() <= 1 + 2);
    assert!(matches!(initial.last(), Some(Change::AggUpdate { .. })));
}

#[tokio::test]
async fn test_unanchored_open_returns_newest_page() {
    let (registry, repo) = setup();
    seed(&repo, 5);

    let mut watcher = registry.open(None, 0, 3).unwrap();
    let initial = watcher.recv().await.unwrap();

    let got: Vec<_> = upsert_suites(&initial)
        .iter()
        .map(|s| s.started_at)
        .collect();
    assert_eq!(got, vec![5000, 4000, 3000]);
}

#[tokio::test]
async fn test_unknown_pivot_fails_without_registration() {
    let (registry, repo) = setup();
    seed(&repo, 2);

    let err = registry
        .open(Some(&SuiteId::new("unknown")), 1, 1)
        .unwrap_err();
    assert!(matches!(err, FeedError::NotFound(_)));
    assert_eq!(registry.watcher_count(), 0);
}

#[tokio::test]
async fn test_write_newer_than_window_boundary_is_dropped() {
    let (registry, repo) = setup();
    let ids = seed(&repo, 5);

    let mut watcher = registry.open(Some(&ids[2]), 1, 2).unwrap();
    watcher.recv().await.unwrap();

    // New suite sorts newer than the window's max boundary; only the
    // aggregate update of that commit reaches the watcher.
    repo.create_suite(NewSuite {
        started_at: Some(6000),
        ..NewSuite::default()
    })
    .unwrap();

    let batch = watcher.recv().await.unwrap();
    assert!(upsert_suites(&batch).is_empty());
    assert!(matches!(batch[0], Change::AggUpdate { .. }));
}

#[tokio::test]
async fn test_update_of_windowed_suite_is_delivered_with_mask() {
    let (registry, repo) = setup();
    let ids = seed(&repo, 5);

    let mut watcher = registry.open(Some(&ids[2]), 1, 2).unwrap();
    watcher.recv().await.unwrap();

    repo.finish_suite(&ids[2], SuiteResult::Passed, Some(9999))
        .unwrap();

    let batch = watcher.recv().await.unwrap();
    let suites = upsert_suites(&batch);
    assert_eq!(suites.len(), 1);
    assert_eq!(suites[0].status, SuiteStatus::Finished);
    match &batch[0] {
        Change::SuiteUpsert { mask, .. } => {
            assert_eq!(mask, &["version", "status", "result", "finished_at"]);
        }
        other => panic!("unexpected change: {:?}", other),
    }
}

#[tokio::test]
async fn test_watcher_observes_writes_in_commit_order() {
    let (registry, repo) = setup();
    seed(&repo, 1);

    // Nothing consumes while the writes run; none of them may block.
    let mut watcher = registry.open(None, 0, 50).unwrap();
    for n in 2..=20 {
        repo.create_suite(NewSuite {
            started_at: Some(n * 1000),
            ..NewSuite::default()
        })
        .unwrap();
    }

    let initial = watcher.recv().await.unwrap();
    assert_eq!(upsert_suites(&initial).len(), 1);

    let mut seen = Vec::new();
    for _ in 2..=20 {
        let batch = watcher.recv().await.unwrap();
        let suites = upsert_suites(&batch);
        assert_eq!(suites.len(), 1);
        seen.push(suites[0].started_at);
    }
    let expected: Vec<_> = (2..=20).map(|n| n * 1000).collect();
    assert_eq!(seen, expected);
}

#[tokio::test]
async fn test_window_below_requested_size_admits_new_writes() {
    let (registry, repo) = setup();
    seed(&repo, 2);

    let mut watcher = registry.open(None, 0, 5).unwrap();
    let initial = watcher.recv().await.unwrap();
    assert_eq!(upsert_suites(&initial).len(), 2);

    let created = repo
        .create_suite(NewSuite {
            started_at: Some(9000),
            ..NewSuite::default()
        })
        .unwrap();

    let batch = watcher.recv().await.unwrap();
    let suites = upsert_suites(&batch);
    assert_eq!(suites.len(), 1);
    assert_eq!(suites[0].id, created.id);
}

#[tokio::test]
async fn test_close_terminates_stream_and_drops_later_writes() {
    let (registry, repo) = setup();
    seed(&repo, 3);

    let mut watcher = registry.open(None, 0, 3).unwrap();
    repo.create_suite(NewSuite {
        started_at: Some(500),
        ..NewSuite::default()
    })
    .unwrap();
    watcher.close();
    repo.create_suite(NewSuite {
        started_at: Some(600),
        ..NewSuite::default()
    })
    .unwrap();

    // Initial window, then the pre-close commit's aggregate (its upsert
    // at 500 is older than the window), then end-of-stream.
    assert!(watcher.recv().await.is_some());
    let pre_close = watcher.recv().await.unwrap();
    assert!(matches!(pre_close[0], Change::AggUpdate { .. }));
    assert!(watcher.recv().await.is_none());
}

#[tokio::test]
async fn test_aggregate_reflects_full_lifecycle() {
    let (registry, repo) = setup();
    let ids = seed(&repo, 3);

    let mut watcher = registry.open(None, 0, 3).unwrap();
    watcher.recv().await.unwrap();

    repo.finish_suite(&ids[0], SuiteResult::Passed, None).unwrap();
    repo.finish_suite(&ids[1], SuiteResult::Failed, None).unwrap();
    repo.disconnect_suite(&ids[2], None).unwrap();

    let mut last_agg = None;
    for _ in 0..3 {
        let batch = watcher.recv().await.unwrap();
        for change in batch {
            if let Change::AggUpdate { agg } = change {
                last_agg = Some(agg);
            }
        }
    }

    let agg = last_agg.unwrap();
    assert_eq!(agg.running, 0);
    assert_eq!(agg.finished, 2);
    assert_eq!(agg.passed, 1);
    assert_eq!(agg.failed, 1);
    assert_eq!(agg.disconnected, 1);
}

#[tokio::test]
async fn test_rocksdb_backend_end_to_end() {
    let db = TestDb::new().unwrap();
    let backend: Arc<dyn StorageBackend> = db.backend();
    let registry = WatcherRegistry::new(backend.clone());
    let repo = SuiteRepo::new(backend, registry.clone()).unwrap();

    let ids = seed(&repo, 5);
    let mut watcher = registry.open(Some(&ids[2]), 1, 2).unwrap();

    let initial = watcher.recv().await.unwrap();
    let got: Vec<_> = upsert_suites(&initial)
        .iter()
        .map(|s| s.started_at)
        .collect();
    assert_eq!(got, vec![3000, 4000, 2000]);

    repo.finish_suite(&ids[3], SuiteResult::Passed, None).unwrap();
    let batch = watcher.recv().await.unwrap();
    assert_eq!(upsert_suites(&batch).len(), 1);

    watcher.close();
    assert!(watcher.recv().await.is_none());
}
