//! Pivot window resolution over the start-time index.
//!
//! A window is a bounded slice of the suite collection around an optional
//! pivot suite, resolved against one snapshot-isolated read view. The
//! index orders suites by `(started_at, id)`; ascending scans walk toward
//! newer suites, descending toward older ones.

use crate::live::change::Change;
use crate::live::error::{FeedError, Result};
use std::str;
use testdeck_commons::{Suite, SuiteAgg, SuiteId};
use testdeck_store::key_encoding::start_index_key;
use testdeck_store::{ReadView, ScanDirection, StorageError, SuiteStore};

/// One boundary position in the ordered index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub key: Vec<u8>,
    pub id: SuiteId,
}

/// The resolved window: suites in delivery order (newer side first, then
/// older side) plus the lowest and highest index keys actually included.
#[derive(Debug)]
pub struct ResolvedWindow {
    pub entries: Vec<(Vec<u8>, Suite)>,
    pub min: Option<Entry>,
    pub max: Option<Entry>,
    /// Index key of the pivot suite; `None` for unanchored windows.
    pub anchor: Option<Vec<u8>>,
}

impl ResolvedWindow {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Wraps the window contents as the initial change batch: one full
    /// snapshot per suite, then the aggregate row.
    pub fn initial_changes(&self, agg: SuiteAgg) -> Vec<Change> {
        let mut changes: Vec<Change> = self
            .entries
            .iter()
            .map(|(_, suite)| Change::suite_snapshot(suite.clone()))
            .collect();
        changes.push(Change::agg_update(agg));
        changes
    }
}

/// Resolves the window around `pivot`.
///
/// `pad_gt` counts suites at or newer than the pivot, the pivot itself
/// included when present; `pad_lt` counts additional older suites. With
/// no pivot the window is the `pad_lt + pad_gt` newest suites.
///
/// Fails with [`FeedError::NotFound`] when a pivot id is given but the
/// suite is absent (or tombstoned), and with [`FeedError::Corrupt`] when
/// a stored entry cannot be decoded; a window silently missing entries is
/// never returned.
pub fn resolve(
    view: &dyn ReadView,
    pivot: Option<&SuiteId>,
    pad_lt: usize,
    pad_gt: usize,
) -> Result<ResolvedWindow> {
    let index = SuiteStore::start_index_partition();
    let total = pad_lt.saturating_add(pad_gt);
    let mut entries: Vec<(Vec<u8>, Suite)> = Vec::new();
    let mut anchor = None;

    match pivot {
        None => {
            if total > 0 {
                for (key, value) in view.scan(&index, None, ScanDirection::Descending, Some(total))?
                {
                    let suite = load_suite(view, &value)?;
                    entries.push((key, suite));
                }
            }
        }
        Some(id) => {
            let pivot_suite = lookup_suite(view, id)?
                .filter(|suite| !suite.deleted)
                .ok_or_else(|| FeedError::NotFound(format!("suite {}", id)))?;
            let pivot_key = start_index_key(pivot_suite.started_at, &pivot_suite.id);
            anchor = Some(pivot_key.clone());

            // Newer side, pivot first.
            if pad_gt > 0 {
                for (key, value) in view.scan(
                    &index,
                    Some(&pivot_key),
                    ScanDirection::Ascending,
                    Some(pad_gt),
                )? {
                    let suite = load_suite(view, &value)?;
                    entries.push((key, suite));
                }
            }

            // Older side. The descending scan starts at the pivot's own
            // position; every other already-collected key is strictly
            // newer and cannot reappear, so only the pivot needs skipping.
            if pad_lt > 0 {
                let skip_pivot = pad_gt > 0;
                let limit = pad_lt + usize::from(skip_pivot);
                let mut taken = 0;
                for (key, value) in view.scan(
                    &index,
                    Some(&pivot_key),
                    ScanDirection::Descending,
                    Some(limit),
                )? {
                    if skip_pivot && key == pivot_key {
                        continue;
                    }
                    let suite = load_suite(view, &value)?;
                    entries.push((key, suite));
                    taken += 1;
                    if taken == pad_lt {
                        break;
                    }
                }
            }
        }
    }

    let min = entries
        .iter()
        .min_by(|a, b| a.0.cmp(&b.0))
        .map(|(key, suite)| Entry {
            key: key.clone(),
            id: suite.id.clone(),
        });
    let max = entries
        .iter()
        .max_by(|a, b| a.0.cmp(&b.0))
        .map(|(key, suite)| Entry {
            key: key.clone(),
            id: suite.id.clone(),
        });

    Ok(ResolvedWindow {
        entries,
        min,
        max,
        anchor,
    })
}

fn lookup_suite(view: &dyn ReadView, id: &SuiteId) -> Result<Option<Suite>> {
    match SuiteStore::suite_at(view, id) {
        Ok(found) => Ok(found),
        Err(StorageError::SerializationError(msg)) => Err(FeedError::Corrupt(msg)),
        Err(e) => Err(e.into()),
    }
}

/// Loads the suite an index entry points at. A dangling reference is
/// corruption, not an empty result.
fn load_suite(view: &dyn ReadView, index_value: &[u8]) -> Result<Suite> {
    let id_str = str::from_utf8(index_value)
        .map_err(|e| FeedError::Corrupt(format!("index value is not utf-8: {}", e)))?;
    let id = SuiteId::new(id_str);
    lookup_suite(view, &id)?
        .ok_or_else(|| FeedError::Corrupt(format!("index entry references missing suite {}", id)))
}
