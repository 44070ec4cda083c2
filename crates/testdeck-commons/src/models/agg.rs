//! Aggregate counters over all suites.

use serde::{Deserialize, Serialize};

/// Single logical row summarizing counts across all suites.
///
/// At most one live instance exists; it is rewritten as a whole on every
/// write that changes a suite's lifecycle state. `version` increments on
/// each rewrite so consumers can discard stale snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuiteAgg {
    pub version: i64,
    pub running: i64,
    pub finished: i64,
    pub disconnected: i64,
    pub passed: i64,
    pub failed: i64,
}

impl SuiteAgg {
    /// Total number of suites the aggregate has seen.
    pub fn total(&self) -> i64 {
        self.running + self.finished + self.disconnected
    }
}
