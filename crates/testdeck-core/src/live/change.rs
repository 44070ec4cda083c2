//! Change events exchanged between the write path and watchers.

use serde::{Deserialize, Serialize};
use testdeck_commons::{Suite, SuiteAgg};

/// Ordered sequence of changed field names.
///
/// Consumers overlay only the masked fields onto their local copy of the
/// suite. An empty mask means the payload is a full snapshot and replaces
/// the local copy, which is how initial window reads are delivered.
pub type Mask = Vec<String>;

/// One change event. Pure data; the variant tag drives consumer-side
/// dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Change {
    SuiteUpsert {
        suite: Suite,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        mask: Mask,
    },
    AggUpdate {
        agg: SuiteAgg,
    },
}

impl Change {
    pub fn suite_upsert(suite: Suite, mask: Mask) -> Self {
        Change::SuiteUpsert { suite, mask }
    }

    /// Full-snapshot upsert, as used for initial window contents.
    pub fn suite_snapshot(suite: Suite) -> Self {
        Change::SuiteUpsert {
            suite,
            mask: Mask::new(),
        }
    }

    pub fn agg_update(agg: SuiteAgg) -> Self {
        Change::AggUpdate { agg }
    }

    /// Variant tag, matching the serialized `type` field.
    pub fn kind(&self) -> &'static str {
        match self {
            Change::SuiteUpsert { .. } => "suite_upsert",
            Change::AggUpdate { .. } => "agg_update",
        }
    }
}
