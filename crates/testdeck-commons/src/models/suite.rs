//! Test suite entity.

use crate::models::ids::SuiteId;
use serde::{Deserialize, Serialize};

/// Lifecycle state of a suite run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuiteStatus {
    /// Run is in progress and still reporting.
    Started,
    /// Run completed and reported a result.
    Finished,
    /// Run stopped reporting without finishing.
    Disconnected,
}

/// Outcome of a finished suite run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuiteResult {
    Passed,
    Failed,
}

/// One test suite run.
///
/// Suites are ordered globally by `(started_at, id)`, most recent first.
/// The id tiebreak keeps the order total so two suites never compare equal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suite {
    pub id: SuiteId,
    pub version: i64,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub deleted_at: Option<i64>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub planned_cases: Option<i64>,
    pub status: SuiteStatus,
    #[serde(default)]
    pub result: Option<SuiteResult>,
    #[serde(default)]
    pub disconnected_at: Option<i64>,
    pub started_at: i64,
    #[serde(default)]
    pub finished_at: Option<i64>,
}

impl Suite {
    /// Checks field-level constraints before the suite is persisted.
    pub fn validate(&self) -> crate::errors::Result<()> {
        use crate::errors::CommonError;

        if self.id.as_str().is_empty() {
            return Err(CommonError::InvalidInput(
                "suite id cannot be empty".to_string(),
            ));
        }
        if self.version < 1 {
            return Err(CommonError::InvalidInput(format!(
                "suite version must be positive, got {}",
                self.version
            )));
        }
        if let Some(planned) = self.planned_cases {
            if planned < 0 {
                return Err(CommonError::InvalidInput(format!(
                    "planned_cases cannot be negative, got {}",
                    planned
                )));
            }
        }
        Ok(())
    }

    /// Creates a freshly started suite at version 1.
    pub fn started(id: SuiteId, started_at: i64) -> Self {
        Self {
            id,
            version: 1,
            deleted: false,
            deleted_at: None,
            name: None,
            tags: Vec::new(),
            planned_cases: None,
            status: SuiteStatus::Started,
            result: None,
            disconnected_at: None,
            started_at,
            finished_at: None,
        }
    }
}
