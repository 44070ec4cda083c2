//! Shared domain models and error types for testdeck.
//!
//! This crate stays dependency-light so every other crate in the workspace
//! can depend on it without pulling in storage or runtime machinery.

pub mod errors;
pub mod models;
pub mod time;

pub use errors::{CommonError, Result};
pub use models::agg::SuiteAgg;
pub use models::ids::{SuiteId, WatcherId};
pub use models::suite::{Suite, SuiteResult, SuiteStatus};
