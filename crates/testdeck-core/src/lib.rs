//! Change-feed core for testdeck.
//!
//! The `live` module implements the subscription machinery: change model,
//! delivery queues, pivot window resolution and the watcher registry. The
//! `suites` module is the write path that feeds it.

pub mod live;
pub mod suites;

pub use live::change::{Change, Mask};
pub use live::error::{FeedError, Result};
pub use live::registry::WatcherRegistry;
pub use live::watcher::SuiteWatcher;
pub use suites::repo::{NewSuite, SuiteRepo};
