//! Live change-feed machinery.
//!
//! A watcher subscribes to a bounded window of the suite collection around
//! an optional pivot and receives the initial window contents followed by
//! every committed write that touches it. Writers never block on
//! subscribers; each watcher owns an unbounded delivery queue drained by
//! its own task.

pub mod change;
pub mod error;
pub mod queue;
pub mod registry;
pub mod watcher;
pub mod window;
