//! Suite write path.

pub mod repo;
