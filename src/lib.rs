//! testdeck server library
//!
//! Exposes the configuration and logging modules for integration testing.

pub mod config;
pub mod logging;
