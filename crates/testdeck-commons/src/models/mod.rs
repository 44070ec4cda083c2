//! Domain model types.

pub mod agg;
pub mod ids;
pub mod suite;
