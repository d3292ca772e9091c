//! Monitoring module for timed backend operations
//!
//! Provides:
//! - Operation tokens bracketing loads, generations and unloads
//! - Per-backend performance aggregates
//! - A bounded history of recent operations

mod recorder;

pub use recorder::*;
