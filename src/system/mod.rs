//! System module for host resource sampling
//!
//! Provides:
//! - Static host information (cores, memory, OS)
//! - Resource samples for monitoring reports

mod health;

pub use health::*;
