//! Asynchronous model loading
//!
//! `LoadTask` validates a model file off the caller's thread and hands it to
//! the backend manager. Progress and the outcome come back as events.

mod cancel;
mod task;

pub use cancel::{cancel_pair, CancelHandle, CancelToken};
pub use task::*;
