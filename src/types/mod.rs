//! Type definitions for the model loader
//!
//! Plain data shared across modules: model metadata, backend-reported
//! model info, and generation parameters.

mod generation;
mod model;

pub use generation::*;
pub use model::*;
