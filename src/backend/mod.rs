//! Backend module for model loading
//!
//! This module provides the capability trait every backend implements, the
//! concrete process and mock variants, and the manager that selects between
//! them.

mod events;
mod manager;
mod mock;
mod registry;
mod status;
mod traits;

pub mod llama_cpp;
pub mod llamafile;
pub mod preflight;
pub mod process;

pub use events::*;
pub use manager::*;
pub use mock::{CallCounts, MockBackend, MockConfig, MockCounters};
pub use process::ProcessBackend;
pub use registry::*;
pub use status::*;
pub use traits::*;
