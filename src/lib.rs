//! LLM Loader
//!
//! Hardware-aware loading of GGUF model files. Backends implement one
//! capability trait; `BackendManager` selects between them, falls back on
//! failure and keeps per-backend statistics. `LoadTask` runs a load in the
//! background with progress events and cancellation.

pub mod backend;
pub mod config;
pub mod error;
pub mod hardware;
pub mod loader;
pub mod logging;
pub mod model;
pub mod monitoring;
pub mod system;
pub mod types;
pub mod version;

pub use backend::{BackendManager, HardwarePreference, LoadingResult, ModelBackend};
pub use config::LoaderConfig;
pub use error::{Error, Result};
pub use loader::{LoadTask, LoadTaskHandle, LoadTaskState};
