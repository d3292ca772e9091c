//! Backend kinds and factory
//!
//! The variant set is closed: adding a backend means adding a `BackendKind`
//! and a factory arm, never touching the manager's dispatch.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::hardware::SharedHardwareProvider;

use super::{llama_cpp, llamafile, BackendConfig, MockBackend, ModelBackend};

// ─────────────────────────────────────────────────────────────────
// Backend Kind
// ─────────────────────────────────────────────────────────────────

/// Supported backend variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// llama.cpp command-line runtime (GPU capable)
    LlamaCpp,
    /// llamafile runtime (CPU oriented)
    Llamafile,
    /// In-process mock backend (for testing and dry runs)
    Mock,
}

impl BackendKind {
    /// Get all backend kinds
    pub fn all() -> &'static [BackendKind] {
        &[BackendKind::LlamaCpp, BackendKind::Llamafile, BackendKind::Mock]
    }

    /// Get the backend name
    pub fn name(&self) -> &'static str {
        match self {
            BackendKind::LlamaCpp => "llama_cpp",
            BackendKind::Llamafile => "llamafile",
            BackendKind::Mock => "mock",
        }
    }

    /// Whether GPU offload is enabled in this kind's default config
    pub fn gpu_by_default(&self) -> bool {
        matches!(self, BackendKind::LlamaCpp)
    }
}

impl FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "llama_cpp" | "llamacpp" => Ok(BackendKind::LlamaCpp),
            "llamafile" => Ok(BackendKind::Llamafile),
            "mock" => Ok(BackendKind::Mock),
            _ => Err(Error::BackendNotFound { name: s.to_string() }),
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

// ─────────────────────────────────────────────────────────────────
// Backend Factory
// ─────────────────────────────────────────────────────────────────

/// Factory for creating backends
pub struct BackendFactory;

impl BackendFactory {
    /// Create a backend instance for a configuration
    ///
    /// Construction is cheap and never touches the model file or the runtime.
    pub fn create(config: &BackendConfig, hardware: SharedHardwareProvider) -> Box<dyn ModelBackend> {
        tracing::debug!(backend = %config.name, kind = %config.kind, "Creating backend instance");

        match config.kind {
            BackendKind::LlamaCpp => Box::new(llama_cpp::backend(config.clone(), hardware)),
            BackendKind::Llamafile => Box::new(llamafile::backend(config.clone(), hardware)),
            BackendKind::Mock => Box::new(MockBackend::new(config.clone(), hardware)),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
