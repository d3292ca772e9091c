//! Backend trait definitions
//!
//! Defines the `ModelBackend` capability contract every variant implements,
//! together with the values that cross it: configuration, load options and
//! load results.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::hardware::{HardwareInfo, OptimalSettings};
use crate::types::{GenerationConfig, ModelInfo};

use super::BackendKind;

// ─────────────────────────────────────────────────────────────────
// Backend Configuration
// ─────────────────────────────────────────────────────────────────

/// Per-backend tunables
///
/// Immutable once a load attempt starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Unique backend name
    pub name: String,

    /// Variant implementing this backend
    pub kind: BackendKind,

    /// Whether the backend takes part in selection
    pub enabled: bool,

    /// Whether GPU offload is allowed
    pub gpu_enabled: bool,

    /// GPU layers to offload (-1 = all available)
    pub gpu_layers: i32,

    /// Context window size
    pub context_size: u32,

    /// Batch size for prompt processing
    pub batch_size: u32,

    /// Inference threads (-1 = auto)
    pub threads: i32,

    /// Runtime executable override (process variants only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executable: Option<PathBuf>,
}

impl BackendConfig {
    /// Default configuration for a backend of the given kind
    pub fn new(name: impl Into<String>, kind: BackendKind) -> Self {
        Self {
            name: name.into(),
            kind,
            enabled: true,
            gpu_enabled: kind.gpu_by_default(),
            gpu_layers: -1,
            context_size: 4096,
            batch_size: 512,
            threads: -1,
            executable: None,
        }
    }

    /// Set the GPU flag
    pub fn with_gpu(mut self, enabled: bool) -> Self {
        self.gpu_enabled = enabled;
        self
    }

    /// Whether a load on `hardware` offloads to the GPU
    ///
    /// Decides the memory pool for both selection and preflight: VRAM when
    /// true, RAM otherwise.
    pub fn uses_gpu(&self, hardware: &HardwareInfo) -> bool {
        self.gpu_enabled && self.gpu_layers != 0 && hardware.gpu_count > 0 && hardware.total_vram_mb > 0
    }
}

// ─────────────────────────────────────────────────────────────────
// Availability
// ─────────────────────────────────────────────────────────────────

/// Result of an availability probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Availability {
    pub available: bool,
    pub reason: Option<String>,
}

impl Availability {
    pub fn available() -> Self {
        Self {
            available: true,
            reason: None,
        }
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            available: false,
            reason: Some(reason.into()),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Load Options
// ─────────────────────────────────────────────────────────────────

/// Resolved settings for one load attempt
#[derive(Debug, Clone, PartialEq)]
pub struct LoadOptions {
    /// GPU layers requested (-1 = all); 0 when the GPU is not used
    pub gpu_layers: i32,

    /// Context window size
    pub context_size: u32,

    /// Batch size
    pub batch_size: u32,

    /// Inference threads, auto already resolved
    pub threads: u32,

    /// Whether this load offloads to the GPU
    pub use_gpu: bool,

    /// Multiplier applied to the file size to estimate required memory
    pub memory_overhead_factor: f64,

    /// Snapshot the attempt is sized against
    pub hardware: HardwareInfo,
}

impl LoadOptions {
    /// Resolve a backend config against a fresh snapshot
    pub fn resolve(
        config: &BackendConfig,
        optimal: &OptimalSettings,
        hardware: HardwareInfo,
        memory_overhead_factor: f64,
    ) -> Self {
        let use_gpu = config.uses_gpu(&hardware);
        let threads = if config.threads < 0 {
            optimal.threads
        } else {
            config.threads as u32
        };

        Self {
            gpu_layers: if use_gpu { config.gpu_layers } else { 0 },
            context_size: config.context_size,
            batch_size: config.batch_size,
            threads: threads.max(1),
            use_gpu,
            memory_overhead_factor,
            hardware,
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Loading Result
// ─────────────────────────────────────────────────────────────────

/// Category of a failed load
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Model path missing or not a regular file
    NotFound,
    /// Bad file structure or header
    Validation,
    /// Backend not registered or not usable
    Unavailable,
    /// Estimated memory exceeds hardware capacity
    Capacity,
    /// The backend itself reported failure
    Backend,
    /// Every fallback candidate failed
    Aggregate,
    /// The load was cancelled
    Cancelled,
}

/// Outcome of one load attempt
///
/// A success carries `model_info`, a failure carries `error_message`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadingResult {
    pub success: bool,

    /// Backend that produced the result
    pub backend_name: String,

    /// Hardware actually used ("cpu", "cuda", ...)
    pub hardware_used: String,

    /// Elapsed load time (seconds)
    pub load_time: f64,

    /// Estimated memory footprint (MB)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_usage_mb: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_info: Option<ModelInfo>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
}

impl LoadingResult {
    /// Build a success result
    pub fn success(
        backend_name: impl Into<String>,
        hardware_used: impl Into<String>,
        load_time: f64,
        memory_usage_mb: Option<u64>,
        model_info: ModelInfo,
    ) -> Self {
        Self {
            success: true,
            backend_name: backend_name.into(),
            hardware_used: hardware_used.into(),
            load_time,
            memory_usage_mb,
            model_info: Some(model_info),
            error_message: None,
            failure: None,
        }
    }

    /// Build a failure result
    pub fn failure(backend_name: impl Into<String>, kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            success: false,
            backend_name: backend_name.into(),
            hardware_used: "none".to_string(),
            load_time: 0.0,
            memory_usage_mb: None,
            model_info: None,
            error_message: Some(message.into()),
            failure: Some(kind),
        }
    }

    /// Set the elapsed time
    pub fn with_load_time(mut self, load_time: f64) -> Self {
        self.load_time = load_time;
        self
    }

    /// Error message, or an empty string for successes
    pub fn error(&self) -> &str {
        self.error_message.as_deref().unwrap_or("")
    }
}

// ─────────────────────────────────────────────────────────────────
// ModelBackend Trait
// ─────────────────────────────────────────────────────────────────

/// Capability contract for model backends
///
/// Load failures are returned as data. The only error a backend raises to
/// its caller is from `generate_text`.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Backend name (the configuration key)
    fn name(&self) -> &str;

    /// Configuration the backend was created with
    fn config(&self) -> &BackendConfig;

    /// Variant of this backend
    fn kind(&self) -> BackendKind {
        self.config().kind
    }

    /// Cheap probe for runtime presence; never loads a model
    fn is_available(&self) -> Availability;

    /// Load a model, replacing nothing: callers unload first
    async fn load_model(&mut self, path: &Path, options: &LoadOptions) -> LoadingResult;

    /// Generate text from the loaded model
    ///
    /// Fails with `Error::NoModelLoaded` before a successful load.
    async fn generate_text(&self, prompt: &str, config: &GenerationConfig) -> Result<String>;

    /// Release the loaded model; succeeds trivially when nothing is loaded
    async fn unload_model(&mut self) -> bool;

    /// Hardware as this backend sees it
    fn hardware_info(&self) -> HardwareInfo;

    /// Info for the resident model
    fn model_info(&self) -> Option<ModelInfo>;

    /// Check if a model is loaded
    fn is_model_loaded(&self) -> bool {
        self.model_info().is_some()
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
