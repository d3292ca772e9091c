//! Mock backend for testing
//!
//! Runs the shared preflight against real files but keeps the "loaded model"
//! in memory. Availability, failures and latency are scripted through
//! `MockConfig`; call counts stay observable after the backend has been
//! moved into a manager.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::hardware::{HardwareInfo, SharedHardwareProvider};
use crate::types::{GenerationConfig, ModelInfo};

use super::preflight::{self, LoadedModel};
use super::{Availability, BackendConfig, FailureKind, LoadOptions, LoadingResult, ModelBackend};

// ─────────────────────────────────────────────────────────────────
// Mock Backend Configuration
// ─────────────────────────────────────────────────────────────────

/// Configuration for mock backend behavior
#[derive(Debug, Clone)]
pub struct MockConfig {
    /// Result of the availability probe
    pub available: bool,

    /// Reason reported when unavailable
    pub unavailable_reason: String,

    /// Fail every load after preflight with this message
    pub fail_load: Option<String>,

    /// Simulated load latency (ms)
    pub load_delay_ms: u64,

    /// Fixed response text (for deterministic testing)
    pub fixed_response: Option<String>,

    /// Fail every generation
    pub fail_generate: bool,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            available: true,
            unavailable_reason: "not installed".to_string(),
            fail_load: None,
            load_delay_ms: 0,
            fixed_response: None,
            fail_generate: false,
        }
    }
}

impl MockConfig {
    /// A mock that probes as unavailable
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            available: false,
            unavailable_reason: reason.into(),
            ..Default::default()
        }
    }

    /// A mock whose loads fail with the given message
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            fail_load: Some(message.into()),
            ..Default::default()
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Call Counting
// ─────────────────────────────────────────────────────────────────

/// Method call counts for verification
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub is_available: u32,
    pub load_model: u32,
    pub generate_text: u32,
    pub unload_model: u32,
}

/// Shared view of a mock's call counts
#[derive(Debug, Clone, Default)]
pub struct MockCounters(Arc<RwLock<CallCounts>>);

impl MockCounters {
    /// Current counts
    pub fn snapshot(&self) -> CallCounts {
        *self.0.read()
    }

    /// Reset all counts
    pub fn reset(&self) {
        *self.0.write() = CallCounts::default();
    }
}

// ─────────────────────────────────────────────────────────────────
// Mock Backend
// ─────────────────────────────────────────────────────────────────

/// Mock implementation of ModelBackend for testing
pub struct MockBackend {
    mock: MockConfig,
    config: BackendConfig,
    hardware: SharedHardwareProvider,
    loaded: Option<LoadedModel>,
    counts: MockCounters,
}

impl MockBackend {
    /// Create a mock with default behavior
    pub fn new(config: BackendConfig, hardware: SharedHardwareProvider) -> Self {
        Self::with_mock(MockConfig::default(), config, hardware)
    }

    /// Create a mock with scripted behavior
    pub fn with_mock(mock: MockConfig, config: BackendConfig, hardware: SharedHardwareProvider) -> Self {
        Self {
            mock,
            config,
            hardware,
            loaded: None,
            counts: MockCounters::default(),
        }
    }

    /// Handle to this backend's call counts
    pub fn counters(&self) -> MockCounters {
        self.counts.clone()
    }

    /// Generate mock response text, at most `max_tokens` words
    fn generate_response(&self, prompt: &str, config: &GenerationConfig) -> String {
        if let Some(ref fixed) = self.mock.fixed_response {
            return fixed.clone();
        }

        let response = format!("Mock response from {} to: {}", self.config.name, prompt);
        response
            .split_whitespace()
            .take(config.max_tokens as usize)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[async_trait]
impl ModelBackend for MockBackend {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn config(&self) -> &BackendConfig {
        &self.config
    }

    fn is_available(&self) -> Availability {
        self.counts.0.write().is_available += 1;
        if self.mock.available {
            Availability::available()
        } else {
            Availability::unavailable(self.mock.unavailable_reason.clone())
        }
    }

    async fn load_model(&mut self, path: &Path, options: &LoadOptions) -> LoadingResult {
        self.counts.0.write().load_model += 1;
        let start = Instant::now();

        let loaded = match preflight::check(path, options).await {
            Ok(loaded) => loaded,
            Err(rejection) => {
                return rejection
                    .into_result(&self.config.name)
                    .with_load_time(start.elapsed().as_secs_f64())
            }
        };

        if self.mock.load_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.mock.load_delay_ms)).await;
        }

        if let Some(ref message) = self.mock.fail_load {
            return LoadingResult::failure(&self.config.name, FailureKind::Backend, message.clone())
                .with_load_time(start.elapsed().as_secs_f64());
        }

        let info = loaded.model_info();
        let result = LoadingResult::success(
            &self.config.name,
            loaded.hardware_used.clone(),
            start.elapsed().as_secs_f64(),
            Some(loaded.required_mb),
            info,
        );
        self.loaded = Some(loaded);
        result
    }

    async fn generate_text(&self, prompt: &str, config: &GenerationConfig) -> Result<String> {
        self.counts.0.write().generate_text += 1;

        if self.loaded.is_none() {
            return Err(Error::NoModelLoaded);
        }
        if self.mock.fail_generate {
            return Err(Error::generation_failed(&self.config.name, "Mock generation failure"));
        }

        let text = self.generate_response(prompt, config);
        Ok(config.truncate_at_stop(&text).to_string())
    }

    async fn unload_model(&mut self) -> bool {
        self.counts.0.write().unload_model += 1;
        self.loaded = None;
        true
    }

    fn hardware_info(&self) -> HardwareInfo {
        let info = self.hardware.hardware_info();
        if self.config.gpu_enabled {
            info
        } else {
            info.cpu_only()
        }
    }

    fn model_info(&self) -> Option<ModelInfo> {
        self.loaded.as_ref().map(|m| m.model_info())
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
