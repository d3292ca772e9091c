//! Configuration system for LLM Loader
//!
//! Supports multiple configuration sources with the following precedence (highest to lowest):
//! 1. CLI arguments
//! 2. Environment variables (LLM_LOADER_* prefix)
//! 3. Configuration file (TOML)
//! 4. Default values

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::backend::{BackendConfig, BackendKind, HardwarePreference, DEFAULT_MEMORY_OVERHEAD};
use crate::error::{Error, Result};
use crate::hardware::GpuDevice;
use crate::monitoring::DEFAULT_HISTORY_SIZE;

/// Main loader configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Logging configuration
    pub logging: LoggingSettings,

    /// Backend selection policy
    pub selection: SelectionSettings,

    /// Backends by name
    pub backends: BTreeMap<String, BackendSection>,

    /// Hardware detection and declared devices
    pub hardware: HardwareSettings,

    /// Performance recording
    pub monitoring: MonitoringSettings,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level: trace, debug, info, warn, error
    pub level: String,

    /// Log file path (empty = no file logging)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    /// Maximum log file size in MB before rotation
    pub max_file_size_mb: u64,

    /// Number of rotated log files to keep
    pub max_files: u32,

    /// Enable JSON formatted logging
    pub json_format: bool,
}

/// Backend selection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionSettings {
    /// Order in which backends are tried (empty = registration order)
    pub fallback_order: Vec<String>,

    /// Hardware restriction: auto, gpu, cpu
    pub hardware_preference: String,

    /// Multiplier from file size to required memory
    pub memory_overhead_factor: f64,
}

/// One `[backends.<name>]` table
///
/// Unset fields take the defaults of the backend kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendSection {
    /// Variant (defaults to the table name)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<BackendKind>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpu_enabled: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpu_layers: Option<i32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_size: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub threads: Option<i32>,

    /// Runtime executable (process variants)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executable: Option<String>,
}

/// Hardware settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HardwareSettings {
    /// Probe the machine (nvidia-smi) for GPUs
    pub detect: bool,

    /// Override the snapshot's recommended backend
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommended_backend: Option<String>,

    /// Devices declared by hand, added to detected ones
    pub gpus: Vec<GpuDevice>,
}

/// Monitoring settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringSettings {
    /// Completed operations kept in history
    pub history_size: usize,
}

// Default implementations

impl Default for LoaderConfig {
    fn default() -> Self {
        let backends = [BackendKind::LlamaCpp, BackendKind::Llamafile]
            .into_iter()
            .map(|kind| {
                (
                    kind.name().to_string(),
                    BackendSection {
                        kind: Some(kind),
                        ..Default::default()
                    },
                )
            })
            .collect();

        Self {
            logging: LoggingSettings::default(),
            selection: SelectionSettings::default(),
            backends,
            hardware: HardwareSettings::default(),
            monitoring: MonitoringSettings::default(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            max_file_size_mb: 100,
            max_files: 5,
            json_format: false,
        }
    }
}

impl Default for SelectionSettings {
    fn default() -> Self {
        Self {
            fallback_order: vec![],
            hardware_preference: "auto".to_string(),
            memory_overhead_factor: DEFAULT_MEMORY_OVERHEAD,
        }
    }
}

impl Default for HardwareSettings {
    fn default() -> Self {
        Self {
            detect: true,
            recommended_backend: None,
            gpus: vec![],
        }
    }
}

impl Default for MonitoringSettings {
    fn default() -> Self {
        Self {
            history_size: DEFAULT_HISTORY_SIZE,
        }
    }
}

impl BackendSection {
    /// Resolve into a full backend configuration
    pub fn to_backend_config(&self, name: &str) -> Result<BackendConfig> {
        let kind = match self.kind {
            Some(kind) => kind,
            None => name.parse().map_err(|_| {
                Error::config_field_invalid(
                    format!("backends.{}.kind", name),
                    format!("backend '{}' needs a kind (llama_cpp, llamafile, mock)", name),
                )
            })?,
        };

        let defaults = BackendConfig::new(name, kind);
        Ok(BackendConfig {
            enabled: self.enabled.unwrap_or(defaults.enabled),
            gpu_enabled: self.gpu_enabled.unwrap_or(defaults.gpu_enabled),
            gpu_layers: self.gpu_layers.unwrap_or(defaults.gpu_layers),
            context_size: self.context_size.unwrap_or(defaults.context_size),
            batch_size: self.batch_size.unwrap_or(defaults.batch_size),
            threads: self.threads.unwrap_or(defaults.threads),
            executable: self.executable.as_ref().map(PathBuf::from),
            ..defaults
        })
    }
}

impl LoaderConfig {
    /// Load configuration from file with environment variable overrides
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut config = Self::default();

        // 1. Load from config file if it exists
        let config_file = Self::find_config_file(config_path)?;
        if let Some(path) = config_file {
            debug!(path = %path.display(), "Loading configuration file");
            config = Self::from_file(&path)?;
            info!(path = %path.display(), "Configuration loaded from file");
        }

        // 2. Apply environment variable overrides
        config.apply_env_overrides();

        // 3. Expand paths
        config.expand_paths();

        // 4. Validate
        config.validate()?;

        Ok(config)
    }

    /// Parse one TOML file without overrides or validation
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| Error::IoRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml(&content)
    }

    /// Parse TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::ConfigParse {
            message: e.to_string(),
            source: Some(e),
        })
    }

    /// Find the configuration file to use
    fn find_config_file(explicit_path: Option<&str>) -> Result<Option<PathBuf>> {
        // If explicit path provided, use it (error if not found)
        if let Some(path) = explicit_path {
            let path = PathBuf::from(expand_path(path));
            if path.exists() {
                return Ok(Some(path));
            } else {
                return Err(Error::config_not_found(path));
            }
        }

        for path in Self::search_paths() {
            if path.exists() {
                debug!(path = %path.display(), "Found configuration file");
                return Ok(Some(path));
            }
        }

        debug!("No configuration file found, using defaults");
        Ok(None)
    }

    /// Standard locations, highest priority first
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("llm-loader.toml")];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("llm-loader").join("config.toml"));
        }
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".llm-loader").join("config.toml"));
        }
        paths.push(PathBuf::from("/etc/llm-loader/config.toml"));
        paths
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        // Logging settings
        if let Ok(val) = std::env::var("LLM_LOADER_LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = std::env::var("LLM_LOADER_LOG_FILE") {
            self.logging.file = Some(val);
        }
        if let Ok(val) = std::env::var("LLM_LOADER_LOG_JSON") {
            self.logging.json_format = val.to_lowercase() == "true" || val == "1";
        }

        // Selection settings
        if let Ok(val) = std::env::var("LLM_LOADER_FALLBACK_ORDER") {
            self.selection.fallback_order = val
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        if let Ok(val) = std::env::var("LLM_LOADER_HARDWARE_PREFERENCE") {
            self.selection.hardware_preference = val;
        }
        if let Ok(val) = std::env::var("LLM_LOADER_MEMORY_OVERHEAD") {
            if let Ok(n) = val.parse() {
                self.selection.memory_overhead_factor = n;
            }
        }

        // Monitoring settings
        if let Ok(val) = std::env::var("LLM_LOADER_HISTORY_SIZE") {
            if let Ok(n) = val.parse() {
                self.monitoring.history_size = n;
            }
        }
    }

    /// Expand ~ and other path variables
    fn expand_paths(&mut self) {
        if let Some(ref file) = self.logging.file {
            self.logging.file = Some(expand_path(file));
        }
        for section in self.backends.values_mut() {
            if let Some(ref exe) = section.executable {
                section.executable = Some(expand_path(exe));
            }
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        // Validate log level
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(Error::config_field_invalid(
                "logging.level",
                format!(
                    "Invalid log level '{}'. Must be one of: {}",
                    self.logging.level,
                    valid_levels.join(", ")
                ),
            ));
        }

        if !(self.selection.memory_overhead_factor >= 1.0) {
            return Err(Error::config_field_invalid(
                "selection.memory_overhead_factor",
                format!(
                    "memory_overhead_factor must be at least 1.0, got {}",
                    self.selection.memory_overhead_factor
                ),
            ));
        }

        self.hardware_preference()?;

        for name in &self.selection.fallback_order {
            if !self.backends.contains_key(name) {
                return Err(Error::config_field_invalid(
                    "selection.fallback_order",
                    format!("'{}' is not a configured backend", name),
                ));
            }
        }

        for config in self.backend_configs()? {
            let field = |f: &str| format!("backends.{}.{}", config.name, f);
            if config.context_size == 0 {
                return Err(Error::config_field_invalid(field("context_size"), "context_size must be greater than 0"));
            }
            if config.batch_size == 0 {
                return Err(Error::config_field_invalid(field("batch_size"), "batch_size must be greater than 0"));
            }
            if config.threads < -1 {
                return Err(Error::config_field_invalid(field("threads"), "threads must be -1 (auto) or positive"));
            }
            if config.gpu_layers < -1 {
                return Err(Error::config_field_invalid(field("gpu_layers"), "gpu_layers must be -1 (all) or positive"));
            }
        }

        Ok(())
    }

    /// Parsed hardware preference
    pub fn hardware_preference(&self) -> Result<HardwarePreference> {
        self.selection.hardware_preference.parse()
    }

    /// Backend configurations, fallback-order names first
    pub fn backend_configs(&self) -> Result<Vec<BackendConfig>> {
        let mut names: Vec<&String> = self
            .selection
            .fallback_order
            .iter()
            .filter(|n| self.backends.contains_key(*n))
            .collect();
        for name in self.backends.keys() {
            if !names.contains(&name) {
                names.push(name);
            }
        }

        names
            .into_iter()
            .map(|name| self.backends[name].to_backend_config(name))
            .collect()
    }
}

/// Expand ~ and environment variables in paths
fn expand_path(path: &str) -> String {
    shellexpand::full(path)
        .unwrap_or_else(|_| std::borrow::Cow::Borrowed(path))
        .into_owned()
}
